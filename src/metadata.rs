use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;

use crate::launch::Directive;

/// Subset of `docker inspect <image>` used for the conversion.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageInspect {
    #[serde(rename = "Id", default)]
    pub id: String,
    #[serde(rename = "Size", default)]
    pub size: u64,
    #[serde(rename = "Created", default)]
    pub created: String,
    #[serde(rename = "Config", default)]
    pub config: InspectConfig,
}

/// Subset of `docker inspect <container>`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerInspect {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Config", default)]
    pub config: InspectConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InspectConfig {
    #[serde(rename = "Image", default)]
    pub image: String,
    #[serde(rename = "Entrypoint", default)]
    pub entrypoint: Directive,
    #[serde(rename = "Cmd", default)]
    pub cmd: Directive,
}

/// `docker inspect` always prints an array, even for a single object.
fn first_of<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T> {
    let mut items: Vec<T> = serde_json::from_str(raw)
        .with_context(|| format!("Failed to parse {} inspect output", what))?;
    if items.is_empty() {
        return Err(anyhow!("Empty {} inspect output", what));
    }
    Ok(items.swap_remove(0))
}

impl ImageInspect {
    pub fn parse(raw: &str) -> Result<Self> {
        first_of(raw, "image")
    }
}

impl ContainerInspect {
    pub fn parse(raw: &str) -> Result<Self> {
        first_of(raw, "container")
    }
}

/// Everything read from the source runtime about the image being converted.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImageDescriptor {
    /// Image reference as recorded on the running instance, e.g. `ubuntu:22.04`.
    pub reference: String,
    pub container_id: String,
    pub size: u64,
    pub created: String,
    pub entrypoint: Directive,
    pub command: Directive,
    /// Raw `KEY=VALUE` lines from the instance's `env`.
    pub environment: Vec<String>,
}

impl SourceImageDescriptor {
    pub fn from_inspect(
        image: ImageInspect,
        container: &ContainerInspect,
        environment: Vec<String>,
    ) -> Self {
        let reference = if container.config.image.is_empty() {
            image.id.clone()
        } else {
            container.config.image.clone()
        };

        Self {
            reference,
            container_id: container.id.clone(),
            size: image.size,
            created: image.created,
            entrypoint: image.config.entrypoint,
            command: image.config.cmd,
            environment,
        }
    }
}

/// The Singularity image being produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetImageSpec {
    pub name: String,
    pub size_mb: u64,
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE_JSON: &str = r#"[
        {
            "Id": "sha256:4f1b3b6b",
            "Created": "2024-03-01T12:30:45.123456789Z",
            "Size": 77823426,
            "Config": {
                "Env": ["PATH=/usr/local/sbin:/usr/local/bin:/usr/bin"],
                "Cmd": ["/bin/bash"],
                "Entrypoint": null,
                "Image": ""
            }
        }
    ]"#;

    const CONTAINER_JSON: &str = r#"[
        {
            "Id": "0123456789abcdef0123456789abcdef",
            "Config": {
                "Image": "ubuntu:22.04",
                "Cmd": ["/bin/bash"],
                "Entrypoint": null
            },
            "NetworkSettings": { "IPAddress": "172.17.0.2" }
        }
    ]"#;

    #[test]
    fn test_parse_image_inspect() {
        let image = ImageInspect::parse(IMAGE_JSON).unwrap();
        assert_eq!(image.size, 77823426);
        assert_eq!(image.created, "2024-03-01T12:30:45.123456789Z");
        assert!(image.config.entrypoint.is_absent());
        assert_eq!(image.config.cmd, Directive::List(vec!["/bin/bash".to_string()]));
    }

    #[test]
    fn test_descriptor_prefers_container_reference() {
        let image = ImageInspect::parse(IMAGE_JSON).unwrap();
        let container = ContainerInspect::parse(CONTAINER_JSON).unwrap();
        let descriptor =
            SourceImageDescriptor::from_inspect(image, &container, vec!["A=1".to_string()]);

        assert_eq!(descriptor.reference, "ubuntu:22.04");
        assert_eq!(descriptor.container_id, "0123456789abcdef0123456789abcdef");
        assert_eq!(descriptor.size, 77823426);
        assert_eq!(descriptor.environment, vec!["A=1"]);
    }

    #[test]
    fn test_empty_inspect_output_is_an_error() {
        assert!(ImageInspect::parse("[]").is_err());
        assert!(ContainerInspect::parse("not json").is_err());
    }
}
