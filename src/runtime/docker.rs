use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::process::{Command, Stdio};

use super::source::{FilesystemStream, SourceRuntime};

/// Docker implementation of the [`SourceRuntime`] trait
pub struct DockerRuntime {
    binary: String,
}

impl DockerRuntime {
    pub fn new(binary: impl Into<String>) -> Result<Self> {
        let binary = binary.into();
        let output = Command::new(&binary)
            .arg("--version")
            .output()
            .with_context(|| {
                format!(
                    "Failed to execute {} command. Is Docker installed and running?",
                    binary
                )
            })?;

        if !output.status.success() {
            return Err(anyhow!("Docker is not available"));
        }

        Ok(Self { binary })
    }

    fn run_command(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {:?}", self.binary, args);
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .with_context(|| format!("Failed to execute docker command: {:?}", args))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Docker command {:?} failed: {}", args, error.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl SourceRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    fn start(&self, image: &str) -> Result<String> {
        info!("Starting detached container from {}", image);
        let id = self.run_command(&["run", "-d", image])?;
        let id = id.trim();
        if id.is_empty() {
            return Err(anyhow!("Docker did not report a container id for {}", image));
        }
        Ok(id.to_string())
    }

    fn inspect_container(&self, container_id: &str) -> Result<String> {
        self.run_command(&["inspect", "--type", "container", container_id])
    }

    fn inspect_image(&self, image: &str) -> Result<String> {
        self.run_command(&["inspect", "--type", "image", image])
    }

    fn export(&self, container_id: &str) -> Result<FilesystemStream> {
        let child = Command::new(&self.binary)
            .args(["export", container_id])
            .stdout(Stdio::piped())
            .spawn()
            .context("Failed to spawn docker export")?;
        FilesystemStream::from_child(child)
    }

    fn run_executable(&self, image: &str, executable: &str) -> Result<Vec<String>> {
        let entrypoint = format!("--entrypoint={}", executable);
        let output = self.run_command(&["run", "--rm", &entrypoint, image])?;
        Ok(output
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn stop(&self, container_id: &str) -> Result<()> {
        self.run_command(&["stop", container_id]).map(|_| ())
    }

    fn remove(&self, container_id: &str) -> Result<()> {
        self.run_command(&["rm", container_id]).map(|_| ())
    }
}
