//! End-to-end "Docker image → Singularity image" pipeline orchestrator.
//!
//! [`ImageProcessor`] drives a [`SourceRuntime`] and a [`TargetRuntime`]
//! through a fixed sequence of stages. Stages never overlap and are never
//! retried: the first error aborts the conversion.
//!
//! Everything written on the host (the image itself and the files copied into
//! it) lives in a staging [`TempDir`], so an aborted run leaves nothing behind.
//! The source container is discarded on every exit path as well.

use anyhow::{Context, Result};
use console::{style, Emoji};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;

use crate::config::ConversionConfig;
use crate::environment::{export_environment, render_environment_file, PROFILE_AMENDMENT};
use crate::launch::render_launch_script;
use crate::metadata::{ContainerInspect, ImageInspect, SourceImageDescriptor, TargetImageSpec};
use crate::notifier::Notifier;
use crate::permissions;
use crate::runtime::naming::target_image_name;
use crate::runtime::{ExecMode, ImageShell, RunningInstance, SourceRuntime, TargetRuntime};
use crate::size::estimate_size_mb;

/// Path of the launcher script inside the image.
pub const LAUNCH_SCRIPT_PATH: &str = "/singularity";
/// Path of the exported Docker environment inside the image.
pub const ENVIRONMENT_PATH: &str = "/docker_environment";
/// Path of the raw `docker inspect` output inside the image.
pub const INSPECT_PATH: &str = "/singularity.json";

pub const STAGES: usize = 11;

static SPARK: Emoji<'_, '_> = Emoji("✨ ", ":-)");

pub struct ImageProcessor<S: SourceRuntime, T: TargetRuntime> {
    source: S,
    target: T,
    config: ConversionConfig,
    notifier: Notifier,
}

impl<S: SourceRuntime, T: TargetRuntime> ImageProcessor<S, T> {
    pub fn new(source: S, target: T, config: ConversionConfig, notifier: Notifier) -> Self {
        Self {
            source,
            target,
            config,
            notifier: notifier.with_total_stages(STAGES),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Converts `image_name` and returns the path of the finished image in
    /// the configured output directory.
    pub fn convert(&self, image_name: &str) -> Result<PathBuf> {
        let result = self.run_pipeline(image_name);
        if result.is_err() {
            self.notifier.abandon();
        }
        result
    }

    fn run_pipeline(&self, image_name: &str) -> Result<PathBuf> {
        let started = Instant::now();
        let staging = TempDir::new().context("Failed to create staging directory")?;
        self.notifier
            .debug(&format!("Staging directory: {}", staging.path().display()));

        self.notifier.stage(
            1,
            &format!("Starting {} container from {}", self.source.name(), image_name),
        );
        let instance = RunningInstance::start(&self.source, image_name)?;
        self.notifier
            .debug(&format!("Container id: {}", instance.id()));

        self.notifier.stage(2, "Reading image metadata");
        let container_json = self.source.inspect_container(instance.id())?;
        let container = ContainerInspect::parse(&container_json)?;
        let image = ImageInspect::parse(&self.source.inspect_image(image_name)?)?;
        let environment = self.source.environment(image_name);
        let descriptor = SourceImageDescriptor::from_inspect(image, &container, environment);
        self.notifier.debug(&format!(
            "Image {} ({} bytes, created {})",
            descriptor.reference, descriptor.size, descriptor.created
        ));

        self.notifier.stage(3, "Estimating image size");
        let spec = self.target_spec(&descriptor, staging.path());
        self.notifier.debug(&format!(
            "Target {} sized {} MB",
            spec.name, spec.size_mb
        ));

        self.notifier
            .stage(4, &format!("Creating {} MB image {}", spec.size_mb, spec.name));
        self.target.create(&spec.path, spec.size_mb)?;

        self.notifier.stage(5, "Importing container filesystem");
        let mut stream = self.source.export(instance.id())?;
        self.target.import(&spec.path, &mut stream)?;
        stream.finish()?;
        let inspect_file = write_staged(staging.path(), INSPECT_PATH, &container_json)?;
        self.target.copy(&spec.path, &inspect_file, "/")?;

        self.notifier.stage(6, "Installing launch script");
        self.install_launch_script(&descriptor, &spec, staging.path())?;

        self.notifier.stage(7, "Installing environment");
        self.install_environment(&descriptor, &spec, staging.path())?;

        self.notifier.stage(8, "Creating mount points");
        self.create_mount_points(&spec)?;

        self.notifier.stage(9, "Normalizing permissions");
        let shell = ImageShell::new(&self.target, &spec.path, ExecMode::WritableContained);
        let family = permissions::normalize(&shell, "/")?;
        self.notifier
            .debug(&format!("Normalized permissions for {:?} userland", family));

        self.notifier.stage(10, "Removing source container");
        instance.teardown()?;

        self.notifier.stage(11, "Moving image to output directory");
        let destination = hand_off(&spec, &self.config.output_dir)?;

        self.notifier.finish(&format!(
            "{}Converted {} to {} in {:.1}s",
            SPARK,
            style(image_name).bold(),
            style(destination.display()).green(),
            started.elapsed().as_secs_f64()
        ));
        Ok(destination)
    }

    fn target_spec(&self, descriptor: &SourceImageDescriptor, staging: &Path) -> TargetImageSpec {
        let name = self.config.name.clone().unwrap_or_else(|| {
            target_image_name(
                &descriptor.reference,
                &descriptor.created,
                &descriptor.container_id,
            )
        });
        let path = staging.join(format!("{}.img", name));
        TargetImageSpec {
            name,
            size_mb: estimate_size_mb(descriptor.size),
            path,
        }
    }

    fn install_launch_script(
        &self,
        descriptor: &SourceImageDescriptor,
        spec: &TargetImageSpec,
        staging: &Path,
    ) -> Result<()> {
        let script = render_launch_script(&descriptor.entrypoint, &descriptor.command);
        self.notifier.debug(&format!("Launch script:\n{}", script));

        let script_file = write_staged(staging, LAUNCH_SCRIPT_PATH, &script)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&script_file, fs::Permissions::from_mode(0o755)).with_context(
                || format!("Failed to make {} executable", script_file.display()),
            )?;
        }
        self.target.copy(&spec.path, &script_file, "/")
    }

    fn install_environment(
        &self,
        descriptor: &SourceImageDescriptor,
        spec: &TargetImageSpec,
        staging: &Path,
    ) -> Result<()> {
        let exports = export_environment(&descriptor.environment);
        if exports.is_empty() {
            self.notifier
                .warn("No environment variables found, the image gets an empty environment");
        }
        self.notifier
            .debug(&format!("Exporting {} variables", exports.len()));

        let env_file = write_staged(staging, ENVIRONMENT_PATH, &render_environment_file(&exports))?;
        self.target.copy(&spec.path, &env_file, "/")?;
        self.target.exec(
            &spec.path,
            ExecMode::Writable,
            &format!("echo '{}' >> /environment", PROFILE_AMENDMENT),
        )?;
        Ok(())
    }

    fn create_mount_points(&self, spec: &TargetImageSpec) -> Result<()> {
        if self.config.mount_points.is_empty() {
            self.notifier.debug("No mount points requested");
            return Ok(());
        }
        let script = mount_point_script(&self.config.mount_points);
        self.target
            .exec(&spec.path, ExecMode::WritableContained, &script)?;
        Ok(())
    }
}

fn mount_point_script(mount_points: &[String]) -> String {
    let quoted: Vec<String> = mount_points
        .iter()
        .map(|mount_point| permissions::shell_quote(mount_point))
        .collect();
    format!("mkdir -p {}", quoted.join(" "))
}

/// Writes `content` to the staging file named after the in-image `path`.
fn write_staged(staging: &Path, path: &str, content: &str) -> Result<PathBuf> {
    let file = staging.join(path.trim_start_matches('/'));
    fs::write(&file, content).with_context(|| format!("Failed to write {}", file.display()))?;
    Ok(file)
}

/// Moves the finished image out of the staging directory.
fn hand_off(spec: &TargetImageSpec, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let file_name = spec
        .path
        .file_name()
        .context("Target image path has no file name")?;
    let destination = output_dir.join(file_name);

    if fs::rename(&spec.path, &destination).is_err() {
        // Different filesystem
        fs::copy(&spec.path, &destination).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                spec.path.display(),
                destination.display()
            )
        })?;
        fs::remove_file(&spec.path).ok();
    }
    Ok(destination)
}
