use anyhow::{anyhow, Context, Result};
use log::debug;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread;

use super::target::{ExecMode, TargetRuntime};

/// Singularity implementation of the [`TargetRuntime`] trait
pub struct SingularityRuntime {
    binary: String,
}

impl SingularityRuntime {
    pub fn new(binary: impl Into<String>) -> Result<Self> {
        let binary = binary.into();
        let output = Command::new(&binary)
            .arg("--version")
            .output()
            .with_context(|| {
                format!(
                    "Failed to execute {} command. Is Singularity installed?",
                    binary
                )
            })?;

        if !output.status.success() {
            return Err(anyhow!("Singularity is not available"));
        }

        debug!(
            "Using singularity {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(Self { binary })
    }

    fn check(&self, args: &[&str], output: Output) -> Result<String> {
        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "Singularity command {:?} failed: {}",
                args,
                error.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_command(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {:?}", self.binary, args);
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .with_context(|| format!("Failed to execute singularity command: {:?}", args))?;
        self.check(args, output)
    }
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("Path is not valid UTF-8: {}", path.display()))
}

impl TargetRuntime for SingularityRuntime {
    fn name(&self) -> &str {
        "singularity"
    }

    fn create(&self, image: &Path, size_mb: u64) -> Result<()> {
        let size = size_mb.to_string();
        self.run_command(&["create", "--size", &size, path_arg(image)?])
            .map(|_| ())
    }

    fn import(&self, image: &Path, archive: &mut dyn Read) -> Result<()> {
        let args = ["import", path_arg(image)?];
        debug!("Running {} {:?}", self.binary, args);

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn singularity import")?;

        // Drained while the archive is written, a full stderr pipe would
        // otherwise block both sides.
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("Import process has no stderr"))?;
        let drain = thread::spawn(move || {
            let mut buffer = Vec::new();
            stderr.read_to_end(&mut buffer).map(|_| buffer)
        });

        let copied = match child.stdin.take() {
            Some(mut stdin) => io::copy(archive, &mut stdin).map(|_| ()),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "import process has no stdin",
            )),
        };

        let status = child
            .wait()
            .context("Failed to wait for singularity import")?;
        let stderr = drain
            .join()
            .map_err(|_| anyhow!("Singularity import stderr reader panicked"))?
            .context("Failed to read singularity import output")?;

        let output = Output {
            status,
            stdout: Vec::new(),
            stderr,
        };
        match (self.check(&args, output), copied) {
            (Ok(_), Ok(())) => Ok(()),
            (Ok(_), Err(e)) => Err(e).context("Failed to stream filesystem into image"),
            (Err(failed), Ok(())) => Err(failed),
            (Err(failed), Err(e)) => {
                Err(failed.context(format!("Failed to stream filesystem into image: {}", e)))
            }
        }
    }

    fn copy(&self, image: &Path, file: &Path, destination: &str) -> Result<()> {
        self.run_command(&["copy", path_arg(image)?, path_arg(file)?, destination])
            .map(|_| ())
    }

    fn exec(&self, image: &Path, mode: ExecMode, script: &str) -> Result<String> {
        let mut args = vec!["exec"];
        match mode {
            ExecMode::ReadOnly => {}
            ExecMode::Writable => args.push("--writable"),
            ExecMode::WritableContained => args.extend(["--writable", "--contain"]),
        }
        args.extend([path_arg(image)?, "/bin/sh", "-c", script]);
        self.run_command(&args)
    }
}
