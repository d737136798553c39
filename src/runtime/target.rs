use anyhow::Result;
use std::io::Read;
use std::path::Path;

use crate::permissions::Shell;

/// How a command is executed inside the target image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    ReadOnly,
    /// The image is mounted read-write.
    Writable,
    /// Read-write, without binding host directories such as `$HOME` or `/tmp`
    /// into the image.
    WritableContained,
}

/// The filesystem-image runtime the image is converted to.
pub trait TargetRuntime {
    fn name(&self) -> &str;

    /// Allocates an empty image of `size_mb` megabytes at `image`.
    fn create(&self, image: &Path, size_mb: u64) -> Result<()>;

    /// Unpacks a tar stream into the image root.
    fn import(&self, image: &Path, archive: &mut dyn Read) -> Result<()>;

    /// Copies a host file to `destination` inside the image.
    fn copy(&self, image: &Path, file: &Path, destination: &str) -> Result<()>;

    /// Runs `script` with `/bin/sh -c` inside the image and returns stdout.
    fn exec(&self, image: &Path, mode: ExecMode, script: &str) -> Result<String>;
}

/// Adapts a target image to the [`Shell`] used by the permission normalizer.
pub struct ImageShell<'a, T: TargetRuntime + ?Sized> {
    runtime: &'a T,
    image: &'a Path,
    mode: ExecMode,
}

impl<'a, T: TargetRuntime + ?Sized> ImageShell<'a, T> {
    pub fn new(runtime: &'a T, image: &'a Path, mode: ExecMode) -> Self {
        Self {
            runtime,
            image,
            mode,
        }
    }
}

impl<T: TargetRuntime + ?Sized> Shell for ImageShell<'_, T> {
    fn run(&self, script: &str) -> Result<String> {
        self.runtime.exec(self.image, self.mode, script)
    }
}
