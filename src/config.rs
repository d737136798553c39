use std::path::PathBuf;

/// Mount points created in every image so that host filesystems commonly
/// bound by HPC centres have somewhere to land.
pub const DEFAULT_MOUNT_POINTS: &str = "/oasis /projects /scratch /local-scratch /work /home1 \
     /corral-repl /corral-tacc /beegfs /share/PI /extra /data /oak";

/// Settings of a single conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionConfig {
    /// Directories created inside the image.
    pub mount_points: Vec<String>,
    /// Directory the finished image is moved to.
    pub output_dir: PathBuf,
    /// Overrides the derived image name (without extension).
    pub name: Option<String>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            mount_points: parse_mount_points(DEFAULT_MOUNT_POINTS),
            output_dir: PathBuf::from("."),
            name: None,
        }
    }
}

/// Splits a space-separated mount point list.
pub fn parse_mount_points(list: &str) -> Vec<String> {
    list.split_whitespace().map(str::to_string).collect()
}
