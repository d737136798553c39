//! Adapters around the external container runtimes.
//!
//! [`SourceRuntime`] is the runtime the image comes from (Docker), and
//! [`TargetRuntime`] the one producing the standalone image (Singularity).
//! Both shell out to the respective CLI; everything else in the crate only
//! talks to the traits.

pub mod docker;
pub mod naming;
pub mod singularity;
pub mod source;
pub mod target;

pub use docker::DockerRuntime;
pub use singularity::SingularityRuntime;
pub use source::{FilesystemStream, RunningInstance, SourceRuntime, ENV_EXECUTABLES};
pub use target::{ExecMode, ImageShell, TargetRuntime};
