pub mod config;
pub mod environment;
pub mod launch;
pub mod metadata;
pub mod notifier;
pub mod permissions;
pub mod processor;
pub mod runtime;
pub mod size;

// Re-exports for easy access
pub use config::ConversionConfig;
pub use launch::Directive;
pub use notifier::Notifier;
pub use permissions::DistroFamily;
pub use processor::ImageProcessor;
pub use runtime::{DockerRuntime, SingularityRuntime, SourceRuntime, TargetRuntime};
