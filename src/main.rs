use anyhow::{anyhow, Result};
use clap::Parser;
use log::debug;
use std::path::PathBuf;

use docker2singularity::config::{parse_mount_points, DEFAULT_MOUNT_POINTS};
use docker2singularity::{
    ConversionConfig, DockerRuntime, ImageProcessor, Notifier, SingularityRuntime,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(help = "Docker image to convert (e.g., ubuntu:22.04)")]
    image: String,

    #[arg(
        short,
        long,
        env = "MOUNT_POINTS",
        default_value = DEFAULT_MOUNT_POINTS,
        help = "Space-separated directories to create in the image as bind mount points"
    )]
    mount: String,

    #[arg(short, long, help = "Name of the produced image, without extension")]
    name: Option<String>,

    #[arg(
        short,
        long,
        default_value = ".",
        help = "Directory the finished image is moved to"
    )]
    output: PathBuf,

    #[arg(long, default_value = "docker", help = "Docker executable")]
    docker: String,

    #[arg(long, default_value = "singularity", help = "Singularity executable")]
    singularity: String,

    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Verbose mode (-v for info, -vv for debug, -vvv for trace). Also switches to text-based progress"
    )]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let notifier = Notifier::new(cli.verbose);

    let config = ConversionConfig {
        mount_points: parse_mount_points(&cli.mount),
        output_dir: cli.output,
        name: cli.name,
    };
    debug!("Configuration: {:?}", config);

    let source = DockerRuntime::new(cli.docker)
        .map_err(|e| anyhow!("Failed to initialize Docker: {}", e))?;
    let target = SingularityRuntime::new(cli.singularity)
        .map_err(|e| anyhow!("Failed to initialize Singularity: {}", e))?;

    let processor = ImageProcessor::new(source, target, config, notifier);
    processor.convert(&cli.image)?;

    Ok(())
}
