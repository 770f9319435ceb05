mod app;
mod samples;

use std::{error::Error, fs::OpenOptions, path::PathBuf};

use clap::Parser;
use tracing::info;
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt, Layer};
use winit::event_loop::EventLoop;

use crate::{app::ApplicationWrapper, samples::Sample};

/// Progressive Vulkan samples
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Sample to run
    #[arg(short, long, value_enum, default_value_t = Sample::Triangle)]
    pub sample: Sample,

    /// Directory textures and models are loaded from
    #[arg(short, long, default_value = "assets")]
    pub assets: PathBuf,

    /// Model loaded by the gltf sample, relative to the assets directory
    #[arg(short, long, default_value = "models/Box.glb")]
    pub model: PathBuf,

    /// Whether or not to create debug log (default false)
    #[arg(short, long, default_value_t = false)]
    pub debug_log: bool,

    /// Enable the Vulkan validation layers
    #[arg(long, default_value_t = false)]
    pub validation: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    color_eyre::install()?;
    let args = Args::parse();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_file(false)
        .with_line_number(false)
        .with_filter(filter::LevelFilter::DEBUG);

    let registry = tracing_subscriber::registry().with(fmt_layer);

    if args.debug_log {
        let log_file = OpenOptions::new()
            .append(true)
            .create(true)
            .open("log-debug.log")?;

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .without_time()
            .with_writer(log_file)
            .with_filter(filter::LevelFilter::DEBUG);

        registry.with(file_layer).init();
    } else {
        registry.init();
    }

    let event_loop = EventLoop::new()?;

    info!("Starting '{}' sample...", args.sample.title());
    let mut app = ApplicationWrapper::new(args);
    event_loop.run_app(&mut app)?;

    if let Some(e) = app.take_error() {
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_the_triangle() {
        let args = Args::try_parse_from(["samples"]).unwrap();
        assert_eq!(args.sample, Sample::Triangle);
        assert_eq!(args.assets, PathBuf::from("assets"));
        assert!(!args.debug_log);
        assert!(!args.validation);
    }

    #[test]
    fn sample_names_are_lowercase() {
        let args =
            Args::try_parse_from(["samples", "--sample", "gltf", "-m", "helmet.gltf"]).unwrap();
        assert_eq!(args.sample, Sample::Gltf);
        assert_eq!(args.model, PathBuf::from("helmet.gltf"));
        assert!(Args::try_parse_from(["samples", "--sample", "teapot"]).is_err());
    }
}
