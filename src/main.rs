use std::path::Path;

use clap::Parser;
use log::{error, info};

use fieldlink::configuration::Config;
use fieldlink::controller::Controller;

#[derive(Parser)]
#[command(name = "fieldlink")]
#[command(version)]
#[command(about = "Field-device link monitor: frame capture and telemetry history")]
struct Args {
    /// Path to the TOML configuration file
    config_file: String,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();

    info!("Importing configuration");
    let config = match Config::from_file(Path::new(args.config_file.as_str())) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration from file: {}", e);
            std::process::exit(1);
        }
    };

    let controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    info!("Spawning the controller");
    controller.run().await;
}
