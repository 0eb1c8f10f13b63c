//! Main entry point for the RadOrder intake service.
//!
//! This binary provides the complete order-intake workflow: clinicians
//! dictate imaging orders, the validation gateway judges appropriateness,
//! and signed orders are submitted and routed to radiology. It uses a
//! modular architecture with pluggable implementations for each external
//! collaborator.

use clap::Parser;
use intake_config::Config;
use intake_core::IntakeBuilder;
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod server;

/// Command-line arguments for the intake service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the intake service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the intake engine with all implementations
/// 5. Runs the engine (and the API server, when enabled) until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started intake service");

	// Load configuration
	let config_path = args
		.config
		.to_str()
		.ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.intake.id);

	// Build the intake engine with registered implementations
	let engine = IntakeBuilder::new(config.clone()).build().await?;
	let engine = Arc::new(engine);

	// Check if API server should be started
	let api_enabled = config.api.as_ref().is_some_and(|api| api.enabled);

	if api_enabled {
		let api_config = config.api.as_ref().unwrap().clone();
		let api_engine = Arc::clone(&engine);

		// Run the engine and the API server concurrently
		let engine_task = engine.run();
		let api_task = server::start_server(api_config, api_engine);

		tokio::select! {
			result = engine_task => {
				tracing::info!("Engine finished");
				result?;
			}
			result = api_task => {
				tracing::info!("API server finished");
				result?;
			}
		}
	} else {
		tracing::info!("Starting engine only");
		engine.run().await?;
	}

	tracing::info!("Stopped intake service");
	Ok(())
}
