use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tabsync::simulate::{Delivery, SimulationOptions, run_simulation};
use tabsync::{config, observability};

#[derive(Parser)]
#[command(name = "tabsync", about = "Tabsync - cross-tab action synchronization")]
struct Cli {
	/// Settings file to load instead of the default search path
	#[arg(long, global = true, env = "TABSYNC_CONFIG")]
	config: Option<PathBuf>,
	#[command(subcommand)]
	command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
	/// Run several tabs on an in-process channel and print their final state
	Simulate {
		/// Number of tabs opened up front
		#[arg(long, default_value_t = 2)]
		tabs: usize,
		/// INCREMENT actions dispatched from the first tab
		#[arg(long, default_value_t = 3)]
		increments: usize,
		/// Skip the late tab that joins with init_state
		#[arg(long)]
		no_late_joiner: bool,
		/// Deliver with one async driver per tab instead of flushing
		#[arg(long)]
		live: bool,
		/// Convergence timeout in milliseconds for --live
		#[arg(long, default_value_t = 2000)]
		timeout_ms: u64,
		/// Also print each tab's metrics
		#[arg(long)]
		metrics: bool,
	},
	/// Print the settings resolved from files and the environment
	ShowConfig,
}

#[tokio::main]
async fn main() {
	let cli = Cli::parse();

	let settings = match &cli.config {
		Some(path) => config::load_from(path),
		None => config::load(),
	};
	let settings = match settings {
		Ok(s) => s,
		Err(e) => {
			eprintln!("Warning: failed to load config, using defaults: {}", e);
			config::Settings::default()
		}
	};

	if let Err(e) = observability::init_logging(settings.log_level) {
		eprintln!("{}", e);
	}

	match cli.command.unwrap_or(Commands::ShowConfig) {
		Commands::ShowConfig => match serde_json::to_string_pretty(&settings) {
			Ok(text) => println!("{}", text),
			Err(e) => eprintln!("Failed to render settings: {}", e),
		},
		Commands::Simulate {
			tabs,
			increments,
			no_late_joiner,
			live,
			timeout_ms,
			metrics,
		} => {
			let opts = SimulationOptions {
				tabs,
				increments,
				late_joiner: !no_late_joiner,
				delivery: if live {
					Delivery::Live {
						timeout: Duration::from_millis(timeout_ms),
					}
				} else {
					Delivery::Flush
				},
			};

			match run_simulation(settings.to_sync_config(), &opts).await {
				Ok(reports) => {
					for report in reports {
						println!(
							"tab {} ({}{}): {}",
							report.index,
							report.tab_id,
							if report.late_joiner { ", late" } else { "" },
							report.state
						);
						if metrics {
							print!("{}", report.metrics);
						}
					}
				}
				Err(e) => {
					eprintln!("Simulation failed: {:#}", e);
					std::process::exit(1);
				}
			}
		}
	}
}
