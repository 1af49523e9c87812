//! CLI for overtemp: throttled device telemetry ingestion with overtemperature alerts.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::Overrides;

#[derive(Parser)]
#[command(name = "overtemp")]
#[command(about = "overtemp: throttled device telemetry ingestion with overtemperature alerts")]
#[command(version = overtemp_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP ingestion server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Validate a configuration and print the effective settings as JSON
    CheckConfig {
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Decode raw readings offline (device_id:timestamp_ms:'Temperature':temperature)
    Parse {
        /// Raw reading strings, in arrival order
        #[arg(required = true)]
        raw: Vec<String>,

        /// Also run the readings through an anomaly policy: delta or threshold
        #[arg(long, value_parser = ["delta", "threshold"])]
        policy: Option<String>,

        /// Delta or threshold value for --policy
        #[arg(long, requires = "policy")]
        threshold: Option<f64>,

        /// Print one JSON object per reading
        #[arg(long)]
        json: bool,
    },
}

/// Settings shared by commands that build a service configuration.
#[derive(clap::Args)]
struct SettingsArgs {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Anomaly policy: delta (default) or threshold
    #[arg(long, value_parser = ["delta", "threshold"])]
    policy: Option<String>,

    /// Delta or threshold value for the active policy
    #[arg(long)]
    threshold: Option<f64>,

    /// Error store backend: memory (default) or sqlite
    #[arg(long, value_parser = ["memory", "sqlite"])]
    store: Option<String>,

    /// SQLite database path (implies --store sqlite)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Requests admitted per window, applied to every throttled endpoint
    #[arg(long)]
    limit: Option<usize>,

    /// Window length in seconds, applied to every throttled endpoint
    #[arg(long)]
    window_seconds: Option<f64>,
}

impl SettingsArgs {
    fn overrides(&self) -> Overrides<'_> {
        Overrides {
            policy: self.policy.as_deref(),
            threshold: self.threshold,
            store: self.store.as_deref(),
            db: self.db.as_deref(),
            limit: self.limit,
            window_seconds: self.window_seconds,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            port,
            host,
            settings,
        } => commands::serve::run(
            &host,
            port,
            settings.config.as_deref(),
            &settings.overrides(),
        ),
        Commands::CheckConfig { settings } => {
            commands::check_config::run(settings.config.as_deref(), &settings.overrides())
        }
        Commands::Parse {
            raw,
            policy,
            threshold,
            json,
        } => {
            let policy = policy
                .as_deref()
                .and_then(|kind| commands::parse_policy(kind, threshold));
            commands::parse::run(&raw, policy, json)
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
