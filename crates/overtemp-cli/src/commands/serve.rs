use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use overtemp_core::{LimitConfig, PolicyConfig};
use overtemp_server::AppState;

use super::Overrides;

pub fn run(host: &str, port: u16, config_path: Option<&Path>, overrides: &Overrides<'_>) -> Result<()> {
    let config = super::effective_config(config_path, overrides)?;
    let state = AppState::from_config(&config)?;

    let base = format!("http://{host}:{port}");

    println!("🌡  Overtemp Server v{}", overtemp_core::VERSION);
    println!("   {base}");
    println!("   policy: {}", describe_policy(&config.policy));
    println!("   error store: {}", config.store.describe());
    println!();
    println!("   Endpoints:");
    println!("     GET    /          Liveness check");
    println!(
        "     POST   /temp      Ingest one reading            ({})",
        describe_limit(&config.limits.ingest)
    );
    println!(
        "     GET    /errors    List rejected raw readings    ({})",
        describe_limit(&config.limits.list_errors)
    );
    println!(
        "     DELETE /errors    Clear rejected raw readings   ({})",
        describe_limit(&config.limits.clear_errors)
    );
    println!();
    println!("   Examples:");
    println!(
        r#"     curl -X POST -H 'Content-Type: application/json' -d "{{\"data\": \"42:1700000000000:'Temperature':21.5\"}}" {base}/temp"#
    );
    println!("     curl {base}/errors");
    println!("     curl -X DELETE {base}/errors");
    println!();

    info!(
        "starting on {host}:{port} with {} policy, {} store",
        describe_policy(&config.policy),
        config.store.describe()
    );

    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    rt.block_on(overtemp_server::run_server(state, host, port))?;
    Ok(())
}

fn describe_policy(policy: &PolicyConfig) -> String {
    match policy {
        PolicyConfig::Delta { delta } => format!("delta (rise > {delta} since last reading)"),
        PolicyConfig::Threshold { threshold } => format!("threshold (>= {threshold})"),
    }
}

fn describe_limit(limit: &LimitConfig) -> String {
    format!("{} per {}s", limit.limit, limit.window_seconds)
}
