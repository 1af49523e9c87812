use std::path::Path;

use anyhow::Result;

use super::Overrides;

/// Print the effective configuration as JSON, or fail with the first problem found.
pub fn run(config_path: Option<&Path>, overrides: &Overrides<'_>) -> Result<()> {
    let config = super::effective_config(config_path, overrides)?;
    println!("{}", config.to_json_pretty());
    Ok(())
}
