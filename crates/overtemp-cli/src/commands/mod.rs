pub mod check_config;
pub mod parse;
pub mod serve;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use overtemp_core::{LimitConfig, LimitsConfig, PolicyConfig, ServiceConfig, StoreConfig};

/// Command-line settings layered on top of the config file.
#[derive(Debug, Default)]
pub struct Overrides<'a> {
    pub policy: Option<&'a str>,
    pub threshold: Option<f64>,
    pub store: Option<&'a str>,
    pub db: Option<&'a Path>,
    pub limit: Option<usize>,
    pub window_seconds: Option<f64>,
}

/// Load the config file (if any), apply command-line overrides, validate.
pub fn effective_config(path: Option<&Path>, overrides: &Overrides<'_>) -> Result<ServiceConfig> {
    let mut config = match path {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServiceConfig::default(),
    };

    if let Some(kind) = overrides.policy {
        config.policy = match parse_policy(kind, overrides.threshold) {
            Some(policy) => policy,
            None => bail!("unknown policy '{kind}' (expected delta or threshold)"),
        };
    } else if let Some(value) = overrides.threshold {
        config.policy = match config.policy {
            PolicyConfig::Delta { .. } => PolicyConfig::Delta { delta: value },
            PolicyConfig::Threshold { .. } => PolicyConfig::Threshold { threshold: value },
        };
    }

    match (overrides.store, overrides.db) {
        (Some("memory"), _) => config.store = StoreConfig::Memory,
        (Some("sqlite"), db) => {
            let path = db.map(Path::to_path_buf).or_else(|| match &config.store {
                StoreConfig::Sqlite { path } => Some(path.clone()),
                StoreConfig::Memory => None,
            });
            config.store = StoreConfig::Sqlite {
                path: path.unwrap_or_else(|| PathBuf::from(overtemp_core::config::DEFAULT_DB_PATH)),
            };
        }
        (Some(other), _) => bail!("unknown store '{other}' (expected memory or sqlite)"),
        (None, Some(db)) => {
            config.store = StoreConfig::Sqlite {
                path: db.to_path_buf(),
            }
        }
        (None, None) => {}
    }

    if overrides.limit.is_some() || overrides.window_seconds.is_some() {
        let patch = |limit: LimitConfig| {
            LimitConfig::new(
                overrides.limit.unwrap_or(limit.limit),
                overrides.window_seconds.unwrap_or(limit.window_seconds),
            )
        };
        config.limits = LimitsConfig {
            ingest: patch(config.limits.ingest),
            list_errors: patch(config.limits.list_errors),
            clear_errors: patch(config.limits.clear_errors),
        };
    }

    config.validate()?;
    Ok(config)
}

/// Parse a policy name; `value` is the delta or threshold, defaulted when absent.
pub fn parse_policy(kind: &str, value: Option<f64>) -> Option<PolicyConfig> {
    match kind {
        "delta" => Some(PolicyConfig::Delta {
            delta: value.unwrap_or(overtemp_core::DEFAULT_DELTA),
        }),
        "threshold" => Some(PolicyConfig::Threshold {
            threshold: value.unwrap_or(overtemp_core::DEFAULT_THRESHOLD),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // parse_policy tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_delta_default() {
        assert_eq!(
            parse_policy("delta", None),
            Some(PolicyConfig::Delta { delta: 10.0 })
        );
    }

    #[test]
    fn test_parse_threshold_with_value() {
        assert_eq!(
            parse_policy("threshold", Some(75.5)),
            Some(PolicyConfig::Threshold { threshold: 75.5 })
        );
    }

    #[test]
    fn test_parse_unknown_policy() {
        assert_eq!(parse_policy("ewma", None), None);
        assert_eq!(parse_policy("DELTA", None), None); // case-sensitive
    }

    // -----------------------------------------------------------------------
    // effective_config tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_no_file_no_overrides_is_default() {
        let config = effective_config(None, &Overrides::default()).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_threshold_flag_tunes_active_policy() {
        let overrides = Overrides {
            threshold: Some(4.0),
            ..Default::default()
        };
        let config = effective_config(None, &overrides).unwrap();
        assert_eq!(config.policy, PolicyConfig::Delta { delta: 4.0 });
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overtemp.json");
        std::fs::write(
            &path,
            r#"{"policy": {"kind": "delta"}, "store": {"kind": "sqlite", "path": "file.db"}}"#,
        )
        .unwrap();

        let overrides = Overrides {
            policy: Some("threshold"),
            limit: Some(7),
            ..Default::default()
        };
        let config = effective_config(Some(&path), &overrides).unwrap();
        assert_eq!(config.policy, PolicyConfig::Threshold { threshold: 90.0 });
        assert_eq!(
            config.store,
            StoreConfig::Sqlite {
                path: PathBuf::from("file.db")
            }
        );
        assert_eq!(config.limits.ingest, LimitConfig::new(7, 10.0));
        assert_eq!(config.limits.clear_errors, LimitConfig::new(7, 10.0));
    }

    #[test]
    fn test_db_flag_implies_sqlite() {
        let overrides = Overrides {
            db: Some(Path::new("errors.db")),
            ..Default::default()
        };
        let config = effective_config(None, &overrides).unwrap();
        assert_eq!(
            config.store,
            StoreConfig::Sqlite {
                path: PathBuf::from("errors.db")
            }
        );
    }

    #[test]
    fn test_memory_store_flag_wins() {
        let overrides = Overrides {
            store: Some("memory"),
            db: Some(Path::new("ignored.db")),
            ..Default::default()
        };
        let config = effective_config(None, &overrides).unwrap();
        assert_eq!(config.store, StoreConfig::Memory);
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        let bad_store = Overrides {
            store: Some("redis"),
            ..Default::default()
        };
        assert!(effective_config(None, &bad_store).is_err());

        let zero_window = Overrides {
            window_seconds: Some(0.0),
            ..Default::default()
        };
        assert!(effective_config(None, &zero_window).is_err());
    }
}
