use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationError};

const DEFAULT_SWEEP_BATCH_SIZE: usize = 100;
const DEFAULT_LOG_LEVEL: &str = "info";
const CONFIG_FILE: &str = "stockledger";
const ENV_PREFIX: &str = "STOCKLEDGER";

fn default_sweep_batch_size() -> usize {
    DEFAULT_SWEEP_BATCH_SIZE
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Engine configuration.
///
/// Every knob has a sensible default so `EngineConfig::default()` is a valid
/// production setup; `load()` layers an optional `stockledger.toml` and
/// `STOCKLEDGER_*` environment variables on top.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Fallback negative-stock policy for locations without a settings
    /// record. Per-location `allow_negative_stock` always wins.
    #[serde(default)]
    pub allow_negative_stock: bool,

    /// When true, approving a pending reservation re-validates availability
    /// and fails hard instead of warning.
    #[serde(default)]
    pub strict_approval: bool,

    /// Maximum reservations transitioned per expiration sweep run.
    #[serde(default = "default_sweep_batch_size")]
    #[validate(custom = "validate_sweep_batch_size")]
    pub sweep_batch_size: usize,

    /// Default TTL applied to reservations created without an explicit
    /// `expires_at`. None means reservations never expire by default.
    #[serde(default)]
    pub default_reservation_ttl_secs: Option<i64>,

    /// Log level filter used by `init_tracing`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allow_negative_stock: false,
            strict_approval: false,
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            default_reservation_ttl_secs: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

fn validate_sweep_batch_size(size: usize) -> Result<(), ValidationError> {
    if size == 0 || size > 10_000 {
        return Err(ValidationError::new("sweep_batch_size_out_of_range"));
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read configuration: {0}")]
    Read(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl EngineConfig {
    /// Loads configuration from `stockledger.toml` (optional) and
    /// `STOCKLEDGER_*` environment variables, then validates it.
    pub fn load() -> Result<Self, ConfigLoadError> {
        let settings = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;

        let cfg: EngineConfig = settings.try_deserialize()?;
        cfg.validate()?;

        info!(
            sweep_batch_size = cfg.sweep_batch_size,
            strict_approval = cfg.strict_approval,
            "Loaded engine configuration"
        );

        Ok(cfg)
    }
}

/// Installs a global tracing subscriber honoring `RUST_LOG` with the
/// configured level as fallback. Safe to call more than once; later calls
/// are no-ops.
pub fn init_tracing(config: &EngineConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.sweep_batch_size, DEFAULT_SWEEP_BATCH_SIZE);
        assert!(!cfg.allow_negative_stock);
    }

    #[test]
    fn zero_sweep_batch_is_rejected() {
        let cfg = EngineConfig {
            sweep_batch_size: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
