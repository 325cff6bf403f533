//! Configuration for the governance runtime

use rail_manifest::{create_default_manifest, Manifest, ManifestLoader};
use rail_reflex::ReflexConfig;
use rail_resilience::{CircuitBreakerConfig, RetryConfig};
use rail_shadow::ShadowConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Where the active manifest comes from
    #[serde(default)]
    pub manifest: ManifestConfig,

    /// Retry backoff
    #[serde(default)]
    pub retry: RetryConfig,

    /// Circuit breaker thresholds, shared by every circuit
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Shadow evaluation and activation gate
    #[serde(default)]
    pub shadow: ShadowConfig,

    /// Reflex action defaults
    #[serde(default)]
    pub reflex: ReflexConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Manifest source configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Manifest document to load; the built-in default manifest when unset
    pub path: Option<PathBuf>,

    /// Refuse to activate a manifest whose hash_prev does not link to the
    /// active one
    pub enforce_hash_chain: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter, overridden by RUST_LOG
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl GovernanceConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Environment variables use the `RAIL_` prefix and `__` between nested
    /// keys, e.g. `RAIL_RETRY__BASE_DELAY_MS=500`.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&GovernanceConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        // Add environment variables with RAIL_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("RAIL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: GovernanceConfig = builder.build()?.try_deserialize()?;
        config
            .circuit_breaker
            .validate()
            .map_err(config::ConfigError::Message)?;
        Ok(config)
    }

    /// Load the configured manifest, or the default manifest when no path
    /// is set.
    pub fn load_manifest(&self) -> rail_manifest::Result<Manifest> {
        match &self.manifest.path {
            Some(path) => {
                let manifest = ManifestLoader::load_file(path)?;
                info!(
                    path = %path.display(),
                    version = manifest.version(),
                    hash = manifest.hash_self(),
                    "Loaded manifest"
                );
                Ok(manifest)
            }
            None => {
                info!("No manifest configured, using default manifest");
                Ok(create_default_manifest())
            }
        }
    }
}
