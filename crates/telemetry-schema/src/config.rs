//! Converter configuration.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::SchemaError;

// ============================================================================
// Default configuration constants
// ============================================================================

/// Version assumed for data whose schema URL is missing or unrecognised.
pub const DEFAULT_FALLBACK_VERSION: &str = "0.0.0";

/// Default for pointing converted batches at the latest schema URL.
pub const DEFAULT_REWRITE_SCHEMA_URL: bool = true;

/// Configuration file read by [`ConverterConfig::load`].
pub const DEFAULT_CONFIG_FILE: &str = "telemetry-schema.toml";

/// Prefix of environment variables overriding file settings.
pub const ENV_PREFIX: &str = "TELEMETRY_SCHEMA_";

/// Converter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Path to the schema file. Required to build a converter.
    pub schema_file: Option<PathBuf>,
    /// Version assumed when a batch carries no usable schema URL.
    pub fallback_version: String,
    /// Rewrite the `schema_url` of converted batches to the schema's URL.
    pub rewrite_schema_url: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            schema_file: None,
            fallback_version: DEFAULT_FALLBACK_VERSION.to_owned(),
            rewrite_schema_url: DEFAULT_REWRITE_SCHEMA_URL,
        }
    }
}

impl ConverterConfig {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in order (later sources override earlier):
    /// 1. Default values
    /// 2. `telemetry-schema.toml` in current directory
    /// 3. Environment variables prefixed with `TELEMETRY_SCHEMA_`
    pub fn load() -> Result<Self, SchemaError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let config: Self = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| SchemaError::Config(e.to_string()))?;
        info!(
            path = %path.display(),
            schema_file = ?config.schema_file,
            fallback_version = %config.fallback_version,
            "loaded converter configuration"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let config = ConverterConfig::default();
        assert_eq!(config.schema_file, None);
        assert_eq!(config.fallback_version, DEFAULT_FALLBACK_VERSION);
        assert!(config.rewrite_schema_url);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ConverterConfig =
            toml::from_str(r#"schema_file = "schemas/1.2.0.yaml""#).unwrap();
        assert_eq!(config.schema_file, Some(PathBuf::from("schemas/1.2.0.yaml")));
        assert_eq!(config.fallback_version, DEFAULT_FALLBACK_VERSION);
        assert!(config.rewrite_schema_url);
    }

    #[test]
    fn full_toml() {
        let config: ConverterConfig = toml::from_str(
            r#"
schema_file = "/etc/schema.yaml"
fallback_version = "1.4.0"
rewrite_schema_url = false
"#,
        )
        .unwrap();
        assert_eq!(config.fallback_version, "1.4.0");
        assert!(!config.rewrite_schema_url);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "fallback_version = \"2.0\"").unwrap();

        let config = ConverterConfig::load_from(file.path()).unwrap();
        assert_eq!(config.fallback_version, "2.0");
    }

    #[test]
    fn load_from_rejects_wrong_types() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "rewrite_schema_url = \"sometimes\"").unwrap();

        let err = ConverterConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, SchemaError::Config(_)));
    }
}
