//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Engine-related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Ghostscript binary to invoke (default "gs")
    #[serde(default = "default_ghostscript_bin")]
    pub ghostscript_bin: String,
    /// Base directory for per-engine staging files
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Upper bound on a single engine invocation, in seconds (0 = unbounded)
    #[serde(default = "default_invoke_timeout_secs")]
    pub invoke_timeout_secs: u64,
}

fn default_ghostscript_bin() -> String {
    "gs".to_string()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("/tmp/pdf-press")
}

fn default_invoke_timeout_secs() -> u64 {
    120
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ghostscript_bin: default_ghostscript_bin(),
            staging_dir: default_staging_dir(),
            invoke_timeout_secs: default_invoke_timeout_secs(),
        }
    }
}

/// Preload-related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreloadConfig {
    /// Cooperative yield between preload levels, in milliseconds
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Pause after a failed preload level before moving on, in milliseconds
    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,
}

fn default_throttle_ms() -> u64 {
    150
}

fn default_failure_backoff_ms() -> u64 {
    500
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            failure_backoff_ms: default_failure_backoff_ms(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub preload: PreloadConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - ENGINE_GHOSTSCRIPT_BIN -> engine.ghostscript_bin
    /// - ENGINE_STAGING_DIR -> engine.staging_dir
    /// - ENGINE_INVOKE_TIMEOUT_SECS -> engine.invoke_timeout_secs
    /// - PRELOAD_THROTTLE_MS -> preload.throttle_ms
    /// - PRELOAD_FAILURE_BACKOFF_MS -> preload.failure_backoff_ms
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("ENGINE_GHOSTSCRIPT_BIN") {
            if !val.is_empty() {
                self.engine.ghostscript_bin = val;
            }
        }

        if let Ok(val) = env::var("ENGINE_STAGING_DIR") {
            if !val.is_empty() {
                self.engine.staging_dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("ENGINE_INVOKE_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.engine.invoke_timeout_secs = secs;
            }
        }

        if let Ok(val) = env::var("PRELOAD_THROTTLE_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.preload.throttle_ms = ms;
            }
        }

        if let Ok(val) = env::var("PRELOAD_FAILURE_BACKOFF_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.preload.failure_backoff_ms = ms;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("ENGINE_GHOSTSCRIPT_BIN");
        env::remove_var("ENGINE_STAGING_DIR");
        env::remove_var("ENGINE_INVOKE_TIMEOUT_SECS");
        env::remove_var("PRELOAD_THROTTLE_MS");
        env::remove_var("PRELOAD_FAILURE_BACKOFF_MS");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            bin in "[a-zA-Z0-9_/.-]{1,30}",
            staging in "[a-zA-Z0-9_/.-]{1,40}",
            timeout in 0u64..3600,
            throttle in 0u64..10_000,
            backoff in 0u64..10_000,
        ) {
            let toml_str = format!(
                r#"
[engine]
ghostscript_bin = "{}"
staging_dir = "{}"
invoke_timeout_secs = {}

[preload]
throttle_ms = {}
failure_backoff_ms = {}
"#,
                bin, staging, timeout, throttle, backoff
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.engine.ghostscript_bin, bin);
            prop_assert_eq!(config.engine.staging_dir, PathBuf::from(staging));
            prop_assert_eq!(config.engine.invoke_timeout_secs, timeout);
            prop_assert_eq!(config.preload.throttle_ms, throttle);
            prop_assert_eq!(config.preload.failure_backoff_ms, backoff);
        }

        #[test]
        fn prop_env_overrides_timeout(
            initial in 0u64..600,
            override_secs in 0u64..3600,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[engine]
invoke_timeout_secs = {}
"#,
                initial
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("ENGINE_INVOKE_TIMEOUT_SECS", override_secs.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.engine.invoke_timeout_secs, override_secs);
        }

        #[test]
        fn prop_env_overrides_throttle(
            initial in 0u64..600,
            override_ms in 0u64..10_000,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[preload]
throttle_ms = {}
"#,
                initial
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("PRELOAD_THROTTLE_MS", override_ms.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.preload.throttle_ms, override_ms);
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.engine.ghostscript_bin, "gs");
        assert_eq!(config.engine.staging_dir, PathBuf::from("/tmp/pdf-press"));
        assert_eq!(config.engine.invoke_timeout_secs, 120);
        assert_eq!(config.preload.throttle_ms, 150);
        assert_eq!(config.preload.failure_backoff_ms, 500);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[engine]
ghostscript_bin = "/opt/gs/bin/gs"
"#;
        let config = Config::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.engine.ghostscript_bin, "/opt/gs/bin/gs");
        assert_eq!(config.engine.staging_dir, PathBuf::from("/tmp/pdf-press")); // default
        assert_eq!(config.engine.invoke_timeout_secs, 120); // default
        assert_eq!(config.preload.throttle_ms, 150); // default
    }

    #[test]
    fn test_env_override_ghostscript_bin() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("ENGINE_GHOSTSCRIPT_BIN", "/usr/local/bin/gs");
        env::set_var("ENGINE_STAGING_DIR", "/var/tmp/press");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.engine.ghostscript_bin, "/usr/local/bin/gs");
        assert_eq!(config.engine.staging_dir, PathBuf::from("/var/tmp/press"));
    }

    #[test]
    fn test_env_override_ignores_invalid_numbers() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("ENGINE_INVOKE_TIMEOUT_SECS", "not-a-number");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.engine.invoke_timeout_secs, 120);
    }
}
