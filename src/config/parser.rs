use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use std::path::{Path, PathBuf};

/// Command-line overrides applied on top of the file configuration
///
/// Every field is optional; `None` keeps the value from the file (or the
/// built-in default when no file is given).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_connections: Option<u32>,
    pub connect_timeout: Option<u64>,
    pub sleep_interval: Option<u64>,
    pub reconnect_max_attempts: Option<u32>,
    pub reconnect_delay: Option<f64>,
    pub base_url: Option<String>,
    pub topics_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Applies the overrides to `config` in place
    pub fn apply(self, config: &mut Config) {
        if let Some(v) = self.max_connections {
            config.crawler.max_connections = v;
        }
        if let Some(v) = self.connect_timeout {
            config.crawler.connect_timeout = v;
        }
        if let Some(v) = self.sleep_interval {
            config.crawler.sleep_interval = v;
        }
        if let Some(v) = self.reconnect_max_attempts {
            config.crawler.reconnect_max_attempts = v;
        }
        if let Some(v) = self.reconnect_delay {
            config.crawler.reconnect_delay = v;
        }
        if let Some(v) = self.base_url {
            config.site.base_url = v;
        }
        if let Some(v) = self.topics_dir {
            config.output.topics_dir = v;
        }
    }
}

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use topic_ripple::config::load_config;
///
/// let config = load_config(Path::new("ripple.toml")).unwrap();
/// println!("Per-host connections: {}", config.crawler.max_connections);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Resolves the effective configuration from an optional file and CLI overrides
///
/// Validation runs once, after the overrides are applied, so a file value
/// that is corrected on the command line does not cause an error.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => Config::default(),
    };

    overrides.apply(&mut config);
    validate(&config)?;
    Ok(config)
}
