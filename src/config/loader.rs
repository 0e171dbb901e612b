//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::GasConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading and application startup.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Yaml(serde_yaml::Error),
    Toml(toml::de::Error),
    Validation(Vec<ValidationError>),
    Watch(notify::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "IO error reading {}: {}", path.display(), source)
            }
            ConfigError::Yaml(e) => write!(f, "YAML parse error: {}", e),
            ConfigError::Toml(e) => write!(f, "TOML parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
            ConfigError::Watch(e) => write!(f, "Template watcher error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Yaml(e) => Some(e),
            ConfigError::Toml(e) => Some(e),
            ConfigError::Validation(_) => None,
            ConfigError::Watch(e) => Some(e),
        }
    }
}

/// Load and validate configuration from a YAML file.
///
/// Files with a `.toml` extension are parsed as TOML instead. An empty file
/// yields the defaults.
pub fn load_config(path: &Path) -> Result<GasConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config = parse_config(&content, is_toml(path))?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

fn parse_config(content: &str, toml: bool) -> Result<GasConfig, ConfigError> {
    if content.trim().is_empty() {
        return Ok(GasConfig::default());
    }
    if toml {
        toml::from_str(content).map_err(ConfigError::Toml)
    } else {
        serde_yaml::from_str(content).map_err(ConfigError::Yaml)
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}
