use super::types::*;
use crate::utils::process::Backoff;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML file: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Failed to parse JSON file: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate configuration from a TOML or JSON file
///
/// The format is chosen by extension; anything but `.json` is read as TOML.
/// A missing `name` falls back to the file name.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let mut config: Config = if is_json {
        serde_json::from_str(&contents)?
    } else {
        toml::from_str(&contents)?
    };

    if config.name.is_empty() {
        config.name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    validate_config(&config)?;
    Ok(config)
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.repositories.is_empty() {
        return Err(ConfigError::ValidationError(
            "No repositories defined".to_string(),
        ));
    }

    if let Some(ref backoff) = config.execution.retry_backoff {
        if Backoff::parse(backoff).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "Invalid retry_backoff '{}': expected e.g. \"0:30\" or \"1:00 exponential\"",
                backoff
            )));
        }
    }

    Ok(())
}

/// Locations searched for configuration when none is given explicitly
pub fn possible_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("/etc/runrestic.toml"),
        PathBuf::from("/etc/runrestic.json"),
        PathBuf::from("/etc/runrestic/"),
    ];

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("runrestic/"));
    }

    paths
}

/// Resolve candidate locations to usable configuration files
///
/// Directories contribute their `*.toml` and `*.json` files (sorted).
/// Files with permissions open to group or others are skipped.
pub fn configuration_file_paths(candidates: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for candidate in candidates {
        if candidate.is_file() {
            files.push(candidate.clone());
            continue;
        }

        if !candidate.is_dir() {
            continue;
        }

        let mut entries: Vec<PathBuf> = match fs::read_dir(candidate) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_file())
                .filter(|path| {
                    path.extension()
                        .map(|ext| ext == "toml" || ext == "json")
                        .unwrap_or(false)
                })
                .collect(),
            Err(e) => {
                warn!("Cannot read configuration directory {:?}: {}", candidate, e);
                continue;
            }
        };
        entries.sort();
        files.extend(entries);
    }

    files.retain(|path| permissions_ok(path));
    debug!("Configuration files found: {:?}", files);
    files
}

#[cfg(unix)]
fn permissions_ok(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    let mode = match fs::metadata(path) {
        Ok(meta) => meta.permissions().mode() & 0o777,
        Err(_) => return false,
    };

    if mode & 0o077 != 0 {
        warn!(
            "NOT using {}. File permissions are too open ({:04o}). You should set it to 0600: `chmod 0600 {}`",
            path.display(),
            mode,
            path.display()
        );
        return false;
    }

    true
}

#[cfg(not(unix))]
fn permissions_ok(_path: &Path) -> bool {
    true
}
