//! Configuration module for restic-runner
//!
//! Configuration is read from TOML or JSON files. A file describes one set of
//! repositories that share an environment, execution policy and per-action
//! settings.
//!
//! ## Discovery
//!
//! Without an explicit path, files are looked up in this order:
//! 1. `/etc/runrestic.toml`, `/etc/runrestic.json`
//! 2. every `*.toml`/`*.json` in `/etc/runrestic/`
//! 3. every `*.toml`/`*.json` in `$XDG_CONFIG_HOME/runrestic/`
//!
//! ## Example Usage
//!
//! ```no_run
//! use restic_runner::config;
//!
//! let config = config::load_config("/etc/runrestic/nightly.toml")?;
//! for repo in &config.repositories {
//!     println!("Repository: {}", repo);
//! }
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{
    configuration_file_paths, load_config, possible_config_paths, validate_config, ConfigError,
    Result,
};
pub use types::*;
