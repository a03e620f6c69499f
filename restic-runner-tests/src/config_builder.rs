//! Fluent API for building test configurations
//!
//! Provides a builder pattern for creating test configurations with sensible defaults.

use restic_runner::config::{Config, PrometheusConfig, RetentionValue};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    config: Config,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder without repositories
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        Self {
            temp_dir,
            config: Config::for_repositories("test", Vec::<String>::new()),
        }
    }

    /// Create a minimal config with one local repository and a password
    pub fn minimal() -> Self {
        Self::new()
            .add_local_repository("repo1")
            .password("test-password-123")
    }

    pub fn name(mut self, name: &str) -> Self {
        self.config.name = name.to_string();
        self
    }

    pub fn add_repository(mut self, repository: &str) -> Self {
        self.config.repositories.push(repository.to_string());
        self
    }

    /// Add a repository directory inside the temp dir
    pub fn add_local_repository(mut self, name: &str) -> Self {
        let path = self.temp_dir.path().join(name);
        fs::create_dir_all(&path).expect("Failed to create repository dir");
        self.config.repositories.push(path.display().to_string());
        self
    }

    /// Set `RESTIC_PASSWORD` in the environment overlay
    pub fn password(self, password: &str) -> Self {
        self.env("RESTIC_PASSWORD", password)
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config
            .environment
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn restic_binary(mut self, path: &Path) -> Self {
        self.config.restic_binary = path.display().to_string();
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.execution.parallel = parallel;
        self
    }

    pub fn retry(mut self, count: u32, backoff: Option<&str>) -> Self {
        self.config.execution.retry_count = count;
        self.config.execution.retry_backoff = backoff.map(str::to_string);
        self
    }

    pub fn exit_on_error(mut self, exit_on_error: bool) -> Self {
        self.config.execution.exit_on_error = exit_on_error;
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.config.execution.timeout_seconds = Some(seconds);
        self
    }

    pub fn sources(mut self, sources: &[&str]) -> Self {
        self.config.backup.sources = sources.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.config.backup.exclude_patterns.push(pattern.to_string());
        self
    }

    pub fn pre_hook(mut self, command: &str) -> Self {
        self.config.backup.pre_hooks.push(command.to_string());
        self
    }

    pub fn post_hook(mut self, command: &str) -> Self {
        self.config.backup.post_hooks.push(command.to_string());
        self
    }

    /// Add a `keep-*` retention option
    pub fn keep(mut self, key: &str, value: RetentionValue) -> Self {
        self.config.prune.retention.insert(key.to_string(), value);
        self
    }

    pub fn checks(mut self, checks: &[&str]) -> Self {
        self.config.check.checks = checks.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Export Prometheus metrics to `metrics.prom` in the temp dir
    pub fn prometheus(mut self) -> Self {
        self.config.metrics.prometheus = Some(PrometheusConfig {
            path: Some(self.temp_dir.path().join("metrics.prom")),
            password_replacement: None,
        });
        self
    }

    pub fn password_replacement(mut self, replacement: &str) -> Self {
        let prometheus = self
            .config
            .metrics
            .prometheus
            .get_or_insert_with(PrometheusConfig::default);
        prometheus.password_replacement = Some(replacement.to_string());
        self
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Build the configuration (the temp dir is removed)
    pub fn build(self) -> Config {
        self.config
    }

    /// Build the configuration and keep the temp dir alive
    pub fn persist(self) -> (Config, TempDir) {
        (self.config, self.temp_dir)
    }

    /// Write the configuration as JSON with owner-only permissions
    pub fn write(self, file_name: &str) -> (PathBuf, Config, TempDir) {
        let path = self.temp_dir.path().join(file_name);
        let json = serde_json::to_string_pretty(&self.config).expect("Failed to serialize config");
        fs::write(&path, json).expect("Failed to write config");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
                .expect("Failed to set config permissions");
        }

        (path, self.config, self.temp_dir)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
