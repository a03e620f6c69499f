use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Name used as the `config` label of exported metrics.
    /// Defaults to the configuration file name when loaded from disk.
    #[serde(default)]
    pub name: String,

    /// Repositories to operate on, in the order they are processed
    pub repositories: Vec<String>,

    /// Restic binary to invoke
    #[serde(default = "default_restic_binary")]
    pub restic_binary: String,

    /// Environment overlay passed to every restic invocation
    #[serde(default)]
    pub environment: HashMap<String, String>,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub prune: PruneConfig,

    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

impl Config {
    /// Minimal configuration for a set of repositories, everything else defaulted
    pub fn for_repositories<I, S>(name: &str, repositories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            repositories: repositories.into_iter().map(Into::into).collect(),
            restic_binary: default_restic_binary(),
            environment: HashMap::new(),
            execution: ExecutionConfig::default(),
            backup: BackupConfig::default(),
            prune: PruneConfig::default(),
            check: CheckConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LogConfig::default(),
        }
    }

    /// Replacement used when redacting passwords from logs and metric labels
    pub fn password_replacement(&self) -> &str {
        self.metrics
            .prometheus
            .as_ref()
            .and_then(|p| p.password_replacement.as_deref())
            .unwrap_or(DEFAULT_PASSWORD_REPLACEMENT)
    }
}

pub const DEFAULT_PASSWORD_REPLACEMENT: &str = "******";

/// How restic invocations are scheduled
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Skip remaining actions once an action had a failing repository
    #[serde(default = "default_exit_on_error")]
    pub exit_on_error: bool,

    /// Run the repositories of one action concurrently
    #[serde(default)]
    pub parallel: bool,

    /// Additional attempts for a command exiting non-zero
    #[serde(default)]
    pub retry_count: u32,

    /// Delay between attempts, e.g. "0:30" or "1:00 exponential"
    #[serde(default)]
    pub retry_backoff: Option<String>,

    /// Upper bound for a single invocation
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            exit_on_error: default_exit_on_error(),
            parallel: false,
            retry_count: 0,
            retry_backoff: None,
            timeout_seconds: None,
        }
    }
}

/// Backup sources, excludes and hooks
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BackupConfig {
    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    #[serde(default)]
    pub exclude_files: Vec<String>,

    #[serde(default)]
    pub exclude_if_present: Vec<String>,

    /// Shell commands run once before the backup of all repositories
    #[serde(default)]
    pub pre_hooks: Vec<String>,

    /// Shell commands run once after the backup of all repositories
    #[serde(default)]
    pub post_hooks: Vec<String>,
}

/// Retention policy handed to `restic forget`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PruneConfig {
    #[serde(default, rename = "group-by")]
    pub group_by: Option<String>,

    /// `keep-*` options, passed as `--keep-*` flags
    #[serde(flatten)]
    pub retention: BTreeMap<String, RetentionValue>,
}

impl PruneConfig {
    /// Command line flags for `restic forget`
    pub fn forget_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();

        for (key, value) in self.retention.iter().filter(|(k, _)| k.starts_with("keep-")) {
            match value {
                RetentionValue::Count(n) => {
                    flags.push(format!("--{}", key));
                    flags.push(n.to_string());
                }
                RetentionValue::Text(s) => {
                    flags.push(format!("--{}", key));
                    flags.push(s.clone());
                }
                RetentionValue::List(items) => {
                    for item in items {
                        flags.push(format!("--{}", key));
                        flags.push(item.clone());
                    }
                }
            }
        }

        if let Some(ref group_by) = self.group_by {
            flags.push("--group-by".to_string());
            flags.push(group_by.clone());
        }

        flags
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RetentionValue {
    Count(u64),
    Text(String),
    List(Vec<String>),
}

/// Optional sub-checks of `restic check`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CheckConfig {
    #[serde(default)]
    pub checks: Vec<String>,
}

impl CheckConfig {
    pub fn check_unused(&self) -> bool {
        self.checks.iter().any(|c| c == "check-unused")
    }

    pub fn read_data(&self) -> bool {
        self.checks.iter().any(|c| c == "read-data")
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub prometheus: Option<PrometheusConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PrometheusConfig {
    /// Destination of the exposition-format file
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub password_replacement: Option<String>,
}

/// Optional file logging
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_log_max_files")]
    pub max_files: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_files: default_log_max_files(),
        }
    }
}

// Default value functions

fn default_restic_binary() -> String { "restic".to_string() }
fn default_exit_on_error() -> bool { true }
fn default_log_max_files() -> u32 { 10 }
