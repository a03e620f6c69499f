//! Aggregated metrics of one run
//!
//! The tree is keyed by action, then by repository. Every repository entry
//! is either the parsed metrics of that action or, when restic failed and no
//! parsing was attempted, just the return code (`{"rc": n}`).

pub mod prometheus;
pub mod template;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

pub use prometheus::{write_metrics, MetricGroup, MetricTemplates, PrometheusExporter};

/// Counters reported by restic for files or directories
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeCounts {
    pub new: u64,
    pub changed: u64,
    pub unmodified: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessedSummary {
    pub files: u64,
    pub size_bytes: f64,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackupMetrics {
    pub files: ChangeCounts,
    pub dirs: ChangeCounts,
    pub processed: ProcessedSummary,
    pub added_to_repo: f64,
    pub duration_seconds: f64,
    pub rc: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForgetMetrics {
    pub removed_snapshots: u64,
    pub duration_seconds: f64,
    pub rc: i32,
}

/// Prune report of restic before 0.12
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LegacyPruneMetrics {
    pub containing_packs_before: u64,
    pub containing_blobs: u64,
    pub containing_size_bytes: f64,
    pub duplicate_blobs: u64,
    pub duplicate_size_bytes: f64,
    pub in_use_blobs: u64,
    pub removed_blobs: u64,
    pub invalid_files: u64,
    pub deleted_packs: u64,
    pub rewritten_packs: u64,
    pub size_freed_bytes: f64,
    pub removed_index_files: u64,
    pub duration_seconds: f64,
    pub rc: i32,
}

/// Prune report of restic 0.12 and later
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PruneMetrics {
    pub to_repack_blobs: u64,
    pub to_repack_bytes: f64,
    pub removed_blobs: u64,
    pub removed_bytes: f64,
    pub to_delete_blobs: u64,
    pub to_delete_bytes: f64,
    pub total_prune_blobs: u64,
    pub total_prune_bytes: f64,
    pub remaining_blobs: u64,
    pub remaining_bytes: f64,
    pub remaining_unused_size: f64,
    pub duration_seconds: f64,
    pub rc: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PruneReport {
    Current(PruneMetrics),
    Legacy(LegacyPruneMetrics),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckMetrics {
    pub errors: u8,
    pub errors_data: u8,
    pub errors_snapshots: u8,
    pub read_data: u8,
    pub check_unused: u8,
    pub duration_seconds: f64,
    pub rc: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsMetrics {
    pub total_file_count: u64,
    pub total_size_bytes: u64,
    pub duration_seconds: f64,
    pub rc: i32,
}

/// Timing and return code of a command without content metrics
/// (hooks, init, unlock)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandMetrics {
    pub duration_seconds: f64,
    pub rc: i32,
}

/// Result recorded for one repository
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RepoOutcome<T> {
    Parsed(T),
    Failed { rc: i32 },
}

/// Per-repository results of one action, in submission order
#[derive(Debug, Clone, PartialEq)]
pub struct ActionMetrics<T> {
    entries: Vec<(String, RepoOutcome<T>)>,
}

impl<T> Default for ActionMetrics<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> ActionMetrics<T> {
    pub fn insert(&mut self, repository: impl Into<String>, outcome: RepoOutcome<T>) {
        self.entries.push((repository.into(), outcome));
    }

    /// Latest outcome recorded for a repository
    pub fn get(&self, repository: &str) -> Option<&RepoOutcome<T>> {
        self.entries
            .iter()
            .rev()
            .find(|(repo, _)| repo == repository)
            .map(|(_, outcome)| outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RepoOutcome<T>)> {
        self.entries.iter().map(|(repo, outcome)| (repo.as_str(), outcome))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Serialize> Serialize for ActionMetrics<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (repo, outcome) in &self.entries {
            map.serialize_entry(repo, outcome)?;
        }
        map.end()
    }
}

/// Backup results plus the hook pseudo-repositories
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackupSection {
    #[serde(rename = "_restic_pre_hooks", skip_serializing_if = "Option::is_none")]
    pub pre_hooks: Option<CommandMetrics>,
    #[serde(rename = "_restic_post_hooks", skip_serializing_if = "Option::is_none")]
    pub post_hooks: Option<CommandMetrics>,
    #[serde(flatten)]
    pub repositories: ActionMetrics<BackupMetrics>,
}

/// Everything collected during one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsTree {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init: Option<ActionMetrics<CommandMetrics>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forget: Option<ActionMetrics<ForgetMetrics>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prune: Option<ActionMetrics<PruneReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<ActionMetrics<CheckMetrics>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ActionMetrics<StatsMetrics>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock: Option<ActionMetrics<CommandMetrics>>,
    /// Non-zero return codes observed, hooks included
    pub errors: u32,
    /// Epoch seconds of the run start
    pub last_run: f64,
    pub total_duration_seconds: f64,
}
