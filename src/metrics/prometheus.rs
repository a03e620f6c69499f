//! Prometheus text exposition of a [`MetricsTree`]
//!
//! Output is produced from one help template and one data template per
//! metric group. Defaults are compiled in; any group can be overridden
//! through [`MetricTemplates::with`].

use super::template::{render, TemplateError};
use super::{ActionMetrics, MetricsTree, PruneReport, RepoOutcome};
use crate::config::Config;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use tracing::{debug, error, info, warn};

/// Identifier of a block of related metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricGroup {
    General,
    PreHooks,
    PostHooks,
    Backup,
    BackupRc,
    Forget,
    Prune,
    PruneLegacy,
    Check,
    Stats,
}

impl MetricGroup {
    /// Identifier used in log messages
    pub fn label(self) -> &'static str {
        match self {
            MetricGroup::General => "general",
            MetricGroup::PreHooks => "pre_hooks",
            MetricGroup::PostHooks => "post_hooks",
            MetricGroup::Backup => "backup",
            MetricGroup::BackupRc => "backup_rc",
            MetricGroup::Forget => "forget",
            MetricGroup::Prune => "prune",
            MetricGroup::PruneLegacy => "prune_legacy",
            MetricGroup::Check => "check",
            MetricGroup::Stats => "stats",
        }
    }
}

/// Help preamble and per-entry data lines of one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTemplate {
    pub help: String,
    pub data: String,
}

impl GroupTemplate {
    pub fn new(help: &str, data: &str) -> Self {
        Self {
            help: help.to_string(),
            data: data.to_string(),
        }
    }
}

/// Templates for every metric group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricTemplates {
    groups: HashMap<MetricGroup, GroupTemplate>,
}

impl MetricTemplates {
    /// Replace the templates of one group
    pub fn with(mut self, group: MetricGroup, template: GroupTemplate) -> Self {
        self.groups.insert(group, template);
        self
    }

    pub fn get(&self, group: MetricGroup) -> Option<&GroupTemplate> {
        self.groups.get(&group)
    }
}

impl Default for MetricTemplates {
    fn default() -> Self {
        let groups = [
            (MetricGroup::General, GENERAL_HELP, GENERAL),
            (MetricGroup::PreHooks, PRE_HOOKS_HELP, PRE_HOOKS),
            (MetricGroup::PostHooks, POST_HOOKS_HELP, POST_HOOKS),
            (MetricGroup::Backup, BACKUP_HELP, BACKUP),
            (MetricGroup::BackupRc, "", BACKUP_RC),
            (MetricGroup::Forget, FORGET_HELP, FORGET),
            (MetricGroup::Prune, PRUNE_HELP, PRUNE),
            (MetricGroup::PruneLegacy, PRUNE_LEGACY_HELP, PRUNE_LEGACY),
            (MetricGroup::Check, CHECK_HELP, CHECK),
            (MetricGroup::Stats, STATS_HELP, STATS),
        ]
        .into_iter()
        .map(|(group, help, data)| (group, GroupTemplate::new(help, data)))
        .collect();

        Self { groups }
    }
}

/// Renders a metrics tree into exposition-format lines
#[derive(Debug, Clone, Default)]
pub struct PrometheusExporter {
    templates: MetricTemplates,
}

/// Accumulates rendered text as individual lines
#[derive(Default)]
struct Lines(Vec<String>);

impl Lines {
    fn push_text(&mut self, text: &str) {
        self.0.extend(
            text.lines()
                .map(str::trim_end)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }
}

impl PrometheusExporter {
    pub fn new(templates: MetricTemplates) -> Self {
        Self { templates }
    }

    /// All lines for the tree, general block first, then one block per
    /// action present in the tree
    pub fn generate_lines(&self, tree: &MetricsTree, name: &str) -> Vec<String> {
        let mut lines = Lines::default();

        self.help(&mut lines, MetricGroup::General);
        let general = json!({
            "name": label_value(name),
            "last_run": tree.last_run,
            "errors": tree.errors,
            "total_duration_seconds": tree.total_duration_seconds,
        });
        self.data(&mut lines, MetricGroup::General, &general);

        if let Some(ref backup) = tree.backup {
            self.help(&mut lines, MetricGroup::Backup);
            if backup.pre_hooks.is_some() {
                self.help(&mut lines, MetricGroup::PreHooks);
            }
            if backup.post_hooks.is_some() {
                self.help(&mut lines, MetricGroup::PostHooks);
            }
            if let Some(ref hooks) = backup.pre_hooks {
                self.entry(&mut lines, MetricGroup::PreHooks, name, None, hooks);
            }
            if let Some(ref hooks) = backup.post_hooks {
                self.entry(&mut lines, MetricGroup::PostHooks, name, None, hooks);
            }

            for (repo, outcome) in backup.repositories.iter() {
                match outcome {
                    RepoOutcome::Parsed(metrics) if metrics.rc == 0 => {
                        self.entry(&mut lines, MetricGroup::Backup, name, Some(repo), metrics);
                    }
                    RepoOutcome::Parsed(metrics) => {
                        self.backup_rc(&mut lines, name, repo, metrics.rc);
                    }
                    RepoOutcome::Failed { rc } => self.backup_rc(&mut lines, name, repo, *rc),
                }
            }
        }

        if let Some(ref forget) = tree.forget {
            self.action(&mut lines, MetricGroup::Forget, name, forget);
        }

        if let Some(ref prune) = tree.prune {
            let has_current = prune
                .iter()
                .any(|(_, o)| matches!(o, RepoOutcome::Parsed(PruneReport::Current(_))));
            let has_legacy = prune
                .iter()
                .any(|(_, o)| matches!(o, RepoOutcome::Parsed(PruneReport::Legacy(_))));

            if has_current || !has_legacy {
                self.help(&mut lines, MetricGroup::Prune);
            }
            if has_legacy {
                self.help(&mut lines, MetricGroup::PruneLegacy);
            }
            for (repo, outcome) in prune.iter() {
                match outcome {
                    RepoOutcome::Parsed(PruneReport::Current(metrics)) => {
                        self.entry(&mut lines, MetricGroup::Prune, name, Some(repo), metrics);
                    }
                    RepoOutcome::Parsed(PruneReport::Legacy(metrics)) => {
                        self.entry(&mut lines, MetricGroup::PruneLegacy, name, Some(repo), metrics);
                    }
                    RepoOutcome::Failed { rc } => {
                        skip_failed(MetricGroup::Prune, repo, *rc)
                    }
                }
            }
        }

        if let Some(ref check) = tree.check {
            self.action(&mut lines, MetricGroup::Check, name, check);
        }

        if let Some(ref stats) = tree.stats {
            self.action(&mut lines, MetricGroup::Stats, name, stats);
        }

        lines.0
    }

    /// Help plus one data block per parsed repository
    fn action<T: Serialize>(
        &self,
        lines: &mut Lines,
        group: MetricGroup,
        name: &str,
        metrics: &ActionMetrics<T>,
    ) {
        self.help(lines, group);
        for (repo, outcome) in metrics.iter() {
            match outcome {
                RepoOutcome::Parsed(m) => self.entry(lines, group, name, Some(repo), m),
                RepoOutcome::Failed { rc } => skip_failed(group, repo, *rc),
            }
        }
    }

    fn help(&self, lines: &mut Lines, group: MetricGroup) {
        if let Some(template) = self.templates.get(group) {
            lines.push_text(&template.help);
        }
    }

    fn data(&self, lines: &mut Lines, group: MetricGroup, context: &Value) {
        let Some(template) = self.templates.get(group) else {
            return;
        };
        match render(&template.data, context) {
            Ok(text) => lines.push_text(&text),
            Err(e) => template_failed(group, e),
        }
    }

    fn entry<T: Serialize>(
        &self,
        lines: &mut Lines,
        group: MetricGroup,
        name: &str,
        repository: Option<&str>,
        metrics: &T,
    ) {
        let mut context = match serde_json::to_value(metrics) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                error!("Cannot export {} metrics of {:?}", group.label(), repository);
                return;
            }
        };
        context.insert("name".to_string(), Value::from(label_value(name)));
        if let Some(repo) = repository {
            context.insert("repository".to_string(), Value::from(label_value(repo)));
        }
        self.data(lines, group, &Value::Object(context));
    }

    fn backup_rc(&self, lines: &mut Lines, name: &str, repo: &str, rc: i32) {
        let context = json!({
            "name": label_value(name),
            "repository": label_value(repo),
            "rc": rc,
        });
        self.data(lines, MetricGroup::BackupRc, &context);
    }
}

fn skip_failed(group: MetricGroup, repo: &str, rc: i32) {
    warn!(
        "No {} metrics exported for {}: restic exited with {}",
        group.label(),
        repo,
        rc
    );
}

fn template_failed(group: MetricGroup, e: TemplateError) {
    error!("Failed to render {} metrics: {}", group.label(), e);
}

/// Escape a label value for the exposition format
fn label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Write the metrics of a run to the configured Prometheus file
///
/// Does nothing unless `metrics.prometheus.path` is configured.
pub fn write_metrics(tree: &MetricsTree, config: &Config) -> Result<()> {
    write_metrics_with(&PrometheusExporter::default(), tree, config)
}

/// [`write_metrics`] with a custom exporter
pub fn write_metrics_with(
    exporter: &PrometheusExporter,
    tree: &MetricsTree,
    config: &Config,
) -> Result<()> {
    let Some(path) = config
        .metrics
        .prometheus
        .as_ref()
        .and_then(|p| p.path.as_ref())
    else {
        debug!("No Prometheus path configured, metrics not written");
        return Ok(());
    };

    let mut text = exporter.generate_lines(tree, &config.name).join("\n");
    text.push('\n');

    fs::write(path, text)
        .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    info!("Metrics written to {}", path.display());
    Ok(())
}

const GENERAL_HELP: &str = "\
# HELP restic_last_run Epoch timestamp of the last run
# TYPE restic_last_run gauge
# HELP restic_total_duration_seconds Total duration in seconds
# TYPE restic_total_duration_seconds gauge
# HELP restic_total_errors Total amount of errors within the last run
# TYPE restic_total_errors gauge
";

const GENERAL: &str = r#"
restic_last_run{{config="{name}"}} {last_run}
restic_total_duration_seconds{{config="{name}"}} {total_duration_seconds}
restic_total_errors{{config="{name}"}} {errors}
"#;

const PRE_HOOKS_HELP: &str = "\
# HELP restic_pre_hooks_duration_seconds Time spent running the pre-backup hooks
# TYPE restic_pre_hooks_duration_seconds gauge
# HELP restic_pre_hooks_rc Return code of the pre-backup hooks
# TYPE restic_pre_hooks_rc gauge
";

const PRE_HOOKS: &str = r#"
restic_pre_hooks_duration_seconds{{config="{name}"}} {duration_seconds}
restic_pre_hooks_rc{{config="{name}"}} {rc}
"#;

const POST_HOOKS_HELP: &str = "\
# HELP restic_post_hooks_duration_seconds Time spent running the post-backup hooks
# TYPE restic_post_hooks_duration_seconds gauge
# HELP restic_post_hooks_rc Return code of the post-backup hooks
# TYPE restic_post_hooks_rc gauge
";

const POST_HOOKS: &str = r#"
restic_post_hooks_duration_seconds{{config="{name}"}} {duration_seconds}
restic_post_hooks_rc{{config="{name}"}} {rc}
"#;

const BACKUP_HELP: &str = "\
# HELP restic_backup_files_new Number of new files
# TYPE restic_backup_files_new gauge
# HELP restic_backup_files_changed Number of changed files
# TYPE restic_backup_files_changed gauge
# HELP restic_backup_files_unmodified Number of unmodified files
# TYPE restic_backup_files_unmodified gauge
# HELP restic_backup_dirs_new Number of new directories
# TYPE restic_backup_dirs_new gauge
# HELP restic_backup_dirs_changed Number of changed directories
# TYPE restic_backup_dirs_changed gauge
# HELP restic_backup_dirs_unmodified Number of unmodified directories
# TYPE restic_backup_dirs_unmodified gauge
# HELP restic_backup_processed_files Number of processed files
# TYPE restic_backup_processed_files gauge
# HELP restic_backup_processed_size_bytes Size of processed files in bytes
# TYPE restic_backup_processed_size_bytes gauge
# HELP restic_backup_processed_duration_seconds Time restic reported for processing
# TYPE restic_backup_processed_duration_seconds gauge
# HELP restic_backup_added_to_repo Bytes added to the repository
# TYPE restic_backup_added_to_repo gauge
# HELP restic_backup_duration_seconds Wall-clock duration of the backup
# TYPE restic_backup_duration_seconds gauge
# HELP restic_backup_rc Return code of the restic backup command
# TYPE restic_backup_rc gauge
";

const BACKUP: &str = r#"
restic_backup_files_new{{config="{name}",repository="{repository}"}} {files.new}
restic_backup_files_changed{{config="{name}",repository="{repository}"}} {files.changed}
restic_backup_files_unmodified{{config="{name}",repository="{repository}"}} {files.unmodified}
restic_backup_dirs_new{{config="{name}",repository="{repository}"}} {dirs.new}
restic_backup_dirs_changed{{config="{name}",repository="{repository}"}} {dirs.changed}
restic_backup_dirs_unmodified{{config="{name}",repository="{repository}"}} {dirs.unmodified}
restic_backup_processed_files{{config="{name}",repository="{repository}"}} {processed.files}
restic_backup_processed_size_bytes{{config="{name}",repository="{repository}"}} {processed.size_bytes}
restic_backup_processed_duration_seconds{{config="{name}",repository="{repository}"}} {processed.duration_seconds}
restic_backup_added_to_repo{{config="{name}",repository="{repository}"}} {added_to_repo}
restic_backup_duration_seconds{{config="{name}",repository="{repository}"}} {duration_seconds}
"#;

const BACKUP_RC: &str = r#"restic_backup_rc{{config="{name}",repository="{repository}"}} {rc}"#;

const FORGET_HELP: &str = "\
# HELP restic_forget_removed_snapshots Number of forgotten snapshots
# TYPE restic_forget_removed_snapshots gauge
# HELP restic_forget_duration_seconds Wall-clock duration of the forget
# TYPE restic_forget_duration_seconds gauge
# HELP restic_forget_rc Return code of the restic forget command
# TYPE restic_forget_rc gauge
";

const FORGET: &str = r#"
restic_forget_removed_snapshots{{config="{name}",repository="{repository}"}} {removed_snapshots}
restic_forget_duration_seconds{{config="{name}",repository="{repository}"}} {duration_seconds}
restic_forget_rc{{config="{name}",repository="{repository}"}} {rc}
"#;

const PRUNE_HELP: &str = "\
# HELP restic_prune_to_repack_blobs Blobs to repack
# TYPE restic_prune_to_repack_blobs gauge
# HELP restic_prune_to_repack_bytes Bytes to repack
# TYPE restic_prune_to_repack_bytes gauge
# HELP restic_prune_removed_blobs Blobs removed by repacking
# TYPE restic_prune_removed_blobs gauge
# HELP restic_prune_removed_bytes Bytes removed by repacking
# TYPE restic_prune_removed_bytes gauge
# HELP restic_prune_to_delete_blobs Blobs to delete
# TYPE restic_prune_to_delete_blobs gauge
# HELP restic_prune_to_delete_bytes Bytes to delete
# TYPE restic_prune_to_delete_bytes gauge
# HELP restic_prune_total_prune_blobs Total blobs pruned
# TYPE restic_prune_total_prune_blobs gauge
# HELP restic_prune_total_prune_bytes Total bytes pruned
# TYPE restic_prune_total_prune_bytes gauge
# HELP restic_prune_remaining_blobs Blobs remaining in the repository
# TYPE restic_prune_remaining_blobs gauge
# HELP restic_prune_remaining_bytes Bytes remaining in the repository
# TYPE restic_prune_remaining_bytes gauge
# HELP restic_prune_remaining_unused_size Unused bytes remaining after prune
# TYPE restic_prune_remaining_unused_size gauge
# HELP restic_prune_duration_seconds Wall-clock duration of the prune
# TYPE restic_prune_duration_seconds gauge
# HELP restic_prune_rc Return code of the restic prune command
# TYPE restic_prune_rc gauge
";

const PRUNE: &str = r#"
restic_prune_to_repack_blobs{{config="{name}",repository="{repository}"}} {to_repack_blobs}
restic_prune_to_repack_bytes{{config="{name}",repository="{repository}"}} {to_repack_bytes}
restic_prune_removed_blobs{{config="{name}",repository="{repository}"}} {removed_blobs}
restic_prune_removed_bytes{{config="{name}",repository="{repository}"}} {removed_bytes}
restic_prune_to_delete_blobs{{config="{name}",repository="{repository}"}} {to_delete_blobs}
restic_prune_to_delete_bytes{{config="{name}",repository="{repository}"}} {to_delete_bytes}
restic_prune_total_prune_blobs{{config="{name}",repository="{repository}"}} {total_prune_blobs}
restic_prune_total_prune_bytes{{config="{name}",repository="{repository}"}} {total_prune_bytes}
restic_prune_remaining_blobs{{config="{name}",repository="{repository}"}} {remaining_blobs}
restic_prune_remaining_bytes{{config="{name}",repository="{repository}"}} {remaining_bytes}
restic_prune_remaining_unused_size{{config="{name}",repository="{repository}"}} {remaining_unused_size}
restic_prune_duration_seconds{{config="{name}",repository="{repository}"}} {duration_seconds}
restic_prune_rc{{config="{name}",repository="{repository}"}} {rc}
"#;

const PRUNE_LEGACY_HELP: &str = "\
# HELP restic_prune_containing_packs_before Packs in the repository before pruning
# TYPE restic_prune_containing_packs_before gauge
# HELP restic_prune_containing_blobs Blobs in the repository before pruning
# TYPE restic_prune_containing_blobs gauge
# HELP restic_prune_containing_size_bytes Repository size before pruning
# TYPE restic_prune_containing_size_bytes gauge
# HELP restic_prune_duplicate_blobs Duplicate blobs found
# TYPE restic_prune_duplicate_blobs gauge
# HELP restic_prune_duplicate_size_bytes Size of duplicate blobs
# TYPE restic_prune_duplicate_size_bytes gauge
# HELP restic_prune_in_use_blobs Blobs still in use
# TYPE restic_prune_in_use_blobs gauge
# HELP restic_prune_legacy_removed_blobs Blobs removed
# TYPE restic_prune_legacy_removed_blobs gauge
# HELP restic_prune_invalid_files Invalid files removed
# TYPE restic_prune_invalid_files gauge
# HELP restic_prune_deleted_packs Packs deleted
# TYPE restic_prune_deleted_packs gauge
# HELP restic_prune_rewritten_packs Packs rewritten
# TYPE restic_prune_rewritten_packs gauge
# HELP restic_prune_size_freed_bytes Bytes freed
# TYPE restic_prune_size_freed_bytes gauge
# HELP restic_prune_removed_index_files Old index files removed
# TYPE restic_prune_removed_index_files gauge
# HELP restic_prune_legacy_duration_seconds Wall-clock duration of the prune
# TYPE restic_prune_legacy_duration_seconds gauge
# HELP restic_prune_legacy_rc Return code of the restic prune command
# TYPE restic_prune_legacy_rc gauge
";

const PRUNE_LEGACY: &str = r#"
restic_prune_containing_packs_before{{config="{name}",repository="{repository}"}} {containing_packs_before}
restic_prune_containing_blobs{{config="{name}",repository="{repository}"}} {containing_blobs}
restic_prune_containing_size_bytes{{config="{name}",repository="{repository}"}} {containing_size_bytes}
restic_prune_duplicate_blobs{{config="{name}",repository="{repository}"}} {duplicate_blobs}
restic_prune_duplicate_size_bytes{{config="{name}",repository="{repository}"}} {duplicate_size_bytes}
restic_prune_in_use_blobs{{config="{name}",repository="{repository}"}} {in_use_blobs}
restic_prune_legacy_removed_blobs{{config="{name}",repository="{repository}"}} {removed_blobs}
restic_prune_invalid_files{{config="{name}",repository="{repository}"}} {invalid_files}
restic_prune_deleted_packs{{config="{name}",repository="{repository}"}} {deleted_packs}
restic_prune_rewritten_packs{{config="{name}",repository="{repository}"}} {rewritten_packs}
restic_prune_size_freed_bytes{{config="{name}",repository="{repository}"}} {size_freed_bytes}
restic_prune_removed_index_files{{config="{name}",repository="{repository}"}} {removed_index_files}
restic_prune_legacy_duration_seconds{{config="{name}",repository="{repository}"}} {duration_seconds}
restic_prune_legacy_rc{{config="{name}",repository="{repository}"}} {rc}
"#;

const CHECK_HELP: &str = "\
# HELP restic_check_errors Whether the check reported errors
# TYPE restic_check_errors gauge
# HELP restic_check_errors_data Whether the check found corrupted packs
# TYPE restic_check_errors_data gauge
# HELP restic_check_errors_snapshots Whether the check failed to load snapshots
# TYPE restic_check_errors_snapshots gauge
# HELP restic_check_read_data Whether pack data was read
# TYPE restic_check_read_data gauge
# HELP restic_check_check_unused Whether unused blobs were checked
# TYPE restic_check_check_unused gauge
# HELP restic_check_duration_seconds Wall-clock duration of the check
# TYPE restic_check_duration_seconds gauge
# HELP restic_check_rc Return code of the restic check command
# TYPE restic_check_rc gauge
";

const CHECK: &str = r#"
restic_check_errors{{config="{name}",repository="{repository}"}} {errors}
restic_check_errors_data{{config="{name}",repository="{repository}"}} {errors_data}
restic_check_errors_snapshots{{config="{name}",repository="{repository}"}} {errors_snapshots}
restic_check_read_data{{config="{name}",repository="{repository}"}} {read_data}
restic_check_check_unused{{config="{name}",repository="{repository}"}} {check_unused}
restic_check_duration_seconds{{config="{name}",repository="{repository}"}} {duration_seconds}
restic_check_rc{{config="{name}",repository="{repository}"}} {rc}
"#;

const STATS_HELP: &str = "\
# HELP restic_stats_total_file_count Number of files in the repository
# TYPE restic_stats_total_file_count gauge
# HELP restic_stats_total_size_bytes Restore size of the repository in bytes
# TYPE restic_stats_total_size_bytes gauge
# HELP restic_stats_duration_seconds Wall-clock duration of the stats
# TYPE restic_stats_duration_seconds gauge
# HELP restic_stats_rc Return code of the restic stats command
# TYPE restic_stats_rc gauge
";

const STATS: &str = r#"
restic_stats_total_file_count{{config="{name}",repository="{repository}"}} {total_file_count}
restic_stats_total_size_bytes{{config="{name}",repository="{repository}"}} {total_size_bytes}
restic_stats_duration_seconds{{config="{name}",repository="{repository}"}} {duration_seconds}
restic_stats_rc{{config="{name}",repository="{repository}"}} {rc}
"#;
