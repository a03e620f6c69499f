//! Tests for the Prometheus exporter

use restic_runner::metrics::prometheus::{write_metrics_with, GroupTemplate};
use restic_runner::metrics::{
    ActionMetrics, BackupMetrics, BackupSection, CommandMetrics, ForgetMetrics,
    LegacyPruneMetrics, MetricGroup, MetricTemplates, PruneMetrics, PruneReport,
    PrometheusExporter,
};
use restic_runner::write_metrics;
use test_utils::*;

fn tree_with_backup(outcomes: Vec<(&str, RepoOutcome<BackupMetrics>)>) -> MetricsTree {
    let mut section = BackupSection::default();
    for (repo, outcome) in outcomes {
        section.repositories.insert(repo, outcome);
    }
    MetricsTree {
        backup: Some(section),
        errors: 1,
        last_run: 1_700_000_000.0,
        total_duration_seconds: 42.0,
        ..Default::default()
    }
}

#[test]
fn test_backup_rc_line_only_for_failures() {
    let tree = tree_with_backup(vec![
        ("repo1", RepoOutcome::Parsed(BackupMetrics::default())),
        ("repo2", RepoOutcome::Failed { rc: 3 }),
    ]);

    let lines = PrometheusExporter::default().generate_lines(&tree, "nightly");
    let rc_lines: Vec<_> = lines
        .iter()
        .filter(|l| l.starts_with("restic_backup_rc{"))
        .collect();

    assert_eq!(
        rc_lines,
        vec![r#"restic_backup_rc{config="nightly",repository="repo2"} 3"#]
    );
    assert!(lines.contains(
        &r#"restic_backup_files_new{config="nightly",repository="repo1"} 0"#.to_string()
    ));
    assert!(!lines
        .iter()
        .any(|l| l.contains(r#"repository="repo2""#) && !l.starts_with("restic_backup_rc")));
}

#[test]
fn test_general_block_first() {
    let tree = tree_with_backup(Vec::new());
    let lines = PrometheusExporter::default().generate_lines(&tree, "nightly");

    assert!(lines[0].starts_with("# HELP restic_last_run"));
    assert!(lines.contains(&r#"restic_last_run{config="nightly"} 1700000000.0"#.to_string()));
    assert!(lines.contains(&r#"restic_total_duration_seconds{config="nightly"} 42.0"#.to_string()));
}

#[test]
fn test_prune_variants_use_their_templates() {
    let templates = MetricTemplates::default()
        .with(MetricGroup::General, GroupTemplate::new("", ""))
        .with(MetricGroup::Prune, GroupTemplate::new("help_prune", "new:{repository}:{total_prune_blobs}"))
        .with(
            MetricGroup::PruneLegacy,
            GroupTemplate::new("help_legacy", "legacy:{repository}:{deleted_packs}"),
        );

    let mut prune = ActionMetrics::default();
    prune.insert(
        "a",
        RepoOutcome::Parsed(PruneReport::Current(PruneMetrics {
            total_prune_blobs: 74,
            ..Default::default()
        })),
    );
    prune.insert(
        "b",
        RepoOutcome::Parsed(PruneReport::Legacy(LegacyPruneMetrics {
            deleted_packs: 1,
            ..Default::default()
        })),
    );
    prune.insert("c", RepoOutcome::Failed { rc: 1 });
    let tree = MetricsTree {
        prune: Some(prune),
        ..Default::default()
    };

    let lines = PrometheusExporter::new(templates).generate_lines(&tree, "cfg");
    assert_eq!(lines, vec!["help_prune", "help_legacy", "new:a:74", "legacy:b:1"]);
}

#[test]
fn test_missing_template_field_skips_block() {
    let templates = MetricTemplates::default()
        .with(MetricGroup::General, GroupTemplate::new("", ""))
        .with(MetricGroup::Forget, GroupTemplate::new("help_forget", "{repository} {unknown}"));
    let mut forget = ActionMetrics::default();
    forget.insert("repo", RepoOutcome::Parsed(ForgetMetrics::default()));
    let tree = MetricsTree {
        forget: Some(forget),
        ..Default::default()
    };

    let lines = PrometheusExporter::new(templates).generate_lines(&tree, "cfg");
    assert_eq!(lines, vec!["help_forget"]);
}

#[test]
fn test_hook_lines_precede_repositories() {
    let mut tree = tree_with_backup(vec![("repo", RepoOutcome::Parsed(BackupMetrics::default()))]);
    if let Some(ref mut backup) = tree.backup {
        backup.post_hooks = Some(CommandMetrics {
            duration_seconds: 1.0,
            rc: 0,
        });
    }

    let lines = PrometheusExporter::default().generate_lines(&tree, "cfg");
    let hook = lines
        .iter()
        .position(|l| l.starts_with("restic_post_hooks_rc{"))
        .unwrap();
    let repo = lines
        .iter()
        .position(|l| l.starts_with("restic_backup_files_new{"))
        .unwrap();
    assert!(hook < repo);
    assert!(!lines.iter().any(|l| l.contains("pre_hooks")));
}

#[test]
fn test_write_metrics_to_configured_path() {
    let (config, temp_dir) = ConfigBuilder::new()
        .name("nightly")
        .add_repository("repo")
        .prometheus()
        .persist();
    let tree = tree_with_backup(vec![("repo", RepoOutcome::Failed { rc: 1 })]);

    write_metrics(&tree, &config).unwrap();

    let written = std::fs::read_to_string(temp_dir.path().join("metrics.prom")).unwrap();
    assert!(written.ends_with('\n'));
    assert!(written.contains(r#"restic_total_errors{config="nightly"} 1"#));
    assert!(written.contains(r#"restic_backup_rc{config="nightly",repository="repo"} 1"#));
}

#[test]
fn test_write_metrics_without_prometheus_is_noop() {
    let (config, temp_dir) = ConfigBuilder::new().add_repository("repo").persist();
    let tree = tree_with_backup(Vec::new());

    write_metrics(&tree, &config).unwrap();

    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[test]
fn test_write_metrics_with_custom_exporter() {
    let (config, temp_dir) = ConfigBuilder::new()
        .name("nightly")
        .add_repository("repo")
        .prometheus()
        .persist();
    let exporter = PrometheusExporter::new(
        MetricTemplates::default().with(MetricGroup::General, GroupTemplate::new("", "general {name}")),
    );

    write_metrics_with(&exporter, &MetricsTree::default(), &config).unwrap();

    let written = std::fs::read_to_string(temp_dir.path().join("metrics.prom")).unwrap();
    assert_eq!(written, "general nightly\n");
}
