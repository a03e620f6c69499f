use super::units::{count, parse_line, parse_size, parse_time};
use crate::metrics::{BackupMetrics, ChangeCounts, ProcessedSummary};
use crate::utils::ProcessResult;
use regex::Regex;
use std::sync::LazyLock;

static FILES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Files:\s+([0-9]+) new,\s+([0-9]+) changed,\s+([0-9]+) unmodified")
        .expect("valid files regex")
});

static DIRS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Dirs:\s+([0-9]+) new,\s+([0-9]+) changed,\s+([0-9]+) unmodified")
        .expect("valid dirs regex")
});

static ADDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Added to the repo(?:sitory)?: ([0-9]+\.?[0-9]* [a-zA-Z]*B)")
        .expect("valid added regex")
});

static PROCESSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"processed ([0-9]+) files,\s+([0-9]+\.?[0-9]* [a-zA-Z]*B) in ((?:[0-9]+:)?[0-9]+:[0-9]+)")
        .expect("valid processed regex")
});

fn change_counts(regex: &Regex, output: &str) -> ChangeCounts {
    let parts = parse_line(regex, output, &["0", "0", "0"]);
    ChangeCounts {
        new: count(parts[0]),
        changed: count(parts[1]),
        unmodified: count(parts[2]),
    }
}

/// Summary of a `restic backup` run
pub fn parse_backup(result: &ProcessResult) -> BackupMetrics {
    let output = result.last_output();

    let added = parse_line(&ADDED, output, &["0 B"]);
    let processed = parse_line(&PROCESSED, output, &["0", "0 B", "00:00:00"]);

    BackupMetrics {
        files: change_counts(&FILES, output),
        dirs: change_counts(&DIRS, output),
        processed: ProcessedSummary {
            files: count(processed[0]),
            size_bytes: parse_size(processed[1]),
            duration_seconds: parse_time(processed[2]),
        },
        added_to_repo: parse_size(added[0]),
        duration_seconds: result.time,
        rc: result.rc(),
    }
}
