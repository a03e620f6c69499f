//! `restic prune` reports
//!
//! restic 0.12 rewrote the prune command and its report. The current layout
//! is a table of `blobs / size` rows (`to repack:`, `total prune:`,
//! `remaining:` ...); the legacy layout is a sequence of prose lines
//! (`repository contains ...`, `will delete ... packs`). The current parser
//! reports a [`ParseError::StructuralMismatch`] when the table is missing so
//! the caller can fall back to the legacy parser.

use super::units::{count, parse_line, parse_size};
use super::ParseError;
use crate::metrics::{LegacyPruneMetrics, PruneMetrics, PruneReport};
use crate::utils::ProcessResult;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, error};

const BLOBS_SIZE: &str = r"([0-9]+) blobs / ([0-9]+\.?[0-9]* [a-zA-Z]*B)";

fn blobs_size(label: &str) -> Regex {
    Regex::new(&format!(r"{}\s+{}", label, BLOBS_SIZE)).expect("valid prune regex")
}

static TO_REPACK: LazyLock<Regex> = LazyLock::new(|| blobs_size("to repack:"));
static THIS_REMOVES: LazyLock<Regex> = LazyLock::new(|| blobs_size("this removes:?"));
static TO_DELETE: LazyLock<Regex> = LazyLock::new(|| blobs_size("to delete:"));
static TOTAL_PRUNE: LazyLock<Regex> = LazyLock::new(|| blobs_size("total prune:"));
static REMAINING: LazyLock<Regex> = LazyLock::new(|| blobs_size("remaining:"));
static UNUSED_AFTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"unused size after prune:\s+([0-9]+\.?[0-9]* [a-zA-Z]*B) \(([0-9.]+)% of remaining size\)")
        .expect("valid unused regex")
});

static CONTAINS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"repository contains ([0-9]+) packs \(([0-9]+) blobs\) with ([0-9]+\.?[0-9]* [a-zA-Z]*B)")
        .expect("valid contains regex")
});
static DUPLICATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"processed [0-9]+ blobs: ([0-9]+) duplicate blobs, ([0-9]+\.?[0-9]* [a-zA-Z]*B) duplicate")
        .expect("valid duplicates regex")
});
static IN_USE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"found ([0-9]+) of [0-9]+ data blobs still in use, removing ([0-9]+) blobs")
        .expect("valid in-use regex")
});
static INVALID_FILES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"will remove ([0-9]+) invalid files").expect("valid invalid-files regex"));
static PACKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"will delete ([0-9]+) packs and rewrite ([0-9]+) packs, this frees ([0-9]+\.?[0-9]* [a-zA-Z]*B)")
        .expect("valid packs regex")
});
static OLD_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"remove ([0-9]+) old index files").expect("valid index regex"));

/// A `blobs / size` row that must be present
fn required_row(regex: &Regex, output: &str, row: &'static str) -> Result<(u64, f64), ParseError> {
    let caps = regex
        .captures(output)
        .ok_or(ParseError::StructuralMismatch { missing: row })?;
    let blobs = caps[1].parse().map_err(|_| ParseError::InvalidValue {
        field: row,
        value: caps[1].to_string(),
    })?;
    Ok((blobs, parse_size(&caps[2])))
}

/// A `blobs / size` row that some restic versions omit
fn optional_row(regex: &Regex, output: &str) -> (u64, f64) {
    let parts = parse_line(regex, output, &["0", "0 B"]);
    (count(parts[0]), parse_size(parts[1]))
}

/// Report of restic 0.12+
pub fn parse_new_prune(result: &ProcessResult) -> Result<PruneMetrics, ParseError> {
    let output = result.last_output();

    // The summary table is what identifies the current layout
    let (total_prune_blobs, total_prune_bytes) = required_row(&TOTAL_PRUNE, output, "total prune")?;
    let (remaining_blobs, remaining_bytes) = required_row(&REMAINING, output, "remaining")?;

    let (to_repack_blobs, to_repack_bytes) = optional_row(&TO_REPACK, output);
    let (removed_blobs, removed_bytes) = optional_row(&THIS_REMOVES, output);
    let (to_delete_blobs, to_delete_bytes) = optional_row(&TO_DELETE, output);

    let unused = parse_line(&UNUSED_AFTER, output, &["0 B", "0"]);
    if unused[1].parse::<f64>().is_err() {
        return Err(ParseError::InvalidValue {
            field: "unused size after prune",
            value: unused[1].to_string(),
        });
    }

    Ok(PruneMetrics {
        to_repack_blobs,
        to_repack_bytes,
        removed_blobs,
        removed_bytes,
        to_delete_blobs,
        to_delete_bytes,
        total_prune_blobs,
        total_prune_bytes,
        remaining_blobs,
        remaining_bytes,
        remaining_unused_size: parse_size(unused[0]),
        duration_seconds: result.time,
        rc: result.rc(),
    })
}

/// Report of restic before 0.12
pub fn parse_legacy_prune(result: &ProcessResult) -> LegacyPruneMetrics {
    let output = result.last_output();

    let contains = parse_line(&CONTAINS, output, &["0", "0", "0 B"]);
    let duplicates = parse_line(&DUPLICATES, output, &["0", "0 B"]);
    let in_use = parse_line(&IN_USE, output, &["0", "0"]);
    let invalid = parse_line(&INVALID_FILES, output, &["0"]);
    let packs = parse_line(&PACKS, output, &["0", "0", "0 B"]);
    let old_index = parse_line(&OLD_INDEX, output, &["0"]);

    LegacyPruneMetrics {
        containing_packs_before: count(contains[0]),
        containing_blobs: count(contains[1]),
        containing_size_bytes: parse_size(contains[2]),
        duplicate_blobs: count(duplicates[0]),
        duplicate_size_bytes: parse_size(duplicates[1]),
        in_use_blobs: count(in_use[0]),
        removed_blobs: count(in_use[1]),
        invalid_files: count(invalid[0]),
        deleted_packs: count(packs[0]),
        rewritten_packs: count(packs[1]),
        size_freed_bytes: parse_size(packs[2]),
        removed_index_files: count(old_index[0]),
        duration_seconds: result.time,
        rc: result.rc(),
    }
}

/// The two prune parsers, tried current first
#[derive(Clone, Copy)]
pub struct PruneParsers {
    pub current: fn(&ProcessResult) -> Result<PruneMetrics, ParseError>,
    pub legacy: fn(&ProcessResult) -> LegacyPruneMetrics,
}

impl Default for PruneParsers {
    fn default() -> Self {
        Self {
            current: parse_new_prune,
            legacy: parse_legacy_prune,
        }
    }
}

impl PruneParsers {
    /// Parse with the current layout, falling back to the legacy layout only
    /// when the current one is structurally absent
    pub fn parse(&self, result: &ProcessResult) -> PruneReport {
        match (self.current)(result) {
            Ok(metrics) => PruneReport::Current(metrics),
            Err(ParseError::StructuralMismatch { missing }) => {
                debug!("No '{}' row in prune output, using legacy prune layout", missing);
                PruneReport::Legacy((self.legacy)(result))
            }
            Err(e) => {
                error!("Failed to parse prune output: {}", e);
                PruneReport::Current(PruneMetrics {
                    duration_seconds: result.time,
                    rc: result.rc(),
                    ..Default::default()
                })
            }
        }
    }
}
