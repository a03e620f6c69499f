use super::units::count;
use crate::metrics::ForgetMetrics;
use crate::utils::ProcessResult;
use regex::Regex;
use std::sync::LazyLock;
use tracing::error;

static REMOVED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"remove ([0-9]+) snapshots?").expect("valid forget regex"));

/// Snapshots removed by `restic forget`, summed over all snapshot groups
pub fn parse_forget(result: &ProcessResult) -> ForgetMetrics {
    let output = result.last_output();

    let mut matched = false;
    let removed_snapshots = REMOVED
        .captures_iter(output)
        .map(|caps| {
            matched = true;
            count(&caps[1])
        })
        .sum();

    if !matched {
        error!("No match in output for regex '{}'", REMOVED.as_str());
    }

    ForgetMetrics {
        removed_snapshots,
        duration_seconds: result.time,
        rc: result.rc(),
    }
}
