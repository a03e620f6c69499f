use crate::metrics::StatsMetrics;
use crate::utils::ProcessResult;
use serde::Deserialize;
use tracing::error;

#[derive(Debug, Deserialize)]
struct StatsJson {
    total_size: u64,
    total_file_count: u64,
}

/// Repository totals from `restic stats --json`
///
/// The JSON document is looked up line by line since warnings on stderr may
/// surround it.
pub fn parse_stats(result: &ProcessResult) -> StatsMetrics {
    let output = result.last_output();

    let parsed = output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<StatsJson>(line).ok());

    let (total_size_bytes, total_file_count) = match parsed {
        Some(stats) => (stats.total_size, stats.total_file_count),
        None => {
            error!("No stats JSON found in output '{}'", output.trim());
            (0, 0)
        }
    };

    StatsMetrics {
        total_file_count,
        total_size_bytes,
        duration_seconds: result.time,
        rc: result.rc(),
    }
}
