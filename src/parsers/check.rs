use crate::config::CheckConfig;
use crate::metrics::CheckMetrics;
use crate::utils::ProcessResult;
use regex::Regex;
use std::sync::LazyLock;

static DATA_ERRORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Pack ID does not match").expect("valid data error regex"));

static SNAPSHOT_ERRORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"error: load <snapshot/[0-9a-fA-F]+>").expect("valid snapshot error regex")
});

/// Classify the outcome of `restic check`
///
/// The output is scanned whatever the return code; the requested sub-checks
/// are echoed so dashboards can tell a shallow check from a full read.
pub fn parse_check(result: &ProcessResult, checks: &CheckConfig) -> CheckMetrics {
    let rc = result.rc();
    let output = result.last_output();

    CheckMetrics {
        errors: u8::from(rc != 0),
        errors_data: u8::from(DATA_ERRORS.is_match(output)),
        errors_snapshots: u8::from(SNAPSHOT_ERRORS.is_match(output)),
        read_data: u8::from(checks.read_data()),
        check_unused: u8::from(checks.check_unused()),
        duration_seconds: result.time,
        rc,
    }
}
