//! Parsers turning captured restic output into per-action metrics
//!
//! Every parser is a pure function of one [`ProcessResult`]. A pattern that
//! does not match is logged and its fields take their defaults; only the
//! prune parser distinguishes a structurally different report, see
//! [`prune`].

pub mod backup;
pub mod check;
pub mod forget;
pub mod prune;
pub mod stats;
pub mod units;

use crate::config::CheckConfig;
use crate::metrics::{BackupMetrics, CheckMetrics, ForgetMetrics, StatsMetrics};
use crate::utils::ProcessResult;

pub use backup::parse_backup;
pub use check::parse_check;
pub use forget::parse_forget;
pub use prune::{parse_legacy_prune, parse_new_prune, PruneParsers};
pub use stats::parse_stats;
pub use units::{make_size, parse_line, parse_size, parse_time};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The output does not have the expected layout at all
    #[error("expected '{missing}' in output")]
    StructuralMismatch { missing: &'static str },

    /// The layout matched but a value could not be converted
    #[error("invalid value '{value}' for '{field}'")]
    InvalidValue { field: &'static str, value: String },
}

/// Parser per action, fixed when the runner is built
#[derive(Clone, Copy)]
pub struct OutputParsers {
    pub backup: fn(&ProcessResult) -> BackupMetrics,
    pub forget: fn(&ProcessResult) -> ForgetMetrics,
    pub prune: PruneParsers,
    pub check: fn(&ProcessResult, &CheckConfig) -> CheckMetrics,
    pub stats: fn(&ProcessResult) -> StatsMetrics,
}

impl Default for OutputParsers {
    fn default() -> Self {
        Self {
            backup: parse_backup,
            forget: parse_forget,
            prune: PruneParsers::default(),
            check: parse_check,
            stats: parse_stats,
        }
    }
}
