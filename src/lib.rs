//! Restic Runner Library
//!
//! Runs restic actions against a set of repositories, parses restic's output
//! into metrics and exports them in the Prometheus text format.

pub mod config;
pub mod managers;
pub mod metrics;
pub mod parsers;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, Config};
pub use managers::logging::{init_logging, LogGuard, LoggingConfig};
pub use managers::runner::{Action, ResticRunner, CANONICAL_ORDER};
pub use metrics::{write_metrics, MetricsTree, PrometheusExporter};
