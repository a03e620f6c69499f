//! Test utilities for restic-runner
//!
//! This crate provides shared test utilities, restic output fixtures and
//! helpers for testing the restic-runner library and binary.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{ConfigBuilder, MockExecutor};
//!
//! #[test]
//! fn my_test() {
//!     let config = ConfigBuilder::new().add_repository("repo1").build();
//!     let executor = MockExecutor::new();
//!     // ... test code
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use test_context::TestContext;

// Re-export types from the main crate for convenience
pub use restic_runner::config::{Config, RetentionValue};
pub use restic_runner::metrics::{MetricsTree, RepoOutcome};
pub use restic_runner::utils::executor::mock::MockExecutor;
pub use restic_runner::utils::{CommandExecutor, ProcessResult};
pub use restic_runner::{Action, ResticRunner};

use std::sync::Arc;

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;

/// Runner over `config` executing through `executor`
pub fn mock_runner(config: Config, executor: &MockExecutor) -> ResticRunner {
    ResticRunner::with_executor(config, false, Vec::new(), Arc::new(executor.clone()))
}
