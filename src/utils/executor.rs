//! Multi-command execution abstraction for testability
//!
//! A batch holds one command per repository. The executor runs the batch
//! sequentially or in parallel and returns one [`ProcessResult`] per command,
//! in submission order. Failing commands are data, never errors.

use super::process::{run_with_retry, Attempt, CommandSpec, ExecutionPolicy, ProcessResult, RC_SPAWN_FAILED};
use tracing::{debug, error};

/// Abstraction for running batches of commands, enabling mocking in tests
pub trait CommandExecutor: Send + Sync {
    /// Run every command; the i-th result belongs to the i-th command
    fn run_all(&self, commands: Vec<CommandSpec>, policy: &ExecutionPolicy) -> Vec<ProcessResult>;
}

/// Default implementation spawning real subprocesses on a tokio runtime
#[derive(Debug, Clone, Default)]
pub struct RealExecutor;

impl RealExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealExecutor {
    fn run_all(&self, commands: Vec<CommandSpec>, policy: &ExecutionPolicy) -> Vec<ProcessResult> {
        if commands.is_empty() {
            return Vec::new();
        }

        let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Failed to start async runtime: {}", e);
                return commands
                    .iter()
                    .map(|_| ProcessResult {
                        output: vec![Attempt {
                            rc: RC_SPAWN_FAILED,
                            output: format!("Failed to start async runtime: {}", e),
                        }],
                        time: 0.0,
                    })
                    .collect();
            }
        };

        runtime.block_on(run_batch(commands, policy))
    }
}

async fn run_batch(commands: Vec<CommandSpec>, policy: &ExecutionPolicy) -> Vec<ProcessResult> {
    if !policy.parallel {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            debug!("Spawning {}", command.program);
            results.push(run_with_retry(command, policy).await);
        }
        return results;
    }

    // One task per command; awaiting the handles in order keeps results aligned
    let handles: Vec<_> = commands
        .into_iter()
        .map(|command| {
            debug!("Spawning {}", command.program);
            let policy = policy.clone();
            tokio::spawn(async move { run_with_retry(command, &policy).await })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let result = handle.await.unwrap_or_else(|e| ProcessResult {
            output: vec![Attempt {
                rc: RC_SPAWN_FAILED,
                output: format!("Command task failed: {}", e),
            }],
            time: 0.0,
        });
        results.push(result);
    }
    results
}

/// A mock executor for testing that records batches and returns scripted results
/// Available for use in external test crates
#[allow(dead_code)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Recorded batch submission
    #[derive(Clone, Debug)]
    pub struct BatchCall {
        pub commands: Vec<CommandSpec>,
        pub parallel: bool,
        pub retry_count: u32,
    }

    /// Mock executor for testing
    ///
    /// Each call to `run_all` consumes the next scripted batch. Commands
    /// beyond the scripted results (or calls beyond the script) succeed with
    /// empty output.
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Recorded batch submissions
        pub calls: Arc<Mutex<Vec<BatchCall>>>,
        script: Arc<Mutex<VecDeque<Vec<ProcessResult>>>>,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the results returned for the next batch
        pub fn then(self, results: Vec<ProcessResult>) -> Self {
            self.script.lock().unwrap().push_back(results);
            self
        }

        /// Get all recorded batches
        pub fn get_calls(&self) -> Vec<BatchCall> {
            self.calls.lock().unwrap().clone()
        }

        /// All commands submitted across batches
        pub fn commands(&self) -> Vec<CommandSpec> {
            self.get_calls()
                .into_iter()
                .flat_map(|call| call.commands)
                .collect()
        }

        /// Number of batches whose commands contain the given argument
        pub fn call_count(&self, arg: &str) -> usize {
            self.get_calls()
                .iter()
                .filter(|call| call.commands.iter().any(|c| c.args.iter().any(|a| a == arg)))
                .count()
        }
    }

    impl CommandExecutor for MockExecutor {
        fn run_all(&self, commands: Vec<CommandSpec>, policy: &ExecutionPolicy) -> Vec<ProcessResult> {
            let scripted = self.script.lock().unwrap().pop_front().unwrap_or_default();
            let count = commands.len();

            self.calls.lock().unwrap().push(BatchCall {
                commands,
                parallel: policy.parallel,
                retry_count: policy.retry_count,
            });

            let mut results: Vec<ProcessResult> = scripted.into_iter().take(count).collect();
            while results.len() < count {
                results.push(ProcessResult::single(0, "", 0.0));
            }
            results
        }
    }
}
