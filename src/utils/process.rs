//! Running restic (and hook) processes with retry, backoff and timeouts

use crate::parsers::units::parse_time;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Return code recorded when the process could not be started
pub const RC_SPAWN_FAILED: i32 = 127;
/// Return code recorded when an invocation hit its timeout
pub const RC_TIMED_OUT: i32 = 124;
/// Return code recorded when the process was terminated by a signal
pub const RC_SIGNALED: i32 = -1;

/// A fully formed command: program, arguments and environment overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Merged onto the ambient environment of this invocation only
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    /// A command run through the platform shell (used for hooks)
    pub fn shell(command: &str) -> Self {
        #[cfg(unix)]
        let (shell, flag) = ("sh", "-c");

        #[cfg(windows)]
        let (shell, flag) = ("cmd", "/C");

        Self::new(shell).args([flag, command])
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: &HashMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Program and arguments joined for display
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One invocation: its return code and captured output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub rc: i32,
    pub output: String,
}

/// Everything observed while running one command, retries included
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessResult {
    /// Attempts in the order they were made; never empty
    pub output: Vec<Attempt>,
    /// Wall-clock seconds across all attempts
    pub time: f64,
}

impl ProcessResult {
    /// Result of a single attempt, mostly useful for tests and mocks
    pub fn single(rc: i32, output: impl Into<String>, time: f64) -> Self {
        Self {
            output: vec![Attempt {
                rc,
                output: output.into(),
            }],
            time,
        }
    }

    /// Return code of the final attempt
    pub fn rc(&self) -> i32 {
        self.output.last().map(|a| a.rc).unwrap_or(RC_SPAWN_FAILED)
    }

    /// Output of the final attempt
    pub fn last_output(&self) -> &str {
        self.output.last().map(|a| a.output.as_str()).unwrap_or("")
    }

    pub fn success(&self) -> bool {
        self.rc() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Static,
    Linear,
    Exponential,
}

/// Delay between two attempts of the same command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub strategy: BackoffStrategy,
}

impl Backoff {
    /// Parse `"M:SS"`/`"H:MM:SS"` optionally followed by `static`, `linear`
    /// or `exponential`
    pub fn parse(spec: &str) -> Option<Self> {
        let mut parts = spec.split_whitespace();
        let time = parts.next()?;
        if !time.contains(':') || !time.chars().all(|c| c.is_ascii_digit() || c == ':') {
            return None;
        }

        let strategy = match parts.next() {
            None | Some("static") => BackoffStrategy::Static,
            Some("linear") => BackoffStrategy::Linear,
            Some("exponential") => BackoffStrategy::Exponential,
            Some(_) => return None,
        };
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            base: Duration::from_secs(parse_time(time)),
            strategy,
        })
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Static => self.base,
            BackoffStrategy::Linear => self.base.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.base.saturating_mul(factor)
            }
        }
    }
}

/// Scheduling and retry policy for one batch of commands
#[derive(Debug, Clone, Default)]
pub struct ExecutionPolicy {
    pub parallel: bool,
    pub retry_count: u32,
    pub backoff: Option<Backoff>,
    pub timeout: Option<Duration>,
    /// Output fragments that make a failure final, skipping remaining retries
    pub abort_reasons: Vec<String>,
}

impl ExecutionPolicy {
    pub fn with_abort_reasons(mut self, reasons: &[&str]) -> Self {
        self.abort_reasons = reasons.iter().map(|r| r.to_string()).collect();
        self
    }
}

/// Run a single invocation, never failing: problems become return codes
async fn run_once(command: &CommandSpec, timeout: Option<Duration>) -> Attempt {
    let mut cmd = tokio::process::Command::new(&command.program);
    cmd.args(&command.args)
        .envs(&command.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            error!("Failed to execute {}: {}", command.program, e);
            return Attempt {
                rc: RC_SPAWN_FAILED,
                output: format!("Failed to execute {}: {}", command.program, e),
            };
        }
    };

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Command timed out after {:?}: {}", limit, command.program);
                return Attempt {
                    rc: RC_TIMED_OUT,
                    output: format!("Command timed out after {:?}", limit),
                };
            }
        },
        None => child.wait_with_output().await,
    };

    match result {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            Attempt {
                rc: output.status.code().unwrap_or(RC_SIGNALED),
                output: text,
            }
        }
        Err(e) => Attempt {
            rc: RC_SPAWN_FAILED,
            output: format!("Failed to collect output of {}: {}", command.program, e),
        },
    }
}

/// Run a command, retrying non-zero exits as the policy allows
pub async fn run_with_retry(command: CommandSpec, policy: &ExecutionPolicy) -> ProcessResult {
    let start = Instant::now();
    let tries_total = policy.retry_count.saturating_add(1);
    let mut attempts = Vec::new();

    for current_try in 1..=tries_total {
        let attempt = run_once(&command, policy.timeout).await;
        let rc = attempt.rc;
        let aborted = policy
            .abort_reasons
            .iter()
            .find(|reason| attempt.output.contains(reason.as_str()))
            .cloned();
        attempts.push(attempt);

        if rc == 0 {
            break;
        }
        if let Some(reason) = aborted {
            warn!("Not retrying, output contains '{}'", reason);
            break;
        }
        if current_try < tries_total {
            debug!("Attempt {}/{} failed with rc {}", current_try, tries_total, rc);
            if let Some(backoff) = policy.backoff {
                tokio::time::sleep(backoff.delay(current_try)).await;
            }
        }
    }

    ProcessResult {
        output: attempts,
        time: start.elapsed().as_secs_f64(),
    }
}
