//! Action runner - sequences restic actions over all repositories of a config

use crate::config::Config;
use crate::metrics::{
    ActionMetrics, BackupSection, CommandMetrics, MetricsTree, RepoOutcome,
};
use crate::parsers::OutputParsers;
use crate::utils::{
    Backoff, CommandExecutor, CommandSpec, ExecutionPolicy, ProcessResult, RealExecutor, Redactor,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Output fragments after which retrying a restic command is pointless
const ABORT_REASONS: &[&str] = &["Fatal: unable to open config file", "Fatal: wrong password"];
const INIT_ABORT_REASONS: &[&str] = &[
    "Fatal: unable to open config file",
    "Fatal: wrong password",
    "config file already exists",
];

/// Lifecycle actions, in the order they are always executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum Action {
    Init,
    Backup,
    Forget,
    Prune,
    Check,
    Stats,
    Unlock,
}

pub const CANONICAL_ORDER: [Action; 7] = [
    Action::Init,
    Action::Backup,
    Action::Forget,
    Action::Prune,
    Action::Check,
    Action::Stats,
    Action::Unlock,
];

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Init => "init",
            Action::Backup => "backup",
            Action::Forget => "forget",
            Action::Prune => "prune",
            Action::Check => "check",
            Action::Stats => "stats",
            Action::Unlock => "unlock",
        }
    }

    /// Actions run when none are requested explicitly
    pub fn defaults(config: &Config) -> Vec<Action> {
        let mut actions = vec![Action::Backup, Action::Forget, Action::Prune, Action::Check];
        if config.metrics.prometheus.is_some() {
            actions.push(Action::Stats);
        }
        actions
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runs restic actions for one configuration and collects their metrics
pub struct ResticRunner {
    config: Config,
    dry_run: bool,
    restic_args: Vec<String>,
    environment: HashMap<String, String>,
    executor: Arc<dyn CommandExecutor>,
    parsers: OutputParsers,
    redactor: Redactor,
    metrics: MetricsTree,
}

impl ResticRunner {
    /// Create a runner spawning real restic processes
    pub fn new(config: Config, dry_run: bool, restic_args: Vec<String>) -> Self {
        Self::with_executor(config, dry_run, restic_args, Arc::new(RealExecutor::new()))
    }

    /// Create a runner with a custom executor (for testing)
    pub fn with_executor(
        config: Config,
        dry_run: bool,
        restic_args: Vec<String>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let redactor = Redactor::new(
            config.environment.get("RESTIC_PASSWORD").map(String::as_str),
            config.password_replacement(),
        );
        let environment = config.environment.clone();

        Self {
            config,
            dry_run,
            restic_args,
            environment,
            executor,
            parsers: OutputParsers::default(),
            redactor,
            metrics: MetricsTree::default(),
        }
    }

    /// Replace the output parsers
    pub fn with_parsers(mut self, parsers: OutputParsers) -> Self {
        self.parsers = parsers;
        self
    }

    /// Let restic report progress every `seconds`
    pub fn show_progress(mut self, seconds: f64) -> Self {
        if seconds > 0.0 {
            self.environment
                .insert("RESTIC_PROGRESS_FPS".to_string(), (1.0 / seconds).to_string());
        }
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsTree {
        &self.metrics
    }

    /// Run the requested actions in canonical order and return the error count
    ///
    /// An empty selection runs [`Action::defaults`].
    pub fn run(&mut self, actions: &[Action]) -> u32 {
        let start = Instant::now();
        self.metrics.last_run = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;

        let requested = if actions.is_empty() {
            Action::defaults(&self.config)
        } else {
            actions.to_vec()
        };

        for action in CANONICAL_ORDER.into_iter().filter(|a| requested.contains(a)) {
            let errors_before = self.metrics.errors;
            info!("Running {} for '{}'", action, self.config.name);

            match action {
                Action::Init => self.init(),
                Action::Backup => self.backup(),
                Action::Forget => self.forget(),
                Action::Prune => self.prune(),
                Action::Check => self.check(),
                Action::Stats => self.stats(),
                Action::Unlock => self.unlock(),
            }

            if self.config.execution.exit_on_error && self.metrics.errors > errors_before {
                warn!("Stopping after {} failed for '{}'", action, self.config.name);
                break;
            }
        }

        self.metrics.total_duration_seconds = start.elapsed().as_secs_f64();

        match serde_json::to_string_pretty(&self.metrics) {
            Ok(json) => debug!("Metrics of '{}':\n{}", self.config.name, json),
            Err(e) => warn!("Cannot serialize metrics: {}", e),
        }
        info!(
            "Finished '{}' with {} error(s) in {:.1}s",
            self.config.name, self.metrics.errors, self.metrics.total_duration_seconds
        );

        self.metrics.errors
    }

    fn init(&mut self) {
        if self.dry_run {
            info!("Dry run: skipping init");
            return;
        }
        let commands = self.commands(Action::Init, |command| command);
        let results = self.execute(commands, self.policy(INIT_ABORT_REASONS));
        self.metrics.init = Some(self.commands_metrics(Action::Init, results));
    }

    fn backup(&mut self) {
        let mut section = BackupSection::default();

        if !self.config.backup.pre_hooks.is_empty() {
            let hooks = self.config.backup.pre_hooks.clone();
            section.pre_hooks = Some(self.run_hooks("pre", &hooks));
        }

        let backup = self.config.backup.clone();
        let dry_run = self.dry_run;
        let commands = self.commands(Action::Backup, |mut command| {
            if dry_run {
                command = command.arg("--dry-run");
            }
            command = command.args(backup.sources.iter().cloned());
            for pattern in &backup.exclude_patterns {
                command = command.arg("--exclude").arg(pattern.clone());
            }
            for file in &backup.exclude_files {
                command = command.arg("--exclude-file").arg(file.clone());
            }
            for marker in &backup.exclude_if_present {
                command = command.arg("--exclude-if-present").arg(marker.clone());
            }
            command
        });
        let results = self.execute(commands, self.policy(ABORT_REASONS));
        let parse = self.parsers.backup;
        section.repositories = self.collect(Action::Backup, results, parse);

        if !self.config.backup.post_hooks.is_empty() {
            let hooks = self.config.backup.post_hooks.clone();
            section.post_hooks = Some(self.run_hooks("post", &hooks));
        }

        self.metrics.backup = Some(section);
    }

    fn forget(&mut self) {
        let flags = self.config.prune.forget_flags();
        let dry_run = self.dry_run;
        let commands = self.commands(Action::Forget, |mut command| {
            if dry_run {
                command = command.arg("--dry-run");
            }
            command.args(flags.iter().cloned())
        });
        let results = self.execute(commands, self.policy(ABORT_REASONS));
        let parse = self.parsers.forget;
        self.metrics.forget = Some(self.collect(Action::Forget, results, parse));
    }

    fn prune(&mut self) {
        let dry_run = self.dry_run;
        let commands = self.commands(Action::Prune, |command| {
            if dry_run {
                command.arg("--dry-run")
            } else {
                command
            }
        });
        let results = self.execute(commands, self.policy(ABORT_REASONS));
        let parsers = self.parsers.prune;
        self.metrics.prune = Some(self.collect(Action::Prune, results, |r| parsers.parse(r)));
    }

    /// Check output is always parsed; the return code is part of the metrics
    fn check(&mut self) {
        let checks = self.config.check.clone();
        let commands = self.commands(Action::Check, |mut command| {
            if checks.check_unused() {
                command = command.arg("--check-unused");
            }
            if checks.read_data() {
                command = command.arg("--read-data");
            }
            command
        });
        let results = self.execute(commands, self.policy(ABORT_REASONS));

        let parse = self.parsers.check;
        let mut metrics = ActionMetrics::default();
        for (key, result) in self.repository_keys().into_iter().zip(results) {
            if !result.success() {
                self.record_failure(Action::Check, &key, &result);
            }
            metrics.insert(key, RepoOutcome::Parsed(parse(&result, &checks)));
        }
        self.metrics.check = Some(metrics);
    }

    fn stats(&mut self) {
        let commands = self.commands(Action::Stats, |command| command.args(["-q", "--json"]));
        let results = self.execute(commands, self.policy(ABORT_REASONS));
        let parse = self.parsers.stats;
        self.metrics.stats = Some(self.collect(Action::Stats, results, parse));
    }

    fn unlock(&mut self) {
        if self.dry_run {
            info!("Dry run: skipping unlock");
            return;
        }
        let commands = self.commands(Action::Unlock, |command| command);
        let results = self.execute(commands, self.policy(ABORT_REASONS));
        self.metrics.unlock = Some(self.commands_metrics(Action::Unlock, results));
    }

    /// Run a hook group once, recording summed duration and the first failing rc
    fn run_hooks(&mut self, label: &str, hooks: &[String]) -> CommandMetrics {
        let commands: Vec<_> = hooks
            .iter()
            .map(|hook| CommandSpec::shell(hook).envs(&self.environment))
            .collect();
        let policy = ExecutionPolicy {
            parallel: false,
            timeout: self.policy(&[]).timeout,
            ..Default::default()
        };

        let results = self.execute(commands, policy);
        let duration_seconds = results.iter().map(|r| r.time).sum::<f64>();
        let failed = results.iter().find(|r| !r.success());
        let rc = failed.map(ProcessResult::rc).unwrap_or(0);

        if let Some(result) = failed {
            self.metrics.errors += 1;
            error!(
                "{}-backup hook failed with rc {}: {}",
                label,
                rc,
                self.redactor.text(result.last_output().trim())
            );
        }

        CommandMetrics { duration_seconds, rc }
    }

    /// `restic -r <repo> <action>` per repository, shaped by `extend`, with
    /// the caller's extra arguments last
    fn commands<F>(&self, action: Action, extend: F) -> Vec<CommandSpec>
    where
        F: Fn(CommandSpec) -> CommandSpec,
    {
        self.config
            .repositories
            .iter()
            .map(|repo| {
                let command = CommandSpec::new(self.config.restic_binary.as_str())
                    .args(["-r", repo.as_str(), action.name()])
                    .envs(&self.environment);
                extend(command).args(self.restic_args.iter().cloned())
            })
            .collect()
    }

    fn policy(&self, abort_reasons: &[&str]) -> ExecutionPolicy {
        let execution = &self.config.execution;
        ExecutionPolicy {
            parallel: execution.parallel,
            retry_count: execution.retry_count,
            backoff: execution.retry_backoff.as_deref().and_then(Backoff::parse),
            timeout: execution.timeout_seconds.map(Duration::from_secs),
            abort_reasons: Vec::new(),
        }
        .with_abort_reasons(abort_reasons)
    }

    fn execute(&self, commands: Vec<CommandSpec>, policy: ExecutionPolicy) -> Vec<ProcessResult> {
        for command in &commands {
            debug!("Executing: {}", self.redactor.line(&command.command_line()));
        }

        let results = self.executor.run_all(commands, &policy);

        for result in &results {
            for (i, attempt) in result.output.iter().enumerate() {
                debug!(
                    "Attempt {} (rc {}): {}",
                    i + 1,
                    attempt.rc,
                    self.redactor.text(attempt.output.trim_end())
                );
            }
        }
        results
    }

    /// Metric keys: repositories with credentials hidden
    fn repository_keys(&self) -> Vec<String> {
        self.config
            .repositories
            .iter()
            .map(|repo| self.redactor.repository(repo))
            .collect()
    }

    /// Parse successful results, record `{"rc": n}` for failed ones
    fn collect<T>(
        &mut self,
        action: Action,
        results: Vec<ProcessResult>,
        parse: impl Fn(&ProcessResult) -> T,
    ) -> ActionMetrics<T> {
        let mut metrics = ActionMetrics::default();
        for (key, result) in self.repository_keys().into_iter().zip(results) {
            let outcome = if result.success() {
                RepoOutcome::Parsed(parse(&result))
            } else {
                self.record_failure(action, &key, &result);
                RepoOutcome::Failed { rc: result.rc() }
            };
            metrics.insert(key, outcome);
        }
        metrics
    }

    fn commands_metrics(
        &mut self,
        action: Action,
        results: Vec<ProcessResult>,
    ) -> ActionMetrics<CommandMetrics> {
        self.collect_always(action, results, |r| CommandMetrics {
            duration_seconds: r.time,
            rc: r.rc(),
        })
    }

    /// Parse every result whatever its return code
    fn collect_always<T>(
        &mut self,
        action: Action,
        results: Vec<ProcessResult>,
        parse: impl Fn(&ProcessResult) -> T,
    ) -> ActionMetrics<T> {
        let mut metrics = ActionMetrics::default();
        for (key, result) in self.repository_keys().into_iter().zip(results) {
            if !result.success() {
                self.record_failure(action, &key, &result);
            }
            metrics.insert(key, RepoOutcome::Parsed(parse(&result)));
        }
        metrics
    }

    fn record_failure(&mut self, action: Action, key: &str, result: &ProcessResult) {
        self.metrics.errors += 1;
        error!(
            "restic {} failed for {} with rc {}: {}",
            action,
            key,
            result.rc(),
            self.redactor.text(result.last_output().trim())
        );
    }
}
