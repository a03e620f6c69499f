//! Runs through the real executor against a fake restic script

#![cfg(unix)]

use restic_runner::metrics::PruneReport;
use test_utils::*;

fn builder_with_fake_restic() -> ConfigBuilder {
    let builder = ConfigBuilder::new();
    let restic = fake_restic(builder.temp_dir());
    builder.restic_binary(&restic)
}

#[test]
fn test_all_actions_with_fake_restic() {
    let (config, _temp_dir) = builder_with_fake_restic()
        .add_repository("/repos/a")
        .add_repository("/repos/b")
        .parallel(true)
        .persist();
    let mut runner = ResticRunner::new(config, false, Vec::new());

    let errors = runner.run(&[
        Action::Init,
        Action::Backup,
        Action::Forget,
        Action::Prune,
        Action::Check,
        Action::Stats,
        Action::Unlock,
    ]);

    assert_eq!(errors, 0);
    let metrics = runner.metrics();
    for repo in ["/repos/a", "/repos/b"] {
        match metrics.backup.as_ref().unwrap().repositories.get(repo) {
            Some(RepoOutcome::Parsed(backup)) => assert_eq!(backup.files.new, 12),
            other => panic!("unexpected backup outcome {:?}", other),
        }
        assert!(matches!(
            metrics.prune.as_ref().unwrap().get(repo),
            Some(RepoOutcome::Parsed(PruneReport::Current(_)))
        ));
        assert!(metrics.unlock.as_ref().unwrap().get(repo).is_some());
    }
}

#[test]
fn test_broken_repository_does_not_stop_siblings() {
    let (config, _temp_dir) = builder_with_fake_restic()
        .add_repository("/repos/broken")
        .add_repository("/repos/fine")
        .retry(2, None)
        .persist();
    let mut runner = ResticRunner::new(config, false, Vec::new());

    let errors = runner.run(&[Action::Backup]);

    assert_eq!(errors, 1);
    let backup = &runner.metrics().backup.as_ref().unwrap().repositories;
    assert_eq!(backup.get("/repos/broken"), Some(&RepoOutcome::Failed { rc: 1 }));
    assert!(matches!(backup.get("/repos/fine"), Some(RepoOutcome::Parsed(_))));
}

#[test]
fn test_hooks_run_through_shell() {
    let builder = builder_with_fake_restic().add_repository("/repos/a");
    let marker = builder.temp_dir().join("hook-ran");
    let (config, _temp_dir) = builder
        .pre_hook(&format!("touch {}", marker.display()))
        .post_hook("exit 4")
        .exit_on_error(false)
        .persist();
    let mut runner = ResticRunner::new(config, false, Vec::new());

    let errors = runner.run(&[Action::Backup]);

    assert!(marker.exists());
    assert_eq!(errors, 1);
    let backup = runner.metrics().backup.as_ref().unwrap();
    assert_eq!(backup.pre_hooks.as_ref().map(|h| h.rc), Some(0));
    assert_eq!(backup.post_hooks.as_ref().map(|h| h.rc), Some(4));
}
