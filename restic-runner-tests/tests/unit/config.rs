//! Unit tests for configuration loading and discovery

use restic_runner::config::{configuration_file_paths, load_config, validate_config};
use test_utils::test_context::ResultAssertions;
use test_utils::*;

#[test]
fn test_load_toml_config() {
    let ctx = TestContext::new();
    let path = ctx.create_file(
        "nightly.toml",
        r#"
repositories = ["/srv/restic", "rest:https://user:pw@backup.example.com/host"]

[environment]
RESTIC_PASSWORD = "secret"

[execution]
parallel = true
retry_count = 2
retry_backoff = "0:30 exponential"

[backup]
sources = ["/etc", "/home"]
exclude_patterns = ["*.tmp"]

[prune]
keep-last = 3
keep-tag = ["important", "monthly"]
group-by = "host"

[check]
checks = ["check-unused"]

[metrics.prometheus]
path = "/var/lib/node_exporter/restic.prom"
password_replacement = "XXX"
"#,
    );

    let config = load_config(&path).assert_ok();

    assert_eq!(config.name, "nightly.toml");
    assert_eq!(config.repositories.len(), 2);
    assert!(config.execution.parallel);
    assert!(config.execution.exit_on_error);
    assert_eq!(config.execution.retry_count, 2);
    assert_eq!(config.password_replacement(), "XXX");
    assert_eq!(
        config.prune.forget_flags(),
        vec![
            "--keep-last",
            "3",
            "--keep-tag",
            "important",
            "--keep-tag",
            "monthly",
            "--group-by",
            "host"
        ]
    );
    assert!(config.check.check_unused());
    assert!(!config.check.read_data());
}

#[test]
fn test_load_json_config_round_trip() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .name("json-config")
            .keep("keep-daily", RetentionValue::Count(7))
            .pre_hook("echo before"),
    );

    let loaded = load_config(ctx.config_path().unwrap()).assert_ok();

    assert_eq!(loaded.name, "json-config");
    assert_eq!(loaded.backup.pre_hooks, vec!["echo before"]);
    assert_eq!(loaded.prune.forget_flags(), vec!["--keep-daily", "7"]);
    assert_eq!(
        loaded.environment.get("RESTIC_PASSWORD").map(String::as_str),
        Some("test-password-123")
    );
}

#[test]
fn test_missing_repositories_rejected() {
    let ctx = TestContext::new();
    let path = ctx.create_file("empty.toml", "repositories = []\n");

    load_config(&path).assert_err_contains("No repositories defined");
}

#[test]
fn test_invalid_toml_rejected() {
    let ctx = TestContext::new();
    let path = ctx.create_file("broken.toml", "repositories = [\n");

    load_config(&path).assert_err_contains("Failed to parse TOML file");
}

#[test]
fn test_invalid_backoff_rejected() {
    let config = ConfigBuilder::minimal().retry(3, Some("whenever")).build();
    validate_config(&config).assert_err_contains("Invalid retry_backoff");
}

#[test]
fn test_directory_discovery_is_sorted_and_filtered() {
    let ctx = TestContext::new();
    let dir = ctx.temp_dir().join("runrestic");
    std::fs::create_dir_all(&dir).unwrap();
    for name in ["b.toml", "a.json", "notes.txt"] {
        let path = dir.join(name);
        std::fs::write(&path, "repositories = [\"x\"]\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        }
    }

    let found = configuration_file_paths(&[dir.clone(), ctx.temp_dir().join("missing.toml")]);

    assert_eq!(found, vec![dir.join("a.json"), dir.join("b.toml")]);
}

#[cfg(unix)]
#[test]
fn test_open_permissions_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let ctx = TestContext::new();
    let path = ctx.create_file("open.toml", "repositories = [\"x\"]\n");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

    assert!(configuration_file_paths(&[path]).is_empty());
}
