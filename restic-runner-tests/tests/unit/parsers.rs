//! Tests for the restic output parsers

use restic_runner::config::CheckConfig;
use restic_runner::metrics::PruneReport;
use restic_runner::parsers::{
    make_size, parse_backup, parse_check, parse_forget, parse_legacy_prune, parse_new_prune,
    parse_size, parse_stats, parse_time, ParseError, PruneParsers,
};
use rstest::rstest;
use test_utils::*;

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1.0,
        "expected {} to be close to {}",
        actual,
        expected
    );
}

#[test]
fn test_backup_fixture() {
    let metrics = parse_backup(&ProcessResult::single(0, BACKUP_OUTPUT, 3725.2));

    assert_eq!(metrics.files.new, 12);
    assert_eq!(metrics.files.unmodified, 885);
    assert_eq!(metrics.dirs.changed, 5);
    assert_eq!(metrics.processed.files, 900);
    assert_eq!(metrics.processed.duration_seconds, 3723);
    assert_close(metrics.processed.size_bytes, 2.575 * 1024.0 * 1024.0 * 1024.0);
    assert_close(metrics.added_to_repo, 1.234 * 1024.0 * 1024.0);
    assert_eq!(metrics.duration_seconds, 3725.2);
    assert_eq!(metrics.rc, 0);
}

#[test]
fn test_backup_missing_lines_default_to_zero() {
    let metrics = parse_backup(&ProcessResult::single(0, "nothing useful", 1.0));

    assert_eq!(metrics.files.new, 0);
    assert_eq!(metrics.added_to_repo, 0.0);
    assert_eq!(metrics.processed.duration_seconds, 0);
}

#[test]
fn test_forget_fixture() {
    let metrics = parse_forget(&ProcessResult::single(0, FORGET_OUTPUT, 2.0));
    assert_eq!(metrics.removed_snapshots, 2);
    assert_eq!(metrics.duration_seconds, 2.0);
}

#[test]
fn test_new_prune_fixture() {
    let metrics = parse_new_prune(&ProcessResult::single(0, PRUNE_OUTPUT, 4.0)).unwrap();

    assert_eq!(metrics.to_repack_blobs, 69);
    assert_eq!(metrics.total_prune_blobs, 74);
    assert_eq!(metrics.remaining_blobs, 16245);
    assert_close(metrics.to_repack_bytes, 1.078 * 1024.0 * 1024.0);
    assert_eq!(metrics.remaining_unused_size, 0.0);
}

#[test]
fn test_new_prune_rejects_legacy_layout() {
    let result = parse_new_prune(&ProcessResult::single(0, LEGACY_PRUNE_OUTPUT, 4.0));
    assert!(matches!(result, Err(ParseError::StructuralMismatch { .. })));
}

#[test]
fn test_prune_falls_back_to_legacy() {
    let result = ProcessResult::single(0, LEGACY_PRUNE_OUTPUT, 4.0);
    let report = PruneParsers::default().parse(&result);

    assert_eq!(report, PruneReport::Legacy(parse_legacy_prune(&result)));
    match report {
        PruneReport::Legacy(legacy) => {
            assert_eq!(legacy.containing_packs_before, 40);
            assert_eq!(legacy.containing_blobs, 1291);
            assert_eq!(legacy.in_use_blobs, 1289);
            assert_eq!(legacy.removed_blobs, 2);
            assert_eq!(legacy.deleted_packs, 1);
            assert_eq!(legacy.rewritten_packs, 1);
            assert_eq!(legacy.removed_index_files, 5);
            assert_close(legacy.size_freed_bytes, 3.302 * 1024.0);
        }
        other => panic!("expected legacy report, got {:?}", other),
    }
}

#[test]
fn test_prune_prefers_current_layout() {
    let report = PruneParsers::default().parse(&ProcessResult::single(0, PRUNE_OUTPUT, 1.0));
    assert!(matches!(report, PruneReport::Current(_)));
}

#[rstest]
#[case(CHECK_OUTPUT, 0, (0, 0, 0))]
#[case(CHECK_ERRORS_OUTPUT, 1, (1, 1, 1))]
fn test_check_fixtures(#[case] output: &str, #[case] rc: i32, #[case] expected: (u8, u8, u8)) {
    let checks = CheckConfig {
        checks: vec!["read-data".to_string()],
    };
    let metrics = parse_check(&ProcessResult::single(rc, output, 1.0), &checks);

    assert_eq!(
        (metrics.errors, metrics.errors_data, metrics.errors_snapshots),
        expected
    );
    assert_eq!(metrics.read_data, 1);
    assert_eq!(metrics.check_unused, 0);
}

#[test]
fn test_stats_fixture() {
    let metrics = parse_stats(&ProcessResult::single(0, STATS_OUTPUT, 3.0));
    assert_eq!(metrics.total_file_count, 885276);
    assert_eq!(metrics.total_size_bytes, 18148185424);
}

#[rstest]
#[case("01:02:03", 3723)]
#[case("02:03", 123)]
#[case("0:00", 0)]
#[case("soon", 0)]
fn test_parse_time(#[case] input: &str, #[case] expected: u64) {
    assert_eq!(parse_time(input), expected);
}

#[rstest]
#[case("1 kB", 1000.0)]
#[case("1 KiB", 1024.0)]
#[case("1.5 MB", 1_500_000.0)]
#[case("2 GiB", 2_147_483_648.0)]
#[case("garbage", 0.0)]
fn test_parse_size(#[case] input: &str, #[case] expected: f64) {
    assert_eq!(parse_size(input), expected);
}

#[rstest]
#[case(0.0)]
#[case(1023.0)]
#[case(1024.0)]
#[case(1_073_741_824.0)]
#[case(1_099_511_627_776.0)]
fn test_size_magnitude_survives_formatting(#[case] bytes: f64) {
    let parsed = parse_size(&make_size(bytes));
    assert!(
        (parsed - bytes).abs() <= bytes * 0.005 + 0.5,
        "{} became {}",
        bytes,
        parsed
    );
}
