//! Test fixtures and sample data
//!
//! Captured restic output for every parsed action, plus helpers writing
//! stand-in executables for tests that spawn real processes.

use std::fs;
use std::path::{Path, PathBuf};

pub const BACKUP_OUTPUT: &str = "\
open repository
repository 2b0a3d8e opened (version 2, compression level auto)
lock repository
using parent snapshot 8d3a1e2f
load index files

Files:          12 new,     3 changed,   885 unmodified
Dirs:            2 new,     5 changed,   140 unmodified
Added to the repository: 1.234 MiB (600.512 KiB stored)

processed 900 files, 2.575 GiB in 1:02:03
snapshot 4f9c1a7b saved
";

pub const FORGET_OUTPUT: &str = "\
Applying Policy: keep 3 latest snapshots
keep 3 snapshots:
ID        Time                 Host        Tags        Reasons        Paths
-----------------------------------------------------------------------------
4f9c1a7b  2024-03-01 02:00:01  backup-host             last snapshot  /srv
-----------------------------------------------------------------------------
3 snapshots

remove 2 snapshots:
ID        Time                 Host        Tags        Paths
---------------------------------------------------------------
1a2b3c4d  2024-02-01 02:00:01  backup-host             /srv
---------------------------------------------------------------
2 snapshots
";

pub const PRUNE_OUTPUT: &str = "\
loading indexes...
loading all snapshots...
finding data that is still in use for 10 snapshots
searching used packs...
collecting packs for deletion and repacking

to repack:            69 blobs / 1.078 MiB
this removes:         67 blobs / 1.047 MiB
to delete:             7 blobs / 25.726 KiB
total prune:          74 blobs / 1.072 MiB
remaining:         16245 blobs / 4.233 GiB
unused size after prune: 0 B (0.00% of remaining size)

repacking packs
done
";

pub const LEGACY_PRUNE_OUTPUT: &str = "\
counting files in repo
building new index for repo
[0:01] 100.00%  40 / 40 packs
repository contains 40 packs (1291 blobs) with 100.602 MiB
processed 1291 blobs: 0 duplicate blobs, 0 B duplicate
load all snapshots
find data that is still in use for 4 snapshots
[0:00] 100.00%  4 / 4 snapshots
found 1289 of 1291 data blobs still in use, removing 2 blobs
will remove 0 invalid files
will delete 1 packs and rewrite 1 packs, this frees 3.302 KiB
counting files in repo
[0:00] 100.00%  39 / 39 packs
finding old index files
saved new indexes as [a1b2c3d4]
remove 5 old index files
done
";

pub const CHECK_OUTPUT: &str = "\
using temporary cache in /tmp/restic-check-cache-123
create exclusive lock for repository
load indexes
check all packs
check snapshots, trees and blobs
no errors were found
";

pub const CHECK_ERRORS_OUTPUT: &str = "\
load indexes
check all packs
error: load <snapshot/1234>: file does not exist
Pack ID does not match, want 5e8a, got 9b2c
Fatal: repository contains errors
";

pub const STATS_OUTPUT: &str =
    r#"{"total_size":18148185424,"total_file_count":885276,"snapshots_count":20}"#;

/// Write an executable shell script into `dir`
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("Failed to make script executable");
    path
}

/// A fake restic printing canned output per subcommand
///
/// The subcommand is the third argument (`-r <repo> <action>`). Backup of a
/// repository path containing `broken` fails with rc 1.
#[cfg(unix)]
pub fn fake_restic(dir: &Path) -> PathBuf {
    let body = format!(
        r#"case "$2" in *broken*) echo "Fatal: unable to open repository" >&2; exit 1;; esac
case "$3" in
  backup) cat <<'OUT'
{backup}OUT
  ;;
  forget) cat <<'OUT'
{forget}OUT
  ;;
  prune) cat <<'OUT'
{prune}OUT
  ;;
  check) cat <<'OUT'
{check}OUT
  ;;
  stats) echo '{stats}' ;;
  *) echo "$3 done" ;;
esac"#,
        backup = BACKUP_OUTPUT,
        forget = FORGET_OUTPUT,
        prune = PRUNE_OUTPUT,
        check = CHECK_OUTPUT,
        stats = STATS_OUTPUT,
    );
    write_script(dir, "restic", &body)
}

/// A command failing until it ran `succeed_on` times, counted in a file
///
/// Returns the shell command line to run.
pub fn retry_counter_command(dir: &Path, name: &str, succeed_on: u32) -> String {
    let counter = dir.join(format!("retry_{}", name));
    format!(
        r#"n=$(cat "{c}" 2>/dev/null || echo 0); n=$((n+1)); echo $n > "{c}"; echo "try $n/{max}"; [ $n -ge {max} ]"#,
        c = counter.display(),
        max = succeed_on
    )
}
