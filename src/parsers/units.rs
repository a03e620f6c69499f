//! Size, duration and line helpers shared by the output parsers

use regex::Regex;
use std::sync::LazyLock;
use tracing::error;

static SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9.]+) ?([a-zA-Z]*B)").expect("valid size regex"));

static TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:([0-9]+):)?([0-9]+):([0-9]+)").expect("valid time regex")
});

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;
const TIB: f64 = GIB * 1024.0;

fn unit_factor(unit: &str) -> Option<f64> {
    let factor = match unit {
        "B" => 1.0,
        "kB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        "KiB" => KIB,
        "MiB" => MIB,
        "GiB" => GIB,
        "TiB" => TIB,
        _ => return None,
    };
    Some(factor)
}

/// Format a byte count using the largest binary unit it fills at least once
pub fn make_size(size: f64) -> String {
    if size >= TIB {
        format!("{:.2} TiB", size / TIB)
    } else if size >= GIB {
        format!("{:.2} GiB", size / GIB)
    } else if size >= MIB {
        format!("{:.2} MiB", size / MIB)
    } else if size >= KIB {
        format!("{:.2} KiB", size / KIB)
    } else {
        format!("{:.0} B", size)
    }
}

/// Parse a human readable size such as `"1.23 GiB"` or `"500 MB"` into bytes
///
/// `kB`/`MB`/`GB`/`TB` are decimal, `KiB`/`MiB`/`GiB`/`TiB` binary.
/// Returns `0.0` (and logs) when the text holds no recognizable size.
pub fn parse_size(size: &str) -> f64 {
    let parsed = SIZE.captures(size).and_then(|caps| {
        let number: f64 = caps[1].parse().ok()?;
        let factor = unit_factor(&caps[2])?;
        Some(number * factor)
    });

    match parsed {
        Some(bytes) => bytes,
        None => {
            error!("Failed to parse size of '{}'", size);
            0.0
        }
    }
}

/// Parse `H:MM:SS` or `MM:SS` into whole seconds
///
/// Returns `0` (and logs) when the text holds no time.
pub fn parse_time(time: &str) -> u64 {
    let Some(caps) = TIME.captures(time) else {
        error!("Failed to parse time of '{}'", time);
        return 0;
    };

    let group = |i: usize| -> u64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };

    group(1)
        .saturating_mul(3600)
        .saturating_add(group(2).saturating_mul(60))
        .saturating_add(group(3))
}

/// Extract the capture groups of the first match of `regex`
///
/// Returns `default` when nothing matches, logging the pattern. Optional
/// groups that did not participate take their default individually.
pub fn parse_line<'a>(regex: &Regex, output: &'a str, default: &[&'a str]) -> Vec<&'a str> {
    match regex.captures(output) {
        Some(caps) => default
            .iter()
            .enumerate()
            .map(|(i, fallback)| caps.get(i + 1).map(|m| m.as_str()).unwrap_or(fallback))
            .collect(),
        None => {
            error!("No match in output for regex '{}'", regex.as_str());
            default.to_vec()
        }
    }
}

/// Parse a captured counter, treating garbage as zero
pub(crate) fn count(value: &str) -> u64 {
    value.trim().parse().unwrap_or_else(|_| {
        error!("Failed to parse count of '{}'", value);
        0
    })
}
