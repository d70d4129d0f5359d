//! Duration strings used throughout `surge.toml`.

use std::time::Duration;

/// Parse a duration string like "500ms", "30s", "5m", "1h", "7d".
///
/// A bare integer is read as seconds. Returns `None` for anything else.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        scaled(mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        scaled(hours, 3600)
    } else if let Some(days) = s.strip_suffix('d') {
        scaled(days, 86_400)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// `n * unit_secs` seconds, or `None` on a bad number or overflow.
fn scaled(n: &str, unit_secs: u64) -> Option<Duration> {
    n.parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(unit_secs))
        .map(Duration::from_secs)
}
