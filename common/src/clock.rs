use std::time::Instant;

use chrono::{DateTime, Datelike, FixedOffset, Offset, Utc};
use chrono_tz::Tz;

/// Wall clocks before this year mean SNTP has not synced yet.
const MIN_SYNCED_YEAR: i32 = 2024;

/// Monotonic clock anchored at boot. Shells create it before any network
/// setup so `UpTime` and the fallback timestamps count from power-on.
#[derive(Debug, Clone, Copy)]
pub struct Uptime {
    started: Instant,
}

impl Uptime {
    pub fn start() -> Self {
        Self::since(Instant::now())
    }

    pub fn since(started: Instant) -> Self {
        Self { started }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

pub fn now_in_timezone(timezone: &str) -> Option<DateTime<FixedOffset>> {
    at_in_timezone(Utc::now(), timezone)
}

pub fn at_in_timezone(now: DateTime<Utc>, timezone: &str) -> Option<DateTime<FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = now.with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
}

pub fn is_time_synced(now: DateTime<Utc>) -> bool {
    now.year() >= MIN_SYNCED_YEAR
}

/// Timestamp stored with each reading. Falls back to uptime when the wall
/// clock cannot be trusted.
pub fn reading_timestamp(wall: Option<DateTime<FixedOffset>>, uptime_secs: u64) -> String {
    match wall {
        Some(local) if local.year() >= MIN_SYNCED_YEAR => {
            local.format("%Y-%m-%d %H:%M:%S").to_string()
        }
        _ => format_uptime(uptime_secs),
    }
}

pub fn format_uptime(uptime_secs: u64) -> String {
    let hours = uptime_secs / 3600;
    let minutes = (uptime_secs % 3600) / 60;
    let seconds = uptime_secs % 60;
    format!("+{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn formats_synced_time_in_timezone() {
        let now = Utc.with_ymd_and_hms(2024, 1, 18, 17, 30, 5).unwrap();
        let local = at_in_timezone(now, "America/Los_Angeles");

        assert_eq!(reading_timestamp(local, 99), "2024-01-18 09:30:05");
    }

    #[test]
    fn unsynced_clock_falls_back_to_uptime() {
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 4, 0).unwrap();
        assert!(!is_time_synced(epoch));

        let local = at_in_timezone(epoch, "UTC");
        assert_eq!(reading_timestamp(local, 3_725), "+01:02:05");
        assert_eq!(reading_timestamp(None, 59), "+00:00:59");
    }

    #[test]
    fn unknown_timezone_is_none() {
        assert!(at_in_timezone(Utc::now(), "Mars/Olympus").is_none());
    }

    #[test]
    fn uptime_counts_from_its_anchor() {
        let anchor = Instant::now() - std::time::Duration::from_secs(90);
        let uptime = Uptime::since(anchor);

        assert!(uptime.elapsed_secs() >= 90);
        assert!(uptime.elapsed_ms() >= 90_000);
    }
}
