//! Cadence strings and next-due computation.
//!
//! Grammar: `*/N` (every N minutes), `hourly` (top of each hour),
//! `daily` (00:00 local) and `daily@HH:MM` / `daily-at-HH:MM`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Local, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use thiserror::Error;

/// A cadence string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid cadence '{input}': {reason}")]
pub struct CadenceError {
    pub input: String,
    pub reason: String,
}

impl CadenceError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// How often a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Every N minutes, starting immediately.
    Every(u32),
    /// At the top of every hour.
    Hourly,
    /// Once a day at a local time of day.
    DailyAt(NaiveTime),
}

impl Cadence {
    pub fn daily() -> Self {
        Self::DailyAt(NaiveTime::MIN)
    }

    /// First due time for a freshly scheduled job.
    pub fn initial_due(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Every(_) => now,
            _ => self.next_after(now),
        }
    }

    /// Next due time strictly after `now`, anchored in local time.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.next_after_in(&Local, now)
    }

    /// Next due time strictly after `now`, with hourly and daily anchors
    /// in `tz`.
    pub fn next_after_in<Tz: TimeZone>(&self, tz: &Tz, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Self::Every(minutes) => now + Duration::minutes(i64::from(minutes.max(1))),
            Self::Hourly => {
                let local = now.with_timezone(tz).naive_local();
                let hour_start =
                    local.date().and_time(NaiveTime::MIN) + Duration::hours(i64::from(local.hour()));
                (1..=2)
                    .filter_map(|offset| resolve_local(tz, hour_start + Duration::hours(offset)))
                    .find(|candidate| *candidate > now)
                    .unwrap_or_else(|| now + Duration::hours(1))
            }
            Self::DailyAt(at) => {
                let today = now.with_timezone(tz).date_naive();
                (0..=2)
                    .filter_map(|offset| {
                        let day = today + Duration::days(offset);
                        resolve_local(tz, day.and_time(at))
                    })
                    .find(|candidate| *candidate > now)
                    .unwrap_or_else(|| now + Duration::days(1))
            }
        }
    }
}

/// Map a local wall-clock time to UTC. Times skipped by a DST gap resolve
/// to one hour later.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

impl FromStr for Cadence {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim().to_ascii_lowercase();

        if let Some(minutes) = input.strip_prefix("*/") {
            let minutes: u32 = minutes
                .trim()
                .parse()
                .map_err(|_| CadenceError::new(s, "expected */<minutes>"))?;
            if minutes == 0 {
                return Err(CadenceError::new(s, "interval must be at least one minute"));
            }
            return Ok(Self::Every(minutes));
        }

        match input.as_str() {
            "hourly" => return Ok(Self::Hourly),
            "daily" => return Ok(Self::daily()),
            _ => {}
        }

        let time = input
            .strip_prefix("daily@")
            .or_else(|| input.strip_prefix("daily-at-"))
            .ok_or_else(|| CadenceError::new(s, "expected */N, hourly, daily or daily@HH:MM"))?;
        NaiveTime::parse_from_str(time.trim(), "%H:%M")
            .map(Self::DailyAt)
            .map_err(|e| CadenceError::new(s, format!("bad time of day: {}", e)))
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Every(minutes) => write!(f, "*/{}", minutes),
            Self::Hourly => f.write_str("hourly"),
            Self::DailyAt(at) if *at == NaiveTime::MIN => f.write_str("daily"),
            Self::DailyAt(at) => write!(f, "daily@{}", at.format("%H:%M")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, h, m, s).unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!("*/30".parse::<Cadence>().unwrap(), Cadence::Every(30));
        assert_eq!(" Hourly ".parse::<Cadence>().unwrap(), Cadence::Hourly);
        assert_eq!("daily".parse::<Cadence>().unwrap(), Cadence::daily());
        assert_eq!(
            "daily@09:15".parse::<Cadence>().unwrap(),
            Cadence::DailyAt(NaiveTime::from_hms_opt(9, 15, 0).unwrap())
        );
        assert_eq!(
            "daily-at-09:15".parse::<Cadence>().unwrap(),
            "daily@09:15".parse::<Cadence>().unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["*/0", "*/x", "weekly", "", "daily@25:00"] {
            assert!(bad.parse::<Cadence>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_display_round_trips() {
        for s in ["*/5", "hourly", "daily", "daily@07:30"] {
            assert_eq!(s.parse::<Cadence>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_every() {
        let now = at(10, 7, 0);
        assert_eq!(Cadence::Every(30).initial_due(now), now);
        assert_eq!(Cadence::Every(30).next_after_in(&Utc, now), at(10, 37, 0));
    }

    #[test]
    fn test_hourly_is_top_of_next_hour() {
        assert_eq!(Cadence::Hourly.next_after_in(&Utc, at(10, 7, 42)), at(11, 0, 0));
        assert_eq!(Cadence::Hourly.next_after_in(&Utc, at(11, 0, 0)), at(12, 0, 0));
    }

    #[test]
    fn test_hourly_follows_local_hour_in_offset_zone() {
        // UTC+5:30: 10:07 UTC is 15:37 local, so the next top of hour is
        // 16:00 local, 10:30 UTC.
        let tz = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        assert_eq!(Cadence::Hourly.next_after_in(&tz, at(10, 7, 0)), at(10, 30, 0));
        assert_eq!(Cadence::Hourly.next_after_in(&tz, at(10, 30, 0)), at(11, 30, 0));
    }

    #[test]
    fn test_daily_is_strictly_after_now() {
        let daily = Cadence::daily();
        assert_eq!(
            daily.next_after_in(&Utc, at(0, 0, 0)),
            Utc.with_ymd_and_hms(2026, 5, 11, 0, 0, 0).unwrap()
        );

        let nine = Cadence::DailyAt(NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(nine.next_after_in(&Utc, at(8, 59, 59)), at(9, 0, 0));
    }

    #[test]
    fn test_daily_uses_timezone() {
        // 00:00 at UTC+2 is 22:00 UTC the previous day.
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let next = Cadence::daily().next_after_in(&tz, at(21, 0, 0));
        assert_eq!(next, at(22, 0, 0));
    }
}
