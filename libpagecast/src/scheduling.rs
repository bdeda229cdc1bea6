//! Posting cadence and time parsing
//!
//! An account publishes at its preferred local time of day, every
//! `Recurrence::interval_days` days. Manual rescheduling accepts the same
//! human-friendly strings as the rest of the tools.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};

use crate::types::Recurrence;
use crate::{PagecastError, Result};

/// Time of day used when an account's preferred time is unusable
pub const DEFAULT_POST_TIME: (u32, u32) = (10, 0);

/// Cadence inputs taken from an account
#[derive(Debug, Clone)]
pub struct Cadence<'a> {
    pub recurrence: Recurrence,
    pub custom_days: i64,
    pub preferred_time: &'a str,
    pub utc_offset_minutes: i32,
}

/// Parse "HH:MM" (24h)
pub fn parse_preferred_time(input: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M").ok()
}

/// Compute the next `count` publication times after `start_from`
///
/// The first time is today's preferred local time, pushed to tomorrow when
/// it is not strictly in the future; subsequent times follow at the
/// recurrence interval. Times past chrono's range are an input error.
pub fn cadence_dates(
    cadence: &Cadence<'_>,
    start_from: DateTime<Utc>,
    count: u32,
) -> Result<Vec<DateTime<Utc>>> {
    let time = parse_preferred_time(cadence.preferred_time).unwrap_or_else(|| {
        NaiveTime::from_hms_opt(DEFAULT_POST_TIME.0, DEFAULT_POST_TIME.1, 0).unwrap_or(NaiveTime::MIN)
    });
    let offset = Duration::minutes(i64::from(cadence.utc_offset_minutes));
    let interval_days = cadence.recurrence.interval_days(cadence.custom_days);
    let out_of_range = || {
        PagecastError::InvalidInput(format!(
            "Cannot schedule {} posts every {} days: date out of range",
            count, interval_days
        ))
    };

    let local_now = start_from
        .naive_utc()
        .checked_add_signed(offset)
        .ok_or_else(out_of_range)?;
    let mut local = local_now.date().and_time(time);
    if local <= local_now {
        local = local
            .checked_add_signed(Duration::days(1))
            .ok_or_else(out_of_range)?;
    }

    (0..i64::from(count))
        .map(|n| {
            interval_days
                .checked_mul(n)
                .and_then(Duration::try_days)
                .and_then(|step| local.checked_add_signed(step))
                .and_then(|at| at.checked_sub_signed(offset))
                .map(|at| at.and_utc())
                .ok_or_else(out_of_range)
        })
        .collect()
}

/// Parse a schedule string into a DateTime
///
/// Supports:
/// - RFC 3339 timestamps: "2025-11-20T15:00:00Z"
/// - Plain UTC timestamps: "2025-11-20 15:00"
/// - Relative durations: "1h", "30m", "2d"
/// - Natural language: "tomorrow", "next week", "in 1 hour"
pub fn parse_schedule(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PagecastError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return Ok(naive.and_utc());
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        let seconds = i64::try_from(duration.as_secs())
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| PagecastError::InvalidInput("Duration out of range".to_string()))?;
        return Ok(Utc::now() + seconds);
    }

    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us).map_err(|_| {
        PagecastError::InvalidInput(format!("Could not parse schedule string: {}", input))
    })
}
