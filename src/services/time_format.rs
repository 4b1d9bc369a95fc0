use crate::services::error::{HubError, HubResult};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";
const ABSOLUTE_FORMAT: &str = "%B %-d at %-I:%M %p %Z";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone)]
pub struct TimeFormatter {
    display_tz: Tz,
    clock: Arc<dyn Clock>,
}

impl Default for TimeFormatter {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl TimeFormatter {
    pub fn new(display_tz: Tz) -> Self {
        Self {
            display_tz,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// `"on <absolute> (which was <relative>)."` against the formatter's clock.
    pub fn format(&self, ts: DateTime<Utc>) -> String {
        self.format_at(ts, self.now())
    }

    pub fn format_at(&self, ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
        format!(
            "on {} (which was {}).",
            self.absolute_phrase(ts),
            relative_phrase(now - ts)
        )
    }

    pub fn absolute_phrase(&self, ts: DateTime<Utc>) -> String {
        ts.with_timezone(&self.display_tz)
            .format(ABSOLUTE_FORMAT)
            .to_string()
    }
}

// largest unit above one wins, then its singular, in fixed order; a reading
// 1 day 5 hours old is "1 day ago"
pub fn relative_phrase(elapsed: Duration) -> String {
    let elapsed = elapsed.max(Duration::zero());
    let days = elapsed.num_days();
    let hours = elapsed.num_hours() % 24;
    let minutes = elapsed.num_minutes() % 60;

    if days > 1 {
        format!("{days} days ago")
    } else if days == 1 {
        "1 day ago".to_string()
    } else if hours > 1 {
        format!("{hours} hours ago")
    } else if hours == 1 {
        "1 hour ago".to_string()
    } else if minutes > 1 {
        format!("{minutes} minutes ago")
    } else {
        "just now".to_string()
    }
}

/// Parses a store timestamp into UTC. Fractions shorter than microseconds are
/// right-padded, longer ones truncated; a missing offset is read as UTC.
pub fn parse_timestamp(raw: &str) -> HubResult<DateTime<Utc>> {
    let normalized = normalize_timestamp(raw).ok_or_else(|| HubError::Format(raw.to_string()))?;
    DateTime::parse_from_str(&normalized, TIMESTAMP_FORMAT)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| HubError::Format(raw.to_string()))
}

fn normalize_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let date_time = raw.get(..19)?;
    let rest = raw.get(19..)?;
    let date_time = match date_time.as_bytes().get(10) {
        Some(b' ') => date_time.replacen(' ', "T", 1),
        _ => date_time.to_string(),
    };

    let (fraction, offset) = match rest.strip_prefix('.') {
        Some(after) => {
            let end = after
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after.len());
            if end == 0 {
                return None;
            }
            after.split_at(end)
        }
        None => ("", rest),
    };

    let mut micros: String = fraction.chars().take(6).collect();
    while micros.len() < 6 {
        micros.push('0');
    }

    let offset = normalize_offset(offset.trim())?;
    Some(format!("{date_time}.{micros}{offset}"))
}

fn normalize_offset(offset: &str) -> Option<String> {
    if offset.is_empty() || offset.eq_ignore_ascii_case("z") {
        return Some("+00:00".to_string());
    }

    let mut chars = offset.chars();
    let sign = chars.next()?;
    if sign != '+' && sign != '-' {
        return None;
    }
    let digits = chars.as_str().replace(':', "");
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match digits.len() {
        2 => Some(format!("{sign}{digits}:00")),
        4 => Some(format!("{sign}{}:{}", &digits[..2], &digits[2..])),
        _ => None,
    }
}
