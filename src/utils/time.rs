use chrono::{DateTime, Duration, NaiveDate, SubsecRound, Utc};
use std::sync::{Arc, Mutex, PoisonError};

/// Source of "now" for the session engine. Production uses [`SystemClock`];
/// tests drive deadlines with [`ManualClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(0)
}

/// End of the quiz window, truncated to whole seconds.
pub fn deadline(quiz_start: DateTime<Utc>, quiz_duration: Duration) -> DateTime<Utc> {
    truncate_to_seconds(quiz_start + quiz_duration)
}

/// Whole-second time remaining until the deadline; zero or negative once it has passed.
pub fn time_left(quiz_start: DateTime<Utc>, quiz_duration: Duration, now: DateTime<Utc>) -> Duration {
    deadline(quiz_start, quiz_duration) - truncate_to_seconds(now)
}

/// Whole seconds elapsed since `since`, never negative.
pub fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let delta = Duration::seconds((now - since).num_seconds());
    if delta < Duration::zero() {
        Duration::zero()
    } else {
        delta
    }
}

/// Renders a duration the way the quiz client parses it: `1h2m3s`, `29m59s`, `5s`, `-1m0s`, `0s`.
pub fn format_duration(d: Duration) -> String {
    let total = d.num_seconds();
    if total == 0 {
        return "0s".to_string();
    }
    let sign = if total < 0 { "-" } else { "" };
    let secs = total.unsigned_abs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}{}h{}m{}s", sign, h, m, s)
    } else if m > 0 {
        format!("{}{}m{}s", sign, m, s)
    } else {
        format!("{}{}s", sign, s)
    }
}

/// Human label for an invite's validity date, e.g. `Mon Jan 2 2006`.
pub fn deadline_label(validity: NaiveDate) -> String {
    validity.format("%a %b %-d %Y").to_string()
}
