use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One row of the contacts file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRecord {
    pub name: String,
    pub phone: String,
    pub custom_message: Option<String>,
}

/// Persisted progress of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunState {
    #[serde(default)]
    pub last_index: usize,
    #[serde(default, with = "date_or_empty")]
    pub last_sent_date: Option<NaiveDate>,
    #[serde(default)]
    pub sent_today: u32,
}

impl RunState {
    /// Zero `sent_today` when the recorded date is not `today`.
    pub fn roll_over(&mut self, today: NaiveDate) {
        if self.last_sent_date != Some(today) {
            self.sent_today = 0;
        }
    }

    /// Record progress up to (excluding) `next_index`, stamped with `today`.
    pub fn advance(&mut self, next_index: usize, today: NaiveDate) {
        self.last_index = next_index;
        self.last_sent_date = Some(today);
    }
}

/// Per-contact result of the send loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    SkippedInvalidPhone,
    SkippedEmptyMessage,
    FailedAfterRetries,
    Stopped,
}

impl SendOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendOutcome::Sent => "sent",
            SendOutcome::SkippedInvalidPhone => "skipped_invalid_phone",
            SendOutcome::SkippedEmptyMessage => "skipped_empty_message",
            SendOutcome::FailedAfterRetries => "failed_after_retries",
            SendOutcome::Stopped => "stopped",
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    Finished,
    Stopped,
    DailyLimitReached,
    NothingToDo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub end: RunEnd,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Index the next run resumes from.
    pub next_index: usize,
    pub total: usize,
}

/// Settings supplied once per run; immutable while it executes.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub daily_limit: u32,
    pub min_delay: f64,
    pub max_delay: f64,
    pub auto_pause_every: u32,
    pub auto_pause_min: f64,
    pub auto_pause_max: f64,
    pub resume: bool,
    pub max_retries_per_contact: u32,
    pub timings: Timings,
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    pub login_ticks: u32,
    pub chat_ready_ticks: u32,
    pub poll_interval: Duration,
    pub retry_backoff: Duration,
    pub settle_min: Duration,
    pub settle_max: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            login_ticks: 120,
            chat_ready_ticks: 30,
            poll_interval: Duration::from_secs(1),
            retry_backoff: Duration::from_secs(5),
            settle_min: Duration::from_millis(3000),
            settle_max: Duration::from_millis(6000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub home_url: String,
    /// Chat URL with `{phone}` and optional `{ts}` placeholders.
    pub chat_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            home_url: "https://web.whatsapp.com".into(),
            chat_url: "https://web.whatsapp.com/send?phone={phone}&t={ts}".into(),
        }
    }
}

impl Endpoints {
    pub fn chat_url_for(&self, phone: &str, ts: i64) -> String {
        self.chat_url
            .replace("{phone}", phone)
            .replace("{ts}", &ts.to_string())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            daily_limit: 300,
            min_delay: 6.0,
            max_delay: 12.0,
            auto_pause_every: 25,
            auto_pause_min: 60.0,
            auto_pause_max: 180.0,
            resume: true,
            max_retries_per_contact: 3,
            timings: Timings::default(),
            endpoints: Endpoints::default(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.daily_limit == 0 {
            return Err("sending.daily_limit must be > 0");
        }
        if self.max_retries_per_contact == 0 {
            return Err("sending.max_retries_per_contact must be > 0");
        }
        if !non_negative(self.min_delay) || !non_negative(self.max_delay) {
            return Err("sending.min_delay_secs/max_delay_secs must be finite and >= 0");
        }
        if self.min_delay > self.max_delay {
            return Err("sending.min_delay_secs must be <= sending.max_delay_secs");
        }
        if !non_negative(self.auto_pause_min) || !non_negative(self.auto_pause_max) {
            return Err("sending.auto_pause_min_secs/auto_pause_max_secs must be finite and >= 0");
        }
        if self.auto_pause_min > self.auto_pause_max {
            return Err("sending.auto_pause_min_secs must be <= sending.auto_pause_max_secs");
        }
        if self.timings.poll_interval.is_zero() {
            return Err("timeouts.poll_interval_ms must be > 0");
        }
        if self.timings.login_ticks == 0 || self.timings.chat_ready_ticks == 0 {
            return Err("timeouts.login_ticks/chat_ready_ticks must be > 0");
        }
        if self.timings.settle_min > self.timings.settle_max {
            return Err("timeouts.settle_min_ms must be <= timeouts.settle_max_ms");
        }
        if !self.endpoints.chat_url.contains("{phone}") {
            return Err("browser.chat_url must contain {phone}");
        }
        Ok(())
    }
}

fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

/// `NaiveDate` that reads and writes `""` for a missing date.
mod date_or_empty {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.serialize_str(&d.format("%Y-%m-%d").to_string()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}
