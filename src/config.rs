//! Configuration loader and validator for the bulk sender.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::model::{Endpoints, RunConfig, Timings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub browser: Browser,
    pub sending: Sending,
    pub timeouts: Timeouts,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub state_file: String,
}

/// Browser launch settings and the selectors backing each element role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Browser {
    pub headless: bool,
    #[serde(default)]
    pub chrome_path: Option<String>,
    #[serde(default)]
    pub user_data_dir: Option<String>,
    pub home_url: String,
    pub chat_url: String,
    pub type_delay_ms: u64,
    pub selectors: Selectors,
}

/// CSS selectors per element role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selectors {
    pub composer: String,
    pub attach: String,
    pub file_input: String,
    pub send_button: String,
}

/// Pacing and safety limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sending {
    pub daily_limit: u32,
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    pub auto_pause_every: u32,
    pub auto_pause_min_secs: f64,
    pub auto_pause_max_secs: f64,
    pub resume: bool,
    pub max_retries_per_contact: u32,
    pub retry_backoff_secs: f64,
}

/// Poll limits and settle delays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timeouts {
    pub login_ticks: u32,
    pub chat_ready_ticks: u32,
    pub poll_interval_ms: u64,
    pub settle_min_ms: u64,
    pub settle_max_ms: u64,
}

impl Config {
    /// Ensure parent directories of the state file and the browser profile exist.
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = Path::new(&self.app.state_file).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if let Some(dir) = self.browser.user_data_dir.as_deref() {
            if !dir.trim().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// Per-run settings handed to the sender.
    pub fn run_config(&self) -> RunConfig {
        let s = &self.sending;
        let t = &self.timeouts;
        RunConfig {
            daily_limit: s.daily_limit,
            min_delay: s.min_delay_secs,
            max_delay: s.max_delay_secs,
            auto_pause_every: s.auto_pause_every,
            auto_pause_min: s.auto_pause_min_secs,
            auto_pause_max: s.auto_pause_max_secs,
            resume: s.resume,
            max_retries_per_contact: s.max_retries_per_contact,
            timings: Timings {
                login_ticks: t.login_ticks,
                chat_ready_ticks: t.chat_ready_ticks,
                poll_interval: Duration::from_millis(t.poll_interval_ms),
                retry_backoff: Duration::from_secs_f64(s.retry_backoff_secs),
                settle_min: Duration::from_millis(t.settle_min_ms),
                settle_max: Duration::from_millis(t.settle_max_ms),
            },
            endpoints: Endpoints {
                home_url: self.browser.home_url.clone(),
                chat_url: self.browser.chat_url.clone(),
            },
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.state_file.trim().is_empty() {
        return Err(ConfigError::Invalid("app.state_file must be non-empty"));
    }

    if cfg.browser.home_url.trim().is_empty() {
        return Err(ConfigError::Invalid("browser.home_url must be non-empty"));
    }
    let sel = &cfg.browser.selectors;
    if sel.composer.trim().is_empty() {
        return Err(ConfigError::Invalid("browser.selectors.composer must be non-empty"));
    }
    if sel.attach.trim().is_empty() {
        return Err(ConfigError::Invalid("browser.selectors.attach must be non-empty"));
    }
    if sel.file_input.trim().is_empty() {
        return Err(ConfigError::Invalid("browser.selectors.file_input must be non-empty"));
    }
    if sel.send_button.trim().is_empty() {
        return Err(ConfigError::Invalid("browser.selectors.send_button must be non-empty"));
    }

    if !cfg.sending.retry_backoff_secs.is_finite() || cfg.sending.retry_backoff_secs < 0.0 {
        return Err(ConfigError::Invalid("sending.retry_backoff_secs must be >= 0"));
    }
    if cfg.timeouts.settle_min_ms > cfg.timeouts.settle_max_ms {
        return Err(ConfigError::Invalid(
            "timeouts.settle_min_ms must be <= timeouts.settle_max_ms",
        ));
    }

    cfg.run_config().validate().map_err(ConfigError::Invalid)
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  state_file: "state.json"

browser:
  headless: false
  user_data_dir: "./data/chrome-profile"
  home_url: "https://web.whatsapp.com"
  chat_url: "https://web.whatsapp.com/send?phone={phone}&t={ts}"
  type_delay_ms: 40
  selectors:
    composer: "div[contenteditable='true'][data-tab]"
    attach: "span[data-icon='clip'], span[data-icon='attach-menu-plus'], div[aria-label='Attach']"
    file_input: "input[type='file']"
    send_button: "span[data-icon='send']"

sending:
  daily_limit: 300
  min_delay_secs: 6.0
  max_delay_secs: 12.0
  auto_pause_every: 25
  auto_pause_min_secs: 60.0
  auto_pause_max_secs: 180.0
  resume: true
  max_retries_per_contact: 3
  retry_backoff_secs: 5.0

timeouts:
  login_ticks: 120
  chat_ready_ticks: 30
  poll_interval_ms: 1000
  settle_min_ms: 3000
  settle_max_ms: 6000
"#
}
