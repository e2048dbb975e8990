use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Receives operator-facing log lines and progress from a run.
pub trait ProgressSink: Send + Sync {
    fn log(&self, line: &str);

    /// Skips and failures. Falls back to `log`.
    fn warn(&self, line: &str) {
        self.log(line);
    }

    fn progress(&self, current: usize, total: usize);

    fn status(&self, _status: &str) {}
}

/// Forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn log(&self, line: &str) {
        info!("{}", line);
    }

    fn warn(&self, line: &str) {
        warn!("{}", line);
    }

    fn progress(&self, current: usize, total: usize) {
        info!(current, total, "progress");
    }

    fn status(&self, status: &str) {
        info!(status, "status");
    }
}

/// Filter built from `RUST_LOG`-style directives, showing `info` when none are given.
pub fn env_filter(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives.unwrap_or_default())
}
