use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Found,
    TimedOut,
}

/// Run `probe` up to `attempts` times, sleeping `interval` after each miss.
pub async fn poll_until<F, Fut>(attempts: u32, interval: Duration, mut probe: F) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..attempts {
        if probe().await {
            return PollOutcome::Found;
        }
        tokio::time::sleep(interval).await;
    }
    PollOutcome::TimedOut
}
