//! Per-contact send loop: login wait, send with retries, pacing, checkpoints.
use anyhow::bail;
use chrono::{Local, NaiveDate, Utc};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::browser::{BrowserLauncher, BrowserSession, Role};
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::contacts::{self, normalize_phone, ContactsError};
use crate::model::{ContactRecord, RunConfig, RunEnd, RunState, RunSummary, SendOutcome};
use crate::poll::{poll_until, PollOutcome};
use crate::render;
use crate::sink::ProgressSink;

const ATTACH_MENU_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid run configuration: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Contacts(#[from] ContactsError),
    #[error("{0:#}")]
    Template(anyhow::Error),
    #[error("image not found: {}", .0.display())]
    MissingImage(PathBuf),
    #[error("failed to start browser session: {0:#}")]
    SessionStart(anyhow::Error),
    #[error("login not detected after {0} polls")]
    LoginTimeout(u32),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl RunError {
    /// Errors raised before any browser action.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            RunError::InvalidConfig(_)
                | RunError::Contacts(_)
                | RunError::Template(_)
                | RunError::MissingImage(_)
        )
    }
}

/// Input files for one run.
#[derive(Debug, Clone)]
pub struct SendJob {
    pub contacts: PathBuf,
    pub template: Option<PathBuf>,
    pub image: Option<PathBuf>,
}

pub struct Sender {
    launcher: Arc<dyn BrowserLauncher>,
    store: CheckpointStore,
    sink: Arc<dyn ProgressSink>,
    today: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl Sender {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        store: CheckpointStore,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            launcher,
            store,
            sink,
            today: local_today,
        }
    }

    /// Override the calendar used for the daily counter.
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Run the whole batch. Configuration problems are returned before the
    /// browser is touched; afterwards only session start, login and checkpoint
    /// writes can fail the run.
    #[instrument(skip_all, fields(contacts = %job.contacts.display()))]
    pub async fn run(
        &self,
        job: &SendJob,
        cfg: &RunConfig,
        cancel: CancellationToken,
    ) -> Result<RunSummary, RunError> {
        cfg.validate().map_err(RunError::InvalidConfig)?;
        let contacts = contacts::load(&job.contacts)?;
        let template =
            render::load_template(job.template.as_deref()).map_err(RunError::Template)?;
        if let Some(image) = &job.image {
            if !image.is_file() {
                return Err(RunError::MissingImage(image.clone()));
            }
        }

        let mut state = self.store.load_on((self.today)());
        let start = if cfg.resume { state.last_index } else { 0 };
        let total = contacts.len();
        info!(total, start, sent_today = state.sent_today, "run starting");

        if start >= total {
            self.sink.log(&format!(
                "Nothing to send: {} contacts, checkpoint at {}. Start fresh to send again.",
                total, start
            ));
            self.sink.status("Idle");
            return Ok(RunSummary {
                end: RunEnd::NothingToDo,
                sent: 0,
                skipped: 0,
                failed: 0,
                next_index: start,
                total,
            });
        }

        let session = match self.launcher.launch().await {
            Ok(session) => session,
            Err(err) => {
                self.sink.warn(&format!("Failed to launch browser: {:#}", err));
                return Err(RunError::SessionStart(err));
            }
        };
        self.sink.log("Opened browser. Loading WhatsApp Web...");

        let run = Run {
            sender: self,
            session: session.as_ref(),
            cfg,
            contacts: &contacts,
            template: &template,
            image: job.image.as_deref(),
            cancel: &cancel,
        };
        let result = match run.await_login().await {
            Ok(()) => run.send_all(&mut state, start).await,
            Err(err) => Err(err),
        };

        self.sink.log("Sending loop finished. Closing browser.");
        if let Err(err) = session.close().await {
            debug!(?err, "failed to close browser session");
        }
        self.sink.status("Idle");
        result
    }
}

/// Borrowed context of one run once the browser is up.
struct Run<'a> {
    sender: &'a Sender,
    session: &'a dyn BrowserSession,
    cfg: &'a RunConfig,
    contacts: &'a [ContactRecord],
    template: &'a str,
    image: Option<&'a Path>,
    cancel: &'a CancellationToken,
}

impl<'a> Run<'a> {
    fn log(&self, line: impl AsRef<str>) {
        self.sender.sink.log(line.as_ref());
    }

    fn warn(&self, line: impl AsRef<str>) {
        self.sender.sink.warn(line.as_ref());
    }

    async fn await_login(&self) -> Result<(), RunError> {
        let t = &self.cfg.timings;
        self.session
            .navigate(&self.cfg.endpoints.home_url)
            .await
            .map_err(RunError::SessionStart)?;

        self.log("Waiting for WhatsApp login (scan the QR code)...");
        if composer_ready(self.session, t.login_ticks, t.poll_interval).await {
            self.log("Logged into WhatsApp Web. Starting sends.");
            Ok(())
        } else {
            self.warn("Login not detected within timeout. Aborting.");
            Err(RunError::LoginTimeout(t.login_ticks))
        }
    }

    async fn send_all(&self, state: &mut RunState, start: usize) -> Result<RunSummary, RunError> {
        let total = self.contacts.len();
        let mut summary = RunSummary {
            end: RunEnd::Finished,
            sent: 0,
            skipped: 0,
            failed: 0,
            next_index: start,
            total,
        };
        let mut since_pause = 0u32;
        self.sender.sink.progress(start, total);

        for (i, contact) in self.contacts.iter().enumerate().skip(start) {
            if self.cancel.is_cancelled() {
                self.log(format!("Stop requested. Ending before contact {}.", i + 1));
                summary.end = RunEnd::Stopped;
                break;
            }

            let today = (self.sender.today)();
            state.roll_over(today);

            let Some(phone) = normalize_phone(&contact.phone) else {
                self.warn(format!(
                    "Skipping invalid phone for contact {}: {:?}",
                    i + 1,
                    contact.phone
                ));
                self.record(state, &mut summary, i, SendOutcome::SkippedInvalidPhone, today)?;
                continue;
            };

            if state.sent_today >= self.cfg.daily_limit {
                self.log(format!(
                    "Daily limit {} reached. Saved progress at index {}.",
                    self.cfg.daily_limit, i
                ));
                state.advance(i, today);
                self.sender.store.save(state)?;
                summary.next_index = i;
                summary.end = RunEnd::DailyLimitReached;
                break;
            }

            let message = render::message_for(contact, self.template);
            if message.trim().is_empty() && self.image.is_none() {
                self.warn(format!(
                    "Skipping contact {}: empty message and no image to send",
                    i + 1
                ));
                self.record(state, &mut summary, i, SendOutcome::SkippedEmptyMessage, today)?;
                continue;
            }

            self.log(format!(
                "Sending to {} ({}) [{}/{}]",
                contact.name,
                phone,
                i + 1,
                total
            ));
            let outcome = self.send_with_retries(i, &phone, &message).await;
            self.record(state, &mut summary, i, outcome, today)?;

            if outcome == SendOutcome::Sent {
                self.sender.sink.progress(i + 1, total);
                self.sender
                    .sink
                    .status(&format!("Last sent: {} ({})", contact.name, phone));
                self.log(format!(
                    "Sent to {}. Sent today: {}",
                    contact.name, state.sent_today
                ));
            }

            if outcome == SendOutcome::Stopped || self.cancel.is_cancelled() {
                self.log("Stop requested. Ending loop after this contact.");
                summary.end = RunEnd::Stopped;
                break;
            }

            if outcome == SendOutcome::Sent {
                let delay = uniform_secs(self.cfg.min_delay, self.cfg.max_delay);
                self.log(format!(
                    "Waiting {} seconds before next send...",
                    delay.as_secs()
                ));
                self.pause(delay).await;

                since_pause += 1;
                if self.cfg.auto_pause_every > 0 && since_pause >= self.cfg.auto_pause_every {
                    let pause = uniform_secs(self.cfg.auto_pause_min, self.cfg.auto_pause_max);
                    self.log(format!("Auto-pause for {} seconds.", pause.as_secs()));
                    self.pause(pause).await;
                    since_pause = 0;
                }
            }
        }

        info!(
            sent = summary.sent,
            skipped = summary.skipped,
            failed = summary.failed,
            next_index = summary.next_index,
            end = ?summary.end,
            "run ended"
        );
        Ok(summary)
    }

    /// Apply a contact's outcome to the state and persist it. A stopped
    /// contact leaves the checkpoint untouched so it is retried on resume.
    fn record(
        &self,
        state: &mut RunState,
        summary: &mut RunSummary,
        index: usize,
        outcome: SendOutcome,
        today: NaiveDate,
    ) -> Result<(), CheckpointError> {
        match outcome {
            SendOutcome::Stopped => return Ok(()),
            SendOutcome::Sent => {
                state.sent_today += 1;
                summary.sent += 1;
            }
            SendOutcome::SkippedInvalidPhone | SendOutcome::SkippedEmptyMessage => {
                summary.skipped += 1;
            }
            SendOutcome::FailedAfterRetries => summary.failed += 1,
        }
        state.advance(index + 1, today);
        summary.next_index = index + 1;
        debug!(index, outcome = outcome.as_str(), "contact processed");
        self.sender.store.save(state)
    }

    async fn send_with_retries(&self, index: usize, phone: &str, message: &str) -> SendOutcome {
        let max = self.cfg.max_retries_per_contact;
        for attempt in 1..=max {
            if self.cancel.is_cancelled() {
                self.log("Stop requested while retrying.");
                return SendOutcome::Stopped;
            }
            self.log(format!("  Attempt {}/{} for {}", attempt, max, phone));
            match self.attempt_send(phone, message).await {
                Ok(()) => return SendOutcome::Sent,
                Err(err) => {
                    self.warn(format!(
                        "  Error during attempt {} for contact {} ({}): {:#}",
                        attempt,
                        index + 1,
                        phone,
                        err
                    ));
                    if attempt < max {
                        let backoff = self.cfg.timings.retry_backoff;
                        self.log(format!("  Retrying in {} seconds...", backoff.as_secs()));
                        self.pause(backoff).await;
                    }
                }
            }
        }
        self.warn(format!("  All attempts failed for {}. Moving on.", phone));
        SendOutcome::FailedAfterRetries
    }

    async fn attempt_send(&self, phone: &str, message: &str) -> anyhow::Result<()> {
        let t = &self.cfg.timings;
        let url = self.cfg.endpoints.chat_url_for(phone, Utc::now().timestamp());
        self.session.navigate(&url).await?;
        tokio::time::sleep(uniform_between(t.settle_min, t.settle_max)).await;

        if !composer_ready(self.session, t.chat_ready_ticks, t.poll_interval).await {
            bail!("chat input not found or not ready");
        }

        match self.image {
            Some(image) => self.attach_image(image).await?,
            None => self.focus_composer().await,
        }

        if let Err(err) = self.type_and_submit(message).await {
            self.warn(format!("  Failed to press Enter: {:#}. Trying send button.", err));
            if matches!(self.session.is_present(Role::SendButton).await, Ok(true)) {
                self.session.click(Role::SendButton).await?;
            } else {
                return Err(err);
            }
        }
        Ok(())
    }

    async fn attach_image(&self, image: &Path) -> anyhow::Result<()> {
        match self.session.is_present(Role::AttachButton).await {
            Ok(true) => match self.session.click(Role::AttachButton).await {
                Ok(()) => tokio::time::sleep(ATTACH_MENU_DELAY).await,
                Err(err) => {
                    self.warn(format!("  Error clicking attach icon ({:#}); sending text only.", err))
                }
            },
            Ok(false) => self.warn("  Attach icon not found; sending text only."),
            Err(err) => self.warn(format!("  Error looking for attach icon ({:#}); sending text only.", err)),
        }

        if matches!(self.session.is_present(Role::FileInput).await, Ok(true)) {
            self.session.upload_file(Role::FileInput, image).await?;
            let t = &self.cfg.timings;
            tokio::time::sleep(uniform_between(t.settle_min, t.settle_max)).await;
        }
        // Caption box after an upload, plain chat input otherwise.
        self.focus_composer().await;
        Ok(())
    }

    async fn focus_composer(&self) {
        if let Err(err) = self.session.click(Role::Composer).await {
            debug!(?err, "could not focus composer");
        }
    }

    async fn type_and_submit(&self, message: &str) -> anyhow::Result<()> {
        if !message.is_empty() {
            self.session.type_text(message).await?;
        }
        self.session.press_key("Enter").await
    }

    /// Sleep that ends early on a stop request.
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.cancel.cancelled() => {}
        }
    }
}

async fn composer_ready(session: &dyn BrowserSession, ticks: u32, interval: Duration) -> bool {
    let outcome = poll_until(ticks, interval, move || async move {
        matches!(session.is_present(Role::Composer).await, Ok(true))
    })
    .await;
    outcome == PollOutcome::Found
}

fn uniform_secs(min: f64, max: f64) -> Duration {
    let secs = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    Duration::from_secs_f64(secs.max(0.0))
}

fn uniform_between(min: Duration, max: Duration) -> Duration {
    uniform_secs(min.as_secs_f64(), max.as_secs_f64())
}
