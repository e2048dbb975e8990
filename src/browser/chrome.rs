use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{BrowserLauncher, BrowserSession, Role};
use crate::config::{Config, Selectors};

/// Auto-pauses can last minutes; the DevTools connection must outlive them.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const WINDOW_SIZE: (u32, u32) = (1280, 900);

/// Launches a Chromium instance through the DevTools protocol.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    headless: bool,
    chrome_path: Option<PathBuf>,
    user_data_dir: Option<PathBuf>,
    type_delay: Duration,
    selectors: Selectors,
}

impl ChromeLauncher {
    pub fn from_config(cfg: &Config) -> Self {
        let non_empty = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
        };
        Self {
            headless: cfg.browser.headless,
            chrome_path: non_empty(&cfg.browser.chrome_path),
            user_data_dir: non_empty(&cfg.browser.user_data_dir),
            type_delay: Duration::from_millis(cfg.browser.type_delay_ms),
            selectors: cfg.browser.selectors.clone(),
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let opts = self.clone();
        let (browser, tab) = tokio::task::spawn_blocking(move || -> Result<(Browser, Arc<Tab>)> {
            let options = LaunchOptions::default_builder()
                .headless(opts.headless)
                .path(opts.chrome_path.clone())
                .user_data_dir(opts.user_data_dir.clone())
                .idle_browser_timeout(IDLE_TIMEOUT)
                .window_size(Some(WINDOW_SIZE))
                .build()
                .map_err(|e| anyhow!("invalid browser launch options: {}", e))?;
            let browser = Browser::new(options).context("failed to launch Chromium")?;
            let tab = browser.new_tab().context("failed to open a browser tab")?;
            Ok((browser, tab))
        })
        .await
        .context("browser launch task panicked")??;

        info!(headless = self.headless, "browser launched");
        Ok(Box::new(ChromeSession {
            _browser: browser,
            tab,
            selectors: self.selectors.clone(),
            type_delay: self.type_delay,
        }))
    }
}

/// One tab of a launched Chromium. Dropping it kills the browser process.
pub struct ChromeSession {
    _browser: Browser,
    tab: Arc<Tab>,
    selectors: Selectors,
    type_delay: Duration,
}

impl fmt::Debug for ChromeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromeSession")
            .field("selectors", &self.selectors)
            .finish_non_exhaustive()
    }
}

impl ChromeSession {
    fn selector(&self, role: Role) -> String {
        let s = &self.selectors;
        match role {
            Role::Composer => s.composer.clone(),
            Role::AttachButton => s.attach.clone(),
            Role::FileInput => s.file_input.clone(),
            Role::SendButton => s.send_button.clone(),
        }
    }

    /// DevTools calls block; run them off the async workers.
    async fn on_tab<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .context("browser task panicked")?
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!(url, "navigate");
        let url = url.to_string();
        self.on_tab(move |tab| {
            tab.navigate_to(&url)?
                .wait_until_navigated()
                .with_context(|| format!("navigation to {} did not finish", url))?;
            Ok(())
        })
        .await
    }

    async fn is_present(&self, role: Role) -> Result<bool> {
        let sel = self.selector(role);
        self.on_tab(move |tab| Ok(tab.find_element(&sel).is_ok())).await
    }

    async fn click(&self, role: Role) -> Result<()> {
        let sel = self.selector(role);
        self.on_tab(move |tab| {
            tab.find_element(&sel)
                .with_context(|| format!("{} not found", role.as_str()))?
                .click()?;
            Ok(())
        })
        .await
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        let text = text.to_string();
        let delay = self.type_delay;
        self.on_tab(move |tab| {
            if delay.is_zero() {
                tab.type_str(&text)?;
                return Ok(());
            }
            let mut buf = [0u8; 4];
            for ch in text.chars() {
                tab.type_str(ch.encode_utf8(&mut buf))?;
                std::thread::sleep(delay);
            }
            Ok(())
        })
        .await
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.on_tab(move |tab| {
            tab.press_key(&key)?;
            Ok(())
        })
        .await
    }

    async fn upload_file(&self, role: Role, path: &Path) -> Result<()> {
        let sel = self.selector(role);
        let file = path.to_string_lossy().into_owned();
        self.on_tab(move |tab| {
            tab.find_element(&sel)
                .with_context(|| format!("{} not found", role.as_str()))?
                .set_input_files(&[file.as_str()])?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        self.on_tab(|tab| {
            tab.close(false)?;
            Ok(())
        })
        .await
    }
}
