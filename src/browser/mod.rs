//! Browser capability used by the sender.
//!
//! The sender only speaks in element roles; which DOM node backs a role is the
//! adapter's business (see `chrome` for the Chromium implementation).

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

pub mod chrome;

pub use chrome::{ChromeLauncher, ChromeSession};

/// Elements of the chat page the sender interacts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Message input; its presence also signals a logged-in session.
    Composer,
    AttachButton,
    FileInput,
    SendButton,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Composer => "composer",
            Role::AttachButton => "attach_button",
            Role::FileInput => "file_input",
            Role::SendButton => "send_button",
        }
    }
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn is_present(&self, role: Role) -> Result<bool>;

    async fn click(&self, role: Role) -> Result<()>;

    async fn type_text(&self, text: &str) -> Result<()>;

    async fn press_key(&self, key: &str) -> Result<()>;

    async fn upload_file(&self, role: Role, path: &Path) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}
