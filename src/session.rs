use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{info, warn};

use crate::agent::AgentError;
use crate::browser::{Browser, BrowserConfig};
use crate::perception::RawElement;

/// Capability seam over the one live page a session owns.
#[async_trait]
pub trait Computer: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), AgentError>;
    async fn interactive_elements(&self) -> Result<Vec<RawElement>, AgentError>;
    async fn click(&self, selector: &str) -> Result<(), AgentError>;
    async fn fill(&self, selector: &str, text: &str) -> Result<(), AgentError>;
    async fn scroll_by(&self, dy: i64) -> Result<(), AgentError>;
    async fn screenshot(&self, path: &Path) -> Result<(), AgentError>;
    async fn current_url(&self) -> Result<String, AgentError>;
    async fn shutdown(&mut self) -> Result<(), AgentError>;

    /// False once the backend is gone (closed, crashed, connection dropped).
    fn is_live(&self) -> bool {
        true
    }

    fn debugging_endpoint(&self) -> Option<String> {
        None
    }
}

/// One browser process and its single active page, owned by one run.
pub struct Session {
    computer: Box<dyn Computer>,
    last_stamp: AtomicI64,
}

impl Session {
    /// Launch failures are fatal: there is no session to report them through.
    pub async fn open(cfg: &BrowserConfig) -> Result<Self, AgentError> {
        let browser = Browser::launch(cfg.clone())
            .await
            .map_err(|e| AgentError::Launch(format!("{e:#}")))?;
        let session = Self::from_computer(browser);
        info!(endpoint = ?session.debugging_endpoint(), "session opened");
        Ok(session)
    }

    pub fn from_computer(computer: impl Computer + 'static) -> Self {
        Self { computer: Box::new(computer), last_stamp: AtomicI64::new(0) }
    }

    pub fn computer(&self) -> &dyn Computer {
        self.computer.as_ref()
    }

    pub fn debugging_endpoint(&self) -> Option<String> {
        self.computer.debugging_endpoint()
    }

    pub fn is_live(&self) -> bool {
        self.computer.is_live()
    }

    /// `screenshot-<unix millis>.png`, strictly increasing within this session.
    pub fn next_screenshot_name(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let prev = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or_else(|last| last);
        format!("screenshot-{}.png", now.max(prev + 1))
    }

    pub async fn close(mut self) -> Result<(), AgentError> {
        match self.computer.shutdown().await {
            Ok(()) => {
                info!("session closed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "session did not shut down cleanly");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Computer for Browser {
    async fn navigate(&self, url: &str) -> Result<(), AgentError> {
        self.goto(url).await.map_err(computer_err)
    }

    async fn interactive_elements(&self) -> Result<Vec<RawElement>, AgentError> {
        Browser::interactive_elements(self).await.map_err(computer_err)
    }

    async fn click(&self, selector: &str) -> Result<(), AgentError> {
        Browser::click(self, selector).await.map_err(computer_err)
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), AgentError> {
        Browser::fill(self, selector, text).await.map_err(computer_err)
    }

    async fn scroll_by(&self, dy: i64) -> Result<(), AgentError> {
        Browser::scroll_by(self, dy).await.map_err(computer_err)
    }

    async fn screenshot(&self, path: &Path) -> Result<(), AgentError> {
        self.save_screenshot(path).await.map_err(computer_err)
    }

    async fn current_url(&self) -> Result<String, AgentError> {
        self.url().await.map_err(computer_err)
    }

    async fn shutdown(&mut self) -> Result<(), AgentError> {
        self.close().await.map_err(computer_err)
    }

    fn is_live(&self) -> bool {
        Browser::is_live(self)
    }

    fn debugging_endpoint(&self) -> Option<String> {
        Some(Browser::debugging_endpoint(self).to_string())
    }
}

fn computer_err(e: anyhow::Error) -> AgentError {
    AgentError::Computer(format!("{e:#}"))
}
