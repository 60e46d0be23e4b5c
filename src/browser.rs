use anyhow::{anyhow, bail, Context, Result};
use chromiumoxide::browser::{Browser as OxideBrowser, BrowserConfig as OxideConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventDomContentEventFired, EventFrameNavigated, NavigateParams,
    NavigateReturns,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use chromiumoxide::Element;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::perception::{RawElement, INVENTORY_JS};

#[derive(Clone, Debug)]
pub struct BrowserConfig {
    pub headless: bool,
    pub debugging_port: u16,
    pub viewport: (u32, u32),
    pub navigation_timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            debugging_port: 9222,
            viewport: (1280, 800),
            navigation_timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

// Statements shared by every mutating action; each early return is the refusal reason.
const ACTIONABLE_CHECKS: &str = r#"
  if (this.disabled) return 'element is disabled';
  this.scrollIntoView({ block: 'center', inline: 'center' });
  const r = this.getBoundingClientRect();
  if (r.width === 0 || r.height === 0) return 'element is not visible';
  const hit = document.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2);
  if (hit && hit !== this && !this.contains(hit)) {
    return 'element is covered by <' + hit.tagName.toLowerCase() + '>';
  }
"#;

/// One live Chromium process and the single page every tool addresses.
pub struct Browser {
    page: Page,
    browser: OxideBrowser,
    cfg: BrowserConfig,
    endpoint: String,
    handler: JoinHandle<()>,
    watcher: JoinHandle<()>,
}

impl Browser {
    pub async fn launch(cfg: BrowserConfig) -> Result<Self> {
        let mut builder = OxideConfig::builder()
            .port(cfg.debugging_port)
            .window_size(cfg.viewport.0, cfg.viewport.1);
        if !cfg.headless {
            builder = builder.with_head();
        }
        // Unique profile per run; Chromium refuses to share a locked profile dir.
        let mut profile_dir: PathBuf = std::env::temp_dir();
        profile_dir.push(format!(
            "webpilot-profile-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_millis()
        ));
        std::fs::create_dir_all(&profile_dir)
            .with_context(|| format!("creating profile dir {}", profile_dir.display()))?;
        builder = builder
            .user_data_dir(profile_dir)
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        let bcfg = builder.build().map_err(|e| anyhow!(e))?;

        let (browser, mut handler) = OxideBrowser::launch(bcfg)
            .await
            .context("failed to launch chromium")?;
        let handler = tokio::spawn(async move {
            while let Some(_ev) = handler.next().await {}
        });

        let page = browser.new_page("about:blank").await?;
        if let Some(ua) = &cfg.user_agent {
            page.set_user_agent(ua.clone()).await?;
        }
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(cfg.viewport.0 as i64)
            .height(cfg.viewport.1 as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| anyhow!(e))?;
        page.execute(metrics).await?;

        let watcher = spawn_lifecycle_watcher(&page).await?;
        let endpoint = browser.websocket_address().clone();
        info!(%endpoint, port = cfg.debugging_port, headless = cfg.headless, "browser launched");

        Ok(Self { page, browser, cfg, endpoint, handler, watcher })
    }

    pub fn debugging_endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The CDP handler stream ends when the browser process or its socket goes away.
    pub fn is_live(&self) -> bool {
        !self.handler.is_finished()
    }

    /// Navigate and wait for DOMContentLoaded.
    pub async fn goto(&self, url: &str) -> Result<()> {
        let mut loaded = self.page.event_listener::<EventDomContentEventFired>().await?;
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| anyhow!(e))?;
        let nav = self.page.execute(params).await?;
        if let Some(err) = nav.result.error_text.as_deref() {
            bail!("{err}");
        }
        if !awaits_document_load(&nav.result) {
            debug!(url, "same-document navigation");
            return Ok(());
        }
        let timeout = self.cfg.navigation_timeout;
        tokio::time::timeout(timeout, loaded.next())
            .await
            .map_err(|_| anyhow!("timed out after {}s waiting for DOMContentLoaded", timeout.as_secs()))?
            .ok_or_else(|| anyhow!("page closed during navigation"))?;
        Ok(())
    }

    pub async fn url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    pub async fn interactive_elements(&self) -> Result<Vec<RawElement>> {
        let result = self.page.evaluate(INVENTORY_JS).await?;
        Ok(result.into_value::<Vec<RawElement>>()?)
    }

    pub async fn click(&self, selector: &str) -> Result<()> {
        let element = self.locate(selector).await?;
        call_guarded(&element, &click_script()).await?;
        element.click().await?;
        Ok(())
    }

    /// Replace the value of an editable element in one step, refusing the
    /// same hidden, covered or disabled targets `click` refuses.
    pub async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let element = self.locate(selector).await?;
        call_guarded(&element, &fill_script(text)?).await
    }

    pub async fn scroll_by(&self, dy: i64) -> Result<()> {
        self.page.evaluate(format!("window.scrollBy(0, {dy})")).await?;
        Ok(())
    }

    /// Viewport PNG written to `path`.
    pub async fn save_screenshot(&self, path: &Path) -> Result<()> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        let bytes = self.page.save_screenshot(params, path).await?;
        debug!(path = %path.display(), size = bytes.len(), "screenshot written");
        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.watcher.abort();
        self.browser.close().await?;
        self.browser.wait().await?;
        self.handler.abort();
        info!("browser closed");
        Ok(())
    }

    async fn locate(&self, selector: &str) -> Result<Element> {
        self.page
            .find_element(selector)
            .await
            .map_err(|e| anyhow!("no element matches selector {selector:?}: {e}"))
    }
}

// No loader means a same-document navigation (e.g. a #fragment): no DOMContentLoaded follows.
fn awaits_document_load(nav: &NavigateReturns) -> bool {
    nav.loader_id.is_some()
}

fn click_script() -> String {
    format!("function() {{{ACTIONABLE_CHECKS}  return '';\n}}")
}

fn fill_script(text: &str) -> Result<String> {
    let value = serde_json::to_string(text)?;
    Ok(format!(
        r#"
function() {{{ACTIONABLE_CHECKS}
  if (this.readOnly) return 'element is read-only';
  const editable = this.isContentEditable ||
    this instanceof HTMLInputElement || this instanceof HTMLTextAreaElement;
  if (!editable) return 'element is not an input, textarea or contenteditable';
  this.focus();
  if (this.isContentEditable) {{ this.textContent = {value}; }} else {{ this.value = {value}; }}
  this.dispatchEvent(new Event('input', {{ bubbles: true }}));
  this.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return '';
}}
"#
    ))
}

// Runs a function bound to `element` that returns '' on success or a refusal reason.
async fn call_guarded(element: &Element, function: &str) -> Result<()> {
    let out = element.call_js_fn(function, false).await?;
    match out.result.value.as_ref().and_then(|v| v.as_str()) {
        Some("") | None => Ok(()),
        Some(reason) => bail!("{reason}"),
    }
}

// Out-of-band page lifecycle observation, logged only.
async fn spawn_lifecycle_watcher(page: &Page) -> Result<JoinHandle<()>> {
    let mut navigated = page.event_listener::<EventFrameNavigated>().await?;
    let mut loaded = page.event_listener::<EventDomContentEventFired>().await?;
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(ev) = navigated.next() => {
                    if ev.frame.parent_id.is_none() {
                        debug!(url = %ev.frame.url, "frame navigated");
                    }
                }
                Some(ev) = loaded.next() => {
                    debug!(timestamp = ?ev.timestamp, "dom content loaded");
                }
                else => break,
            }
        }
    }))
}
