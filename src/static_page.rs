//! In-memory page model implementing [`Computer`], for deterministic runs
//! and tests without a Chromium binary.

use async_trait::async_trait;
use reqwest::Url;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::agent::AgentError;
use crate::perception::{DomRect, RawElement};
use crate::session::Computer;

// Smallest valid PNG signature; enough for an artifact to exist on disk.
const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[derive(Clone, Debug)]
pub struct StaticElement {
    pub raw: RawElement,
    pub value: String,
    pub disabled: bool,
}

impl StaticElement {
    pub fn new(tag: &str) -> Self {
        Self {
            raw: RawElement {
                tag: tag.to_string(),
                rect: Some(DomRect { x: 0.0, y: 0.0, width: 120.0, height: 24.0 }),
                ..RawElement::default()
            },
            value: String::new(),
            disabled: false,
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.raw.id = Some(id.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.raw.class_name = Some(class.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.raw.text = Some(text.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.raw.rect = None;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    fn editable(&self) -> bool {
        matches!(self.raw.tag.as_str(), "input" | "textarea")
    }

    fn matches(&self, selector: &Selector) -> bool {
        match selector {
            Selector::Id(id) => self.raw.id.as_deref() == Some(id.as_str()),
            Selector::Class(class) => self
                .raw
                .class_name
                .as_deref()
                .map(|c| c.split_whitespace().any(|t| t == class))
                .unwrap_or(false),
            Selector::Tag(tag) => self.raw.tag.eq_ignore_ascii_case(tag),
        }
    }
}

enum Selector {
    Id(String),
    Class(String),
    Tag(String),
}

impl Selector {
    fn parse(s: &str) -> Result<Self, AgentError> {
        let s = s.trim();
        let attr = |prefix: &str| {
            s.strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix("']"))
                .map(|v| v.replace("\\'", "'").replace("\\22 ", "\""))
        };
        if let Some(v) = attr("[id='") {
            return Ok(Self::Id(v));
        }
        if let Some(v) = attr("[class~='") {
            return Ok(Self::Class(v));
        }
        if let Some(id) = s.strip_prefix('#').filter(|v| is_word(v)) {
            return Ok(Self::Id(id.to_string()));
        }
        if let Some(class) = s.strip_prefix('.').filter(|v| is_word(v)) {
            return Ok(Self::Class(class.to_string()));
        }
        if is_word(s) {
            return Ok(Self::Tag(s.to_string()));
        }
        Err(AgentError::Computer(format!("'{s}' is not a valid selector")))
    }
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

#[derive(Default)]
struct PageState {
    url: String,
    sites: HashMap<String, Vec<StaticElement>>,
    elements: Vec<StaticElement>,
    scroll_y: i64,
    clicks: Vec<String>,
    closed: bool,
}

/// Cloning yields another handle onto the same page.
#[derive(Clone)]
pub struct StaticPage {
    state: Arc<Mutex<PageState>>,
}

impl Default for StaticPage {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticPage {
    pub fn new() -> Self {
        let state = PageState { url: "about:blank".to_string(), ..PageState::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Register the elements served when `url` is navigated to.
    pub fn with_site(self, url: &str, elements: Vec<StaticElement>) -> Self {
        let key = normalize(url).unwrap_or_else(|_| url.to_string());
        self.lock().sites.insert(key, elements);
        self
    }

    pub fn url(&self) -> String {
        self.lock().url.clone()
    }

    pub fn scroll_y(&self) -> i64 {
        self.lock().scroll_y
    }

    pub fn clicks(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Drop the page out from under its session, as a crashed browser would.
    pub fn kill(&self) {
        self.lock().closed = true;
    }

    /// Current values of every element, in document order.
    pub fn values(&self) -> Vec<String> {
        self.lock().elements.iter().map(|e| e.value.clone()).collect()
    }

    pub fn value_of(&self, selector: &str) -> Option<String> {
        let selector = Selector::parse(selector).ok()?;
        let st = self.lock();
        st.elements.iter().find(|e| e.matches(&selector)).map(|e| e.value.clone())
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        // A poisoned lock only means a test panicked mid-update; the state is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn live(&self) -> Result<MutexGuard<'_, PageState>, AgentError> {
        let st = self.lock();
        if st.closed {
            return Err(AgentError::Computer("target page, context or browser has been closed".into()));
        }
        Ok(st)
    }
}

fn normalize(url: &str) -> Result<String, AgentError> {
    Url::parse(url)
        .map(|u| u.to_string())
        .map_err(|e| AgentError::Computer(format!("invalid url {url:?}: {e}")))
}

fn locate<'a>(
    elements: &'a mut [StaticElement],
    selector: &str,
) -> Result<&'a mut StaticElement, AgentError> {
    let parsed = Selector::parse(selector)?;
    elements
        .iter_mut()
        .find(|e| e.matches(&parsed))
        .ok_or_else(|| AgentError::Computer(format!("no element matches selector {selector:?}")))
}

#[async_trait]
impl Computer for StaticPage {
    async fn navigate(&self, url: &str) -> Result<(), AgentError> {
        let key = normalize(url)?;
        let mut st = self.live()?;
        let elements = st
            .sites
            .get(&key)
            .cloned()
            .ok_or_else(|| AgentError::Computer(format!("net::ERR_NAME_NOT_RESOLVED at {key}")))?;
        st.elements = elements;
        st.url = key;
        st.scroll_y = 0;
        Ok(())
    }

    async fn interactive_elements(&self) -> Result<Vec<RawElement>, AgentError> {
        Ok(self.live()?.elements.iter().map(|e| e.raw.clone()).collect())
    }

    async fn click(&self, selector: &str) -> Result<(), AgentError> {
        let mut st = self.live()?;
        let el = locate(&mut st.elements, selector)?;
        if el.raw.rect.is_none() {
            return Err(AgentError::Computer("element is not visible".into()));
        }
        if el.disabled {
            return Err(AgentError::Computer("element is disabled".into()));
        }
        st.clicks.push(selector.to_string());
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), AgentError> {
        let mut st = self.live()?;
        let el = locate(&mut st.elements, selector)?;
        if el.raw.rect.is_none() {
            return Err(AgentError::Computer("element is not visible".into()));
        }
        if el.disabled {
            return Err(AgentError::Computer("element is disabled".into()));
        }
        if !el.editable() {
            return Err(AgentError::Computer(
                "element is not an input, textarea or contenteditable".into(),
            ));
        }
        el.value = text.to_string();
        Ok(())
    }

    async fn scroll_by(&self, dy: i64) -> Result<(), AgentError> {
        let mut st = self.live()?;
        st.scroll_y = (st.scroll_y + dy).max(0);
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), AgentError> {
        drop(self.live()?);
        tokio::fs::write(path, PNG_MAGIC)
            .await
            .map_err(|e| AgentError::Computer(format!("writing {}: {e}", path.display())))
    }

    async fn current_url(&self) -> Result<String, AgentError> {
        Ok(self.live()?.url.clone())
    }

    async fn shutdown(&mut self) -> Result<(), AgentError> {
        self.lock().closed = true;
        Ok(())
    }

    fn is_live(&self) -> bool {
        !self.is_closed()
    }
}
