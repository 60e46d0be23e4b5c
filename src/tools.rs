//! Tool catalog: declarative schemas, pure argument validation, and the
//! effectful execution step bound to one run's session.

use chrono::Local;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::action_log::ActionLog;
use crate::agent::AgentError;
use crate::perception::summarize;
use crate::session::Session;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    GetPageContent,
    ClickSelector,
    TypeInSelector,
    NavigateUrl,
    TakeScreenshot,
    ScrollPage,
    GetCurrentTime,
    GetMenu,
}

impl ToolKind {
    pub const BROWSER: [ToolKind; 6] = [
        ToolKind::GetPageContent,
        ToolKind::ClickSelector,
        ToolKind::TypeInSelector,
        ToolKind::NavigateUrl,
        ToolKind::TakeScreenshot,
        ToolKind::ScrollPage,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::GetPageContent => "get_page_content",
            ToolKind::ClickSelector => "click_selector",
            ToolKind::TypeInSelector => "type_in_selector",
            ToolKind::NavigateUrl => "navigate_url",
            ToolKind::TakeScreenshot => "take_screenshot",
            ToolKind::ScrollPage => "scroll_page",
            ToolKind::GetCurrentTime => "get_current_time",
            ToolKind::GetMenu => "get_menu",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolKind::GetPageContent => {
                "Gets a simplified summary of the interactive elements on the current page, such as \
                 links, buttons, and inputs. Use it to find the correct CSS selectors for other tools."
            }
            ToolKind::ClickSelector => "Clicks on the first element that matches the given CSS selector.",
            ToolKind::TypeInSelector => {
                "Clears an input element matching the given CSS selector and types text into it."
            }
            ToolKind::NavigateUrl => "Navigates the browser to a given absolute URL.",
            ToolKind::TakeScreenshot => {
                "Takes a screenshot of the current viewport and saves it to a file."
            }
            ToolKind::ScrollPage => {
                "Scrolls the page up or down to find elements that might be out of view."
            }
            ToolKind::GetCurrentTime => "Returns the current local date and time.",
            ToolKind::GetMenu => "Returns the food menu with prices.",
        }
    }

    pub fn parameters(self) -> Value {
        match self {
            ToolKind::ClickSelector => json!({
                "type": "object",
                "properties": {
                    "selector": {
                        "type": "string",
                        "description": "The CSS selector of the element to click (e.g. '#login-button', 'a.product-link')."
                    }
                },
                "required": ["selector"],
                "additionalProperties": false
            }),
            ToolKind::TypeInSelector => json!({
                "type": "object",
                "properties": {
                    "selector": {
                        "type": "string",
                        "description": "The CSS selector of the input element (e.g. '#username', 'input[name=\"query\"]')."
                    },
                    "text": { "type": "string", "description": "The text to type into the element." }
                },
                "required": ["selector", "text"],
                "additionalProperties": false
            }),
            ToolKind::NavigateUrl => json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The full URL to navigate to, including 'https://'."
                    }
                },
                "required": ["url"],
                "additionalProperties": false
            }),
            ToolKind::ScrollPage => json!({
                "type": "object",
                "properties": {
                    "direction": { "type": "string", "enum": ["up", "down"] },
                    "amount": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "The number of pixels to scroll. A good default is 500."
                    }
                },
                "required": ["direction", "amount"],
                "additionalProperties": false
            }),
            ToolKind::GetPageContent
            | ToolKind::TakeScreenshot
            | ToolKind::GetCurrentTime
            | ToolKind::GetMenu => json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }

    pub fn needs_browser(self) -> bool {
        Self::BROWSER.contains(&self)
    }

    pub fn spec(self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }

    /// Validate raw arguments against this tool's contract.
    pub fn parse(self, args: &Value) -> Result<ToolCall, String> {
        let call = match self {
            ToolKind::GetPageContent => {
                no_args(self, args)?;
                ToolCall::GetPageContent
            }
            ToolKind::TakeScreenshot => {
                no_args(self, args)?;
                ToolCall::TakeScreenshot
            }
            ToolKind::GetCurrentTime => {
                no_args(self, args)?;
                ToolCall::GetCurrentTime
            }
            ToolKind::GetMenu => {
                no_args(self, args)?;
                ToolCall::GetMenu
            }
            ToolKind::ClickSelector => {
                let a: SelectorArgs = typed_args(self, args)?;
                ToolCall::ClickSelector { selector: non_empty(self, "selector", a.selector)? }
            }
            ToolKind::TypeInSelector => {
                let a: TypeArgs = typed_args(self, args)?;
                ToolCall::TypeInSelector {
                    selector: non_empty(self, "selector", a.selector)?,
                    text: a.text,
                }
            }
            ToolKind::NavigateUrl => {
                let a: UrlArgs = typed_args(self, args)?;
                let url = a.url.trim().to_string();
                Url::parse(&url).map_err(|e| {
                    invalid(self, format!("{url:?} is not an absolute URL ({e})"))
                })?;
                ToolCall::NavigateUrl { url }
            }
            ToolKind::ScrollPage => {
                let a: ScrollArgs = typed_args(self, args)?;
                let amount = a.amount;
                if !(amount.fract() == 0.0 && amount >= 1.0 && amount <= f64::from(u32::MAX)) {
                    return Err(invalid(self, format!("amount must be a positive integer, got {amount}")));
                }
                ToolCall::ScrollPage { direction: a.direction, amount: amount as u32 }
            }
        };
        Ok(call)
    }
}

/// Catalog entry handed to the decision-maker.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    /// Signed vertical delta: down scrolls forward, up scrolls back.
    pub fn delta(self, amount: u32) -> i64 {
        match self {
            ScrollDirection::Down => i64::from(amount),
            ScrollDirection::Up => -i64::from(amount),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

/// A validated tool invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolCall {
    GetPageContent,
    ClickSelector { selector: String },
    TypeInSelector { selector: String, text: String },
    NavigateUrl { url: String },
    TakeScreenshot,
    ScrollPage { direction: ScrollDirection, amount: u32 },
    GetCurrentTime,
    GetMenu,
}

impl ToolCall {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolCall::GetPageContent => ToolKind::GetPageContent,
            ToolCall::ClickSelector { .. } => ToolKind::ClickSelector,
            ToolCall::TypeInSelector { .. } => ToolKind::TypeInSelector,
            ToolCall::NavigateUrl { .. } => ToolKind::NavigateUrl,
            ToolCall::TakeScreenshot => ToolKind::TakeScreenshot,
            ToolCall::ScrollPage { .. } => ToolKind::ScrollPage,
            ToolCall::GetCurrentTime => ToolKind::GetCurrentTime,
            ToolCall::GetMenu => ToolKind::GetMenu,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectorArgs {
    selector: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeArgs {
    selector: String,
    text: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UrlArgs {
    url: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ScrollArgs {
    direction: ScrollDirection,
    amount: f64,
}

fn invalid(kind: ToolKind, reason: impl std::fmt::Display) -> String {
    format!("Invalid arguments for {}: {reason}", kind.name())
}

fn as_object(kind: ToolKind, args: &Value) -> Result<Value, String> {
    match args {
        Value::Null => Ok(json!({})),
        Value::Object(_) => Ok(args.clone()),
        other => Err(invalid(kind, format!("expected a JSON object, got {other}"))),
    }
}

fn no_args(kind: ToolKind, args: &Value) -> Result<(), String> {
    match as_object(kind, args)? {
        Value::Object(map) if !map.is_empty() => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            Err(invalid(kind, format!("takes no arguments, got {}", keys.join(", "))))
        }
        _ => Ok(()),
    }
}

fn typed_args<T: DeserializeOwned>(kind: ToolKind, args: &Value) -> Result<T, String> {
    serde_json::from_value(as_object(kind, args)?).map_err(|e| invalid(kind, e))
}

fn non_empty(kind: ToolKind, field: &str, value: String) -> Result<String, String> {
    if value.trim().is_empty() {
        return Err(invalid(kind, format!("{field} must not be empty")));
    }
    Ok(value)
}

fn current_time() -> (String, String) {
    (
        "Read the current time".to_string(),
        Local::now().format("%a %b %d %Y %H:%M:%S %z").to_string(),
    )
}

fn menu() -> Value {
    json!({
        "Drinks": { "Chai": "INR 50", "Coffee": "INR 70" },
        "Veg": { "DalMakhni": "INR 250", "Paneer": "INR 400" }
    })
}

/// One run's tool set, bound to that run's session.
pub struct Toolbox<'s> {
    kinds: Vec<ToolKind>,
    session: Option<&'s Session>,
    screenshot_dir: PathBuf,
}

impl<'s> Toolbox<'s> {
    pub fn new(kinds: &[ToolKind], session: Option<&'s Session>, screenshot_dir: impl Into<PathBuf>) -> Self {
        Self { kinds: kinds.to_vec(), session, screenshot_dir: screenshot_dir.into() }
    }

    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.kinds.iter().map(|k| k.spec()).collect()
    }

    /// Resolve, validate and run one tool request. Never fails: every fault
    /// becomes the returned observation, and exactly one log entry is appended.
    pub async fn invoke(&self, name: &str, args: &Value, log: &mut ActionLog) -> String {
        let Some(kind) = self.kinds.iter().copied().find(|k| k.name() == name) else {
            let known: Vec<&str> = self.kinds.iter().map(|k| k.name()).collect();
            warn!(tool = name, "unknown tool requested");
            log.record(format!("Rejected call to unknown tool \"{name}\""));
            return format!("Unknown tool \"{name}\". Available tools: {}", known.join(", "));
        };
        match kind.parse(args) {
            Ok(call) => self.execute(call, log).await,
            Err(msg) => {
                warn!(tool = name, error = %msg, "tool arguments rejected");
                log.record(format!("Rejected {name} call: {msg}"));
                msg
            }
        }
    }

    pub async fn execute(&self, call: ToolCall, log: &mut ActionLog) -> String {
        debug!(call = ?call, "executing tool");
        let (step, observation) = self.run(call).await;
        log.record(step);
        observation
    }

    // Returns (action log step, observation for the decision-maker).
    async fn run(&self, call: ToolCall) -> (String, String) {
        match (call, self.session) {
            (ToolCall::GetCurrentTime, _) => current_time(),
            (ToolCall::GetMenu, _) => ("Retrieved the menu".to_string(), menu().to_string()),
            (call, None) => {
                let name = call.kind().name();
                (
                    format!("Attempted {name} without a browser session"),
                    format!("Failed to run {name}: no browser session is open"),
                )
            }
            (ToolCall::GetPageContent, Some(session)) => match session.computer().interactive_elements().await {
                Ok(raw) => ("Retrieved simplified page content.".to_string(), summarize(&raw)),
                Err(e) => (
                    format!("Failed to retrieve page content: {e}"),
                    format!("Failed to get page content: {e}"),
                ),
            },
            (ToolCall::ClickSelector { selector }, Some(session)) => match session.computer().click(&selector).await {
                Ok(()) => (
                    format!("Clicked on element with selector: \"{selector}\""),
                    format!("Successfully clicked on element: \"{selector}\""),
                ),
                Err(e) => (
                    format!("Failed to click on element with selector: \"{selector}\""),
                    format!("Failed to click on selector \"{selector}\": {e}"),
                ),
            },
            (ToolCall::TypeInSelector { selector, text }, Some(session)) => {
                match session.computer().fill(&selector, &text).await {
                    Ok(()) => (
                        format!("Typed \"{text}\" into element with selector \"{selector}\""),
                        format!("Successfully typed text into element: \"{selector}\""),
                    ),
                    Err(e) => (
                        format!("Failed to type \"{text}\" into element with selector \"{selector}\""),
                        format!("Failed to type into selector \"{selector}\": {e}"),
                    ),
                }
            }
            (ToolCall::NavigateUrl { url }, Some(session)) => match session.computer().navigate(&url).await {
                Ok(()) => (format!("Navigated to {url}"), format!("Navigated to {url}")),
                Err(e) => (
                    format!("Failed to navigate to {url}"),
                    format!("Failed to navigate to {url}: {e}"),
                ),
            },
            (ToolCall::ScrollPage { direction, amount }, Some(session)) => {
                match session.computer().scroll_by(direction.delta(amount)).await {
                    Ok(()) => {
                        let msg = format!("Scrolled {} by {amount}px", direction.as_str());
                        (msg.clone(), msg)
                    }
                    Err(e) => (
                        format!("Failed to scroll {} by {amount}px", direction.as_str()),
                        format!("Failed to scroll the page: {e}"),
                    ),
                }
            }
            (ToolCall::TakeScreenshot, Some(session)) => match self.screenshot(session).await {
                Ok(path) => (
                    format!("Screenshot saved to {path}"),
                    format!("Screenshot saved successfully to {path}."),
                ),
                Err(e) => (
                    "Failed to take a screenshot".to_string(),
                    format!("Failed to take screenshot: {e}"),
                ),
            },
        }
    }

    async fn screenshot(&self, session: &Session) -> Result<String, AgentError> {
        tokio::fs::create_dir_all(&self.screenshot_dir)
            .await
            .map_err(|e| AgentError::Computer(format!("creating {}: {e}", self.screenshot_dir.display())))?;
        let path = self.screenshot_dir.join(session.next_screenshot_name());
        session.computer().screenshot(&path).await?;
        Ok(path.display().to_string())
    }
}
