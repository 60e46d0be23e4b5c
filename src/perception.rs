//! Page summarizer: turns the page's interactive elements into a compact,
//! selector-annotated inventory the decision-maker can act on.

use serde::{Deserialize, Serialize};

pub const MAX_TEXT_CHARS: usize = 100;

pub const NO_ELEMENTS_SENTINEL: &str = "No interactive elements found on the page.";

const INVENTORY_HEADER: &str = "Here are the interactive elements on the page:";

/// Collects one record per interactive element (links, buttons, inputs and
/// their ARIA role equivalents). `rect` is null for elements
/// without a rendered layout box (display:none, detached, collapsed ancestors).
pub const INVENTORY_JS: &str = r#"
(() => {
  const query = 'a, button, input, [role="button"], [role="link"]';
  return Array.from(document.querySelectorAll(query)).map((el) => {
    const boxed = el.getClientRects().length > 0;
    const r = boxed ? el.getBoundingClientRect() : null;
    return {
      tag: el.tagName.toLowerCase(),
      id: el.id || null,
      class_name: typeof el.className === 'string' ? el.className : null,
      text: el.textContent,
      rect: r ? { x: r.x, y: r.y, width: r.width, height: r.height } : null,
    };
  });
})()
"#;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DomRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// What the page reports for a single element, before filtering.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RawElement {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub rect: Option<DomRect>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementDescriptor {
    pub tag: String,
    pub selector: String,
    pub text: String,
}

impl ElementDescriptor {
    /// Returns `None` for elements without a layout box.
    pub fn from_raw(raw: &RawElement) -> Option<Self> {
        raw.rect.as_ref()?;
        let tag = raw.tag.to_ascii_lowercase();
        let selector = infer_selector(&tag, raw.id.as_deref(), raw.class_name.as_deref());
        let text = excerpt(raw.text.as_deref().unwrap_or_default());
        Some(Self { tag, selector, text })
    }

    pub fn render(&self) -> String {
        format!(
            "<{tag} selector=\"{selector}\">{text}</{tag}>",
            tag = self.tag,
            selector = self.selector,
            text = self.text
        )
    }
}

/// id, then first non-empty class token, then the bare tag.
pub fn infer_selector(tag: &str, id: Option<&str>, class_name: Option<&str>) -> String {
    if let Some(id) = id.map(str::trim).filter(|s| !s.is_empty()) {
        return if is_plain_ident(id) {
            format!("#{id}")
        } else {
            format!("[id='{}']", escape_quote(id))
        };
    }
    if let Some(class) = class_name.and_then(|c| c.split_whitespace().next()) {
        return if is_plain_ident(class) {
            format!(".{class}")
        } else {
            format!("[class~='{}']", escape_quote(class))
        };
    }
    tag.to_string()
}

/// Build the observation returned by `get_page_content`.
pub fn summarize(elements: &[RawElement]) -> String {
    let lines: Vec<String> = elements
        .iter()
        .filter_map(ElementDescriptor::from_raw)
        .map(|d| d.render())
        .collect();
    if lines.is_empty() {
        return NO_ELEMENTS_SENTINEL.to_string();
    }
    format!("{INVENTORY_HEADER}\n{}", lines.join("\n"))
}

fn excerpt(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_TEXT_CHARS).collect::<String>().trim_end().to_string()
}

// Identifiers usable verbatim after `#` or `.` without escaping.
fn is_plain_ident(s: &str) -> bool {
    let mut chars = s.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    let head_ok = match first {
        '-' => matches!(chars.clone().next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '-'),
        c => c.is_ascii_alphabetic() || c == '_' || !c.is_ascii(),
    };
    head_ok && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii())
}

// Body of a single-quoted CSS string. `"` becomes the hex escape `\22 ` so the
// selector can sit inside the rendered `selector="..."` attribute unchanged.
fn escape_quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'").replace('"', "\\22 ")
}
