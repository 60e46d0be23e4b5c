use serde_json::json;

use crate::tools::{ToolKind, ToolSpec};

const WEBSITE_AUTOMATION_INSTRUCTIONS: &str = "\
You are a task-based browser automation agent. Your goal is to complete tasks on any given website.

WORKFLOW:
1. Navigate: use 'navigate_url' to open the website.
2. Analyze: use 'get_page_content' to list the interactive elements on the page. This is how you see the page.
3. Scroll if needed: if the element you need is not in the list, use 'scroll_page' to move down or up, then analyze again.
4. Identify selectors: pick the exact CSS selectors from the list for the elements you need.
5. Execute: use 'type_in_selector' and 'click_selector' with those selectors.
6. Confirm: once the final step of the user's task is done, state that the task is complete. Do not ask what to do next.

RULES:
- Always analyze the page with 'get_page_content' before clicking or typing.
- Be precise with CSS selectors. Use ids (#) when available.
- If a tool reports a failure, read the message and try a different selector or approach.";

const COOKING_ASSISTANT_INSTRUCTIONS: &str = "\
You are a helpful cooking assistant. You help users pick food options from the menu, \
suggest recipes and guide them through cooking. Use 'get_menu' for prices and \
'get_current_time' when timing matters.";

const CODING_ASSISTANT_INSTRUCTIONS: &str = "\
You are an expert coding assistant, particularly in JavaScript. Answer programming \
questions with short explanations and working examples.";

const GATEWAY_INSTRUCTIONS: &str = "\
You determine which agent should handle the user's request and hand off to it. \
Do not answer the request yourself.";

/// A named policy binding: behavioral instructions, the tools it may call and
/// the agents it may hand the conversation to.
#[derive(Clone, Debug)]
pub struct AgentProfile {
    pub name: String,
    pub instructions: String,
    pub tools: Vec<ToolKind>,
    pub handoffs: Vec<AgentProfile>,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>, tools: Vec<ToolKind>) -> Self {
        Self { name: name.into(), instructions: instructions.into(), tools, handoffs: Vec::new() }
    }

    pub fn with_handoffs(mut self, handoffs: Vec<AgentProfile>) -> Self {
        self.handoffs = handoffs;
        self
    }

    pub fn website_automation() -> Self {
        Self::new("Website Automation Agent", WEBSITE_AUTOMATION_INSTRUCTIONS, ToolKind::BROWSER.to_vec())
    }

    pub fn cooking_assistant() -> Self {
        Self::new(
            "Cooking Agent",
            COOKING_ASSISTANT_INSTRUCTIONS,
            vec![ToolKind::GetCurrentTime, ToolKind::GetMenu],
        )
    }

    pub fn coding_assistant() -> Self {
        Self::new("Coding Agent", CODING_ASSISTANT_INSTRUCTIONS, Vec::new())
    }

    /// Routes each request to the coding or cooking assistant.
    pub fn gateway() -> Self {
        Self::new("Gateway Agent", GATEWAY_INSTRUCTIONS, Vec::new())
            .with_handoffs(vec![Self::coding_assistant(), Self::cooking_assistant()])
    }

    /// True if this profile, or any agent reachable through handoffs, drives a browser.
    pub fn needs_browser(&self) -> bool {
        self.tools.iter().any(|t| t.needs_browser()) || self.handoffs.iter().any(|h| h.needs_browser())
    }

    /// `transfer_to_<snake_case name>`, the tool name other agents use to reach this one.
    pub fn handoff_tool_name(&self) -> String {
        let mut slug = String::with_capacity(self.name.len());
        for c in self.name.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('_') {
                slug.push('_');
            }
        }
        format!("transfer_to_{}", slug.trim_matches('_'))
    }

    pub fn handoff_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.handoff_tool_name(),
            description: format!("Handoff to the {} to handle the request.", self.name),
            parameters: json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        }
    }

    pub fn handoff_target(&self, tool_name: &str) -> Option<&AgentProfile> {
        self.handoffs.iter().find(|h| h.handoff_tool_name() == tool_name)
    }
}
