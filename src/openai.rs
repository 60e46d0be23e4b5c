use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::agent::AgentError;
use crate::policy::{Decision, DecisionRequest, Policy, Turn};
use crate::tools::ToolSpec;

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_base: String, // e.g. "https://api.openai.com/v1"
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
            temperature: 0.2,
        }
    }
}

/// Decision-maker backed by the chat-completions API with function tools.
#[derive(Clone)]
pub struct OpenAiPolicy {
    http: Client,
    cfg: OpenAiConfig,
}

impl OpenAiPolicy {
    pub fn new(cfg: OpenAiConfig) -> Result<Self, AgentError> {
        if cfg.api_key.trim().is_empty() {
            return Err(AgentError::MissingCredential("OPENAI_API_KEY".into()));
        }
        Ok(Self { http: Client::new(), cfg })
    }

    pub fn model(&self) -> &str {
        &self.cfg.model
    }

    fn request_body(&self, request: &DecisionRequest<'_>) -> Value {
        let mut body = json!({
            "model": self.cfg.model,
            "temperature": self.cfg.temperature,
            "messages": build_messages(request.instructions, request.history),
        });
        if !request.catalog.is_empty() {
            body["tools"] = tool_definitions(request.catalog);
            body["parallel_tool_calls"] = Value::Bool(false);
        }
        body
    }
}

#[async_trait]
impl Policy for OpenAiPolicy {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, AgentError> {
        let url = format!("{}/chat/completions", self.cfg.api_base.trim_end_matches('/'));
        let body = self.request_body(&request);
        debug!(model = %self.cfg.model, turns = request.history.len(), "requesting decision");

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Policy(format!("request failed: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AgentError::Policy(format!("reading response: {e}")))?;
        if !status.is_success() {
            return Err(AgentError::Policy(format!("OpenAI error {status}: {text}")));
        }
        let v: Value = serde_json::from_str(&text)
            .map_err(|e| AgentError::Policy(format!("failed to parse OpenAI response JSON: {e}")))?;
        let decision = parse_decision(&v)?;
        info!(decision = ?decision_kind(&decision), "decision received");
        Ok(decision)
    }
}

fn decision_kind(d: &Decision) -> &str {
    match d {
        Decision::ToolCall { name, .. } => name,
        Decision::Final { .. } => "final_answer",
    }
}

pub fn tool_definitions(catalog: &[ToolSpec]) -> Value {
    Value::Array(
        catalog
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect(),
    )
}

/// System instructions, then the history in chat-completions shape.
pub fn build_messages(instructions: &str, history: &[Turn]) -> Value {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if !instructions.trim().is_empty() {
        messages.push(json!({ "role": "system", "content": instructions }));
    }
    for turn in history {
        let m = match turn {
            Turn::User { text } => json!({ "role": "user", "content": text }),
            Turn::ToolCall { call_id, name, arguments } => {
                // The API wants arguments as a JSON-encoded string.
                let arguments = match arguments {
                    Value::String(raw) => raw.clone(),
                    other => other.to_string(),
                };
                json!({
                    "role": "assistant",
                    "content": Value::Null,
                    "tool_calls": [{
                        "id": call_id,
                        "type": "function",
                        "function": { "name": name, "arguments": arguments }
                    }]
                })
            }
            Turn::ToolResult { call_id, output, .. } => {
                json!({ "role": "tool", "tool_call_id": call_id, "content": output })
            }
        };
        messages.push(m);
    }
    Value::Array(messages)
}

/// First tool call wins; otherwise the message text is the final answer.
pub fn parse_decision(v: &Value) -> Result<Decision, AgentError> {
    let message = v
        .pointer("/choices/0/message")
        .ok_or_else(|| AgentError::Policy(format!("no choices in response: {v}")))?;

    if let Some(call) = message
        .get("tool_calls")
        .and_then(|x| x.as_array())
        .and_then(|calls| calls.first())
    {
        let call_id = call
            .get("id")
            .and_then(|x| x.as_str())
            .unwrap_or_default()
            .to_string();
        let name = call
            .pointer("/function/name")
            .and_then(|x| x.as_str())
            .ok_or_else(|| AgentError::Policy("tool call without a function name".into()))?
            .to_string();
        let raw = call
            .pointer("/function/arguments")
            .and_then(|x| x.as_str())
            .unwrap_or("{}");
        // Unparseable arguments are passed through so validation can report them.
        let arguments = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        return Ok(Decision::ToolCall { call_id, name, arguments });
    }

    let answer = message
        .get("content")
        .and_then(|x| x.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();
    Ok(Decision::Final { answer })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolKind;

    #[test]
    fn missing_key_is_a_startup_fault() {
        let cfg = OpenAiConfig { api_key: String::new(), ..OpenAiConfig::default() };
        assert!(matches!(OpenAiPolicy::new(cfg), Err(AgentError::MissingCredential(_))));
    }

    #[test]
    fn tool_call_becomes_a_decision() {
        let v = json!({
            "choices": [{ "message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": "navigate_url", "arguments": "{\"url\":\"https://example.com\"}" }
                }]
            }}]
        });
        assert_eq!(
            parse_decision(&v).unwrap(),
            Decision::ToolCall {
                call_id: "call_1".into(),
                name: "navigate_url".into(),
                arguments: json!({ "url": "https://example.com" }),
            }
        );
    }

    #[test]
    fn malformed_arguments_pass_through_as_text() {
        let v = json!({
            "choices": [{ "message": { "tool_calls": [{
                "id": "c", "function": { "name": "click_selector", "arguments": "{selector:" }
            }]}}]
        });
        match parse_decision(&v).unwrap() {
            Decision::ToolCall { arguments, .. } => assert_eq!(arguments, json!("{selector:")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn plain_message_is_the_final_answer() {
        let v = json!({ "choices": [{ "message": { "content": "  Task complete.  " } }] });
        assert_eq!(parse_decision(&v).unwrap(), Decision::Final { answer: "Task complete.".into() });
        assert!(parse_decision(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn history_maps_to_chat_messages() {
        let history = vec![
            Turn::User { text: "go".into() },
            Turn::ToolCall { call_id: "c1".into(), name: "scroll_page".into(), arguments: json!({ "direction": "down", "amount": 500 }) },
            Turn::ToolResult { call_id: "c1".into(), name: "scroll_page".into(), output: "Scrolled down by 500px".into() },
        ];
        let msgs = build_messages("be precise", &history);
        let msgs = msgs.as_array().unwrap();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[2]["tool_calls"][0]["function"]["name"], "scroll_page");
        let args: Value =
            serde_json::from_str(msgs[2]["tool_calls"][0]["function"]["arguments"].as_str().unwrap()).unwrap();
        assert_eq!(args["amount"], 500);
        assert_eq!(msgs[3]["tool_call_id"], "c1");
    }

    #[test]
    fn request_carries_function_tools() {
        let policy = OpenAiPolicy::new(OpenAiConfig {
            api_key: "sk-test".into(),
            model: "test-model".into(),
            ..OpenAiConfig::default()
        })
        .unwrap();
        let catalog: Vec<ToolSpec> = ToolKind::BROWSER.iter().map(|k| k.spec()).collect();
        let history = vec![Turn::User { text: "hi".into() }];
        let body = policy.request_body(&DecisionRequest {
            instructions: "sys",
            task: "hi",
            catalog: &catalog,
            history: &history,
        });
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["tools"].as_array().unwrap().len(), 6);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["parallel_tool_calls"], false);
    }
}
