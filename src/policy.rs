use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::agent::AgentError;
use crate::tools::ToolSpec;

/// One entry of the conversation the decision-maker sees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    User { text: String },
    ToolCall { call_id: String, name: String, arguments: Value },
    ToolResult { call_id: String, name: String, output: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    ToolCall { call_id: String, name: String, arguments: Value },
    Final { answer: String },
}

/// Everything the decision-maker is given for one turn.
#[derive(Clone, Copy, Debug)]
pub struct DecisionRequest<'a> {
    pub instructions: &'a str,
    pub task: &'a str,
    pub catalog: &'a [ToolSpec],
    pub history: &'a [Turn],
}

#[async_trait]
pub trait Policy: Send + Sync {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, AgentError>;
}

/// Snapshot of a request as seen by [`ScriptedPolicy`].
#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub instructions: String,
    pub task: String,
    pub tool_names: Vec<String>,
    pub history: Vec<Turn>,
}

/// Replays a fixed script of decisions; answers with a closing message once
/// the script runs out.
pub struct ScriptedPolicy {
    script: Mutex<VecDeque<Decision>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedPolicy {
    pub fn new(script: impl IntoIterator<Item = Decision>) -> Self {
        Self { script: Mutex::new(script.into_iter().collect()), seen: Mutex::new(Vec::new()) }
    }

    /// Convenience for building a tool-call step with a generated id.
    pub fn call(name: &str, arguments: Value) -> Decision {
        Decision::ToolCall {
            call_id: format!("call_{}", nanoid::nanoid!(8)),
            name: name.to_string(),
            arguments,
        }
    }

    pub fn answer(text: &str) -> Decision {
        Decision::Final { answer: text.to_string() }
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Policy for ScriptedPolicy {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, AgentError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(SeenRequest {
                instructions: request.instructions.to_string(),
                task: request.task.to_string(),
                tool_names: request.catalog.iter().map(|t| t.name.clone()).collect(),
                history: request.history.to_vec(),
            });
        }
        let next = self
            .script
            .lock()
            .map_err(|_| AgentError::Policy("script lock poisoned".into()))?
            .pop_front();
        Ok(next.unwrap_or_else(|| Self::answer("Script exhausted; the task is complete.")))
    }
}
