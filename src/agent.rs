use nanoid::nanoid;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use crate::action_log::ActionLog;
use crate::browser::BrowserConfig;
use crate::policy::{Decision, DecisionRequest, Policy, Turn};
use crate::profile::AgentProfile;
use crate::session::Session;
use crate::tools::{ToolSpec, Toolbox};

// ========================= Core Types =========================

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum AgentError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("missing credential: {0} is not set")]
    MissingCredential(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{0}")]
    Computer(String),
    #[error("decision-maker error: {0}")]
    Policy(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    StepBudgetExhausted,
    SessionLost,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub task: String,
    /// The agent that was in control when the run ended.
    pub agent: String,
    pub status: RunStatus,
    pub final_answer: String,
    pub action_log: Vec<String>,
    pub history: Vec<Turn>,
    pub steps: usize,
    pub time_ms: u128,
}

// ========================= Agent Core =========================

#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// `None` runs until the decision-maker answers.
    pub max_steps: Option<usize>,
    pub screenshot_dir: PathBuf,
    pub browser: BrowserConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: Some(25),
            screenshot_dir: PathBuf::from("."),
            browser: BrowserConfig::default(),
        }
    }
}

/// Binds a decision-maker to a profile and drives the perceive-act loop.
pub struct Agent<P: Policy> {
    policy: P,
    profile: AgentProfile,
    cfg: AgentConfig,
}

impl<P: Policy> Agent<P> {
    pub fn new(policy: P, profile: AgentProfile, cfg: AgentConfig) -> Self {
        Self { policy, profile, cfg }
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Opens a session if the profile needs one, runs the task, closes the session.
    pub async fn run_task(&self, task: &str) -> Result<RunReport, AgentError> {
        let session = if self.profile.needs_browser() {
            Some(Session::open(&self.cfg.browser).await?)
        } else {
            None
        };
        self.run_owned(task, session).await
    }

    /// Runs the task against a caller-opened session, which is closed afterwards.
    pub async fn run_in_session(&self, task: &str, session: Session) -> Result<RunReport, AgentError> {
        self.run_owned(task, Some(session)).await
    }

    async fn run_owned(&self, task: &str, session: Option<Session>) -> Result<RunReport, AgentError> {
        let outcome = self.drive(task, session.as_ref()).await;
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                warn!(error = %e, "ignoring session close failure");
            }
        }
        outcome
    }

    async fn drive(&self, task: &str, session: Option<&Session>) -> Result<RunReport, AgentError> {
        let run_id = nanoid!();
        let start = Instant::now();
        let mut active = &self.profile;
        let mut toolbox = Toolbox::new(&active.tools, session, self.cfg.screenshot_dir.clone());
        let mut catalog = catalog_for(active, &toolbox);
        let mut log = ActionLog::new();
        let mut history = vec![Turn::User { text: task.to_string() }];
        info!(%run_id, agent = %active.name, tools = catalog.len(), "run started");

        let mut step = 0usize;
        loop {
            if let Some(max) = self.cfg.max_steps {
                if step >= max {
                    warn!(%run_id, max, "step budget exhausted");
                    let answer = format!(
                        "Stopped after {max} steps without a final answer; the task may be incomplete."
                    );
                    return Ok(report(run_id, task, active, RunStatus::StepBudgetExhausted, answer, log, history, step, start));
                }
            }

            let decision = self
                .policy
                .decide(DecisionRequest {
                    instructions: &active.instructions,
                    task,
                    catalog: &catalog,
                    history: &history,
                })
                .await?;

            match decision {
                Decision::Final { answer } => {
                    info!(%run_id, step, agent = %active.name, "final answer received");
                    return Ok(report(run_id, task, active, RunStatus::Completed, answer, log, history, step, start));
                }
                Decision::ToolCall { call_id, name, arguments } => {
                    info!(%run_id, step, tool = %name, "tool requested");
                    let output = match active.handoff_target(&name) {
                        Some(target) => {
                            info!(%run_id, from = %active.name, to = %target.name, "handoff");
                            log.record(format!("Handed off from {} to {}", active.name, target.name));
                            active = target;
                            toolbox = Toolbox::new(&active.tools, session, self.cfg.screenshot_dir.clone());
                            catalog = catalog_for(active, &toolbox);
                            format!("Transferred to {}. It now handles the conversation.", active.name)
                        }
                        None => toolbox.invoke(&name, &arguments, &mut log).await,
                    };
                    history.push(Turn::ToolCall { call_id: call_id.clone(), name: name.clone(), arguments });
                    history.push(Turn::ToolResult { call_id, name, output });
                }
            }
            step += 1;

            if session.is_some_and(|s| !s.is_live()) {
                warn!(%run_id, step, "browser session lost");
                let answer =
                    "The browser session was lost before the task finished; the task could not be completed."
                        .to_string();
                return Ok(report(run_id, task, active, RunStatus::SessionLost, answer, log, history, step, start));
            }
        }
    }
}

// Bound tools first, then one transfer tool per reachable agent.
fn catalog_for(profile: &AgentProfile, toolbox: &Toolbox<'_>) -> Vec<ToolSpec> {
    let mut catalog = toolbox.catalog();
    catalog.extend(profile.handoffs.iter().map(AgentProfile::handoff_spec));
    catalog
}

#[allow(clippy::too_many_arguments)]
fn report(
    run_id: String,
    task: &str,
    agent: &AgentProfile,
    status: RunStatus,
    final_answer: String,
    log: ActionLog,
    history: Vec<Turn>,
    steps: usize,
    start: Instant,
) -> RunReport {
    let report = RunReport {
        run_id,
        task: task.to_string(),
        agent: agent.name.clone(),
        status,
        final_answer,
        action_log: log.into_entries(),
        history,
        steps,
        time_ms: start.elapsed().as_millis(),
    };
    info!(run_id = %report.run_id, steps, status = ?report.status, "run {} finished", report.run_id);
    report
}
