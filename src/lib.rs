pub mod action_log;
pub mod agent;
pub mod browser;
pub mod config;
pub mod openai;
pub mod perception;
pub mod policy;
pub mod profile;
pub mod session;
pub mod static_page;
pub mod tools;

pub use action_log::ActionLog;
pub use agent::{Agent, AgentConfig, AgentError, RunReport, RunStatus};
pub use browser::{Browser, BrowserConfig};
pub use config::HarnessConfig;
pub use openai::{OpenAiConfig, OpenAiPolicy};
pub use policy::{Decision, Policy, ScriptedPolicy, Turn};
pub use profile::AgentProfile;
pub use session::{Computer, Session};
pub use static_page::{StaticElement, StaticPage};
pub use tools::{ToolKind, Toolbox};
