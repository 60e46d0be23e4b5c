use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use webpilot::{Agent, AgentProfile, HarnessConfig, OpenAiPolicy, RunStatus};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Profile {
    Website,
    Cooking,
    Coding,
    /// Routes to the coding or cooking assistant.
    Gateway,
}

/// Drive a browser (or one of the chat assistants) with an LLM until the task is done.
#[derive(Debug, Parser)]
#[command(name = "webpilot", version)]
struct Cli {
    /// Natural-language task, e.g. "go to https://example.com and report the heading".
    task: String,

    #[arg(long, value_enum, default_value = "website")]
    profile: Profile,

    /// Run Chromium without a visible window.
    #[arg(long)]
    headless: bool,

    /// Stop after this many tool calls (0 = unbounded).
    #[arg(long)]
    max_steps: Option<usize>,

    /// Directory for screenshot artifacts.
    #[arg(long)]
    screenshot_dir: Option<PathBuf>,

    /// Print the whole run report as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = HarnessConfig::from_env()?;
    cfg.require_credential()?;
    if cli.headless {
        cfg.agent.browser.headless = true;
    }
    if let Some(max) = cli.max_steps {
        cfg.agent.max_steps = (max > 0).then_some(max);
    }
    if let Some(dir) = cli.screenshot_dir {
        cfg.agent.screenshot_dir = dir;
    }

    let profile = match cli.profile {
        Profile::Website => AgentProfile::website_automation(),
        Profile::Cooking => AgentProfile::cooking_assistant(),
        Profile::Coding => AgentProfile::coding_assistant(),
        Profile::Gateway => AgentProfile::gateway(),
    };
    let policy = OpenAiPolicy::new(cfg.openai.clone())?;
    info!(model = %policy.model(), headless = cfg.agent.browser.headless, "starting webpilot");
    let agent = Agent::new(policy, profile, cfg.agent);
    let report = agent.run_task(&cli.task).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if report.status != RunStatus::Completed {
        warn!(status = ?report.status, steps = report.steps, "run did not complete");
    }
    println!("--- Final Output ({}) ---\n{}", report.agent, report.final_answer);
    println!("\n--- Action Log ---");
    for (i, step) in report.action_log.iter().enumerate() {
        println!("{:>3}. {step}", i + 1);
    }
    Ok(())
}
