use async_trait::async_trait;
use serde_json::json;
use webpilot::policy::{DecisionRequest, Turn};
use webpilot::{
    Agent, AgentConfig, AgentError, AgentProfile, Decision, Policy, RunStatus, ScriptedPolicy, Session,
    StaticElement, StaticPage,
};

fn example_site() -> StaticPage {
    StaticPage::new().with_site(
        "https://example.com",
        vec![
            StaticElement::new("a").id("title").class("heading").text("Example Domain"),
            StaticElement::new("a").class("more").text("More information..."),
            StaticElement::new("button").id("cookie-banner").text("Accept").hidden(),
        ],
    )
}

fn tool_outputs(history: &[Turn]) -> Vec<(&str, &str)> {
    history
        .iter()
        .filter_map(|t| match t {
            Turn::ToolResult { name, output, .. } => Some((name.as_str(), output.as_str())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn navigate_then_report_the_heading() {
    let policy = ScriptedPolicy::new([
        ScriptedPolicy::call("navigate_url", json!({ "url": "https://example.com" })),
        ScriptedPolicy::call("get_page_content", json!({})),
        ScriptedPolicy::answer("The title element is <a selector=\"#title\">Example Domain</a>. Task complete."),
    ]);
    let agent = Agent::new(policy, AgentProfile::website_automation(), AgentConfig::default());

    let report = agent
        .run_in_session(
            "navigate to example.com and report the page title element",
            Session::from_computer(example_site()),
        )
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.final_answer.contains("#title"));
    assert_eq!(
        report.action_log,
        vec!["Navigated to https://example.com", "Retrieved simplified page content."]
    );

    let outputs = tool_outputs(&report.history);
    assert_eq!(outputs[0], ("navigate_url", "Navigated to https://example.com"));
    let (_, inventory) = outputs[1];
    assert!(inventory.contains(r##"<a selector="#title">Example Domain</a>"##), "{inventory}");
    assert!(inventory.contains(r#"<a selector=".more">More information...</a>"#));
    assert!(!inventory.contains("cookie-banner"), "hidden element leaked: {inventory}");

    // The decision-maker saw the inventory before answering.
    let seen = agent.policy().seen();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[2].history.len(), 5);
}

#[tokio::test]
async fn bad_selector_is_an_observation_not_a_crash() {
    let policy = ScriptedPolicy::new([
        ScriptedPolicy::call("navigate_url", json!({ "url": "https://example.com" })),
        ScriptedPolicy::call("click_selector", json!({ "selector": "#does-not-exist" })),
        ScriptedPolicy::call("click_selector", json!({ "selector": ".more" })),
        ScriptedPolicy::answer("Clicked the more-information link."),
    ]);
    let page = example_site();
    let probe = page.clone();
    let agent = Agent::new(policy, AgentProfile::website_automation(), AgentConfig::default());

    let report = agent.run_in_session("open the more link", Session::from_computer(page)).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.steps, 3);
    assert_eq!(report.action_log.len(), 3);
    let outputs = tool_outputs(&report.history);
    assert!(outputs[1].1.starts_with("Failed to click on selector \"#does-not-exist\""), "{}", outputs[1].1);
    assert_eq!(outputs[2].1, "Successfully clicked on element: \".more\"");
    assert_eq!(probe.clicks(), vec![".more"]);
    assert!(probe.is_closed());
}

#[tokio::test]
async fn schema_violations_and_unknown_tools_are_reported_back() {
    let policy = ScriptedPolicy::new([
        ScriptedPolicy::call("scroll_page", json!({ "direction": "left", "amount": 500 })),
        ScriptedPolicy::call("navigate_url", json!("{url:")),
        ScriptedPolicy::call("delete_cookies", json!({})),
        ScriptedPolicy::call("scroll_page", json!({ "direction": "down", "amount": 500 })),
        ScriptedPolicy::answer("done"),
    ]);
    let page = StaticPage::new();
    let probe = page.clone();
    let agent = Agent::new(policy, AgentProfile::website_automation(), AgentConfig::default());

    let report = agent.run_in_session("scroll", Session::from_computer(page)).await.unwrap();

    let outputs = tool_outputs(&report.history);
    assert!(outputs[0].1.starts_with("Invalid arguments for scroll_page"), "{}", outputs[0].1);
    assert!(outputs[1].1.starts_with("Invalid arguments for navigate_url"), "{}", outputs[1].1);
    assert!(outputs[2].1.starts_with("Unknown tool \"delete_cookies\""), "{}", outputs[2].1);
    assert_eq!(outputs[3].1, "Scrolled down by 500px");
    assert_eq!(report.action_log.len(), 4);
    assert_eq!(probe.scroll_y(), 500);
}

#[tokio::test]
async fn failed_navigation_keeps_the_loop_alive() {
    let policy = ScriptedPolicy::new([
        ScriptedPolicy::call("navigate_url", json!({ "url": "https://unreachable.invalid" })),
        ScriptedPolicy::call("get_page_content", json!({})),
        ScriptedPolicy::answer("The site could not be reached, so the task could not be completed."),
    ]);
    let agent = Agent::new(policy, AgentProfile::website_automation(), AgentConfig::default());

    let report = agent
        .run_in_session("open an unreachable site", Session::from_computer(StaticPage::new()))
        .await
        .unwrap();

    let outputs = tool_outputs(&report.history);
    assert!(outputs[0].1.starts_with("Failed to navigate to https://unreachable.invalid"));
    assert_eq!(outputs[1].1, "No interactive elements found on the page.");
    assert!(report.final_answer.contains("could not be completed"));
    assert_eq!(report.action_log[0], "Failed to navigate to https://unreachable.invalid");
}

#[tokio::test]
async fn each_run_gets_its_own_log() {
    let agent = Agent::new(
        ScriptedPolicy::new([
            ScriptedPolicy::call("scroll_page", json!({ "direction": "down", "amount": 10 })),
            ScriptedPolicy::answer("first"),
            ScriptedPolicy::answer("second"),
        ]),
        AgentProfile::website_automation(),
        AgentConfig::default(),
    );
    let first = agent.run_in_session("a", Session::from_computer(StaticPage::new())).await.unwrap();
    let second = agent.run_in_session("b", Session::from_computer(StaticPage::new())).await.unwrap();
    assert_eq!(first.action_log.len(), 1);
    assert!(second.action_log.is_empty());
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn dead_browser_ends_the_run_as_data() {
    let policy = ScriptedPolicy::new([
        ScriptedPolicy::call("navigate_url", json!({ "url": "https://example.com" })),
        ScriptedPolicy::call("get_page_content", json!({})),
        ScriptedPolicy::answer("unreachable"),
    ]);
    let page = example_site();
    page.kill();
    let agent = Agent::new(policy, AgentProfile::website_automation(), AgentConfig::default());

    let report = agent.run_in_session("navigate", Session::from_computer(page)).await.unwrap();

    assert_eq!(report.status, RunStatus::SessionLost);
    assert_eq!(report.steps, 1);
    assert_eq!(report.action_log, vec!["Failed to navigate to https://example.com"]);
    assert!(report.final_answer.contains("could not be completed"));
    assert_eq!(agent.policy().seen().len(), 1);
}

/// Replays a script, pulling the page out from under the session once the
/// first tool result has been observed.
struct CrashAfterFirstTool {
    script: ScriptedPolicy,
    page: StaticPage,
}

#[async_trait]
impl Policy for CrashAfterFirstTool {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, AgentError> {
        if request.history.len() == 3 {
            self.page.kill();
        }
        self.script.decide(request).await
    }
}

#[tokio::test]
async fn perception_fault_mid_run_is_observed_then_ends_the_run() {
    let page = example_site();
    let policy = CrashAfterFirstTool {
        script: ScriptedPolicy::new([
            ScriptedPolicy::call("navigate_url", json!({ "url": "https://example.com" })),
            ScriptedPolicy::call("get_page_content", json!({})),
            ScriptedPolicy::answer("unreachable"),
        ]),
        page: page.clone(),
    };
    let agent = Agent::new(policy, AgentProfile::website_automation(), AgentConfig::default());

    let report = agent.run_in_session("read the page", Session::from_computer(page)).await.unwrap();

    let outputs = tool_outputs(&report.history);
    assert_eq!(outputs[0].1, "Navigated to https://example.com");
    assert!(outputs[1].1.starts_with("Failed to get page content:"), "{}", outputs[1].1);
    assert_eq!(report.action_log.len(), 2);
    assert!(report.action_log[1].starts_with("Failed to retrieve page content"));
    assert_eq!(report.status, RunStatus::SessionLost);
    assert_eq!(report.steps, 2);
}

#[tokio::test]
async fn hidden_fields_and_undeclared_arguments_are_refused() {
    let page = StaticPage::new().with_site(
        "https://example.com/signup",
        vec![
            StaticElement::new("input").id("email"),
            StaticElement::new("input").id("trap").hidden(),
        ],
    );
    let probe = page.clone();
    let policy = ScriptedPolicy::new([
        ScriptedPolicy::call("navigate_url", json!({ "url": "https://example.com/signup" })),
        ScriptedPolicy::call("type_in_selector", json!({ "selector": "#trap", "text": "bot" })),
        ScriptedPolicy::call("type_in_selector", json!({ "selector": "#email", "text": "a@b.c", "delay": 50 })),
        ScriptedPolicy::call("type_in_selector", json!({ "selector": "#email", "text": "a@b.c" })),
        ScriptedPolicy::answer("Filled the email field."),
    ]);
    let agent = Agent::new(policy, AgentProfile::website_automation(), AgentConfig::default());

    let report = agent.run_in_session("fill the form", Session::from_computer(page)).await.unwrap();

    let outputs = tool_outputs(&report.history);
    assert!(outputs[1].1.contains("not visible"), "{}", outputs[1].1);
    assert!(outputs[2].1.starts_with("Invalid arguments for type_in_selector"), "{}", outputs[2].1);
    assert!(outputs[2].1.contains("delay"), "{}", outputs[2].1);
    assert_eq!(outputs[3].1, "Successfully typed text into element: \"#email\"");
    assert_eq!(report.action_log.len(), 4);
    assert_eq!(probe.value_of("#trap").as_deref(), Some(""));
    assert_eq!(probe.value_of("#email").as_deref(), Some("a@b.c"));
}
