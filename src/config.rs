use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::agent::{AgentConfig, AgentError};
use crate::openai::OpenAiConfig;

/// Everything a run needs, read from the process environment.
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    pub agent: AgentConfig,
    pub openai: OpenAiConfig,
}

impl HarnessConfig {
    /// Loads `.env` if present, then reads `WEBPILOT_*` and `OPENAI_*`.
    pub fn from_env() -> Result<Self, AgentError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, AgentError> {
        let mut agent = AgentConfig::default();
        if let Some(v) = parsed::<bool>(&get, "WEBPILOT_HEADLESS")? {
            agent.browser.headless = v;
        }
        if let Some(v) = parsed::<u16>(&get, "WEBPILOT_DEBUG_PORT")? {
            agent.browser.debugging_port = v;
        }
        if let Some(v) = parsed::<u64>(&get, "WEBPILOT_NAV_TIMEOUT_SECS")? {
            agent.browser.navigation_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parsed::<usize>(&get, "WEBPILOT_MAX_STEPS")? {
            agent.max_steps = (v > 0).then_some(v);
        }
        if let Some(dir) = get("WEBPILOT_SCREENSHOT_DIR").filter(|d| !d.trim().is_empty()) {
            agent.screenshot_dir = PathBuf::from(dir);
        }

        let mut openai = OpenAiConfig::default();
        if let Some(v) = get("OPENAI_BASE_URL") {
            openai.api_base = v;
        }
        if let Some(v) = get("OPENAI_MODEL") {
            openai.model = v;
        }
        openai.api_key = get("OPENAI_API_KEY").unwrap_or_default();

        Ok(Self { agent, openai })
    }

    /// The credential must be present before any session is opened.
    pub fn require_credential(&self) -> Result<(), AgentError> {
        if self.openai.api_key.trim().is_empty() {
            return Err(AgentError::MissingCredential("OPENAI_API_KEY".into()));
        }
        Ok(())
    }
}

fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, AgentError>
where
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AgentError::Config(format!("{key}={raw:?}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_an_interactive_run() {
        let cfg = HarnessConfig::from_lookup(lookup(&[])).unwrap();
        assert!(!cfg.agent.browser.headless);
        assert_eq!(cfg.agent.browser.debugging_port, 9222);
        assert_eq!(cfg.agent.max_steps, Some(25));
        assert!(matches!(cfg.require_credential(), Err(AgentError::MissingCredential(_))));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = HarnessConfig::from_lookup(lookup(&[
            ("WEBPILOT_HEADLESS", "true"),
            ("WEBPILOT_DEBUG_PORT", "9333"),
            ("WEBPILOT_MAX_STEPS", "0"),
            ("WEBPILOT_SCREENSHOT_DIR", "shots"),
            ("OPENAI_API_KEY", "sk-x"),
            ("OPENAI_MODEL", "gpt-test"),
        ]))
        .unwrap();
        assert!(cfg.agent.browser.headless);
        assert_eq!(cfg.agent.browser.debugging_port, 9333);
        assert_eq!(cfg.agent.max_steps, None);
        assert_eq!(cfg.agent.screenshot_dir, PathBuf::from("shots"));
        assert_eq!(cfg.openai.model, "gpt-test");
        cfg.require_credential().unwrap();
    }

    #[test]
    fn malformed_values_are_config_errors() {
        let err = HarnessConfig::from_lookup(lookup(&[("WEBPILOT_DEBUG_PORT", "ninety")])).unwrap_err();
        assert!(matches!(err, AgentError::Config(msg) if msg.contains("WEBPILOT_DEBUG_PORT")));
    }
}
