use std::time::Duration;

use qwatch_model::IntervalMs;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const ENV_POLL_INTERVAL_MS: &str = "QWATCH_POLL_INTERVAL_MS";
const ENV_GRACE_PERIOD_MS: &str = "QWATCH_GRACE_PERIOD_MS";

/// Timing and wording of the task supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How often the supervisor loop re-checks a running task.
    /// Upper bound on cancellation latency; the loop also wakes whenever the monitor changes.
    pub poll_interval_ms: IntervalMs,

    /// How long a terminal monitor stays retrievable before the supervisor evicts it.
    pub grace_period_ms: IntervalMs,

    /// User-facing texts recorded into the session error set.
    pub messages: MessageCatalog,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            grace_period_ms: 20_000,
            messages: MessageCatalog::default(),
        }
    }
}

impl SupervisorConfig {
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    #[inline]
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as IntervalMs;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period_ms = grace.as_millis() as IntervalMs;
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.poll_interval_ms == 0 {
            return Err(CoreError::Config("poll_interval_ms must be positive".into()));
        }
        Ok(())
    }

    /// Defaults overridden by `QWATCH_POLL_INTERVAL_MS` and `QWATCH_GRACE_PERIOD_MS`.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            cfg.poll_interval_ms = parse_ms(ENV_POLL_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_GRACE_PERIOD_MS) {
            cfg.grace_period_ms = parse_ms(ENV_GRACE_PERIOD_MS, &raw)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_ms(key: &str, raw: &str) -> Result<IntervalMs, CoreError> {
    raw.trim()
        .parse::<IntervalMs>()
        .map_err(|e| CoreError::Config(format!("{key}={raw}: {e}")))
}

/// Messages shown to the user when a task fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageCatalog {
    pub query_too_long: String,
    pub query_error: String,
    pub unexpected_error: String,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self {
            query_too_long: "The query took too long to run and was stopped. Try adding more constraints.".into(),
            query_error: "An error occurred while running the query.".into(),
            unexpected_error: "Error while running query".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_reference_timing() {
        let cfg = SupervisorConfig::default();
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.grace_period(), Duration::from_secs(20));
    }

    #[test]
    fn env_overrides_are_applied() {
        let env: HashMap<&str, &str> = [(ENV_POLL_INTERVAL_MS, "250"), (ENV_GRACE_PERIOD_MS, "5000")].into();
        let cfg = SupervisorConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.poll_interval_ms, 250);
        assert_eq!(cfg.grace_period_ms, 5000);
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let cfg = SupervisorConfig::from_lookup(|k| (k == ENV_POLL_INTERVAL_MS).then(|| "0".to_string()));
        assert!(matches!(cfg, Err(CoreError::Config(_))));
    }

    #[test]
    fn garbage_values_are_rejected() {
        let cfg = SupervisorConfig::from_lookup(|k| (k == ENV_GRACE_PERIOD_MS).then(|| "soon".to_string()));
        assert!(matches!(cfg, Err(CoreError::Config(_))));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: SupervisorConfig = serde_json::from_str(r#"{"grace_period_ms": 100}"#).unwrap();
        assert_eq!(cfg.grace_period_ms, 100);
        assert_eq!(cfg.poll_interval_ms, 1_000);
        assert_eq!(cfg.messages, MessageCatalog::default());
    }
}
