//! Application configuration
//!
//! Built once at startup from the environment (a `.env` file is honored by
//! `main`) and passed explicitly to the components that need it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::recommend::RecommendError;

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Floor for the spin tick period; a zero period cannot drive a timer
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Shortest key the Gemini console issues
const MIN_API_KEY_LEN: usize = 20;

/// Session credential for the recommendation service.
/// Never printed: `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn parse(raw: &str) -> Result<Self, RecommendError> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(RecommendError::MissingCredential);
        }
        if key.chars().count() < MIN_API_KEY_LEN {
            return Err(RecommendError::InvalidCredential);
        }
        Ok(Self(key.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// What the controller does when the recommendation service fails outright
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiFailurePolicy {
    /// Show a transient error, then return to idle
    #[default]
    TransientError,
    /// Answer with a random menu and an apology
    RandomFallback,
}

impl FromStr for AiFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(AiFailurePolicy::TransientError),
            "random" => Ok(AiFailurePolicy::RandomFallback),
            other => Err(format!("unknown AI failure policy '{}'", other)),
        }
    }
}

/// Timing and fallback knobs of the selection state machine
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// Number of spin ticks before the result settles
    pub spin_ticks: u32,
    pub tick_interval: Duration,
    /// Pause between the final tick and the result
    pub settle_delay: Duration,
    /// How long the error state lingers before returning to idle
    pub recovery_delay: Duration,
    pub failure_policy: AiFailurePolicy,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            spin_ticks: 12,
            tick_interval: Duration::from_millis(150),
            settle_delay: Duration::from_millis(500),
            recovery_delay: Duration::from_millis(2000),
            failure_policy: AiFailurePolicy::TransientError,
        }
    }
}

/// Where and how to reach Gemini
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEMINI_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<ApiKey>,
    pub gemini: GeminiConfig,
    pub selection: SelectionConfig,
    pub bind: String,
    /// Directory for the session-scoped order snapshot; disabled when unset
    pub session_dir: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            gemini: GeminiConfig::default(),
            selection: SelectionConfig::default(),
            bind: DEFAULT_BIND.to_string(),
            session_dir: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Bad values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_key = lookup("GEMINI_API_KEY").and_then(|raw| match ApiKey::parse(&raw) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Ignoring GEMINI_API_KEY: {}", e);
                None
            }
        });
        if api_key.is_none() {
            info!("No Gemini API key configured; AI recommendations disabled until one is set");
        }

        let selection = SelectionConfig {
            spin_ticks: parse_or(&lookup, "GREEN_FC_SPIN_TICKS", defaults.selection.spin_ticks)
                .max(1),
            tick_interval: millis_or(&lookup, "GREEN_FC_TICK_MS", defaults.selection.tick_interval)
                .max(MIN_TICK_INTERVAL),
            settle_delay: millis_or(&lookup, "GREEN_FC_SETTLE_MS", defaults.selection.settle_delay),
            recovery_delay: millis_or(&lookup, "GREEN_FC_RECOVERY_MS", defaults.selection.recovery_delay),
            failure_policy: parse_or(&lookup, "GREEN_FC_AI_FAILURE", defaults.selection.failure_policy),
        };

        Self {
            api_key,
            gemini: GeminiConfig {
                base_url: lookup("GREEN_FC_GEMINI_URL").unwrap_or(defaults.gemini.base_url),
                model: lookup("GREEN_FC_MODEL").unwrap_or(defaults.gemini.model),
            },
            selection,
            bind: lookup("GREEN_FC_BIND").unwrap_or(defaults.bind),
            session_dir: lookup("GREEN_FC_SESSION_DIR").filter(|d| !d.trim().is_empty()),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {} value '{}': {}, using default", key, raw, e);
            default
        }),
        None => default,
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    Duration::from_millis(parse_or(lookup, key, default.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_timings() {
        let config = AppConfig::from_lookup(|_| None);
        assert!(config.api_key.is_none());
        assert_eq!(config.selection.spin_ticks, 12);
        assert_eq!(config.selection.tick_interval, Duration::from_millis(150));
        assert_eq!(config.selection.settle_delay, Duration::from_millis(500));
        assert_eq!(config.selection.recovery_delay, Duration::from_millis(2000));
        assert_eq!(config.gemini.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("GREEN_FC_SPIN_TICKS", "15"),
            ("GREEN_FC_TICK_MS", "not-a-number"),
            ("GREEN_FC_AI_FAILURE", "random"),
            ("GREEN_FC_SESSION_DIR", "  "),
        ]));

        assert_eq!(config.selection.spin_ticks, 15);
        assert_eq!(config.selection.tick_interval, Duration::from_millis(150));
        assert_eq!(config.selection.failure_policy, AiFailurePolicy::RandomFallback);
        assert!(config.session_dir.is_none());
    }

    #[test]
    fn test_zero_tick_interval_is_clamped() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("GREEN_FC_TICK_MS", "0"),
            ("GREEN_FC_SPIN_TICKS", "0"),
        ]));
        assert_eq!(config.selection.tick_interval, MIN_TICK_INTERVAL);
        assert_eq!(config.selection.spin_ticks, 1);
    }

    #[test]
    fn test_short_keys_are_rejected() {
        assert!(matches!(ApiKey::parse("   "), Err(RecommendError::MissingCredential)));
        assert!(matches!(ApiKey::parse("short"), Err(RecommendError::InvalidCredential)));

        let key = ApiKey::parse(" AIzaSyA-0123456789abcdefghij ").unwrap();
        assert_eq!(key.expose(), "AIzaSyA-0123456789abcdefghij");
        assert_eq!(format!("{:?}", key), "ApiKey(***)");
    }
}
