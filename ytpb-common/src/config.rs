//! Configuration loading and config file resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `YTPB_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/ytpb/config.toml`), if present
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is not fatal: a warning is logged and defaults are used.

use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::time::millis_to_duration;
use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "YTPB_CONFIG";

/// Environment variable overriding the heartbeat period
pub const HEARTBEAT_ENV_VAR: &str = "YTPB_HEARTBEAT_INTERVAL_MS";

/// Default selector for player elements
pub const DEFAULT_PLAYER_SELECTOR: &str = "iframe[src*=youtube]";

/// Default URL of the IFrame player API script
pub const DEFAULT_API_URL: &str = "https://www.youtube.com/iframe_api";

/// Which elements tracking is enabled on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementSpecificity {
    /// Every element matching the default player selector
    #[default]
    Any,
    /// Only elements matching a configured selector
    Specific,
}

/// Tracker configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Milliseconds between heartbeats while a video plays
    pub heartbeat_interval_ms: u64,

    /// Load the player API script from the runtime instead of expecting the page to
    pub load_youtube_iframe_api: bool,

    /// Player API script URL
    pub youtube_iframe_api_url: String,

    pub element_specificity: ElementSpecificity,

    /// Selector used when `element_specificity` is `specific`
    pub elements_selector: String,

    /// Prefix of generated element ids
    pub player_id_prefix: String,

    /// Legacy mode: enable tracking at startup using these settings
    pub auto_enable: bool,

    pub retry: RetryConfig,

    pub logging: LoggingConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 500,
            load_youtube_iframe_api: true,
            youtube_iframe_api_url: DEFAULT_API_URL.to_string(),
            element_specificity: ElementSpecificity::Any,
            elements_selector: String::new(),
            player_id_prefix: "youTubePlayback".to_string(),
            auto_enable: false,
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Exponential backoff for script loading and player readiness
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry `attempt` (0-based), doubling from the initial delay
    ///
    /// Returns `None` once `max_attempts` have been used up.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Some(Duration::from_millis(
            self.initial_delay_ms.saturating_mul(factor),
        ))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from `path`, falling back to defaults when absent
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                let config: TrackerConfig = toml::from_str(&content)?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using defaults",
                    path.display()
                );
                TrackerConfig::default()
            }
            None => TrackerConfig::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `YTPB_HEARTBEAT_INTERVAL_MS` if set
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(HEARTBEAT_ENV_VAR) {
            self.heartbeat_interval_ms = value.trim().parse().map_err(|_| {
                Error::Config(format!("{} is not a number: {:?}", HEARTBEAT_ENV_VAR, value))
            })?;
        }
        Ok(())
    }

    /// Reject values the tracker cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(Error::Config(
                "heartbeat_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.element_specificity == ElementSpecificity::Specific
            && self.elements_selector.trim().is_empty()
        {
            warn!("element_specificity is \"specific\" but elements_selector is empty; tracking any player");
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        millis_to_duration(self.heartbeat_interval_ms)
    }

    /// Selector that picks the player elements to track
    pub fn player_selector(&self) -> &str {
        player_selector(self.element_specificity, &self.elements_selector)
    }
}

/// Selector for the given specificity, defaulting to every YouTube iframe
pub fn player_selector(specificity: ElementSpecificity, elements_selector: &str) -> &str {
    if specificity == ElementSpecificity::Specific && !elements_selector.trim().is_empty() {
        elements_selector
    } else {
        DEFAULT_PLAYER_SELECTOR
    }
}

/// Resolve the config file path
///
/// Returns `None` when no source names a file, meaning compiled defaults apply.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|dir| dir.join("ytpb").join("config.toml"))
        .filter(|path| path.exists())
}

/// Deserialize a settings flag from a JSON boolean or a `"yes"`/`"no"` string
///
/// Rule settings authored by older configuration UIs store flags as strings.
pub fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(value)) => value,
        Some(Flag::Text(text)) => matches!(text.as_str(), "yes" | "true"),
        None => false,
    })
}
