//! Configuration management for the companion

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Persona;
use crate::context::DEFAULT_HISTORY_WINDOW;
use crate::providers::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};

use file::CompanionConfigFile;

/// Default seconds to wait for a provider reply
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default number of turns shown when a chat is opened
pub const DEFAULT_TRANSCRIPT_ON_OPEN: usize = 30;

/// Companion configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory
    pub data_dir: PathBuf,

    /// Path to the `SQLite` database
    pub db_path: PathBuf,

    /// Provider configuration
    pub provider: ProviderConfig,

    /// Conversation tuning
    pub conversation: ConversationConfig,

    /// Active persona
    pub persona: Persona,
}

/// Provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Model identifier
    pub model: String,

    /// Base URL for model endpoints
    pub base_url: String,

    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Conversation tuning
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// History turns included in each request
    pub history_window: usize,

    /// Time after which an unanswered request is treated as failed
    pub request_timeout: Duration,

    /// Turns shown when a chat is opened
    pub transcript_on_open: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_window: DEFAULT_HISTORY_WINDOW,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            transcript_on_open: DEFAULT_TRANSCRIPT_ON_OPEN,
        }
    }
}

/// Return the data directory: `~/.local/share/companion` on Linux
pub fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".companion"),
        |d| d.data_dir().join("companion"),
    )
}

impl Config {
    /// Load configuration from the standard config file and environment
    ///
    /// Precedence: env > config file > defaults.
    #[must_use]
    pub fn load() -> Self {
        Self::from_file_config(file::load_config_file())
    }

    /// Load configuration from an explicit config file and environment
    #[must_use]
    pub fn load_from(path: &Path) -> Self {
        Self::from_file_config(file::load_from(path))
    }

    fn from_file_config(fc: CompanionConfigFile) -> Self {
        let data_dir = default_data_dir();

        let db_path = env_var("COMPANION_DB_PATH")
            .or(fc.storage.db_path)
            .map_or_else(|| data_dir.join("companion.db"), PathBuf::from);

        let defaults = ProviderConfig::default();
        let provider = ProviderConfig {
            model: env_var("COMPANION_MODEL")
                .or(fc.provider.model)
                .unwrap_or(defaults.model),
            base_url: env_var("COMPANION_PROVIDER_URL")
                .or(fc.provider.base_url)
                .unwrap_or(defaults.base_url),
            connect_timeout: fc
                .provider
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
        };

        let defaults = ConversationConfig::default();
        let conversation = ConversationConfig {
            history_window: env_parse("COMPANION_HISTORY_WINDOW")
                .or(fc.conversation.history_window)
                .unwrap_or(defaults.history_window),
            request_timeout: env_parse("COMPANION_REQUEST_TIMEOUT_SECS")
                .or(fc.conversation.request_timeout_secs)
                .filter(|secs| *secs > 0)
                .map_or(defaults.request_timeout, Duration::from_secs),
            transcript_on_open: fc
                .conversation
                .transcript_on_open
                .unwrap_or(defaults.transcript_on_open),
        };

        Self {
            data_dir,
            db_path,
            provider,
            conversation,
            persona: fc.persona.unwrap_or_default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            db_path: data_dir.join("companion.db"),
            data_dir,
            provider: ProviderConfig::default(),
            conversation: ConversationConfig::default(),
            persona: Persona::default(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_var(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparseable environment variable");
            None
        }
    }
}
