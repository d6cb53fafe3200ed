//! TOML configuration file loading
//!
//! Supports `~/.config/companion/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Persona;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CompanionConfigFile {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageFileConfig,

    /// Provider configuration
    #[serde(default)]
    pub provider: ProviderFileConfig,

    /// Conversation tuning
    #[serde(default)]
    pub conversation: ConversationFileConfig,

    /// Persona overrides; missing fields keep the embedded persona's values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<Persona>,
}

/// Storage configuration
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StorageFileConfig {
    /// Database file path
    pub db_path: Option<String>,
}

/// Provider configuration
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ProviderFileConfig {
    /// Model identifier (e.g. "gemini-2.5-flash")
    pub model: Option<String>,

    /// Base URL for model endpoints
    pub base_url: Option<String>,

    /// TCP connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
}

/// Conversation tuning
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConversationFileConfig {
    /// History turns included in each request
    pub history_window: Option<usize>,

    /// Seconds to wait for a reply before giving up
    pub request_timeout_secs: Option<u64>,

    /// Turns shown when a chat is opened
    pub transcript_on_open: Option<usize>,
}

/// Load the TOML config file from the standard path
///
/// Returns `CompanionConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> CompanionConfigFile {
    config_file_path().map_or_else(CompanionConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Returns `CompanionConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_from(path: &Path) -> CompanionConfigFile {
    if !path.exists() {
        return CompanionConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                CompanionConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            CompanionConfigFile::default()
        }
    }
}

/// Write a config file, creating parent directories
///
/// # Errors
///
/// Returns error if the file cannot be serialized or written
pub fn save_to(path: &Path, config: &CompanionConfigFile) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| crate::Error::Config(e.to_string()))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Return the config file path: `~/.config/companion/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("companion").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_from(&dir.path().join("absent.toml"));
        assert!(fc.provider.model.is_none());
        assert!(fc.persona.is_none());
    }

    #[test]
    fn test_invalid_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();

        let fc = load_from(&path);
        assert!(fc.conversation.history_window.is_none());
    }

    #[test]
    fn test_partial_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [conversation]
            history_window = 8

            [persona]
            name = "Mimikyu"
            "#,
        )
        .unwrap();

        let fc = load_from(&path);
        assert_eq!(fc.conversation.history_window, Some(8));
        assert!(fc.conversation.request_timeout_secs.is_none());
        assert_eq!(fc.persona.unwrap().name, "Mimikyu");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let mut fc = CompanionConfigFile::default();
        fc.provider.model = Some("gemini-test".to_string());
        fc.conversation.request_timeout_secs = Some(30);
        save_to(&path, &fc).unwrap();

        let reloaded = load_from(&path);
        assert_eq!(reloaded.provider.model.as_deref(), Some("gemini-test"));
        assert_eq!(reloaded.conversation.request_timeout_secs, Some(30));
    }

    #[test]
    fn test_save_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let err = save_to(&blocker.join("config.toml"), &CompanionConfigFile::default())
            .unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
        assert!(!err.is_persistence());
    }
}
