//! Interactive first-run setup wizard (`companion setup`)

use std::path::PathBuf;

use dialoguer::{Input, Password};

use crate::config::file::{
    CompanionConfigFile, ConversationFileConfig, ProviderFileConfig, config_file_path, load_config_file,
    save_to,
};
use crate::config::{DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TRANSCRIPT_ON_OPEN};
use crate::context::DEFAULT_HISTORY_WINDOW;
use crate::providers::gemini::DEFAULT_MODEL;
use crate::providers::{GatewayStatus, ProviderGateway};

/// Trim a user-entered API key; `None` when nothing was entered
#[must_use]
pub fn entered_key(input: &str) -> Option<&str> {
    Some(input.trim()).filter(|k| !k.is_empty())
}

/// Prompt for an API key without echoing it
///
/// `current` is the masked stored key, shown as a hint. Returns `None` when
/// the user leaves the prompt blank.
///
/// # Errors
///
/// Returns error if the terminal cannot be read
pub fn prompt_api_key(current: Option<&str>) -> anyhow::Result<Option<String>> {
    let prompt = current.map_or_else(
        || "Gemini API key".to_string(),
        |m| format!("Gemini API key (current: {m}, leave blank to keep)"),
    );

    let key = Password::new()
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()?;

    Ok(entered_key(&key).map(str::to_string))
}

/// Run the interactive setup wizard
///
/// # Errors
///
/// Returns error if user input fails, the config cannot be written or the
/// settings store is unavailable
pub fn run_setup(gateway: &ProviderGateway) -> anyhow::Result<()> {
    println!("Companion Setup\n");

    let existing = load_config_file();
    let config_path = config_file_path()
        .unwrap_or_else(|| PathBuf::from("~/.config/companion/config.toml"));

    if config_path.exists() {
        println!("Existing config found at {}\n", config_path.display());
    }

    // 1. API key
    let masked = gateway.masked_key()?;
    if let Some(key) = prompt_api_key(masked.as_deref())? {
        match gateway.configure(&key)? {
            GatewayStatus::Configured => println!("API key saved"),
            GatewayStatus::Unconfigured { reason } => println!(
                "API key saved, but the client could not be initialized: {}",
                reason.unwrap_or_default()
            ),
        }
    }

    // 2. Model
    let model: String = Input::new()
        .with_prompt("Model")
        .default(
            existing
                .provider
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        )
        .interact_text()?;

    // 3. Conversation tuning
    let history_window: usize = Input::new()
        .with_prompt("History turns sent with each message")
        .default(
            existing
                .conversation
                .history_window
                .unwrap_or(DEFAULT_HISTORY_WINDOW),
        )
        .interact_text()?;

    let request_timeout_secs: u64 = Input::new()
        .with_prompt("Seconds to wait for a reply")
        .default(
            existing
                .conversation
                .request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
        .validate_with(|secs: &u64| {
            if *secs == 0 {
                Err("must be at least 1 second")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    // 4. Build and write config
    let config_file = CompanionConfigFile {
        storage: existing.storage,
        provider: ProviderFileConfig {
            model: Some(model),
            base_url: existing.provider.base_url,
            connect_timeout_secs: existing.provider.connect_timeout_secs,
        },
        conversation: ConversationFileConfig {
            history_window: Some(history_window),
            request_timeout_secs: Some(request_timeout_secs),
            transcript_on_open: existing
                .conversation
                .transcript_on_open
                .or(Some(DEFAULT_TRANSCRIPT_ON_OPEN)),
        },
        persona: existing.persona,
    };

    save_to(&config_path, &config_file)?;
    println!("\nConfig written to {}", config_path.display());
    println!("\nSetup complete! Run `companion chat` to start.");

    Ok(())
}
