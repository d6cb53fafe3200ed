use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use companion_chat::db::{self, SettingsRepo, keys};
use companion_chat::providers::GeminiConnector;
use companion_chat::{
    Config, ConversationController, GatewayStatus, GenerationOutcome, ProviderGateway,
};

/// Companion - a personal AI chat companion
#[derive(Parser)]
#[command(name = "companion", version, about)]
struct Cli {
    /// Config file to use instead of the standard location
    #[arg(short, long, env = "COMPANION_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Chat interactively (default)
    Chat,
    /// Send a single message and print the reply
    Send {
        /// Message text
        text: String,
    },
    /// Manage the provider API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Show provider status
    Status,
    /// Send a probe request to the provider
    Test,
    /// Show recent conversation turns
    History {
        /// Number of turns to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Read or write a raw setting (avatar paths, ...)
    Setting {
        #[command(subcommand)]
        action: SettingAction,
    },
    /// Interactive first-run setup
    Setup,
}

#[derive(Subcommand)]
enum KeyAction {
    /// Store a new key; prompts without echo when omitted
    Set {
        /// API key
        key: Option<String>,
    },
    /// Show the stored key, masked
    Show,
    /// Remove the stored key
    Clear,
}

#[derive(Subcommand)]
enum SettingAction {
    /// Print a setting
    Get {
        /// Setting key
        key: String,
    },
    /// Store a setting
    Set {
        /// Setting key
        key: String,
        /// Setting value
        value: String,
    },
    /// List stored setting keys
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; stderr keeps chat output clean
    let filter = match cli.verbose {
        0 => "warn,companion_chat=info",
        1 => "info,companion_chat=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli
        .config
        .as_deref()
        .map_or_else(Config::load, Config::load_from);
    tracing::debug!(?config, "loaded configuration");

    let pool = db::init(&config.db_path)?;
    let settings = SettingsRepo::new(pool.clone());
    let connector = Arc::new(GeminiConnector::from_config(&config.provider));
    let gateway = Arc::new(ProviderGateway::from_store(settings.clone(), connector)?);

    let command = cli.command.unwrap_or(Command::Chat);
    match command {
        Command::Key { action } => cmd_key(&gateway, action),
        Command::Status => {
            cmd_status(&gateway);
            Ok(())
        }
        Command::Test => cmd_test(&gateway, config.conversation.request_timeout).await,
        Command::Setting { action } => cmd_setting(&settings, action),
        Command::Setup => companion_chat::setup::run_setup(&gateway),
        Command::Send { text } => {
            let controller = conversation(pool, gateway, &config)?;
            companion_chat::terminal::send_once(&controller, &text).await
        }
        Command::History { limit } => {
            let controller = conversation(pool, gateway, &config)?;
            cmd_history(&controller, limit)
        }
        Command::Chat => {
            let controller = conversation(pool, gateway, &config)?;
            companion_chat::terminal::run_chat(controller).await
        }
    }
}

fn conversation(
    pool: db::DbPool,
    gateway: Arc<ProviderGateway>,
    config: &Config,
) -> companion_chat::Result<ConversationController> {
    ConversationController::new(pool, gateway, config.persona.clone(), &config.conversation)
}

fn cmd_key(gateway: &ProviderGateway, action: KeyAction) -> anyhow::Result<()> {
    match action {
        KeyAction::Set { key } => {
            let key = match key {
                Some(key) => match companion_chat::setup::entered_key(&key) {
                    Some(key) => Some(key.to_string()),
                    None => anyhow::bail!("key is empty, use `companion key clear` to remove it"),
                },
                None => companion_chat::setup::prompt_api_key(gateway.masked_key()?.as_deref())?,
            };
            let Some(key) = key else {
                println!("Key unchanged");
                return Ok(());
            };
            match gateway.configure(&key)? {
                GatewayStatus::Configured => println!("Key saved. Status: OK"),
                GatewayStatus::Unconfigured { reason } => println!(
                    "Key saved, but the client could not be initialized: {}",
                    reason.unwrap_or_default()
                ),
            }
        }
        KeyAction::Show => match gateway.masked_key()? {
            Some(masked) => println!("{masked}"),
            None => println!("No key stored"),
        },
        KeyAction::Clear => {
            gateway.configure("")?;
            println!("Key cleared");
        }
    }
    Ok(())
}

fn cmd_status(gateway: &ProviderGateway) {
    match gateway.status() {
        GatewayStatus::Configured => println!("Status: OK"),
        GatewayStatus::Unconfigured { reason: None } => println!("Status: no key"),
        GatewayStatus::Unconfigured {
            reason: Some(reason),
        } => println!("Status: key rejected ({reason})"),
    }
}

async fn cmd_test(gateway: &ProviderGateway, limit: Duration) -> anyhow::Result<()> {
    let outcome = tokio::time::timeout(limit, gateway.test_connection())
        .await
        .unwrap_or(GenerationOutcome::TimedOut(limit));
    match outcome {
        GenerationOutcome::Reply(text) => {
            let preview: String = text.chars().take(60).collect();
            println!("Connection OK! Reply: {preview}...");
            Ok(())
        }
        GenerationOutcome::Unconfigured => {
            anyhow::bail!("provider not configured, enter a valid key first")
        }
        GenerationOutcome::Failed(e) => anyhow::bail!("connection problem: {e}"),
        GenerationOutcome::TimedOut(limit) => {
            anyhow::bail!("no reply within {}s", limit.as_secs())
        }
    }
}

fn cmd_history(controller: &ConversationController, limit: usize) -> anyhow::Result<()> {
    let name = &controller.persona().name;
    for message in controller.transcript(limit)? {
        println!(
            "- {}\n",
            companion_chat::terminal::format_turn(name, &message)
        );
    }
    Ok(())
}

fn cmd_setting(settings: &SettingsRepo, action: SettingAction) -> anyhow::Result<()> {
    match action {
        SettingAction::Get { key } => {
            let value = settings.get(&key)?;
            match value {
                Some(v) if key == keys::PROVIDER_API_KEY => {
                    println!("{}", companion_chat::providers::mask_secret(&v));
                }
                Some(v) => println!("{v}"),
                None => anyhow::bail!("setting not found: {key}"),
            }
        }
        SettingAction::Set { key, value } => {
            if key == keys::PROVIDER_API_KEY {
                anyhow::bail!("use `companion key set` to change the API key");
            }
            settings.set(&key, &value)?;
            println!("Saved {key}");
        }
        SettingAction::List => {
            for key in settings.list_keys()? {
                println!("{key}");
            }
        }
    }
    Ok(())
}
