//! Companion - conversation engine for a personal AI chat companion
//!
//! This library provides the core of the companion:
//! - Durable dialogue log and settings store (`SQLite`)
//! - Bounded context windows with a persona preamble
//! - A provider gateway that owns the credential and absorbs failures
//! - A single-flight conversation controller that never blocks its caller
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Front ends                        │
//! │        Terminal REPL  │  one-shot CLI  │  ...        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ submit / events
//! ┌────────────────────▼────────────────────────────────┐
//! │              ConversationController                  │
//! │   MessageRepo  │  ContextBuilder  │  Persona        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ generate (background task)
//! ┌────────────────────▼────────────────────────────────┐
//! │                ProviderGateway                       │
//! │        SettingsRepo (credential)  │  Gemini         │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod context;
pub mod conversation;
pub mod db;
pub mod error;
pub mod persona;
pub mod providers;
pub mod setup;
pub mod terminal;

pub use config::Config;
pub use context::{ContextBuilder, ContextTurn, Preamble, TurnRole};
pub use conversation::{ConversationController, ConversationEvent, ConversationState, SubmitOutcome};
pub use db::{DbConn, DbPool, Message, MessageKind, MessageRepo, Sender, SettingsRepo};
pub use error::{Error, Result};
pub use persona::{FallbackTexts, Persona};
pub use providers::{
    GatewayStatus, GenerationOutcome, Provider, ProviderConnector, ProviderError, ProviderGateway,
};
