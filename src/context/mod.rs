//! Context building for provider requests
//!
//! Combines:
//! - Persona preamble (instruction + acknowledgement)
//! - Recent dialogue history, bounded by a window
//! - The new user utterance

mod builder;

pub use builder::{ContextBuilder, ContextTurn, DEFAULT_HISTORY_WINDOW, Preamble, TurnRole};
