//! Context builder for assembling one provider request

use crate::db::{Message, Sender};

/// Default number of history turns included in a request
pub const DEFAULT_HISTORY_WINDOW: usize = 15;

/// Role of a turn as seen by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

impl TurnRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl From<Sender> for TurnRole {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::Assistant => Self::Assistant,
            Sender::User => Self::User,
        }
    }
}

/// A single role-tagged turn sent to the provider
///
/// Never persisted; it is a projection of a [`Message`] or of the preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ContextTurn {
    #[must_use]
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

impl From<&Message> for ContextTurn {
    fn from(message: &Message) -> Self {
        Self::new(message.sender.into(), message.content.clone())
    }
}

/// Fixed instruction/acknowledgement pair prepended to every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    pub instruction: ContextTurn,
    pub acknowledgement: ContextTurn,
}

impl Preamble {
    /// Number of turns the preamble contributes
    pub const LEN: usize = 2;

    #[must_use]
    pub fn new(instruction: impl Into<String>, acknowledgement: impl Into<String>) -> Self {
        Self {
            instruction: ContextTurn::new(TurnRole::System, instruction),
            acknowledgement: ContextTurn::new(TurnRole::Assistant, acknowledgement),
        }
    }
}

/// Builds the bounded context window for a provider call
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    preamble: Preamble,
    window: usize,
}

impl ContextBuilder {
    /// Create a new context builder with the default window
    #[must_use]
    pub const fn new(preamble: Preamble) -> Self {
        Self {
            preamble,
            window: DEFAULT_HISTORY_WINDOW,
        }
    }

    /// Override the number of history turns kept
    #[must_use]
    pub const fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Number of history turns kept
    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }

    /// Build the ordered context for one request
    ///
    /// `history` must be oldest first. Only its newest `window` entries are
    /// kept, in their original order. The utterance is always last and never
    /// truncated.
    #[must_use]
    pub fn build(&self, history: &[Message], utterance: &str) -> Vec<ContextTurn> {
        let skip = history.len().saturating_sub(self.window);
        let kept = &history[skip..];

        let mut turns = Vec::with_capacity(Preamble::LEN + kept.len() + 1);
        turns.push(self.preamble.instruction.clone());
        turns.push(self.preamble.acknowledgement.clone());
        turns.extend(kept.iter().map(ContextTurn::from));
        turns.push(ContextTurn::new(TurnRole::User, utterance));

        tracing::trace!(
            history = kept.len(),
            window = self.window,
            turns = turns.len(),
            "built context"
        );
        turns
    }
}
