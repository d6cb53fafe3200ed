//! Conversation controller
//!
//! Orchestrates one turn at a time: persist the user's utterance, build the
//! context window, generate a reply off the caller's thread, persist the
//! reply and notify observers.
//!
//! ```text
//!  submit(text) ──► append(User) ──► notify Turn ──► spawn ──┐
//!                                                            │
//!  notify Turn ◄── append(Assistant) ◄── generate ◄── build ◄┘
//! ```
//!
//! State is `Idle -> AwaitingResponse -> Idle`. While a reply is pending,
//! further submissions are rejected with [`SubmitOutcome::Busy`], so at most
//! one provider request is ever outstanding.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::config::ConversationConfig;
use crate::context::{ContextBuilder, ContextTurn};
use crate::db::{DbPool, Message, MessageKind, MessageRepo, Sender};
use crate::providers::{GenerationOutcome, ProviderError, ProviderGateway};
use crate::{Error, Persona, Result};

/// Single-flight state of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingResponse,
}

/// Notification delivered to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// A turn was persisted (user submission or assistant reply)
    Turn(Message),
    /// The single-flight state changed
    StateChanged(ConversationState),
    /// A turn could not be saved; the conversation is back to idle
    PersistenceFailed { reason: String },
}

/// Result of [`ConversationController::submit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The user turn was persisted and a reply is being generated
    Accepted(Message),
    /// Empty or whitespace-only input; nothing happened
    Ignored,
    /// A reply is still pending; the input was not persisted
    Busy,
    /// The user turn could not be persisted
    NotSaved { reason: String },
}

/// Drives a conversation against a message store and a provider gateway
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConversationController {
    inner: Arc<Inner>,
}

struct Inner {
    messages: MessageRepo,
    gateway: Arc<ProviderGateway>,
    builder: ContextBuilder,
    persona: Persona,
    request_timeout: Duration,
    transcript_on_open: usize,
    runtime: Handle,
    state: Mutex<ConversationState>,
    observers: Mutex<Vec<mpsc::UnboundedSender<ConversationEvent>>>,
}

impl ConversationController {
    /// Create a controller
    ///
    /// Must be called from within a Tokio runtime; replies are generated on
    /// that runtime.
    ///
    /// # Errors
    ///
    /// Returns error if no Tokio runtime is available
    pub fn new(
        pool: DbPool,
        gateway: Arc<ProviderGateway>,
        persona: Persona,
        config: &ConversationConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;

        let builder = ContextBuilder::new(persona.preamble()).with_window(config.history_window);
        let messages = MessageRepo::new(pool, persona.name.as_str());

        Ok(Self {
            inner: Arc::new(Inner {
                messages,
                gateway,
                builder,
                persona,
                request_timeout: config.request_timeout,
                transcript_on_open: config.transcript_on_open,
                runtime,
                state: Mutex::new(ConversationState::Idle),
                observers: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Register an observer
    ///
    /// Events are queued on the returned receiver; the front end drains it
    /// from its own loop.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConversationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Current single-flight state
    #[must_use]
    pub fn state(&self) -> ConversationState {
        *self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The provider gateway used for replies
    #[must_use]
    pub fn gateway(&self) -> &ProviderGateway {
        &self.inner.gateway
    }

    /// The active persona
    #[must_use]
    pub fn persona(&self) -> &Persona {
        &self.inner.persona
    }

    /// Submit a user utterance
    ///
    /// Never blocks on the provider: the reply is generated in a background
    /// task and delivered as a [`ConversationEvent::Turn`].
    pub fn submit(&self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Ignored;
        }

        if !self.inner.try_begin() {
            tracing::debug!("submission rejected, reply pending");
            return SubmitOutcome::Busy;
        }

        let message = match self
            .inner
            .messages
            .append(Sender::User, text, MessageKind::Text)
        {
            Ok(message) => message,
            Err(e) => {
                self.inner.finish(&[persistence_failed(&e)]);
                return SubmitOutcome::NotSaved {
                    reason: e.to_string(),
                };
            }
        };

        self.inner.notify(&ConversationEvent::Turn(message.clone()));
        self.inner.notify(&ConversationEvent::StateChanged(
            ConversationState::AwaitingResponse,
        ));

        let inner = Arc::clone(&self.inner);
        let user_turn = message.clone();
        self.inner
            .runtime
            .spawn(async move { inner.complete_turn(user_turn).await });

        SubmitOutcome::Accepted(message)
    }

    /// Turns to show when a chat is opened
    ///
    /// An empty transcript gets the persona's greeting as its first turn.
    ///
    /// # Errors
    ///
    /// Returns error if the message store is unavailable
    pub fn open_transcript(&self) -> Result<Vec<Message>> {
        if self.inner.messages.count()? > 0 {
            return self.inner.messages.recent(self.inner.transcript_on_open);
        }

        let greeting = self.inner.messages.append(
            Sender::Assistant,
            &self.inner.persona.greeting,
            MessageKind::Text,
        )?;
        tracing::info!("empty transcript, greeting written");
        Ok(vec![greeting])
    }

    /// The most recent `limit` turns, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if the message store is unavailable
    pub fn transcript(&self, limit: usize) -> Result<Vec<Message>> {
        self.inner.messages.recent(limit)
    }
}

const IDLE: ConversationEvent = ConversationEvent::StateChanged(ConversationState::Idle);

fn persistence_failed(error: &Error) -> ConversationEvent {
    tracing::error!(error = %error, "could not save turn");
    ConversationEvent::PersistenceFailed {
        reason: error.to_string(),
    }
}

impl Inner {
    fn try_begin(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == ConversationState::AwaitingResponse {
            return false;
        }
        *state = ConversationState::AwaitingResponse;
        true
    }

    /// Return to idle and announce `events` under the state lock
    ///
    /// A new submission cannot claim the slot until every event of the
    /// finished turn is queued, so observers see turns in state order.
    fn finish(&self, events: &[ConversationEvent]) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = ConversationState::Idle;
        for event in events {
            self.notify(event);
        }
    }

    fn notify(&self, event: &ConversationEvent) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    async fn complete_turn(self: Arc<Self>, user_turn: Message) {
        let history = match self
            .messages
            .recent_before(user_turn.id, self.builder.window())
        {
            Ok(history) => history,
            Err(e) => {
                self.finish(&[persistence_failed(&e), IDLE]);
                return;
            }
        };

        let context = self.builder.build(&history, &user_turn.content);
        let outcome = self.dispatch(context).await;
        let reply = self.persona.reply_text(&outcome);

        match self
            .messages
            .append(Sender::Assistant, &reply, MessageKind::Text)
        {
            Ok(message) => {
                tracing::info!(
                    message_id = message.id,
                    generated = outcome.is_reply(),
                    "reply stored"
                );
                self.finish(&[ConversationEvent::Turn(message), IDLE]);
            }
            Err(e) => self.finish(&[persistence_failed(&e), IDLE]),
        }
    }

    /// Run the provider call in its own task, bounded by the request timeout
    async fn dispatch(&self, context: Vec<ContextTurn>) -> GenerationOutcome {
        let gateway = Arc::clone(&self.gateway);
        let mut task = self
            .runtime
            .spawn(async move { gateway.generate(&context).await });

        match tokio::time::timeout(self.request_timeout, &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "provider task ended abnormally");
                GenerationOutcome::Failed(ProviderError::Internal(e.to_string()))
            }
            Err(_) => {
                task.abort();
                tracing::warn!(
                    timeout_secs = self.request_timeout.as_secs(),
                    "provider request timed out"
                );
                GenerationOutcome::TimedOut(self.request_timeout)
            }
        }
    }
}
