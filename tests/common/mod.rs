//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedReceiver;

use companion_chat::config::ConversationConfig;
use companion_chat::{
    ContextTurn, ConversationController, ConversationEvent, DbPool, Message, MessageKind,
    MessageRepo, Persona, Provider, ProviderConnector, ProviderError, ProviderGateway, Sender,
    SettingsRepo, db,
};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// How a [`MockProvider`] answers
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Reply with the text of the last context turn
    Echo,
    /// Fail every call with this error
    Fail(ProviderError),
    /// Never answer
    Hang,
    /// Panic inside the call
    Panic,
}

/// Provider double that records every context it is given
pub struct MockProvider {
    behavior: Behavior,
    gate: Option<Notify>,
    /// Signalled when a call enters the provider
    pub started: Notify,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    contexts: Mutex<Vec<Vec<ContextTurn>>>,
}

impl MockProvider {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self::build(behavior, None))
    }

    /// A provider that holds every call until [`MockProvider::release`]
    pub fn gated(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self::build(behavior, Some(Notify::new())))
    }

    fn build(behavior: Behavior, gate: Option<Notify>) -> Self {
        Self {
            behavior,
            gate,
            started: Notify::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Let one held call continue
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<Vec<ContextTurn>> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn complete(&self, context: &[ContextTurn]) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.to_vec());
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let result = match &self.behavior {
            Behavior::Echo => Ok(context.last().map(|t| t.text.clone()).unwrap_or_default()),
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::Hang => std::future::pending().await,
            Behavior::Panic => panic!("mock provider blew up"),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Connector that hands out the shared [`MockProvider`] for any key
pub struct MockConnector {
    provider: Arc<MockProvider>,
    pub connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(provider: Arc<MockProvider>) -> Arc<Self> {
        Arc::new(Self {
            provider,
            connects: AtomicUsize::new(0),
        })
    }
}

impl ProviderConnector for MockConnector {
    fn connect(&self, _api_key: &SecretString) -> Result<Arc<dyn Provider>, ProviderError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let provider: Arc<dyn Provider> = self.provider.clone();
        Ok(provider)
    }
}

/// A controller wired to a mock provider over an in-memory store
pub struct Harness {
    pub pool: DbPool,
    pub provider: Arc<MockProvider>,
    pub gateway: Arc<ProviderGateway>,
    pub controller: ConversationController,
    pub events: UnboundedReceiver<ConversationEvent>,
}

impl Harness {
    /// Must be called inside a Tokio runtime
    pub fn new(provider: Arc<MockProvider>, api_key: Option<&str>) -> Self {
        Self::with_config(provider, api_key, &ConversationConfig::default())
    }

    pub fn with_config(
        provider: Arc<MockProvider>,
        api_key: Option<&str>,
        config: &ConversationConfig,
    ) -> Self {
        let pool = setup_test_db();
        let connector = MockConnector::new(provider.clone());
        let gateway = Arc::new(ProviderGateway::new(
            SettingsRepo::new(pool.clone()),
            connector,
        ));
        if let Some(key) = api_key {
            gateway.configure(key).expect("failed to configure gateway");
        }

        let controller =
            ConversationController::new(pool.clone(), gateway.clone(), Persona::default(), config)
                .expect("failed to create controller");
        let events = controller.subscribe();

        Self {
            pool,
            provider,
            gateway,
            controller,
            events,
        }
    }

    /// Repository over the same store, labelled with the default persona
    pub fn messages(&self) -> MessageRepo {
        MessageRepo::new(self.pool.clone(), Persona::default().name)
    }

    /// Seed alternating user/assistant turns, oldest first
    pub fn seed(&self, count: usize) -> Vec<Message> {
        let repo = self.messages();
        (0..count)
            .map(|i| {
                let sender = if i % 2 == 0 {
                    Sender::User
                } else {
                    Sender::Assistant
                };
                repo.append(sender, &format!("turn {i}"), MessageKind::Text)
                    .expect("failed to seed message")
            })
            .collect()
    }

    /// Wait for the next assistant turn
    pub async fn next_reply(&mut self) -> Message {
        loop {
            match self.events.recv().await.expect("event channel closed") {
                ConversationEvent::Turn(message) if message.sender == Sender::Assistant => {
                    return message;
                }
                ConversationEvent::PersistenceFailed { reason } => {
                    panic!("unexpected persistence failure: {reason}")
                }
                _ => {}
            }
        }
    }

    /// Collect events up to and including the next persistence failure
    pub async fn next_persistence_failure(&mut self) -> String {
        loop {
            if let ConversationEvent::PersistenceFailed { reason } =
                self.events.recv().await.expect("event channel closed")
            {
                return reason;
            }
        }
    }
}
