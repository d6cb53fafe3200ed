//! Generative-language provider plumbing
//!
//! [`Provider`] is one initialized client able to complete a context window.
//! [`ProviderConnector`] performs client initialization from a credential.
//! [`ProviderGateway`] owns the credential lifecycle and turns every failure
//! into a [`GenerationOutcome`] instead of an error.

mod gateway;
pub mod gemini;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::context::ContextTurn;

pub use gateway::{GatewayStatus, ProviderGateway, mask_secret};
pub use gemini::{GeminiClient, GeminiConnector};

/// Failures reported by a provider
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Credential rejected before any request could be made
    #[error("invalid api key: {0}")]
    InvalidKey(String),

    /// Transport-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Credential refused by the provider
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Non-success response from the provider
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Response did not contain usable text
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// The task running the request ended without a result
    #[error("provider task failed: {0}")]
    Internal(String),
}

/// Tagged result of one generation attempt
///
/// Resolved to display text by [`Persona::reply_text`](crate::Persona::reply_text).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The provider's reply
    Reply(String),
    /// The provider call failed
    Failed(ProviderError),
    /// The provider did not answer within the limit
    TimedOut(Duration),
    /// No usable credential; no request was made
    Unconfigured,
}

impl GenerationOutcome {
    /// Whether a reply was actually generated
    #[must_use]
    pub const fn is_reply(&self) -> bool {
        matches!(self, Self::Reply(_))
    }
}

/// An initialized provider client
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Complete the given context window with a single text reply
    async fn complete(&self, context: &[ContextTurn]) -> Result<String, ProviderError>;
}

/// Creates provider clients from a credential
pub trait ProviderConnector: Send + Sync {
    /// Initialize a client for `api_key`
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be initialized
    fn connect(&self, api_key: &SecretString) -> Result<Arc<dyn Provider>, ProviderError>;
}
