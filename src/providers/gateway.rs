//! Credential lifecycle and failure normalization around a provider

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use secrecy::SecretString;

use super::{GenerationOutcome, Provider, ProviderConnector};
use crate::Result;
use crate::context::{ContextTurn, TurnRole};
use crate::db::{SettingsRepo, keys};

/// Text sent by [`ProviderGateway::test_connection`]
const PROBE_TEXT: &str = "test";

/// Public view of the gateway's credential state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatus {
    /// A client is initialized and requests will be sent
    Configured,
    /// No usable client; `reason` is set when initialization failed
    Unconfigured { reason: Option<String> },
}

impl GatewayStatus {
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        matches!(self, Self::Configured)
    }
}

enum GatewayState {
    Unconfigured { reason: Option<String> },
    Configured { client: Arc<dyn Provider> },
}

impl GatewayState {
    fn status(&self) -> GatewayStatus {
        match self {
            Self::Configured { .. } => GatewayStatus::Configured,
            Self::Unconfigured { reason } => GatewayStatus::Unconfigured {
                reason: reason.clone(),
            },
        }
    }
}

/// Wraps the external generation call
///
/// Transitions: `Unconfigured -> Configured` on a successful
/// [`configure`](Self::configure), back to `Unconfigured` when a later
/// configuration fails or clears the key. Provider failures never escape
/// [`generate`](Self::generate).
pub struct ProviderGateway {
    settings: SettingsRepo,
    connector: Arc<dyn ProviderConnector>,
    state: RwLock<GatewayState>,
}

impl ProviderGateway {
    /// Create an unconfigured gateway
    #[must_use]
    pub fn new(settings: SettingsRepo, connector: Arc<dyn ProviderConnector>) -> Self {
        Self {
            settings,
            connector,
            state: RwLock::new(GatewayState::Unconfigured { reason: None }),
        }
    }

    /// Create a gateway and initialize it from the stored credential, if any
    ///
    /// # Errors
    ///
    /// Returns error if the settings store is unavailable
    pub fn from_store(settings: SettingsRepo, connector: Arc<dyn ProviderConnector>) -> Result<Self> {
        let gateway = Self::new(settings, connector);
        match gateway.settings.get(keys::PROVIDER_API_KEY)? {
            Some(key) if !key.trim().is_empty() => {
                gateway.initialize(key.trim());
            }
            _ => tracing::info!("no provider credential stored"),
        }
        Ok(gateway)
    }

    /// Store a new credential and (re)initialize the client
    ///
    /// A blank key clears the stored credential. A client initialization
    /// failure is not an error: it leaves the gateway unconfigured with the
    /// reason recorded in [`status`](Self::status).
    ///
    /// # Errors
    ///
    /// Returns error if the settings store is unavailable
    pub fn configure(&self, api_key: &str) -> Result<GatewayStatus> {
        let api_key = api_key.trim();

        if api_key.is_empty() {
            self.settings.remove(keys::PROVIDER_API_KEY)?;
            *self.state.write().unwrap_or_else(PoisonError::into_inner) =
                GatewayState::Unconfigured { reason: None };
            tracing::info!("provider credential cleared");
            return Ok(GatewayStatus::Unconfigured { reason: None });
        }

        self.settings.set(keys::PROVIDER_API_KEY, api_key)?;
        Ok(self.initialize(api_key))
    }

    fn initialize(&self, api_key: &str) -> GatewayStatus {
        let secret = SecretString::from(api_key.to_string());

        let next = match self.connector.connect(&secret) {
            Ok(client) => {
                tracing::info!(provider = client.name(), "provider client initialized");
                GatewayState::Configured { client }
            }
            Err(e) => {
                tracing::warn!(error = %e, "provider client initialization failed");
                GatewayState::Unconfigured {
                    reason: Some(e.to_string()),
                }
            }
        };

        let status = next.status();
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
        status
    }

    /// Current credential state
    #[must_use]
    pub fn status(&self) -> GatewayStatus {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status()
    }

    /// Stored credential in masked form, for display
    ///
    /// # Errors
    ///
    /// Returns error if the settings store is unavailable
    pub fn masked_key(&self) -> Result<Option<String>> {
        Ok(self
            .settings
            .get(keys::PROVIDER_API_KEY)?
            .map(|key| mask_secret(&key)))
    }

    fn client(&self) -> Option<Arc<dyn Provider>> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            GatewayState::Configured { client } => Some(Arc::clone(client)),
            GatewayState::Unconfigured { .. } => None,
        }
    }

    /// Generate a reply for the given context
    ///
    /// Returns [`GenerationOutcome::Unconfigured`] without any network call
    /// when no client is initialized. Failures are returned as
    /// [`GenerationOutcome::Failed`] and not retried.
    pub async fn generate(&self, context: &[ContextTurn]) -> GenerationOutcome {
        let Some(client) = self.client() else {
            tracing::debug!("generation skipped, provider not configured");
            return GenerationOutcome::Unconfigured;
        };

        let started = Instant::now();
        let result = client.complete(context).await;
        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(text) => {
                tracing::debug!(
                    provider = client.name(),
                    turns = context.len(),
                    elapsed_ms,
                    "generation completed"
                );
                GenerationOutcome::Reply(text)
            }
            Err(e) => {
                tracing::warn!(
                    provider = client.name(),
                    error = %e,
                    elapsed_ms,
                    "generation failed"
                );
                GenerationOutcome::Failed(e)
            }
        }
    }

    /// Send a one-turn probe to check the credential end to end
    pub async fn test_connection(&self) -> GenerationOutcome {
        self.generate(&[ContextTurn::new(TurnRole::User, PROBE_TEXT)])
            .await
    }
}

/// Mask a secret for display, keeping at most the first and last 4 chars
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}
