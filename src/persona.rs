//! Persona configuration
//!
//! A persona fixes everything about the assistant that is constant across
//! requests: its name, the preamble sent ahead of every context window, the
//! greeting shown on an empty transcript and the fallback texts used when a
//! reply cannot be generated.

use serde::{Deserialize, Serialize};

use crate::context::Preamble;
use crate::providers::GenerationOutcome;

/// Placeholder substituted with the error description in fallback texts
pub const REASON_PLACEHOLDER: &str = "{reason}";

const DEFAULT_NAME: &str = "Mimi";

const DEFAULT_INSTRUCTION: &str = "\
You are a virtual companion called Mimi.

Personality:
- you are a small, shy ghost-like creature who secretly wants to be liked
- you help with everyday life
- you enjoy chatting, it keeps boredom away

Reply style:
- short and direct messages
- mostly lowercase
- answer in the language the user writes in";

const DEFAULT_ACKNOWLEDGEMENT: &str = "ok, got it! i'm ready. talk soon! ;)";

const DEFAULT_GREETING: &str = "hi! it's mimi! ready to chat? B-)";

/// Assistant identity and fixed texts
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Persona {
    /// Display name, also persisted as the sender label of assistant turns
    pub name: String,

    /// Instruction turn establishing the assistant's behaviour
    pub instruction: String,

    /// Acknowledgement turn answering the instruction
    pub acknowledgement: String,

    /// First assistant turn written to an empty transcript
    pub greeting: String,

    /// Replies used when generation cannot complete normally
    pub fallback: FallbackTexts,
}

/// Deterministic replies used in place of a generated one
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackTexts {
    /// No credential configured
    pub not_configured: String,

    /// Provider call failed; `{reason}` is replaced by the error description
    pub provider_error: String,

    /// Provider did not answer in time; `{reason}` is replaced by the limit
    pub timed_out: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            acknowledgement: DEFAULT_ACKNOWLEDGEMENT.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            fallback: FallbackTexts::default(),
        }
    }
}

impl Default for FallbackTexts {
    fn default() -> Self {
        Self {
            not_configured:
                "yo! set your api key in the settings so we can chat! ;)".to_string(),
            provider_error: "oops! the api had a hiccup... ({reason}) try again! :s".to_string(),
            timed_out: "hmm, no answer from the api ({reason}). try again? :s".to_string(),
        }
    }
}

impl Persona {
    /// Preamble turns prepended to every request
    #[must_use]
    pub fn preamble(&self) -> Preamble {
        Preamble::new(&self.instruction, &self.acknowledgement)
    }

    /// Resolve a generation outcome to the text persisted as the reply
    #[must_use]
    pub fn reply_text(&self, outcome: &GenerationOutcome) -> String {
        match outcome {
            GenerationOutcome::Reply(text) => text.clone(),
            GenerationOutcome::Unconfigured => self.fallback.not_configured.clone(),
            GenerationOutcome::Failed(err) => {
                substitute_reason(&self.fallback.provider_error, &err.to_string())
            }
            GenerationOutcome::TimedOut(limit) => substitute_reason(
                &self.fallback.timed_out,
                &format!("no reply within {}s", limit.as_secs()),
            ),
        }
    }
}

fn substitute_reason(template: &str, reason: &str) -> String {
    if template.contains(REASON_PLACEHOLDER) {
        template.replace(REASON_PLACEHOLDER, reason)
    } else {
        format!("{template} ({reason})")
    }
}
