//! Conversation sessions: turn history, prompting, validation, summarization.
//!
//! A session is one continuous counseling conversation identified by an
//! opaque id. The [`manager::ConversationSessionManager`] owns the phase
//! state machine; [`registry::SessionRegistry`] guarantees one manager per
//! live session id; [`store::MessageStore`] holds the ordered turn history;
//! [`templates::PromptTemplateRegistry`] and [`validator`] sit on either
//! side of the completion call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod manager;
pub mod registry;
pub mod store;
pub mod templates;
pub mod validator;

use crate::providers::ProviderError;
use store::StoreError;
use templates::TemplateError;

// ---------------------------------------------------------------------------
// Turns
// ---------------------------------------------------------------------------

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The journaling user.
    User,
    /// The counselor (LLM) reply.
    Assistant,
}

impl Role {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse from a stored text value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the value is not a recognised role.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(StoreError::Unavailable(format!(
                "unknown role in stored turn: {other:?}"
            ))),
        }
    }
}

/// Structured extension slot carried by a turn.
///
/// Assistant turns carry the action items extracted from the validated
/// model response; user turns leave it empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMetadata {
    /// Suggested practical steps attached to an assistant reply.
    #[serde(default)]
    pub action_items: Vec<String>,
}

/// One utterance in a conversation. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who authored the turn.
    pub role: Role,
    /// Message text. Never empty after trimming; the store rejects blanks.
    pub content: String,
    /// Extension metadata (action items for assistant turns).
    #[serde(default)]
    pub metadata: TurnMetadata,
    /// When the turn was created.
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            metadata: TurnMetadata::default(),
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant turn carrying its action items.
    pub fn assistant(content: impl Into<String>, action_items: Vec<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            metadata: TurnMetadata { action_items },
            timestamp: Utc::now(),
        }
    }
}

/// Render a turn history as the `"<Role>: <content>"` transcript block
/// embedded into prompts, oldest first.
pub fn render_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let role = match t.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{role}: {}", t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Validated responses
// ---------------------------------------------------------------------------

/// The validated, typed result of parsing a conversational model reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredReply {
    /// Counselor reply text shown to the user.
    pub response: String,
    /// Suggested practical steps (0–2 recommended by the prompt contract,
    /// not hard-capped here).
    #[serde(default)]
    pub action_items: Vec<String>,
}

/// One emotion detected in a session, normalized to label + intensity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emotion {
    /// Emotion keyword (e.g. "스트레스", "불안", "희망").
    pub label: String,
    /// Intensity in `[0, 1]`. Defaults to 0.5 when the model omits it.
    pub score: f64,
}

/// Terminal artifact of a session, computed once at session end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// 2–3 sentence synopsis of the conversation.
    pub summary: String,
    /// Detected emotions with normalized intensities.
    pub emotions: Vec<Emotion>,
    /// Key insights surfaced during the conversation.
    pub insights: Vec<String>,
    /// Suggested practical follow-ups.
    pub action_items: Vec<String>,
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Session phase. The Fresh→Engaged transition is one-way; Ended is terminal.
///
/// A manager is only observable after its history load completes, so the
/// momentary "constructed but not loaded" state has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// No completed exchange yet; the next turn uses the initial template.
    Fresh,
    /// At least one assistant turn exists; all turns use the ongoing template.
    Engaged,
    /// Session terminated; history cleared; no further turns accepted.
    Ended,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by session operations.
///
/// Malformed model output is *not* represented here: the validator absorbs
/// it into deterministic fallback responses so a single bad completion never
/// aborts a conversation.
#[derive(Debug, Error)]
pub enum SessionError {
    /// User submitted blank content; rejected before any I/O.
    #[error("empty input: message content is blank")]
    EmptyInput,
    /// Operation attempted on a session past termination.
    #[error("session already ended; start a new session")]
    SessionEnded,
    /// Backing store I/O failure; the caller may retry the whole call.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Completion service timeout or transport failure.
    #[error("completion service error: {0}")]
    Completion(#[from] ProviderError),
    /// Fatal configuration error — a prompt template kind has no registration.
    #[error(transparent)]
    Template(#[from] TemplateError),
}
