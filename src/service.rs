//! The boundary the outer layer (adapters, HTTP handlers) talks to.
//!
//! [`CounselService`] hides the registry/manager machinery behind the two
//! operations a client needs: submit a turn and end a session. It also owns
//! session-id generation, so a caller without an id gets one back and
//! carries it for the rest of the conversation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

use crate::providers::CompletionProvider;
use crate::session::registry::SessionRegistry;
use crate::session::store::MessageStore;
use crate::session::templates::PromptTemplateRegistry;
use crate::session::{SessionError, Summary};

/// Result of submitting one user turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The session id — generated if the caller supplied none; the caller
    /// must send it back on every later turn for continuity.
    pub session_id: String,
    /// Validated counselor reply text.
    pub response: String,
    /// Suggested practical steps attached to this reply.
    pub action_items: Vec<String>,
}

/// Facade over the session registry exposing the external contract.
pub struct CounselService {
    registry: SessionRegistry,
}

impl CounselService {
    /// Build the service over its collaborators.
    pub fn new(
        store: Arc<dyn MessageStore>,
        provider: Arc<dyn CompletionProvider>,
        templates: Arc<PromptTemplateRegistry>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(store, provider, templates, session_ttl),
        }
    }

    /// Submit one user turn, creating the session when `session_id` is absent.
    ///
    /// Turns within one session are serialized behind the session lock;
    /// calls for different sessions run in parallel.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError`] from the session pipeline; malformed
    /// model output is degraded internally and never surfaces here.
    pub async fn submit_turn(
        &self,
        session_id: Option<&str>,
        content: &str,
    ) -> Result<TurnOutcome, SessionError> {
        let session_id = match session_id {
            Some(id) => id.to_owned(),
            None => {
                let id = generate_session_id();
                debug!(session_id = %id, "generated new session id");
                id
            }
        };

        let handle = self.registry.get_or_create(&session_id).await?;
        let reply = handle.manager().lock().await.process_turn(content).await?;

        Ok(TurnOutcome {
            session_id,
            response: reply.response,
            action_items: reply.action_items,
        })
    }

    /// End a session and return its structured summary.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionEnded`] if the session was already ended;
    /// [`SessionError::Store`] if the final history clear fails (retryable).
    pub async fn end_session(&self, session_id: &str) -> Result<Summary, SessionError> {
        let handle = self.registry.get_or_create(session_id).await?;
        let summary = handle.manager().lock().await.end_session().await;
        summary
    }
}

/// Generate an opaque session token: `session_<unix-millis>_<random>`.
fn generate_session_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("session_{}_{}", Utc::now().timestamp_millis(), suffix)
}
