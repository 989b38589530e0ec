//! The per-session state machine and turn orchestration.
//!
//! A [`ConversationSessionManager`] owns one session's phase and drives the
//! full turn pipeline: store the user turn, build the prompt from history,
//! invoke the completion service, validate the output, store the assistant
//! turn. It also owns termination: summarize the transcript, clear working
//! memory, and refuse everything afterwards. Managers are single-use — once
//! ended, a fresh manager (and session id) must be created.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::providers::{CompletionProvider, CompletionRequest};

use super::store::MessageStore;
use super::templates::{PromptTemplateRegistry, TemplateKind};
use super::validator;
use super::{render_history, SessionError, SessionPhase, StructuredReply, Summary, Turn};

/// Owns one conversation session's phase and turn processing.
pub struct ConversationSessionManager {
    session_id: String,
    phase: SessionPhase,
    store: Arc<dyn MessageStore>,
    provider: Arc<dyn CompletionProvider>,
    templates: Arc<PromptTemplateRegistry>,
}

impl ConversationSessionManager {
    /// Construct a manager for a session id, loading any persisted history.
    ///
    /// The initial phase is computed from the loaded history — `Fresh` iff
    /// it is empty — so a manager can be reconstructed mid-conversation
    /// after a process restart.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the history read fails.
    pub async fn load(
        session_id: String,
        store: Arc<dyn MessageStore>,
        provider: Arc<dyn CompletionProvider>,
        templates: Arc<PromptTemplateRegistry>,
    ) -> Result<Self, SessionError> {
        let existing = store.messages(&session_id).await?;
        let phase = if existing.is_empty() {
            SessionPhase::Fresh
        } else {
            SessionPhase::Engaged
        };
        debug!(session_id, ?phase, turns = existing.len(), "session manager loaded");
        Ok(Self {
            session_id,
            phase,
            store,
            provider,
            templates,
        })
    }

    /// The session id this manager serves.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Process one user turn and return the validated counselor reply.
    ///
    /// The user turn is committed before the completion call and is not
    /// rolled back if that call fails; a retry re-sends the same prompt
    /// rather than re-appending. Malformed model output never fails this
    /// call — the validator degrades it to a deterministic reply.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionEnded`] past termination,
    /// [`SessionError::EmptyInput`] for blank content,
    /// [`SessionError::Store`] / [`SessionError::Completion`] for I/O, and
    /// [`SessionError::Template`] if the registry is misconfigured.
    pub async fn process_turn(&mut self, user_content: &str) -> Result<StructuredReply, SessionError> {
        if self.phase == SessionPhase::Ended {
            return Err(SessionError::SessionEnded);
        }
        let content = user_content.trim();
        if content.is_empty() {
            return Err(SessionError::EmptyInput);
        }

        self.store
            .add_message(&self.session_id, Turn::user(content))
            .await?;

        let history = self.store.messages(&self.session_id).await?;
        let history_text = render_history(&history);

        let kind = match self.phase {
            SessionPhase::Fresh => TemplateKind::Initial,
            SessionPhase::Engaged | SessionPhase::Ended => TemplateKind::Ongoing,
        };
        let template = self.templates.get(kind)?;
        let system = template.render_chat(&history_text, content);

        let completion = self
            .provider
            .complete(CompletionRequest {
                system: Some(system),
                input: content.to_owned(),
                max_tokens: None,
            })
            .await?;

        let reply = validator::validate_reply(&completion.text, kind);

        self.store
            .add_message(
                &self.session_id,
                Turn::assistant(reply.response.clone(), reply.action_items.clone()),
            )
            .await?;

        if self.phase == SessionPhase::Fresh {
            self.phase = SessionPhase::Engaged;
            info!(session_id = %self.session_id, "session engaged");
        }

        Ok(reply)
    }

    /// End the session: summarize the transcript, clear working memory,
    /// and transition to the terminal phase.
    ///
    /// An empty history yields the canned default summary without invoking
    /// the completion service. Summarization failures also degrade to the
    /// default summary — history must not survive a failed attempt, so the
    /// clear still runs. Only a failure of the clear itself propagates, and
    /// in that case the phase is left unchanged so the caller can retry.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionEnded`] if already ended,
    /// [`SessionError::Store`] if the final clear fails.
    pub async fn end_session(&mut self) -> Result<Summary, SessionError> {
        if self.phase == SessionPhase::Ended {
            return Err(SessionError::SessionEnded);
        }

        let summary = match self.summarize().await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "summarization failed, using default summary");
                validator::default_summary()
            }
        };

        self.store.clear(&self.session_id).await?;
        self.phase = SessionPhase::Ended;
        info!(session_id = %self.session_id, "session ended");

        Ok(summary)
    }

    async fn summarize(&self) -> Result<Summary, SessionError> {
        let history = self.store.messages(&self.session_id).await?;
        if history.is_empty() {
            debug!(session_id = %self.session_id, "empty session, skipping summary completion");
            return Ok(validator::default_summary());
        }

        let transcript = render_history(&history);
        let template = self.templates.get(TemplateKind::Summary)?;
        let prompt = template.render_summary(&transcript);

        let completion = self
            .provider
            .complete(CompletionRequest {
                system: None,
                input: prompt,
                max_tokens: None,
            })
            .await?;

        Ok(validator::validate_summary(&completion.text))
    }
}
