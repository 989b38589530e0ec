//! One manager per live session id.
//!
//! The registry is an owned component held by the composition root and
//! injected into request handlers — never module-level global state. It
//! guarantees at most one [`ConversationSessionManager`] per live id within
//! a process and wraps each in a per-session mutex: turns for one session
//! are strictly sequential (the prompt embeds a full history snapshot),
//! while different sessions proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::providers::CompletionProvider;

use super::manager::ConversationSessionManager;
use super::store::MessageStore;
use super::templates::PromptTemplateRegistry;
use super::SessionError;

/// Default inactivity TTL before an idle session is evicted.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// A registry entry: the manager behind its per-session lock, plus the
/// last-activity instant driving TTL eviction.
pub struct SessionHandle {
    manager: Mutex<ConversationSessionManager>,
    last_active: StdMutex<Instant>,
}

impl SessionHandle {
    fn new(manager: ConversationSessionManager) -> Self {
        Self {
            manager: Mutex::new(manager),
            last_active: StdMutex::new(Instant::now()),
        }
    }

    /// The per-session lock. Hold it for the whole turn or termination call.
    pub fn manager(&self) -> &Mutex<ConversationSessionManager> {
        &self.manager
    }

    fn touch(&self) {
        let mut guard = self.last_active.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        let guard = self.last_active.lock().unwrap_or_else(|e| e.into_inner());
        guard.elapsed()
    }
}

/// Maps opaque session ids to their managers, creating on first use.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
    store: Arc<dyn MessageStore>,
    provider: Arc<dyn CompletionProvider>,
    templates: Arc<PromptTemplateRegistry>,
    ttl: Duration,
}

impl SessionRegistry {
    /// Create a registry over the shared collaborators.
    pub fn new(
        store: Arc<dyn MessageStore>,
        provider: Arc<dyn CompletionProvider>,
        templates: Arc<PromptTemplateRegistry>,
        ttl: Duration,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            store,
            provider,
            templates,
            ttl,
        }
    }

    /// Resolve the handle for a session id, creating a manager on first use.
    ///
    /// A new manager loads any persisted history for the id, so a session
    /// can be resumed mid-conversation after a process restart. Ended
    /// managers stay resident (late turns must observe the terminal state)
    /// and age out via the inactivity TTL, which is swept on every access.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the history load fails.
    pub async fn get_or_create(&self, session_id: &str) -> Result<Arc<SessionHandle>, SessionError> {
        let mut sessions = self.sessions.lock().await;
        prune_expired(&mut sessions, self.ttl);

        if let Some(handle) = sessions.get(session_id) {
            handle.touch();
            return Ok(Arc::clone(handle));
        }

        let manager = ConversationSessionManager::load(
            session_id.to_owned(),
            Arc::clone(&self.store),
            Arc::clone(&self.provider),
            Arc::clone(&self.templates),
        )
        .await?;
        debug!(session_id, "session manager created");

        let handle = Arc::new(SessionHandle::new(manager));
        sessions.insert(session_id.to_owned(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Number of resident sessions (ended-but-not-yet-pruned included).
    pub async fn live_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

fn prune_expired(sessions: &mut HashMap<String, Arc<SessionHandle>>, ttl: Duration) {
    sessions.retain(|session_id, handle| {
        // Never evict a session with a turn in flight.
        if Arc::strong_count(handle) > 1 {
            return true;
        }
        if handle.idle_for() <= ttl {
            return true;
        }
        debug!(session_id, "evicting idle session");
        false
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionRequest, CompletionResponse, ProviderError};
    use crate::session::store::InMemoryMessageStore;
    use crate::session::{SessionPhase, Turn};

    struct NullProvider;

    #[async_trait::async_trait]
    impl CompletionProvider for NullProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            Err(ProviderError::Unavailable("null provider".to_owned()))
        }

        fn model_id(&self) -> &str {
            "null"
        }
    }

    fn make_registry(ttl: Duration) -> SessionRegistry {
        SessionRegistry::new(
            Arc::new(InMemoryMessageStore::new()),
            Arc::new(NullProvider),
            Arc::new(PromptTemplateRegistry::with_defaults()),
            ttl,
        )
    }

    #[tokio::test]
    async fn test_same_id_resolves_to_same_handle() {
        let registry = make_registry(DEFAULT_SESSION_TTL);
        let a = registry.get_or_create("s1").await.expect("create");
        let b = registry.get_or_create("s1").await.expect("resolve");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.live_sessions().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_ids_get_distinct_managers() {
        let registry = make_registry(DEFAULT_SESSION_TTL);
        let a = registry.get_or_create("s1").await.expect("create");
        let b = registry.get_or_create("s2").await.expect("create");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.live_sessions().await, 2);
    }

    #[tokio::test]
    async fn test_idle_sessions_are_pruned() {
        let registry = make_registry(Duration::ZERO);
        {
            let handle = registry.get_or_create("s1").await.expect("create");
            drop(handle);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;

        // Accessing another id sweeps the expired one.
        let _other = registry.get_or_create("s2").await.expect("create");
        let sessions = registry.live_sessions().await;
        assert_eq!(sessions, 1, "s1 should have been evicted");
    }

    #[tokio::test]
    async fn test_held_handles_are_not_pruned() {
        let registry = make_registry(Duration::ZERO);
        let held = registry.get_or_create("s1").await.expect("create");
        tokio::time::sleep(Duration::from_millis(5)).await;

        let _other = registry.get_or_create("s2").await.expect("create");
        assert_eq!(registry.live_sessions().await, 2);
        drop(held);
    }

    #[tokio::test]
    async fn test_manager_resumes_engaged_over_persisted_history() {
        let store = Arc::new(InMemoryMessageStore::new());
        store
            .add_message("s1", Turn::user("이전 이야기"))
            .await
            .expect("seed");
        store
            .add_message("s1", Turn::assistant("네.", vec![]))
            .await
            .expect("seed");

        let registry = SessionRegistry::new(
            store,
            Arc::new(NullProvider),
            Arc::new(PromptTemplateRegistry::with_defaults()),
            DEFAULT_SESSION_TTL,
        );
        let handle = registry.get_or_create("s1").await.expect("create");
        assert_eq!(handle.manager().lock().await.phase(), SessionPhase::Engaged);
    }
}
