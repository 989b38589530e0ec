//! Resuming a session over durable working memory after a restart.

use std::sync::Arc;
use std::time::Duration;

use maum::providers::CompletionProvider;
use maum::service::CounselService;
use maum::session::store::{MessageStore, SqliteMessageStore};
use maum::session::templates::PromptTemplateRegistry;

use super::pipeline_test::ScriptedProvider;

fn service_over(
    store: Arc<dyn MessageStore>,
    provider: Arc<ScriptedProvider>,
) -> CounselService {
    CounselService::new(
        store,
        provider as Arc<dyn CompletionProvider>,
        Arc::new(PromptTemplateRegistry::with_defaults()),
        Duration::from_secs(1800),
    )
}

#[tokio::test]
async fn session_resumes_engaged_after_process_restart() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let db_path = dir
        .path()
        .join("sessions.db")
        .to_string_lossy()
        .into_owned();

    // First process: one exchange, then the process "dies".
    {
        let store: Arc<dyn MessageStore> =
            Arc::new(SqliteMessageStore::open(&db_path).await.expect("open"));
        let provider = Arc::new(ScriptedProvider::new(&[
            "{\"response\":\"어떤 일이 있으셨나요?\"}",
        ]));
        let service = service_over(store, provider);
        service
            .submit_turn(Some("session_resume_1"), "요즘 잠이 안 와요")
            .await
            .expect("first turn");
    }

    // Second process over the same database: the reconstructed manager must
    // pick up mid-conversation — ongoing template, full history in prompt.
    let store: Arc<dyn MessageStore> =
        Arc::new(SqliteMessageStore::open(&db_path).await.expect("reopen"));
    let provider = Arc::new(ScriptedProvider::new(&[
        "{\"response\":\"전에 말씀하신 수면 문제와 이어지네요.\"}",
    ]));
    let service = service_over(store, Arc::clone(&provider));

    let outcome = service
        .submit_turn(Some("session_resume_1"), "오늘도 못 잤어요")
        .await
        .expect("resumed turn");
    assert_eq!(outcome.response, "전에 말씀하신 수면 문제와 이어지네요.");

    let system = provider.request(0).system.expect("system prompt");
    assert!(system.contains("User: 요즘 잠이 안 와요"));
    assert!(system.contains("Assistant: 어떤 일이 있으셨나요?"));
    assert!(
        system.contains("이전 대화 내용:"),
        "resumed session must use the ongoing template"
    );
}
