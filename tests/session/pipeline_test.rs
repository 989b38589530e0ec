//! End-to-end turn pipeline over the public service contract.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use maum::providers::{CompletionProvider, CompletionRequest, CompletionResponse, ProviderError};
use maum::service::CounselService;
use maum::session::store::InMemoryMessageStore;
use maum::session::templates::PromptTemplateRegistry;
use maum::session::SessionError;

/// Provider scripted with canned completions, recording every request.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|s| (*s).to_owned()).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request(&self, index: usize) -> CompletionRequest {
        self.requests.lock().expect("lock")[index].clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().expect("lock").len()
    }
}

#[async_trait::async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.requests.lock().expect("lock").push(request);
        match self.responses.lock().expect("lock").pop_front() {
            Some(text) => Ok(CompletionResponse {
                text,
                model: "scripted".to_owned(),
            }),
            None => Err(ProviderError::Unavailable("script exhausted".to_owned())),
        }
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

fn make_service(responses: &[&str]) -> (CounselService, Arc<ScriptedProvider>) {
    let provider = Arc::new(ScriptedProvider::new(responses));
    let service = CounselService::new(
        Arc::new(InMemoryMessageStore::new()),
        Arc::clone(&provider) as Arc<dyn CompletionProvider>,
        Arc::new(PromptTemplateRegistry::with_defaults()),
        Duration::from_secs(1800),
    );
    (service, provider)
}

#[tokio::test]
async fn two_turn_scenario_generates_id_and_carries_history() {
    let (service, provider) = make_service(&[
        "{\"response\":\"많이 힘드시겠어요. 어떤 일이 있으셨나요?\"}",
        "```json\n{\"response\":\"업무량이 많으시군요.\",\"action_items\":[\"우선순위 정하기\"]}\n```",
    ]);

    let first = service
        .submit_turn(None, "요즘 스트레스를 받아요")
        .await
        .expect("first turn");
    assert!(first.session_id.starts_with("session_"));
    assert_eq!(first.response, "많이 힘드시겠어요. 어떤 일이 있으셨나요?");

    let second = service
        .submit_turn(Some(&first.session_id), "일이 너무 많아요")
        .await
        .expect("second turn");
    assert_eq!(second.response, "업무량이 많으시군요.");
    assert_eq!(second.action_items, vec!["우선순위 정하기".to_owned()]);

    // The second prompt's history block carries the whole first exchange,
    // and the ongoing template was used.
    let system = provider.request(1).system.expect("system prompt");
    assert!(system.contains("User: 요즘 스트레스를 받아요"));
    assert!(system.contains("Assistant: 많이 힘드시겠어요. 어떤 일이 있으셨나요?"));
    assert!(system.contains("이전 대화 내용:"));
}

#[tokio::test]
async fn end_session_summarizes_and_seals_the_session() {
    let (service, provider) = make_service(&[
        "{\"response\":\"네, 듣고 있어요.\"}",
        "{\"summary\":\"피로에 대한 대화였습니다.\",\"emotions\":[{\"label\":\"피로\",\"score\":0.9}],\"insights\":[\"휴식 부족\"],\"actionItems\":[\"일찍 자기\"]}",
    ]);

    let turn = service.submit_turn(None, "계속 피곤해요").await.expect("turn");
    let summary = service.end_session(&turn.session_id).await.expect("end");

    assert_eq!(summary.summary, "피로에 대한 대화였습니다.");
    assert_eq!(summary.emotions.len(), 1);
    assert!((summary.emotions[0].score - 0.9).abs() < f64::EPSILON);
    assert_eq!(summary.action_items, vec!["일찍 자기".to_owned()]);
    assert_eq!(provider.calls(), 2);

    let err = service
        .submit_turn(Some(&turn.session_id), "한 가지만 더요")
        .await
        .expect_err("session is sealed");
    assert!(matches!(err, SessionError::SessionEnded));
}

#[tokio::test]
async fn malformed_summary_degrades_to_canned_default() {
    let (service, _provider) = make_service(&[
        "{\"response\":\"네.\"}",
        "여기에 JSON이 아닌 텍스트",
    ]);

    let turn = service.submit_turn(None, "짧게 얘기해요").await.expect("turn");
    let summary = service.end_session(&turn.session_id).await.expect("end");
    assert_eq!(summary.summary, "대화 내용을 요약하는 데 실패했습니다.");
    assert_eq!(summary.emotions[0].label, "분석 실패");
    assert!((summary.emotions[0].score - 1.0).abs() < f64::EPSILON);
    assert_eq!(summary.insights, vec!["요약을 생성할 수 없습니다.".to_owned()]);
    assert_eq!(summary.action_items, vec!["다시 시도해주세요.".to_owned()]);
}

#[tokio::test]
async fn concurrent_sessions_do_not_interfere() {
    let (service, _provider) = make_service(&[
        "{\"response\":\"답변 A\"}",
        "{\"response\":\"답변 B\"}",
    ]);
    let service = Arc::new(service);

    let a = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.submit_turn(Some("session_a"), "첫 번째 주제").await })
    };
    let b = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.submit_turn(Some("session_b"), "두 번째 주제").await })
    };

    let a = a.await.expect("join").expect("turn a");
    let b = b.await.expect("join").expect("turn b");
    assert_eq!(a.session_id, "session_a");
    assert_eq!(b.session_id, "session_b");
    assert_ne!(a.response, b.response);
}
