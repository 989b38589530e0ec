//! OpenAI-compatible provider wire format tests.

use serde_json::json;

use maum::providers::openai::{build_request, parse_response};
use maum::providers::{CompletionRequest, ProviderError};

fn chat_request() -> CompletionRequest {
    CompletionRequest {
        system: Some("당신은 AI 심리 상담사입니다.".to_owned()),
        input: "요즘 스트레스를 받아요".to_owned(),
        max_tokens: Some(256),
    }
}

#[test]
fn build_request_sets_model_system_and_user_message() {
    let req = build_request("gpt-4o-mini", &chat_request());
    assert_eq!(req.model, "gpt-4o-mini");
    assert_eq!(req.max_tokens, Some(256));
    assert_eq!(req.messages.len(), 2);
    assert_eq!(req.messages[0].role, "system");
    assert_eq!(req.messages[0].content, "당신은 AI 심리 상담사입니다.");
    assert_eq!(req.messages[1].role, "user");
    assert_eq!(req.messages[1].content, "요즘 스트레스를 받아요");
}

#[test]
fn build_request_without_system_sends_single_message() {
    let req = build_request(
        "gpt-4o-mini",
        &CompletionRequest {
            system: None,
            input: "대화 내용을 요약해주세요".to_owned(),
            max_tokens: None,
        },
    );
    assert_eq!(req.messages.len(), 1);
    assert_eq!(req.messages[0].role, "user");
    // Absent max_tokens falls back to the provider default.
    assert!(req.max_tokens.is_some());
}

#[test]
fn request_serialization_omits_absent_max_tokens_field() {
    let mut req = build_request("gpt-4o-mini", &chat_request());
    req.max_tokens = None;
    let value = serde_json::to_value(&req).expect("serialize");
    assert!(value.get("max_tokens").is_none());
    assert!(value.get("temperature").is_some());
}

#[test]
fn parse_response_extracts_first_choice_text() {
    let body = json!({
        "choices": [{
            "message": {"role": "assistant", "content": "{\"response\":\"안녕하세요\"}"},
            "finish_reason": "stop"
        }],
        "model": "gpt-4o-mini"
    });
    let resp = parse_response("fallback-model", &body.to_string()).expect("parse");
    assert_eq!(resp.text, "{\"response\":\"안녕하세요\"}");
    assert_eq!(resp.model, "gpt-4o-mini");
}

#[test]
fn parse_response_uses_fallback_model_when_absent() {
    let body = json!({
        "choices": [{"message": {"content": "ok"}}]
    });
    let resp = parse_response("configured-model", &body.to_string()).expect("parse");
    assert_eq!(resp.model, "configured-model");
}

#[test]
fn parse_response_rejects_missing_choices() {
    let body = json!({"choices": [], "model": "m"});
    let err = parse_response("m", &body.to_string()).expect_err("no choices");
    assert!(matches!(err, ProviderError::Parse(_)));
}

#[test]
fn parse_response_rejects_empty_content() {
    let body = json!({
        "choices": [{"message": {"content": ""}}],
        "model": "m"
    });
    let err = parse_response("m", &body.to_string()).expect_err("empty content");
    assert!(matches!(err, ProviderError::Parse(_)));
}

#[test]
fn parse_response_rejects_invalid_json() {
    let err = parse_response("m", "not json at all").expect_err("invalid body");
    assert!(matches!(err, ProviderError::Parse(_)));
}
