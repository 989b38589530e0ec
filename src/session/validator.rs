//! Validation and repair of raw model output.
//!
//! LLM output is adversarial-by-unreliability: markdown fences, extra prose,
//! missing fields. This module is the sole boundary that converts that
//! untrusted text into the typed contract the rest of the pipeline relies on
//! without further defensive checks. Failures never escape as errors — every
//! path ends in either a parsed response or a deterministic fallback, so one
//! malformed completion cannot abort a conversation.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::templates::TemplateKind;
use super::{Emotion, StructuredReply, Summary};

/// Degraded reply returned when a conversational response parses as JSON
/// but fails schema validation.
pub const REPLY_FALLBACK_TEXT: &str = "응답 처리 중 오류가 발생했습니다.";

/// The canned summary returned when summarization fails or there is nothing
/// to summarize.
pub fn default_summary() -> Summary {
    Summary {
        summary: "대화 내용을 요약하는 데 실패했습니다.".to_owned(),
        emotions: vec![Emotion {
            label: "분석 실패".to_owned(),
            score: 1.0,
        }],
        insights: vec!["요약을 생성할 수 없습니다.".to_owned()],
        action_items: vec!["다시 시도해주세요.".to_owned()],
    }
}

/// Strip markdown code-fence wrappers (```json … ``` or ``` … ```) and
/// surrounding whitespace.
fn clean_response(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_owned()
}

fn looks_like_json_object(s: &str) -> bool {
    s.starts_with('{') && s.ends_with('}')
}

// ---------------------------------------------------------------------------
// Conversational replies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireReply {
    response: Option<Value>,
    #[serde(default, alias = "actionItems")]
    action_items: Option<Value>,
}

/// Validate a raw completion as a conversational reply.
///
/// Lenient by design: non-JSON text is wrapped as the reply itself (models
/// often answer in prose despite the format instructions), and only a
/// JSON-shaped body that fails the schema degrades to the deterministic
/// fallback reply.
pub fn validate_reply(raw: &str, kind: TemplateKind) -> StructuredReply {
    let cleaned = clean_response(raw);

    if !looks_like_json_object(&cleaned) {
        if cleaned.is_empty() {
            warn!(%kind, "model reply is empty, using fallback");
            return degraded_reply();
        }
        // Plain-text reply: never hard-fail a conversation over formatting.
        return StructuredReply {
            response: cleaned,
            action_items: Vec::new(),
        };
    }

    let parsed: WireReply = match serde_json::from_str(&cleaned) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(%kind, error = %e, "model reply is malformed JSON, using fallback");
            return degraded_reply();
        }
    };

    let Some(Value::String(response)) = parsed.response else {
        warn!(%kind, "model reply is missing required 'response' field, using fallback");
        return degraded_reply();
    };
    if response.trim().is_empty() {
        warn!(%kind, "model reply has a blank 'response' field, using fallback");
        return degraded_reply();
    }

    StructuredReply {
        response,
        action_items: normalize_string_seq(parsed.action_items.as_ref()),
    }
}

fn degraded_reply() -> StructuredReply {
    StructuredReply {
        response: REPLY_FALLBACK_TEXT.to_owned(),
        action_items: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireSummary {
    summary: Option<Value>,
    emotions: Option<Value>,
    insights: Option<Value>,
    #[serde(default, rename = "actionItems", alias = "action_items")]
    action_items: Option<Value>,
}

/// Validate a raw completion as a session summary.
///
/// Requires `summary`, `emotions`, `insights` and `actionItems` to be
/// present; emotion entries are normalized to `{label, score}` (accepting
/// bare labels and `{name, score}` variants). Any failure yields the canned
/// [`default_summary`] rather than an error.
pub fn validate_summary(raw: &str) -> Summary {
    let cleaned = clean_response(raw);

    if !looks_like_json_object(&cleaned) {
        warn!("summary completion is not a JSON object, using default summary");
        return default_summary();
    }

    let parsed: WireSummary = match serde_json::from_str(&cleaned) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "summary completion is malformed JSON, using default summary");
            return default_summary();
        }
    };

    let (Some(Value::String(summary)), Some(emotions), Some(insights), Some(action_items)) = (
        parsed.summary,
        parsed.emotions,
        parsed.insights,
        parsed.action_items,
    ) else {
        warn!("summary completion is missing required fields, using default summary");
        return default_summary();
    };

    Summary {
        summary,
        emotions: normalize_emotions(&emotions),
        insights: normalize_string_seq(Some(&insights)),
        action_items: normalize_string_seq(Some(&action_items)),
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

const DEFAULT_EMOTION_SCORE: f64 = 0.5;

/// Normalize an emotions array to a uniform `{label, score}` shape.
///
/// Entries may be plain strings (`"불안"`), `{label, score}` objects, or the
/// `{name, score}` variant some template versions produced. Scores accept
/// numbers or numeric strings, default to 0.5, and are clamped to `[0, 1]`.
fn normalize_emotions(value: &Value) -> Vec<Emotion> {
    let Value::Array(entries) = value else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(label) => Some(Emotion {
                label: label.clone(),
                score: DEFAULT_EMOTION_SCORE,
            }),
            Value::Object(map) => {
                let label = map
                    .get("label")
                    .or_else(|| map.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                let score = map
                    .get("score")
                    .map(parse_score)
                    .unwrap_or(DEFAULT_EMOTION_SCORE);
                Some(Emotion {
                    label,
                    score: score.clamp(0.0, 1.0),
                })
            }
            _ => None,
        })
        .collect()
}

fn parse_score(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(DEFAULT_EMOTION_SCORE),
        Value::String(s) => s.parse().unwrap_or(DEFAULT_EMOTION_SCORE),
        _ => DEFAULT_EMOTION_SCORE,
    }
}

/// Keep only the string entries of a JSON array, in order.
fn normalize_string_seq(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|v| v.as_str().map(str::to_owned))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_json_reply() {
        let raw = "```json\n{\"response\":\"hi\",\"action_items\":[]}\n```";
        let reply = validate_reply(raw, TemplateKind::Ongoing);
        assert_eq!(reply.response, "hi");
        assert!(reply.action_items.is_empty());
    }

    #[test]
    fn test_bare_fence_reply() {
        let raw = "```\n{\"response\":\"안녕하세요\"}\n```";
        let reply = validate_reply(raw, TemplateKind::Initial);
        assert_eq!(reply.response, "안녕하세요");
    }

    #[test]
    fn test_plain_text_is_wrapped_not_failed() {
        let reply = validate_reply("그냥 텍스트입니다", TemplateKind::Ongoing);
        assert_eq!(reply.response, "그냥 텍스트입니다");
        assert!(reply.action_items.is_empty());
    }

    #[test]
    fn test_camel_case_action_items_accepted() {
        let raw = "{\"response\":\"쉬어요\",\"actionItems\":[\"산책하기\",\"일찍 자기\"]}";
        let reply = validate_reply(raw, TemplateKind::Ongoing);
        assert_eq!(reply.action_items.len(), 2);
    }

    #[test]
    fn test_empty_completion_degrades_to_fallback() {
        let reply = validate_reply("``````", TemplateKind::Ongoing);
        assert_eq!(reply.response, REPLY_FALLBACK_TEXT);

        let reply = validate_reply("{\"response\": \"   \"}", TemplateKind::Ongoing);
        assert_eq!(reply.response, REPLY_FALLBACK_TEXT);
    }

    #[test]
    fn test_broken_json_degrades_to_fallback() {
        let reply = validate_reply("{\"response\": \"없는 따옴표}", TemplateKind::Ongoing);
        assert_eq!(reply.response, REPLY_FALLBACK_TEXT);
    }

    #[test]
    fn test_missing_response_field_degrades_to_fallback() {
        let reply = validate_reply("{\"action_items\":[\"x\"]}", TemplateKind::Ongoing);
        assert_eq!(reply.response, REPLY_FALLBACK_TEXT);
        assert!(reply.action_items.is_empty());
    }

    #[test]
    fn test_non_string_action_items_are_dropped() {
        let raw = "{\"response\":\"ok\",\"action_items\":[\"유지\",3,null,\"또 유지\"]}";
        let reply = validate_reply(raw, TemplateKind::Ongoing);
        assert_eq!(reply.action_items, vec!["유지".to_owned(), "또 유지".to_owned()]);
    }

    #[test]
    fn test_summary_happy_path() {
        let raw = r#"{
            "summary": "업무 스트레스에 대해 이야기했습니다.",
            "emotions": [{"label": "스트레스", "score": 0.8}, "피로"],
            "insights": ["휴식이 부족합니다."],
            "actionItems": ["뽀모도로 기법 활용해보기"]
        }"#;
        let summary = validate_summary(raw);
        assert_eq!(summary.summary, "업무 스트레스에 대해 이야기했습니다.");
        assert_eq!(summary.emotions.len(), 2);
        assert_eq!(summary.emotions[0].label, "스트레스");
        assert!((summary.emotions[0].score - 0.8).abs() < f64::EPSILON);
        assert_eq!(summary.emotions[1].label, "피로");
        assert!((summary.emotions[1].score - 0.5).abs() < f64::EPSILON);
        assert_eq!(summary.action_items.len(), 1);
    }

    #[test]
    fn test_summary_accepts_name_key_and_snake_case_items() {
        let raw = r#"{
            "summary": "요약",
            "emotions": [{"name": "불안", "score": "0.6"}],
            "insights": [],
            "action_items": ["스트레칭"]
        }"#;
        let summary = validate_summary(raw);
        assert_eq!(summary.emotions[0].label, "불안");
        assert!((summary.emotions[0].score - 0.6).abs() < f64::EPSILON);
        assert_eq!(summary.action_items, vec!["스트레칭".to_owned()]);
    }

    #[test]
    fn test_summary_scores_are_clamped() {
        let raw = r#"{
            "summary": "요약",
            "emotions": [{"label": "분노", "score": 1.7}, {"label": "슬픔", "score": -0.2}],
            "insights": [],
            "actionItems": []
        }"#;
        let summary = validate_summary(raw);
        assert!((summary.emotions[0].score - 1.0).abs() < f64::EPSILON);
        assert!(summary.emotions[1].score.abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_missing_fields_yields_default() {
        let summary = validate_summary("{\"summary\": \"혼자만 있는 요약\"}");
        assert_eq!(summary, default_summary());
    }

    #[test]
    fn test_summary_non_json_yields_default() {
        let summary = validate_summary("요약할 수 없었습니다");
        assert_eq!(summary, default_summary());
    }

    #[test]
    fn test_default_summary_shape() {
        let summary = default_summary();
        assert_eq!(summary.summary, "대화 내용을 요약하는 데 실패했습니다.");
        assert_eq!(summary.emotions.len(), 1);
        assert_eq!(summary.emotions[0].label, "분석 실패");
        assert!((summary.emotions[0].score - 1.0).abs() < f64::EPSILON);
        assert_eq!(summary.insights, vec!["요약을 생성할 수 없습니다.".to_owned()]);
        assert_eq!(summary.action_items, vec!["다시 시도해주세요.".to_owned()]);
    }
}
