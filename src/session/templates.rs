//! Prompt templates for the counselor pipeline.
//!
//! Three templates drive every completion call: the initial-turn prompt,
//! the ongoing-turn prompt, and the summary-analysis prompt. Templates are
//! configuration — loaded once at setup and immutable afterwards; changing
//! them is an explicit [`PromptTemplateRegistry::load_from_dir`] reload,
//! never a mid-session mutation. Which template applies is the session
//! manager's decision, keyed by phase.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Which prompt a completion call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// First exchange of a session — welcome and an opening question.
    Initial,
    /// Every later exchange — context-aware reply plus action items.
    Ongoing,
    /// Terminal summary analysis over the full transcript.
    Summary,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initial => "initial",
            Self::Ongoing => "ongoing",
            Self::Summary => "summary",
        };
        f.write_str(name)
    }
}

impl TemplateKind {
    /// Parse from a configuration string.
    fn parse(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(Self::Initial),
            "ongoing" => Some(Self::Ongoing),
            "summary" => Some(Self::Summary),
            _ => None,
        }
    }
}

/// Error type for template operations.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// No template registered for the requested kind. Fatal configuration
    /// error — not retried, not degraded.
    #[error("no prompt template registered for kind '{0}'")]
    NotFound(TemplateKind),
    /// Failed to parse a template TOML file.
    #[error("failed to parse template TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// I/O error reading template files.
    #[error("failed to read template file: {0}")]
    Io(#[from] std::io::Error),
    /// A template file declared an unknown kind string.
    #[error("unknown template kind '{0}' in template file")]
    UnknownKind(String),
}

/// A prompt template with named placeholders.
///
/// Chat templates expect `{history}` and `{input}`; the summary template
/// expects `{text}`. Unknown placeholders are left verbatim so literal
/// braces in the JSON format examples survive rendering.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    kind: TemplateKind,
    system: String,
}

impl PromptTemplate {
    /// Create a template from its system-prompt text.
    pub fn new(kind: TemplateKind, system: impl Into<String>) -> Self {
        Self {
            kind,
            system: system.into(),
        }
    }

    /// The kind this template serves.
    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    /// Bind `{history}` and `{input}` for an initial/ongoing turn.
    pub fn render_chat(&self, history: &str, input: &str) -> String {
        self.system
            .replace("{history}", history)
            .replace("{input}", input)
    }

    /// Bind `{text}` for a summary-analysis call.
    pub fn render_summary(&self, text: &str) -> String {
        self.system.replace("{text}", text)
    }
}

/// On-disk template file shape: `kind = "initial" | "ongoing" | "summary"`,
/// `system = "…"`.
#[derive(Debug, Deserialize)]
struct TemplateFile {
    kind: String,
    system: String,
}

/// Registry of prompt templates keyed by kind.
#[derive(Debug)]
pub struct PromptTemplateRegistry {
    templates: HashMap<TemplateKind, PromptTemplate>,
}

impl PromptTemplateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in counselor templates.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PromptTemplate::new(TemplateKind::Initial, INITIAL_TEMPLATE));
        registry.register(PromptTemplate::new(TemplateKind::Ongoing, ONGOING_TEMPLATE));
        registry.register(PromptTemplate::new(TemplateKind::Summary, SUMMARY_TEMPLATE));
        registry
    }

    /// Register a single template, replacing any previous one of its kind.
    pub fn register(&mut self, template: PromptTemplate) {
        self.templates.insert(template.kind(), template);
    }

    /// Load all `.toml` files from a directory as templates, on top of the
    /// built-in defaults. The explicit configuration-reload path.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] on I/O failure, TOML parse failure, or an
    /// unknown `kind` value.
    pub fn load_from_dir(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let mut registry = Self::with_defaults();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_path = entry.path();
            if file_path.extension().and_then(|e| e.to_str()) == Some("toml") {
                let contents = std::fs::read_to_string(&file_path)?;
                let file: TemplateFile = toml::from_str(&contents)?;
                let kind = TemplateKind::parse(&file.kind)
                    .ok_or_else(|| TemplateError::UnknownKind(file.kind.clone()))?;
                registry.register(PromptTemplate::new(kind, file.system));
            }
        }
        Ok(registry)
    }

    /// Get the template for a kind.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::NotFound`] — a fatal configuration error —
    /// if the kind has no registered template.
    pub fn get(&self, kind: TemplateKind) -> Result<&PromptTemplate, TemplateError> {
        self.templates
            .get(&kind)
            .ok_or(TemplateError::NotFound(kind))
    }
}

impl Default for PromptTemplateRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ---------------------------------------------------------------------------
// Built-in counselor templates
// ---------------------------------------------------------------------------

const INITIAL_TEMPLATE: &str = "\
Role:
- 당신은 따뜻하고 공감 능력이 뛰어난 AI 심리 상담사입니다.
- 인지 행동 치료(REBT) 기반으로 사용자가 자신의 감정을 이해하고, 스트레스 관리 및 자기 성장에 도움을 주는 역할을 합니다.

Principle:
- 사용자의 감정을 존중하고, 공감하는 태도를 유지합니다.
- 사용자가 자신의 감정을 솔직하게 표현할 수 있도록 안전한 환경을 제공합니다.
- 첫 대화에서는 환영과 함께 편안한 질문으로 시작합니다.

Input:
- Current conversation: {history}
- Human: {input}

Output:
아래 형식의 JSON 문자열로만 응답하세요 (마크다운이나 다른 포맷 없이):
  \"response\": \"사용자 입력에 대한 공감과 첫 질문이 포함된 응답\"

주의사항:
- 반드시 유효한 JSON 형식으로만 응답하세요
- 마크다운이나 다른 포맷을 포함하지 마세요
- 설명이나 부가적인 텍스트 없이 JSON만 반환하세요
";

const ONGOING_TEMPLATE: &str = "\
Role:
- 당신은 사용자의 감정을 분석하고 대화를 이어가는 AI 상담사입니다.
- 이전 대화 맥락을 고려하여 상담을 진행합니다.
- 사용자가 스스로의 감정을 이해하고 해결할 수 있도록 도울 수 있는 실천 제안을 제시합니다.

Principle:
- 이전 대화 내용과 맥락을 참고합니다.
- 사용자의 감정을 먼저 인정하고 공감합니다.
- 부정적인 감정에서 합리적 사고로의 전환을 돕습니다.

Input:
- 이전 대화 내용: {history}
- 현재 입력: {input}

Output:
다음 JSON 형식으로 정확히 응답하세요:
  \"response\": \"<공감, 통찰, 격려가 포함된 응답 메시지>\",
  \"action_items\": [
    \"<실천 제안 0-2개를 반드시 포함해주세요>\"
  ]

주의사항:
- action_items는 최대 2개 포함해야 합니다.
- 사용자에게 제안할 실천 제안이 없다면 action_items는 빈 배열로 응답해주세요.
- 실천 제안은 짧고 간결하게 제시해주세요.
- 응답은 반드시 위 JSON 형식을 따라야 합니다
- 다른 텍스트나 설명 없이 JSON만 반환하세요
";

const SUMMARY_TEMPLATE: &str = "\
Role:
- 당신은 사용자의 감정을 분석하고 대화 내용을 요약하는 AI입니다.
- 사용자가 자신의 감정을 객관적으로 바라볼 수 있도록 도와줍니다.

Principle:
- 감정을 한 단어로 요약하고 강도를 0과 1 사이의 숫자로 표현합니다.
- 대화의 핵심 내용을 일기처럼 정리합니다.
- 사용자가 얻은 인사이트와 실천 제안을 명확하게 제시합니다.

Input:
- 대화 내용: {text}

Output:
아래 형식의 JSON 문자열로만 응답하세요 (마크다운이나 다른 포맷 없이):
  \"summary\": \"<대화의 핵심 내용을 2~3문장으로 요약>\",
  \"emotions\": [
    {\"label\": \"<주요 감정 키워드 (스트레스, 불안, 걱정, 피로, 희망, 기쁨, 성취감, 만족, 분노, 슬픔, 우울)>\", \"score\": 0.8}
  ],
  \"insights\": [
    \"<대화를 통해 발견한 중요한 인사이트 1-3개>\"
  ],
  \"actionItems\": [
    \"<사용자에게 제안할 실천 항목 0-2개>\"
  ]
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_register_all_kinds() {
        let registry = PromptTemplateRegistry::with_defaults();
        assert!(registry.get(TemplateKind::Initial).is_ok());
        assert!(registry.get(TemplateKind::Ongoing).is_ok());
        assert!(registry.get(TemplateKind::Summary).is_ok());
    }

    #[test]
    fn test_missing_kind_is_not_found() {
        let registry = PromptTemplateRegistry::new();
        let err = registry
            .get(TemplateKind::Summary)
            .expect_err("empty registry has no templates");
        assert!(matches!(err, TemplateError::NotFound(TemplateKind::Summary)));
    }

    #[test]
    fn test_render_chat_binds_history_and_input() {
        let template = PromptTemplate::new(TemplateKind::Ongoing, "H:{history}|I:{input}");
        let rendered = template.render_chat("User: 안녕", "일이 너무 많아요");
        assert_eq!(rendered, "H:User: 안녕|I:일이 너무 많아요");
    }

    #[test]
    fn test_render_leaves_literal_braces() {
        let template = PromptTemplate::new(TemplateKind::Summary, "{text} {\"label\": \"x\"}");
        assert_eq!(
            template.render_summary("대화"),
            "대화 {\"label\": \"x\"}"
        );
    }

    #[test]
    fn test_default_templates_carry_placeholders() {
        let registry = PromptTemplateRegistry::with_defaults();
        let initial = registry.get(TemplateKind::Initial).expect("initial");
        let rendered = initial.render_chat("User: 안녕하세요", "요즘 스트레스를 받아요");
        assert!(rendered.contains("User: 안녕하세요"));
        assert!(rendered.contains("요즘 스트레스를 받아요"));
        assert!(!rendered.contains("{history}"));
        assert!(!rendered.contains("{input}"));
    }

    #[test]
    fn test_load_from_dir_overrides_default() {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        std::fs::write(
            dir.path().join("summary.toml"),
            "kind = \"summary\"\nsystem = \"요약: {text}\"\n",
        )
        .expect("write template");

        let registry = PromptTemplateRegistry::load_from_dir(dir.path()).expect("load");
        let summary = registry.get(TemplateKind::Summary).expect("summary");
        assert_eq!(summary.render_summary("내용"), "요약: 내용");
        // Non-overridden kinds keep the built-in defaults.
        assert!(registry.get(TemplateKind::Initial).is_ok());
    }

    #[test]
    fn test_load_from_dir_rejects_unknown_kind() {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        std::fs::write(
            dir.path().join("bad.toml"),
            "kind = \"closing\"\nsystem = \"x\"\n",
        )
        .expect("write template");

        let err = PromptTemplateRegistry::load_from_dir(dir.path())
            .expect_err("unknown kind must fail");
        assert!(matches!(err, TemplateError::UnknownKind(k) if k == "closing"));
    }
}
