//! CLI adapter — interactive stdin/stdout chat for local use and testing.
//!
//! Drives one conversation session per run. The adapter keeps its own copy
//! of the transcript (the core clears working memory at session end) and
//! hands it to the archive together with the summary, exactly as a web
//! frontend would after calling `end_session`.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::archive::ConversationArchive;
use crate::service::{CounselService, TurnOutcome};
use crate::session::{SessionError, Summary, Turn};

/// End-of-session command typed by the user.
const END_COMMAND: &str = "/end";

/// Interactive chat loop over one session.
pub struct CliAdapter {
    service: Arc<CounselService>,
    archive: Arc<ConversationArchive>,
    owner_id: String,
}

impl CliAdapter {
    /// Build the adapter over the service and archive collaborators.
    pub fn new(
        service: Arc<CounselService>,
        archive: Arc<ConversationArchive>,
        owner_id: String,
    ) -> Self {
        Self {
            service,
            archive,
            owner_id,
        }
    }

    /// Run the chat loop until `/end` or EOF.
    ///
    /// # Errors
    ///
    /// Returns an error on stdin/stdout failure or when archiving the
    /// finished conversation fails.
    pub async fn run(&self) -> Result<()> {
        println!("마음 — AI 감정 일기. 이야기를 들려주세요. (종료: {END_COMMAND})");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut session_id: Option<String> = None;
        let mut transcript: Vec<Turn> = Vec::new();

        loop {
            print!("you> ");
            std::io::stdout().flush().context("failed to flush stdout")?;

            let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
                // EOF: close the session like an explicit /end.
                break;
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            if input == END_COMMAND {
                break;
            }

            match self.service.submit_turn(session_id.as_deref(), input).await {
                Ok(outcome) => {
                    transcript.push(Turn::user(input));
                    transcript.push(Turn::assistant(
                        outcome.response.clone(),
                        outcome.action_items.clone(),
                    ));
                    session_id = Some(outcome.session_id.clone());
                    print_reply(&outcome);
                }
                Err(SessionError::EmptyInput) => {
                    println!("내용을 입력해주세요.");
                }
                Err(e) => {
                    warn!(error = %e, "turn failed");
                    println!("죄송합니다. 오류가 발생했습니다. 다시 시도해 주세요.");
                }
            }
        }

        if let Some(id) = session_id {
            let summary = self
                .service
                .end_session(&id)
                .await
                .context("failed to end session")?;
            print_summary(&summary);
            self.archive
                .save_conversation(&self.owner_id, &id, &transcript, &summary)
                .await
                .context("failed to archive conversation")?;
            println!("(대화가 저장되었습니다)");
        }

        Ok(())
    }
}

fn print_reply(outcome: &TurnOutcome) {
    println!("\n상담사> {}", outcome.response);
    for item in &outcome.action_items {
        println!("  → {item}");
    }
    println!();
}

fn print_summary(summary: &Summary) {
    println!("\n── 오늘의 요약 ──");
    println!("{}", summary.summary);
    if !summary.emotions.is_empty() {
        let emotions: Vec<String> = summary
            .emotions
            .iter()
            .map(|e| format!("{} ({:.1})", e.label, e.score))
            .collect();
        println!("감정: {}", emotions.join(", "));
    }
    for insight in &summary.insights {
        println!("인사이트: {insight}");
    }
    for item in &summary.action_items {
        println!("실천 제안: {item}");
    }
}
