#![allow(missing_docs)]

//! Maum — AI journaling counselor, CLI entry point.
//!
//! `maum chat` runs an interactive counseling session; `maum history`
//! browses archived conversations. The binary is the composition root: it
//! loads configuration, wires the store/provider/template collaborators
//! into the service, and hands the service to an adapter.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use maum::adapters::cli::CliAdapter;
use maum::archive::{ConversationArchive, ListFilter, SortOrder};
use maum::config::MaumConfig;
use maum::providers::openai::OpenAiProvider;
use maum::providers::CompletionProvider;
use maum::service::CounselService;
use maum::session::store::{InMemoryMessageStore, MessageStore, SqliteMessageStore};
use maum::session::templates::PromptTemplateRegistry;

#[derive(Parser)]
#[command(name = "maum", about = "AI journaling counselor", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive counseling session (default).
    Chat,
    /// Browse archived conversations.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List archived conversations, newest first.
    List {
        /// Zero-based page index.
        #[arg(long, default_value_t = 0)]
        page: u32,
        /// Records per page.
        #[arg(long, default_value_t = 20)]
        page_size: u32,
        /// Sort oldest first instead of newest first.
        #[arg(long)]
        asc: bool,
    },
    /// Show one archived conversation in full.
    Show {
        /// Record id from `history list`.
        id: String,
    },
    /// Delete one archived conversation.
    Delete {
        /// Record id from `history list`.
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat().await,
        Command::History { action } => run_history(action).await,
    }
}

async fn run_chat() -> Result<()> {
    let config = MaumConfig::load().context("failed to load configuration")?;
    let _logging_guard =
        maum::logging::init_production(std::path::Path::new(&config.paths.logs_dir))
            .context("failed to initialise logging")?;

    if config.llm.api_key.is_empty() {
        anyhow::bail!(
            "no completion API key configured; set MAUM_OPENAI_API_KEY or [llm].api_key in maum.toml"
        );
    }

    let provider: Arc<dyn CompletionProvider> = Arc::new(
        OpenAiProvider::new(
            &config.llm.base_url,
            &config.llm.model,
            &config.llm.api_key,
            Duration::from_secs(config.llm.timeout_seconds),
        )
        .context("failed to build completion provider")?,
    );

    let templates = Arc::new(match &config.session.template_dir {
        Some(dir) => PromptTemplateRegistry::load_from_dir(dir)
            .context("failed to load template overrides")?,
        None => PromptTemplateRegistry::with_defaults(),
    });

    let store: Arc<dyn MessageStore> = match &config.session.store_path {
        Some(path) => Arc::new(
            SqliteMessageStore::open(path)
                .await
                .context("failed to open session store")?,
        ),
        None => Arc::new(InMemoryMessageStore::new()),
    };

    let service = Arc::new(CounselService::new(
        store,
        provider,
        templates,
        Duration::from_secs(config.session.ttl_seconds),
    ));

    let archive = Arc::new(
        ConversationArchive::open(&config.archive.path)
            .await
            .context("failed to open conversation archive")?,
    );

    let adapter = CliAdapter::new(service, archive, config.archive.owner_id.clone());
    adapter.run().await
}

async fn run_history(action: HistoryAction) -> Result<()> {
    maum::logging::init_cli();
    let config = MaumConfig::load().context("failed to load configuration")?;
    let archive = ConversationArchive::open(&config.archive.path)
        .await
        .context("failed to open conversation archive")?;
    let owner_id = &config.archive.owner_id;

    match action {
        HistoryAction::List {
            page,
            page_size,
            asc,
        } => {
            let filter = ListFilter {
                sort: if asc { SortOrder::Asc } else { SortOrder::Desc },
                page,
                page_size,
                ..ListFilter::default()
            };
            let records = archive.list_conversations(owner_id, &filter).await?;
            if records.is_empty() {
                println!("저장된 대화가 없습니다.");
                return Ok(());
            }
            for record in records {
                println!(
                    "{}  {}  {}",
                    record.id,
                    record.created_at.format("%Y-%m-%d %H:%M"),
                    record.title
                );
            }
        }
        HistoryAction::Show { id } => {
            let Some(record) = archive.get_conversation(&id, owner_id).await? else {
                println!("대화를 찾을 수 없습니다: {id}");
                return Ok(());
            };
            println!("{} — {}", record.created_at.format("%Y-%m-%d %H:%M"), record.title);
            println!();
            for turn in &record.turns {
                println!("{}: {}", turn.role.as_str(), turn.content);
                for item in &turn.metadata.action_items {
                    println!("  → {item}");
                }
            }
            println!();
            println!("요약: {}", record.summary.summary);
            for emotion in &record.summary.emotions {
                println!("감정: {} ({:.1})", emotion.label, emotion.score);
            }
            for insight in &record.summary.insights {
                println!("인사이트: {insight}");
            }
            for item in &record.summary.action_items {
                println!("실천 제안: {item}");
            }
        }
        HistoryAction::Delete { id } => {
            if archive.delete_conversation(&id, owner_id).await? {
                println!("삭제했습니다: {id}");
            } else {
                println!("대화를 찾을 수 없습니다: {id}");
            }
        }
    }

    Ok(())
}
