//! Ask command handler.
//!
//! Runs a single turn for one question, streaming to stdout or printing a
//! JSON summary.

use super::build_session;
use super::terminal::TerminalChannel;
use care_chat::{RecordingChannel, Turn};
use care_core::{config::AppConfig, AppError, AppResult};
use clap::Args;
use std::path::PathBuf;

/// Ask a single question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self.get_question()?;
        let session = build_session(config)?;

        if self.json {
            let channel = RecordingChannel::new();
            let turn = session.handle_message(&question, &channel).await;
            let output = json_summary(&turn, &channel.visible_messages(), config);

            let json = serde_json::to_string_pretty(&output)?;
            println!("{}", json);
        } else {
            let channel = TerminalChannel::stdout(!config.no_color);
            let turn = session.handle_message(&question, &channel).await;
            tracing::debug!("Turn outcome {:?} after {} attempts", turn.outcome, turn.attempts);
        }

        Ok(())
    }

    /// Get the question text from the argument or file.
    fn get_question(&self) -> AppResult<String> {
        let question = match (&self.question, &self.file) {
            (Some(question), _) => question.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => {
                return Err(AppError::Config("No question provided".to_string()));
            }
        };

        let question = question.trim().to_string();
        if question.is_empty() {
            return Err(AppError::Config("Question is empty".to_string()));
        }
        Ok(question)
    }
}

fn json_summary(turn: &Turn, shown: &[String], config: &AppConfig) -> serde_json::Value {
    let sources: Vec<&str> = turn
        .evidence
        .iter()
        .filter_map(|item| item.source_url.as_deref())
        .collect();

    serde_json::json!({
        "question": turn.user_message,
        "answer": turn.answer,
        "shown": shown,
        "outcome": turn.outcome,
        "verified": turn.verified,
        "attempts": turn.attempts,
        "sources": sources,
        "toolOutput": turn.tool_result,
        "model": config.model,
        "provider": config.provider,
    })
}
