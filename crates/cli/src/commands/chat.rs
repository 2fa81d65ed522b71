//! Chat command handler.
//!
//! Runs an interactive conversation on the terminal until EOF or `exit`.

use super::build_session;
use super::terminal::TerminalChannel;
use care_chat::TurnOutcome;
use care_core::{config::AppConfig, AppError, AppResult};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Start an interactive conversation
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Skip the opening greeting
    #[arg(long)]
    pub no_greeting: bool,
}

impl ChatCommand {
    /// Execute the chat command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let session = build_session(config)?;
        let channel = TerminalChannel::stdout(!config.no_color);
        tracing::info!(
            "Session {} ready (created {})",
            session.id(),
            session.created_at().to_rfc3339()
        );

        if !self.no_greeting {
            session.start(&channel).await?;
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print_prompt()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let message = line.trim();
            if message.is_empty() {
                continue;
            }
            if matches!(message, "exit" | "quit") {
                break;
            }

            // Ctrl-C drops the turn future, cancelling every in-flight call
            tokio::select! {
                turn = session.handle_message(message, &channel) => {
                    if turn.outcome == TurnOutcome::Cancelled {
                        tracing::warn!("Output closed, ending conversation");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    tracing::warn!("Turn interrupted");
                }
            }
        }

        tracing::info!(
            "Session {} ended after {} turns",
            session.id(),
            session.turn_count()
        );
        Ok(())
    }
}

fn print_prompt() -> AppResult<()> {
    use std::io::Write;
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")
        .and_then(|_| stdout.flush())
        .map_err(AppError::from)
}
