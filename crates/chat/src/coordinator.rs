//! Turn coordination: retrieval and tool lookup in parallel, streamed
//! generation, verification and the memory update.

use crate::generator::AnswerGenerator;
use crate::memory::ConversationMemory;
use crate::tools::ToolInvoker;
use crate::transport::{send_message, OutputChannel};
use crate::verify::{Grounding, Judge, VerificationLoop, VerificationOutcome, GIVE_UP_MESSAGE};
use care_core::{AppError, AppResult};
use care_knowledge::{format_evidence, sources_annotation, EvidenceRetriever, EvidenceSet};
use care_llm::ChatMessage;
use care_prompt::PromptSet;
use serde::Serialize;
use std::sync::Arc;

/// Sent when a turn fails before an answer could be produced.
pub const APOLOGY_MESSAGE: &str = "An error occurred processing your request";

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnOutcome {
    /// An answer passed verification and is shown with its sources.
    Answered,
    /// No attempt passed verification; the give-up message was sent.
    GaveUp,
    /// Retrieval or generation failed; the apology was sent.
    Failed,
    /// The output channel went away mid-turn.
    Cancelled,
}

/// One user-message-to-answer cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub user_message: String,
    pub evidence: EvidenceSet,
    pub tool_result: String,
    /// The answer stored in memory, if any.
    pub answer: Option<String>,
    pub verified: bool,
    pub attempts: u32,
    pub outcome: TurnOutcome,
}

impl Turn {
    fn new(user_message: &str) -> Self {
        Self {
            user_message: user_message.to_string(),
            evidence: EvidenceSet::default(),
            tool_result: String::new(),
            answer: None,
            verified: false,
            attempts: 0,
            outcome: TurnOutcome::Failed,
        }
    }
}

/// Runs turns against a set of shared collaborators.
pub struct TurnCoordinator {
    retriever: EvidenceRetriever,
    tools: ToolInvoker,
    generator: AnswerGenerator,
    judge: Arc<dyn Judge>,
    prompts: Arc<PromptSet>,
    max_attempts: u32,
}

impl TurnCoordinator {
    pub fn new(
        retriever: EvidenceRetriever,
        tools: ToolInvoker,
        generator: AnswerGenerator,
        judge: Arc<dyn Judge>,
        prompts: Arc<PromptSet>,
        max_attempts: u32,
    ) -> Self {
        Self {
            retriever,
            tools,
            generator,
            judge,
            prompts,
            max_attempts,
        }
    }

    /// Run one turn for `message`, streaming output to `channel`.
    ///
    /// Retrieval, prompts and the tool decision all see the memory as it was
    /// before `message`; the tool decision gets `message` appended as its last turn.
    ///
    /// The user message is always remembered. The assistant entry is added only
    /// when an answer or the give-up message was delivered in full.
    pub async fn run_turn(
        &self,
        memory: &mut ConversationMemory,
        message: &str,
        channel: &dyn OutputChannel,
    ) -> Turn {
        let history = memory.format_history();
        let mut messages = memory.messages();
        messages.push(ChatMessage::user(message));
        memory.push_user(message);

        let mut turn = Turn::new(message);
        match self.drive(&mut turn, &history, &messages, channel).await {
            Ok(()) => {}
            Err(AppError::Transport(e)) => {
                tracing::warn!("Output channel closed, cancelling turn: {}", e);
                turn.outcome = TurnOutcome::Cancelled;
            }
            Err(e) => {
                tracing::error!("Turn failed: {}", e);
                turn.outcome = match send_message(channel, APOLOGY_MESSAGE).await {
                    Ok(_) => TurnOutcome::Failed,
                    Err(_) => TurnOutcome::Cancelled,
                };
            }
        }

        if let Some(answer) = &turn.answer {
            memory.push_assistant(answer.clone());
        }
        tracing::info!("Turn finished: {:?}", turn.outcome);
        turn
    }

    async fn drive(
        &self,
        turn: &mut Turn,
        history: &str,
        messages: &[ChatMessage],
        channel: &dyn OutputChannel,
    ) -> AppResult<()> {
        let (evidence, tool_result) = tokio::join!(
            self.retriever.retrieve(&turn.user_message, history),
            self.tools.invoke(messages),
        );
        turn.evidence = evidence?;
        turn.tool_result = tool_result;

        let context = format_evidence(&turn.evidence);
        tracing::debug!(
            "Grounding: {} bytes of evidence, {} bytes of tool output",
            context.len(),
            turn.tool_result.len()
        );

        let prompt = self.prompts.assemble_answer(
            history,
            &context,
            &turn.tool_result,
            &turn.user_message,
        )?;
        let first = self.generator.stream_answer(&prompt, channel).await?;

        let grounding = Grounding {
            history,
            context: &context,
            tool_output: &turn.tool_result,
            query: &turn.user_message,
        };
        let outcome = VerificationLoop {
            judge: self.judge.as_ref(),
            generator: &self.generator,
            prompts: &self.prompts,
            channel,
            max_attempts: self.max_attempts,
        }
        .run(grounding, first)
        .await?;

        turn.attempts = outcome.attempts();
        match outcome {
            VerificationOutcome::Passed { answer, handle, .. } => {
                if let Some(sources) = sources_annotation(&turn.evidence) {
                    channel.push_fragment(handle, &sources).await?;
                }
                channel.finish_message(handle).await?;
                turn.verified = true;
                turn.answer = Some(answer);
                turn.outcome = TurnOutcome::Answered;
            }
            VerificationOutcome::GaveUp { .. } => {
                send_message(channel, GIVE_UP_MESSAGE).await?;
                turn.answer = Some(GIVE_UP_MESSAGE.to_string());
                turn.outcome = TurnOutcome::GaveUp;
            }
        }
        Ok(())
    }
}
