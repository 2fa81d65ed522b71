//! Sessions: one conversation, its memory window and turn counter.

use crate::coordinator::{Turn, TurnCoordinator};
use crate::memory::ConversationMemory;
use crate::transport::{send_message, OutputChannel};
use care_core::AppResult;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

/// Opening message of every session.
pub const GREETING: &str = "Hi there! I'm designed to help support caregivers of dementia patients. \n\
Can you please tell me your name and what you'd like to chat about today?";

/// One conversation.
///
/// Turns are serialized by the memory lock; sessions share nothing mutable.
pub struct Session {
    id: Uuid,
    coordinator: Arc<TurnCoordinator>,
    memory: Mutex<ConversationMemory>,
    turns: AtomicU64,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(coordinator: Arc<TurnCoordinator>, max_memory: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            coordinator,
            memory: Mutex::new(ConversationMemory::new(max_memory)),
            turns: AtomicU64::new(0),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of turns started so far.
    pub fn turn_count(&self) -> u64 {
        self.turns.load(Ordering::SeqCst)
    }

    /// Seed memory with the greeting and show it.
    pub async fn start(&self, channel: &dyn OutputChannel) -> AppResult<()> {
        let mut memory = self.memory.lock().await;
        send_message(channel, GREETING).await?;
        memory.push_assistant(GREETING);
        tracing::info!("Session {} started", self.id);
        Ok(())
    }

    /// Run one turn for `message`. Waits for any turn already in progress.
    pub async fn handle_message(&self, message: &str, channel: &dyn OutputChannel) -> Turn {
        let mut memory = self.memory.lock().await;
        let turn = self.turns.fetch_add(1, Ordering::SeqCst) + 1;

        let span = tracing::info_span!("turn", session = %self.id, turn);
        self.coordinator
            .run_turn(&mut memory, message, channel)
            .instrument(span)
            .await
    }

    /// Copy of the current memory window.
    pub async fn memory(&self) -> ConversationMemory {
        self.memory.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::TurnOutcome;
    use crate::generator::AnswerGenerator;
    use crate::tools::ToolInvoker;
    use crate::transport::RecordingChannel;
    use crate::verify::LlmJudge;
    use care_core::config::{IndexConfig, RagConfig};
    use care_knowledge::{default_strategies, EvidenceRetriever, IndexHit, StaticIndex, StrategyKind};
    use care_llm::{ChatRole, ScriptedClient};
    use care_prompt::PromptSet;
    use std::time::Duration;

    fn session(answer: ScriptedClient, judge: ScriptedClient) -> Session {
        let prompts = Arc::new(PromptSet::builtin().unwrap());
        let rag = RagConfig::default();
        let index = StaticIndex::new().with_hits(
            StrategyKind::Similarity,
            vec![IndexHit::new("Routines reduce agitation.", None)],
        );

        let coordinator = TurnCoordinator::new(
            EvidenceRetriever::new(
                Arc::new(index),
                default_strategies(&IndexConfig::default()),
                rag.max_context,
            ),
            ToolInvoker::disabled(Arc::new(ScriptedClient::new()), "fast"),
            AnswerGenerator::new(Arc::new(answer), "answer", &rag),
            Arc::new(LlmJudge::new(
                Arc::new(judge),
                prompts.clone(),
                "fast",
                Duration::from_secs(5),
            )),
            prompts,
            rag.max_attempts,
        );
        Session::new(Arc::new(coordinator), rag.max_memory)
    }

    #[tokio::test]
    async fn test_start_sends_greeting() {
        let session = session(ScriptedClient::new(), ScriptedClient::new());
        let channel = RecordingChannel::new();

        session.start(&channel).await.unwrap();

        assert_eq!(channel.visible_messages(), vec![GREETING.to_string()]);
        let memory = session.memory().await;
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.last().unwrap().role, ChatRole::Assistant);
    }

    #[tokio::test]
    async fn test_turns_are_counted_and_remembered() {
        let session = session(
            ScriptedClient::new()
                .push_stream(["Keep a daily routine."])
                .push_stream(["You're welcome."]),
            ScriptedClient::new().push_completion("N").push_completion("N"),
        );
        let channel = RecordingChannel::new();
        session.start(&channel).await.unwrap();

        let first = session.handle_message("How do I calm my mom down?", &channel).await;
        let second = session.handle_message("Thanks", &channel).await;

        assert_eq!(first.outcome, TurnOutcome::Answered);
        assert_eq!(second.outcome, TurnOutcome::Answered);
        assert_eq!(session.turn_count(), 2);
        assert_eq!(session.memory().await.len(), 5);
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_session_alive() {
        let session = session(
            ScriptedClient::new()
                .push_stream_error("overloaded")
                .push_stream(["Back again."]),
            ScriptedClient::new().push_completion("N"),
        );
        let channel = RecordingChannel::new();

        let failed = session.handle_message("hello", &channel).await;
        let answered = session.handle_message("hello?", &channel).await;

        assert_eq!(failed.outcome, TurnOutcome::Failed);
        assert_eq!(answered.outcome, TurnOutcome::Answered);
        assert_eq!(session.memory().await.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_messages_run_one_after_another() {
        let session = session(
            ScriptedClient::new()
                .with_delay(Duration::from_millis(30))
                .push_stream(["one"])
                .push_stream(["two"]),
            ScriptedClient::new().push_completion("N").push_completion("N"),
        );
        let channel = RecordingChannel::new();

        let (first, second) = tokio::join!(
            session.handle_message("q1", &channel),
            session.handle_message("q2", &channel),
        );

        assert_eq!(first.outcome, TurnOutcome::Answered);
        assert_eq!(second.outcome, TurnOutcome::Answered);
        let texts: Vec<String> = session
            .memory()
            .await
            .entries()
            .map(|e| e.text.clone())
            .collect();
        assert_eq!(texts, vec!["q1", "one", "q2", "two"]);
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_memory() {
        let a = session(ScriptedClient::new(), ScriptedClient::new());
        let b = session(ScriptedClient::new(), ScriptedClient::new());
        let channel = RecordingChannel::new();

        a.start(&channel).await.unwrap();

        assert_ne!(a.id(), b.id());
        assert_eq!(a.memory().await.len(), 1);
        assert!(b.memory().await.is_empty());
    }
}
