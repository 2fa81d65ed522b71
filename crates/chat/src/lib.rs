//! Conversation orchestration for Care Companion.
//!
//! A [`Session`] owns a bounded memory window and runs each user message as a
//! turn through the [`TurnCoordinator`]: evidence retrieval and directory tool
//! lookup in parallel, a streamed grounded answer, then a fact-verification
//! loop that retracts and rewrites unsupported answers.

pub mod coordinator;
pub mod generator;
pub mod memory;
pub mod session;
pub mod tools;
pub mod transport;
pub mod verify;

pub use coordinator::{Turn, TurnCoordinator, TurnOutcome, APOLOGY_MESSAGE};
pub use generator::{AnswerGenerator, StreamedAnswer};
pub use memory::{ConversationMemory, MemoryEntry};
pub use session::{Session, GREETING};
pub use tools::{tool_specs, ToolInvoker};
pub use transport::{send_message, ChannelEvent, MessageHandle, OutputChannel, RecordingChannel};
pub use verify::{
    Grounding, Judge, LlmJudge, VerificationLoop, VerificationOutcome, Verdict, GIVE_UP_MESSAGE,
    VERIFY_NOTICE,
};
