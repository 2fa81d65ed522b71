//! Command handlers for the Care Companion CLI.
//!
//! This module organizes all CLI commands into separate submodules, plus the
//! wiring shared by the conversational commands.

pub mod ask;
pub mod chat;
pub mod prompts;
pub mod terminal;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use prompts::PromptsCommand;

use care_chat::{AnswerGenerator, LlmJudge, Session, ToolInvoker, TurnCoordinator};
use care_core::{config::AppConfig, AppResult};
use care_directory::EldercareClient;
use care_knowledge::{EvidenceRetriever, OllamaEmbedder, QdrantIndex};
use care_llm::client_for;
use care_prompt::PromptSet;
use std::sync::Arc;

/// Wire every collaborator from configuration into a fresh session.
pub fn build_session(config: &AppConfig) -> AppResult<Session> {
    config.validate()?;

    let llm = client_for(config)?;

    let prompts = Arc::new(PromptSet::load(&config.workspace)?);
    let fast_model = config.fast_model();
    let rag = &config.rag;

    let embedder = Arc::new(OllamaEmbedder::new(
        &config.index.embedding_endpoint,
        &config.index.embedding_model,
    )?);
    let index = Arc::new(QdrantIndex::new(&config.index, embedder)?);
    let retriever = EvidenceRetriever::from_config(index, &config.index, rag).with_rewriter(
        llm.clone(),
        prompts.clone(),
        fast_model,
    );

    let tools = if config.directory.enabled {
        let directory = Arc::new(EldercareClient::from_config(&config.directory)?);
        ToolInvoker::new(llm.clone(), fast_model, directory)
    } else {
        tracing::info!("Eldercare directory disabled; tool lookups are off");
        ToolInvoker::disabled(llm.clone(), fast_model)
    };
    let tools = tools.with_timeouts(rag.generation_timeout(), rag.tool_timeout());

    let generator = AnswerGenerator::new(llm.clone(), &config.model, rag);
    let judge = Arc::new(LlmJudge::new(
        llm,
        prompts.clone(),
        fast_model,
        rag.generation_timeout(),
    ));

    let coordinator = TurnCoordinator::new(
        retriever,
        tools,
        generator,
        judge,
        prompts,
        rag.max_attempts,
    );

    tracing::debug!(
        "Session wired: collection {}, max_context {}, max_attempts {}",
        config.index.collection,
        rag.max_context,
        rag.max_attempts
    );
    Ok(Session::new(Arc::new(coordinator), rag.max_memory))
}
