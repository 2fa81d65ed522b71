//! LLM integration crate for Care Companion.
//!
//! This crate provides a provider-agnostic abstraction for interacting with
//! Large Language Models. It supports multiple providers through a unified
//! trait-based interface covering completion, streaming and tool binding.
//!
//! # Providers
//! - **Claude**: Anthropic Messages API (default)
//! - **Ollama**: Local LLM runtime
//! - **Scripted**: Deterministic replay for tests and demos
//!
//! # Example
//! ```no_run
//! use care_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{
    ChatMessage, ChatRole, LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk,
    LlmUsage, ToolCall, ToolDecision, ToolRequest, ToolSpec,
};
pub use factory::{client_for, create_client};
pub use providers::{ClaudeClient, OllamaClient, ScriptedClient};
pub use types::ProviderType;
