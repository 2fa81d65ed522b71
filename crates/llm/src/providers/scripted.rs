//! Scripted LLM client.
//!
//! Replays queued completions, streams and tool decisions in order and records
//! every request it receives. Used to drive the orchestration deterministically
//! in tests and offline demos.

use crate::client::{
    LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage, ToolDecision,
    ToolRequest,
};
use care_core::{AppError, AppResult};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One scripted stream: fragments to emit, then an optional mid-stream failure.
#[derive(Debug, Clone)]
struct ScriptedStream {
    fragments: Vec<String>,
    failure: Option<String>,
    /// Never ends after the fragments
    stalls: bool,
}

#[derive(Debug, Default)]
struct Script {
    completions: VecDeque<Result<String, String>>,
    streams: VecDeque<Result<ScriptedStream, String>>,
    decisions: VecDeque<Result<ToolDecision, String>>,
    requests: Vec<LlmRequest>,
    tool_requests: Vec<ToolRequest>,
}

/// Deterministic client replaying a script.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    script: Mutex<Script>,
    delay: Option<Duration>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering any call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue the text of the next `complete` call.
    pub fn push_completion(self, text: impl Into<String>) -> Self {
        self.edit(|s| s.completions.push_back(Ok(text.into())))
    }

    /// Make the next `complete` call fail.
    pub fn push_completion_error(self, message: impl Into<String>) -> Self {
        self.edit(|s| s.completions.push_back(Err(message.into())))
    }

    /// Queue the fragments of the next `stream` call.
    pub fn push_stream<I, S>(self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments = fragments.into_iter().map(Into::into).collect();
        self.edit(|s| {
            s.streams.push_back(Ok(ScriptedStream {
                fragments,
                failure: None,
                stalls: false,
            }))
        })
    }

    /// Queue a stream that yields `fragments` and then hangs.
    pub fn push_stalled_stream<I, S>(self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments = fragments.into_iter().map(Into::into).collect();
        self.edit(|s| {
            s.streams.push_back(Ok(ScriptedStream {
                fragments,
                failure: None,
                stalls: true,
            }))
        })
    }

    /// Queue a stream that yields `fragments` and then fails.
    pub fn push_broken_stream<I, S>(self, fragments: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments = fragments.into_iter().map(Into::into).collect();
        let failure = Some(message.into());
        self.edit(|s| {
            s.streams.push_back(Ok(ScriptedStream {
                fragments,
                failure,
                stalls: false,
            }))
        })
    }

    /// Make the next `stream` call fail before producing anything.
    pub fn push_stream_error(self, message: impl Into<String>) -> Self {
        self.edit(|s| s.streams.push_back(Err(message.into())))
    }

    /// Queue the next tool decision.
    pub fn push_decision(self, decision: ToolDecision) -> Self {
        self.edit(|s| s.decisions.push_back(Ok(decision)))
    }

    /// Make the next tool-bound call fail.
    pub fn push_decision_error(self, message: impl Into<String>) -> Self {
        self.edit(|s| s.decisions.push_back(Err(message.into())))
    }

    /// Every `complete` and `stream` request received so far, in order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.lock().requests.clone()
    }

    /// Every tool-bound request received so far, in order.
    pub fn tool_requests(&self) -> Vec<ToolRequest> {
        self.lock().tool_requests.clone()
    }

    fn edit(self, f: impl FnOnce(&mut Script)) -> Self {
        f(&mut self.lock());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        // A poisoned script only happens after a test already panicked.
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.pause().await;

        let next = {
            let mut script = self.lock();
            script.requests.push(request.clone());
            script.completions.pop_front()
        };

        match next {
            Some(Ok(content)) => Ok(LlmResponse {
                content,
                model: request.model.clone(),
                usage: LlmUsage::default(),
                done: true,
            }),
            Some(Err(message)) => Err(AppError::Llm(message)),
            None => Err(AppError::Llm("Scripted completions exhausted".to_string())),
        }
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        self.pause().await;

        let next = {
            let mut script = self.lock();
            script.requests.push(request.clone());
            script.streams.pop_front()
        };

        let scripted = match next {
            Some(Ok(scripted)) => scripted,
            Some(Err(message)) => return Err(AppError::Llm(message)),
            None => return Err(AppError::Llm("Scripted streams exhausted".to_string())),
        };

        let model = request.model.clone();
        let mut items: Vec<AppResult<LlmStreamChunk>> = scripted
            .fragments
            .into_iter()
            .map(|content| {
                Ok(LlmStreamChunk {
                    content,
                    model: model.clone(),
                    done: false,
                    usage: None,
                })
            })
            .collect();

        if scripted.stalls {
            let stream = futures::stream::iter(items).chain(futures::stream::pending());
            return Ok(Box::pin(stream));
        }

        match scripted.failure {
            Some(message) => items.push(Err(AppError::Llm(message))),
            None => items.push(Ok(LlmStreamChunk {
                content: String::new(),
                model,
                done: true,
                usage: Some(LlmUsage::default()),
            })),
        }

        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn complete_with_tools(&self, request: &ToolRequest) -> AppResult<ToolDecision> {
        self.pause().await;

        let next = {
            let mut script = self.lock();
            script.tool_requests.push(request.clone());
            script.decisions.pop_front()
        };

        match next {
            Some(Ok(decision)) => Ok(decision),
            Some(Err(message)) => Err(AppError::Llm(message)),
            None => Ok(ToolDecision::default()),
        }
    }
}
