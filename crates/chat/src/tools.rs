//! Tool invocation: let the model decide on a directory lookup, run it and
//! condense the records into prompt text.

use care_core::{AppError, AppResult};
use care_directory::{condense, DirectoryRecord, DirectoryService};
use care_llm::{ChatMessage, LlmClient, ToolCall, ToolRequest, ToolSpec};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const SEARCH_BY_CITY_STATE: &str = "search_by_city_state";
pub const SEARCH_BY_ZIP: &str = "search_by_zip";

/// Room for a couple of calls with short arguments.
const DECISION_MAX_TOKENS: u32 = 256;

/// The capabilities offered to the tool-bound model.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: SEARCH_BY_CITY_STATE.to_string(),
            description: "Uses the Eldercare Data API to search for elder care close to a given \
                          city and two-letter state abbreviation"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "city": { "type": "string" },
                    "state": { "type": "string" }
                },
                "required": ["city", "state"]
            }),
        },
        ToolSpec {
            name: SEARCH_BY_ZIP.to_string(),
            description: "Uses the Eldercare Data API to search for elder care close to a zip code"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "zip_code": { "type": "string" }
                },
                "required": ["zip_code"]
            }),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct CityStateArgs {
    city: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct ZipArgs {
    zip_code: String,
}

/// Decides on and runs directory lookups. Never fails the turn.
#[derive(Clone)]
pub struct ToolInvoker {
    llm: Arc<dyn LlmClient>,
    model: String,
    directory: Option<Arc<dyn DirectoryService>>,
    decision_timeout: Duration,
    lookup_timeout: Duration,
}

impl ToolInvoker {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        directory: Arc<dyn DirectoryService>,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            directory: Some(directory),
            decision_timeout: Duration::from_secs(60),
            lookup_timeout: Duration::from_secs(20),
        }
    }

    /// An invoker that never calls a tool.
    pub fn disabled(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
            directory: None,
            decision_timeout: Duration::from_secs(60),
            lookup_timeout: Duration::from_secs(20),
        }
    }

    pub fn with_timeouts(mut self, decision: Duration, lookup: Duration) -> Self {
        self.decision_timeout = decision;
        self.lookup_timeout = lookup;
        self
    }

    /// Condensed directory output for the conversation, or an empty string.
    pub async fn invoke(&self, messages: &[ChatMessage]) -> String {
        let Some(directory) = &self.directory else {
            return String::new();
        };

        let calls = match self.decide(messages).await {
            Ok(calls) => calls,
            Err(e) => {
                tracing::warn!("Tool decision failed, continuing without tool output: {}", e);
                return String::new();
            }
        };

        if calls.is_empty() {
            tracing::debug!("Model requested no directory lookup");
            return String::new();
        }

        let mut sections = Vec::new();
        for call in &calls {
            match self.dispatch(directory.as_ref(), call).await {
                Ok(records) => {
                    let text = condense(&records);
                    if !text.is_empty() {
                        sections.push(text);
                    }
                }
                Err(e) => tracing::warn!("Tool call {} failed: {}", call.name, e),
            }
        }

        let output = sections.join("\n");
        tracing::info!(
            "Tool invocation produced {} bytes from {} calls",
            output.len(),
            calls.len()
        );
        output
    }

    async fn decide(&self, messages: &[ChatMessage]) -> AppResult<Vec<ToolCall>> {
        let request = ToolRequest::new(self.model.clone(), messages.to_vec(), tool_specs())
            .with_max_tokens(DECISION_MAX_TOKENS);

        let decision = tokio::time::timeout(self.decision_timeout, self.llm.complete_with_tools(&request))
            .await
            .map_err(|_| AppError::Tool("Tool decision timed out".to_string()))??;

        Ok(decision.calls)
    }

    async fn dispatch(
        &self,
        directory: &dyn DirectoryService,
        call: &ToolCall,
    ) -> AppResult<Vec<DirectoryRecord>> {
        tokio::time::timeout(self.lookup_timeout, lookup(directory, call))
            .await
            .map_err(|_| AppError::Tool(format!("Tool call {} timed out", call.name)))?
    }
}

async fn lookup(directory: &dyn DirectoryService, call: &ToolCall) -> AppResult<Vec<DirectoryRecord>> {
    match call.name.to_lowercase().as_str() {
        SEARCH_BY_CITY_STATE => {
            let args: CityStateArgs = parse_args(call)?;
            tracing::info!("Looking up eldercare near {}, {}", args.city, args.state);
            directory.by_city_state(&args.city, &args.state).await
        }
        SEARCH_BY_ZIP => {
            let args: ZipArgs = parse_args(call)?;
            tracing::info!("Looking up eldercare near {}", args.zip_code);
            directory.by_zip(&args.zip_code).await
        }
        other => Err(AppError::Tool(format!("Unknown tool: {}", other))),
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(call: &ToolCall) -> AppResult<T> {
    serde_json::from_value(call.arguments.clone())
        .map_err(|e| AppError::Tool(format!("Malformed arguments for {}: {}", call.name, e)))
}
