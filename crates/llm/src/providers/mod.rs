//! LLM provider implementations.

pub mod claude;
pub mod ollama;
pub mod scripted;

pub use claude::ClaudeClient;
pub use ollama::OllamaClient;
pub use scripted::ScriptedClient;

/// Reassembles newline-terminated lines from a chunked byte stream.
///
/// HTTP chunks do not respect line boundaries; NDJSON and SSE bodies are only
/// parsed once a full line has arrived.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Feed bytes, returning every complete non-blank line.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }
}
