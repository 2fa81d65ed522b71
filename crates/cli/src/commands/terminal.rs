//! Terminal output channel.

use care_chat::{MessageHandle, OutputChannel};
use care_core::{AppError, AppResult};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

const WITHDRAWN: &str = "[answer withdrawn, checking sources]";

/// Writes the conversation to a terminal-like writer.
///
/// A terminal cannot take text back, so a retracted message is followed by a
/// marker line instead.
pub struct TerminalChannel<W: Write + Send> {
    out: Mutex<W>,
    next_id: AtomicU64,
    color: bool,
}

impl TerminalChannel<std::io::Stdout> {
    pub fn stdout(color: bool) -> Self {
        Self::new(std::io::stdout(), color)
    }
}

impl<W: Write + Send> TerminalChannel<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out: Mutex::new(out),
            next_id: AtomicU64::new(0),
            color,
        }
    }

    fn write(&self, text: &str) -> AppResult<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| AppError::Transport("Terminal writer poisoned".to_string()))?;
        out.write_all(text.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| AppError::Transport(format!("Terminal closed: {}", e)))
    }

    fn dim(&self, text: &str) -> String {
        if self.color {
            format!("\x1b[2m{}\x1b[0m", text)
        } else {
            text.to_string()
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl<W: Write + Send> OutputChannel for TerminalChannel<W> {
    async fn begin_message(&self) -> AppResult<MessageHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageHandle::new(id))
    }

    async fn push_fragment(&self, _handle: MessageHandle, fragment: &str) -> AppResult<()> {
        self.write(fragment)
    }

    async fn retract_message(&self, _handle: MessageHandle) -> AppResult<()> {
        self.write(&format!("\n{}\n", self.dim(WITHDRAWN)))
    }

    async fn finish_message(&self, _handle: MessageHandle) -> AppResult<()> {
        self.write("\n\n")
    }

    async fn send_notice(&self, text: &str) -> AppResult<()> {
        self.write(&format!("{}\n", self.dim(text)))
    }
}
