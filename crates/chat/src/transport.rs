//! Output channel abstraction for streaming answers to the user.

use care_core::{AppError, AppResult};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Identifies a message currently or previously shown on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageHandle(u64);

impl MessageHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Where a session's output goes.
///
/// Every method fails with `AppError::Transport` once the peer is gone.
#[async_trait::async_trait]
pub trait OutputChannel: Send + Sync {
    /// Open a new, empty assistant message.
    async fn begin_message(&self) -> AppResult<MessageHandle>;

    /// Append text to an open message.
    async fn push_fragment(&self, handle: MessageHandle, fragment: &str) -> AppResult<()>;

    /// Remove a message from view.
    async fn retract_message(&self, handle: MessageHandle) -> AppResult<()>;

    /// Mark a message complete.
    async fn finish_message(&self, handle: MessageHandle) -> AppResult<()>;

    /// Show a short out-of-band status line.
    async fn send_notice(&self, text: &str) -> AppResult<()>;
}

/// Send `text` as one complete message.
pub async fn send_message(channel: &dyn OutputChannel, text: &str) -> AppResult<MessageHandle> {
    let handle = channel.begin_message().await?;
    channel.push_fragment(handle, text).await?;
    channel.finish_message(handle).await?;
    Ok(handle)
}

/// Everything a [`RecordingChannel`] observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Begin(MessageHandle),
    Fragment(MessageHandle, String),
    Retract(MessageHandle),
    Finish(MessageHandle),
    Notice(String),
}

#[derive(Debug, Default, Clone)]
struct RecordedMessage {
    text: String,
    retracted: bool,
    finished: bool,
}

#[derive(Debug, Default)]
struct Recording {
    next_id: u64,
    events: Vec<ChannelEvent>,
    messages: BTreeMap<MessageHandle, RecordedMessage>,
    fragments_left: Option<usize>,
}

/// In-memory channel that records every call. Can simulate a disconnect.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    inner: Mutex<Recording>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `fragments` more fragments, then fail every call as disconnected.
    pub fn disconnect_after(fragments: usize) -> Self {
        let channel = Self::default();
        channel.lock().fragments_left = Some(fragments);
        channel
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn events(&self) -> Vec<ChannelEvent> {
        self.lock().events.clone()
    }

    /// Text of every message still shown, in creation order.
    pub fn visible_messages(&self) -> Vec<String> {
        self.lock()
            .messages
            .values()
            .filter(|m| !m.retracted)
            .map(|m| m.text.clone())
            .collect()
    }

    /// Text of every message that was retracted, in creation order.
    pub fn retracted_messages(&self) -> Vec<String> {
        self.lock()
            .messages
            .values()
            .filter(|m| m.retracted)
            .map(|m| m.text.clone())
            .collect()
    }

    /// Whether every visible message was finished.
    pub fn all_finished(&self) -> bool {
        self.lock()
            .messages
            .values()
            .filter(|m| !m.retracted)
            .all(|m| m.finished)
    }

    pub fn notices(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                ChannelEvent::Notice(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn check_connected(recording: &Recording) -> AppResult<()> {
        match recording.fragments_left {
            Some(0) => Err(AppError::Transport("Channel disconnected".to_string())),
            _ => Ok(()),
        }
    }

    fn message<'a>(
        recording: &'a mut Recording,
        handle: MessageHandle,
    ) -> AppResult<&'a mut RecordedMessage> {
        recording
            .messages
            .get_mut(&handle)
            .ok_or_else(|| AppError::Transport(format!("Unknown message {}", handle.id())))
    }
}

#[async_trait::async_trait]
impl OutputChannel for RecordingChannel {
    async fn begin_message(&self) -> AppResult<MessageHandle> {
        let mut recording = self.lock();
        Self::check_connected(&recording)?;

        recording.next_id += 1;
        let handle = MessageHandle::new(recording.next_id);
        recording.messages.insert(handle, RecordedMessage::default());
        recording.events.push(ChannelEvent::Begin(handle));
        Ok(handle)
    }

    async fn push_fragment(&self, handle: MessageHandle, fragment: &str) -> AppResult<()> {
        let mut recording = self.lock();
        Self::check_connected(&recording)?;

        if let Some(left) = recording.fragments_left.as_mut() {
            *left -= 1;
        }

        let message = Self::message(&mut recording, handle)?;
        if message.finished || message.retracted {
            return Err(AppError::Transport(format!(
                "Message {} is closed",
                handle.id()
            )));
        }
        message.text.push_str(fragment);
        recording
            .events
            .push(ChannelEvent::Fragment(handle, fragment.to_string()));
        Ok(())
    }

    async fn retract_message(&self, handle: MessageHandle) -> AppResult<()> {
        let mut recording = self.lock();
        Self::check_connected(&recording)?;

        Self::message(&mut recording, handle)?.retracted = true;
        recording.events.push(ChannelEvent::Retract(handle));
        Ok(())
    }

    async fn finish_message(&self, handle: MessageHandle) -> AppResult<()> {
        let mut recording = self.lock();
        Self::check_connected(&recording)?;

        Self::message(&mut recording, handle)?.finished = true;
        recording.events.push(ChannelEvent::Finish(handle));
        Ok(())
    }

    async fn send_notice(&self, text: &str) -> AppResult<()> {
        let mut recording = self.lock();
        Self::check_connected(&recording)?;

        recording.events.push(ChannelEvent::Notice(text.to_string()));
        Ok(())
    }
}
