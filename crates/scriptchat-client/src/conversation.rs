//! Conversation state for one chat surface.
//!
//! A [`Conversation`] holds the permanent history, the transient text of the
//! message being streamed, and at most one active [`ChatStream`]. Sending a
//! new message, switching participants, calling [`Conversation::stop`], or
//! dropping the conversation cancels the active stream and discards its
//! partial text.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use scriptchat_core::{HistoryItem, RoleId};

use crate::api::{ApiResponse, ChatRequest, HistoryData, HistoryRequest};
use crate::error::ClientError;
use crate::stream::{ChatStream, StreamEvent, StreamId};

/// The backend seam used by a conversation.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Start a streaming chat request.
    fn open_chat(&self, request: ChatRequest) -> ChatStream;

    /// Fetch the stored history for a participant pair.
    async fn fetch_history(&self, request: HistoryRequest) -> ApiResponse<HistoryData>;
}

/// Who the user speaks as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationMode {
    /// Guest: the user speaks as themselves.
    #[default]
    Single,
    /// The user plays one of the script's roles.
    Dual,
}

/// What changed after a stream event was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationUpdate {
    /// Text was appended to the streaming message.
    Delta(String),
    /// The stream finished. Carries the appended history entry, if any text
    /// had arrived.
    Finalized(Option<HistoryItem>),
    /// The stream failed; transient state has been reset.
    Failed(String),
}

/// One conversation between an optional user role and an assistant role.
#[derive(Debug)]
pub struct Conversation {
    user_role: Option<RoleId>,
    assistant_role: RoleId,
    history: Vec<HistoryItem>,
    /// Text of the in-flight assistant message.
    streaming: String,
    /// Busy indicator: a request is in flight.
    receiving: bool,
    /// Completion claim; set while a finalization is being applied.
    completing: AtomicBool,
    active: Option<ChatStream>,
}

impl Conversation {
    /// Create a conversation. `None` for the user role means guest mode.
    pub fn new(user_role: Option<RoleId>, assistant_role: RoleId) -> Self {
        Self {
            user_role,
            assistant_role,
            history: Vec::new(),
            streaming: String::new(),
            receiving: false,
            completing: AtomicBool::new(false),
            active: None,
        }
    }

    pub fn mode(&self) -> ConversationMode {
        if self.user_role.is_some() {
            ConversationMode::Dual
        } else {
            ConversationMode::Single
        }
    }

    pub fn user_role(&self) -> Option<&RoleId> {
        self.user_role.as_ref()
    }

    pub fn assistant_role(&self) -> &RoleId {
        &self.assistant_role
    }

    /// Permanent history.
    pub fn history(&self) -> &[HistoryItem] {
        &self.history
    }

    /// Text received so far for the in-flight message.
    pub fn streaming_text(&self) -> &str {
        &self.streaming
    }

    pub fn is_receiving(&self) -> bool {
        self.receiving
    }

    /// Id of the active stream, if any.
    pub fn active_stream(&self) -> Option<StreamId> {
        self.active.as_ref().map(ChatStream::id)
    }

    /// History plus the in-flight assistant message, for display.
    pub fn display_items(&self) -> Vec<HistoryItem> {
        let mut items = self.history.clone();
        if self.receiving && !self.streaming.is_empty() {
            items.push(HistoryItem::assistant(self.streaming.clone()));
        }
        items
    }

    /// Send a user message and start streaming the reply.
    ///
    /// Any stream still running is cancelled first; its partial text never
    /// reaches the history.
    pub fn send(
        &mut self,
        content: &str,
        transport: &dyn ChatTransport,
    ) -> Result<StreamId, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        self.stop();

        self.history.push(HistoryItem::user(content));
        self.receiving = true;

        let request = ChatRequest::new(self.user_role.as_ref(), &self.assistant_role, content);
        let stream = transport.open_chat(request);
        let id = stream.id();
        info!(
            stream_id = %id,
            assistant = %self.assistant_role,
            guest = self.user_role.is_none(),
            "Sending chat message"
        );
        self.active = Some(stream);
        Ok(id)
    }

    /// Wait for the next event of the active stream and apply it.
    ///
    /// Returns `None` when no stream is active.
    pub async fn next_update(&mut self) -> Option<ConversationUpdate> {
        let stream = self.active.as_mut()?;
        let event = stream.next_event().await;
        Some(self.apply(event))
    }

    /// Drive the active stream until it finalizes or fails.
    pub async fn finish(&mut self) -> Option<ConversationUpdate> {
        let mut last = None;
        while let Some(update) = self.next_update().await {
            let terminal = !matches!(update, ConversationUpdate::Delta(_));
            last = Some(update);
            if terminal {
                break;
            }
        }
        last
    }

    fn apply(&mut self, event: Option<StreamEvent>) -> ConversationUpdate {
        match event {
            Some(StreamEvent::Delta(text)) => {
                self.streaming.push_str(&text);
                ConversationUpdate::Delta(text)
            }
            Some(StreamEvent::Completed) => {
                self.active = None;
                ConversationUpdate::Finalized(self.finalize())
            }
            Some(StreamEvent::Failed(message)) => {
                warn!(error = %message, "Chat stream failed");
                self.active = None;
                self.reset_transient();
                ConversationUpdate::Failed(message)
            }
            None => {
                self.active = None;
                self.reset_transient();
                ConversationUpdate::Failed("chat stream closed unexpectedly".to_string())
            }
        }
    }

    /// Move the streamed text into the history as one assistant entry.
    ///
    /// Only the caller that wins the completion claim appends; a concurrent
    /// or repeated call is a no-op. An empty message appends nothing but still
    /// clears the busy flag.
    pub fn finalize(&mut self) -> Option<HistoryItem> {
        if self
            .completing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Finalization already in progress");
            return None;
        }

        let content = std::mem::take(&mut self.streaming);
        let entry = (!content.is_empty()).then(|| HistoryItem::assistant(content));
        if let Some(entry) = &entry {
            self.history.push(entry.clone());
            debug!(len = entry.content.len(), "Finalized assistant message");
        }
        self.receiving = false;

        self.completing.store(false, Ordering::Release);
        entry
    }

    /// Cancel the active stream and discard its partial text.
    ///
    /// Returns true if a stream was running.
    pub fn stop(&mut self) -> bool {
        let cancelled = match self.active.take() {
            Some(stream) => {
                debug!(stream_id = %stream.id(), "Cancelling chat stream");
                stream.cancel();
                true
            }
            None => false,
        };
        self.reset_transient();
        cancelled
    }

    /// Talk to a different pair of roles. Cancels the stream and clears the
    /// history; the caller reloads history for the new pair.
    pub fn switch_participants(&mut self, user_role: Option<RoleId>, assistant_role: RoleId) {
        self.stop();
        self.history.clear();
        self.user_role = user_role;
        self.assistant_role = assistant_role;
    }

    /// Replace the history wholesale.
    pub fn replace_history(&mut self, history: Vec<HistoryItem>) {
        self.history = history;
    }

    /// Fetch and install the stored history for the current participants.
    pub async fn load_history(&mut self, transport: &dyn ChatTransport) -> Result<(), ClientError> {
        let request = HistoryRequest::new(self.user_role.as_ref(), &self.assistant_role);
        let data = transport.fetch_history(request).await.into_result()?;
        debug!(count = data.history.len(), "Loaded chat history");
        self.replace_history(data.history);
        Ok(())
    }

    fn reset_transient(&mut self) {
        self.streaming.clear();
        self.receiving = false;
        self.completing.store(false, Ordering::Release);
    }
}
