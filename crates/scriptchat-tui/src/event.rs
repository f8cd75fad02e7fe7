//! Event types for communication between the backend thread and the UI.

use std::path::PathBuf;

use scriptchat_client::Conversation;
use scriptchat_core::{HistoryItem, Role, RoleId, RolePatch, Script, ScriptId};

/// Render-ready copy of the backend's conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationSnapshot {
    /// History plus the in-flight reply, in display order.
    pub items: Vec<HistoryItem>,
    /// Text of the in-flight assistant message.
    pub streaming: String,
    /// Busy indicator.
    pub receiving: bool,
}

impl ConversationSnapshot {
    pub fn capture(conversation: &Conversation) -> Self {
        Self {
            items: conversation.display_items(),
            streaming: conversation.streaming_text().to_string(),
            receiving: conversation.is_receiving(),
        }
    }
}

/// Events sent from the backend thread to the UI thread.
#[derive(Debug)]
pub enum UiEvent {
    /// An upload finished.
    ScriptUploaded(Result<Script, String>),

    /// Role analysis finished.
    RolesAnalyzed {
        script_id: ScriptId,
        result: Result<Vec<Role>, String>,
    },

    /// A role edit was accepted or rejected by the backend.
    RoleUpdated {
        script_id: ScriptId,
        role_id: RoleId,
        patch: RolePatch,
        result: Result<(), String>,
    },

    /// The conversation changed. `epoch` identifies the participant pair.
    Conversation {
        epoch: u64,
        snapshot: ConversationSnapshot,
    },

    /// Sending, streaming or loading history failed.
    ChatFailed { epoch: u64, message: String },
}

/// Commands sent from the UI thread to the backend thread.
#[derive(Debug)]
pub enum BackendCommand {
    /// Upload a script file.
    UploadScript {
        path: PathBuf,
        title: Option<String>,
    },

    /// Extract the roles of a script.
    AnalyzeScript(ScriptId),

    /// Push an edited role. `role` already has `patch` applied.
    UpdateRole {
        script_id: ScriptId,
        role: Role,
        patch: RolePatch,
    },

    /// Talk to a new participant pair and load its history.
    OpenChat {
        epoch: u64,
        user: Option<RoleId>,
        assistant: RoleId,
    },

    /// Send a message in the open chat.
    SendMessage(String),

    /// Cancel the running reply.
    StopChat,

    /// Drop the conversation.
    CloseChat,

    /// Quit the application.
    Quit,
}
