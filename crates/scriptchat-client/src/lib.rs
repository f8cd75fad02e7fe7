//! Client library for the ScriptChat backend.
//!
//! Provides the REST wrappers for scripts and roles, the server-sent-event
//! chat stream, and the conversation state that turns stream events into
//! history entries.

pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod http;
pub mod sse;
pub mod stream;

pub use api::{ApiResponse, ChatRequest, HistoryData, RoleDto, UploadData};
pub use config::ClientConfig;
pub use conversation::{ChatTransport, Conversation, ConversationMode, ConversationUpdate};
pub use error::ClientError;
pub use http::HttpClient;
pub use stream::{ChatStream, StreamEvent, StreamId};
