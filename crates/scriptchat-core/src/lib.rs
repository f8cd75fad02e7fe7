//! ScriptChat Core Domain Types
//!
//! This crate contains the domain types shared by every ScriptChat front end:
//! - Scripts and the roles extracted from them
//! - Conversation history items
//! - The view state store and its on-disk record
//!
//! Nothing here talks to the network.

pub mod chat;
pub mod error;
pub mod ids;
pub mod persist;
pub mod script;
pub mod store;

// Re-export commonly used types
pub use chat::{ChatRole, HistoryItem};
pub use error::CoreError;
pub use ids::{RoleId, ScriptId};
pub use persist::{PersistentStore, StoreRecord};
pub use script::{Role, RolePatch, Script, ScriptUpdate};
pub use store::ScriptStore;
