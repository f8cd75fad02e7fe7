//! Wire types for the backend API and the uniform response shape.
//!
//! Every backend call resolves to an [`ApiResponse`], whether the failure came
//! from the transport, the HTTP status, a malformed body, or the backend's own
//! `code` field.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use scriptchat_core::{HistoryItem, Role, RoleId, Script, ScriptId};

use crate::error::ClientError;

/// Code used for failures that never produced a backend envelope.
pub const TRANSPORT_FAILURE_CODE: i64 = -1;

/// Uniform result of a backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    /// `0` on success.
    pub code: i64,
    /// Backend status string (`"error"` for transport failures).
    pub status: String,
    /// Human-readable message.
    pub message: String,
    /// Payload, when the backend sent one.
    pub data: Option<T>,
    /// HTTP status, when a response was received at all.
    pub http_status: Option<u16>,
}

impl<T> ApiResponse<T> {
    /// Failure that did not come from the backend envelope.
    pub fn transport_failure(message: impl Into<String>, http_status: Option<u16>) -> Self {
        Self {
            code: TRANSPORT_FAILURE_CODE,
            status: "error".to_string(),
            message: message.into(),
            data: None,
            http_status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Convert the payload, keeping code and message.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            code: self.code,
            status: self.status,
            message: self.message,
            data: self.data.map(f),
            http_status: self.http_status,
        }
    }

    /// Succeed only when the backend reported success, ignoring the payload.
    pub fn check(&self) -> Result<(), ClientError> {
        if self.is_success() {
            return Ok(());
        }
        match self.http_status {
            Some(status) if !(200..300).contains(&status) => Err(ClientError::Status(status)),
            _ => Err(ClientError::Backend {
                code: self.code,
                message: self.message.clone(),
            }),
        }
    }

    /// Succeed with the payload, or fail with the reported message.
    pub fn into_result(self) -> Result<T, ClientError> {
        self.check()?;
        self.data
            .ok_or_else(|| ClientError::Serialization("response has no data".to_string()))
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    code: Option<i64>,
    success: Option<bool>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

/// Normalize an HTTP status and body into an [`ApiResponse`].
pub fn decode_response<T: DeserializeOwned>(http_status: u16, body: &str) -> ApiResponse<T> {
    if !(200..300).contains(&http_status) {
        return ApiResponse::transport_failure(
            format!("request failed with HTTP {http_status}"),
            Some(http_status),
        );
    }

    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            return ApiResponse::transport_failure(
                format!("malformed response: {e}"),
                Some(http_status),
            )
        }
    };

    let code = match (envelope.code, envelope.success) {
        (Some(code), _) => code,
        (None, Some(true)) => 0,
        (None, Some(false)) => TRANSPORT_FAILURE_CODE,
        (None, None) => {
            return ApiResponse::transport_failure(
                "malformed response: missing code",
                Some(http_status),
            )
        }
    };

    let message = if code != 0 && envelope.message.is_empty() {
        format!("request failed (code {code})")
    } else {
        envelope.message
    };

    ApiResponse {
        code,
        status: envelope.status,
        message,
        data: envelope.data,
        http_status: Some(http_status),
    }
}

/// Payload of `POST /scripts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadData {
    pub script_id: String,
    pub script_title: String,
    pub script_content: String,
}

impl UploadData {
    pub fn into_script(self) -> Script {
        Script::new(
            ScriptId::new(self.script_id),
            self.script_title,
            self.script_content,
        )
    }
}

/// Body of `POST /roles`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest {
    pub script_id: String,
}

/// Payload of `POST /roles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolesData {
    #[serde(default)]
    pub roles: Vec<RoleDto>,
}

/// Role as it appears on the wire; also the body of `PUT /roles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDto {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub character: String,
    #[serde(default)]
    pub language_habit: String,
}

impl From<RoleDto> for Role {
    fn from(dto: RoleDto) -> Self {
        Role::new(dto.id, dto.name, dto.character, dto.language_habit)
    }
}

impl From<&Role> for RoleDto {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id.to_string(),
            name: role.name.clone(),
            character: role.character.clone(),
            language_habit: role.language_habit.clone(),
        }
    }
}

/// Body of `GET /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRequest {
    pub role_id_user: String,
    pub role_id_assistant: String,
}

impl HistoryRequest {
    /// `None` for the user role means guest mode.
    pub fn new(user: Option<&RoleId>, assistant: &RoleId) -> Self {
        Self {
            role_id_user: user.map(|id| id.to_string()).unwrap_or_default(),
            role_id_assistant: assistant.to_string(),
        }
    }
}

/// Payload of `GET /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryData {
    #[serde(default)]
    pub role_id_user: String,
    #[serde(default)]
    pub role_id_assistant: String,
    #[serde(default)]
    pub history: Vec<HistoryItem>,
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub role_id_user: String,
    pub role_id_assistant: String,
    pub content: String,
}

impl ChatRequest {
    /// `None` for the user role means guest mode.
    pub fn new(user: Option<&RoleId>, assistant: &RoleId, content: impl Into<String>) -> Self {
        Self {
            role_id_user: user.map(|id| id.to_string()).unwrap_or_default(),
            role_id_assistant: assistant.to_string(),
            content: content.into(),
        }
    }
}
