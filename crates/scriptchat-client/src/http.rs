//! HTTP client for the backend REST and chat endpoints.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use scriptchat_core::{Role, RoleId, ScriptId};

use crate::api::{
    decode_response, AnalyzeRequest, ApiResponse, ChatRequest, HistoryData, HistoryRequest,
    RoleDto, RolesData, UploadData,
};
use crate::config::ClientConfig;
use crate::conversation::ChatTransport;
use crate::error::ClientError;
use crate::stream::ChatStream;

/// HTTP client for the ScriptChat backend.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and normalize whatever comes back.
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResponse<T> {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Request failed");
                return ApiResponse::transport_failure(
                    e.to_string(),
                    e.status().map(|s| s.as_u16()),
                );
            }
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => {
                let result = decode_response(status, &body);
                if !result.is_success() {
                    warn!(status, code = result.code, message = %result.message, "Backend reported failure");
                }
                result
            }
            Err(e) => {
                warn!(status, error = %e, "Failed to read response body");
                ApiResponse::transport_failure(e.to_string(), Some(status))
            }
        }
    }

    /// Upload script text as a multipart form.
    pub async fn upload_script(
        &self,
        title: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> ApiResponse<UploadData> {
        let url = self.url("/scripts");
        info!(url = %url, title = %title, size = bytes.len(), "Uploading script");

        let form = Form::new()
            .text("title", title.to_string())
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()));

        self.execute(self.inner.post(&url).multipart(form)).await
    }

    /// Upload a script file from disk.
    ///
    /// Without an explicit title, the file name up to its first `.` is used.
    pub async fn upload_script_file(
        &self,
        path: &Path,
        title: Option<&str>,
    ) -> ApiResponse<UploadData> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = ClientError::Io(e);
                warn!(path = %path.display(), error = %err, "Failed to read script file");
                return ApiResponse::transport_failure(
                    format!("failed to read {}: {err}", path.display()),
                    None,
                );
            }
        };

        let title = title
            .map(str::to_string)
            .unwrap_or_else(|| title_from_file_name(&file_name));
        self.upload_script(&title, &file_name, bytes).await
    }

    /// Ask the backend to extract roles from a script.
    pub async fn analyze_script(&self, script_id: &ScriptId) -> ApiResponse<RolesData> {
        let url = self.url("/roles");
        info!(url = %url, script_id = %script_id, "Requesting role analysis");

        let body = AnalyzeRequest {
            script_id: script_id.to_string(),
        };
        self.execute(self.inner.post(&url).json(&body)).await
    }

    /// Overwrite a role's fields.
    pub async fn modify_role(&self, role: &Role) -> ApiResponse<()> {
        let url = self.url("/roles");
        debug!(url = %url, role_id = %role.id, "Updating role");

        self.execute(self.inner.put(&url).json(&RoleDto::from(role)))
            .await
    }

    /// Fetch the stored history between two roles.
    pub async fn fetch_history(
        &self,
        user: Option<&RoleId>,
        assistant: &RoleId,
    ) -> ApiResponse<HistoryData> {
        self.history(HistoryRequest::new(user, assistant)).await
    }

    async fn history(&self, request: HistoryRequest) -> ApiResponse<HistoryData> {
        let url = self.url("/chat");
        debug!(url = %url, assistant = %request.role_id_assistant, "Fetching history");

        // The backend reads the participant pair from a JSON body even on GET.
        self.execute(self.inner.get(&url).json(&request)).await
    }

    /// Start a streaming chat request.
    pub fn start_chat(&self, request: ChatRequest) -> ChatStream {
        let url = self.url("/chat");
        let client = self.inner.clone();
        debug!(url = %url, "Opening chat stream");

        ChatStream::spawn(async move {
            let response = client
                .post(&url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(ClientError::Status(status.as_u16()));
            }
            Ok(response.bytes_stream())
        })
    }
}

#[async_trait]
impl ChatTransport for HttpClient {
    fn open_chat(&self, request: ChatRequest) -> ChatStream {
        self.start_chat(request)
    }

    async fn fetch_history(&self, request: HistoryRequest) -> ApiResponse<HistoryData> {
        self.history(request).await
    }
}

/// Derive a script title from a file name: everything before the first `.`.
pub fn title_from_file_name(file_name: &str) -> String {
    file_name.split('.').next().unwrap_or(file_name).to_string()
}
