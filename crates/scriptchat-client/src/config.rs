//! Client configuration.

use std::path::PathBuf;

/// Default backend base URL.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:31721/api/v1";

/// Name of the persisted store record.
pub const STORE_RECORD_NAME: &str = "script-storage";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL, without a trailing slash.
    pub base_url: String,

    /// Path of the persisted script store.
    pub store_path: PathBuf,
}

impl ClientConfig {
    /// Build a config, normalizing the base URL.
    pub fn new(base_url: impl AsRef<str>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
            store_path: store_path.into(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, default_store_path())
    }
}

/// `<data dir>/scriptchat/script-storage.json`, falling back to the working
/// directory when the platform has no data dir.
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("scriptchat"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(format!("{STORE_RECORD_NAME}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let config = ClientConfig::new("http://localhost:8000/api/v1/", "store.json");
        assert_eq!(config.base_url, "http://localhost:8000/api/v1");
    }

    #[test]
    fn test_default_store_file_name() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.store_path.ends_with("script-storage.json"));
    }
}
