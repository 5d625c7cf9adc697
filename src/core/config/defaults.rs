use crate::core::config::data::{Config, ImagePolicy};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_OUTPUT_DIR: &str = "output";

impl Config {
    /// `OPENAI_BASE_URL` wins over the file when set and non-empty.
    pub fn base_url(&self) -> String {
        self.base_url_with_override(std::env::var(BASE_URL_ENV).ok())
    }

    pub(crate) fn base_url_with_override(&self, env_value: Option<String>) -> String {
        env_value
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn api_key_env(&self) -> String {
        self.api_key_env
            .clone()
            .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string())
    }

    /// The API key, read from the variable named by `api_key_env`.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(self.api_key_env())
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(
            self.session_timeout_secs
                .unwrap_or(DEFAULT_SESSION_TIMEOUT_SECS),
        )
    }

    pub fn image_policy(&self) -> ImagePolicy {
        self.summary_images.unwrap_or_default()
    }

    pub fn persist_images(&self) -> bool {
        self.persist_images.unwrap_or(true)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }
}
