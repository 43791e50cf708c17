//! Where model requests go and how they are authenticated.
//!
//! A provider is configured in `config.toml` under `[model_provider]`; every
//! field is optional and falls back to the OpenAI Responses API.

use std::collections::HashMap;
use std::env::VarError;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::LoopErr;
use crate::error::Result;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ENV_KEY: &str = "OPENAI_API_KEY";
const DEFAULT_STREAM_IDLE_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelProviderInfo {
    /// Friendly display name.
    pub name: String,
    /// Base URL for the provider's Responses API.
    pub base_url: Option<String>,
    /// Environment variable that stores the API key. `None` sends requests
    /// without an `Authorization` header.
    pub env_key: Option<String>,
    /// Additional HTTP headers to include in requests to this provider.
    pub http_headers: Option<HashMap<String, String>>,
    /// How long to wait for the next SSE event before treating the stream as
    /// disconnected.
    pub stream_idle_timeout_ms: Option<u64>,
}

impl Default for ModelProviderInfo {
    fn default() -> Self {
        Self {
            name: "OpenAI".to_string(),
            base_url: None,
            env_key: Some(DEFAULT_ENV_KEY.to_string()),
            http_headers: None,
            stream_idle_timeout_ms: None,
        }
    }
}

impl ModelProviderInfo {
    pub fn get_full_url(&self) -> String {
        let base_url = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        format!("{}/responses", base_url.trim_end_matches('/'))
    }

    /// Resolves the API key from the configured environment variable. A
    /// missing or blank variable is an error rather than an anonymous request.
    pub fn api_key(&self) -> Result<Option<String>> {
        match &self.env_key {
            Some(env_key) => std::env::var(env_key)
                .and_then(|v| {
                    if v.trim().is_empty() {
                        Err(VarError::NotPresent)
                    } else {
                        Ok(Some(v))
                    }
                })
                .map_err(|_| LoopErr::EnvVar {
                    var: env_key.clone(),
                }),
            None => Ok(None),
        }
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        self.stream_idle_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_STREAM_IDLE_TIMEOUT_MS))
    }

    pub fn create_request_builder(&self, client: &reqwest::Client) -> Result<reqwest::RequestBuilder> {
        let mut builder = client.post(self.get_full_url());
        if let Some(api_key) = self.api_key()? {
            builder = builder.bearer_auth(api_key);
        }
        if let Some(extra) = &self.http_headers {
            for (k, v) in extra {
                builder = builder.header(k, v);
            }
        }
        Ok(builder)
    }
}
