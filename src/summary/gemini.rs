//! Google Gemini (generateContent) プロバイダ

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::summary::{AiError, AiProvider};

const GEMINI_MODEL: &str = "gemini-2.5-flash-lite";
const GEMINI_TEMPERATURE: f64 = 0.7;

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(api_key: String) -> Self {
        if api_key.is_empty() {
            tracing::warn!("Google API key not configured");
        }

        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    async fn generate_content(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, AiError> {
        if self.api_key.is_empty() {
            return Err(AiError::NotConfigured("google"));
        }

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            GEMINI_MODEL, self.api_key
        );

        let body = json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "maxOutputTokens": max_output_tokens,
                "temperature": GEMINI_TEMPERATURE,
            }
        });

        debug!(
            "Calling Gemini API with maxOutputTokens: {}, prompt length: {}",
            max_output_tokens,
            prompt.len()
        );

        let resp = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(120))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AiError::Status { status, body });
        }

        let value: Value = resp.json().await?;

        let text = value
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if text.is_empty() {
            return Err(AiError::EmptyResponse);
        }

        debug!("Received response length: {} characters", text.len());
        Ok(text)
    }
}
