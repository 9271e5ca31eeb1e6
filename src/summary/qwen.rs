//! Alibaba DashScope (OpenAI互換エンドポイント) のQwenプロバイダ

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::summary::{AiError, AiProvider};

const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

pub struct QwenProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl QwenProvider {
    pub fn new(api_key: String, model: String) -> Self {
        if api_key.is_empty() {
            tracing::warn!("DashScope API key not configured");
        }

        let model = if model.is_empty() {
            "qwen-flash".to_string()
        } else {
            model
        };

        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl AiProvider for QwenProvider {
    async fn generate_content(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, AiError> {
        if self.api_key.is_empty() {
            return Err(AiError::NotConfigured("aliyun"));
        }

        let url = format!("{}/chat/completions", DASHSCOPE_BASE_URL);

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "max_tokens": max_output_tokens,
        });

        debug!(
            "Calling Qwen API ({}) with maxOutputTokens: {}, prompt length: {}",
            self.model,
            max_output_tokens,
            prompt.len()
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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
            .pointer("/choices/0/message/content")
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
