//! プラットフォーム認証情報の管理
//!
//! Twitchはclient_credentialsトークンを期限切れ時に再取得し、
//! YouTubeは複数APIキーを403/429でローテーションする。

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::models::twitch::TwitchTokenResponse;

#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error("Request failed")]
    Request(#[from] reqwest::Error),
    #[error("Token endpoint returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("No API keys configured")]
    NoKeys,
    #[error("All API keys exhausted: {0}")]
    KeysExhausted(String),
}

struct TokenState {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Twitch client_credentialsトークンのブローカー
///
/// ensure_valid()は期限内ならキャッシュを返し、切れていれば再取得する。
/// 取得処理はMutexで直列化される。
pub struct TwitchTokenBroker {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    state: Mutex<Option<TokenState>>,
}

impl TwitchTokenBroker {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
            state: Mutex::new(None),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// 有効なアクセストークンを返す（必要なら再取得）
    pub async fn ensure_valid(&self) -> Result<String, CredentialError> {
        let mut state = self.state.lock().await;

        if let Some(token) = state.as_ref() {
            if Utc::now() < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        let url = format!(
            "https://id.twitch.tv/oauth2/token?client_id={}&client_secret={}&grant_type=client_credentials",
            self.client_id, self.client_secret
        );

        let resp = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(CredentialError::Status(resp.status()));
        }

        let token: TwitchTokenResponse = resp.json().await?;
        let access_token = token.access_token.clone();

        *state = Some(TokenState {
            access_token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in as i64),
        });

        info!("✅ Obtained new Twitch access token");
        Ok(access_token)
    }
}

/// YouTube APIキーのローテーションプール
///
/// 順序付きキーリストとカーソルを持ち、クォータ枯渇（403/429）で
/// 次のキーへ進む。カーソル操作はMutexで直列化される。
pub struct YouTubeKeyPool {
    client: reqwest::Client,
    keys: Vec<String>,
    referer: String,
    cursor: Mutex<usize>,
}

impl YouTubeKeyPool {
    pub fn new(keys: Vec<String>, referer: String) -> Self {
        if keys.is_empty() {
            warn!("No YouTube API keys configured");
        } else {
            info!("YouTube key pool configured with {} keys", keys.len());
        }

        Self {
            client: reqwest::Client::new(),
            keys,
            referer,
            cursor: Mutex::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    async fn current(&self) -> Option<String> {
        let cursor = self.cursor.lock().await;
        self.keys.get(*cursor).cloned()
    }

    /// 次のキーへローテーション
    pub async fn rotate(&self) {
        let mut cursor = self.cursor.lock().await;
        if self.keys.is_empty() {
            return;
        }
        *cursor = (*cursor + 1) % self.keys.len();
        info!(
            "YouTube API key rotated to #{} of {}",
            *cursor + 1,
            self.keys.len()
        );
    }

    /// APIキーを付与してGETし、403/429ならローテーションして再試行する
    ///
    /// 再試行回数はプールのキー数まで。その他のステータスはそのまま返す。
    pub async fn execute_with_retry(
        &self,
        url: &str,
    ) -> Result<reqwest::Response, CredentialError> {
        if self.keys.is_empty() {
            return Err(CredentialError::NoKeys);
        }

        let mut last_error = String::new();

        for _ in 0..self.keys.len() {
            let Some(api_key) = self.current().await else {
                return Err(CredentialError::NoKeys);
            };

            let full_url = if url.contains('?') {
                format!("{}&key={}", url, api_key)
            } else {
                format!("{}?key={}", url, api_key)
            };

            let resp = match self
                .client
                .get(&full_url)
                .header("Referer", &self.referer)
                .timeout(Duration::from_secs(10))
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    self.rotate().await;
                    continue;
                }
            };

            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }

            if status.as_u16() == 403 || status.as_u16() == 429 {
                warn!(
                    "YouTube API key quota likely exhausted (status {}), rotating",
                    status
                );
                last_error = format!("status {}", status);
                self.rotate().await;
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }

            // その他のエラーは呼び出し側で処理する
            return Ok(resp);
        }

        Err(CredentialError::KeysExhausted(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_key_pool_rotation_wraps() {
        let pool = YouTubeKeyPool::new(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            String::new(),
        );

        assert_eq!(pool.current().await.unwrap(), "a");
        pool.rotate().await;
        assert_eq!(pool.current().await.unwrap(), "b");
        pool.rotate().await;
        pool.rotate().await;
        assert_eq!(pool.current().await.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_empty_pool_errors() {
        let pool = YouTubeKeyPool::new(vec![], String::new());
        match pool.execute_with_retry("https://example.invalid/api").await {
            Err(CredentialError::NoKeys) => {}
            other => panic!("Expected NoKeys, got {:?}", other.map(|_| ())),
        }
    }
}
