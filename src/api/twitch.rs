//! Twitch Helix APIクライアント
//!
//! users / streams / videos の薄いラッパー。認証はTwitchTokenBrokerに委譲。

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::api::credentials::{CredentialError, TwitchTokenBroker};
use crate::models::twitch::{
    TwitchChannelSearchData, TwitchChannelSearchResponse, TwitchStreamData, TwitchStreamResponse,
    TwitchUserData, TwitchUserResponse, TwitchVideoData, TwitchVideoResponse,
};

#[derive(thiserror::Error, Debug)]
pub enum TwitchError {
    #[error("Request failed")]
    Request(#[from] reqwest::Error),
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),
    #[error("Helix returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Video not found: {0}")]
    VideoNotFound(String),
}

pub struct TwitchClient {
    client: reqwest::Client,
    broker: Arc<TwitchTokenBroker>,
}

impl TwitchClient {
    pub fn new(broker: Arc<TwitchTokenBroker>) -> Self {
        Self {
            client: reqwest::Client::new(),
            broker,
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, TwitchError> {
        let token = self.broker.ensure_valid().await?;

        let resp = self
            .client
            .get(url)
            .header("Client-ID", self.broker.client_id())
            .header("Authorization", format!("Bearer {}", token))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TwitchError::Status { status, body });
        }

        Ok(resp)
    }

    /// ログイン名から完全なユーザー情報を取得
    ///
    /// IDは不変なので呼び出し側でのキャッシュを想定している。
    pub async fn get_user_info(&self, login: &str) -> Result<TwitchUserData, TwitchError> {
        let url = format!("https://api.twitch.tv/helix/users?login={}", login);
        let resp: TwitchUserResponse = self.get(&url).await?.json().await?;

        resp.data
            .into_iter()
            .next()
            .ok_or_else(|| TwitchError::UserNotFound(login.to_string()))
    }

    /// 直播状態をチェック。配信中でなければNoneを返す
    pub async fn check_stream_status(
        &self,
        login: &str,
    ) -> Result<Option<TwitchStreamData>, TwitchError> {
        let url = format!("https://api.twitch.tv/helix/streams?user_login={}", login);
        let resp: TwitchStreamResponse = self.get(&url).await?.json().await?;

        Ok(resp.data.into_iter().next())
    }

    /// 直近の録画リストを取得（typeでフィルタ、"all"は無指定）
    pub async fn get_videos(
        &self,
        login: &str,
        video_type: &str,
        first: u32,
    ) -> Result<Vec<TwitchVideoData>, TwitchError> {
        let user = self.get_user_info(login).await?;

        let mut url = format!(
            "https://api.twitch.tv/helix/videos?user_id={}&first={}",
            user.id, first
        );
        if video_type != "all" {
            url.push_str("&type=");
            url.push_str(video_type);
        }

        let resp: TwitchVideoResponse = self.get(&url).await?.json().await?;
        debug!("Fetched {} videos for {}", resp.data.len(), login);

        Ok(resp.data)
    }

    /// 録画IDからメタデータを取得
    pub async fn get_video_info(&self, video_id: &str) -> Result<TwitchVideoData, TwitchError> {
        let url = format!("https://api.twitch.tv/helix/videos?id={}", video_id);
        let resp: TwitchVideoResponse = self.get(&url).await?.json().await?;

        resp.data
            .into_iter()
            .next()
            .ok_or_else(|| TwitchError::VideoNotFound(video_id.to_string()))
    }

    /// チャンネル検索（フロント向けエンドポイントが使用）
    pub async fn search_channels(
        &self,
        query: &str,
    ) -> Result<Vec<TwitchChannelSearchData>, TwitchError> {
        let url = format!(
            "https://api.twitch.tv/helix/search/channels?query={}",
            urlencode(query)
        );
        let resp: TwitchChannelSearchResponse = self.get(&url).await?.json().await?;

        Ok(resp.data)
    }
}

/// クエリ文字列用の最小限のパーセントエンコード
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("kaneko_lumi"), "kaneko_lumi");
        assert_eq!(urlencode("hello world"), "hello%20world");
        assert_eq!(urlencode("日"), "%E6%97%A5");
    }
}
