//! YouTube Data API v3クライアント
//!
//! search.list / videos.list / channels.list の薄いラッパー。
//! キーのローテーションはYouTubeKeyPoolに委譲する。

use std::sync::Arc;

use tracing::{debug, info};

use crate::api::credentials::{CredentialError, YouTubeKeyPool};
use crate::models::youtube::{
    YouTubeChannelInfo, YouTubeSearchResponse, YouTubeStreamData, YouTubeVideoItem,
    YouTubeVideoResponse,
};

#[derive(thiserror::Error, Debug)]
pub enum YouTubeError {
    #[error("Request failed")]
    Request(#[from] reqwest::Error),
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),
    #[error("API returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),
}

pub struct YouTubeClient {
    pool: Arc<YouTubeKeyPool>,
}

impl YouTubeClient {
    pub fn new(pool: Arc<YouTubeKeyPool>) -> Self {
        Self { pool }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, YouTubeError> {
        let resp = self.pool.execute_with_retry(url).await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(YouTubeError::Status { status, body });
        }

        Ok(resp.json().await?)
    }

    /// `@handle` から"UC"で始まるチャンネルIDを解決する
    ///
    /// forUsernameは旧形式専用のため、search.listでのHandle検索を使う。
    pub async fn resolve_channel_id(&self, handle: &str) -> Result<String, YouTubeError> {
        let handle = if handle.starts_with('@') {
            handle.to_string()
        } else {
            format!("@{}", handle)
        };

        let url = format!(
            "https://www.googleapis.com/youtube/v3/search?part=snippet&q={}&type=channel",
            handle
        );
        let resp: YouTubeSearchResponse = self.get_json(&url).await?;

        let channel_id = resp
            .items
            .into_iter()
            .next()
            .map(|item| item.id.channel_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| YouTubeError::ChannelNotFound(handle.clone()))?;

        info!("Resolved channel id for {}: {}", handle, channel_id);
        Ok(channel_id)
    }

    /// 直播状態をチェック。配信中でなければNoneを返す
    ///
    /// search.list(eventType=live)の後、videos.listで詳細を確認し、
    /// actualStartTimeがありactualEndTimeのない場合のみ配信中と判定する。
    pub async fn check_live_status(
        &self,
        channel_id: &str,
    ) -> Result<Option<YouTubeStreamData>, YouTubeError> {
        let search_url = format!(
            "https://www.googleapis.com/youtube/v3/search?part=snippet&channelId={}&eventType=live&type=video",
            channel_id
        );
        let search: YouTubeSearchResponse = self.get_json(&search_url).await?;

        let Some(item) = search.items.into_iter().next() else {
            return Ok(None);
        };

        let video_url = format!(
            "https://www.googleapis.com/youtube/v3/videos?part=snippet,liveStreamingDetails&id={}",
            item.id.video_id
        );
        let videos: YouTubeVideoResponse = self.get_json(&video_url).await?;

        let Some(video) = videos.items.into_iter().next() else {
            return Ok(None);
        };

        let Some(details) = video.live_streaming_details else {
            return Ok(None);
        };

        if details.actual_start_time.is_empty() || !details.actual_end_time.is_empty() {
            return Ok(None);
        }

        Ok(Some(YouTubeStreamData {
            id: video.id,
            channel_id: video.snippet.channel_id,
            channel_title: video.snippet.channel_title,
            title: video.snippet.title,
            description: video.snippet.description,
            thumbnail_url: video.snippet.thumbnails.high.url,
            viewer_count: details.concurrent_viewers,
            actual_start_time: details.actual_start_time,
            scheduled_start_time: details.scheduled_start_time,
        }))
    }

    /// チャンネルの直近動画を新しい順で取得
    pub async fn get_recent_videos(
        &self,
        channel_id: &str,
        max_results: u32,
    ) -> Result<Vec<YouTubeVideoItem>, YouTubeError> {
        let max_results = max_results.max(1);

        let search_url = format!(
            "https://www.googleapis.com/youtube/v3/search?part=snippet&channelId={}&order=date&type=video&maxResults={}",
            channel_id, max_results
        );
        let search: YouTubeSearchResponse = self.get_json(&search_url).await?;

        if search.items.is_empty() {
            return Ok(Vec::new());
        }

        let video_ids: Vec<String> = search
            .items
            .iter()
            .map(|item| item.id.video_id.clone())
            .filter(|id| !id.is_empty())
            .collect();

        let video_url = format!(
            "https://www.googleapis.com/youtube/v3/videos?part=snippet,liveStreamingDetails,contentDetails&id={}",
            video_ids.join(",")
        );
        let videos: YouTubeVideoResponse = self.get_json(&video_url).await?;

        debug!(
            "Fetched {} videos for channel {}",
            videos.items.len(),
            channel_id
        );

        Ok(videos.items)
    }

    /// チャンネル情報（タイトル・アイコンURL）を取得
    pub async fn get_channel_info(
        &self,
        channel_id: &str,
    ) -> Result<YouTubeChannelInfo, YouTubeError> {
        let url = format!(
            "https://www.googleapis.com/youtube/v3/channels?part=snippet&id={}",
            channel_id
        );
        let value: serde_json::Value = self.get_json(&url).await?;

        let item = value
            .pointer("/items/0")
            .ok_or_else(|| YouTubeError::ChannelNotFound(channel_id.to_string()))?;

        let thumb = |quality: &str| -> String {
            item.pointer(&format!("/snippet/thumbnails/{}/url", quality))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        // high優先、なければmedium/defaultにフォールバック
        let mut profile_image_url = thumb("high");
        if profile_image_url.is_empty() {
            profile_image_url = thumb("medium");
        }
        if profile_image_url.is_empty() {
            profile_image_url = thumb("default");
        }

        Ok(YouTubeChannelInfo {
            id: item
                .pointer("/id")
                .and_then(|v| v.as_str())
                .unwrap_or(channel_id)
                .to_string(),
            title: item
                .pointer("/snippet/title")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            profile_image_url,
        })
    }
}
