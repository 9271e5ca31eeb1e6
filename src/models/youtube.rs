//! YouTube Data API v3レスポンスの型定義
//!
//! 実際のレスポンスは深くネストされているため、必要なフィールドだけを
//! 投影した最小限の型にしている。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YouTubeSearchItemId {
    #[serde(rename = "videoId", default)]
    pub video_id: String,
    #[serde(rename = "channelId", default)]
    pub channel_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YouTubeThumbnail {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YouTubeThumbnails {
    #[serde(default)]
    pub high: YouTubeThumbnail,
    #[serde(default)]
    pub medium: YouTubeThumbnail,
    #[serde(default)]
    pub default: YouTubeThumbnail,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YouTubeSnippet {
    #[serde(rename = "channelId", default)]
    pub channel_id: String,
    #[serde(rename = "channelTitle", default)]
    pub channel_title: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnails: YouTubeThumbnails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YouTubeSearchItem {
    pub id: YouTubeSearchItemId,
    #[serde(default)]
    pub snippet: YouTubeSnippet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YouTubeSearchResponse {
    #[serde(default)]
    pub items: Vec<YouTubeSearchItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YouTubeLiveStreamingDetails {
    #[serde(rename = "actualStartTime", default)]
    pub actual_start_time: String,
    #[serde(rename = "actualEndTime", default)]
    pub actual_end_time: String,
    #[serde(rename = "scheduledStartTime", default)]
    pub scheduled_start_time: String,
    #[serde(rename = "concurrentViewers", default)]
    pub concurrent_viewers: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YouTubeContentDetails {
    #[serde(default)]
    pub duration: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YouTubeVideoItem {
    pub id: String,
    #[serde(default)]
    pub snippet: YouTubeSnippet,
    #[serde(rename = "liveStreamingDetails")]
    pub live_streaming_details: Option<YouTubeLiveStreamingDetails>,
    #[serde(rename = "contentDetails")]
    pub content_details: Option<YouTubeContentDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YouTubeVideoResponse {
    #[serde(default)]
    pub items: Vec<YouTubeVideoItem>,
}

/// 配信中ストリームの正規化データ
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YouTubeStreamData {
    pub id: String,
    pub channel_id: String,
    pub channel_title: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub viewer_count: String,
    #[serde(default)]
    pub actual_start_time: String,
    #[serde(default)]
    pub scheduled_start_time: String,
}

/// チャンネル情報（channels.list）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YouTubeChannelInfo {
    pub id: String,
    pub title: String,
    pub profile_image_url: String,
}

/// 直播状態のスナップショット（HTTP APIで返す形）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeStatusResponse {
    pub is_live: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_data: Option<YouTubeStreamData>,
    pub checked_at: String,
    pub channel_title: String,
}
