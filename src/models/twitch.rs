//! Twitch Helix APIレスポンスの型定義

use serde::{Deserialize, Serialize};

/// 配信中ストリームのデータ（helix/streams）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwitchStreamData {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(rename = "type", default)]
    pub stream_type: String,
    pub title: String,
    pub viewer_count: u64,
    pub started_at: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub thumbnail_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitchStreamResponse {
    pub data: Vec<TwitchStreamData>,
}

/// OAuthトークンレスポンス（oauth2/token）
#[derive(Debug, Clone, Deserialize)]
pub struct TwitchTokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: String,
}

/// 録画データ（helix/videos）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwitchVideoData {
    pub id: String,
    #[serde(default)]
    pub stream_id: Option<String>,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub created_at: String,
    #[serde(default)]
    pub published_at: String,
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub view_count: u64,
    #[serde(rename = "type", default)]
    pub video_type: String,
    pub duration: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwitchPagination {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitchVideoResponse {
    pub data: Vec<TwitchVideoData>,
    #[serde(default)]
    pub pagination: TwitchPagination,
}

/// ユーザーデータ（helix/users）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwitchUserData {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub broadcaster_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub profile_image_url: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitchUserResponse {
    pub data: Vec<TwitchUserData>,
}

/// チャンネル検索結果（helix/search/channels）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchChannelSearchData {
    pub id: String,
    pub broadcaster_login: String,
    pub display_name: String,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub thumbnail_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitchChannelSearchResponse {
    pub data: Vec<TwitchChannelSearchData>,
}

/// 直播状態のスナップショット（HTTP APIで返す形）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchStatusResponse {
    pub is_live: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_data: Option<TwitchStreamData>,
    pub checked_at: String,
    pub streamer_name: String,
}
