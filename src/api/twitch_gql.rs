//! Twitch GraphQL (gql.twitch.tv) の匿名クライアント
//!
//! 2つの用途がある:
//! - チャットリプレイの取得（persisted query `VideoCommentsByOffsetOrCursor`）
//! - VOD再生用アクセストークンの取得（クリップ抽出で使用）

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

const GQL_URL: &str = "https://gql.twitch.tv/gql";

/// チャットリプレイ用の公開クライアントID
const CHAT_CLIENT_ID: &str = "kd1unb4b3q4t58fwlpcbzcbnm76a8fp";
/// 再生トークン用の公開クライアントID
const PLAYBACK_CLIENT_ID: &str = "kimne78kx3ncx6brgo4mv6wki5h1ko";

const COMMENTS_OPERATION: &str = "VideoCommentsByOffsetOrCursor";
const COMMENTS_SHA256: &str = "b70a3591ff0f4e0313d126c6a1502d79a1c02baebb288227c582044aa76adf6a";

#[derive(thiserror::Error, Debug)]
pub enum GqlError {
    #[error("Request failed")]
    Request(#[from] reqwest::Error),
    #[error("GQL returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Failed to parse GQL response")]
    Parse(#[from] serde_json::Error),
    #[error("Video not found or deleted: {0}")]
    VideoNotFound(String),
}

// --- チャットリプレイのレスポンス投影 ---

#[derive(Debug, Clone, Deserialize)]
pub struct GqlCommentPage {
    #[serde(default)]
    pub data: GqlCommentData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GqlCommentData {
    #[serde(default)]
    pub video: GqlCommentVideo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GqlCommentVideo {
    #[serde(default)]
    pub comments: GqlComments,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GqlComments {
    #[serde(default)]
    pub edges: Vec<GqlCommentEdge>,
    #[serde(rename = "pageInfo", default)]
    pub page_info: GqlPageInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GqlPageInfo {
    #[serde(rename = "hasNextPage", default)]
    pub has_next_page: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GqlCommentEdge {
    #[serde(default)]
    pub cursor: String,
    pub node: GqlCommentNode,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GqlCommentNode {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
    #[serde(rename = "contentOffsetSeconds", default)]
    pub content_offset_seconds: f64,
    pub commenter: Option<GqlCommenter>,
    #[serde(default)]
    pub message: GqlMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GqlCommenter {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub login: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GqlMessage {
    #[serde(default)]
    pub fragments: Vec<GqlFragment>,
    #[serde(rename = "userBadges", default)]
    pub user_badges: Vec<GqlBadge>,
    #[serde(rename = "userColor", default)]
    pub user_color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GqlFragment {
    #[serde(default)]
    pub text: String,
    pub emote: Option<GqlEmote>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GqlEmote {
    #[serde(rename = "emoteID", default)]
    pub emote_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GqlBadge {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "setID", default)]
    pub set_id: String,
    #[serde(default)]
    pub version: String,
}

/// VOD再生用アクセストークン
#[derive(Debug, Clone)]
pub struct PlaybackAccessToken {
    pub value: String,
    pub signature: String,
    pub title: String,
    pub length_seconds: u64,
    pub owner_name: String,
}

pub struct TwitchGqlClient {
    client: reqwest::Client,
}

impl Default for TwitchGqlClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TwitchGqlClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// チャットリプレイを1ページ取得する
    ///
    /// 最初のページは`content_offset_seconds`、以降は前ページ末尾の
    /// `cursor`で指定する。
    pub async fn fetch_comment_page(
        &self,
        video_id: &str,
        content_offset_seconds: Option<f64>,
        cursor: Option<&str>,
    ) -> Result<GqlCommentPage, GqlError> {
        let variables = match cursor {
            Some(cursor) => json!({
                "videoID": video_id,
                "cursor": cursor,
            }),
            None => json!({
                "videoID": video_id,
                "contentOffsetSeconds": content_offset_seconds.unwrap_or(0.0),
            }),
        };

        let body = json!({
            "operationName": COMMENTS_OPERATION,
            "variables": variables,
            "extensions": {
                "persistedQuery": {
                    "version": 1,
                    "sha256Hash": COMMENTS_SHA256,
                }
            }
        });

        let resp = self
            .client
            .post(GQL_URL)
            .header("Client-ID", CHAT_CLIENT_ID)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(30))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GqlError::Status { status, body });
        }

        Ok(resp.json().await?)
    }

    /// VODの再生アクセストークンと署名を取得する（クリップ抽出の1段目）
    pub async fn fetch_playback_access_token(
        &self,
        video_id: &str,
    ) -> Result<PlaybackAccessToken, GqlError> {
        let query = format!(
            r#"query {{ video(id: "{id}") {{ id title lengthSeconds owner {{ displayName }} }} videoPlaybackAccessToken(id: "{id}", params: {{ platform: "web", playerBackend: "mediaplayer", playerType: "site" }}) {{ value signature }} }}"#,
            id = video_id
        );

        let resp = self
            .client
            .post(GQL_URL)
            .header("Client-ID", PLAYBACK_CLIENT_ID)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(30))
            .json(&json!({ "query": query }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GqlError::Status { status, body });
        }

        let value: serde_json::Value = resp.json().await?;

        let id = value
            .pointer("/data/video/id")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if id.is_empty() {
            return Err(GqlError::VideoNotFound(video_id.to_string()));
        }

        let str_at = |path: &str| -> String {
            value
                .pointer(path)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        Ok(PlaybackAccessToken {
            value: str_at("/data/videoPlaybackAccessToken/value"),
            signature: str_at("/data/videoPlaybackAccessToken/signature"),
            title: str_at("/data/video/title"),
            length_seconds: value
                .pointer("/data/video/lengthSeconds")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            owner_name: str_at("/data/video/owner/displayName"),
        })
    }
}
