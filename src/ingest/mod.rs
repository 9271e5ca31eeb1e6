//! チャットリプレイの取り込みと正規化コメントモデル

pub mod twitch;
pub mod youtube;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::VideoInfo;

/// コメント投稿者
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Commenter {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub name: String,
}

/// メッセージの断片（テキストまたはエモート）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageFragment {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub emote_id: Option<String>,
}

/// バッジ情報
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub version: String,
}

/// 正規化されたメッセージ本体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    /// 断片を連結した本文（エモートはショートカット表記）
    pub body: String,
    #[serde(default)]
    pub fragments: Vec<MessageFragment>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_color: Option<String>,
    #[serde(default)]
    pub user_badges: Vec<Badge>,
}

/// 1件の正規化コメント
///
/// offset_secondsは配信開始からの秒数で非負。同一動画のコメント集合は
/// offset昇順（同値は上流カーソル順）で並ぶ。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub created_at: String,
    pub content_offset_seconds: f64,
    #[serde(default)]
    pub content_id: String,
    #[serde(default)]
    pub commenter: Commenter,
    #[serde(default)]
    pub message: Message,
    /// YouTube専用: 表示用連番（"00001"…）
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub chat_no: Option<String>,
}

/// 1つの動画のチャット取り込み結果（ファイルに保存される形）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDownload {
    pub video_id: String,
    pub total_comments: usize,
    pub comments: Vec<Comment>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub video_info: Option<VideoInfo>,
    pub downloaded_at: DateTime<Utc>,
}

impl ChatDownload {
    pub fn new(video_id: String, comments: Vec<Comment>, video_info: Option<VideoInfo>) -> Self {
        Self {
            video_id,
            total_comments: comments.len(),
            comments,
            video_info,
            downloaded_at: Utc::now(),
        }
    }
}
