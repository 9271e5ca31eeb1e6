//! YouTubeチャットリプレイの取り込み
//!
//! watchページのHTMLに埋め込まれた`ytInitialData`からcontinuationトークンを
//! 取り出し、`live_chat_replay?continuation=`を辿って全コメントを収集する。
//! スキーマは深くネストし省略も多いため、serde_json::Valueを寛容に歩く。

use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ingest::Comment;

const CONTINUATION_PREFIX: &str = "https://www.youtube.com/live_chat_replay?continuation=";
const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/83.0.4103.116 Safari/537.36";
const RATE_LIMIT_MARKER: &str =
    "Sorry for the interruption. We have been receiving a large volume of requests from your network.";

#[derive(thiserror::Error, Debug)]
pub enum YoutubeChatError {
    #[error("Request failed")]
    Request(#[from] reqwest::Error),
    #[error("Watch page returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("Network rate-limited by YouTube")]
    RateLimited,
    #[error("ytInitialData not found in HTML")]
    InitialDataMissing,
    #[error("Live chat continuation not found")]
    ContinuationMissing,
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// HTMLから`ytInitialData`のJSONを抽出する
///
/// `var ytInitialData = {...};` と `window["ytInitialData"] = {...};` の
/// 両形式に対応する。レート制限の案内ページは明示エラーにする。
pub fn extract_yt_initial_data(html: &str) -> Result<Value, YoutubeChatError> {
    if html.contains(RATE_LIMIT_MARKER) {
        return Err(YoutubeChatError::RateLimited);
    }

    let patterns = [
        r"var ytInitialData\s*=\s*(\{.*?\});",
        r#"window\["ytInitialData"\]\s*=\s*(\{.*?\});"#,
    ];

    for pattern in patterns {
        let re = Regex::new(&format!("(?s){}", pattern)).unwrap();
        if let Some(captures) = re.captures(html) {
            if let Some(m) = captures.get(1) {
                if let Ok(value) = serde_json::from_str::<Value>(m.as_str()) {
                    return Ok(value);
                }
            }
        }
    }

    Err(YoutubeChatError::InitialDataMissing)
}

/// watchページの`ytInitialData`からリプレイのcontinuationトークンを取り出す
pub fn extract_replay_continuation(initial_data: &Value) -> Result<String, YoutubeChatError> {
    initial_data
        .pointer(
            "/contents/twoColumnWatchNextResults/conversationBar/liveChatRenderer/continuations/0/reloadContinuationData/continuation",
        )
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or(YoutubeChatError::ContinuationMissing)
}

/// リプレイページの`ytInitialData`から次のcontinuationを取り出す
fn next_continuation(initial_data: &Value) -> Option<String> {
    initial_data
        .pointer(
            "/continuationContents/liveChatContinuation/continuations/0/liveChatReplayContinuationData/continuation",
        )
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// `HH:MM:SS` / `MM:SS` / `SS` 形式のタイムスタンプを秒数に変換する
pub fn timestamp_to_seconds(timestamp: &str) -> Result<f64, YoutubeChatError> {
    let timestamp = timestamp.trim();
    if timestamp.is_empty() {
        return Err(YoutubeChatError::InvalidTimestamp(timestamp.to_string()));
    }

    let parts: Vec<&str> = timestamp.split(':').collect();
    let parse = |s: &str| -> Result<f64, YoutubeChatError> {
        s.trim()
            .replace(',', "")
            .parse::<f64>()
            .map_err(|_| YoutubeChatError::InvalidTimestamp(timestamp.to_string()))
    };

    match parts.as_slice() {
        [secs] => parse(secs),
        [mins, secs] => Ok(parse(mins)? * 60.0 + parse(secs)?),
        [hours, mins, secs] => Ok(parse(hours)? * 3600.0 + parse(mins)? * 60.0 + parse(secs)?),
        _ => Err(YoutubeChatError::InvalidTimestamp(timestamp.to_string())),
    }
}

/// message.runs / simpleText からメッセージ本文を組み立てる
///
/// カスタム絵文字はショートカット表記、標準絵文字はemojiIdをそのまま使う。
pub fn extract_message(message: Option<&Value>) -> String {
    let Some(message) = message else {
        return String::new();
    };

    if let Some(simple) = message.get("simpleText").and_then(|v| v.as_str()) {
        return simple.to_string();
    }

    let Some(runs) = message.get("runs").and_then(|v| v.as_array()) else {
        return String::new();
    };

    let mut content = String::new();
    for run in runs {
        if let Some(text) = run.get("text").and_then(|v| v.as_str()) {
            content.push_str(text);
        }

        if let Some(emoji) = run.get("emoji") {
            let is_custom = emoji
                .get("isCustomEmoji")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            if is_custom {
                if let Some(shortcut) = emoji
                    .pointer("/shortcuts/0")
                    .and_then(|v| v.as_str())
                {
                    content.push_str(shortcut);
                }
            } else if let Some(emoji_id) = emoji.get("emojiId").and_then(|v| v.as_str()) {
                content.push_str(emoji_id);
            }
        }
    }

    content
}

/// 1件のチャットレンダラーを正規化コメントに変換する
///
/// タイムスタンプに"-"を含むもの（リプレイ前のコメント）はNoneで捨てる。
fn convert_chat_item(renderer: &Value, video_id: &str) -> Option<Comment> {
    let timestamp = renderer
        .pointer("/timestampText/simpleText")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    if timestamp.contains('-') {
        return None;
    }

    let offset_seconds = timestamp_to_seconds(&timestamp).unwrap_or(0.0);

    let author = renderer
        .pointer("/authorName/simpleText")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let id = renderer
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let body = extract_message(renderer.get("message"));

    Some(Comment {
        id,
        created_at: timestamp,
        content_offset_seconds: offset_seconds,
        content_id: video_id.to_string(),
        commenter: crate::ingest::Commenter {
            id: String::new(),
            display_name: author.clone(),
            name: author,
        },
        message: crate::ingest::Message {
            body,
            fragments: Vec::new(),
            user_color: None,
            user_badges: Vec::new(),
        },
        chat_no: None,
    })
}

/// リプレイページの`ytInitialData`からコメントを取り出す
///
/// `actions[*].replayChatItemAction.actions[0].addChatItemAction.item` を
/// 歩き、テキストメッセージとスーパーチャットのみ収集する。
pub fn extract_page_comments(initial_data: &Value, video_id: &str) -> Vec<Comment> {
    let Some(actions) = initial_data
        .pointer("/continuationContents/liveChatContinuation/actions")
        .and_then(|v| v.as_array())
    else {
        return Vec::new();
    };

    let mut comments = Vec::new();

    for action in actions {
        let Some(item) = action.pointer("/replayChatItemAction/actions/0/addChatItemAction/item")
        else {
            continue;
        };

        let renderer = item
            .get("liveChatTextMessageRenderer")
            .or_else(|| item.get("liveChatPaidMessageRenderer"));

        if let Some(renderer) = renderer {
            if let Some(comment) = convert_chat_item(renderer, video_id) {
                comments.push(comment);
            }
        }
    }

    comments
}

pub struct YoutubeChatIngestor {
    client: reqwest::Client,
}

impl Default for YoutubeChatIngestor {
    fn default() -> Self {
        Self::new()
    }
}

impl YoutubeChatIngestor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_html(&self, url: &str) -> Result<String, YoutubeChatError> {
        let resp = self
            .client
            .get(url)
            .header("User-Agent", BROWSER_UA)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(YoutubeChatError::Status(resp.status()));
        }

        Ok(resp.text().await?)
    }

    /// 1つの動画の全チャットを取り込む
    ///
    /// continuationが尽きるかページ上限に達するまで辿る。連番
    /// （"00001"…）を付与し、offset順はページ順のまま保つ。
    pub async fn collect_comments(
        &self,
        video_id: &str,
        page_count_limit: usize,
    ) -> Result<Vec<Comment>, YoutubeChatError> {
        let watch_url = format!("https://www.youtube.com/watch?v={}", video_id);
        let html = self.fetch_html(&watch_url).await?;

        let initial_data = extract_yt_initial_data(&html)?;
        let mut continuation = extract_replay_continuation(&initial_data)?;

        let mut result: Vec<Comment> = Vec::new();
        let mut count = 1_usize;
        let mut page_count = 1_usize;

        while page_count < page_count_limit {
            if continuation.is_empty() {
                debug!("Continuation exhausted, reached the last chat segment");
                break;
            }

            let url = format!("{}{}", CONTINUATION_PREFIX, continuation);
            let html = self.fetch_html(&url).await?;

            let page_data = match extract_yt_initial_data(&html) {
                Ok(data) => data,
                Err(YoutubeChatError::RateLimited) => return Err(YoutubeChatError::RateLimited),
                Err(e) => {
                    warn!("Failed to extract ytInitialData from replay page: {}", e);
                    break;
                }
            };

            let page_comments = extract_page_comments(&page_data, video_id);
            if page_comments.is_empty()
                && page_data
                    .pointer("/continuationContents/liveChatContinuation")
                    .is_none()
            {
                break;
            }

            for mut comment in page_comments {
                comment.chat_no = Some(format!("{:05}", count));
                result.push(comment);
                count += 1;
            }

            continuation = next_continuation(&page_data).unwrap_or_default();

            debug!(
                "Fetched page {}, total comments: {}",
                page_count,
                result.len()
            );
            page_count += 1;

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        info!(
            "YouTube chat replay complete for {}: {} comments over {} pages",
            video_id,
            result.len(),
            page_count
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_to_seconds() {
        assert_eq!(timestamp_to_seconds("30").unwrap(), 30.0);
        assert_eq!(timestamp_to_seconds("1:30").unwrap(), 90.0);
        assert_eq!(timestamp_to_seconds("1:30:45").unwrap(), 5445.0);
        assert_eq!(timestamp_to_seconds("0:05").unwrap(), 5.0);
        assert!(timestamp_to_seconds("").is_err());
        assert!(timestamp_to_seconds("1:2:3:4").is_err());
    }

    #[test]
    fn test_extract_yt_initial_data_var_form() {
        let html = r#"<html><script>var ytInitialData = {"contents": {"ok": true}};</script></html>"#;
        let data = extract_yt_initial_data(html).unwrap();
        assert_eq!(data.pointer("/contents/ok"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_extract_yt_initial_data_window_form() {
        let html = r#"<script>window["ytInitialData"] = {"a": 1};</script>"#;
        let data = extract_yt_initial_data(html).unwrap();
        assert_eq!(data.pointer("/a"), Some(&Value::from(1)));
    }

    #[test]
    fn test_extract_yt_initial_data_missing() {
        match extract_yt_initial_data("<html>nothing here</html>") {
            Err(YoutubeChatError::InitialDataMissing) => {}
            other => panic!("Expected InitialDataMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_yt_initial_data_rate_limited() {
        let html = format!("<html>{}</html>", RATE_LIMIT_MARKER);
        match extract_yt_initial_data(&html) {
            Err(YoutubeChatError::RateLimited) => {}
            other => panic!("Expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_replay_continuation() {
        let data: Value = serde_json::json!({
            "contents": {
                "twoColumnWatchNextResults": {
                    "conversationBar": {
                        "liveChatRenderer": {
                            "continuations": [
                                {"reloadContinuationData": {"continuation": "tok123"}}
                            ]
                        }
                    }
                }
            }
        });

        assert_eq!(extract_replay_continuation(&data).unwrap(), "tok123");
        assert!(extract_replay_continuation(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_extract_message_runs_with_emoji() {
        let message = serde_json::json!({
            "runs": [
                {"text": "nice "},
                {"emoji": {"isCustomEmoji": true, "shortcuts": [":lumi_wave:"]}},
                {"emoji": {"isCustomEmoji": false, "emojiId": "😀"}}
            ]
        });

        assert_eq!(extract_message(Some(&message)), "nice :lumi_wave:😀");
    }

    #[test]
    fn test_extract_message_simple_text() {
        let message = serde_json::json!({"simpleText": "hello"});
        assert_eq!(extract_message(Some(&message)), "hello");
        assert_eq!(extract_message(None), "");
    }

    #[test]
    fn test_extract_page_comments_discards_negative_timestamps() {
        let data: Value = serde_json::json!({
            "continuationContents": {
                "liveChatContinuation": {
                    "actions": [
                        {
                            "replayChatItemAction": {
                                "actions": [{
                                    "addChatItemAction": {
                                        "item": {
                                            "liveChatTextMessageRenderer": {
                                                "id": "a",
                                                "timestampText": {"simpleText": "1:00"},
                                                "authorName": {"simpleText": "Lumi"},
                                                "message": {"runs": [{"text": "hi"}]}
                                            }
                                        }
                                    }
                                }]
                            }
                        },
                        {
                            "replayChatItemAction": {
                                "actions": [{
                                    "addChatItemAction": {
                                        "item": {
                                            "liveChatTextMessageRenderer": {
                                                "id": "b",
                                                "timestampText": {"simpleText": "-0:15"},
                                                "authorName": {"simpleText": "Early"},
                                                "message": {"runs": [{"text": "pre"}]}
                                            }
                                        }
                                    }
                                }]
                            }
                        }
                    ]
                }
            }
        });

        let comments = extract_page_comments(&data, "vid1");
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].id, "a");
        assert_eq!(comments[0].content_offset_seconds, 60.0);
        assert_eq!(comments[0].message.body, "hi");
        assert_eq!(comments[0].commenter.display_name, "Lumi");
    }
}
