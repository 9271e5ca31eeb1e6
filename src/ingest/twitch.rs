//! Twitchチャットリプレイの取り込み
//!
//! persisted query `VideoCommentsByOffsetOrCursor` をカーソルで辿り、
//! 全コメントを正規化して返す。ページ間は100ms以上空ける。

use std::time::Duration;

use tracing::{debug, info};

use crate::api::twitch_gql::{GqlCommentNode, GqlError, TwitchGqlClient};
use crate::ingest::{Badge, Comment, Commenter, Message, MessageFragment};

/// 1つのVODの全チャットを取り込む
///
/// `start_time`は最初のページのオフセット指定と下限フィルタ、
/// `end_time`は上限フィルタを兼ねる。上限を超えたらそれ以降の
/// ページ取得を打ち切る。
pub async fn collect_comments(
    gql: &TwitchGqlClient,
    video_id: &str,
    start_time: Option<f64>,
    end_time: Option<f64>,
) -> Result<Vec<Comment>, GqlError> {
    let mut all_comments = Vec::new();
    let mut cursor: Option<String> = None;
    let mut has_next_page = true;
    let mut is_first_request = true;

    info!("Collecting chat replay for video {}", video_id);

    while has_next_page {
        let page = if is_first_request {
            is_first_request = false;
            fetch_page_with_backoff(gql, video_id, start_time.or(Some(0.0)), None).await?
        } else {
            fetch_page_with_backoff(gql, video_id, None, cursor.as_deref()).await?
        };

        let edges = page.data.video.comments.edges;
        if edges.is_empty() {
            debug!("No more comment edges, cursor: {:?}", cursor);
            break;
        }

        for edge in &edges {
            let node = &edge.node;

            if let Some(end) = end_time {
                if node.content_offset_seconds > end {
                    has_next_page = false;
                    break;
                }
            }

            if let Some(start) = start_time {
                if node.content_offset_seconds < start {
                    continue;
                }
            }

            all_comments.push(normalize_comment(node, video_id));
            cursor = Some(edge.cursor.clone());
        }

        debug!(
            "Fetched {} edges, total comments: {}",
            edges.len(),
            all_comments.len()
        );

        has_next_page = has_next_page && page.data.video.comments.page_info.has_next_page;

        // レート配慮
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    info!(
        "Chat replay complete for {}: {} comments",
        video_id,
        all_comments.len()
    );

    Ok(all_comments)
}

/// レート制限（429）だけ指数バックオフで再試行するページ取得
///
/// 合計待ち時間がページタイムアウト相当（約30秒）を超えたら諦める。
async fn fetch_page_with_backoff(
    gql: &TwitchGqlClient,
    video_id: &str,
    content_offset_seconds: Option<f64>,
    cursor: Option<&str>,
) -> Result<crate::api::twitch_gql::GqlCommentPage, GqlError> {
    let mut delay = Duration::from_millis(500);
    let mut waited = Duration::ZERO;

    loop {
        match gql
            .fetch_comment_page(video_id, content_offset_seconds, cursor)
            .await
        {
            Err(GqlError::Status { status, .. })
                if status.as_u16() == 429 && waited + delay <= Duration::from_secs(30) =>
            {
                debug!("Twitch rate limited, retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
                waited += delay;
                delay *= 2;
            }
            other => return other,
        }
    }
}

/// GraphQLノードを正規化コメントに変換
fn normalize_comment(node: &GqlCommentNode, video_id: &str) -> Comment {
    let mut body = String::new();
    let mut fragments = Vec::new();

    for frag in &node.message.fragments {
        body.push_str(&frag.text);
        fragments.push(MessageFragment {
            text: frag.text.clone(),
            emote_id: frag.emote.as_ref().map(|e| e.emote_id.clone()),
        });
    }

    let user_badges = node
        .message
        .user_badges
        .iter()
        .map(|b| Badge {
            id: b.set_id.clone(),
            version: b.version.clone(),
        })
        .collect();

    let commenter = node
        .commenter
        .as_ref()
        .map(|c| Commenter {
            id: c.id.clone(),
            display_name: c.display_name.clone(),
            name: c.login.clone(),
        })
        .unwrap_or_default();

    Comment {
        id: node.id.clone(),
        created_at: node.created_at.clone(),
        content_offset_seconds: node.content_offset_seconds,
        content_id: video_id.to_string(),
        commenter,
        message: Message {
            body,
            fragments,
            user_color: node.message.user_color.clone(),
            user_badges,
        },
        chat_no: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::twitch_gql::{GqlBadge, GqlCommenter, GqlEmote, GqlFragment, GqlMessage};

    #[test]
    fn test_normalize_comment_concatenates_fragments() {
        let node = GqlCommentNode {
            id: "c1".to_string(),
            created_at: "2025-01-01T00:00:00Z".to_string(),
            content_offset_seconds: 42.5,
            commenter: Some(GqlCommenter {
                id: "9".to_string(),
                login: "lumi".to_string(),
                display_name: "Lumi".to_string(),
            }),
            message: GqlMessage {
                fragments: vec![
                    GqlFragment {
                        text: "hello ".to_string(),
                        emote: None,
                    },
                    GqlFragment {
                        text: "Kappa".to_string(),
                        emote: Some(GqlEmote {
                            emote_id: "25".to_string(),
                        }),
                    },
                ],
                user_badges: vec![GqlBadge {
                    id: "b".to_string(),
                    set_id: "subscriber".to_string(),
                    version: "12".to_string(),
                }],
                user_color: Some("#FF0000".to_string()),
            },
        };

        let comment = normalize_comment(&node, "v123");

        assert_eq!(comment.message.body, "hello Kappa");
        assert_eq!(comment.message.fragments.len(), 2);
        assert_eq!(
            comment.message.fragments[1].emote_id.as_deref(),
            Some("25")
        );
        assert_eq!(comment.message.user_badges[0].id, "subscriber");
        assert_eq!(comment.commenter.name, "lumi");
        assert_eq!(comment.content_id, "v123");
        assert_eq!(comment.content_offset_seconds, 42.5);
    }

    #[test]
    fn test_normalize_comment_without_commenter() {
        let node = GqlCommentNode {
            id: "c2".to_string(),
            content_offset_seconds: 1.0,
            ..Default::default()
        };

        let comment = normalize_comment(&node, "v123");
        assert!(comment.commenter.name.is_empty());
        assert!(comment.message.body.is_empty());
    }
}
