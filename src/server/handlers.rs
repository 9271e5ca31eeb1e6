//! HTTP APIハンドラ

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::analysis::{density, AnalysisResult, PeakDetectionParams};
use crate::ingest::{self, ChatDownload};
use crate::models::{Platform, VideoInfo};
use crate::server::AppContext;
use crate::store::roster::StreamerPlatform;

/// APIエラー
///
/// 上流のレスポンス本文や認証情報はそのまま返さない。
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Upstream unavailable: {0}")]
    Upstream(String),
    #[error("Internal error")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ApiError::Internal(detail) => {
                error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "oshiwatch API Server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// --- 直播状態 ---

pub async fn twitch_status_all(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    let statuses = ctx.twitch_states.all_snapshots();
    if statuses.is_empty() {
        return Json(json!({ "message": "Monitor is warming up, try again shortly" }));
    }
    Json(json!({ "streamers": statuses }))
}

pub async fn twitch_status(
    State(ctx): State<AppContext>,
    Path(streamer_id): Path<String>,
) -> Result<Response, ApiError> {
    let streamer_id = streamer_id.to_lowercase();
    let Some(status) = ctx.twitch_states.latest_snapshot(&streamer_id) else {
        return Err(ApiError::NotFound(format!(
            "No status recorded for streamer {}",
            streamer_id
        )));
    };
    Ok(Json(status).into_response())
}

pub async fn check_now(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    ctx.twitch_check_now.notify_one();
    ctx.youtube_check_now.notify_one();
    Json(json!({ "message": "Check triggered, query status shortly" }))
}

pub async fn streaming_status(
    State(ctx): State<AppContext>,
    Path(streamer_id): Path<String>,
) -> Json<serde_json::Value> {
    let streamer_id = streamer_id.trim_start_matches('@').to_lowercase();

    let twitch_status = ctx.twitch_states.latest_snapshot(&streamer_id);
    let twitch_live = twitch_status.as_ref().map(|s| s.is_live).unwrap_or(false);

    let youtube_status = ctx.youtube_states.latest_snapshot(&streamer_id);
    let youtube_live = youtube_status.as_ref().map(|s| s.is_live).unwrap_or(false);

    Json(json!({
        "success": true,
        "streamer_name": streamer_id,
        "is_live": twitch_live || youtube_live,
        "platforms": {
            "twitch": { "is_live": twitch_live, "stream": twitch_status },
            "youtube": { "is_live": youtube_live, "stream": youtube_status },
        }
    }))
}

// --- 分析 ---

#[derive(Debug, Deserialize)]
pub struct AnalysisQuery {
    pub windows_len: Option<usize>,
    pub thr: Option<f64>,
    pub search_range: Option<usize>,
}

impl AnalysisQuery {
    fn params(&self) -> PeakDetectionParams {
        let default = PeakDetectionParams::default();
        PeakDetectionParams {
            windows_len: self.windows_len.unwrap_or(default.windows_len),
            thr: self.thr.unwrap_or(default.thr),
            search_range: self.search_range.unwrap_or(default.search_range),
        }
    }
}

/// 分析結果を返す。パラメータ指定のファイルが無ければチャットログから
/// その場で計算して保存する（チャットログが無ければ404）。
pub async fn get_analysis(
    State(ctx): State<AppContext>,
    Path(video_id): Path<String>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let params = query.params();

    if !ctx.store.analysis_exists(&video_id, &params) {
        let download = ctx.store.read_chat(&video_id).map_err(|_| {
            ApiError::NotFound(format!(
                "No chat log for video {}, ingest it first",
                video_id
            ))
        })?;

        let analysis = density::detect(&download.comments, &params);
        let video_info = download.video_info.clone().unwrap_or_default();

        let result = AnalysisResult {
            video_id: video_id.clone(),
            streamer_name: video_info.user_name.clone(),
            params,
            hot_moments: analysis.hot_moments,
            time_series_data: analysis.time_series_data,
            stats: analysis.stats,
            video_info,
            analyzed_at: Utc::now(),
        };

        ctx.store
            .save_analysis(&result)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
    }

    let mut result = ctx
        .store
        .read_analysis(&video_id, &params)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    // 盛り上がりリストはデフォルトパラメータのものを優先して返す
    let default_params = PeakDetectionParams::default();
    if params != default_params {
        if let Ok(default_result) = ctx.store.read_analysis(&video_id, &default_params) {
            result.hot_moments = default_result.hot_moments;
        }
    }

    Ok(Json(result))
}

pub async fn list_analyses(State(ctx): State<AppContext>) -> Result<Response, ApiError> {
    let results = ctx
        .store
        .list_analyses()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "total": results.len(),
        "results": results,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub video_id: String,
    pub offset_seconds: f64,
}

pub async fn analysis_summary(
    State(ctx): State<AppContext>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (actual_offset, summary) = ctx
        .store
        .closest_summary(&query.video_id, query.offset_seconds)
        .map_err(|_| {
            ApiError::NotFound(format!(
                "No summary found for video {}",
                query.video_id
            ))
        })?;

    Ok(Json(json!({
        "actual_offset": actual_offset,
        "summary": summary,
    })))
}

// --- 手動チャット取り込み ---

#[derive(Debug, Deserialize)]
pub struct SaveChatRequest {
    pub video_id: String,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
}

/// チャットリプレイを取り込んでファイルに保存する（手動トリガー）
pub async fn save_chat(
    State(ctx): State<AppContext>,
    Json(req): Json<SaveChatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.video_id.is_empty() {
        return Err(ApiError::BadRequest("video_id is required".to_string()));
    }

    let comments =
        ingest::twitch::collect_comments(&ctx.gql, &req.video_id, req.start_time, req.end_time)
            .await
            .map_err(|e| ApiError::Upstream(format!("chat ingestion failed: {}", e)))?;

    // 動画メタデータは取得できなくても取り込みは続行する
    let video_info = match ctx.twitch_client.get_video_info(&req.video_id).await {
        Ok(video) => Some(VideoInfo {
            id: video.id,
            title: video.title,
            description: video.description,
            url: video.url,
            user_name: video.user_name,
            user_login: video.user_login,
            duration: video.duration,
            created_at: video.created_at,
        }),
        Err(e) => {
            info!("Video info unavailable for {}: {}", req.video_id, e);
            None
        }
    };

    let download = ChatDownload::new(req.video_id.clone(), comments, video_info);
    let path = ctx
        .store
        .save_chat(&download)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "message": "Chat log saved",
        "filepath": path.to_string_lossy(),
        "total_comments": download.total_comments,
        "video_id": download.video_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct VideoListQuery {
    /// 取得件数（デフォルト20）
    pub first: Option<u32>,
    /// 録画タイプ（archive / highlight / upload / all）
    #[serde(rename = "type")]
    pub video_type: Option<String>,
}

/// 主播の録画リストを返す
pub async fn list_videos(
    State(ctx): State<AppContext>,
    Path(streamer_id): Path<String>,
    Query(query): Query<VideoListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let first = query.first.unwrap_or(20).clamp(1, 100);
    let video_type = query.video_type.unwrap_or_else(|| "archive".to_string());

    let videos = ctx
        .twitch_client
        .get_videos(&streamer_id, &video_type, first)
        .await
        .map_err(|e| ApiError::Upstream(format!("video listing failed: {}", e)))?;

    Ok(Json(json!({
        "streamer_name": streamer_id,
        "total_count": videos.len(),
        "videos": videos,
    })))
}

// --- 主播管理 ---

pub async fn list_streamers(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    let streamers = ctx.roster.snapshot();
    Json(json!({
        "success": true,
        "total": streamers.len(),
        "streamers": streamers,
    }))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SubscribeRequest {
    pub streamer_id: String,
    pub platform: String,
}

/// 主播を購読する（ロースターへの追加・プラットフォーム追記）
pub async fn subscribe(
    State(ctx): State<AppContext>,
    Json(req): Json<SubscribeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(platform) = Platform::parse(&req.platform) else {
        return Err(ApiError::BadRequest(format!(
            "Unsupported platform: {}",
            req.platform
        )));
    };

    let streamer_id = req.streamer_id.trim_start_matches('@').to_lowercase();
    if streamer_id.is_empty() {
        return Err(ApiError::BadRequest("streamer_id is required".to_string()));
    }

    let binding = match platform {
        Platform::Twitch => StreamerPlatform {
            platform: "twitch".to_string(),
            url: format!("https://www.twitch.tv/{}", streamer_id),
        },
        Platform::Youtube => StreamerPlatform {
            platform: "youtube".to_string(),
            url: format!("https://www.youtube.com/@{}", streamer_id),
        },
    };

    let added = if ctx.roster.get(&streamer_id).is_some() {
        ctx.roster.add_platform(&streamer_id, binding)
    } else {
        ctx.roster.add_streamer(&streamer_id, &streamer_id, binding)
    };

    // 新規購読は次の巡回を待たずにチェックさせる
    if added {
        match platform {
            Platform::Twitch => ctx.twitch_check_now.notify_one(),
            Platform::Youtube => ctx.youtube_check_now.notify_one(),
        }
    }

    Ok(Json(json!({
        "success": true,
        "message": "Subscribed. Recent videos will be analyzed in the background; a live broadcast is analyzed after it ends.",
    })))
}

// --- 検索 ---

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

pub async fn search_twitch(
    State(ctx): State<AppContext>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if query.q.is_empty() {
        return Err(ApiError::BadRequest("q is required".to_string()));
    }

    let results = ctx
        .twitch_client
        .search_channels(&query.q)
        .await
        .map_err(|e| ApiError::Upstream(format!("channel search failed: {}", e)))?;

    Ok(Json(json!(results)))
}
