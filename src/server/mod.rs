//! HTTP APIサーバー
//!
//! ルートコンテキスト（各ストア・監視状態・クライアント）への参照を
//! 受け取り、フロントエンド向けのAPIを提供する。

pub mod handlers;

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Notify;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::twitch::TwitchClient;
use crate::api::twitch_gql::TwitchGqlClient;
use crate::config::AppConfig;
use crate::models::twitch::TwitchStatusResponse;
use crate::models::youtube::YouTubeStatusResponse;
use crate::monitor::LiveStateTable;
use crate::store::roster::RosterStore;
use crate::store::ResultStore;

/// ハンドラが参照するルートコンテキスト
///
/// プロセス内に1つずつ存在する依存を束ねる。グローバル変数は持たない。
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub store: Arc<ResultStore>,
    pub roster: Arc<RosterStore>,
    pub twitch_client: Arc<TwitchClient>,
    pub gql: Arc<TwitchGqlClient>,
    pub twitch_states: Arc<LiveStateTable<TwitchStatusResponse>>,
    pub youtube_states: Arc<LiveStateTable<YouTubeStatusResponse>>,
    pub twitch_check_now: Arc<Notify>,
    pub youtube_check_now: Arc<Notify>,
}

pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::health))
        .route("/api/twitch/status", get(handlers::twitch_status_all))
        .route(
            "/api/twitch/status/{streamer_id}",
            get(handlers::twitch_status),
        )
        .route("/api/twitch/check-now", post(handlers::check_now))
        .route(
            "/api/twitch/analysis/{video_id}",
            get(handlers::get_analysis),
        )
        .route("/api/twitch/analysis", get(handlers::list_analyses))
        .route(
            "/api/twitch/analysis-summary",
            get(handlers::analysis_summary),
        )
        .route("/api/twitch/save-chat", post(handlers::save_chat))
        .route(
            "/api/twitch/videos/{streamer_id}",
            get(handlers::list_videos),
        )
        .route("/api/search/twitch", get(handlers::search_twitch))
        .route(
            "/api/streaming/status/{streamer_id}",
            get(handlers::streaming_status),
        )
        .route("/api/streamers", get(handlers::list_streamers))
        .route("/api/streamers/subscribe", post(handlers::subscribe))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
