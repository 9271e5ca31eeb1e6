use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use oshiwatch::api::credentials::{TwitchTokenBroker, YouTubeKeyPool};
use oshiwatch::api::twitch::TwitchClient;
use oshiwatch::api::twitch_gql::TwitchGqlClient;
use oshiwatch::api::youtube::YouTubeClient;
use oshiwatch::config::ConfigManager;
use oshiwatch::monitor::supervisor::PipelineSupervisor;
use oshiwatch::monitor::twitch::TwitchMonitor;
use oshiwatch::monitor::youtube::YouTubeMonitor;
use oshiwatch::monitor::LiveStateTable;
use oshiwatch::server::{build_router, AppContext};
use oshiwatch::store::roster::RosterStore;
use oshiwatch::store::ResultStore;
use oshiwatch::summary::create_provider;
use tokio::sync::{mpsc, watch, Notify};
use tracing_subscriber::EnvFilter;

/// CLI引数の定義
#[derive(Parser, Debug)]
#[command(name = "oshiwatch")]
#[command(about = "VTuber livestream observability pipeline")]
#[command(version)]
struct Args {
    /// 設定ファイルのパスを指定（省略時はXDG設定ディレクトリ）
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// ログレベルを指定 (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// 監視を行わずHTTP APIのみ起動する
    #[arg(long)]
    api_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 設定読み込み
    let config_manager = match &args.config {
        Some(path) => ConfigManager::with_path(path.clone())?,
        None => ConfigManager::new()?,
    };
    let config = config_manager.load_config().unwrap_or_else(|e| {
        eprintln!("Config load error, using defaults: {}", e);
        oshiwatch::AppConfig::default()
    });

    // ログ初期化（CLI引数が設定より優先）
    let log_level = args.log_level.clone().unwrap_or(config.log.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    tracing::info!("🎬 Starting oshiwatch - VTuber livestream observability");

    // ルートコンテキストの構築。各依存はプロセス内に1つずつ
    let store = Arc::new(ResultStore::new(config.storage.data_dir.clone()));
    let roster = Arc::new(RosterStore::load(store.roster_path())?);

    let twitch_broker = Arc::new(TwitchTokenBroker::new(
        config.twitch.client_id.clone(),
        config.twitch.client_secret.clone(),
    ));
    let twitch_client = Arc::new(TwitchClient::new(twitch_broker));

    let youtube_pool = Arc::new(YouTubeKeyPool::new(
        config.youtube.api_keys.clone(),
        config.youtube.referer.clone(),
    ));
    let youtube_client = Arc::new(YouTubeClient::new(youtube_pool));

    let twitch_states = Arc::new(LiveStateTable::new());
    let youtube_states = Arc::new(LiveStateTable::new());

    let twitch_check_now = Arc::new(Notify::new());
    let youtube_check_now = Arc::new(Notify::new());

    // 停止シグナル。全タスクのスリープがこれを監視する
    let (stop_tx, stop_rx) = watch::channel(false);

    // ウォッチャー → スーパーバイザの一方向イベントチャネル
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let mut tasks = Vec::new();

    if !args.api_only {
        let twitch_monitor = Arc::new(TwitchMonitor::new(
            config.twitch.clone(),
            twitch_client.clone(),
            roster.clone(),
            twitch_states.clone(),
            event_tx.clone(),
            twitch_check_now.clone(),
        ));
        let youtube_monitor = Arc::new(YouTubeMonitor::new(
            config.youtube.clone(),
            youtube_client.clone(),
            roster.clone(),
            youtube_states.clone(),
            event_tx.clone(),
            youtube_check_now.clone(),
        ));

        let supervisor = Arc::new(PipelineSupervisor::new(
            config.clone(),
            twitch_client.clone(),
            youtube_client.clone(),
            create_provider(&config),
            store.clone(),
            roster.clone(),
            twitch_states.clone(),
            youtube_states.clone(),
            // 外部サブスクリプションRPCは別途束ねる。rpc.addressが
            // 空ならコアは通知とリーパーを省いて動く。
            None,
        ));

        {
            let monitor = twitch_monitor.clone();
            let stop = stop_rx.clone();
            tasks.push(tokio::spawn(async move { monitor.run(stop).await }));
        }
        {
            let monitor = youtube_monitor.clone();
            let stop = stop_rx.clone();
            tasks.push(tokio::spawn(async move { monitor.run(stop).await }));
        }
        {
            let supervisor = supervisor.clone();
            let stop = stop_rx.clone();
            tasks.push(tokio::spawn(
                async move { supervisor.run(event_rx, stop).await },
            ));
        }
        {
            let supervisor = supervisor.clone();
            let stop = stop_rx.clone();
            tasks.push(tokio::spawn(async move { supervisor.run_reaper(stop).await }));
        }
        {
            let roster = roster.clone();
            let stop = stop_rx.clone();
            tasks.push(tokio::spawn(async move { roster.run_persister(stop).await }));
        }
    } else {
        tracing::info!("Running in API-only mode, monitors disabled");
    }

    // HTTP APIサーバー
    let ctx = AppContext {
        config: Arc::new(config.clone()),
        store: store.clone(),
        roster: roster.clone(),
        twitch_client,
        gql: Arc::new(TwitchGqlClient::new()),
        twitch_states,
        youtube_states,
        twitch_check_now,
        youtube_check_now,
    };
    let router = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("🌐 HTTP API listening on {}", config.server.bind);

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("🛑 Shutdown signal received");
    });

    server.await?;

    // 停止を通知し、パーシスタの最終フラッシュを待つ
    let _ = stop_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("👋 oshiwatch shutting down");
    Ok(())
}
