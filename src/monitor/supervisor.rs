//! 配信後処理のスーパーバイザ
//!
//! BroadcastEndedを受け取り、録画の発見 → チャット取り込み → 盛り上がり
//! 検出 → クリップ抽出 → AI要約を1配信ずつ順に実行する。chat_logsの
//! ファイル存在チェックが冪等性の唯一の判定源で、処理済み配信は
//! 取り込み前にスキップされる。エラーはすべて局所的に処理する:
//! 1つのクリップの失敗は配信を、1つの配信の失敗は主播を失敗させない。

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::analysis::{density, AnalysisResult, HotMoment, PeakDetectionParams};
use crate::api::twitch::TwitchClient;
use crate::api::twitch_gql::TwitchGqlClient;
use crate::api::youtube::YouTubeClient;
use crate::clip::{clean_temp_files, ClipExtractor, ClipRequest};
use crate::config::AppConfig;
use crate::ingest::{self, ChatDownload};
use crate::models::twitch::TwitchStatusResponse;
use crate::models::youtube::YouTubeStatusResponse;
use crate::models::{Platform, VideoInfo};
use crate::monitor::{BroadcastEnded, LiveStateTable};
use crate::rpc::SubscriptionService;
use crate::store::roster::{RosterStore, StreamerInfo};
use crate::store::ResultStore;
use crate::summary::AiProvider;

/// クリップの公称長（秒）。密度ウィンドウと揃えている
const CLIP_INTERVAL_SECONDS: f64 = 420.0;
/// クリップのデフォルト画質
const CLIP_QUALITY: &str = "720p";
/// 配信間の待機
const BROADCAST_PACING: Duration = Duration::from_secs(2);
/// クリップ間の待機
const CLIP_PACING: Duration = Duration::from_secs(10);

pub struct PipelineSupervisor {
    config: AppConfig,
    twitch: Arc<TwitchClient>,
    youtube: Arc<YouTubeClient>,
    gql: TwitchGqlClient,
    youtube_chat: ingest::youtube::YoutubeChatIngestor,
    extractor: ClipExtractor,
    ai: Box<dyn AiProvider>,
    store: Arc<ResultStore>,
    roster: Arc<RosterStore>,
    twitch_states: Arc<LiveStateTable<TwitchStatusResponse>>,
    youtube_states: Arc<LiveStateTable<YouTubeStatusResponse>>,
    subscriptions: Option<Arc<dyn SubscriptionService>>,
}

impl PipelineSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AppConfig,
        twitch: Arc<TwitchClient>,
        youtube: Arc<YouTubeClient>,
        ai: Box<dyn AiProvider>,
        store: Arc<ResultStore>,
        roster: Arc<RosterStore>,
        twitch_states: Arc<LiveStateTable<TwitchStatusResponse>>,
        youtube_states: Arc<LiveStateTable<YouTubeStatusResponse>>,
        subscriptions: Option<Arc<dyn SubscriptionService>>,
    ) -> Self {
        Self {
            config,
            twitch,
            youtube,
            gql: TwitchGqlClient::new(),
            youtube_chat: ingest::youtube::YoutubeChatIngestor::new(),
            extractor: ClipExtractor::new(),
            ai,
            store,
            roster,
            twitch_states,
            youtube_states,
            subscriptions,
        }
    }

    /// イベントループ。配信をまたぐ処理は直列で、外部APIの並列度を抑える
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<BroadcastEnded>,
        mut stop: watch::Receiver<bool>,
    ) {
        info!("📦 Pipeline supervisor started");

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("Event channel closed, supervisor exiting");
                        return;
                    };
                    self.handle_broadcast_ended(event).await;
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("Pipeline supervisor stopped");
                        return;
                    }
                }
            }
        }
    }

    async fn handle_broadcast_ended(&self, event: BroadcastEnded) {
        info!(
            "Processing broadcast end: {} on {}",
            event.streamer.name, event.platform
        );

        match event.platform {
            Platform::Twitch => self.process_twitch_streamer(&event.streamer).await,
            Platform::Youtube => self.process_youtube_streamer(&event.streamer).await,
        }
    }

    // --- Twitch ---

    /// 主播の直近録画を確認し、未処理のものを取り込んで分析する
    pub async fn process_twitch_streamer(&self, streamer: &StreamerInfo) {
        let Some(handle) = streamer.handle_for(Platform::Twitch) else {
            warn!("Streamer {} has no Twitch binding", streamer.name);
            return;
        };

        let videos = match self
            .twitch
            .get_videos(&handle, "archive", self.config.twitch.fetch_vod_count)
            .await
        {
            Ok(videos) => videos,
            Err(e) => {
                error!("Failed to list videos for {}: {}", handle, e);
                return;
            }
        };

        if videos.is_empty() {
            info!("No archived videos found for {}", handle);
            return;
        }

        let mut new_results = Vec::new();

        for video in &videos {
            // 冪等性チェック: チャットログがあれば処理済み
            if self.store.chat_log_exists(&video.id) {
                info!("Skipping already processed video: {} ({})", video.id, video.title);
                continue;
            }

            info!("Ingesting chat for video {}: {}", video.id, video.title);

            let comments = match ingest::twitch::collect_comments(&self.gql, &video.id, None, None)
                .await
            {
                Ok(comments) => comments,
                Err(e) => {
                    error!("Chat ingestion failed for {}: {}", video.id, e);
                    continue;
                }
            };

            let video_info = VideoInfo {
                id: video.id.clone(),
                title: video.title.clone(),
                description: video.description.clone(),
                url: video.url.clone(),
                user_name: video.user_name.clone(),
                user_login: video.user_login.clone(),
                duration: video.duration.clone(),
                created_at: video.created_at.clone(),
            };

            let download =
                ChatDownload::new(video.id.clone(), comments, Some(video_info.clone()));

            if let Err(e) = self.store.save_chat(&download) {
                error!("Failed to save chat log for {}: {}", video.id, e);
                continue;
            }

            let result = self.analyze_and_save(&download, &video.user_name, video_info);

            self.notify_vod(
                &video.user_login,
                &video.title,
                "Twitch",
                &video.duration,
                &video.id,
            )
            .await;

            if let Some(result) = result {
                info!(
                    "📊 Analysis complete for {}: {} hot moments",
                    result.video_id,
                    result.hot_moments.len()
                );
                new_results.push(result);
            }

            tokio::time::sleep(BROADCAST_PACING).await;
        }

        for result in &new_results {
            self.process_hot_clips(&result.video_id, &result.hot_moments)
                .await;
        }
    }

    /// 分析を実行して保存する。検出は純粋関数なのでこのタスク内で同期実行
    fn analyze_and_save(
        &self,
        download: &ChatDownload,
        streamer_name: &str,
        video_info: VideoInfo,
    ) -> Option<AnalysisResult> {
        let params = PeakDetectionParams::default();
        let analysis = density::detect(&download.comments, &params);

        let result = AnalysisResult {
            video_id: download.video_id.clone(),
            streamer_name: streamer_name.to_string(),
            params,
            hot_moments: analysis.hot_moments,
            time_series_data: analysis.time_series_data,
            stats: analysis.stats,
            video_info,
            analyzed_at: Utc::now(),
        };

        if let Err(e) = self.store.save_analysis(&result) {
            error!("Failed to save analysis for {}: {}", result.video_id, e);
            return None;
        }

        Some(result)
    }

    /// 盛り上がりポイントごとにクリップを抽出し、字幕を要約して保存する
    ///
    /// 個々のクリップの失敗は他のポイントの処理を止めない。
    pub async fn process_hot_clips(&self, video_id: &str, hot_moments: &[HotMoment]) {
        if hot_moments.is_empty() {
            return;
        }

        info!(
            "Extracting {} hot clips for video {}",
            hot_moments.len(),
            video_id
        );

        let output_dir = self.store.clip_dir(video_id);

        for (i, moment) in hot_moments.iter().enumerate() {
            let half = CLIP_INTERVAL_SECONDS / 2.0;
            let start_time = (moment.offset_seconds - half).max(0.0);

            info!(
                "Clip #{}: offset {:.2}s, window {:.2}s - {:.2}s",
                i + 1,
                moment.offset_seconds,
                start_time,
                CLIP_INTERVAL_SECONDS
            );

            let req = ClipRequest {
                vod_id: video_id.to_string(),
                start_time,
                end_time: CLIP_INTERVAL_SECONDS,
                quality: CLIP_QUALITY.to_string(),
                output_dir: output_dir.clone(),
            };

            match self.extractor.extract(&req).await {
                Ok(outcome) => {
                    info!(
                        "Clip #{} extracted in {:.2}s: {}",
                        i + 1,
                        outcome.download_time,
                        outcome.video_path.display()
                    );

                    if let Some(srt_path) = &outcome.subtitle_path {
                        self.summarize_clip(video_id, moment.offset_seconds, srt_path)
                            .await;
                    }
                }
                Err(e) => {
                    error!("Clip #{} failed for {}: {}", i + 1, video_id, e);
                }
            }

            // 動画・音声の一時ファイルを掃除する（SRTは残る）
            if let Err(e) = clean_temp_files(&output_dir) {
                warn!("Temp sweep failed for {}: {}", output_dir.display(), e);
            }

            tokio::time::sleep(CLIP_PACING).await;
        }

        info!("All hot clips processed for video {}", video_id);
    }

    /// 1クリップのSRTをAIで要約して保存する
    async fn summarize_clip(&self, video_id: &str, offset_seconds: f64, srt_path: &std::path::Path) {
        let srt_content = match std::fs::read_to_string(srt_path) {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to read SRT {}: {}", srt_path.display(), e);
                return;
            }
        };

        match self
            .ai
            .summarize_srt(&srt_content, crate::summary::DEFAULT_CHUNK_CHARS)
            .await
        {
            Ok((summary, _chunks)) => {
                if let Err(e) = self.store.save_summary(video_id, offset_seconds, &summary) {
                    error!("Failed to save summary for {}: {}", video_id, e);
                }
            }
            Err(e) => {
                error!(
                    "AI summarization failed for {} at {:.2}s: {}",
                    video_id, offset_seconds, e
                );
            }
        }
    }

    // --- YouTube ---

    /// 直近のライブVODを1本探して取り込む（クリップ抽出はTwitchのみ）
    pub async fn process_youtube_streamer(&self, streamer: &StreamerInfo) {
        let channel_id = match &streamer.youtube_channel_id {
            Some(id) if id.starts_with("UC") => id.clone(),
            _ => {
                let Some(handle) = streamer.handle_for(Platform::Youtube) else {
                    warn!("Streamer {} has no YouTube binding", streamer.name);
                    return;
                };
                if handle.starts_with("UC") {
                    handle
                } else {
                    match self.youtube.resolve_channel_id(&handle).await {
                        Ok(id) => {
                            self.roster.update_youtube_channel_id(&streamer.id, &id);
                            id
                        }
                        Err(e) => {
                            error!("Failed to resolve channel id for {}: {}", handle, e);
                            return;
                        }
                    }
                }
            }
        };

        let videos = match self.youtube.get_recent_videos(&channel_id, 5).await {
            Ok(videos) => videos,
            Err(e) => {
                error!("Failed to list videos for {}: {}", streamer.name, e);
                return;
            }
        };

        // actualStartTimeを持つ＝配信アーカイブである直近の1本を探す
        let Some(vod) = videos.iter().find(|v| {
            v.live_streaming_details
                .as_ref()
                .map(|d| !d.actual_start_time.is_empty())
                .unwrap_or(false)
        }) else {
            info!("No live VOD found for {}", streamer.name);
            return;
        };

        if self.store.chat_log_exists(&vod.id) {
            info!("Skipping already processed video: {}", vod.id);
            return;
        }

        info!(
            "Ingesting YouTube chat for {}: {}",
            vod.id, vod.snippet.title
        );

        let comments = match self.youtube_chat.collect_comments(&vod.id, 9999).await {
            Ok(comments) => comments,
            Err(e) => {
                error!("YouTube chat ingestion failed for {}: {}", vod.id, e);
                return;
            }
        };

        let video_info = VideoInfo {
            id: vod.id.clone(),
            title: vod.snippet.title.clone(),
            description: vod.snippet.description.clone(),
            url: format!("https://www.youtube.com/watch?v={}", vod.id),
            user_name: streamer.name.clone(),
            user_login: streamer.id.clone(),
            duration: vod
                .content_details
                .as_ref()
                .map(|d| d.duration.clone())
                .unwrap_or_default(),
            created_at: vod
                .live_streaming_details
                .as_ref()
                .map(|d| d.actual_start_time.clone())
                .unwrap_or_default(),
        };

        let download = ChatDownload::new(vod.id.clone(), comments, Some(video_info.clone()));

        if let Err(e) = self.store.save_chat(&download) {
            error!("Failed to save chat log for {}: {}", vod.id, e);
            return;
        }

        if let Some(result) = self.analyze_and_save(&download, &streamer.id, video_info) {
            info!(
                "📊 YouTube analysis complete for {}: {} hot moments",
                result.video_id,
                result.hot_moments.len()
            );
        }

        self.notify_vod(
            &streamer.id,
            &vod.snippet.title,
            "YouTube",
            &vod.content_details
                .as_ref()
                .map(|d| d.duration.clone())
                .unwrap_or_default(),
            &vod.id,
        )
        .await;
    }

    /// 外部RPCへの配信メタデータ通知（未設定ならスキップ）
    async fn notify_vod(
        &self,
        streamer_name: &str,
        title: &str,
        platform: &str,
        duration: &str,
        video_id: &str,
    ) {
        let Some(subscriptions) = &self.subscriptions else {
            return;
        };

        if let Err(e) = subscriptions
            .record_vod(streamer_name, title, platform, duration, video_id)
            .await
        {
            warn!("Failed to record VOD to external service: {}", e);
        } else {
            info!(
                "VOD recorded externally: streamer={}, title={}",
                streamer_name, title
            );
        }
    }

    /// 毎日02:00に購読者ゼロの主播をロースターから除去するリーパー
    ///
    /// 外部サブスクリプションサービスが未設定なら何もしない。
    /// 問い合わせに失敗した主播は誤削除を避けるため保持する。
    pub async fn run_reaper(&self, mut stop: watch::Receiver<bool>) {
        let Some(subscriptions) = self.subscriptions.clone() else {
            info!("Subscription service not configured, reaper disabled");
            return;
        };

        loop {
            let wait = duration_until_next_2am();
            info!(
                "Next unsubscribed-streamer cleanup in {} minutes",
                wait.as_secs() / 60
            );

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.cleanup_unsubscribed(subscriptions.as_ref()).await;
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("Reaper stopped");
                        return;
                    }
                }
            }
        }
    }

    async fn cleanup_unsubscribed(&self, subscriptions: &dyn SubscriptionService) {
        info!("Checking for streamers without subscribers...");

        let streamers = self.roster.snapshot();
        let total = streamers.len();
        let mut removed = 0_usize;
        let mut failed = 0_usize;

        for streamer in streamers {
            let count = match subscriptions.subscriber_count(&streamer.id).await {
                Ok(count) => count,
                Err(e) => {
                    warn!(
                        "Failed to query subscriber count for {}: {}",
                        streamer.id, e
                    );
                    failed += 1;
                    continue;
                }
            };

            if count == 0 {
                info!("Streamer {} has no subscribers, removing", streamer.id);
                self.roster.remove_streamer(&streamer.id);
                self.twitch_states.remove(&streamer.id);
                self.youtube_states.remove(&streamer.id);
                removed += 1;
            }
        }

        info!(
            "Cleanup done: {} checked, {} removed, {} failed",
            total, removed, failed
        );
    }
}

/// 次のローカル時刻02:00までの待ち時間
fn duration_until_next_2am() -> Duration {
    let now = Local::now();
    let today_2am = now
        .date_naive()
        .and_hms_opt(2, 0, 0)
        .expect("02:00:00 is a valid time");

    let mut next = today_2am;
    if now.naive_local() >= today_2am {
        next += chrono::Duration::days(1);
    }

    (next - now.naive_local())
        .to_std()
        .unwrap_or(Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_until_next_2am_is_within_a_day() {
        let wait = duration_until_next_2am();
        assert!(wait <= Duration::from_secs(24 * 3600));
        assert!(wait > Duration::ZERO);
    }
}
