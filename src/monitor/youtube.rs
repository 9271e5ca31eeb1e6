//! YouTube配信状態のウォッチャー
//!
//! プローブのついでにチャンネルID（"UC"…）とプロフィール画像を解決し、
//! ロースターへ書き戻す。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{error, info, warn};

use crate::api::youtube::{YouTubeClient, YouTubeError};
use crate::config::YouTubeConfig;
use crate::models::youtube::YouTubeStatusResponse;
use crate::models::Platform;
use crate::monitor::{random_interval, BroadcastEnded, LiveStateTable};
use crate::store::roster::{RosterStore, StreamerInfo};

pub struct YouTubeMonitor {
    config: YouTubeConfig,
    client: Arc<YouTubeClient>,
    roster: Arc<RosterStore>,
    states: Arc<LiveStateTable<YouTubeStatusResponse>>,
    events: mpsc::UnboundedSender<BroadcastEnded>,
    check_now: Arc<Notify>,
    probe_errors: AtomicU64,
}

impl YouTubeMonitor {
    pub fn new(
        config: YouTubeConfig,
        client: Arc<YouTubeClient>,
        roster: Arc<RosterStore>,
        states: Arc<LiveStateTable<YouTubeStatusResponse>>,
        events: mpsc::UnboundedSender<BroadcastEnded>,
        check_now: Arc<Notify>,
    ) -> Self {
        Self {
            config,
            client,
            roster,
            states,
            events,
            check_now,
            probe_errors: AtomicU64::new(0),
        }
    }

    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        info!(
            "🎬 YouTube monitor started, tracking {} streamers",
            self.roster.len()
        );

        let reload_interval =
            Duration::from_secs(self.config.reload_interval_minutes.max(1) * 60);
        let mut last_reload = Instant::now();

        self.check_all_channels().await;

        loop {
            if last_reload.elapsed() >= reload_interval {
                info!(
                    "Roster snapshot refreshed: {} streamers tracked",
                    self.roster.len()
                );
                last_reload = Instant::now();
            }

            let interval = random_interval(
                self.config.min_interval_seconds,
                self.config.max_interval_seconds,
            );
            info!("Next YouTube check in {} seconds", interval);

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(interval)) => {
                    self.check_all_channels().await;
                }
                _ = self.check_now.notified() => {
                    info!("Immediate YouTube check requested");
                    self.check_all_channels().await;
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("YouTube monitor stopped");
                        return;
                    }
                }
            }
        }
    }

    pub async fn check_all_channels(&self) {
        let streamers = self.roster.snapshot();
        if streamers.is_empty() {
            return;
        }

        info!(
            "Checking live status of {} YouTube channels...",
            streamers.len()
        );

        for streamer in streamers {
            self.check_channel(&streamer).await;
            // バースト防止の小休止
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// チャンネルIDを解決する（キャッシュ優先、@handleはAPIで解決して書き戻し）
    async fn resolve_channel_id(&self, streamer: &StreamerInfo) -> Option<String> {
        if let Some(cached) = &streamer.youtube_channel_id {
            if cached.starts_with("UC") {
                return Some(cached.clone());
            }
        }

        let handle = streamer.handle_for(Platform::Youtube)?;

        if handle.starts_with("UC") {
            return Some(handle);
        }

        match self.client.resolve_channel_id(&handle).await {
            Ok(channel_id) => {
                self.roster
                    .update_youtube_channel_id(&streamer.id, &channel_id);
                Some(channel_id)
            }
            Err(YouTubeError::ChannelNotFound(_)) => {
                warn!(
                    "YouTube channel not found for {} ({}), evicting",
                    streamer.name, handle
                );
                self.roster.remove_streamer(&streamer.id);
                self.states.remove(&streamer.id);
                None
            }
            Err(e) => {
                warn!("Failed to resolve channel id for {}: {}", handle, e);
                None
            }
        }
    }

    async fn check_channel(&self, streamer: &StreamerInfo) {
        let Some(channel_id) = self.resolve_channel_id(streamer).await else {
            return;
        };

        if streamer.profile_image_url.is_none() {
            match self.client.get_channel_info(&channel_id).await {
                Ok(info) => {
                    self.roster
                        .update_profile_image(&streamer.id, &info.profile_image_url);
                }
                Err(e) => {
                    warn!("Failed to fetch channel info for {}: {}", streamer.name, e);
                }
            }
        }

        let stream = match self.client.check_live_status(&channel_id).await {
            Ok(stream) => stream,
            Err(e) => {
                // プローブ失敗では状態を更新しない
                self.probe_errors.fetch_add(1, Ordering::Relaxed);
                error!(
                    "Failed to check live status for {}: {}",
                    streamer.name, e
                );
                return;
            }
        };

        let is_live = stream.is_some();
        let snapshot = YouTubeStatusResponse {
            is_live,
            stream_data: stream.clone(),
            checked_at: Utc::now().to_rfc3339(),
            channel_title: streamer.name.clone(),
        };

        let ended = self.states.observe(&streamer.id, is_live, Some(snapshot));

        if let Some(stream) = &stream {
            info!(
                "✅ {} is live: {} (viewers: {})",
                streamer.name, stream.title, stream.viewer_count
            );
        } else {
            info!("💤 {} is not live", streamer.name);
        }

        if ended {
            info!(
                "📴 {} went offline, queueing recent VOD processing",
                streamer.name
            );
            if self
                .events
                .send(BroadcastEnded {
                    streamer: streamer.clone(),
                    platform: Platform::Youtube,
                })
                .is_err()
            {
                error!("Supervisor channel closed, dropping BroadcastEnded event");
            }
        }
    }

    pub fn probe_error_count(&self) -> u64 {
        self.probe_errors.load(Ordering::Relaxed)
    }
}
