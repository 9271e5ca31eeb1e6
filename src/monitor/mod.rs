//! 配信状態の監視
//!
//! プラットフォームごとのウォッチャーが主播の生存状態をポーリングし、
//! 配信中→オフラインのエッジを検出してBroadcastEndedイベントを
//! スーパーバイザへ送る。

pub mod supervisor;
pub mod twitch;
pub mod youtube;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::Rng;

use crate::models::Platform;
use crate::store::roster::StreamerInfo;

/// 配信終了イベント
///
/// ウォッチャー→スーパーバイザの一方向チャネルで運ばれる。送信は
/// fire-and-forgetで、ウォッチャーが下流の処理を待つことはない。
#[derive(Debug, Clone)]
pub struct BroadcastEnded {
    pub streamer: StreamerInfo,
    pub platform: Platform,
}

/// 主播1人の監視状態
#[derive(Debug, Clone)]
pub struct LiveState<S> {
    pub is_live: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub latest: Option<S>,
}

impl<S> Default for LiveState<S> {
    fn default() -> Self {
        Self {
            is_live: false,
            last_checked: None,
            latest: None,
        }
    }
}

/// 主播ID → 監視状態のテーブル
///
/// observe()が遷移判定の唯一の入口。プローブ失敗時はobserveを呼ばない
/// ことで、一時的な失敗がエッジを握り潰すのを防ぐ。
pub struct LiveStateTable<S> {
    inner: RwLock<HashMap<String, LiveState<S>>>,
}

impl<S: Clone> Default for LiveStateTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone> LiveStateTable<S> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// 現在の観測を記録し、配信中→オフラインのエッジならtrueを返す
    ///
    /// 初回観測のprevはfalse扱い。
    pub fn observe(&self, streamer_id: &str, is_live: bool, snapshot: Option<S>) -> bool {
        let mut inner = self.inner.write();
        let state = inner.entry(streamer_id.to_string()).or_default();

        let prev = state.is_live;
        state.is_live = is_live;
        state.last_checked = Some(Utc::now());
        if snapshot.is_some() {
            state.latest = snapshot;
        }

        prev && !is_live
    }

    pub fn get(&self, streamer_id: &str) -> Option<LiveState<S>> {
        self.inner.read().get(streamer_id).cloned()
    }

    pub fn latest_snapshot(&self, streamer_id: &str) -> Option<S> {
        self.inner
            .read()
            .get(streamer_id)
            .and_then(|s| s.latest.clone())
    }

    pub fn is_live(&self, streamer_id: &str) -> bool {
        self.inner
            .read()
            .get(streamer_id)
            .map(|s| s.is_live)
            .unwrap_or(false)
    }

    /// 全主播の最新スナップショットを返す
    pub fn all_snapshots(&self) -> HashMap<String, S> {
        self.inner
            .read()
            .iter()
            .filter_map(|(id, state)| state.latest.clone().map(|s| (id.clone(), s)))
            .collect()
    }

    pub fn remove(&self, streamer_id: &str) {
        self.inner.write().remove(streamer_id);
    }
}

/// [min, max]の一様乱数で次回チェックまでの秒数を決める
pub fn random_interval(min_seconds: u64, max_seconds: u64) -> u64 {
    if max_seconds <= min_seconds {
        return min_seconds;
    }
    rand::thread_rng().gen_range(min_seconds..=max_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_detected_once_per_offline_transition() {
        let table: LiveStateTable<String> = LiveStateTable::new();

        // live, live, offline, offline → エッジは3回目だけ
        let probes = [true, true, false, false];
        let edges: Vec<bool> = probes
            .iter()
            .map(|&live| table.observe("lumi", live, None))
            .collect();

        assert_eq!(edges, vec![false, false, true, false]);
    }

    #[test]
    fn test_no_edge_on_first_offline_observation() {
        let table: LiveStateTable<String> = LiveStateTable::new();
        assert!(!table.observe("lumi", false, None));
    }

    #[test]
    fn test_no_edge_on_live_to_live() {
        let table: LiveStateTable<String> = LiveStateTable::new();
        table.observe("lumi", true, None);
        assert!(!table.observe("lumi", true, None));
    }

    #[test]
    fn test_snapshot_is_kept_when_probe_returns_none() {
        let table: LiveStateTable<String> = LiveStateTable::new();
        table.observe("lumi", true, Some("stream snapshot".to_string()));
        table.observe("lumi", false, None);

        // オフライン化してもNoneで上書きしない
        assert_eq!(
            table.latest_snapshot("lumi").as_deref(),
            Some("stream snapshot")
        );
        assert!(!table.is_live("lumi"));
    }

    #[test]
    fn test_remove_resets_edge_state() {
        let table: LiveStateTable<String> = LiveStateTable::new();
        table.observe("lumi", true, None);
        table.remove("lumi");

        // 除去後の最初の観測はprev=false扱い
        assert!(!table.observe("lumi", false, None));
    }

    #[test]
    fn test_random_interval_bounds() {
        for _ in 0..100 {
            let v = random_interval(30, 120);
            assert!((30..=120).contains(&v));
        }
        assert_eq!(random_interval(60, 60), 60);
        assert_eq!(random_interval(120, 30), 120);
    }
}
