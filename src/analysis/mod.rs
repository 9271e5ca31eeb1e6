//! コメント密度分析と盛り上がり検出

pub mod density;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::VideoInfo;

/// 峰値検出パラメータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakDetectionParams {
    /// 密度計算のスライディングウィンドウ長（秒）
    pub windows_len: usize,
    /// 閾値パーセンタイル（0-1）
    pub thr: f64,
    /// 局所最大値の探索範囲（秒）
    pub search_range: usize,
}

impl Default for PeakDetectionParams {
    fn default() -> Self {
        Self {
            windows_len: 420,
            thr: 0.9,
            search_range: 210,
        }
    }
}

impl PeakDetectionParams {
    /// 分析結果ファイル名に埋め込むパラメータ表記
    pub fn file_tag(&self) -> String {
        format!(
            "{}_{:.2}_{}",
            self.windows_len, self.thr, self.search_range
        )
    }
}

/// 盛り上がりポイント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotMoment {
    pub time_interval: String,
    pub comments_score: f64,
    pub offset_seconds: f64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub formatted_time: String,
}

/// 時系列データポイント（1秒ごと）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub offset_seconds: f64,
    pub formatted_time: String,
    pub score: f64,
    pub is_peak: bool,
}

/// 密度信号の統計情報
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalStats {
    pub mean: f64,
    pub sigma: f64,
    pub count: usize,
}

/// detect()の返り値
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    pub hot_moments: Vec<HotMoment>,
    pub time_series_data: Vec<TimeSeriesPoint>,
    pub stats: SignalStats,
}

/// 保存される完全な分析結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub video_id: String,
    pub streamer_name: String,
    pub params: PeakDetectionParams,
    pub hot_moments: Vec<HotMoment>,
    pub time_series_data: Vec<TimeSeriesPoint>,
    pub stats: SignalStats,
    pub video_info: VideoInfo,
    pub analyzed_at: DateTime<Utc>,
}

/// 秒数を HH:MM:SS 形式にフォーマット
pub fn format_duration(seconds: f64) -> String {
    let total = seconds as u64;
    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    let secs = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}
