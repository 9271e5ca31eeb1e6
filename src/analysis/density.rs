//! Comment-density signal construction and peak detection.
//!
//! The detection is a pure function of the comment list and the parameter
//! triple: per-second counts are smoothed with a same-length rectangular
//! convolution, gated by a percentile threshold, passed through
//! non-maximum suppression and finally merged so that no two returned
//! moments are within `search_range` seconds of each other.

use crate::analysis::{
    format_duration, Analysis, HotMoment, PeakDetectionParams, SignalStats, TimeSeriesPoint,
};
use crate::ingest::Comment;

/// Same-mode convolution, matching MATLAB's `conv(x, kernel, 'same')`.
///
/// Out-of-range contributions are zero; the centering offset is
/// `(kernel_len - 1) / 2` with integer division.
pub fn conv_same(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let m = kernel.len();
    let mut result = vec![0.0; n];

    if n == 0 || m == 0 {
        return result;
    }

    let offset = (m - 1) / 2;

    for (i, out) in result.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (j, k) in kernel.iter().enumerate() {
            let idx = i as i64 - offset as i64 + j as i64;
            if idx >= 0 && (idx as usize) < n {
                sum += signal[idx as usize] * k;
            }
        }
        *out = sum;
    }

    result
}

/// Percentile threshold with floor indexing: `sorted[min(T-1, floor(T*thr))]`.
pub fn percentile_threshold(density: &[f64], thr: f64) -> f64 {
    if density.is_empty() {
        return 0.0;
    }

    let mut sorted = density.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut idx = (density.len() as f64 * thr).floor() as usize;
    if idx >= sorted.len() {
        idx = sorted.len() - 1;
    }

    sorted[idx]
}

/// Peak detection over the per-second comment counts.
///
/// Returns (is_peak, density). A second is a peak when its density is at
/// least the percentile threshold and equals the maximum of the
/// zero-padded window `[i - search_range, i + search_range]`.
pub fn find_peaks(counts: &[f64], params: &PeakDetectionParams) -> (Vec<bool>, Vec<f64>) {
    let n = counts.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }

    let kernel = vec![1.0; params.windows_len + 1];
    let density = conv_same(counts, &kernel);

    let thr_density = percentile_threshold(&density, params.thr);

    // Zero padding on both sides simplifies the window lookup.
    let sr = params.search_range;
    let mut padded = vec![0.0; n + 2 * sr];
    padded[sr..sr + n].copy_from_slice(&density);

    let mut is_peak = vec![false; n];
    for i in 0..n {
        if density[i] < thr_density {
            continue;
        }

        let ind = i + sr;
        let window = &padded[ind - sr..=ind + sr];
        let max_val = window.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        if density[i] == max_val {
            is_peak[i] = true;
        }
    }

    (is_peak, density)
}

/// Merges hot moments closer than `search_range` seconds, keeping the
/// highest-scoring moment of each group.
///
/// Groups are built relative to the first moment of the group; ties keep
/// the earliest moment.
pub fn merge_close_moments(mut moments: Vec<HotMoment>, search_range: usize) -> Vec<HotMoment> {
    if moments.len() <= 1 {
        return moments;
    }

    moments.sort_by(|a, b| {
        a.offset_seconds
            .partial_cmp(&b.offset_seconds)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut merged = Vec::new();
    let mut i = 0;

    while i < moments.len() {
        let mut j = i + 1;
        while j < moments.len()
            && moments[j].offset_seconds - moments[i].offset_seconds <= search_range as f64
        {
            j += 1;
        }

        let mut best = i;
        for k in i + 1..j {
            if moments[k].comments_score > moments[best].comments_score {
                best = k;
            }
        }
        merged.push(moments[best].clone());

        i = j;
    }

    merged
}

/// Runs the full detection over a comment list.
///
/// Pure: no clock, no filesystem, no network. Deterministic for a fixed
/// (comments, params) pair.
pub fn detect(comments: &[Comment], params: &PeakDetectionParams) -> Analysis {
    if comments.is_empty() {
        return Analysis::default();
    }

    let max_offset = comments
        .iter()
        .map(|c| c.content_offset_seconds)
        .fold(0.0_f64, f64::max);

    let total_seconds = max_offset.ceil() as usize + 1;
    let mut counts = vec![0.0; total_seconds];

    for comment in comments {
        let idx = comment.content_offset_seconds.floor() as i64;
        if idx >= 0 && (idx as usize) < total_seconds {
            counts[idx as usize] += 1.0;
        }
    }

    let (is_peak, density) = find_peaks(&counts, params);

    let time_series_data: Vec<TimeSeriesPoint> = density
        .iter()
        .enumerate()
        .map(|(i, &score)| TimeSeriesPoint {
            offset_seconds: i as f64,
            formatted_time: format_duration(i as f64),
            score,
            is_peak: is_peak[i],
        })
        .collect();

    let raw_moments: Vec<HotMoment> = is_peak
        .iter()
        .enumerate()
        .filter(|(_, &peak)| peak)
        .map(|(i, _)| HotMoment {
            time_interval: format!("{}s", params.windows_len),
            comments_score: density[i],
            offset_seconds: i as f64,
            formatted_time: format_duration(i as f64),
        })
        .collect();

    let hot_moments = merge_close_moments(raw_moments, params.search_range);

    let stats = signal_stats(&density);

    Analysis {
        hot_moments,
        time_series_data,
        stats,
    }
}

/// Mean, sample standard deviation and count of the density signal.
fn signal_stats(density: &[f64]) -> SignalStats {
    let count = density.len();
    if count == 0 {
        return SignalStats::default();
    }

    let sum: f64 = density.iter().sum();
    let sum_sq: f64 = density.iter().map(|v| v * v).sum();
    let mean = sum / count as f64;

    let sigma = if count > 1 {
        let variance = (sum_sq - sum * sum / count as f64) / (count as f64 - 1.0);
        variance.max(0.0).sqrt()
    } else {
        0.0
    };

    SignalStats { mean, sigma, count }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv_same_identity_kernel() {
        let signal = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(conv_same(&signal, &[1.0]), signal);
    }

    #[test]
    fn test_conv_same_three_kernel() {
        // kernel of 3 ones: centered moving sum with zero boundary
        let signal = vec![1.0, 0.0, 0.0, 2.0];
        let result = conv_same(&signal, &[1.0, 1.0, 1.0]);
        assert_eq!(result, vec![1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_conv_same_even_kernel_offset() {
        // even kernel length: offset = (m-1)/2 rounds down
        let signal = vec![0.0, 0.0, 1.0, 0.0, 0.0];
        let result = conv_same(&signal, &[1.0, 1.0]);
        // offset = 0: result[i] = signal[i] + signal[i+1]
        assert_eq!(result, vec![0.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_percentile_floor_indexing() {
        let density: Vec<f64> = (0..10).map(|v| v as f64).collect();
        // floor(10 * 0.9) = 9 -> sorted[9] = 9.0
        assert_eq!(percentile_threshold(&density, 0.9), 9.0);
        // floor(10 * 0.5) = 5 -> sorted[5] = 5.0
        assert_eq!(percentile_threshold(&density, 0.5), 5.0);
    }

    #[test]
    fn test_percentile_thr_one_clamps_to_max() {
        let density = vec![3.0, 1.0, 2.0];
        // floor(3 * 1.0) = 3 is out of range, clamped to sorted[2] = max
        assert_eq!(percentile_threshold(&density, 1.0), 3.0);
    }

    #[test]
    fn test_merge_keeps_highest_score_per_group() {
        let moment = |offset: f64, score: f64| HotMoment {
            time_interval: "60s".to_string(),
            comments_score: score,
            offset_seconds: offset,
            formatted_time: String::new(),
        };

        let merged = merge_close_moments(
            vec![moment(100.0, 5.0), moment(150.0, 9.0), moment(400.0, 3.0)],
            210,
        );

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].offset_seconds, 150.0);
        assert_eq!(merged[1].offset_seconds, 400.0);
    }

    #[test]
    fn test_merge_tie_keeps_earliest() {
        let moment = |offset: f64, score: f64| HotMoment {
            time_interval: "60s".to_string(),
            comments_score: score,
            offset_seconds: offset,
            formatted_time: String::new(),
        };

        let merged = merge_close_moments(vec![moment(100.0, 5.0), moment(120.0, 5.0)], 210);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].offset_seconds, 100.0);
    }
}
