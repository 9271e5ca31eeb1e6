//! 盛り上がり検出のシナリオテスト
//!
//! 密度信号は矩形カーネルの移動和なので、点状のバーストはカーネル幅の
//! プラトーに潰れる。ここでは期待値が決定的になるよう、一様な背景
//! （毎秒1コメント）と形の分かっているバーストでフィクスチャを組む。

use oshiwatch::analysis::density::{detect, merge_close_moments, percentile_threshold};
use oshiwatch::analysis::PeakDetectionParams;
use oshiwatch::{Comment, HotMoment};

fn comment_at(offset: f64) -> Comment {
    Comment {
        id: format!("c{:.3}", offset),
        content_offset_seconds: offset,
        ..Default::default()
    }
}

/// 毎秒1コメントの一様な背景
fn uniform_background(total_seconds: usize) -> Vec<Comment> {
    (0..total_seconds)
        .map(|i| comment_at(i as f64 + 0.5))
        .collect()
}

/// second秒にcount件のコメントを積む
fn burst_at(comments: &mut Vec<Comment>, second: usize, count: usize) {
    for k in 0..count {
        comments.push(comment_at(second as f64 + 0.1 + k as f64 * 0.001));
    }
}

#[test]
fn empty_comments_yield_empty_analysis() {
    let analysis = detect(&[], &PeakDetectionParams::default());

    assert!(analysis.hot_moments.is_empty());
    assert!(analysis.time_series_data.is_empty());
    assert_eq!(analysis.stats.count, 0);
}

#[test]
fn single_comment_produces_uniform_plateau() {
    // 1件だけのコメント: T=101でカーネル(421)が信号全体を覆うため、
    // 密度は全点1になり、プラトー全体がマージされて代表1点に潰れる。
    let analysis = detect(&[comment_at(100.0)], &PeakDetectionParams::default());

    assert_eq!(analysis.time_series_data.len(), 101);
    assert!(analysis.time_series_data.iter().all(|p| p.score == 1.0));
    assert_eq!(analysis.stats.count, 101);

    assert_eq!(analysis.hot_moments.len(), 1);
    assert_eq!(analysis.hot_moments[0].offset_seconds, 0.0);
    assert_eq!(analysis.hot_moments[0].comments_score, 1.0);
}

#[test]
fn clear_spike_yields_single_moment_at_center() {
    // 2時間の配信に毎秒1コメントの背景、3600秒を中心に三角形の
    // バースト（裾がカーネル半幅より広いので密度は中心で厳密に最大）。
    let mut comments = uniform_background(7200);
    for k in -230_i64..=230 {
        let extra = ((231 - k.abs()) / 10) as usize;
        if extra > 0 {
            burst_at(&mut comments, (3600 + k) as usize, extra);
        }
    }

    let analysis = detect(&comments, &PeakDetectionParams::default());

    assert_eq!(analysis.hot_moments.len(), 1);
    let moment = &analysis.hot_moments[0];
    assert!(
        (3580.0..=3620.0).contains(&moment.offset_seconds),
        "moment at {} not near spike center",
        moment.offset_seconds
    );
    assert_eq!(moment.time_interval, "420s");
    // HH:MM:SS形式
    assert_eq!(moment.formatted_time.len(), 8);
    assert_eq!(moment.formatted_time.matches(':').count(), 2);
}

#[test]
fn close_spikes_merge_into_the_denser_one() {
    // searchRange(210)より近い2つのバースト: 弱い方は強い方の探索窓に
    // 入るため抑制され、返るのは1点だけ。
    let params = PeakDetectionParams {
        windows_len: 60,
        thr: 0.9,
        search_range: 210,
    };

    let mut comments = uniform_background(1700);
    // 中心1000: 8件/秒、中心1100: 6件/秒、いずれも幅67秒
    for s in 967..=1033 {
        burst_at(&mut comments, s, 8);
    }
    for s in 1067..=1133 {
        burst_at(&mut comments, s, 6);
    }

    let analysis = detect(&comments, &params);

    assert_eq!(analysis.hot_moments.len(), 1);
    let moment = &analysis.hot_moments[0];
    // 強い方（1000中心）のプラトー先頭に落ちる
    assert!(
        (995.0..=1005.0).contains(&moment.offset_seconds),
        "moment at {} not at the denser spike",
        moment.offset_seconds
    );
}

#[test]
fn distant_spikes_yield_two_ordered_moments() {
    // searchRangeより離れた2つのバーストはそれぞれ独立に返る。
    let params = PeakDetectionParams {
        windows_len: 60,
        thr: 0.9,
        search_range: 210,
    };

    let mut comments = uniform_background(1800);
    for s in 967..=1033 {
        burst_at(&mut comments, s, 8);
    }
    for s in 1367..=1433 {
        burst_at(&mut comments, s, 6);
    }

    let analysis = detect(&comments, &params);

    assert_eq!(analysis.hot_moments.len(), 2);
    let first = &analysis.hot_moments[0];
    let second = &analysis.hot_moments[1];

    assert!(first.offset_seconds < second.offset_seconds);
    assert!(
        (995.0..=1005.0).contains(&first.offset_seconds),
        "first moment at {}",
        first.offset_seconds
    );
    assert!(
        (1395.0..=1405.0).contains(&second.offset_seconds),
        "second moment at {}",
        second.offset_seconds
    );
    assert!(first.comments_score > second.comments_score);
}

#[test]
fn detect_is_deterministic() {
    let mut comments = uniform_background(1800);
    for s in 967..=1033 {
        burst_at(&mut comments, s, 8);
    }

    let params = PeakDetectionParams::default();
    let first = detect(&comments, &params);
    let second = detect(&comments, &params);

    assert_eq!(first.hot_moments, second.hot_moments);
    assert_eq!(first.stats, second.stats);
    assert_eq!(first.time_series_data.len(), second.time_series_data.len());
}

#[test]
fn moments_respect_search_range_separation() {
    // どのフィクスチャでも、返るポイント同士はsearchRangeより離れている
    let params = PeakDetectionParams {
        windows_len: 60,
        thr: 0.9,
        search_range: 210,
    };

    let mut comments = uniform_background(3000);
    for center in [500, 900, 1300, 1700, 2100] {
        for s in center - 33..=center + 33 {
            burst_at(&mut comments, s, 5);
        }
    }

    let analysis = detect(&comments, &params);

    for (i, a) in analysis.hot_moments.iter().enumerate() {
        for b in analysis.hot_moments.iter().skip(i + 1) {
            assert!(
                (a.offset_seconds - b.offset_seconds).abs() > params.search_range as f64,
                "moments {} and {} are closer than search_range",
                a.offset_seconds,
                b.offset_seconds
            );
        }
    }
}

#[test]
fn moment_scores_meet_percentile_threshold() {
    let params = PeakDetectionParams::default();

    let mut comments = uniform_background(7200);
    for k in -230_i64..=230 {
        let extra = ((231 - k.abs()) / 10) as usize;
        if extra > 0 {
            burst_at(&mut comments, (3600 + k) as usize, extra);
        }
    }

    let analysis = detect(&comments, &params);
    let density: Vec<f64> = analysis.time_series_data.iter().map(|p| p.score).collect();
    let thr_density = percentile_threshold(&density, params.thr);

    assert!(!analysis.hot_moments.is_empty());
    for moment in &analysis.hot_moments {
        assert!(
            moment.comments_score >= thr_density,
            "moment score {} below threshold {}",
            moment.comments_score,
            thr_density
        );
    }
}

#[test]
fn percentile_definition_matches_floor_indexing() {
    for len in [1_usize, 5, 100, 101, 7200] {
        let density: Vec<f64> = (0..len).rev().map(|v| v as f64).collect();
        for thr in [0.0, 0.5, 0.9, 0.99] {
            let mut sorted = density.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let idx = ((len as f64 * thr).floor() as usize).min(len - 1);
            assert_eq!(percentile_threshold(&density, thr), sorted[idx]);
        }
    }
}

#[test]
fn merge_output_is_sorted_ascending() {
    let moment = |offset: f64, score: f64| HotMoment {
        time_interval: "420s".to_string(),
        comments_score: score,
        offset_seconds: offset,
        formatted_time: String::new(),
    };

    let merged = merge_close_moments(
        vec![
            moment(2000.0, 3.0),
            moment(100.0, 5.0),
            moment(1200.0, 7.0),
        ],
        210,
    );

    assert_eq!(merged.len(), 3);
    assert!(merged.windows(2).all(|w| w[0].offset_seconds < w[1].offset_seconds));
}
