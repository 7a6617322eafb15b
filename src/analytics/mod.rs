//! Training-Load Analytics
//!
//! Pure, stateless computation of training-load metrics and trend flags:
//!
//! - **CTL** (chronic training load): 42-day-span EMA of per-workout TSS
//! - **ATL** (acute training load): 7-day-span EMA of the same series
//! - **TSB** (training stress balance): CTL − ATL
//! - **HRV z-score**: deviation of the latest overnight reading from its
//!   trailing 30-sample rolling baseline, in standard-deviation units
//!
//! EMAs use alpha = 2/(span+1), seeded from the first sample, applied over
//! workouts sorted by start time. The rolling baseline includes the latest
//! sample and uses the sample (n−1) standard deviation.

use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::constants::analytics::{
    ATL_SPAN_DAYS, CTL_SPAN_DAYS, HRV_BASELINE_WINDOW, RAMP_LOOKBACK_DAYS,
};
use crate::types::{Activity, HrvSample};

// =============================================================================
// Metrics
// =============================================================================

/// Latest training-load state derived from the activity history.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LoadMetrics {
    /// Chronic training load (fitness)
    pub ctl: f64,
    /// Acute training load (fatigue)
    pub atl: f64,
    /// Training stress balance (form): ctl − atl
    pub tsb: f64,
    /// Weekly CTL growth fraction, when at least a week of history exists
    pub ramp: Option<f64>,
}

/// Everything the flag evaluation and the LLM prompt need in one place.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetricsReport {
    #[serde(flatten)]
    pub load: LoadMetrics,
    /// Latest HRV z-score against the rolling baseline, when computable
    pub hrv_zscore: Option<f64>,
}

/// Compute CTL/ATL/TSB from the workout history.
///
/// Activities are processed in start-time order regardless of input order.
/// An empty history yields all-zero metrics.
pub fn compute_load_metrics(activities: &[Activity]) -> LoadMetrics {
    if activities.is_empty() {
        return LoadMetrics::default();
    }

    let mut sorted: Vec<&Activity> = activities.iter().collect();
    sorted.sort_by_key(|a| a.start_time);

    let ctl_alpha = ema_alpha(CTL_SPAN_DAYS);
    let atl_alpha = ema_alpha(ATL_SPAN_DAYS);

    let latest_time = sorted.last().map(|a| a.start_time).unwrap_or_default();
    let ramp_cutoff = latest_time - chrono::Duration::days(RAMP_LOOKBACK_DAYS);

    let mut ctl = sorted[0].tss;
    let mut atl = sorted[0].tss;
    // CTL as of the last workout at least a week before the latest one
    let mut ctl_week_ago: Option<f64> = None;

    for (i, activity) in sorted.iter().enumerate() {
        if i > 0 {
            ctl = ctl_alpha * activity.tss + (1.0 - ctl_alpha) * ctl;
            atl = atl_alpha * activity.tss + (1.0 - atl_alpha) * atl;
        }
        if activity.start_time <= ramp_cutoff {
            ctl_week_ago = Some(ctl);
        }
    }

    let ramp = ctl_week_ago.and_then(|prev| {
        if prev > 0.0 {
            Some((ctl - prev) / prev)
        } else {
            None
        }
    });

    LoadMetrics {
        ctl,
        atl,
        tsb: ctl - atl,
        ramp,
    }
}

/// Z-score of the latest HRV reading against its trailing rolling baseline.
///
/// Returns `None` with fewer than [`HRV_BASELINE_WINDOW`] samples, or when
/// the window's standard deviation is zero.
pub fn compute_hrv_zscore(samples: &[HrvSample]) -> Option<f64> {
    if samples.len() < HRV_BASELINE_WINDOW {
        return None;
    }

    let mut sorted: Vec<&HrvSample> = samples.iter().collect();
    sorted.sort_by_key(|s| s.day);

    let window: Vec<f64> = sorted[sorted.len() - HRV_BASELINE_WINDOW..]
        .iter()
        .map(|s| s.rmssd_ms)
        .collect();
    let latest = *window.last()?;

    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = variance.sqrt();

    if std == 0.0 {
        return None;
    }

    Some((latest - mean) / std)
}

fn ema_alpha(span_days: u32) -> f64 {
    2.0 / (span_days as f64 + 1.0)
}

// =============================================================================
// Flags
// =============================================================================

/// Trend flags raised by threshold comparison. Serializes to the JSON object
/// embedded in the revision prompt and the revision log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSet {
    /// Fatigue outpacing fitness: atl/ctl above the configured ratio
    pub high_atl_ctl_ratio: bool,
    /// Latest HRV reading well below its rolling baseline
    pub low_hrv: bool,
    /// Deep negative training stress balance
    pub low_tsb: bool,
    /// Chronic load growing faster than the weekly ramp cap
    pub high_ramp: bool,
}

impl FlagSet {
    /// True when at least one flag is raised.
    pub fn any(&self) -> bool {
        self.high_atl_ctl_ratio || self.low_hrv || self.low_tsb || self.high_ramp
    }

    /// Names of the raised flags, for log lines.
    pub fn raised(&self) -> Vec<&'static str> {
        let mut raised = Vec::new();
        if self.high_atl_ctl_ratio {
            raised.push("high_atl_ctl_ratio");
        }
        if self.low_hrv {
            raised.push("low_hrv");
        }
        if self.low_tsb {
            raised.push("low_tsb");
        }
        if self.high_ramp {
            raised.push("high_ramp");
        }
        raised
    }
}

/// Compare metrics against configured thresholds.
pub fn evaluate_flags(report: &MetricsReport, thresholds: &ThresholdConfig) -> FlagSet {
    let load = &report.load;

    let high_atl_ctl_ratio =
        load.ctl > 0.0 && load.atl / load.ctl > thresholds.ctl_atl_ratio_max;

    let low_hrv = report
        .hrv_zscore
        .is_some_and(|z| z < thresholds.hrv_drop_zscore);

    let low_tsb = load.tsb < thresholds.tsb_min;

    let high_ramp = load.ramp.is_some_and(|r| r > thresholds.ramp_max);

    FlagSet {
        high_atl_ctl_ratio,
        low_hrv,
        low_tsb,
        high_ramp,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn activity_on(day: u32, tss: f64) -> Activity {
        Activity {
            id: format!("a{}", day),
            start_time: Utc.with_ymd_and_hms(2026, 6, day, 6, 0, 0).unwrap(),
            sport: None,
            duration_secs: None,
            distance_m: None,
            tss,
            avg_hr: None,
        }
    }

    fn hrv_on(day: u32, rmssd: f64) -> HrvSample {
        HrvSample {
            day: chrono::NaiveDate::from_ymd_opt(2026, 6, 1)
                .unwrap()
                .checked_add_days(chrono::Days::new(day as u64 - 1))
                .unwrap(),
            rmssd_ms: rmssd,
        }
    }

    #[test]
    fn test_empty_history_yields_zeros() {
        let metrics = compute_load_metrics(&[]);
        assert_eq!(metrics.ctl, 0.0);
        assert_eq!(metrics.atl, 0.0);
        assert_eq!(metrics.tsb, 0.0);
        assert!(metrics.ramp.is_none());
    }

    #[test]
    fn test_constant_load_converges_to_tss() {
        let activities: Vec<Activity> = (1..=28).map(|d| activity_on(d, 50.0)).collect();
        let metrics = compute_load_metrics(&activities);

        // EMA of a constant series is that constant from the seed onward
        assert!((metrics.ctl - 50.0).abs() < 1e-9);
        assert!((metrics.atl - 50.0).abs() < 1e-9);
        assert!(metrics.tsb.abs() < 1e-9);
        // No CTL growth under constant load
        assert!(metrics.ramp.unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_load_spike_drives_atl_above_ctl() {
        // Two easy weeks, then a hard week
        let mut activities: Vec<Activity> = (1..=14).map(|d| activity_on(d, 30.0)).collect();
        activities.extend((15..=21).map(|d| activity_on(d, 120.0)));

        let metrics = compute_load_metrics(&activities);
        assert!(metrics.atl > metrics.ctl);
        assert!(metrics.tsb < 0.0);
        assert!(metrics.ramp.unwrap() > 0.0);
    }

    #[test]
    fn test_unsorted_input_matches_sorted() {
        let sorted: Vec<Activity> = (1..=10).map(|d| activity_on(d, d as f64 * 10.0)).collect();
        let mut shuffled = sorted.clone();
        shuffled.reverse();

        let a = compute_load_metrics(&sorted);
        let b = compute_load_metrics(&shuffled);
        assert!((a.ctl - b.ctl).abs() < 1e-12);
        assert!((a.atl - b.atl).abs() < 1e-12);
    }

    #[test]
    fn test_hrv_zscore_insufficient_data() {
        let samples: Vec<HrvSample> = (1..=10).map(|d| hrv_on(d, 50.0)).collect();
        assert!(compute_hrv_zscore(&samples).is_none());
    }

    #[test]
    fn test_hrv_zscore_flat_baseline_is_none() {
        let samples: Vec<HrvSample> = (1..=30).map(|d| hrv_on(d, 50.0)).collect();
        assert!(compute_hrv_zscore(&samples).is_none());
    }

    #[test]
    fn test_hrv_zscore_detects_drop() {
        // Stable baseline with mild noise, then a sharp overnight drop
        let mut samples: Vec<HrvSample> = (1..=29)
            .map(|d| hrv_on(d, 50.0 + if d % 2 == 0 { 1.0 } else { -1.0 }))
            .collect();
        samples.push(hrv_on(30, 35.0));

        let z = compute_hrv_zscore(&samples).unwrap();
        assert!(z < -2.0, "expected strong negative z-score, got {}", z);
    }

    #[test]
    fn test_hrv_zscore_latest_above_mean_is_positive() {
        let mut samples: Vec<HrvSample> = (1..=29)
            .map(|d| hrv_on(d, 50.0 + if d % 2 == 0 { 1.0 } else { -1.0 }))
            .collect();
        samples.push(hrv_on(30, 60.0));

        assert!(compute_hrv_zscore(&samples).unwrap() > 0.0);
    }

    #[test]
    fn test_evaluate_flags_all_clear() {
        let report = MetricsReport {
            load: LoadMetrics {
                ctl: 50.0,
                atl: 50.0,
                tsb: 0.0,
                ramp: Some(0.02),
            },
            hrv_zscore: Some(0.1),
        };
        let flags = evaluate_flags(&report, &ThresholdConfig::default());
        assert!(!flags.any());
        assert!(flags.raised().is_empty());
    }

    #[test]
    fn test_evaluate_flags_high_ratio() {
        let report = MetricsReport {
            load: LoadMetrics {
                ctl: 50.0,
                atl: 70.0,
                tsb: -20.0,
                ramp: None,
            },
            hrv_zscore: None,
        };
        let flags = evaluate_flags(&report, &ThresholdConfig::default());
        assert!(flags.high_atl_ctl_ratio);
        assert!(flags.low_tsb);
        assert!(!flags.low_hrv);
        assert_eq!(flags.raised(), vec!["high_atl_ctl_ratio", "low_tsb"]);
    }

    #[test]
    fn test_evaluate_flags_zero_ctl_never_ratio_flags() {
        let report = MetricsReport {
            load: LoadMetrics {
                ctl: 0.0,
                atl: 10.0,
                tsb: -10.0,
                ramp: None,
            },
            hrv_zscore: None,
        };
        let flags = evaluate_flags(&report, &ThresholdConfig::default());
        assert!(!flags.high_atl_ctl_ratio);
    }

    #[test]
    fn test_evaluate_flags_low_hrv_and_ramp() {
        let report = MetricsReport {
            load: LoadMetrics {
                ctl: 60.0,
                atl: 55.0,
                tsb: 5.0,
                ramp: Some(0.25),
            },
            hrv_zscore: Some(-1.5),
        };
        let flags = evaluate_flags(&report, &ThresholdConfig::default());
        assert!(flags.low_hrv);
        assert!(flags.high_ramp);
        assert!(!flags.low_tsb);
    }

    #[test]
    fn test_flagset_serializes_to_plain_bools() {
        let flags = FlagSet {
            low_hrv: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&flags).unwrap();
        assert_eq!(json["low_hrv"], serde_json::json!(true));
        assert_eq!(json["low_tsb"], serde_json::json!(false));
    }

    proptest! {
        /// EMAs stay within the bounds of the input series.
        #[test]
        fn prop_load_metrics_bounded(tss in proptest::collection::vec(0.0f64..500.0, 1..60)) {
            let activities: Vec<Activity> = tss
                .iter()
                .enumerate()
                .map(|(i, &t)| activity_on((i % 28 + 1) as u32, t))
                .collect();

            let metrics = compute_load_metrics(&activities);
            let min = tss.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = tss.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

            prop_assert!(metrics.ctl >= min - 1e-9 && metrics.ctl <= max + 1e-9);
            prop_assert!(metrics.atl >= min - 1e-9 && metrics.atl <= max + 1e-9);
        }

        /// A z-score, when present, is always finite.
        #[test]
        fn prop_zscore_finite(values in proptest::collection::vec(20.0f64..120.0, 30..90)) {
            let samples: Vec<HrvSample> = values
                .iter()
                .enumerate()
                .map(|(i, &v)| HrvSample {
                    day: chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
                        .unwrap()
                        .checked_add_days(chrono::Days::new(i as u64))
                        .unwrap(),
                    rmssd_ms: v,
                })
                .collect();

            if let Some(z) = compute_hrv_zscore(&samples) {
                prop_assert!(z.is_finite());
            }
        }
    }
}
