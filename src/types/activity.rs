//! Domain Records
//!
//! Typed workout and physiological records as emitted by the external fetch
//! CLI (JSON arrays on stdout). Field aliases cover the tracker's camelCase
//! naming so both raw exports and normalized rows deserialize.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A single recorded workout with its training stress score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    /// Tracker-assigned activity id
    #[serde(alias = "activityId", deserialize_with = "string_or_number")]
    pub id: String,

    /// Workout start time (UTC)
    #[serde(alias = "startTime")]
    pub start_time: DateTime<Utc>,

    /// Sport label as reported by the tracker
    #[serde(default, alias = "activityType")]
    pub sport: Option<String>,

    /// Moving duration in seconds
    #[serde(default, alias = "durationSecs")]
    pub duration_secs: Option<f64>,

    /// Distance in meters
    #[serde(default, alias = "distanceM")]
    pub distance_m: Option<f64>,

    /// Per-workout training stress score
    #[serde(alias = "trainingStressScore")]
    pub tss: f64,

    /// Average heart rate in bpm
    #[serde(default, alias = "avgHr")]
    pub avg_hr: Option<u32>,
}

/// One overnight heart-rate-variability reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HrvSample {
    /// Calendar day the reading belongs to
    #[serde(alias = "calendarDate", alias = "date")]
    pub day: NaiveDate,

    /// Overnight average RMSSD in milliseconds
    #[serde(alias = "hrv", alias = "lastNightAvg")]
    pub rmssd_ms: f64,
}

/// Accept both `"12345"` and `12345` for ids; trackers are inconsistent.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_from_tracker_json() {
        let raw = r#"{
            "activityId": 19384756,
            "startTime": "2026-07-12T06:30:00Z",
            "activityType": "running",
            "durationSecs": 3610.0,
            "distanceM": 12030.5,
            "trainingStressScore": 84.2,
            "avgHr": 152
        }"#;

        let activity: Activity = serde_json::from_str(raw).unwrap();
        assert_eq!(activity.id, "19384756");
        assert_eq!(activity.sport.as_deref(), Some("running"));
        assert!((activity.tss - 84.2).abs() < 1e-9);
        assert_eq!(activity.avg_hr, Some(152));
    }

    #[test]
    fn test_activity_from_normalized_json() {
        let raw = r#"{
            "id": "run-001",
            "start_time": "2026-07-12T06:30:00Z",
            "tss": 55.0
        }"#;

        let activity: Activity = serde_json::from_str(raw).unwrap();
        assert_eq!(activity.id, "run-001");
        assert_eq!(activity.sport, None);
        assert_eq!(activity.duration_secs, None);
    }

    #[test]
    fn test_hrv_sample_aliases() {
        let raw = r#"{"calendarDate": "2026-07-12", "lastNightAvg": 48.5}"#;
        let sample: HrvSample = serde_json::from_str(raw).unwrap();
        assert_eq!(sample.day, NaiveDate::from_ymd_opt(2026, 7, 12).unwrap());
        assert!((sample.rmssd_ms - 48.5).abs() < 1e-9);

        let raw = r#"{"day": "2026-07-13", "rmssd_ms": 51.0}"#;
        let sample: HrvSample = serde_json::from_str(raw).unwrap();
        assert_eq!(sample.day, NaiveDate::from_ymd_opt(2026, 7, 13).unwrap());
    }

    #[test]
    fn test_activity_array() {
        let raw = r#"[
            {"id": "a", "start_time": "2026-07-01T06:00:00Z", "tss": 40.0},
            {"id": "b", "start_time": "2026-07-02T06:00:00Z", "tss": 60.0}
        ]"#;
        let activities: Vec<Activity> = serde_json::from_str(raw).unwrap();
        assert_eq!(activities.len(), 2);
    }
}
