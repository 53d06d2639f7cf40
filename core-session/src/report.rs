//! Report projections.
//!
//! Reports, session summaries and analysis results are read-only views
//! fetched on demand from the native layer; nothing here is cached in the
//! store. Payloads arrive as raw JSON in inconsistent key casing and, for
//! single reports, in two different shapes: the Android binding nests the
//! session under a `session` key, the iOS binding sometimes returns the
//! flat session-summary form. [`reshape_report`] folds the flat form into
//! the nested `{session, stat}` shape before typing; neither shape is
//! assumed canonical.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A backend-computed summary of one tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Report {
    pub timezone: Option<String>,
    pub session: ReportSession,
    pub missing_data_ratio: Option<f64>,
    pub peculiarities: Vec<String>,
    pub stat: Option<SleepStat>,
}

/// The session portion of a [`Report`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportSession {
    pub id: Option<String>,
    pub state: Option<String>,
    pub created_timezone: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub unexpected_end_time: Option<String>,
    pub sleep_stages: Option<Vec<i32>>,
    pub breath_stages: Option<Vec<i32>>,
    pub snoring_stages: Option<Vec<i32>>,
}

/// Entry of a report-list query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSummary {
    pub session_id: String,
    pub state: Option<String>,
    pub session_start_time: Option<String>,
    pub session_end_time: Option<String>,
    pub time_in_bed: Option<i64>,
}

/// Result of an on-device analysis pass (session-shaped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisResult {
    pub id: Option<String>,
    pub state: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub sleep_stages: Option<Vec<i32>>,
    pub breath_stages: Option<Vec<i32>>,
    pub snoring_stages: Option<Vec<i32>>,
}

/// Named sleep metrics attached to a finished report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SleepStat {
    pub sleep_cycle_time: Option<Vec<f64>>,
    pub time_in_stable_breath: Option<f64>,
    pub time_in_bed: Option<f64>,
    pub unstable_breath_ratio: Option<f64>,
    pub sleep_cycle: Option<f64>,
    pub time_in_sleep: Option<f64>,
    pub breathing_index: Option<f64>,
    pub deep_latency: Option<f64>,
    pub rem_latency: Option<f64>,
    pub time_in_snoring: Option<f64>,
    pub wake_time: Option<String>,
    pub longest_waso: Option<f64>,
    pub light_ratio: Option<f64>,
    pub no_snoring_ratio: Option<f64>,
    pub snoring_count: Option<f64>,
    pub unstable_breath_count: Option<f64>,
    pub time_in_deep: Option<f64>,
    pub sleep_time: Option<String>,
    pub sleep_cycle_count: Option<f64>,
    pub wakeup_latency: Option<f64>,
    pub breathing_pattern: Option<String>,
    pub time_in_rem: Option<f64>,
    pub snoring_ratio: Option<f64>,
    pub stable_breath_ratio: Option<f64>,
    pub time_in_sleep_period: Option<f64>,
    pub light_latency: Option<f64>,
    pub rem_ratio: Option<f64>,
    pub sleep_efficiency: Option<f64>,
    pub time_in_no_snoring: Option<f64>,
    pub sleep_latency: Option<f64>,
    pub time_in_light: Option<f64>,
    pub sleep_index: Option<f64>,
    pub sleep_ratio: Option<f64>,
    pub time_in_unstable_breath: Option<f64>,
    pub waso_count: Option<f64>,
    pub wake_ratio: Option<f64>,
    pub deep_ratio: Option<f64>,
    pub time_in_wake: Option<f64>,
}

/// Keys of the flat session-summary form that move under `session`, with
/// their nested names.
const SESSION_RENAMES: [(&str, &str); 3] = [
    ("sessionId", "id"),
    ("sessionStartTime", "startTime"),
    ("sessionEndTime", "endTime"),
];

/// Keys that belong to the session whether the payload is flat or nested.
const SESSION_FIELDS: [&str; 9] = [
    "id",
    "state",
    "createdTimezone",
    "startTime",
    "endTime",
    "unexpectedEndTime",
    "sleepStages",
    "breathStages",
    "snoringStages",
];

/// Flat-form metric keys that belong under `stat`.
const STAT_FIELDS: [&str; 1] = ["timeInBed"];

/// Fold a flat session-like report payload into the nested
/// `{session, stat}` shape. Already-nested payloads pass through untouched.
///
/// Expects camelCase keys, i.e. run after
/// [`camelize_keys`](core_runtime::normalize::camelize_keys).
pub fn reshape_report(value: Value) -> Value {
    let Value::Object(mut fields) = value else {
        return value;
    };
    if fields.contains_key("session") {
        return Value::Object(fields);
    }
    let looks_like_session = fields.contains_key("sessionId")
        || fields.contains_key("id")
        || fields.contains_key("sessionStartTime");
    if !looks_like_session {
        return Value::Object(fields);
    }

    let mut session = Map::new();
    for (flat, nested) in SESSION_RENAMES {
        if let Some(v) = fields.remove(flat) {
            session.insert(nested.to_string(), v);
        }
    }
    for key in SESSION_FIELDS {
        if let Some(v) = fields.remove(key) {
            session.insert(key.to_string(), v);
        }
    }

    let mut stat = Map::new();
    for key in STAT_FIELDS {
        if let Some(v) = fields.remove(key) {
            stat.insert(key.to_string(), v);
        }
    }

    fields.insert("session".to_string(), Value::Object(session));
    if !stat.is_empty() {
        fields.insert("stat".to_string(), Value::Object(stat));
    }
    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_payload_is_nested() {
        let flat = json!({
            "sessionId": "abc",
            "state": "done",
            "sessionStartTime": "t0"
        });
        let report: Report = serde_json::from_value(reshape_report(flat)).unwrap();
        assert_eq!(report.session.id.as_deref(), Some("abc"));
        assert_eq!(report.session.state.as_deref(), Some("done"));
        assert_eq!(report.session.start_time.as_deref(), Some("t0"));
    }

    #[test]
    fn flat_time_in_bed_moves_under_stat() {
        let flat = json!({
            "sessionId": "abc",
            "state": "done",
            "timeInBed": 420
        });
        let report: Report = serde_json::from_value(reshape_report(flat)).unwrap();
        assert_eq!(report.stat.unwrap().time_in_bed, Some(420.0));
    }

    #[test]
    fn nested_payload_passes_through() {
        let nested = json!({
            "timezone": "Asia/Seoul",
            "session": { "id": "xyz", "state": "COMPLETE", "sleepStages": [0, 1, 2] },
            "missingDataRatio": 0.1,
            "peculiarities": ["NO_BREATHING_STABILITY"],
            "stat": { "sleepEfficiency": 0.92, "sleepIndex": 87 }
        });
        let report: Report = serde_json::from_value(reshape_report(nested)).unwrap();
        assert_eq!(report.session.id.as_deref(), Some("xyz"));
        assert_eq!(report.session.sleep_stages, Some(vec![0, 1, 2]));
        let stat = report.stat.unwrap();
        assert_eq!(stat.sleep_efficiency, Some(0.92));
        assert_eq!(stat.sleep_index, Some(87.0));
        assert_eq!(report.peculiarities, vec!["NO_BREATHING_STABILITY"]);
    }

    #[test]
    fn non_session_payload_is_untouched() {
        let other = json!({ "averageSleepEfficiency": 0.9 });
        assert_eq!(reshape_report(other.clone()), other);
    }

    #[test]
    fn summary_deserializes_unknown_fields_leniently() {
        let raw = json!({
            "sessionId": "s1",
            "state": "COMPLETE",
            "sessionStartTime": "2024-05-01T22:00:00+00:00",
            "somethingNew": true
        });
        let summary: SessionSummary = serde_json::from_value(raw).unwrap();
        assert_eq!(summary.session_id, "s1");
        assert!(summary.session_end_time.is_none());
    }
}
