use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored capture. Immutable after insert; `id` and `created_at` are
/// assigned by Postgres.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub id: i64,
    pub url: String,
    pub html: String,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /capture`. `url` stays optional so a missing field maps to
/// a 400 envelope instead of a deserialization error.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureRequest {
    pub url: Option<String>,
}

/// What a successful capture reports back: the source URL and the size of the
/// markup that was persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureSummary {
    pub url: String,
    #[serde(rename = "htmlLength")]
    pub html_length: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn summary_serializes_html_length_in_camel_case() {
        let s = CaptureSummary {
            url: "https://example.com".into(),
            html_length: 1234,
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["url"], "https://example.com");
        assert_eq!(v["htmlLength"], 1234);
    }

    #[test]
    fn record_serializes_created_at_as_rfc3339() {
        let rec = CaptureRecord {
            id: 7,
            url: "https://example.com".into(),
            html: "<html></html>".into(),
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap(),
        };
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["id"], 7);
        assert_eq!(v["created_at"], "2025-03-01T12:30:00Z");
    }

    #[test]
    fn capture_request_tolerates_missing_url() {
        let req: CaptureRequest = serde_json::from_str("{}").unwrap();
        assert!(req.url.is_none());

        let req: CaptureRequest =
            serde_json::from_str(r#"{"url":"https://example.com"}"#).unwrap();
        assert_eq!(req.url.as_deref(), Some("https://example.com"));
    }
}
