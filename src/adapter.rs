// Result adapter: detection + grade -> persisted route document.
// See DESIGN.md: Result Adapter

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::services::{DetectionResponse, GradeResponse};

/// Flattened detector metadata stored with a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DetectionMetadata {
    pub tap_x: i64,
    pub tap_y: i64,
    pub selected_colour: String,
    pub colour_confidence: f64,
    pub detections_count: usize,
}

impl DetectionMetadata {
    /// Absent fields default to zero / empty; a non-list `detections` counts as zero.
    /// Tap coordinates are rounded to whole pixels.
    pub fn from_response(response: &DetectionResponse) -> Self {
        DetectionMetadata {
            tap_x: response.tap_x.map_or(0, |x| x.round() as i64),
            tap_y: response.tap_y.map_or(0, |y| y.round() as i64),
            selected_colour: response.selected_colour.clone().unwrap_or_default(),
            colour_confidence: response.colour_confidence.unwrap_or(0.0),
            detections_count: response.detections_count(),
        }
    }
}

/// Server-assigned time as the host serializes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerTime {
    /// Store timestamp object.
    Timestamp { seconds: i64, nanoseconds: i64 },
    /// Bare number, in seconds.
    Seconds(f64),
    /// Pending sentinel or anything else the store hands back.
    Other(Value),
}

impl ServerTime {
    pub fn as_millis(&self) -> Option<f64> {
        match self {
            ServerTime::Timestamp {
                seconds,
                nanoseconds,
            } => Some(*seconds as f64 * 1000.0 + (*nanoseconds / 1_000_000) as f64),
            ServerTime::Seconds(s) if s.is_finite() => Some(s * 1000.0),
            _ => None,
        }
    }
}

/// A scanned route as persisted in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub image_url: String,
    /// Storage reference; the annotated image URL doubles as the path.
    pub image_path: String,
    pub grade: GradeResponse,
    #[serde(default)]
    pub detection: DetectionMetadata,
    /// Client capture time, ms since epoch. Older documents may lack it.
    #[serde(default)]
    pub timestamp: u64,
    /// User edits made after the scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<ServerTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<ServerTime>,
}

impl RouteDocument {
    pub(crate) fn sort_key(&self) -> f64 {
        self.created_at
            .as_ref()
            .and_then(ServerTime::as_millis)
            .unwrap_or(self.timestamp as f64)
    }
}

/// Build the persisted document, stamped with the current client time.
pub fn to_document(
    user_id: &str,
    annotated_image_url: &str,
    grade: &GradeResponse,
    detection: &DetectionResponse,
) -> RouteDocument {
    to_document_at(user_id, annotated_image_url, grade, detection, now_millis())
}

/// Same as `to_document` with an explicit timestamp.
pub fn to_document_at(
    user_id: &str,
    annotated_image_url: &str,
    grade: &GradeResponse,
    detection: &DetectionResponse,
    timestamp_ms: u64,
) -> RouteDocument {
    RouteDocument {
        id: None,
        user_id: user_id.to_string(),
        image_url: annotated_image_url.to_string(),
        image_path: annotated_image_url.to_string(),
        grade: grade.clone(),
        detection: DetectionMetadata::from_response(detection),
        timestamp: timestamp_ms,
        route_name: None,
        manual_grade: None,
        notes: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn now_millis() -> u64 {
    web_time::SystemTime::now()
        .duration_since(web_time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::sort_newest_first;

    pub(crate) fn sample_grade() -> GradeResponse {
        GradeResponse {
            v_grade: "V4".to_string(),
            confidence: 0.82,
            reasoning: "Crimpy traverse".to_string(),
            key_factors: vec!["small holds".to_string()],
            difficulty_notes: "Hard start".to_string(),
            model_used: "grader-v1".to_string(),
            analysis_timestamp: 1_700_000_000.0,
            error: None,
        }
    }

    fn doc_at(timestamp: u64, created_at: Option<ServerTime>) -> RouteDocument {
        let mut doc = to_document_at(
            "u1",
            "https://x/a.jpg",
            &sample_grade(),
            &DetectionResponse::default(),
            timestamp,
        );
        doc.created_at = created_at;
        doc
    }

    #[test]
    fn missing_detection_fields_default() {
        let doc = to_document_at(
            "u1",
            "https://x/a.jpg",
            &sample_grade(),
            &DetectionResponse::default(),
            42,
        );
        assert_eq!(doc.detection, DetectionMetadata::default());
        assert_eq!(doc.detection.selected_colour, "");
        assert_eq!(doc.detection.detections_count, 0);
        assert_eq!(doc.timestamp, 42);
    }

    #[test]
    fn annotated_url_is_both_url_and_path() {
        let detection = DetectionResponse {
            tap_x: Some(10.4),
            tap_y: Some(19.6),
            selected_colour: Some("yellow".to_string()),
            colour_confidence: Some(0.9),
            detections: Some(serde_json::json!([{"box": [0, 0, 1, 1]}])),
            image_with_boxes: Some("/static/a.jpg".to_string()),
        };
        let doc = to_document_at("u1", "https://x/a.jpg", &sample_grade(), &detection, 1);
        assert_eq!(doc.image_url, doc.image_path);
        assert_eq!(doc.detection.tap_x, 10);
        assert_eq!(doc.detection.tap_y, 20);
        assert_eq!(doc.detection.selected_colour, "yellow");
        assert_eq!(doc.detection.detections_count, 1);
        assert_eq!(doc.grade.v_grade, "V4");
    }

    #[test]
    fn to_document_stamps_current_time() {
        let before = now_millis();
        let doc = to_document("u1", "a", &sample_grade(), &DetectionResponse::default());
        assert!(doc.timestamp >= before);
    }

    #[test]
    fn document_serializes_with_store_field_names() {
        let doc = doc_at(5, None);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["imagePath"], "https://x/a.jpg");
        assert!(json.get("createdAt").is_none());
        assert_eq!(json["detection"]["detections_count"], 0);
    }

    #[test]
    fn stored_route_without_client_timestamp_still_loads() {
        let json = r#"[
            {"id":"a","userId":"u","imageUrl":"https://x/a.jpg","imagePath":"https://x/a.jpg",
             "grade":{"v_grade":"V1","confidence":0.5},
             "createdAt":{"seconds":5,"nanoseconds":0}},
            {"id":"b","userId":"u","imageUrl":"https://x/b.jpg","imagePath":"https://x/b.jpg",
             "grade":{"v_grade":"V2","confidence":0.6},
             "detection":{"tap_x":1,"tap_y":2,"selected_colour":"red","colour_confidence":0.9,"detections_count":3},
             "timestamp":9000}
        ]"#;
        let mut routes: Vec<RouteDocument> = serde_json::from_str(json).unwrap();
        assert_eq!(routes[0].timestamp, 0);
        assert_eq!(routes[0].detection, DetectionMetadata::default());

        sort_newest_first(&mut routes);
        let ids: Vec<_> = routes.iter().filter_map(|r| r.id.as_deref()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn server_time_parses_each_shape() {
        let ts: ServerTime = serde_json::from_str(r#"{"seconds":2,"nanoseconds":5000000}"#).unwrap();
        assert_eq!(ts.as_millis(), Some(2005.0));
        let secs: ServerTime = serde_json::from_str("3").unwrap();
        assert_eq!(secs.as_millis(), Some(3000.0));
        let other: ServerTime = serde_json::from_str(r#""pending""#).unwrap();
        assert_eq!(other.as_millis(), None);
    }

    #[test]
    fn sort_prefers_server_time_then_client_timestamp() {
        let mut routes = vec![
            doc_at(1_000, Some(ServerTime::Seconds(1.0))), // 1000 ms
            doc_at(9_000, None),                           // falls back to 9000
            doc_at(0, Some(ServerTime::Timestamp { seconds: 5, nanoseconds: 0 })),
            doc_at(7_000, Some(ServerTime::Other(Value::Null))),
        ];
        sort_newest_first(&mut routes);
        let keys: Vec<f64> = routes.iter().map(|r| r.sort_key()).collect();
        assert_eq!(keys, vec![9_000.0, 7_000.0, 5_000.0, 1_000.0]);
    }
}
