// Collaborator contracts: detector, grader, document store, object storage.
// The host implements these over HTTP and the cloud SDKs; the core only sequences them.
// See DESIGN.md: External interfaces

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::adapter::RouteDocument;
use crate::error::ScanError;
use crate::types::ScanConfig;

pub const DETECT_PATH: &str = "/routes/detect-by-colour";
pub const GRADE_PATH: &str = "/routes/analyse-grade";
pub const HEALTH_PATH: &str = "/health";

/// Query parameters of a detect-by-colour call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColourFilterRequest {
    pub tap_x: u32,
    pub tap_y: u32,
    pub conf: f64,
    pub colour_tolerance: f64,
    pub return_annotated_image: bool,
}

/// Detector response. Every field is optional on the wire; see
/// `DetectionMetadata::from_response` for the defaults applied when persisting.
/// Numeric fields take any JSON number; other values read as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DetectionResponse {
    #[serde(default, deserialize_with = "lenient_number")]
    pub tap_x: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub tap_y: Option<f64>,
    #[serde(default)]
    pub selected_colour: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub colour_confidence: Option<f64>,
    /// Kept untyped: only its length matters, and only when it is a list.
    #[serde(default)]
    pub detections: Option<Value>,
    #[serde(default)]
    pub image_with_boxes: Option<String>,
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite()))
}

impl DetectionResponse {
    pub fn detections_count(&self) -> usize {
        match &self.detections {
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        }
    }
}

/// Grader response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResponse {
    pub v_grade: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub key_factors: Vec<String>,
    #[serde(default)]
    pub difficulty_notes: String,
    #[serde(default)]
    pub model_used: String,
    #[serde(default)]
    pub analysis_timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

/// Description of one backend call, executed by the host's HTTP stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestSpec {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    /// Image sent as the multipart `file` part, if any.
    pub file_uri: Option<String>,
    pub file_name: Option<String>,
    pub timeout_ms: u64,
}

impl HttpRequestSpec {
    pub fn detect(config: &ScanConfig, image_uri: &str, request: &ColourFilterRequest) -> Self {
        HttpRequestSpec {
            method: HttpMethod::Post,
            url: config.resolve_url(DETECT_PATH),
            query: vec![
                ("tap_x".to_string(), request.tap_x.to_string()),
                ("tap_y".to_string(), request.tap_y.to_string()),
                ("conf".to_string(), request.conf.to_string()),
                (
                    "colour_tolerance".to_string(),
                    request.colour_tolerance.to_string(),
                ),
                (
                    "return_annotated_image".to_string(),
                    request.return_annotated_image.to_string(),
                ),
            ],
            file_uri: Some(image_uri.to_string()),
            file_name: Some("photo.jpg".to_string()),
            timeout_ms: config.analysis_timeout_ms,
        }
    }

    pub fn grade(config: &ScanConfig, image_uri: &str, route_name: Option<&str>) -> Self {
        let query = route_name
            .map(|name| vec![("route_name".to_string(), name.to_string())])
            .unwrap_or_default();
        HttpRequestSpec {
            method: HttpMethod::Post,
            url: config.resolve_url(GRADE_PATH),
            query,
            file_uri: Some(image_uri.to_string()),
            file_name: Some("annotated.jpg".to_string()),
            timeout_ms: config.analysis_timeout_ms,
        }
    }

    pub fn health(config: &ScanConfig) -> Self {
        HttpRequestSpec {
            method: HttpMethod::Get,
            url: config.resolve_url(HEALTH_PATH),
            query: Vec::new(),
            file_uri: None,
            file_name: None,
            timeout_ms: config.health_timeout_ms,
        }
    }
}

// Single-threaded host: futures are never sent across threads.
#[allow(async_fn_in_trait)]
pub trait Detector {
    async fn detect(
        &self,
        image_uri: &str,
        request: &ColourFilterRequest,
    ) -> Result<DetectionResponse, ScanError>;

    async fn check_health(&self) -> Result<HealthResponse, ScanError>;
}

#[allow(async_fn_in_trait)]
pub trait Grader {
    async fn grade(
        &self,
        image_uri: &str,
        route_name: Option<&str>,
    ) -> Result<GradeResponse, ScanError>;
}

#[allow(async_fn_in_trait)]
pub trait RouteStore {
    /// Persist a new document and return its identifier.
    async fn save(&self, document: &RouteDocument) -> Result<String, ScanError>;

    async fn get(&self, route_id: &str) -> Result<Option<RouteDocument>, ScanError>;

    async fn update(&self, route_id: &str, fields: &Map<String, Value>) -> Result<(), ScanError>;

    async fn delete(&self, route_id: &str) -> Result<(), ScanError>;

    /// Unordered; callers sort with `sort_newest_first`.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<RouteDocument>, ScanError>;

    async fn delete_user_routes(&self, user_id: &str) -> Result<(), ScanError>;
}

#[allow(async_fn_in_trait)]
pub trait ObjectStorage {
    /// Upload an image and return its public URL.
    async fn upload(&self, source_uri: &str, destination_key: &str) -> Result<String, ScanError>;

    /// Implementations treat an already-missing object as success.
    async fn delete(&self, path_or_url: &str) -> Result<(), ScanError>;
}

/// Order routes newest first by server creation time, falling back to the
/// client timestamp when the server value is missing or malformed.
pub fn sort_newest_first(routes: &mut [RouteDocument]) {
    routes.sort_by(|a, b| b.sort_key().total_cmp(&a.sort_key()));
}
