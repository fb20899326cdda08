// Strong typing over bare numbers. Newtypes for session generations, pixel and screen spaces.
// See DESIGN.md: Data model

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Intrinsic pixel size of a loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        ImageDimensions { width, height }
    }
}

/// Last-measured on-screen size of the image viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ContainerDimensions {
    pub width: f64,
    pub height: f64,
}

impl ContainerDimensions {
    pub fn new(width: f64, height: f64) -> Self {
        ContainerDimensions { width, height }
    }
}

/// Point in the pixel space of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePoint {
    pub x: u32,
    pub y: u32,
}

impl ImagePoint {
    pub fn new(x: u32, y: u32) -> Self {
        ImagePoint { x, y }
    }
}

/// Point in container (viewport) space. Only used to place the hold marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub sx: f64,
    pub sy: f64,
}

impl ScreenPoint {
    pub fn new(sx: f64, sy: f64) -> Self {
        ScreenPoint { sx, sy }
    }
}

/// Capture lifecycle generation. Every async command carries the token it was
/// issued under; completions with a stale token are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct SessionToken(u64);

impl SessionToken {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        SessionToken(self.0.wrapping_add(1))
    }
}

/// Scan configuration passed from JS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Backend origin used to absolutise relative annotated-image paths.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Detector confidence threshold.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Colour-distance tolerance around the tapped hold colour.
    #[serde(default = "default_colour_tolerance")]
    pub colour_tolerance: f64,
    #[serde(default = "default_true")]
    pub return_annotated_image: bool,
    /// Budget for detector/grader calls. Long enough for a cold backend.
    #[serde(default = "default_analysis_timeout")]
    pub analysis_timeout_ms: u64,
    #[serde(default = "default_health_timeout")]
    pub health_timeout_ms: u64,
    /// Optional route name forwarded to the grader.
    #[serde(default)]
    pub route_name: Option<String>,
    #[serde(default)]
    pub debug_logging: bool,
}

fn default_api_base_url() -> String {
    "https://ascendbackend-b2f7.onrender.com".to_string()
}

fn default_confidence() -> f64 {
    0.25
}

fn default_colour_tolerance() -> f64 {
    10.0
}

fn default_true() -> bool {
    true
}

fn default_analysis_timeout() -> u64 {
    180_000 // 3 min
}

fn default_health_timeout() -> u64 {
    10_000
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            api_base_url: default_api_base_url(),
            confidence: default_confidence(),
            colour_tolerance: default_colour_tolerance(),
            return_annotated_image: true,
            analysis_timeout_ms: default_analysis_timeout(),
            health_timeout_ms: default_health_timeout(),
            route_name: None,
            debug_logging: false,
        }
    }
}

impl ScanConfig {
    pub fn from_json(json: &str) -> Result<Self, ScanError> {
        serde_json::from_str(json).map_err(|e| ScanError::InvalidConfig(e.to_string()))
    }

    /// Resolve a detector image reference to an absolute address.
    pub fn resolve_url(&self, reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return reference.to_string();
        }
        let base = self.api_base_url.trim_end_matches('/');
        if reference.starts_with('/') {
            format!("{}{}", base, reference)
        } else {
            format!("{}/{}", base, reference)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_from_empty_json() {
        let config: ScanConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.confidence, 0.25);
        assert_eq!(config.colour_tolerance, 10.0);
        assert!(config.return_annotated_image);
        assert_eq!(config.analysis_timeout_ms, 180_000);
        assert!(config.route_name.is_none());
    }

    #[test]
    fn invalid_config_json_is_rejected() {
        let err = ScanConfig::from_json(r#"{"confidence":"high"}"#).unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig(_)));
        let config = ScanConfig::from_json(r#"{"route_name":"Project"}"#).unwrap();
        assert_eq!(config.route_name.as_deref(), Some("Project"));
    }

    #[test]
    fn resolve_url_keeps_absolute_references() {
        let config = ScanConfig::default();
        assert_eq!(
            config.resolve_url("https://cdn.example.com/a.jpg"),
            "https://cdn.example.com/a.jpg"
        );
    }

    #[test]
    fn resolve_url_prefixes_relative_references() {
        let config = ScanConfig {
            api_base_url: "https://api.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_url("/static/boxes.jpg"),
            "https://api.example.com/static/boxes.jpg"
        );
        assert_eq!(
            config.resolve_url("static/boxes.jpg"),
            "https://api.example.com/static/boxes.jpg"
        );
    }

    #[test]
    fn session_token_advances() {
        let t = SessionToken::default();
        assert_eq!(t.next().as_u64(), 1);
        assert_ne!(t, t.next());
    }
}
