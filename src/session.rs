// Scan orchestration: capture -> hold selection -> detect -> grade -> auto-save.
// Sans-IO: handlers mutate state and return the next command; the caller performs
// the call and feeds the result back with the token it was issued under.
// See DESIGN.md: Scan Orchestrator

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::adapter::{self, RouteDocument};
use crate::error::ScanError;
use crate::mapping::CoordinateMapper;
use crate::services::{ColourFilterRequest, DetectionResponse, GradeResponse};
use crate::types::*;

const DETECT_CONTEXT: &str = "Detecting route";
const GRADE_CONTEXT: &str = "Reading route grade";
const SAVE_CONTEXT: &str = "Saving route";

/// Progress of one async step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Done,
    /// Holds the user-facing message.
    Failed(String),
}

impl Phase {
    pub fn is_running(&self) -> bool {
        matches!(self, Phase::Running)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Phase::Failed(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Work the host must perform on behalf of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    Detect {
        token: SessionToken,
        image_uri: String,
        request: ColourFilterRequest,
    },
    Grade {
        token: SessionToken,
        image_uri: String,
        route_name: Option<String>,
    },
    Save {
        token: SessionToken,
        document: RouteDocument,
    },
}

/// State owned by one capture lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScanSessionState {
    pub displayed_image_uri: Option<String>,
    pub is_annotated_image: bool,
    pub detection_result: Option<DetectionResponse>,
    pub hold_point_px: Option<ImagePoint>,
    pub hold_point_screen: Option<ScreenPoint>,
    pub is_holding: bool,
}

/// Snapshot of everything the scan screen renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub token: SessionToken,
    #[serde(flatten)]
    pub state: ScanSessionState,
    pub detection: Phase,
    pub grading: Phase,
    pub saving: Phase,
    pub grade_result: Option<GradeResponse>,
    pub route_id: Option<String>,
}

/// Orchestrates one scan screen. Construct on screen entry, drop on exit.
pub struct ScanSession {
    config: ScanConfig,
    mapper: CoordinateMapper,
    token: SessionToken,
    captured_image_uri: Option<String>,
    user_id: Option<String>,
    state: ScanSessionState,
    detection: Phase,
    grading: Phase,
    saving: Phase,
    grade_result: Option<GradeResponse>,
    route_id: Option<String>,
}

impl ScanSession {
    pub fn new(config: ScanConfig) -> Self {
        ScanSession {
            config,
            mapper: CoordinateMapper::new(),
            token: SessionToken::default(),
            captured_image_uri: None,
            user_id: None,
            state: ScanSessionState::default(),
            detection: Phase::Idle,
            grading: Phase::Idle,
            saving: Phase::Idle,
            grade_result: None,
            route_id: None,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn state(&self) -> &ScanSessionState {
        &self.state
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn captured_image_uri(&self) -> Option<&str> {
        self.captured_image_uri.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn detection(&self) -> &Phase {
        &self.detection
    }

    pub fn grading(&self) -> &Phase {
        &self.grading
    }

    pub fn saving(&self) -> &Phase {
        &self.saving
    }

    pub fn grade_result(&self) -> Option<&GradeResponse> {
        self.grade_result.as_ref()
    }

    pub fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            token: self.token,
            state: self.state.clone(),
            detection: self.detection.clone(),
            grading: self.grading.clone(),
            saving: self.saving.clone(),
            grade_result: self.grade_result.clone(),
            route_id: self.route_id.clone(),
        }
    }

    /// Signed-in user, pushed by the host's auth listener.
    pub fn set_current_user(&mut self, user_id: Option<String>) {
        self.user_id = user_id;
    }

    /// New capture (`Some`) or retake (`None`). Starts a new lifecycle whenever
    /// the URI differs from the current one.
    pub fn on_capture_changed(&mut self, image_uri: Option<String>) {
        if image_uri.is_some() && image_uri == self.captured_image_uri {
            return;
        }

        self.token = self.token.next();
        debug!(
            "capture changed to {:?}, session {}",
            image_uri,
            self.token.as_u64()
        );

        self.state = ScanSessionState {
            displayed_image_uri: image_uri.clone(),
            ..Default::default()
        };
        self.captured_image_uri = image_uri;
        self.mapper.clear_image();
        self.detection = Phase::Idle;
        self.grading = Phase::Idle;
        self.saving = Phase::Idle;
        self.grade_result = None;
        self.route_id = None;
    }

    /// Viewport was laid out or resized.
    pub fn on_layout(&mut self, container: ContainerDimensions) {
        self.mapper.set_container(container);
        self.refresh_hold_screen();
    }

    /// Intrinsic size of the captured image became known. Reports for any
    /// other URI belong to a superseded capture and are ignored.
    pub fn on_image_loaded(&mut self, image_uri: &str, image: ImageDimensions) -> bool {
        if self.captured_image_uri.as_deref() != Some(image_uri) {
            debug!("ignoring size of {}, not the current capture", image_uri);
            return false;
        }

        self.mapper.set_image(image);
        self.refresh_hold_screen();
        true
    }

    /// Returns whether the tap selected a hold.
    pub fn on_press_in(&mut self, tap_x: f64, tap_y: f64) -> bool {
        if self.state.is_annotated_image {
            return false;
        }

        let Some(point) = self.mapper.map_tap_to_image_pixels(tap_x, tap_y) else {
            return false;
        };

        self.state.is_holding = true;
        self.state.hold_point_px = Some(point);
        self.refresh_hold_screen();
        true
    }

    pub fn on_press_out(&mut self) {
        self.state.is_holding = false;
    }

    /// Start detection for the held point. No-op without a capture or hold,
    /// while a detection is running, or once the image is annotated.
    pub fn scan_route(&mut self) -> Option<Command> {
        let image_uri = self.captured_image_uri.clone()?;
        let hold = self.state.hold_point_px?;
        if self.state.is_annotated_image || self.detection.is_running() {
            return None;
        }

        let request = ColourFilterRequest {
            tap_x: hold.x,
            tap_y: hold.y,
            conf: self.config.confidence,
            colour_tolerance: self.config.colour_tolerance,
            return_annotated_image: self.config.return_annotated_image,
        };
        info!("scanning route at pixel ({}, {})", hold.x, hold.y);

        self.detection = Phase::Running;
        Some(Command::Detect {
            token: self.token,
            image_uri,
            request,
        })
    }

    /// Apply a detector result. On success with an annotated image, returns the grade command.
    pub fn on_detection_complete(
        &mut self,
        token: SessionToken,
        result: Result<DetectionResponse, ScanError>,
    ) -> Option<Command> {
        if !self.is_current(token, "detection") {
            return None;
        }

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn!("detection failed: {}", err);
                self.detection = Phase::Failed(err.user_message(DETECT_CONTEXT));
                return None;
            }
        };
        self.detection = Phase::Done;

        let Some(reference) = response.image_with_boxes.as_deref() else {
            info!("detector returned no annotated image");
            return None;
        };
        let annotated = self.config.resolve_url(reference);
        debug!(
            "detected {} holds of colour {:?}",
            response.detections_count(),
            response.selected_colour
        );

        self.state.displayed_image_uri = Some(annotated.clone());
        self.state.is_annotated_image = true;
        self.state.detection_result = Some(response);
        self.refresh_hold_screen();

        self.grading = Phase::Running;
        Some(Command::Grade {
            token: self.token,
            image_uri: annotated,
            route_name: self.config.route_name.clone(),
        })
    }

    /// Apply a grader result. Returns the save command if the auto-save fires.
    pub fn on_grade_complete(
        &mut self,
        token: SessionToken,
        result: Result<GradeResponse, ScanError>,
    ) -> Option<Command> {
        if !self.is_current(token, "grading") {
            return None;
        }

        match result {
            Ok(grade) => {
                info!("route graded {} ({:.2})", grade.v_grade, grade.confidence);
                self.grading = Phase::Done;
                self.grade_result = Some(grade);
                self.evaluate_auto_save()
            }
            Err(err) => {
                warn!("grade reading failed: {}", err);
                self.grading = Phase::Failed(err.user_message(GRADE_CONTEXT));
                None
            }
        }
    }

    /// Fires at most once per lifecycle: needs a grade, a detection, no save in
    /// flight, no failed save awaiting retry and no route id yet. The in-flight
    /// flag is set before the command is handed out.
    pub fn evaluate_auto_save(&mut self) -> Option<Command> {
        let grade = self.grade_result.as_ref()?;
        let detection = self.state.detection_result.as_ref()?;
        let image_url = self.state.displayed_image_uri.as_deref()?;
        if self.saving != Phase::Idle || self.route_id.is_some() {
            return None;
        }

        let Some(user_id) = self.user_id.as_deref() else {
            warn!("cannot save route: {}", ScanError::AuthRequired);
            return None;
        };

        let document = adapter::to_document(user_id, image_url, grade, detection);
        self.saving = Phase::Running;
        Some(Command::Save {
            token: self.token,
            document,
        })
    }

    pub fn on_save_complete(
        &mut self,
        token: SessionToken,
        result: Result<String, ScanError>,
    ) {
        if !self.is_current(token, "save") {
            return;
        }

        match result {
            Ok(route_id) => {
                info!("route saved as {}", route_id);
                self.route_id = Some(route_id);
                self.saving = Phase::Done;
            }
            Err(err) => {
                warn!("saving route failed: {}", err);
                self.saving = Phase::Failed(err.user_message(SAVE_CONTEXT));
            }
        }
    }

    /// Manual retry after a failed save.
    pub fn retry_save(&mut self) -> Option<Command> {
        if self.saving.error().is_none() {
            return None;
        }
        self.saving = Phase::Idle;
        self.evaluate_auto_save()
    }

    fn is_current(&self, token: SessionToken, step: &str) -> bool {
        if token != self.token {
            warn!(
                "dropping stale {} result from session {} (current {})",
                step,
                token.as_u64(),
                self.token.as_u64()
            );
            return false;
        }
        true
    }

    // Keeps the previous marker if the projection is unavailable.
    fn refresh_hold_screen(&mut self) {
        let Some(px) = self.state.hold_point_px else {
            return;
        };
        if let Some(screen) = self.mapper.map_image_pixels_to_screen(px.x, px.y) {
            self.state.hold_point_screen = Some(screen);
        }
    }
}
