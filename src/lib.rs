// ascend_core: Rust/WASM core of the Ascend route scanner.
// The JS app renders, measures layout and talks to the cloud; every scan decision lives here.
// See DESIGN.md for the module map.

pub mod adapter;
pub mod bridge;
pub mod error;
pub mod history;
pub mod logging;
pub mod mapping;
pub mod pipeline;
pub mod services;
pub mod session;
pub mod types;

use std::cell::{RefCell, RefMut};
use std::rc::Rc;

use js_sys::Promise;
use log::LevelFilter;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

pub use adapter::{to_document, DetectionMetadata, RouteDocument};
pub use bridge::JsBackend;
pub use error::{HttpFailure, ScanError, StoreErrorKind};
pub use mapping::CoordinateMapper;
pub use pipeline::ScanPipeline;
pub use session::{Command, Phase, ScanSession, ScanSessionState, SessionView};
pub use types::*;

/// Initialize panic hook and console logging.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    logging::init(LevelFilter::Info);
}

fn to_js_error(err: ScanError, context: &str) -> JsValue {
    JsValue::from_str(&err.user_message(context))
}

/// Scan screen controller exposed to JavaScript. One instance per mounted screen.
#[wasm_bindgen]
pub struct ScanEngine {
    pipeline: ScanPipeline<JsBackend, JsBackend, JsBackend>,
    backend: Rc<JsBackend>,
}

impl ScanEngine {
    fn session(&self) -> RefMut<'_, ScanSession> {
        self.pipeline.session().borrow_mut()
    }

    fn current_user(&self) -> Option<String> {
        self.pipeline.session().borrow().user_id().map(str::to_string)
    }
}

#[wasm_bindgen]
impl ScanEngine {
    /// `host` provides the functions documented on `JsBackend`.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str, host: JsValue) -> Result<ScanEngine, JsValue> {
        let config = ScanConfig::from_json(config_json)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        if config.debug_logging {
            log::set_max_level(LevelFilter::Debug);
        }

        let backend = Rc::new(JsBackend::new(config.clone(), host));
        let session = Rc::new(RefCell::new(ScanSession::new(config)));
        let pipeline = ScanPipeline::new(
            session,
            Rc::clone(&backend),
            Rc::clone(&backend),
            Rc::clone(&backend),
        );

        Ok(ScanEngine { pipeline, backend })
    }

    /// New photo URI, or `undefined` on retake.
    pub fn on_capture_changed(&self, image_uri: Option<String>) {
        self.session().on_capture_changed(image_uri);
    }

    pub fn on_layout(&self, width: f64, height: f64) {
        self.session()
            .on_layout(ContainerDimensions::new(width, height));
    }

    /// Size of `image_uri`; ignored unless it is the current capture.
    pub fn on_image_loaded(&self, image_uri: &str, width: u32, height: u32) -> bool {
        self.session()
            .on_image_loaded(image_uri, ImageDimensions::new(width, height))
    }

    pub fn on_press_in(&self, tap_x: f64, tap_y: f64) -> bool {
        self.session().on_press_in(tap_x, tap_y)
    }

    pub fn on_press_out(&self) {
        self.session().on_press_out();
    }

    /// Called from the host's auth-state listener.
    pub fn set_current_user(&self, user_id: Option<String>) {
        self.session().set_current_user(user_id);
    }

    /// Runs detect, grade and auto-save. Resolves when the chain settles;
    /// outcomes are read back through `view()`.
    pub fn scan_route(&self) -> Promise {
        let pipeline = self.pipeline.clone();
        future_to_promise(async move {
            pipeline.scan_route().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn retry_save(&self) -> Promise {
        let pipeline = self.pipeline.clone();
        future_to_promise(async move {
            pipeline.retry_save().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// JSON snapshot of the screen state.
    pub fn view(&self) -> Result<String, JsValue> {
        let view = self.pipeline.session().borrow().view();
        serde_json::to_string(&view)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Past routes of the signed-in user as a JSON array, newest first.
    pub fn load_routes(&self) -> Promise {
        let backend = Rc::clone(&self.backend);
        let user_id = self.current_user();
        future_to_promise(async move {
            let routes = history::load_routes(backend.as_ref(), user_id.as_deref())
                .await
                .map_err(|e| to_js_error(e, "Loading routes"))?;
            let json = serde_json::to_string(&routes)
                .map_err(|e| to_js_error(e.into(), "Loading routes"))?;
            Ok(JsValue::from_str(&json))
        })
    }

    pub fn delete_route(&self, route_id: String) -> Promise {
        let backend = Rc::clone(&self.backend);
        future_to_promise(async move {
            history::delete_route(backend.as_ref(), backend.as_ref(), &route_id)
                .await
                .map_err(|e| to_js_error(e, "Deleting route"))?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Apply detail-screen edits (`{"routeName","manualGrade","notes"}`).
    /// Resolves with whether anything was written.
    pub fn update_route(&self, route_id: String, edits_json: String) -> Promise {
        let backend = Rc::clone(&self.backend);
        future_to_promise(async move {
            let edits: history::RouteEdits = serde_json::from_str(&edits_json)
                .map_err(|e| to_js_error(e.into(), "Updating route"))?;
            let written = history::update_route(backend.as_ref(), &route_id, &edits)
                .await
                .map_err(|e| to_js_error(e, "Updating route"))?;
            Ok(JsValue::from_bool(written))
        })
    }

    /// Upload an image into the signed-in user's route folder. Resolves with its URL.
    pub fn upload_route_image(&self, source_uri: String) -> Promise {
        let backend = Rc::clone(&self.backend);
        let user_id = self.current_user();
        future_to_promise(async move {
            let url = history::upload_route_image(backend.as_ref(), user_id.as_deref(), &source_uri)
                .await
                .map_err(|e| to_js_error(e, "Uploading image"))?;
            Ok(JsValue::from_str(&url))
        })
    }

    /// Remove the signed-in user's routes and route images before account
    /// deletion. Resolves with the number of routes removed.
    pub fn delete_user_data(&self) -> Promise {
        let backend = Rc::clone(&self.backend);
        let user_id = self.current_user();
        future_to_promise(async move {
            let removed =
                history::delete_user_data(backend.as_ref(), backend.as_ref(), user_id.as_deref())
                    .await
                    .map_err(|e| to_js_error(e, "Deleting account data"))?;
            Ok(JsValue::from_f64(removed as f64))
        })
    }

    /// Short-timeout health check used to wake a cold backend.
    pub fn check_health(&self) -> Promise {
        let backend = Rc::clone(&self.backend);
        future_to_promise(async move {
            let health = services::Detector::check_health(backend.as_ref())
                .await
                .map_err(|e| to_js_error(e, "Checking service health"))?;
            Ok(JsValue::from_str(&health.status))
        })
    }
}
