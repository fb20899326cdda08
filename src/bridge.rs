// JS-hosted collaborators. The host object exposes async functions that take and
// resolve with JSON strings; HTTP is a single `request(spec)` executor.
// See DESIGN.md: Host bridge

use js_sys::{Array, Function, Promise, Reflect};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::adapter::RouteDocument;
use crate::error::{HttpFailure, ScanError, StoreErrorKind};
use crate::services::*;
use crate::types::ScanConfig;

/// Collaborators backed by functions on a JS host object:
///
/// | function | resolves with |
/// |---|---|
/// | `request(specJson)` | response body as JSON string |
/// | `saveRoute(docJson)` | document id |
/// | `getRoute(id)` | JSON string or `null` |
/// | `updateRoute(id, fieldsJson)` | nothing; the host stamps `updatedAt` |
/// | `deleteRoute(id)` | nothing |
/// | `listRoutes(uid)` | JSON array string |
/// | `deleteUserRoutes(uid)` | nothing |
/// | `uploadImage(uri, key)` | public URL |
/// | `deleteImage(pathOrUrl)` | nothing |
///
/// HTTP rejections carry a serialized `HttpFailure`; store and storage
/// rejections carry an error with a `code` property.
pub struct JsBackend {
    config: ScanConfig,
    host: JsValue,
}

impl JsBackend {
    pub fn new(config: ScanConfig, host: JsValue) -> Self {
        JsBackend { config, host }
    }

    fn method(&self, name: &str) -> Result<Function, ScanError> {
        Reflect::get(&self.host, &JsValue::from_str(name))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
            .ok_or_else(|| ScanError::Bridge(format!("host is missing `{}`", name)))
    }

    async fn invoke(
        &self,
        name: &str,
        args: &[JsValue],
        on_reject: fn(JsValue) -> ScanError,
    ) -> Result<JsValue, ScanError> {
        let function = self.method(name)?;
        let args: Array = args.iter().collect();
        let returned = function.apply(&self.host, &args).map_err(on_reject)?;
        JsFuture::from(Promise::resolve(&returned))
            .await
            .map_err(on_reject)
    }

    async fn request<T: DeserializeOwned>(&self, spec: &HttpRequestSpec) -> Result<T, ScanError> {
        let spec = serde_json::to_string(spec)?;
        let body = self
            .invoke("request", &[JsValue::from_str(&spec)], http_rejection)
            .await?;
        from_json_value(body)
    }
}

impl Detector for JsBackend {
    async fn detect(
        &self,
        image_uri: &str,
        request: &ColourFilterRequest,
    ) -> Result<DetectionResponse, ScanError> {
        self.request(&HttpRequestSpec::detect(&self.config, image_uri, request))
            .await
    }

    async fn check_health(&self) -> Result<HealthResponse, ScanError> {
        self.request(&HttpRequestSpec::health(&self.config)).await
    }
}

impl Grader for JsBackend {
    async fn grade(
        &self,
        image_uri: &str,
        route_name: Option<&str>,
    ) -> Result<GradeResponse, ScanError> {
        self.request(&HttpRequestSpec::grade(&self.config, image_uri, route_name))
            .await
    }
}

impl RouteStore for JsBackend {
    async fn save(&self, document: &RouteDocument) -> Result<String, ScanError> {
        if document.user_id.is_empty() {
            return Err(ScanError::MissingField("user id"));
        }
        if document.image_url.is_empty() {
            return Err(ScanError::MissingField("image URL"));
        }
        let json = serde_json::to_string(document)?;
        let id = self
            .invoke("saveRoute", &[JsValue::from_str(&json)], store_rejection)
            .await?;
        id.as_string()
            .ok_or_else(|| ScanError::Bridge("saveRoute must resolve with an id".to_string()))
    }

    async fn get(&self, route_id: &str) -> Result<Option<RouteDocument>, ScanError> {
        let value = self
            .invoke("getRoute", &[JsValue::from_str(route_id)], store_rejection)
            .await?;
        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        from_json_value(value).map(Some)
    }

    async fn update(&self, route_id: &str, fields: &Map<String, Value>) -> Result<(), ScanError> {
        if route_id.is_empty() {
            return Err(ScanError::MissingField("route id"));
        }
        let json = serde_json::to_string(fields)?;
        self.invoke(
            "updateRoute",
            &[JsValue::from_str(route_id), JsValue::from_str(&json)],
            store_rejection,
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, route_id: &str) -> Result<(), ScanError> {
        self.invoke("deleteRoute", &[JsValue::from_str(route_id)], store_rejection)
            .await?;
        Ok(())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<RouteDocument>, ScanError> {
        let value = self
            .invoke("listRoutes", &[JsValue::from_str(user_id)], store_rejection)
            .await?;
        from_json_value(value)
    }

    async fn delete_user_routes(&self, user_id: &str) -> Result<(), ScanError> {
        if user_id.is_empty() {
            return Err(ScanError::MissingField("user id"));
        }
        self.invoke("deleteUserRoutes", &[JsValue::from_str(user_id)], store_rejection)
            .await?;
        Ok(())
    }
}

impl ObjectStorage for JsBackend {
    async fn upload(&self, source_uri: &str, destination_key: &str) -> Result<String, ScanError> {
        let url = self
            .invoke(
                "uploadImage",
                &[JsValue::from_str(source_uri), JsValue::from_str(destination_key)],
                storage_rejection,
            )
            .await?;
        url.as_string()
            .ok_or_else(|| ScanError::Bridge("uploadImage must resolve with a URL".to_string()))
    }

    async fn delete(&self, path_or_url: &str) -> Result<(), ScanError> {
        match self
            .invoke("deleteImage", &[JsValue::from_str(path_or_url)], storage_rejection)
            .await
        {
            Err(ScanError::Store(StoreErrorKind::NotFound)) => Ok(()),
            other => other.map(|_| ()),
        }
    }
}

fn from_json_value<T: DeserializeOwned>(value: JsValue) -> Result<T, ScanError> {
    let text = value
        .as_string()
        .ok_or_else(|| ScanError::Bridge("expected a JSON string from host".to_string()))?;
    Ok(serde_json::from_str(&text)?)
}

fn rejection_text(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    format!("{:?}", value)
}

fn rejection_code(value: &JsValue) -> Option<String> {
    if !value.is_object() {
        return None;
    }
    Reflect::get(value, &JsValue::from_str("code"))
        .ok()
        .and_then(|code| code.as_string())
}

fn http_rejection(value: JsValue) -> ScanError {
    classify_http(&rejection_text(&value))
}

fn store_rejection(value: JsValue) -> ScanError {
    classify_store(rejection_code(&value), rejection_text(&value))
}

fn storage_rejection(value: JsValue) -> ScanError {
    match classify_store(rejection_code(&value), rejection_text(&value)) {
        ScanError::Bridge(text) => ScanError::Storage(text),
        other => other,
    }
}

/// Host HTTP rejection text: a serialized `HttpFailure`, or free text.
pub(crate) fn classify_http(text: &str) -> ScanError {
    match serde_json::from_str::<HttpFailure>(text) {
        Ok(failure) => failure.into(),
        Err(_) => HttpFailure::Request {
            message: text.to_string(),
        }
        .into(),
    }
}

#[derive(Deserialize)]
struct CodedRejection {
    code: String,
}

pub(crate) fn classify_store(code: Option<String>, text: String) -> ScanError {
    let code = code.or_else(|| {
        serde_json::from_str::<CodedRejection>(&text)
            .ok()
            .map(|r| r.code)
    });
    match code {
        Some(code) => ScanError::Store(StoreErrorKind::from_code(&code)),
        None => ScanError::Bridge(text),
    }
}
