// End-to-end scan through a JS host object. Runs under `wasm-pack test --node`.
#![cfg(target_arch = "wasm32")]

use ascend_core::ScanEngine;
use js_sys::{Function, Object, Reflect};
use serde_json::Value;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::*;

const DETECT_OK: &str = r#"
    const s = JSON.parse(spec);
    if (s.url.endsWith('/routes/detect-by-colour')) {
        return Promise.resolve(JSON.stringify({
            tap_x: 500, tap_y: 500, selected_colour: 'red', colour_confidence: 0.9,
            detections: [{}, {}], image_with_boxes: '/static/out.jpg'
        }));
    }
    if (s.url.endsWith('/routes/analyse-grade')) {
        return GRADE(s);
    }
    return Promise.resolve(JSON.stringify({ status: 'ok' }));
"#;

fn host(grade_body: &str) -> JsValue {
    let host = Object::new();
    let set = |name: &str, args: &str, body: &str| {
        Reflect::set(
            &host,
            &JsValue::from_str(name),
            &Function::new_with_args(args, body),
        )
        .unwrap();
    };

    let grade = format!("const GRADE = (s) => {{ {} }};", grade_body);
    set("request", "spec", &format!("{}{}", grade, DETECT_OK));
    set(
        "saveRoute",
        "doc",
        "this.saved = (this.saved || 0) + 1; return Promise.resolve('route-' + this.saved);",
    );
    host.into()
}

fn ready_engine(host: JsValue) -> ScanEngine {
    let engine = ScanEngine::new("{}", host).unwrap();
    engine.set_current_user(Some("u1".to_string()));
    engine.on_capture_changed(Some("file:///photo.jpg".to_string()));
    engine.on_layout(500.0, 1000.0);
    assert!(engine.on_image_loaded("file:///photo.jpg", 1000, 1000));
    assert!(engine.on_press_in(250.0, 500.0));
    engine.on_press_out();
    engine
}

fn view(engine: &ScanEngine) -> Value {
    serde_json::from_str(&engine.view().unwrap()).unwrap()
}

#[wasm_bindgen_test]
async fn scan_detects_grades_and_saves() {
    let engine = ready_engine(host(
        "return Promise.resolve(JSON.stringify({ v_grade: 'V3', confidence: 0.7 }));",
    ));

    JsFuture::from(engine.scan_route()).await.unwrap();

    let v = view(&engine);
    assert_eq!(v["is_annotated_image"], true);
    assert_eq!(v["grade_result"]["v_grade"], "V3");
    assert_eq!(v["route_id"], "route-1");
}

#[wasm_bindgen_test]
async fn grader_rejection_surfaces_as_grading_error() {
    let engine = ready_engine(host(
        "return Promise.reject(JSON.stringify({ kind: 'no_response' }));",
    ));

    JsFuture::from(engine.scan_route()).await.unwrap();

    let v = view(&engine);
    assert_eq!(v["is_annotated_image"], true);
    assert_eq!(v["grading"]["status"], "failed");
    assert_eq!(
        v["grading"]["error"],
        "Network error. Check your connection and try again."
    );
    assert!(v["route_id"].is_null());
}

#[wasm_bindgen_test]
async fn missing_host_function_fails_detection() {
    let engine = ready_engine(Object::new().into());

    JsFuture::from(engine.scan_route()).await.unwrap();

    let v = view(&engine);
    assert_eq!(v["detection"]["status"], "failed");
    assert_eq!(v["is_annotated_image"], false);
}

#[wasm_bindgen_test]
async fn load_routes_requires_user() {
    let engine = ScanEngine::new("{}", Object::new().into()).unwrap();
    let err = JsFuture::from(engine.load_routes()).await.unwrap_err();
    assert_eq!(err.as_string().as_deref(), Some("Please sign in to continue."));
}

fn store_host() -> JsValue {
    let host = Object::new();
    let set = |name: &str, args: &str, body: &str| {
        Reflect::set(
            &host,
            &JsValue::from_str(name),
            &Function::new_with_args(args, body),
        )
        .unwrap();
    };

    set(
        "updateRoute",
        "id, fields",
        "this.updated = id + ':' + fields; return Promise.resolve();",
    );
    set(
        "listRoutes",
        "uid",
        r#"return Promise.resolve(JSON.stringify([
            { id: 'a', userId: uid, imageUrl: 'https://img/a.jpg', imagePath: 'https://img/a.jpg',
              grade: { v_grade: 'V1', confidence: 0.5 } }
        ]));"#,
    );
    set(
        "deleteImage",
        "path",
        "this.deletedImage = path; return Promise.resolve();",
    );
    set(
        "deleteUserRoutes",
        "uid",
        "this.deletedUser = uid; return Promise.resolve();",
    );
    host.into()
}

fn host_string(host: &JsValue, key: &str) -> Option<String> {
    Reflect::get(host, &JsValue::from_str(key)).ok()?.as_string()
}

#[wasm_bindgen_test]
async fn update_route_sends_trimmed_edits() {
    let host = store_host();
    let engine = ScanEngine::new("{}", host.clone()).unwrap();

    let written = JsFuture::from(
        engine.update_route("a".to_string(), r#"{"routeName":" Slab ","notes":""}"#.to_string()),
    )
    .await
    .unwrap();

    assert_eq!(written.as_bool(), Some(true));
    assert_eq!(
        host_string(&host, "updated").as_deref(),
        Some(r#"a:{"routeName":"Slab"}"#)
    );
}

#[wasm_bindgen_test]
async fn delete_user_data_clears_images_then_routes() {
    let host = store_host();
    let engine = ScanEngine::new("{}", host.clone()).unwrap();
    engine.set_current_user(Some("u1".to_string()));

    let removed = JsFuture::from(engine.delete_user_data()).await.unwrap();

    assert_eq!(removed.as_f64(), Some(1.0));
    assert_eq!(host_string(&host, "deletedImage").as_deref(), Some("https://img/a.jpg"));
    assert_eq!(host_string(&host, "deletedUser").as_deref(), Some("u1"));
}
