//! HTTP router tests

mod helpers;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use base64::{engine::general_purpose, Engine as _};
use helpers::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use shipdocs_common::events::EventBus;
use shipdocs_ingest::config::IngestConfig;
use shipdocs_ingest::{build_router, AppState};
use std::sync::Arc;
use tower::ServiceExt;

const CERT: &str = "\
Document Name: Safety Management Certificate
Certificate No.: SMC-0042
Vessel Name: SEA STAR
IMO Number: 9123456
";

fn test_state(store: Arc<MemoryStore>) -> AppState {
    let analyzer = ScriptedAnalyzer::new().reply(1, CERT);
    let pipeline = pipeline(12, Arc::new(analyzer), None, EventBus::new(64));
    AppState::new(
        IngestConfig::default(),
        pipeline,
        store,
        Arc::new(MapLookup::new()),
    )
}

fn analyze_body(pages: u32, imo: &str) -> Value {
    json!({
        "file_name": "smc.pdf",
        "data_base64": general_purpose::STANDARD.encode(tagged_pdf(pages)),
        "category": "certificate",
        "expected": {
            "id": "ship-1",
            "kind": "ship",
            "name": "SEA STAR",
            "imo": imo,
        }
    })
}

async fn send(app: &axum::Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_reports_unconfigured_boundaries() {
    let app = build_router(test_state(Arc::new(MemoryStore::new())));

    let (status, body) = send(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["module"], "shipdocs-ingest");
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["pending_documents"], 0);
}

#[tokio::test]
async fn test_analyze_then_upload() {
    let store = Arc::new(MemoryStore::new());
    let app = build_router(test_state(store.clone()));

    let (status, report) = send(
        &app,
        Method::POST,
        "/documents/analyze",
        Some(analyze_body(2, "9123456")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["state"], "DUPLICATE_CHECKED");
    assert_eq!(report["validation"]["classification"], "accept");
    assert_eq!(
        report["merged"]["fields"]["document_number"]["value"],
        "SMC-0042"
    );
    let id = report["document_id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::GET, &format!("/documents/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, uploaded) = send(
        &app,
        Method::POST,
        &format!("/documents/{}/upload", id),
        Some(json!({ "record_id": "rec-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(uploaded["state"], "UPLOADED");
    assert_eq!(uploaded["manifest"]["record_id"], "rec-1");
    assert_eq!(store.uploads().len(), 2);

    let (status, _) = send(&app, Method::GET, &format!("/documents/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_partial_upload_answers_multi_status() {
    let store = Arc::new(MemoryStore::new());
    store.fail_uploads_of("smc.pdf");
    let app = build_router(test_state(store.clone()));

    let (_, report) = send(
        &app,
        Method::POST,
        "/documents/analyze",
        Some(analyze_body(1, "9123456")),
    )
    .await;
    let id = report["document_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/documents/{}/upload", id),
        Some(json!({ "record_id": "rec-1" })),
    )
    .await;

    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(body["state"], "PARTIALLY_UPLOADED");
    assert_eq!(body["missing"], json!(["smc.pdf"]));

    let (_, health) = send(&app, Method::GET, "/health", None).await;
    assert!(health["last_error"].as_str().unwrap().contains("smc.pdf"));
}

#[tokio::test]
async fn test_rejected_report_is_not_uploadable() {
    let app = build_router(test_state(Arc::new(MemoryStore::new())));

    let (status, report) = send(
        &app,
        Method::POST,
        "/documents/analyze",
        Some(analyze_body(1, "9999998")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["state"], "REJECTED");

    let id = report["document_id"].as_str().unwrap().to_string();
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/documents/{}/upload", id),
        Some(json!({ "record_id": "rec-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_bad_base64_is_bad_request() {
    let app = build_router(test_state(Arc::new(MemoryStore::new())));
    let mut body = analyze_body(1, "9123456");
    body["data_base64"] = json!("%%% not base64 %%%");

    let (status, body) = send(&app, Method::POST, "/documents/analyze", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_DOCUMENT");
}

#[tokio::test]
async fn test_batch_reports_each_document() {
    let app = build_router(test_state(Arc::new(MemoryStore::new())));
    let mut broken = analyze_body(1, "9123456");
    broken["data_base64"] = json!("");

    let (status, body) = send(
        &app,
        Method::POST,
        "/documents/analyze/batch",
        Some(json!({ "documents": [analyze_body(1, "9123456"), broken] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["outcome"], "analyzed");
    assert_eq!(results[0]["state"], "DUPLICATE_CHECKED");
    assert_eq!(results[1]["outcome"], "failed");
    assert_eq!(results[1]["code"], "INVALID_DOCUMENT");
}

#[tokio::test]
async fn test_abandon_pending_document() {
    let app = build_router(test_state(Arc::new(MemoryStore::new())));
    let (_, report) = send(
        &app,
        Method::POST,
        "/documents/analyze",
        Some(analyze_body(1, "9123456")),
    )
    .await;
    let uri = format!("/documents/{}", report["document_id"].as_str().unwrap());

    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
