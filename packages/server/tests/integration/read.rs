use serde_json::json;

use crate::common::{TestApp, Upload, routes};

fn beat_metadata() -> serde_json::Value {
    json!({
        "title": "Cold Summer",
        "category": "beat",
        "bpm": 150,
        "key": "F#m",
        "price": 24.99,
        "licenses": [{"license_type": "premium", "name": "Premium", "price": 49.0}],
        "genres": ["Drill"]
    })
}

fn full_upload() -> Vec<Upload> {
    vec![Upload::image(), Upload::preview(), Upload::wav(), Upload::stems()]
}

#[tokio::test]
async fn first_get_misses_and_second_hits() {
    let app = TestApp::spawn().await;
    let (_, token) = app.producer();
    let id = app.create_accepted(&token, &beat_metadata(), full_upload()).await;

    let first = app.get(&routes::spec(id)).await;
    assert_eq!(first.status, 200, "{}", first.text);
    assert_eq!(first.cache.as_deref(), Some("MISS"));
    assert_eq!(first.body["processing_status"], "completed");

    app.wait_until_cached(id).await;

    let second = app.get(&routes::spec(id)).await;
    assert_eq!(second.status, 200);
    assert_eq!(second.cache.as_deref(), Some("HIT"));
    assert_eq!(second.body, first.body);
}

#[tokio::test]
async fn update_invalidates_cached_entry() {
    let app = TestApp::spawn().await;
    let (_, token) = app.producer();
    let id = app.create_accepted(&token, &beat_metadata(), full_upload()).await;

    app.get(&routes::spec(id)).await;
    app.wait_until_cached(id).await;

    let res = app
        .update_spec(id, &token, &json!({"title": "Cold Winter"}), vec![])
        .await;
    assert_eq!(res.status, 200, "{}", res.text);
    assert!(!app.is_cached(id).await);

    let after = app.get(&routes::spec(id)).await;
    assert_eq!(after.cache.as_deref(), Some("MISS"));
    assert_eq!(after.body["title"], "Cold Winter");
}

#[tokio::test]
async fn payload_hides_masters_and_presigns_preview() {
    let app = TestApp::spawn().await;
    let (producer, token) = app.producer();
    let id = app.create_accepted(&token, &beat_metadata(), full_upload()).await;

    let res = app.get(&routes::spec(id)).await;
    let body = &res.body;

    assert_eq!(body["producer_id"], producer.to_string());
    assert_eq!(body["has_wav"], true);
    assert_eq!(body["has_stems"], true);
    assert!(body.get("wav_url").is_none());
    assert!(body.get("stems_url").is_none());
    assert_eq!(body["genres"], json!(["Drill"]));
    assert_eq!(body["licenses"][0]["license_type"], "premium");

    let preview = body["preview_url"].as_str().unwrap();
    assert!(preview.contains("expires="), "{preview}");
    assert!(preview.contains("signature="), "{preview}");
}

#[tokio::test]
async fn get_is_public() {
    let app = TestApp::spawn().await;
    let (_, token) = app.producer();
    let id = app.create_accepted(&token, &beat_metadata(), full_upload()).await;

    // No Authorization header.
    let res = app.get(&routes::spec(id)).await;
    assert_eq!(res.status, 200);
}

#[tokio::test]
async fn unknown_spec_is_not_found() {
    let app = TestApp::spawn().await;

    let res = app.get(&routes::spec(uuid::Uuid::new_v4())).await;
    assert_eq!(res.status, 404);
    assert_eq!(res.code(), "NOT_FOUND");
    assert!(res.cache.is_none());
}

#[tokio::test]
async fn failed_spec_is_visible_with_failed_status() {
    let app = TestApp::spawn().await;
    let (_, token) = app.producer();
    app.store.fail_uploads_to("wav");

    let id = app.create_accepted(&token, &beat_metadata(), full_upload()).await;

    let res = app.get(&routes::spec(id)).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body["processing_status"], "failed");
    assert_eq!(res.body["has_wav"], false);
    assert_eq!(res.body["preview_url"], "");
}
