use serde_json::json;

use crate::common::{TestApp, Upload, routes};

async fn completed_spec(app: &TestApp) -> serde_json::Value {
    let (_, token) = app.producer();
    let id = app
        .create_accepted(
            &token,
            &json!({"title": "Loop Kit", "category": "sample", "price": 5}),
            vec![Upload::image(), Upload::preview()],
        )
        .await;
    app.get(&routes::spec(id)).await.body
}

#[tokio::test]
async fn presigned_preview_is_served() {
    let app = TestApp::spawn().await;
    let body = completed_spec(&app).await;

    let (status, bytes) = app.get_bytes(body["preview_url"].as_str().unwrap()).await;
    assert_eq!(status, 200);
    assert_eq!(bytes, Upload::preview().bytes);
}

#[tokio::test]
async fn preview_without_valid_signature_is_forbidden() {
    let app = TestApp::spawn().await;
    let body = completed_spec(&app).await;
    let presigned = body["preview_url"].as_str().unwrap();
    let bare = presigned.split('?').next().unwrap();

    let (status, _) = app.get_bytes(bare).await;
    assert_eq!(status, 403);

    let tampered = presigned.replace("signature=", "signature=00");
    let (status, _) = app.get_bytes(&tampered).await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn images_are_public() {
    let app = TestApp::spawn().await;
    let body = completed_spec(&app).await;

    let res = app
        .client
        .get(body["image_url"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(
        res.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("image/jpeg")
    );
}

#[tokio::test]
async fn unknown_objects_are_not_found() {
    let app = TestApp::spawn().await;

    let (status, _) = app.get_bytes(&app.url("/media/images/missing.jpg")).await;
    assert_eq!(status, 404);

    let (status, _) = app.get_bytes(&app.url("/media/elsewhere/file.bin")).await;
    assert_eq!(status, 404);
}
