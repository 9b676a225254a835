use common::ProcessingStatus;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use uuid::Uuid;

use spec_server::entity::spec_genre;

use crate::common::{TestApp, Upload, routes};

async fn beat(app: &TestApp, token: &str) -> Uuid {
    app.create_accepted(
        token,
        &json!({
            "title": "Last Call",
            "category": "beat",
            "price": 30,
            "licenses": [{"license_type": "basic", "name": "Basic", "price": 30}],
            "genres": ["Trap"]
        }),
        vec![Upload::image(), Upload::preview(), Upload::wav(), Upload::stems()],
    )
    .await
}

#[tokio::test]
async fn spec_without_purchases_is_hard_deleted() {
    let app = TestApp::spawn().await;
    let (_, token) = app.producer();
    let id = beat(&app, &token).await;
    assert_eq!(
        app.find_spec(id).await.unwrap().processing_status,
        ProcessingStatus::Completed
    );

    let res = app.delete_with_token(&routes::spec(id), &token).await;
    assert_eq!(res.status, 204, "{}", res.text);

    assert!(app.find_spec(id).await.is_none());
    assert!(app.license_rows(id).await.is_empty());
    let links = spec_genre::Entity::find()
        .filter(spec_genre::Column::SpecId.eq(id))
        .count(&app.db)
        .await
        .unwrap();
    assert_eq!(links, 0);

    for folder in ["images", "previews", "wav", "stems"] {
        assert_eq!(app.objects_in(folder), 0, "{folder} object left behind");
    }
    assert_eq!(app.get(&routes::spec(id)).await.status, 404);
}

#[tokio::test]
async fn spec_with_purchases_is_soft_deleted() {
    let app = TestApp::spawn().await;
    let (_, token) = app.producer();
    let id = beat(&app, &token).await;
    let option = app.license_rows(id).await[0].id;
    app.insert_purchase(id, option).await;

    let res = app.delete_with_token(&routes::spec(id), &token).await;
    assert_eq!(res.status, 204, "{}", res.text);

    let spec = app.find_spec(id).await.unwrap();
    assert!(spec.is_deleted);
    assert!(spec.deleted_at.is_some());
    assert_eq!(app.license_rows(id).await.len(), 1);

    for folder in ["images", "previews", "wav", "stems"] {
        assert_eq!(app.objects_in(folder), 1, "{folder} object removed");
    }
    assert_eq!(app.get(&routes::spec(id)).await.status, 404);

    let again = app.delete_with_token(&routes::spec(id), &token).await;
    assert_eq!(again.status, 404);
}

#[tokio::test]
async fn delete_evicts_cached_payload() {
    let app = TestApp::spawn().await;
    let (_, token) = app.producer();
    let id = beat(&app, &token).await;

    app.get(&routes::spec(id)).await;
    app.wait_until_cached(id).await;

    let res = app.delete_with_token(&routes::spec(id), &token).await;
    assert_eq!(res.status, 204);
    assert!(!app.is_cached(id).await);

    let res = app.get(&routes::spec(id)).await;
    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn only_the_owner_can_delete() {
    let app = TestApp::spawn().await;
    let (_, owner) = app.producer();
    let (_, intruder) = app.producer();
    let id = beat(&app, &owner).await;

    let res = app.delete_with_token(&routes::spec(id), &intruder).await;
    assert_eq!(res.status, 403);
    assert!(app.find_spec(id).await.is_some());

    let res = app
        .client
        .delete(app.url(&routes::spec(id)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 401);
}
