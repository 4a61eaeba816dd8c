use anyhow::Result;
use assert_json_diff::assert_json_include;
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use member_search::embedding::EMBEDDING_DIMENSIONS;
use member_search::storage::profile_pictures::{
    MAX_PROFILE_PICTURE_BYTES, PROFILE_PICTURES_BUCKET,
};
use member_search::utils::test_utils::{member_fixture, MockEmbedder};

pub mod common;
use common::{Backends, ServerHandle};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

async fn upload(
    server: &ServerHandle,
    member_id: &str,
    content_type: &str,
    body: Vec<u8>,
) -> Result<reqwest::Response> {
    Ok(reqwest::Client::new()
        .post(server.url(&format!("/members/{member_id}/profile-picture")))
        .header("content-type", content_type)
        .body(body)
        .send()
        .await?)
}

#[tokio::test]
async fn refresh_embedding_stores_vector() -> Result<()> {
    let member = member_fixture("Ada Lovelace", "Engineer", "Analytical engines", &["Math"]);
    let id = member.id;
    let backends = Backends::new(vec![member], MockEmbedder::default());
    let server = ServerHandle::for_backends(&backends).await;

    let res = reqwest::Client::new()
        .post(server.url(&format!("/members/{id}/embedding")))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_json_include!(
        actual: body,
        expected: json!({
            "success": true,
            "member_id": id.to_string(),
            "dimensions": EMBEDDING_DIMENSIONS,
        })
    );
    assert!(backends.store.embedding_of(id).is_some());
    Ok(())
}

#[tokio::test]
async fn refresh_embedding_reports_missing_member() -> Result<()> {
    let backends = Backends::new(vec![], MockEmbedder::default());
    let server = ServerHandle::for_backends(&backends).await;
    let client = reqwest::Client::new();

    let res = client
        .post(server.url(&format!("/members/{}/embedding", Uuid::now_v7())))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await?;
    assert_eq!(body["success"], json!(false));

    let res = client
        .post(server.url("/members/not-a-uuid/embedding"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn refresh_embedding_surfaces_model_failure() -> Result<()> {
    let member = member_fixture("Ada Lovelace", "Engineer", "", &[]);
    let id = member.id;
    let backends = Backends::new(vec![member], MockEmbedder::default().failing());
    let server = ServerHandle::for_backends(&backends).await;

    let res = reqwest::Client::new()
        .post(server.url(&format!("/members/{id}/embedding")))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert!(backends.store.embedding_of(id).is_none());
    Ok(())
}

#[tokio::test]
async fn upload_records_public_url() -> Result<()> {
    let member = member_fixture("Ada Lovelace", "Engineer", "", &[]);
    let id = member.id;
    let backends = Backends::new(vec![member], MockEmbedder::default());
    let server = ServerHandle::for_backends(&backends).await;

    let res = upload(&server, &id.to_string(), "image/png", PNG_BYTES.to_vec()).await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    let url = body["profile_picture_url"].as_str().unwrap().to_string();
    let prefix = format!("https://storage.test/{PROFILE_PICTURES_BUCKET}/{id}/");
    assert!(url.starts_with(&prefix));
    assert!(url.ends_with(".png"));

    let stored_path = url.trim_start_matches("https://storage.test/");
    assert_eq!(
        backends.objects.content_type_of(stored_path).as_deref(),
        Some("image/png")
    );
    assert_eq!(
        backends.store.member(id).unwrap().profile_picture_url,
        Some(url)
    );
    Ok(())
}

#[tokio::test]
async fn invalid_uploads_never_reach_storage() -> Result<()> {
    let member = member_fixture("Ada Lovelace", "Engineer", "", &[]);
    let id = member.id.to_string();
    let backends = Backends::new(vec![member], MockEmbedder::default());
    let server = ServerHandle::for_backends(&backends).await;

    let res = upload(&server, &id, "application/pdf", b"%PDF-1.7".to_vec()).await?;
    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let res = upload(&server, &id, "image/png", vec![]).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = upload(&server, &id, "image/png", vec![0; MAX_PROFILE_PICTURE_BYTES + 1]).await?;
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = res.json().await?;
    assert_eq!(body["success"], json!(false));

    let res = upload(&server, &Uuid::now_v7().to_string(), "image/png", PNG_BYTES.to_vec()).await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    assert_eq!(backends.objects.put_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_row_update_leaves_no_orphan() -> Result<()> {
    let member = member_fixture("Ada Lovelace", "Engineer", "", &[]);
    let id = member.id;
    let backends = Backends::new(vec![member], MockEmbedder::default());
    backends.store.fail_writes();
    let server = ServerHandle::for_backends(&backends).await;

    let res = upload(&server, &id.to_string(), "image/webp", b"RIFF\0\0\0\0WEBP".to_vec()).await?;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    assert_eq!(backends.objects.put_calls(), 1);
    assert_eq!(backends.objects.object_count(), 0);
    assert_eq!(backends.store.member(id).unwrap().profile_picture_url, None);
    Ok(())
}

#[tokio::test]
async fn storage_failure_is_a_gateway_error() -> Result<()> {
    let member = member_fixture("Ada Lovelace", "Engineer", "", &[]);
    let id = member.id;
    let backends = Backends::new(vec![member], MockEmbedder::default());
    backends.objects.fail_put();
    let server = ServerHandle::for_backends(&backends).await;

    let res = upload(&server, &id.to_string(), "image/jpeg", b"\xff\xd8\xff".to_vec()).await?;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(backends.store.member(id).unwrap().profile_picture_url, None);
    Ok(())
}
