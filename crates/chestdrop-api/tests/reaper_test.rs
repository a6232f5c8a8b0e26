//! Reaper sweep against live chests: expiry, abandonment, idempotence.

mod helpers;

use std::time::Duration as StdDuration;

use axum_test::multipart::{MultipartForm, Part};
use chestdrop_api::services::reaper::Reaper;
use chestdrop_storage::Storage;
use chrono::{Duration, Utc};
use helpers::{bearer, create_chest, setup_test_app, TestApp};
use serde_json::json;
use uuid::Uuid;

fn reaper_for(app: &TestApp) -> Reaper {
    Reaper::new(
        app.state.sessions.clone(),
        app.state.files.clone(),
        app.state.storage.clone(),
        StdDuration::from_secs(3600),
    )
}

/// Upload one small file and seal; returns `(session_id, file_id, code)`.
async fn sealed_chest(app: &TestApp, validity_days: i32) -> (Uuid, String, String) {
    let (session_id, upload_token) = create_chest(app).await;

    let form = MultipartForm::new().add_part(
        "files",
        Part::bytes(b"payload".to_vec())
            .file_name("payload.bin")
            .mime_type("application/octet-stream"),
    );
    let response = app
        .server
        .post(&format!("/api/chest/{}/upload", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .multipart(form)
        .await;
    let file_id = response.json::<serde_json::Value>()["uploadedFiles"][0]["fileId"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .server
        .post(&format!("/api/chest/{}/complete", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .json(&json!({"fileIds": [file_id.clone()], "validityDays": validity_days}))
        .await;
    assert_eq!(response.status_code(), 200);
    let code = response.json::<serde_json::Value>()["retrievalCode"]
        .as_str()
        .unwrap()
        .to_string();

    (session_id, file_id, code)
}

#[tokio::test]
async fn test_sweep_reaps_expired_and_abandoned_but_not_permanent() {
    let Some(app) = setup_test_app().await else { return };
    let _guard = helpers::sweep_lock().await;
    let now = Utc::now();

    // Chest sealed for 1 day, then the clock "advances" 2 days.
    let (expired_session, expired_file, expired_code) = sealed_chest(&app, 1).await;
    sqlx::query("UPDATE sessions SET expires_at = $2 WHERE id = $1")
        .bind(expired_session)
        .bind(now - Duration::days(1))
        .execute(&app.pool)
        .await
        .unwrap();

    // Open chest with an in-flight multipart upload, 49 hours old.
    let (abandoned_session, abandoned_token) = create_chest(&app).await;
    let response = app
        .server
        .post(&format!("/api/chest/{}/multipart/create", abandoned_session))
        .add_header("Authorization", bearer(&abandoned_token))
        .json(&json!({"filename": "big.bin", "mimeType": "application/octet-stream", "fileSize": 8}))
        .await;
    assert_eq!(response.status_code(), 200);
    sqlx::query("UPDATE sessions SET created_at = $2 WHERE id = $1")
        .bind(abandoned_session)
        .bind(now - Duration::hours(49))
        .execute(&app.pool)
        .await
        .unwrap();

    // Permanent chest stays untouched.
    let (permanent_session, permanent_file, permanent_code) = sealed_chest(&app, -1).await;

    let reaper = reaper_for(&app);
    let summary = reaper.sweep().await;

    // Other tests may leave their own expired sessions behind; assert on ours.
    assert!(summary.expired >= 1, "summary: {:?}", summary);
    assert!(summary.abandoned >= 1, "summary: {:?}", summary);

    // The expired chest is gone: code 404s and its blobs are deleted.
    let response = app
        .server
        .get(&format!("/api/retrieve/{}", expired_code))
        .await;
    assert_eq!(response.status_code(), 404);
    assert!(app
        .storage
        .list(&format!("{}/", expired_session))
        .await
        .unwrap()
        .is_empty());
    let _ = expired_file;

    // The abandoned chest is gone, and its in-flight multipart was aborted.
    assert!(app
        .state
        .sessions
        .get_open(abandoned_session)
        .await
        .unwrap()
        .is_none());
    assert!(app
        .storage
        .multipart_list(&format!("{}/", abandoned_session))
        .await
        .unwrap()
        .is_empty());

    // The permanent chest still works end to end.
    let response = app
        .server
        .get(&format!("/api/retrieve/{}", permanent_code))
        .await;
    assert_eq!(response.status_code(), 200);
    let chest_token = response.json::<serde_json::Value>()["chestToken"]
        .as_str()
        .unwrap()
        .to_string();
    let response = app
        .server
        .get(&format!("/api/download/{}", permanent_file))
        .add_header("Authorization", bearer(&chest_token))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.as_bytes().as_ref(), b"payload");
    let _ = permanent_session;
}

#[tokio::test]
async fn test_sweep_is_idempotent() {
    let Some(app) = setup_test_app().await else { return };
    let _guard = helpers::sweep_lock().await;
    let now = Utc::now();

    let (session_id, _file_id, _code) = sealed_chest(&app, 1).await;
    sqlx::query("UPDATE sessions SET expires_at = $2 WHERE id = $1")
        .bind(session_id)
        .bind(now - Duration::hours(3))
        .execute(&app.pool)
        .await
        .unwrap();

    let reaper = reaper_for(&app);
    let first = reaper.sweep().await;
    assert!(first.expired >= 1);

    // A second sweep finds nothing further for this session: it is
    // soft-deleted and out of every select.
    let second = reaper.sweep().await;
    let still_selected = app
        .state
        .sessions
        .select_expired(Utc::now())
        .await
        .unwrap()
        .iter()
        .any(|s| s.id == session_id);
    assert!(!still_selected);
    assert!(app
        .storage
        .list(&format!("{}/", session_id))
        .await
        .unwrap()
        .is_empty());
    // No errors from re-sweeping already-clean state.
    assert!(second.errors.is_empty(), "errors: {:?}", second.errors);
}

#[tokio::test]
async fn test_fresh_open_chest_is_not_reaped() {
    let Some(app) = setup_test_app().await else { return };
    let _guard = helpers::sweep_lock().await;

    let (session_id, _token) = create_chest(&app).await;

    let reaper = reaper_for(&app);
    reaper.sweep().await;

    assert!(app
        .state
        .sessions
        .get_open(session_id)
        .await
        .unwrap()
        .is_some());
}
