//! End-to-end chest lifecycle over the HTTP surface.

mod helpers;

use axum_test::multipart::{MultipartForm, Part};
use helpers::{bearer, create_chest, setup_test_app};
use serde_json::json;

#[tokio::test]
async fn test_small_file_and_text_roundtrip() {
    let Some(app) = setup_test_app().await else { return };

    let (session_id, upload_token) = create_chest(&app).await;

    // One binary file part and one text item.
    let form = MultipartForm::new()
        .add_part(
            "files",
            Part::bytes(b"hello\n".to_vec())
                .file_name("a.txt")
                .mime_type("text/plain"),
        )
        .add_part("textItems", Part::text(r#"{"content":"hi","filename":"b.txt"}"#));

    let response = app
        .server
        .post(&format!("/api/chest/{}/upload", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    let uploaded = body["uploadedFiles"].as_array().expect("uploadedFiles");
    assert_eq!(uploaded.len(), 2);
    assert_eq!(uploaded[0]["filename"], "a.txt");
    assert_eq!(uploaded[0]["isText"], false);
    assert_eq!(uploaded[1]["filename"], "b.txt");
    assert_eq!(uploaded[1]["isText"], true);

    let file_ids: Vec<String> = uploaded
        .iter()
        .map(|f| f["fileId"].as_str().unwrap().to_string())
        .collect();

    // Seal for 7 days.
    let response = app
        .server
        .post(&format!("/api/chest/{}/complete", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .json(&json!({"fileIds": file_ids, "validityDays": 7}))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    let code = body["retrievalCode"].as_str().expect("retrievalCode").to_string();
    assert_eq!(code.len(), 6);
    assert!(code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
    let expiry = body["expiryDate"].as_str().expect("expiryDate");
    assert!(expiry.contains('T'));

    // Retrieve by code.
    let response = app.server.get(&format!("/api/retrieve/{}", code)).await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    let files = body["files"].as_array().expect("files");
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["filename"], "a.txt");
    assert_eq!(files[0]["size"], 6);
    assert_eq!(files[0]["mimeType"], "text/plain");
    assert_eq!(files[0]["fileExtension"], "txt");
    assert_eq!(files[1]["filename"], "b.txt");
    assert_eq!(files[1]["isText"], true);
    assert_eq!(files[1]["size"], 2);
    assert!(body["expiryDate"].is_string());
    let chest_token = body["chestToken"].as_str().expect("chestToken").to_string();

    // Download both files.
    let response = app
        .server
        .get(&format!("/api/download/{}", files[0]["fileId"].as_str().unwrap()))
        .add_header("Authorization", bearer(&chest_token))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.as_bytes().as_ref(), b"hello\n");
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/plain"
    );
    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("filename=\"a.txt\""), "{}", disposition);

    let response = app
        .server
        .get(&format!("/api/download/{}", files[1]["fileId"].as_str().unwrap()))
        .add_header("Authorization", bearer(&chest_token))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.as_bytes().as_ref(), b"hi");
}

#[tokio::test]
async fn test_permanent_chest() {
    let Some(app) = setup_test_app().await else { return };

    let (session_id, upload_token) = create_chest(&app).await;

    let form = MultipartForm::new().add_part(
        "files",
        Part::bytes(b"forever".to_vec())
            .file_name("keep.bin")
            .mime_type("application/octet-stream"),
    );
    let response = app
        .server
        .post(&format!("/api/chest/{}/upload", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .multipart(form)
        .await;
    let body: serde_json::Value = response.json();
    let file_id = body["uploadedFiles"][0]["fileId"].as_str().unwrap().to_string();

    let response = app
        .server
        .post(&format!("/api/chest/{}/complete", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .json(&json!({"fileIds": [file_id], "validityDays": -1}))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert!(body["expiryDate"].is_null());
    let code = body["retrievalCode"].as_str().unwrap().to_string();

    let response = app.server.get(&format!("/api/retrieve/{}", code)).await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert!(body["expiryDate"].is_null());
    let chest_token = body["chestToken"].as_str().unwrap().to_string();

    // Query-parameter token and filename override, as `<a download>` would.
    let response = app
        .server
        .get(&format!("/api/download/{}", file_id))
        .add_query_param("token", &chest_token)
        .add_query_param("filename", "renamed.bin")
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.as_bytes().as_ref(), b"forever");
    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("filename=\"renamed.bin\""), "{}", disposition);
}

#[tokio::test]
async fn test_wrong_token_types_are_rejected() {
    let Some(app) = setup_test_app().await else { return };

    let (session_id, upload_token) = create_chest(&app).await;

    let form = MultipartForm::new().add_part(
        "files",
        Part::bytes(b"x".to_vec()).file_name("x.bin").mime_type("application/octet-stream"),
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
        .json(&json!({"fileIds": [file_id.clone()], "validityDays": 1}))
        .await;
    let code = response.json::<serde_json::Value>()["retrievalCode"]
        .as_str()
        .unwrap()
        .to_string();
    let chest_token = app
        .server
        .get(&format!("/api/retrieve/{}", code))
        .await
        .json::<serde_json::Value>()["chestToken"]
        .as_str()
        .unwrap()
        .to_string();

    // Upload token used for download: 401.
    let response = app
        .server
        .get(&format!("/api/download/{}", file_id))
        .add_header("Authorization", bearer(&upload_token))
        .await;
    assert_eq!(response.status_code(), 401);

    // Chest token used for upload: 401.
    let form = MultipartForm::new().add_part(
        "files",
        Part::bytes(b"y".to_vec()).file_name("y.bin").mime_type("application/octet-stream"),
    );
    let response = app
        .server
        .post(&format!("/api/chest/{}/upload", session_id))
        .add_header("Authorization", bearer(&chest_token))
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), 401);

    // Upload token bound to a different chest: 403.
    let (other_session, _) = create_chest(&app).await;
    let form = MultipartForm::new().add_part(
        "files",
        Part::bytes(b"z".to_vec()).file_name("z.bin").mime_type("application/octet-stream"),
    );
    let response = app
        .server
        .post(&format!("/api/chest/{}/upload", other_session))
        .add_header("Authorization", bearer(&upload_token))
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), 403);

    // No token at all: 401.
    let response = app.server.get(&format!("/api/download/{}", file_id)).await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn test_retrieval_code_validation_and_lookup() {
    let Some(app) = setup_test_app().await else { return };

    // Malformed codes: 400.
    for bad in ["12345", "ABCDEFG", "abc123", "ABC12%21"] {
        let response = app.server.get(&format!("/api/retrieve/{}", bad)).await;
        assert_eq!(response.status_code(), 400, "code {:?}", bad);
    }

    // Well-formed but unknown: 404.
    let response = app.server.get("/api/retrieve/ABCD99").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_seal_validation() {
    let Some(app) = setup_test_app().await else { return };

    let (session_id, upload_token) = create_chest(&app).await;

    // Unknown validity option: 400.
    let response = app
        .server
        .post(&format!("/api/chest/{}/complete", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .json(&json!({"fileIds": [], "validityDays": 2}))
        .await;
    assert_eq!(response.status_code(), 400);

    // Malformed file id: 400.
    let response = app
        .server
        .post(&format!("/api/chest/{}/complete", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .json(&json!({"fileIds": ["not-a-uuid"], "validityDays": 7}))
        .await;
    assert_eq!(response.status_code(), 400);

    // File id that is not in the chest: 400 (cardinality/ownership check).
    let response = app
        .server
        .post(&format!("/api/chest/{}/complete", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .json(&json!({"fileIds": [uuid::Uuid::new_v4().to_string()], "validityDays": 7}))
        .await;
    assert_eq!(response.status_code(), 400);

    // Malformed JSON body: 400, not 500.
    let response = app
        .server
        .post(&format!("/api/chest/{}/complete", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .content_type("application/json")
        .text("{not json")
        .await;
    assert_eq!(response.status_code(), 400);

    // Valid seal.
    let response = app
        .server
        .post(&format!("/api/chest/{}/complete", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .json(&json!({"fileIds": [], "validityDays": 1}))
        .await;
    assert_eq!(response.status_code(), 200);

    // Sealing again: 404 (already sealed), no state change.
    let response = app
        .server
        .post(&format!("/api/chest/{}/complete", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .json(&json!({"fileIds": [], "validityDays": 1}))
        .await;
    assert_eq!(response.status_code(), 404);

    // Uploads to a sealed chest: 404.
    let form = MultipartForm::new().add_part(
        "files",
        Part::bytes(b"late".to_vec()).file_name("late.bin").mime_type("application/octet-stream"),
    );
    let response = app
        .server
        .post(&format!("/api/chest/{}/upload", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_upload_order_and_accumulation() {
    let Some(app) = setup_test_app().await else { return };

    let (session_id, upload_token) = create_chest(&app).await;

    // Text item first in the form; files still come first in the response.
    let form = MultipartForm::new()
        .add_part("textItems", Part::text(r#"{"content":"first text"}"#))
        .add_part(
            "files",
            Part::bytes(b"bin".to_vec()).file_name("f1.bin").mime_type("application/octet-stream"),
        )
        .add_part("textItems", Part::text(r#"{"content":"second text","filename":"t2.txt"}"#));

    let response = app
        .server
        .post(&format!("/api/chest/{}/upload", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), 200);
    let uploaded = response.json::<serde_json::Value>()["uploadedFiles"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(uploaded.len(), 3);
    assert_eq!(uploaded[0]["filename"], "f1.bin");
    assert_eq!(uploaded[0]["isText"], false);
    // Unnamed text items get a generated text-{millis}.txt name.
    let generated = uploaded[1]["filename"].as_str().unwrap();
    assert!(generated.starts_with("text-") && generated.ends_with(".txt"));
    assert_eq!(uploaded[2]["filename"], "t2.txt");

    // A second request accumulates into the same chest.
    let form = MultipartForm::new().add_part(
        "files",
        Part::bytes(b"more".to_vec()).file_name("f2.bin").mime_type("application/octet-stream"),
    );
    let response = app
        .server
        .post(&format!("/api/chest/{}/upload", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), 200);

    let listed = app.state.files.list_for_session(session_id).await.unwrap();
    assert_eq!(listed.len(), 4);

    // An empty form is a bad request.
    let response = app
        .server
        .post(&format!("/api/chest/{}/upload", session_id))
        .add_header("Authorization", bearer(&upload_token))
        .multipart(MultipartForm::new().add_part("unrelated", Part::text("ignored")))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_config_endpoint_and_cors() {
    let Some(app) = setup_test_app().await else { return };

    let response = app.server.get("/api/config").await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["requireTOTP"], false);

    let response = app.server.get("/health").await;
    assert_eq!(response.status_code(), 200);

    // Permissive CORS on actual responses.
    let response = app
        .server
        .get("/api/config")
        .add_header("Origin", "https://example.com")
        .await;
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_totp_gate_rejects_without_code() {
    let mut config = helpers::test_config();
    config.require_totp = true;
    config.totp_secrets = chestdrop_core::config::parse_totp_secrets(Some(
        "ops:GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ",
    ))
    .unwrap();
    let Some(app) = helpers::setup_test_app_with(config).await else { return };

    // requireTOTP surfaces in the public config.
    let response = app.server.get("/api/config").await;
    assert_eq!(response.json::<serde_json::Value>()["requireTOTP"], true);

    // Missing code: 401.
    let response = app.server.post("/api/chest").await;
    assert_eq!(response.status_code(), 401);

    // Wrong code: 401.
    let response = app
        .server
        .post("/api/chest")
        .json(&json!({"totpToken": "000000"}))
        .await;
    assert_eq!(response.status_code(), 401);
}
