use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use pledge_api::auth::{self, AppState, AppStateInner};
use pledge_api::build_router;
use pledge_api::config::{Config, CredentialsUser};
use pledge_db::Database;

const BOUNDARY: &str = "pledge-test-boundary";
const TEST_EMAIL: &str = "test@example.com";
const TEST_PASSWORD: &str = "test";

struct TestApp {
    router: Router,
    state: AppState,
    uploads: TempDir,
}

fn app() -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let salt = SaltString::encode_b64(b"pledge-test-salt").unwrap();
    let password_hash = Argon2::default()
        .hash_password(TEST_PASSWORD.as_bytes(), &salt)
        .unwrap()
        .to_string();

    let config = Config {
        jwt_secret: "test-secret".to_string(),
        public_url: "https://pledge.test".to_string(),
        upload_dir: uploads.path().to_path_buf(),
        credentials: Some(CredentialsUser {
            email: TEST_EMAIL.to_string(),
            name: Some("Test User".to_string()),
            password_hash,
        }),
        ..Config::default()
    };

    let state: AppState = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        config,
    });

    TestApp {
        router: build_router(state.clone()),
        state,
        uploads,
    }
}

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_empty(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn multipart(data: Option<&Value>, files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(data) = data {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"data\"\r\n\r\n{}\r\n",
                data
            )
            .as_bytes(),
        );
    }
    for (field, file_name, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn create_request(token: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/promises/create")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}

async fn create(app: &TestApp, token: &str, data: Value) -> (StatusCode, Value) {
    send(app, create_request(Some(token), multipart(Some(&data), &[]))).await
}

async fn sign_in(app: &TestApp) -> String {
    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/callback/credentials")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": TEST_EMAIL, "password": TEST_PASSWORD }).to_string(),
        ))
        .unwrap();

    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

/// A second user, signed in through the provider hook directly.
fn other_user_token(app: &TestApp, email: &str) -> String {
    let user = auth::upsert_identity(&app.state.db, email, None, None, Utc::now()).unwrap();
    auth::create_token(&app.state.config.jwt_secret, &user, Utc::now())
        .unwrap()
        .0
}

fn quit_smoking() -> Value {
    json!({
        "title": "Quit smoking",
        "description": "No more cigarettes",
        "promiseTo": "Alex"
    })
}

#[tokio::test]
async fn create_view_forfeit_flow() {
    let app = app();
    let token = sign_in(&app).await;

    let (status, created) = create(&app, &token, quit_smoking()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "ACTIVE");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, viewed) = send(&app, get(&format!("/api/promises/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(viewed["title"], "Quit smoking");
    assert_eq!(viewed["promiseTo"], "Alex");
    assert!(viewed.get("creatorId").is_none());

    let (status, forfeited) =
        send(&app, post_empty(&format!("/api/promises/forfeit/{id}"), Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(forfeited["status"], "CANCELLED");

    let (status, again) =
        send(&app, post_empty(&format!("/api/promises/forfeit/{id}"), Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(again["message"], "Cannot forfeit a completed promise");
}

#[tokio::test]
async fn protected_routes_need_a_session() {
    let app = app();

    let (status, body) = send(&app, get("/api/promises/list", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Not authenticated");

    let (status, _) = send(&app, get("/api/promises/list", Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, create_request(None, multipart(Some(&quit_smoking()), &[]))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let id = uuid::Uuid::new_v4();
    let (status, _) = send(&app, post_empty(&format!("/api/promises/forfeit/{id}"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, get(&format!("/api/promises/qr/{id}"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn short_fields_fail_validation() {
    let app = app();
    let token = sign_in(&app).await;

    for field in ["title", "description", "promiseTo"] {
        let mut data = quit_smoking();
        data[field] = json!("x");
        let (status, body) = create(&app, &token, data).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "field {field}");
        assert!(body["message"].as_str().unwrap().contains("at least 2 characters"));
    }

    let (status, body) = send(&app, create_request(Some(&token), multipart(None, &[]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing required fields");
}

#[tokio::test]
async fn secret_promise_hidden_until_reveal() {
    let app = app();
    let token = sign_in(&app).await;

    let reveal = Utc::now() + Duration::days(3);
    let mut sealed = quit_smoking();
    sealed["isSecret"] = json!(true);
    sealed["revealDate"] = json!(reveal.to_rfc3339());
    let (status, created) = create(&app, &token, sealed).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) =
        send(&app, get(&format!("/api/promises/{}", created["id"].as_str().unwrap()), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains(&reveal.format("%Y-%m-%d").to_string()));

    let mut revealed = quit_smoking();
    revealed["isSecret"] = json!(true);
    revealed["revealDate"] = json!((Utc::now() - Duration::days(1)).to_rfc3339());
    let (_, created) = create(&app, &token, revealed).await;

    let (status, body) =
        send(&app, get(&format!("/api/promises/{}", created["id"].as_str().unwrap()), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Quit smoking");
    assert_eq!(body["isSecret"], true);
}

#[tokio::test]
async fn only_the_creator_may_forfeit_or_share() {
    let app = app();
    let owner = sign_in(&app).await;
    let stranger = other_user_token(&app, "stranger@example.com");

    let (_, created) = create(&app, &owner, quit_smoking()).await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) =
        send(&app, post_empty(&format!("/api/promises/forfeit/{id}"), Some(&stranger))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, get(&format!("/api/promises/qr/{id}"), Some(&stranger))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, get(&format!("/api/promises/qr/{id}"), Some(&owner))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["qrCode"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    let (_, still_active) = send(&app, get(&format!("/api/promises/{id}"), None)).await;
    assert_eq!(still_active["status"], "ACTIVE");
}

#[tokio::test]
async fn list_is_scoped_to_caller_newest_first() {
    let app = app();
    let alice = sign_in(&app).await;
    let bob = other_user_token(&app, "bob@example.com");

    for title in ["First", "Second", "Third"] {
        let mut data = quit_smoking();
        data["title"] = json!(title);
        let (status, _) = create(&app, &alice, data).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let mut bobs = quit_smoking();
    bobs["title"] = json!("Bob's promise");
    create(&app, &bob, bobs).await;

    let (status, body) = send(&app, get("/api/promises/list", Some(&alice))).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Third", "Second", "First"]);
    assert_eq!(body[0]["reactionCount"], 0);
    assert_eq!(body[0]["challenges"], json!([]));
}

#[tokio::test]
async fn proof_files_are_stored_but_not_public() {
    let app = app();
    let token = sign_in(&app).await;

    let body = multipart(
        Some(&quit_smoking()),
        &[
            ("proofImage", "proof.png", &b"fake png bytes"[..]),
            ("voiceRecording", "voice.webm", &b"fake audio"[..]),
        ],
    );
    let (status, created) = send(&app, create_request(Some(&token), body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let image = created["proofImage"].as_str().unwrap();
    assert!(image.starts_with("proofImage-") && image.ends_with(".png"));
    let voice = created["voiceRecording"].as_str().unwrap();
    assert!(voice.starts_with("voiceRecording-") && voice.ends_with(".webm"));
    assert_eq!(
        std::fs::read(app.uploads.path().join(image)).unwrap(),
        b"fake png bytes"
    );

    let (_, public) =
        send(&app, get(&format!("/api/promises/{}", created["id"].as_str().unwrap()), None)).await;
    assert!(public.get("proofImage").is_none());
    assert!(public.get("voiceRecording").is_none());
}

#[tokio::test]
async fn rejected_create_leaves_no_files() {
    let app = app();
    let token = sign_in(&app).await;

    let mut data = quit_smoking();
    data["title"] = json!("x");
    let body = multipart(Some(&data), &[("proofImage", "proof.png", &b"bytes"[..])]);
    let (status, _) = send(&app, create_request(Some(&token), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(std::fs::read_dir(app.uploads.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn oversized_uploads_are_refused() {
    let app = app();
    let token = sign_in(&app).await;

    let big = vec![0u8; 6 * 1024 * 1024];
    let body = multipart(Some(&quit_smoking()), &[("proofImage", "proof.png", &big[..])]);
    let (status, body) = send(&app, create_request(Some(&token), body)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["message"], "proofImage exceeds the 5 MB limit");

    let huge = vec![0u8; 12 * 1024 * 1024];
    let body = multipart(Some(&quit_smoking()), &[("voiceRecording", "voice.webm", &huge[..])]);
    let (status, body) = send(&app, create_request(Some(&token), body)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["message"], "Upload exceeds the 5 MB limit");

    assert_eq!(std::fs::read_dir(app.uploads.path()).unwrap().count(), 0);
    let (_, listed) = send(&app, get("/api/promises/list", Some(&token))).await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn malformed_requests_get_json_errors() {
    let app = app();
    let token = sign_in(&app).await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/promises/create")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(quit_smoking().to_string()))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());

    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/callback/credentials")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn bad_and_unknown_ids() {
    let app = app();

    let (status, body) = send(&app, get("/api/promises/not-a-uuid", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid promise ID");

    let (status, body) =
        send(&app, get(&format!("/api/promises/{}", uuid::Uuid::new_v4()), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Promise not found");
}

#[tokio::test]
async fn credentials_sign_in_and_session() {
    let app = app();

    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/callback/credentials")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": TEST_EMAIL, "password": "wrong" }).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");

    let token = sign_in(&app).await;
    let (status, session) = send(&app, get("/api/auth/session", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["user"]["email"], TEST_EMAIL);
    assert_eq!(session["user"]["name"], "Test User");

    // Signing in again keeps the same user.
    let again = sign_in(&app).await;
    let (_, second) = send(&app, get("/api/auth/session", Some(&again))).await;
    assert_eq!(second["user"]["id"], session["user"]["id"]);
}
