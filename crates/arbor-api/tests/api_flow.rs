/// Integration tests: drive the full API router over an in-memory database
/// and a scratch upload directory.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use arbor_api::uploads::Uploads;
use arbor_api::{AppStateInner, router};
use arbor_db::Database;

const BOUNDARY: &str = "arbor-test-boundary";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-pixels";

async fn test_app() -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        uploads: Uploads::new(dir.path().to_path_buf()).await.unwrap(),
    });
    (router(state), dir)
}

fn multipart_body(fields: &[(&str, &str)], image: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(bytes) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"tree.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(uri: &str, fields: &[(&str, &str)], image: Option<&[u8]>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(fields, image)))
        .unwrap()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    raw_json_request(method, uri, body.to_string())
}

fn raw_json_request(method: Method, uri: &str, body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.into()))
        .unwrap()
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, req).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_oak(app: &Router) -> Value {
    let (status, tree) = send_json(
        app,
        multipart_request(
            "/api/trees",
            &[
                ("name", "Oak"),
                ("numberPlanted", "5"),
                ("user", "ana"),
                ("latitude", "60.17"),
                ("longitude", "24.94"),
            ],
            Some(PNG),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    tree
}

#[tokio::test]
async fn tree_lifecycle() {
    let (app, dir) = test_app().await;

    let tree = create_oak(&app).await;
    let id = tree["id"].as_str().unwrap().to_string();
    assert_eq!(tree["name"], "Oak");
    assert_eq!(tree["user"], "ana");
    assert_eq!(tree["numberPlanted"], 5);
    assert_eq!(tree["location"]["latitude"], 60.17);
    assert_eq!(tree["image"]["contentType"], "image/png");
    assert_eq!(
        B64.decode(tree["image"]["data"].as_str().unwrap()).unwrap(),
        PNG
    );

    // the scratch copy is gone once the record is stored
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let (status, fetched) = send_json(&app, empty_request(Method::GET, &format!("/api/trees/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], id.as_str());

    let (status, all) = send_json(&app, empty_request(Method::GET, "/api/trees")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);

    let (status, info) = send(&app, empty_request(Method::GET, "/info")).await;
    assert_eq!(status, StatusCode::OK);
    let info = String::from_utf8(info).unwrap();
    assert!(info.starts_with("The tree database has info for 1 trees\n"));

    let (status, _) = send(&app, empty_request(Method::DELETE, &format!("/api/trees/{id}"))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send_json(&app, empty_request(Method::GET, &format!("/api/trees/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "tree not found");

    // deleting again is still a 204
    let (status, _) = send(&app, empty_request(Method::DELETE, &format!("/api/trees/{id}"))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn create_tree_validation_messages() {
    let (app, _dir) = test_app().await;

    let cases: [(&[(&str, &str)], Option<&[u8]>, &str); 5] = [
        (&[("numberPlanted", "3")], Some(PNG), "name missing"),
        (&[("name", "Oak")], Some(PNG), "number planted missing"),
        (&[("name", "Oak"), ("numberPlanted", "3")], None, "image missing"),
        (
            &[("name", "Oak"), ("numberPlanted", "0")],
            Some(PNG),
            "The amount planted has to be positive whole numbers",
        ),
        (
            &[("name", "Ek"), ("numberPlanted", "3")],
            Some(PNG),
            "name must be at least 3 characters",
        ),
    ];

    for (fields, image, expected) in cases {
        let (status, body) = send_json(&app, multipart_request("/api/trees", fields, image)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "case {expected}");
        assert_eq!(body["error"], expected);
    }

    let (_, all) = send_json(&app, empty_request(Method::GET, "/api/trees")).await;
    assert!(all.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn default_user_is_unnamed() {
    let (app, _dir) = test_app().await;
    let (status, tree) = send_json(
        &app,
        multipart_request("/api/trees", &[("name", "Rowan"), ("numberPlanted", "1")], Some(PNG)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tree["user"], "unnamed");
    assert!(tree["location"]["latitude"].is_null());
}

#[tokio::test]
async fn malformed_ids_are_rejected() {
    let (app, _dir) = test_app().await;

    for (method, uri) in [
        (Method::GET, "/api/trees/not-an-id"),
        (Method::DELETE, "/api/trees/not-an-id"),
        (Method::GET, "/api/trees/getupdates/not-an-id"),
    ] {
        let (status, body) = send_json(&app, empty_request(method, uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "malformatted id");
    }
}

#[tokio::test]
async fn edit_tree() {
    let (app, _dir) = test_app().await;
    let tree = create_oak(&app).await;
    let uri = format!("/api/trees/{}", tree["id"].as_str().unwrap());

    let (status, edited) = send_json(
        &app,
        json_request(
            Method::PUT,
            &uri,
            json!({ "name": "Red oak", "numberPlanted": 8, "location": { "latitude": 1.5, "longitude": null } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["name"], "Red oak");
    assert_eq!(edited["numberPlanted"], 8);
    assert_eq!(edited["user"], "ana");
    assert_eq!(edited["location"]["latitude"], 1.5);
    assert!(edited["location"]["longitude"].is_null());
    assert_eq!(edited["createdAt"], tree["createdAt"]);

    let created = chrono::DateTime::parse_from_rfc3339(edited["createdAt"].as_str().unwrap()).unwrap();
    let updated = chrono::DateTime::parse_from_rfc3339(edited["updatedAt"].as_str().unwrap()).unwrap();
    assert!(updated >= created);

    let (status, _) = send_json(&app, json_request(Method::PUT, &uri, json!({ "numberPlanted": -1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(&app, json_request(Method::PUT, &uri, json!({ "name": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = format!("/api/trees/{}", uuid::Uuid::new_v4());
    let (status, _) = send_json(&app, json_request(Method::PUT, &missing, json!({ "name": "Birch" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, fetched) = send_json(&app, empty_request(Method::GET, &uri)).await;
    assert_eq!(fetched["name"], "Red oak");
}

#[tokio::test]
async fn tree_updates_flow() {
    let (app, _dir) = test_app().await;
    let tree = create_oak(&app).await;
    let id = tree["id"].as_str().unwrap();

    let (status, update) = send_json(
        &app,
        multipart_request(
            &format!("/api/trees/{id}/update"),
            &[("user", "ana"), ("text", "first leaves")],
            Some(PNG),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(update["treeId"], id);
    assert_eq!(update["text"], "first leaves");

    let (status, body) = send_json(
        &app,
        multipart_request(&format!("/api/trees/{id}/update"), &[("text", "no picture")], None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "image missing");

    let (status, updates) = send_json(
        &app,
        empty_request(Method::GET, &format!("/api/trees/getupdates/{id}")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let updates = updates.as_array().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["user"], "ana");

    let other = uuid::Uuid::new_v4();
    let (_, none) = send_json(
        &app,
        empty_request(Method::GET, &format!("/api/trees/getupdates/{other}")),
    )
    .await;
    assert!(none.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn register_and_login() {
    let (app, _dir) = test_app().await;

    let (status, user) = send_json(
        &app,
        json_request(
            Method::POST,
            "/api/users/register",
            json!({ "userName": "ana", "userEmail": "Ana@Example.com", "password": "correct-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["userName"], "ana");
    assert_eq!(user["userEmail"], "ana@example.com");
    assert!(user.get("passwordHash").is_none());
    assert!(user.get("salt").is_none());

    let (status, _) = send_json(
        &app,
        json_request(
            Method::POST,
            "/api/users/register",
            json!({ "userName": "other", "userEmail": "ana@example.com", "password": "another-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, logged_in) = send_json(
        &app,
        json_request(
            Method::POST,
            "/api/users/login",
            json!({ "userEmail": "ANA@example.com", "password": "correct-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logged_in["id"], user["id"]);

    let (wrong_status, wrong_body) = send_json(
        &app,
        json_request(
            Method::POST,
            "/api/users/login",
            json!({ "userEmail": "ana@example.com", "password": "wrong-password" }),
        ),
    )
    .await;
    let (unknown_status, unknown_body) = send_json(
        &app,
        json_request(
            Method::POST,
            "/api/users/login",
            json!({ "userEmail": "nobody@example.com", "password": "correct-password" }),
        ),
    )
    .await;
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);
    assert_eq!(wrong_body["error"], "invalid email or password");
}

#[tokio::test]
async fn register_validation() {
    let (app, _dir) = test_app().await;

    for body in [
        json!({ "userName": "an", "userEmail": "ana@example.com", "password": "long-enough" }),
        json!({ "userName": "ana", "userEmail": "not-an-email", "password": "long-enough" }),
        json!({ "userName": "ana", "userEmail": "ana@example.com", "password": "short" }),
        // eight bytes but only four characters
        json!({ "userName": "ana", "userEmail": "ana@example.com", "password": "äöüß" }),
    ] {
        let (status, body) = send_json(&app, json_request(Method::POST, "/api/users/register", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn rejected_bodies_render_json_errors() {
    let (app, _dir) = test_app().await;

    // missing field
    let (status, body) = send_json(
        &app,
        json_request(
            Method::POST,
            "/api/users/register",
            json!({ "userName": "ana", "password": "long-enough" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("userEmail"));

    // malformed JSON
    let (status, body) = send_json(
        &app,
        raw_json_request(Method::POST, "/api/users/login", r#"{"userEmail":"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    // JSON where a multipart form is expected
    let (status, body) = send_json(
        &app,
        json_request(Method::POST, "/api/trees", json!({ "name": "Oak", "numberPlanted": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}
