//! Router tests driven in-process with `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::TestHarness;
use flix_av::testing::ScriptedRunner;
use flix_server::router::build_router;
use http_body_util::BodyExt;
use tower::ServiceExt;

async fn body_to_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_endpoint() {
    let h = TestHarness::new();
    let app = build_router(h.ctx.clone(), None);

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_to_string(response.into_body()).await, "ok");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let h = TestHarness::new();
    let app = build_router(h.ctx.clone(), None);

    let response = app
        .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn static_dir_serves_index() {
    let h = TestHarness::new();
    let web = tempfile::tempdir().unwrap();
    std::fs::write(web.path().join("index.html"), "<html>player</html>").unwrap();
    let app = build_router(h.ctx.clone(), Some(web.path().to_path_buf()));

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_to_string(response.into_body()).await, "<html>player</html>");
}

#[tokio::test]
async fn static_dir_is_behind_auth() {
    let h = TestHarness::build(ScriptedRunner::new(), |c| {
        c.auth.enabled = true;
        c.auth.username = Some("viewer".into());
        c.auth.password = Some("hunter2".into());
    });
    let web = tempfile::tempdir().unwrap();
    std::fs::write(web.path().join("index.html"), "<html></html>").unwrap();
    let app = build_router(h.ctx.clone(), Some(web.path().to_path_buf()));

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn metadata_endpoint_returns_json() {
    let h = TestHarness::new();
    h.add_file("clip.mkv", b"video");
    let app = build_router(h.ctx.clone(), None);

    let response = app
        .oneshot(Request::get("/metadata/clip.mkv").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let json: serde_json::Value =
        serde_json::from_str(&body_to_string(response.into_body()).await).unwrap();
    assert_eq!(json["containerDurationSeconds"], 120.0);
    assert_eq!(json["audioStreams"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn cors_headers_are_set() {
    let h = TestHarness::new();
    let app = build_router(h.ctx.clone(), None);

    let response = app
        .oneshot(
            Request::get("/health")
                .header(header::ORIGIN, "http://player.local")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}
