//! HTTP Basic authentication tests.

mod common;

use common::{client, TestHarness};
use flix_av::testing::ScriptedRunner;

fn secured() -> TestHarness {
    TestHarness::build(ScriptedRunner::new(), |c| {
        c.auth.enabled = true;
        c.auth.username = Some("viewer".into());
        c.auth.password = Some("hunter2".into());
    })
}

#[tokio::test]
async fn missing_credentials_are_challenged() {
    let (_h, addr) = secured().serve().await;

    let resp = client()
        .get(format!("http://{addr}/files"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let challenge = resp.headers()["www-authenticate"].to_str().unwrap();
    assert!(challenge.starts_with("Basic"), "{challenge}");
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let h = secured();
    h.add_file("clip.mkv", b"v");
    let (_h, addr) = h.serve().await;

    let resp = client()
        .get(format!("http://{addr}/file/clip.mkv"))
        .basic_auth("viewer", Some("wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn valid_credentials_are_accepted() {
    let h = secured();
    h.add_file("clip.mkv", b"video");
    let (_h, addr) = h.serve().await;

    let resp = client()
        .get(format!("http://{addr}/files"))
        .basic_auth("viewer", Some("hunter2"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client()
        .get(format!("http://{addr}/file/clip.mkv"))
        .basic_auth("viewer", Some("hunter2"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"video");
}

#[tokio::test]
async fn health_is_public() {
    let (_h, addr) = secured().serve().await;

    let resp = client()
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn disabled_auth_needs_no_credentials() {
    let (_h, addr) = TestHarness::new().serve().await;

    let resp = client()
        .get(format!("http://{addr}/files"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}
