//! Per-file routes: thumbnails, metadata, previews, playback and processing.

mod common;

use std::time::Duration;

use common::{client, TestHarness, FALLBACK_JPEG};
use flix_av::testing::{is_frame, is_hls, is_subtitle_extraction, ScriptedRunner, FAKE_JPEG};
use flix_core::artifact::{subtitle_file_name, PLAYLIST_NAME};
use flix_core::derive_key;

const THREE_SUBTITLES: &str = r#"{
    "streams": [
        {"index": 0, "codec_type": "video", "codec_name": "h264"},
        {"index": 1, "codec_type": "audio", "codec_name": "aac"},
        {"index": 2, "codec_type": "subtitle", "codec_name": "subrip", "tags": {"language": "eng"}},
        {"index": 3, "codec_type": "subtitle", "codec_name": "subrip", "tags": {"language": "fre"}},
        {"index": 4, "codec_type": "subtitle", "codec_name": "subrip"}
    ],
    "format": {"duration": "60.0"}
}"#;

#[tokio::test]
async fn stream_redirects_to_playlist() {
    let h = TestHarness::new();
    h.add_file("movies/movie.mkv", b"source");
    let (_h, addr) = h.serve().await;
    let key = derive_key("movies/movie.mkv");

    let resp = client()
        .get(format!("http://{addr}/stream/movies/movie.mkv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 307);
    let location = resp.headers()["location"].to_str().unwrap().to_string();
    assert_eq!(location, format!("/hls/{key}/{PLAYLIST_NAME}"));

    let resp = client()
        .get(format!("http://{addr}{location}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/vnd.apple.mpegurl");
    assert!(resp.text().await.unwrap().contains("segment000.ts"));

    let variants: serde_json::Value = client()
        .get(format!("http://{addr}/hls/{key}/variants.json"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(variants["video"]["index"], 0);
    assert_eq!(variants["audioStreams"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_playback_transcodes_once() {
    let h = TestHarness::with_runner(ScriptedRunner::new().with_delay(Duration::from_millis(50)));
    h.add_file("movie.mkv", b"source");
    let runner = h.runner.clone();
    let (_h, addr) = h.serve().await;

    let requests: Vec<_> = (0..5)
        .map(|_| {
            let url = format!("http://{addr}/stream/movie.mkv");
            tokio::spawn(async move { client().get(url).send().await.unwrap().status() })
        })
        .collect();
    for r in requests {
        assert_eq!(r.await.unwrap(), 307);
    }
    assert_eq!(runner.count(is_hls), 1);
}

#[tokio::test]
async fn failed_rendition_is_retried_on_next_request() {
    let h = TestHarness::with_runner(ScriptedRunner::new().fail_when(is_hls));
    h.add_file("movie.mkv", b"source");
    let runner = h.runner.clone();
    let playlist = h.ctx.pipeline.layout().playlist(&derive_key("movie.mkv"));
    let (_h, addr) = h.serve().await;

    for attempt in 1..=2 {
        let resp = client()
            .get(format!("http://{addr}/stream/movie.mkv"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "tool_error");
        assert_eq!(runner.count(is_hls), attempt);
        assert!(!playlist.exists());
    }
}

#[tokio::test]
async fn partial_subtitle_failure_is_still_a_rendition() {
    let runner = ScriptedRunner::new()
        .with_probe_json(THREE_SUBTITLES)
        .fail_when(is_subtitle_extraction(3));
    let h = TestHarness::with_runner(runner);
    h.add_file("show.mkv", b"source");
    let dir = h.ctx.pipeline.layout().rendition_dir(&derive_key("show.mkv"));
    let (_h, addr) = h.serve().await;

    let resp = client()
        .post(format!("http://{addr}/process/show.mkv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["encoder"], "software");

    assert!(dir.join(subtitle_file_name(2)).is_file());
    assert!(!dir.join(subtitle_file_name(3)).exists());
    assert!(dir.join(subtitle_file_name(4)).is_file());

    let manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.join("variants.json")).unwrap()).unwrap();
    let subtitles = manifest["subtitleStreams"].as_array().unwrap();
    assert_eq!(subtitles.len(), 3);
    assert_eq!(subtitles[2]["language"], "und");
    assert_eq!(subtitles[2]["title"], "Subtitle Track 3");
}

#[tokio::test]
async fn thumbnail_is_generated_and_cached() {
    let h = TestHarness::new();
    h.add_file("movie.mkv", b"source");
    let runner = h.runner.clone();
    let (_h, addr) = h.serve().await;

    for _ in 0..2 {
        let resp = client()
            .get(format!("http://{addr}/thumbnail/movie.mkv"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "image/jpeg");
        assert_eq!(resp.bytes().await.unwrap().as_ref(), FAKE_JPEG);
    }
    assert_eq!(runner.count(is_frame), 1);
}

#[tokio::test]
async fn failed_thumbnail_serves_fallback_with_404() {
    let h = TestHarness::with_runner(ScriptedRunner::new().fail_when(is_frame));
    h.add_file("movie.mkv", b"source");
    let runner = h.runner.clone();
    let (_h, addr) = h.serve().await;

    let resp = client()
        .get(format!("http://{addr}/thumbnail/movie.mkv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), FALLBACK_JPEG);
    // Primary and fallback attempt.
    assert_eq!(runner.count(is_frame), 2);
}

#[tokio::test]
async fn metadata_defaults_are_filled_in() {
    let h = TestHarness::with_runner(ScriptedRunner::new().with_probe_json(THREE_SUBTITLES));
    h.add_file("show.mkv", b"source");
    let (_h, addr) = h.serve().await;

    let resp = client()
        .get(format!("http://{addr}/metadata/show.mkv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let meta: serde_json::Value = resp.json().await.unwrap();

    assert_eq!(meta["videoInfo"]["title"], "Video Track");
    let audio = &meta["audioStreams"][0];
    assert_eq!(audio["language"], "und");
    assert_eq!(audio["title"], "Audio Track 1");
    assert_eq!(audio["channels"], 2);
    assert_eq!(meta["subtitleStreams"][0]["language"], "eng");
    assert_eq!(meta["subtitleStreams"][1]["title"], "Subtitle Track 2");
}

#[tokio::test]
async fn metadata_of_missing_file_is_404() {
    let (_h, addr) = TestHarness::new().serve().await;
    let resp = client()
        .get(format!("http://{addr}/metadata/missing.mkv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn metadata_of_unreadable_file_is_404() {
    let h = TestHarness::with_runner(
        ScriptedRunner::new().fail_when(|inv| inv.tool == flix_av::Tool::Ffprobe),
    );
    h.add_file("broken.mkv", b"garbage");
    let (_h, addr) = h.serve().await;

    let resp = client()
        .get(format!("http://{addr}/metadata/broken.mkv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "tool_error");
}

#[tokio::test]
async fn process_failure_is_500() {
    let h = TestHarness::with_runner(ScriptedRunner::new().fail_when(is_hls));
    h.add_file("movie.mkv", b"source");
    let (_h, addr) = h.serve().await;

    let resp = client()
        .post(format!("http://{addr}/process/movie.mkv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "tool_error");
}

#[tokio::test]
async fn previews_of_unknown_duration_are_an_empty_list() {
    let h = TestHarness::with_runner(ScriptedRunner::new().with_probe_json(
        r#"{"streams":[{"index":0,"codec_type":"video","codec_name":"h264"}],"format":{}}"#,
    ));
    h.add_file("clip.mkv", b"source");
    let (_h, addr) = h.serve().await;

    let resp = client()
        .get(format!("http://{addr}/previews/clip.mkv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["previews"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn previews_are_generated_and_served() {
    let h = TestHarness::new();
    h.add_file("movie.mkv", b"source");
    let (_h, addr) = h.serve().await;
    let key = derive_key("movie.mkv");

    let body: serde_json::Value = client()
        .get(format!("http://{addr}/previews/movie.mkv"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let previews = body["previews"].as_array().unwrap();
    assert_eq!(previews.len(), 10);
    assert_eq!(previews[0], format!("/preview/{key}/preview_000.jpg"));

    let resp = client()
        .get(format!("http://{addr}/preview/{key}/preview_009.jpg"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), FAKE_JPEG);
}

#[tokio::test]
async fn missing_ffmpeg_still_streams_raw_files() {
    let runner = ScriptedRunner::new().without_tool(flix_av::Tool::Ffmpeg);
    let h = TestHarness::with_runner(runner);
    h.add_file("movie.mkv", b"source");
    let (_h, addr) = h.serve().await;

    let resp = client()
        .get(format!("http://{addr}/stream/movie.mkv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "tool_unavailable");

    let resp = client()
        .get(format!("http://{addr}/file/movie.mkv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"source");
}
