//! Shared test harness for integration tests.
//!
//! [`TestHarness`] builds a full [`AppContext`] over a temporary library and
//! cache directory, with external tools replaced by a [`ScriptedRunner`].
//! [`TestHarness::serve`] starts Axum on a random port for HTTP-level tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flix_av::testing::ScriptedRunner;
use flix_av::ToolRegistry;
use flix_core::config::Config;
use flix_server::context::AppContext;

/// Bytes served by the fallback thumbnail.
pub const FALLBACK_JPEG: &[u8] = b"fallback-image";

pub struct TestHarness {
    pub ctx: AppContext,
    pub runner: ScriptedRunner,
    pub library: tempfile::TempDir,
    pub cache: tempfile::TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_runner(ScriptedRunner::new())
    }

    pub fn with_runner(runner: ScriptedRunner) -> Self {
        Self::build(runner, |_| {})
    }

    /// Harness with a scripted runner and a config tweak applied on top of
    /// the test defaults.
    pub fn build(runner: ScriptedRunner, configure: impl FnOnce(&mut Config)) -> Self {
        let library = tempfile::tempdir().expect("library tempdir");
        let cache = tempfile::tempdir().expect("cache tempdir");

        let fallback = cache.path().join("fallback.jpg");
        std::fs::write(&fallback, FALLBACK_JPEG).expect("write fallback");

        let mut config = Config::default();
        config.library.root = library.path().to_path_buf();
        config.cache.dir = cache.path().join("artifacts");
        config.server.fallback_thumbnail = Some(fallback);
        config.watch.enabled = false;
        configure(&mut config);

        let ctx = AppContext::new(config, Arc::new(runner.clone()), ToolRegistry::default())
            .expect("build context");

        Self {
            ctx,
            runner,
            library,
            cache,
        }
    }

    /// Write a file into the library and return its absolute path.
    pub fn add_file(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.library.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, bytes).expect("write library file");
        path
    }

    /// Start the router on a random port.
    pub async fn serve(self) -> (Self, SocketAddr) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            flix_server::serve(listener, ctx, std::future::pending()).await.ok();
        });

        (self, addr)
    }
}

/// HTTP client that does not follow redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("build client")
}

/// Poll `check` every 20 ms for up to 5 s.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
