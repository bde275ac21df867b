//! Artifact generation for library files.
//!
//! [`MediaPipeline`] binds the generators in `flix-av` to the
//! [`ArtifactCache`]. Request paths obtain metadata in the caller's context
//! before another artifact is ensured, and prefetch reads whatever metadata is
//! cached, so no generation task ever waits on another one from inside the
//! worker pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use flix_av::previews::generate_previews;
use flix_av::rendition::build_rendition;
use flix_av::thumbnail::{generate_thumbnail, poster_seek};
use flix_av::{EncoderSelector, FrameOptions, RenditionOptions, SharedRunner, Staging, VideoEncoder};
use flix_core::config::Config;
use flix_core::{ArtifactKind, ArtifactLayout, Error, MediaMetadata, Result};

use crate::cache::ArtifactCache;
use crate::context::MediaSource;
use crate::pool::WorkerPool;

/// Name of the staged file inside a metadata staging area.
const STAGED_METADATA: &str = "metadata.json";

pub struct MediaPipeline {
    config: Arc<Config>,
    runner: SharedRunner,
    cache: ArtifactCache,
    encoder: EncoderSelector,
}

impl MediaPipeline {
    pub fn new(
        config: Arc<Config>,
        runner: SharedRunner,
        layout: ArtifactLayout,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            config,
            runner,
            cache: ArtifactCache::new(layout, pool),
            encoder: EncoderSelector::new(),
        }
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn layout(&self) -> &ArtifactLayout {
        self.cache.layout()
    }

    /// The video encoder, once the first rendition has selected it.
    pub fn selected_encoder(&self) -> Option<VideoEncoder> {
        self.encoder.current()
    }

    /// Probe `source`, caching the result as JSON.
    pub async fn metadata(self: &Arc<Self>, source: &MediaSource) -> Result<MediaMetadata> {
        self.revalidate(source);
        let path = self
            .cache
            .ensure(ArtifactKind::Metadata, &source.key, self.metadata_generator(source))
            .await?;

        let bytes = tokio::fs::read(&path).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            Error::Probe(format!("cached metadata {} is unreadable: {e}", path.display()))
        })
    }

    /// Poster frame for `source`.
    pub async fn thumbnail(self: &Arc<Self>, source: &MediaSource) -> Result<PathBuf> {
        if let Some(path) = self.present(ArtifactKind::Thumbnail, source) {
            return Ok(path);
        }

        let duration = self.known_duration(source).await;
        self.cache
            .ensure(
                ArtifactKind::Thumbnail,
                &source.key,
                self.thumbnail_generator(source, Some(duration)),
            )
            .await
    }

    /// Preview strip for `source`, in index order.
    ///
    /// A file of unknown duration has no previews; that is not an error.
    pub async fn previews(self: &Arc<Self>, source: &MediaSource) -> Result<Vec<PathBuf>> {
        if let Some(dir) = self.present(ArtifactKind::Previews, source) {
            return list_previews(&dir);
        }

        let duration = self.known_duration(source).await;
        if duration <= 0.0 {
            tracing::debug!(path = %source.relative, "Duration unknown; no previews");
            return Ok(Vec::new());
        }
        let media = &self.config.media;
        let count = media.preview_count;
        let opts = FrameOptions {
            width: media.preview_width,
            quality: media.preview_quality,
            fallback_seek_secs: None,
            timeout: self.config.timeouts.thumbnail(),
        };

        let runner = self.runner.clone();
        let input = source.absolute.clone();
        let target = self.layout().previews_dir(&source.key);
        let dir = self
            .cache
            .ensure(ArtifactKind::Previews, &source.key, move || async move {
                let staging = Staging::for_target(&target)?;
                let written =
                    generate_previews(runner.as_ref(), &input, duration, count, staging.path(), &opts)
                        .await;
                if written.is_empty() {
                    return Err(Error::generation(
                        ArtifactKind::Previews,
                        "no preview frame could be extracted",
                    ));
                }
                staging.commit_dir()?;
                Ok(())
            })
            .await?;
        list_previews(&dir)
    }

    /// HLS rendition of `source`; returns the playlist path.
    pub async fn rendition(self: &Arc<Self>, source: &MediaSource) -> Result<PathBuf> {
        if let Some(path) = self.present(ArtifactKind::Rendition, source) {
            return Ok(path);
        }

        // Without metadata the rendition still maps the default streams.
        let metadata = self.metadata(source).await.ok();
        let encoder = self
            .encoder
            .select(
                self.runner.as_ref(),
                &self.config.media,
                self.config.timeouts.encoder_query(),
            )
            .await;
        let opts = RenditionOptions {
            media: self.config.media.clone(),
            encoder,
            timeout: self.config.timeouts.rendition(),
            subtitle_timeout: self.config.timeouts.subtitle(),
        };

        let runner = self.runner.clone();
        let input = source.absolute.clone();
        let output = self.layout().rendition_dir(&source.key);
        self.cache
            .ensure(ArtifactKind::Rendition, &source.key, move || async move {
                build_rendition(runner.as_ref(), &input, metadata.as_ref(), &output, &opts).await?;
                Ok(())
            })
            .await
    }

    /// Schedule metadata and thumbnail generation on the worker pool without
    /// waiting.
    pub fn prefetch(&self, source: MediaSource) {
        if self.present(ArtifactKind::Thumbnail, &source).is_some()
            && self.present(ArtifactKind::Metadata, &source).is_some()
        {
            return;
        }

        self.revalidate(&source);
        self.cache.ensure_detached(
            ArtifactKind::Metadata,
            &source.key,
            self.metadata_generator(&source),
        );
        // The seek is clamped with whatever metadata is cached once the
        // thumbnail task runs.
        self.cache.ensure_detached(
            ArtifactKind::Thumbnail,
            &source.key,
            self.thumbnail_generator(&source, None),
        );
    }

    fn present(&self, kind: ArtifactKind, source: &MediaSource) -> Option<PathBuf> {
        let marker = self.layout().marker(kind, &source.key);
        marker.exists().then_some(marker)
    }

    /// Probed duration, or 0 when the file cannot be probed.
    async fn known_duration(self: &Arc<Self>, source: &MediaSource) -> f64 {
        match self.metadata(source).await {
            Ok(m) => m.duration_seconds(),
            Err(e) => {
                tracing::debug!(path = %source.relative, "No metadata: {e}");
                0.0
            }
        }
    }

    fn metadata_generator(
        &self,
        source: &MediaSource,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<()>> + Send + 'static {
        let runner = self.runner.clone();
        let timeout = self.config.timeouts.probe();
        let input = source.absolute.clone();
        let output = self.layout().metadata(&source.key);
        move || {
            Box::pin(async move {
                let metadata = flix_av::probe::probe(runner.as_ref(), &input, timeout).await?;
                let json = serde_json::to_vec_pretty(&metadata).map_err(|e| {
                    Error::generation(ArtifactKind::Metadata, format!("serialize: {e}"))
                })?;
                let staging = Staging::for_target(&output)?;
                std::fs::write(staging.path_for(STAGED_METADATA), json)?;
                staging.commit_file(STAGED_METADATA)?;
                Ok(())
            })
        }
    }

    /// Frame extraction for `source`. Without a `duration`, the cached
    /// metadata on disk is read when the generation starts.
    fn thumbnail_generator(
        &self,
        source: &MediaSource,
        duration: Option<f64>,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<()>> + Send + 'static {
        let media = &self.config.media;
        let configured_seek = media.thumbnail_seek_secs;
        let opts = FrameOptions {
            width: media.thumbnail_width,
            quality: media.thumbnail_quality,
            fallback_seek_secs: Some(media.thumbnail_fallback_seek_secs),
            timeout: self.config.timeouts.thumbnail(),
        };
        let runner = self.runner.clone();
        let input = source.absolute.clone();
        let output = self.layout().thumbnail(&source.key);
        let metadata = self.layout().metadata(&source.key);
        move || {
            Box::pin(async move {
                let duration = duration.unwrap_or_else(|| cached_duration(&metadata));
                let seek = poster_seek(configured_seek, duration);
                if generate_thumbnail(runner.as_ref(), &input, seek, &output, &opts).await {
                    Ok(())
                } else {
                    Err(Error::generation(
                        ArtifactKind::Thumbnail,
                        "no frame could be extracted",
                    ))
                }
            })
        }
    }

    /// With `cache.revalidate_on_mtime`, drop cached metadata that is older
    /// than its source file.
    fn revalidate(&self, source: &MediaSource) {
        if !self.config.cache.revalidate_on_mtime
            || self.cache.is_in_flight(ArtifactKind::Metadata, &source.key)
        {
            return;
        }
        let marker = self.layout().metadata(&source.key);
        let (Some(cached), Some(modified)) = (mtime(&marker), mtime(&source.absolute)) else {
            return;
        };
        if modified > cached {
            tracing::info!(path = %source.relative, "Source changed; discarding cached metadata");
            if let Err(e) = std::fs::remove_file(&marker) {
                tracing::warn!(path = %marker.display(), "Could not remove stale metadata: {e}");
            }
        }
    }
}

/// Duration recorded in a cached metadata file, or 0 when there is none.
fn cached_duration(path: &Path) -> f64 {
    std::fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<MediaMetadata>(&bytes).ok())
        .map(|m| m.duration_seconds())
        .unwrap_or(0.0)
}

fn list_previews(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "jpg"))
        .collect();
    files.sort();
    Ok(files)
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flix_av::testing::{is_frame, is_hls, ScriptedRunner};
    use flix_core::MediaKey;
    use std::time::Duration;

    struct Fixture {
        _dirs: (tempfile::TempDir, tempfile::TempDir),
        runner: ScriptedRunner,
        pipeline: Arc<MediaPipeline>,
        pool: Arc<WorkerPool>,
        source: MediaSource,
    }

    fn fixture(runner: ScriptedRunner) -> Fixture {
        let library = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let absolute = library.path().join("movie.mkv");
        std::fs::write(&absolute, b"not really a movie").unwrap();

        let mut config = Config::default();
        config.cache.dir = cache.path().to_path_buf();
        let layout = ArtifactLayout::new(cache.path());
        layout.ensure_dirs().unwrap();

        let shared: SharedRunner = Arc::new(runner.clone());
        let pool = Arc::new(WorkerPool::new(3));
        let pipeline = Arc::new(MediaPipeline::new(
            Arc::new(config),
            shared,
            layout,
            pool.clone(),
        ));
        let source = MediaSource {
            relative: "movie.mkv".into(),
            absolute,
            key: MediaKey::derive("movie.mkv"),
        };
        Fixture {
            _dirs: (library, cache),
            runner,
            pipeline,
            pool,
            source,
        }
    }

    #[tokio::test]
    async fn metadata_is_probed_once() {
        let f = fixture(ScriptedRunner::new());
        let first = f.pipeline.metadata(&f.source).await.unwrap();
        let second = f.pipeline.metadata(&f.source).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.audio_streams.len(), 2);
        assert_eq!(f.runner.count(|inv| inv.tool == flix_av::Tool::Ffprobe), 1);
        assert!(f.pipeline.layout().metadata(&f.source.key).is_file());
    }

    #[tokio::test]
    async fn probe_failure_leaves_no_metadata() {
        let f = fixture(ScriptedRunner::new().fail_when(|inv| inv.tool == flix_av::Tool::Ffprobe));
        assert!(f.pipeline.metadata(&f.source).await.is_err());
        assert!(!f.pipeline.layout().metadata(&f.source.key).exists());
    }

    #[tokio::test]
    async fn thumbnail_survives_probe_failure() {
        let f = fixture(ScriptedRunner::new().fail_when(|inv| inv.tool == flix_av::Tool::Ffprobe));
        let path = f.pipeline.thumbnail(&f.source).await.unwrap();
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn cached_thumbnail_skips_metadata_lookup() {
        let f = fixture(ScriptedRunner::new().fail_when(|inv| inv.tool == flix_av::Tool::Ffprobe));
        let cached = f.pipeline.layout().thumbnail(&f.source.key);
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, b"jpeg").unwrap();

        for _ in 0..3 {
            assert_eq!(f.pipeline.thumbnail(&f.source).await.unwrap(), cached);
        }
        assert!(f.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn thumbnail_failure_is_generation_error() {
        let f = fixture(ScriptedRunner::new().fail_when(is_frame));
        let err = f.pipeline.thumbnail(&f.source).await.unwrap_err();
        assert!(matches!(err, Error::Generation { .. }));
        assert!(!f.pipeline.layout().thumbnail(&f.source.key).exists());
    }

    #[tokio::test]
    async fn previews_are_listed_in_order() {
        let f = fixture(ScriptedRunner::new());
        let files = f.pipeline.previews(&f.source).await.unwrap();
        assert_eq!(files.len(), 10);
        assert!(files[0].ends_with("preview_000.jpg"));
        assert!(files[9].ends_with("preview_009.jpg"));
    }

    #[tokio::test]
    async fn previews_of_unknown_duration_are_empty() {
        let f = fixture(ScriptedRunner::new().with_probe_json(
            r#"{"streams":[{"index":0,"codec_type":"video","codec_name":"h264"}],"format":{}}"#,
        ));
        let files = f.pipeline.previews(&f.source).await.unwrap();

        assert!(files.is_empty());
        assert_eq!(f.runner.count(is_frame), 0);
        assert!(!f.pipeline.layout().previews_dir(&f.source.key).exists());
    }

    #[tokio::test]
    async fn previews_of_unreadable_file_are_empty() {
        let f = fixture(ScriptedRunner::new().fail_when(|inv| inv.tool == flix_av::Tool::Ffprobe));
        assert!(f.pipeline.previews(&f.source).await.unwrap().is_empty());
        assert_eq!(f.runner.count(is_frame), 0);
    }

    #[tokio::test]
    async fn prefetch_runs_on_worker_pool() {
        let f = fixture(ScriptedRunner::new().with_delay(Duration::from_millis(20)));
        f.pipeline.prefetch(f.source.clone());

        let cache = f.pipeline.cache();
        assert!(cache.is_in_flight(ArtifactKind::Metadata, &f.source.key));
        assert!(cache.is_in_flight(ArtifactKind::Thumbnail, &f.source.key));

        // Shutdown drains both tasks.
        f.pool.shutdown(Duration::from_secs(5)).await;
        assert!(f.pipeline.layout().metadata(&f.source.key).is_file());
        assert!(f.pipeline.layout().thumbnail(&f.source.key).is_file());
        assert_eq!(f.runner.count(is_frame), 1);
    }

    #[tokio::test]
    async fn prefetch_after_shutdown_schedules_nothing() {
        let f = fixture(ScriptedRunner::new());
        f.pool.shutdown(Duration::from_secs(1)).await;
        f.pipeline.prefetch(f.source.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.runner.calls().is_empty());
        assert_eq!(f.pipeline.cache().in_flight(), 0);
        assert!(!f.pipeline.layout().thumbnail(&f.source.key).exists());
    }

    #[tokio::test]
    async fn rendition_selects_encoder_and_coalesces() {
        let f = fixture(ScriptedRunner::new().with_delay(Duration::from_millis(30)));
        let (a, b) = tokio::join!(
            f.pipeline.rendition(&f.source),
            f.pipeline.rendition(&f.source)
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(f.runner.count(is_hls), 1);
        assert_eq!(f.pipeline.selected_encoder(), Some(VideoEncoder::Software));

        let dir = f.pipeline.layout().rendition_dir(&f.source.key);
        assert!(dir.join(flix_core::artifact::VARIANTS_NAME).is_file());
    }

    #[tokio::test]
    async fn stale_metadata_is_revalidated_when_enabled() {
        let mut f = fixture(ScriptedRunner::new());
        let mut config = (*f.pipeline.config).clone();
        config.cache.revalidate_on_mtime = true;
        f.pipeline = Arc::new(MediaPipeline::new(
            Arc::new(config),
            Arc::new(f.runner.clone()),
            f.pipeline.layout().clone(),
            Arc::new(WorkerPool::new(1)),
        ));

        f.pipeline.metadata(&f.source).await.unwrap();
        let marker = f.pipeline.layout().metadata(&f.source.key);
        let old = std::fs::File::options().write(true).open(&marker).unwrap();
        old.set_modified(SystemTime::now() - Duration::from_secs(3600)).unwrap();
        drop(old);

        f.pipeline.metadata(&f.source).await.unwrap();
        assert_eq!(f.runner.count(|inv| inv.tool == flix_av::Tool::Ffprobe), 2);
    }
}
