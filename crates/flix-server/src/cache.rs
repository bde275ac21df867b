//! Artifact cache with per-artifact request coalescing.
//!
//! The cache directory is the only record of what exists: an artifact is
//! present when its marker path exists. On a miss, the generator runs as a
//! [`WorkerPool`] task. Concurrent callers for the same `(kind, key)`
//! subscribe to the running generation instead of starting another one.
//!
//! The pool task owns the in-flight entry through an [`InFlight`] guard, so a
//! caller that goes away (a dropped HTTP request) neither cancels the
//! generation nor leaves a stale entry behind. A failed generation leaves no
//! marker; the next request retries.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flix_core::{ArtifactKind, ArtifactLayout, MediaKey, Result};
use tokio::sync::watch;

use crate::pool::WorkerPool;

type SharedOutcome = std::result::Result<PathBuf, Arc<flix_core::Error>>;
type Slot = Arc<watch::Sender<Option<SharedOutcome>>>;
type InFlightMap = DashMap<(ArtifactKind, MediaKey), Slot>;

pub struct ArtifactCache {
    layout: ArtifactLayout,
    pool: Arc<WorkerPool>,
    in_flight: Arc<InFlightMap>,
}

enum Lookup {
    Ready(PathBuf),
    Pending(watch::Receiver<Option<SharedOutcome>>),
}

impl ArtifactCache {
    pub fn new(layout: ArtifactLayout, pool: Arc<WorkerPool>) -> Self {
        Self {
            layout,
            pool,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Number of generations currently running or queued.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, kind: ArtifactKind, key: &MediaKey) -> bool {
        self.in_flight.contains_key(&(kind, key.clone()))
    }

    /// Return the marker path of `(kind, key)`, generating it first if
    /// absent. `generate` is called at most once per concurrent group of
    /// callers and not at all on a hit.
    pub async fn ensure<G, Fut>(&self, kind: ArtifactKind, key: &MediaKey, generate: G) -> Result<PathBuf>
    where
        G: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        match self.lookup_or_start(kind, key, generate)? {
            Lookup::Ready(path) => Ok(path),
            Lookup::Pending(mut rx) => {
                let outcome = match rx.wait_for(Option::is_some).await {
                    Ok(outcome) => outcome.clone(),
                    // Sender dropped without an outcome: the task was
                    // cancelled or panicked.
                    Err(_) => None,
                };
                match outcome {
                    Some(Ok(path)) => Ok(path),
                    Some(Err(e)) => Err(e.replicate()),
                    None => Err(flix_core::Error::generation(kind, "generation was abandoned")),
                }
            }
        }
    }

    /// Start generating `(kind, key)` if it is absent and not already
    /// running, without waiting. Failures are logged.
    pub fn ensure_detached<G, Fut>(&self, kind: ArtifactKind, key: &MediaKey, generate: G)
    where
        G: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if let Err(e) = self.lookup_or_start(kind, key, generate) {
            tracing::warn!(kind = %kind, key = %key, "Could not schedule generation: {e}");
        }
    }

    fn lookup_or_start<G, Fut>(&self, kind: ArtifactKind, key: &MediaKey, generate: G) -> Result<Lookup>
    where
        G: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let marker = self.layout.marker(kind, key);
        if marker.exists() {
            return Ok(Lookup::Ready(marker));
        }

        let (slot, rx) = match self.in_flight.entry((kind, key.clone())) {
            Entry::Occupied(e) => {
                tracing::debug!(kind = %kind, key = %key, "Joining in-flight generation");
                return Ok(Lookup::Pending(e.get().subscribe()));
            }
            Entry::Vacant(e) => {
                // A generation may have finished between the marker check
                // and taking the entry.
                if marker.exists() {
                    return Ok(Lookup::Ready(marker));
                }
                let (tx, rx) = watch::channel(None);
                let slot: Slot = Arc::new(tx);
                e.insert(slot.clone());
                (slot, rx)
            }
        };

        // The shard lock is released here; the guard removes the entry again
        // if the task never runs.
        let guard = InFlight {
            map: self.in_flight.clone(),
            id: (kind, key.clone()),
            slot,
            finished: false,
        };
        let key_for_log = key.clone();
        self.pool.spawn("generation", async move {
            tracing::info!(kind = %kind, key = %key_for_log, "Generating artifact");
            let result = match generate().await {
                Ok(()) if marker.exists() => Ok(marker),
                Ok(()) => Err(flix_core::Error::generation(
                    kind,
                    "generator finished without producing the artifact",
                )),
                Err(e) => Err(e),
            };
            match &result {
                Ok(_) => tracing::info!(kind = %kind, key = %key_for_log, "Artifact ready"),
                Err(err) => tracing::warn!(
                    kind = %kind,
                    key = %key_for_log,
                    "Artifact generation failed: {err}"
                ),
            }
            guard.finish(result);
        })?;

        Ok(Lookup::Pending(rx))
    }
}

/// Registration of one running generation. Dropping it (normally via
/// [`InFlight::finish`]) removes the entry; receivers see the published
/// outcome, or a closed channel if none was published.
struct InFlight {
    map: Arc<InFlightMap>,
    id: (ArtifactKind, MediaKey),
    slot: Slot,
    finished: bool,
}

impl InFlight {
    fn finish(mut self, result: Result<PathBuf>) {
        self.remove_entry();
        self.slot.send_replace(Some(result.map_err(Arc::new)));
        self.finished = true;
    }

    fn remove_entry(&self) {
        self.map
            .remove_if(&self.id, |_, slot| Arc::ptr_eq(slot, &self.slot));
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished {
            self.remove_entry();
        }
    }
}
