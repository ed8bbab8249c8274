//! Fetch-and-decode pipeline.
//!
//! Executes one fetch task: makes a tile's texture resident in the
//! [`ResourceCache`], from the local store when possible and from the network
//! otherwise.
//!
//! # Flow
//!
//! ```text
//! resident? ──yes──► AlreadyResident
//!    │no
//! local store hit, not expired ──► decode ──ok──► install ──► LoadedFromStore
//!    │miss / expired                  │corrupt: delete entry
//!    ▼                                ▼
//! network enabled? ──no──► Failed(NetworkDisabled)
//!    │yes
//! fetch ──► classify ──► decode / remap / passthrough
//!    ──► write-through ──► install ──► Downloaded
//! ```
//!
//! Every failure marks the tile absent and every success clears its absent
//! record. Failures never propagate to the traversal.

mod content;
mod payload;
mod remap;

pub use content::{classify, classify_stored, raw_store_path, ContentKind, OCTET_STREAM, RAW_SUFFIX};
pub use payload::Payload;
pub use remap::{remap_mercator, source_row};

#[cfg(test)]
pub(crate) use payload::tests::png_bytes;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;

use crate::absent::AbsentResourceTracker;
use crate::cache::{ResourceCache, Texture};
use crate::fetch::{FetchError, ResourceFetcher};
use crate::level::LevelSet;
use crate::store::{is_expired, LocalStore};
use crate::telemetry::FetchMetrics;
use crate::tile::Tile;

/// Result of executing one fetch task.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The texture was already in the resource cache.
    AlreadyResident,
    /// Decoded from the local store.
    LoadedFromStore,
    /// Fetched from the network, written through and installed.
    Downloaded { bytes: u64 },
    /// Nothing installed; the tile has been marked absent.
    Failed(FetchError),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, FetchOutcome::Failed(_))
    }
}

/// Shared pipeline state, one per pyramid.
pub struct FetchPipeline {
    level_set: Arc<LevelSet>,
    cache: Arc<ResourceCache>,
    absent: Arc<AbsentResourceTracker>,
    store: Arc<dyn LocalStore>,
    fetcher: Arc<dyn ResourceFetcher>,
    metrics: Arc<FetchMetrics>,
    network_enabled: bool,
}

impl FetchPipeline {
    pub fn new(
        level_set: Arc<LevelSet>,
        cache: Arc<ResourceCache>,
        absent: Arc<AbsentResourceTracker>,
        store: Arc<dyn LocalStore>,
        fetcher: Arc<dyn ResourceFetcher>,
        metrics: Arc<FetchMetrics>,
    ) -> Self {
        Self {
            level_set,
            cache,
            absent,
            store,
            fetcher,
            metrics,
            network_enabled: true,
        }
    }

    /// Turns network retrieval on or off. When off, only the local store is
    /// consulted.
    pub fn with_network_enabled(mut self, enabled: bool) -> Self {
        self.network_enabled = enabled;
        self
    }

    pub fn network_enabled(&self) -> bool {
        self.network_enabled
    }

    /// Runs the task for `tile` to completion.
    pub fn execute(&self, tile: &Tile) -> FetchOutcome {
        let key = tile.key();
        if self.cache.contains(key) {
            tracing::trace!(tile = %key, "Already resident");
            return FetchOutcome::AlreadyResident;
        }

        let path = tile.resource_path();
        if let Some(texture) = self.load_from_store(tile, &path) {
            self.install(tile, texture);
            self.metrics.store_hit();
            tracing::debug!(tile = %key, path = %path, "Loaded from local store");
            return FetchOutcome::LoadedFromStore;
        }

        if !self.network_enabled {
            return self.fail(tile, FetchError::NetworkDisabled);
        }

        match self.download(tile, &path) {
            Ok(bytes) => {
                self.metrics.downloaded(bytes);
                FetchOutcome::Downloaded { bytes }
            }
            Err(e) => self.fail(tile, e),
        }
    }

    /// Runs [`execute`](Self::execute), turning a panic into a failure so the
    /// tile backs off like any other failed fetch.
    pub fn execute_caught(&self, tile: &Tile) -> FetchOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| self.execute(tile))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(tile = %tile.key(), panic = %message, "Fetch task panicked");
                self.fail(tile, FetchError::Panicked(message))
            }
        }
    }

    /// Decodes the stored resource, deleting it when it is corrupt.
    ///
    /// Images live at the tile's resource path. Passthrough content for an
    /// image-suffixed level lives at its raw path and is never sniffed.
    fn load_from_store(&self, tile: &Tile, path: &str) -> Option<Texture> {
        let suffix = &tile.level().format_suffix;
        if let Some(bytes) = self.read_fresh(tile, path) {
            let kind = classify_stored(&bytes, suffix);
            return self.decode_stored(tile, path, kind, bytes);
        }

        let raw_path = raw_store_path(path, suffix)?;
        let bytes = self.read_fresh(tile, &raw_path)?;
        let kind = Some(ContentKind::Binary(OCTET_STREAM.to_string()));
        self.decode_stored(tile, &raw_path, kind, bytes)
    }

    /// Stored bytes at `path`, unless missing or expired.
    fn read_fresh(&self, tile: &Tile, path: &str) -> Option<Bytes> {
        let bytes = match self.store.read(path) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(tile = %tile.key(), error = %e, "Local store read failed");
                return None;
            }
        };

        if is_expired(self.store.as_ref(), path, tile.level().expiry) {
            tracing::debug!(tile = %tile.key(), path = %path, "Stored resource expired");
            return None;
        }
        Some(bytes)
    }

    fn decode_stored(
        &self,
        tile: &Tile,
        path: &str,
        kind: Option<ContentKind>,
        bytes: Bytes,
    ) -> Option<Texture> {
        let decoded = kind
            .ok_or_else(|| FetchError::Decode("unrecognised stored data".to_string()))
            .and_then(|kind| Payload::from_content(kind, bytes, tile.tile_sector(), true));

        match decoded {
            Ok(payload) => Some(payload.into_texture()),
            Err(e) => {
                tracing::warn!(
                    tile = %tile.key(),
                    path = %path,
                    error = %e,
                    "Removing corrupt local store entry"
                );
                match self.store.delete(path) {
                    Ok(_) => self.metrics.corrupt_removed(),
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "Failed to remove corrupt entry")
                    }
                }
                None
            }
        }
    }

    fn download(&self, tile: &Tile, path: &str) -> Result<u64, FetchError> {
        let url = self.level_set.resource_url(tile)?;
        tracing::debug!(tile = %tile.key(), url = %url, "Fetching");

        let resource = self.fetcher.fetch(&url)?;
        let size = resource.bytes.len() as u64;
        let kind = classify(resource.content_type.as_deref(), &resource.bytes);

        let payload = Payload::from_content(kind, resource.bytes, tile.tile_sector(), false)
            .inspect_err(|e| {
                if let FetchError::ErrorContent { content_type, body } = e {
                    tracing::warn!(
                        tile = %tile.key(),
                        url = %url,
                        content_type = %content_type,
                        body = %body,
                        "Server returned an error document"
                    );
                }
            })?;

        let store_path = match &payload {
            Payload::RawBytes { .. } => raw_store_path(path, &tile.level().format_suffix)
                .unwrap_or_else(|| path.to_string()),
            _ => path.to_string(),
        };

        // A failed write-through still leaves a usable texture
        if let Err(e) = payload
            .persist_bytes()
            .and_then(|data| self.store.write(&store_path, &data).map_err(FetchError::from))
        {
            tracing::warn!(
                tile = %tile.key(),
                path = %store_path,
                error = %e,
                "Write-through failed"
            );
        }

        self.install(tile, payload.into_texture());
        Ok(size)
    }

    fn install(&self, tile: &Tile, texture: Texture) {
        self.cache.put(tile.key().clone(), Arc::new(texture));
        self.absent.unmark(tile.key());
    }

    fn fail(&self, tile: &Tile, error: FetchError) -> FetchOutcome {
        let attempts = self.absent.mark_absent(tile.key());
        self.metrics.failed();
        tracing::debug!(tile = %tile.key(), attempts, error = %error, "Fetch failed");
        FetchOutcome::Failed(error)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for FetchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPipeline")
            .field("network_enabled", &self.network_enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::payload::tests::png_bytes;
    use super::*;
    use crate::fetch::tests::{MockFetcher, MockResponse};
    use crate::fetch::FetchedResource;
    use crate::geo::{LatLon, Sector};
    use crate::level::{LevelSetConfig, Projection, TemplateUrlBuilder};
    use crate::store::MemoryStore;
    use crate::tile::TileKey;

    struct Harness {
        level_set: Arc<LevelSet>,
        cache: Arc<ResourceCache>,
        absent: Arc<AbsentResourceTracker>,
        store: Arc<MemoryStore>,
        fetcher: Arc<MockFetcher>,
        metrics: Arc<FetchMetrics>,
    }

    impl Harness {
        fn new(fetcher: MockFetcher) -> Self {
            Self::with_level_set(
                LevelSetConfig::new("test", Sector::FULL_SPHERE, LatLon::new(36.0, 36.0), 3)
                    .build()
                    .unwrap(),
                fetcher,
            )
        }

        fn with_level_set(level_set: LevelSet, fetcher: MockFetcher) -> Self {
            let level_set = level_set.with_url_builder(Arc::new(
                TemplateUrlBuilder::new("http://tiles/{level}/{row}/{col}").unwrap(),
            ));
            Self {
                level_set: Arc::new(level_set),
                cache: Arc::new(ResourceCache::new(1 << 20, true)),
                absent: Arc::new(AbsentResourceTracker::default()),
                store: Arc::new(MemoryStore::new()),
                fetcher: Arc::new(fetcher),
                metrics: Arc::new(FetchMetrics::new()),
            }
        }

        fn pipeline(&self) -> FetchPipeline {
            FetchPipeline::new(
                Arc::clone(&self.level_set),
                Arc::clone(&self.cache),
                Arc::clone(&self.absent),
                self.store.clone(),
                self.fetcher.clone(),
                Arc::clone(&self.metrics),
            )
        }

        fn tile(&self, level: usize, row: i32, col: i32) -> Tile {
            self.level_set
                .tile_for(&TileKey::new(level, row, col, "test"))
                .unwrap()
        }
    }

    fn png_response() -> MockResponse {
        MockResponse::Ok(FetchedResource::new(
            png_bytes(4, 4, [9, 9, 9, 255]),
            Some("image/png"),
        ))
    }

    #[test]
    fn test_download_installs_and_writes_through() {
        let h = Harness::new(MockFetcher::always(png_response()));
        let tile = h.tile(1, 2, 3);

        let outcome = h.pipeline().execute(&tile);
        assert!(matches!(outcome, FetchOutcome::Downloaded { .. }));
        assert!(h.cache.contains(tile.key()));
        assert!(h.store.read(&tile.resource_path()).unwrap().is_some());
        assert_eq!(h.absent.attempts(tile.key()), None);
        assert_eq!(h.metrics.snapshot().downloads, 1);
    }

    #[test]
    fn test_resident_tile_is_skipped() {
        let h = Harness::new(MockFetcher::always(png_response()));
        let tile = h.tile(1, 0, 0);
        h.cache
            .put(tile.key().clone(), Arc::new(Texture::from_rgba(image::RgbaImage::new(1, 1))));

        assert!(matches!(h.pipeline().execute(&tile), FetchOutcome::AlreadyResident));
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[test]
    fn test_store_hit_avoids_network() {
        let h = Harness::new(MockFetcher::always(png_response()));
        let tile = h.tile(2, 5, 5);
        h.store
            .write(&tile.resource_path(), &png_bytes(2, 2, [1, 1, 1, 255]))
            .unwrap();

        assert!(matches!(h.pipeline().execute(&tile), FetchOutcome::LoadedFromStore));
        assert_eq!(h.fetcher.calls(), 0);
        assert!(h.cache.contains(tile.key()));
        assert_eq!(h.metrics.snapshot().store_hits, 1);
    }

    #[test]
    fn test_corrupt_store_entry_is_deleted_then_refetched() {
        let h = Harness::new(MockFetcher::always(png_response()));
        let tile = h.tile(2, 1, 1);
        h.store.write(&tile.resource_path(), b"not an image").unwrap();

        let outcome = h.pipeline().execute(&tile);
        assert!(matches!(outcome, FetchOutcome::Downloaded { .. }));
        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(h.metrics.snapshot().corrupt_removed, 1);

        // The refetched image replaced the corrupt bytes
        let stored = h.store.read(&tile.resource_path()).unwrap().unwrap();
        assert!(image::guess_format(&stored).is_ok());
    }

    #[test]
    fn test_html_response_marks_absent_without_caching() {
        let h = Harness::new(MockFetcher::always(MockResponse::Ok(FetchedResource::new(
            &b"<html>Service unavailable</html>"[..],
            Some("text/html; charset=utf-8"),
        ))));
        let tile = h.tile(1, 1, 1);

        let outcome = h.pipeline().execute(&tile);
        assert!(matches!(
            outcome,
            FetchOutcome::Failed(FetchError::ErrorContent { .. })
        ));
        assert_eq!(h.absent.attempts(tile.key()), Some(1));
        assert!(!h.cache.contains(tile.key()));
        assert!(h.store.is_empty());
    }

    #[test]
    fn test_http_error_marks_absent() {
        let h = Harness::new(MockFetcher::new());
        let tile = h.tile(0, 0, 0);
        assert!(!h.pipeline().execute(&tile).is_success());
        assert_eq!(h.absent.attempts(tile.key()), Some(1));
        assert_eq!(h.metrics.snapshot().failures, 1);
    }

    #[test]
    fn test_success_clears_absent_record() {
        let h = Harness::new(MockFetcher::always(png_response()));
        let tile = h.tile(1, 0, 0);
        h.absent.mark_absent(tile.key());

        assert!(h.pipeline().execute(&tile).is_success());
        assert_eq!(h.absent.attempts(tile.key()), None);
    }

    struct PanickingFetcher;

    impl ResourceFetcher for PanickingFetcher {
        fn fetch(&self, _url: &str) -> Result<FetchedResource, FetchError> {
            panic!("malformed tile header")
        }
    }

    #[test]
    fn test_panic_becomes_failure() {
        let h = Harness::new(MockFetcher::new());
        let tile = h.tile(1, 0, 0);
        let pipeline = FetchPipeline::new(
            Arc::clone(&h.level_set),
            Arc::clone(&h.cache),
            Arc::clone(&h.absent),
            h.store.clone(),
            Arc::new(PanickingFetcher),
            Arc::clone(&h.metrics),
        );

        match pipeline.execute_caught(&tile) {
            FetchOutcome::Failed(FetchError::Panicked(message)) => {
                assert_eq!(message, "malformed tile header")
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(h.absent.attempts(tile.key()), Some(1));
        assert_eq!(h.metrics.snapshot().failures, 1);
        assert!(!h.cache.contains(tile.key()));
    }

    #[test]
    fn test_network_disabled_marks_absent() {
        let h = Harness::new(MockFetcher::always(png_response()));
        let tile = h.tile(1, 0, 0);
        let pipeline = h.pipeline().with_network_enabled(false);

        assert!(matches!(
            pipeline.execute(&tile),
            FetchOutcome::Failed(FetchError::NetworkDisabled)
        ));
        assert_eq!(h.fetcher.calls(), 0);
        assert_eq!(h.absent.attempts(tile.key()), Some(1));
    }

    #[test]
    fn test_raw_content_is_passed_through() {
        let h = Harness::new(MockFetcher::always(MockResponse::Ok(FetchedResource::new(
            &b"\x00\x10\x20"[..],
            Some("application/octet-stream"),
        ))));
        let tile = h.tile(1, 0, 0);

        assert!(h.pipeline().execute(&tile).is_success());
        let texture = h.cache.get(tile.key()).unwrap();
        assert!(texture.pixels().is_none());
        assert_eq!(texture.size_bytes(), 3);
    }

    #[test]
    fn test_passthrough_content_reloads_from_store() {
        let h = Harness::new(MockFetcher::always(MockResponse::Ok(FetchedResource::new(
            &b"\x00\x10\x20"[..],
            Some("application/octet-stream"),
        ))));
        let tile = h.tile(1, 0, 0);
        let pipeline = h.pipeline();

        assert!(matches!(pipeline.execute(&tile), FetchOutcome::Downloaded { .. }));
        let suffix = &tile.level().format_suffix;
        let raw_path = raw_store_path(&tile.resource_path(), suffix).unwrap();
        assert!(h.store.read(&raw_path).unwrap().is_some());
        assert!(h.store.read(&tile.resource_path()).unwrap().is_none());

        h.cache.remove(tile.key());
        assert!(matches!(pipeline.execute(&tile), FetchOutcome::LoadedFromStore));
        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(h.metrics.snapshot().corrupt_removed, 0);
        assert!(h.store.read(&raw_path).unwrap().is_some());

        let texture = h.cache.get(tile.key()).unwrap();
        assert!(texture.pixels().is_none());
        assert_eq!(texture.size_bytes(), 3);
    }

    #[test]
    fn test_untyped_png_decodes_the_same_from_network_and_store() {
        let h = Harness::new(MockFetcher::always(MockResponse::Ok(FetchedResource::new(
            png_bytes(4, 4, [9, 9, 9, 255]),
            Some("application/octet-stream"),
        ))));
        let tile = h.tile(1, 0, 0);
        let pipeline = h.pipeline();

        assert!(pipeline.execute(&tile).is_success());
        assert!(h.cache.get(tile.key()).unwrap().pixels().is_some());

        h.cache.remove(tile.key());
        assert!(matches!(pipeline.execute(&tile), FetchOutcome::LoadedFromStore));
        assert!(h.cache.get(tile.key()).unwrap().pixels().is_some());
    }

    #[test]
    fn test_mercator_tile_is_remapped_before_write_through() {
        let level_set = LevelSetConfig::new(
            "test",
            Sector::new(-90.0, 90.0, -180.0, 180.0).unwrap(),
            LatLon::new(90.0, 90.0),
            2,
        )
        .with_projection(Projection::Mercator)
        .build()
        .unwrap();
        let h = Harness::with_level_set(level_set, MockFetcher::always(png_response()));
        let tile = h.tile(1, 2, 2);
        assert!(tile.tile_sector().is_mercator());

        assert!(h.pipeline().execute(&tile).is_success());
        let stored = h.store.read(&tile.resource_path()).unwrap().unwrap();
        assert_eq!(image::guess_format(&stored).unwrap(), image::ImageFormat::Png);
    }
}
