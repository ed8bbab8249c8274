//! The tile pyramid facade.
//!
//! [`TilePyramid`] owns one imagery layer's level set together with the
//! caches, scheduler, fetch pipeline and worker pool that stream it. A
//! renderer calls [`TilePyramid::assemble_frame`] once per frame; the call
//! never blocks on I/O.
//!
//! # Example
//!
//! ```no_run
//! use globelayer::config::PyramidConfig;
//! use globelayer::geo::{LatLon, SphericalGlobe};
//! use globelayer::level::LevelSetConfig;
//! use globelayer::pyramid::TilePyramidBuilder;
//! use globelayer::traversal::ViewSnapshot;
//!
//! let level_set = LevelSetConfig::new(
//!     "earth",
//!     globelayer::geo::Sector::FULL_SPHERE,
//!     LatLon::new(36.0, 36.0),
//!     10,
//! )
//! .build()
//! .unwrap();
//!
//! let pyramid = TilePyramidBuilder::new(level_set)
//!     .config(PyramidConfig::default())
//!     .build()
//!     .unwrap();
//!
//! let globe = SphericalGlobe::default();
//! let view = ViewSnapshot::nadir(&globe, LatLon::new(47.0, 8.0), 20_000.0, 60.0);
//! let frame = pyramid.assemble_frame(&globe, &view);
//! println!("{}", frame.stats);
//! ```

use std::sync::Arc;

use thiserror::Error;

use crate::absent::AbsentResourceTracker;
use crate::cache::ResourceCache;
use crate::config::PyramidConfig;
use crate::fetch::{FetchError, ReqwestFetcher, ResourceFetcher, DEFAULT_USER_AGENT};
use crate::geo::Globe;
use crate::level::LevelSet;
use crate::pipeline::{FetchOutcome, FetchPipeline};
use crate::scheduler::{Scheduler, WorkerPool, WorkerPoolError};
use crate::store::{LocalStore, MemoryStore};
use crate::telemetry::FetchMetrics;
use crate::traversal::{traverse, Frame, LodPolicy, TraversalContext, ViewState};

/// Errors assembling a pyramid.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Workers(#[from] WorkerPoolError),

    #[error("Failed to create fetcher: {0}")]
    Fetcher(#[from] FetchError),
}

/// One streamed imagery layer.
pub struct TilePyramid {
    level_set: Arc<LevelSet>,
    cache: Arc<ResourceCache>,
    absent: Arc<AbsentResourceTracker>,
    scheduler: Arc<Scheduler>,
    pipeline: Arc<FetchPipeline>,
    pool: WorkerPool,
    metrics: Arc<FetchMetrics>,
    lod: LodPolicy,
    config: PyramidConfig,
}

impl TilePyramid {
    /// Produces this frame's draw list and starts fetches for missing tiles.
    pub fn assemble_frame(&self, globe: &dyn Globe, view: &dyn ViewState) -> Frame {
        let ctx = TraversalContext {
            level_set: &self.level_set,
            cache: &self.cache,
            scheduler: &self.scheduler,
            lod: &self.lod,
            metrics: Some(&self.metrics),
            force_level_zero_loads: self.config.force_level_zero_loads,
        };
        let mut frame = traverse(&ctx, globe, view);
        frame.stats.dispatched = self.dispatch();

        tracing::trace!(layer = %self.name(), stats = %frame.stats, "Frame assembled");
        frame
    }

    /// Hands the best queued tasks to free workers and drops the rest.
    fn dispatch(&self) -> usize {
        let budget = self
            .config
            .max_dispatch_per_frame
            .min(self.pool.available());
        let mut dispatched = 0;

        for task in self.scheduler.drain(budget) {
            let pipeline = Arc::clone(&self.pipeline);
            let done = self.scheduler.completion_guard(task.key().clone());
            let job = move || {
                let _done = done;
                if let FetchOutcome::Failed(e) = pipeline.execute_caught(&task.tile) {
                    tracing::debug!(tile = %task.key(), error = %e, "Fetch task failed");
                }
            };

            match self.pool.try_spawn(job) {
                Ok(()) => {
                    dispatched += 1;
                    self.metrics.task_dispatched();
                }
                // Dropping the refused job's guard releases the key
                Err(refused) => drop(refused),
            }
        }
        dispatched
    }

    /// Cache name of the layer.
    pub fn name(&self) -> &str {
        self.level_set.first_level().cache_name.as_ref()
    }

    pub fn level_set(&self) -> &Arc<LevelSet> {
        &self.level_set
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    pub fn absent(&self) -> &Arc<AbsentResourceTracker> {
        &self.absent
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn metrics(&self) -> &Arc<FetchMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &PyramidConfig {
        &self.config
    }

    /// Fetch tasks dispatched and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }

    /// Stops dispatching. Running fetches complete; later frames still draw
    /// whatever is resident.
    pub fn shutdown(&self) {
        self.scheduler.clear();
        self.pool.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.pool.is_shutdown()
    }
}

impl std::fmt::Debug for TilePyramid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TilePyramid")
            .field("level_set", &self.level_set)
            .field("cache", &self.cache)
            .field("pool", &self.pool)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Wires a [`TilePyramid`] from a level set and its collaborators.
///
/// Without an explicit store an in-memory one is used. Without an explicit
/// fetcher a reqwest client is created with the configured timeout.
pub struct TilePyramidBuilder {
    level_set: LevelSet,
    config: PyramidConfig,
    store: Option<Arc<dyn LocalStore>>,
    fetcher: Option<Arc<dyn ResourceFetcher>>,
    user_agent: String,
}

impl TilePyramidBuilder {
    pub fn new(level_set: LevelSet) -> Self {
        Self {
            level_set,
            config: PyramidConfig::default(),
            store: None,
            fetcher: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn config(mut self, config: PyramidConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// User agent of the default reqwest fetcher.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> Result<TilePyramid, BuildError> {
        let config = self.config;
        let level_set = Arc::new(self.level_set);

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(ReqwestFetcher::new(config.fetch_timeout, &self.user_agent)?),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn LocalStore>);

        let cache = Arc::new(ResourceCache::new(
            config.memory_cache_bytes,
            config.retain_level_zero,
        ));
        let absent = Arc::new(AbsentResourceTracker::new(config.absent.clone()));
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&absent)));
        let metrics = Arc::new(FetchMetrics::new());
        let pipeline = Arc::new(
            FetchPipeline::new(
                Arc::clone(&level_set),
                Arc::clone(&cache),
                Arc::clone(&absent),
                store,
                fetcher,
                Arc::clone(&metrics),
            )
            .with_network_enabled(config.network_enabled),
        );
        let pool = WorkerPool::new(config.workers)?;

        tracing::info!(
            layer = %level_set.first_level().cache_name,
            levels = level_set.num_levels(),
            top_level_tiles = level_set.top_level_tiles().len(),
            memory_cache_bytes = config.memory_cache_bytes,
            workers = pool.workers(),
            network = config.network_enabled,
            "Tile pyramid ready"
        );

        Ok(TilePyramid {
            level_set,
            cache,
            absent,
            scheduler,
            pipeline,
            pool,
            metrics,
            lod: config.lod,
            config,
        })
    }
}
