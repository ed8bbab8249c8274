//! Per-frame pyramid traversal.
//!
//! Walks the pyramid from its top-level tiles, prunes subtrees outside the
//! view, and for every visible branch decides whether a tile is detailed
//! enough to draw or must be replaced by its four children.
//!
//! While descending, the nearest ancestor whose texture is resident is carried
//! down as the branch's resource tile. A tile whose own texture has not
//! arrived is drawn with that ancestor's texture, so a visible region never
//! goes blank while finer data is in flight. The resource tile is an argument
//! of the recursive call, so sibling branches never see each other's.
//!
//! Traversal never blocks: missing textures are only requested from the
//! [`Scheduler`], and the resource cache is re-read every frame.

mod draw;
mod lod;
mod view;

pub use draw::{DrawItem, TexCoordTransform};
pub use lod::{LodPolicy, DEFAULT_CELL_SIZE_DIVISOR, DEFAULT_SPLIT_SCALE};
pub use view::{ViewSnapshot, ViewState};

use std::fmt;
use std::sync::Arc;

use crate::cache::{ResourceCache, Texture};
use crate::geo::{Globe, Sector, Vec3};
use crate::level::LevelSet;
use crate::scheduler::{RequestOutcome, Scheduler};
use crate::telemetry::FetchMetrics;
use crate::tile::Tile;

/// Counters for one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub visited: usize,
    pub culled: usize,
    /// Draw items using the tile's own texture.
    pub emitted: usize,
    /// Draw items using an ancestor's texture.
    pub emitted_with_fallback: usize,
    /// Requests newly queued this frame.
    pub requests: usize,
    /// Tasks handed to workers after the traversal.
    pub dispatched: usize,
    pub max_depth: usize,
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "visited {}, culled {}, drawn {} (+{} fallback), requested {}, dispatched {}, depth {}",
            self.visited,
            self.culled,
            self.emitted,
            self.emitted_with_fallback,
            self.requests,
            self.dispatched,
            self.max_depth
        )
    }
}

/// Output of one frame.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Sorted by effective level, coarsest first.
    pub draw_list: Vec<DrawItem>,
    pub stats: FrameStats,
}

/// Everything the traversal reads or feeds, borrowed for one frame.
pub struct TraversalContext<'a> {
    pub level_set: &'a LevelSet,
    pub cache: &'a ResourceCache,
    pub scheduler: &'a Scheduler,
    pub lod: &'a LodPolicy,
    pub metrics: Option<&'a FetchMetrics>,
    /// Draw and request only level-zero tiles until all are resident.
    pub force_level_zero_loads: bool,
}

/// A tile whose texture was resident when the traversal passed it.
struct Resident {
    tile: Tile,
    texture: Arc<Texture>,
}

struct Walker<'a> {
    ctx: &'a TraversalContext<'a>,
    globe: &'a dyn Globe,
    view: &'a dyn ViewState,
    eye: Vec3,
    reference: Vec3,
    visible: Option<Sector>,
    coverage: Sector,
    frame: Frame,
}

/// Runs the traversal for one frame. Fetch requests are queued on the
/// context's scheduler but not dispatched.
pub fn traverse(ctx: &TraversalContext<'_>, globe: &dyn Globe, view: &dyn ViewState) -> Frame {
    let eye = view.eye_point();
    let mut walker = Walker {
        ctx,
        globe,
        view,
        eye,
        reference: view.reference_point().unwrap_or(eye),
        visible: view.visible_sector(),
        coverage: ctx.level_set.coverage(),
        frame: Frame::default(),
    };

    let top_level = ctx.level_set.top_level_tiles();
    let level_zero_pending = ctx.force_level_zero_loads
        && !ctx.level_set.is_level_empty(0)
        && !top_level.iter().all(|t| ctx.cache.contains(t.key()));
    if level_zero_pending {
        walker.load_level_zero(top_level);
    } else {
        for tile in top_level {
            walker.add_tile_or_descendants(tile, None, 0);
        }
    }

    let mut frame = walker.frame;
    frame.draw_list.sort_by_key(DrawItem::effective_level);
    frame
}

impl Walker<'_> {
    fn add_tile_or_descendants(&mut self, tile: &Tile, resource: Option<&Resident>, depth: usize) {
        self.frame.stats.visited += 1;
        self.frame.stats.max_depth = self.frame.stats.max_depth.max(depth);

        if !self.is_visible(tile) {
            self.frame.stats.culled += 1;
            return;
        }

        if self.meets_render_criteria(tile) {
            self.emit(tile, resource);
            return;
        }

        // This tile becomes the branch's fallback if its texture is resident
        let own = self.ctx.cache.get(tile.key()).map(|texture| Resident {
            tile: tile.clone(),
            texture,
        });
        if own.is_none() && !tile.level().empty {
            self.request(tile);
        }
        let resource = own.as_ref().or(resource);

        match self.ctx.level_set.sub_tiles(tile) {
            Ok(children) => {
                for child in &children {
                    self.add_tile_or_descendants(child, resource, depth + 1);
                }
            }
            Err(e) => {
                tracing::error!(tile = %tile.key(), error = %e, "Cannot subdivide tile");
                self.emit(tile, resource);
            }
        }
    }

    fn is_visible(&self, tile: &Tile) -> bool {
        let sector = tile.sector();
        self.view.intersects_frustum(&sector)
            && self.visible.map_or(true, |visible| visible.intersects(&sector))
            && self.coverage.intersects(&sector)
    }

    fn meets_render_criteria(&self, tile: &Tile) -> bool {
        let index = tile.level_index();
        if self.ctx.level_set.is_final_level(index) {
            return true;
        }
        // Empty levels have nothing to draw
        if tile.level().empty {
            return false;
        }
        !self
            .ctx
            .lod
            .need_to_split(self.globe, &self.eye, &tile.sector())
    }

    fn emit(&mut self, tile: &Tile, resource: Option<&Resident>) {
        if let Some(texture) = self.ctx.cache.get(tile.key()) {
            self.frame.draw_list.push(DrawItem::own(tile.clone(), texture));
            self.frame.stats.emitted += 1;
            return;
        }

        if !tile.level().empty {
            self.request(tile);
        }

        if let Some(ancestor) = resource {
            debug_assert!(ancestor.tile.level_index() < tile.level_index());
            self.frame.draw_list.push(DrawItem::with_fallback(
                tile.clone(),
                ancestor.tile.clone(),
                Arc::clone(&ancestor.texture),
            ));
            self.frame.stats.emitted_with_fallback += 1;
        }
    }

    fn load_level_zero(&mut self, top_level: &[Tile]) {
        for tile in top_level {
            self.frame.stats.visited += 1;
            match self.ctx.cache.get(tile.key()) {
                Some(texture) if self.is_visible(tile) => {
                    self.frame.draw_list.push(DrawItem::own(tile.clone(), texture));
                    self.frame.stats.emitted += 1;
                }
                Some(_) => self.frame.stats.culled += 1,
                None if !tile.level().empty => self.request(tile),
                None => {}
            }
        }
    }

    fn request(&mut self, tile: &Tile) {
        let centroid = tile.centroid();
        let priority = self
            .globe
            .compute_point(centroid.lat, centroid.lon, 0.0)
            .distance_to(&self.reference);

        if self.ctx.scheduler.request(tile, priority) == RequestOutcome::Queued {
            self.frame.stats.requests += 1;
            if let Some(metrics) = self.ctx.metrics {
                metrics.request_queued();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::absent::AbsentResourceTracker;
    use crate::geo::{LatLon, SphericalGlobe};
    use crate::level::tests::three_level_set;
    use crate::level::LevelSetConfig;
    use crate::tile::TileKey;
    use image::RgbaImage;

    struct Fixture {
        level_set: LevelSet,
        cache: ResourceCache,
        scheduler: Scheduler,
        lod: LodPolicy,
        globe: SphericalGlobe,
    }

    impl Fixture {
        fn new(level_set: LevelSet) -> Self {
            Self {
                level_set,
                cache: ResourceCache::new(1 << 24, true),
                scheduler: Scheduler::new(Arc::new(AbsentResourceTracker::default())),
                lod: LodPolicy::default(),
                globe: SphericalGlobe::default(),
            }
        }

        fn ctx(&self, force_level_zero_loads: bool) -> TraversalContext<'_> {
            TraversalContext {
                level_set: &self.level_set,
                cache: &self.cache,
                scheduler: &self.scheduler,
                lod: &self.lod,
                metrics: None,
                force_level_zero_loads,
            }
        }

        fn run(&self, view: &ViewSnapshot) -> Frame {
            traverse(&self.ctx(false), &self.globe, view)
        }

        fn make_resident(&self, key: TileKey) {
            self.cache
                .put(key, Arc::new(Texture::from_rgba(RgbaImage::new(2, 2))));
        }
    }

    /// Eye close to the surface above `(lat, lon)`, seeing a small footprint.
    fn close_view(globe: &SphericalGlobe, lat: f64, lon: f64) -> ViewSnapshot {
        ViewSnapshot::new(
            globe.compute_point(lat, lon, 1_000.0),
            Sector::new(lat - 0.5, lat + 0.5, lon - 0.5, lon + 0.5).unwrap(),
            Some(globe.compute_point(lat, lon, 0.0)),
        )
    }

    #[test]
    fn test_view_outside_coverage_draws_and_requests_nothing() {
        let level_set =
            LevelSetConfig::new("test", Sector::new(0.0, 36.0, 0.0, 36.0).unwrap(), LatLon::new(36.0, 36.0), 3)
                .build()
                .unwrap();
        let f = Fixture::new(level_set);
        let frame = f.run(&close_view(&f.globe, -45.0, -100.0));

        assert!(frame.draw_list.is_empty());
        assert_eq!(frame.stats.requests, 0);
        assert_eq!(frame.stats.culled, f.level_set.top_level_tiles().len());
        assert_eq!(f.scheduler.pending(), 0);
    }

    #[test]
    fn test_close_view_descends_to_final_level() {
        let f = Fixture::new(three_level_set());
        let frame = f.run(&close_view(&f.globe, 10.0, 10.0));

        assert_eq!(frame.stats.max_depth, 2);
        assert!(frame.draw_list.is_empty());
        // One tile per level along the branch under the eye
        assert_eq!(frame.stats.requests, 3);
    }

    #[test]
    fn test_missing_tile_falls_back_to_resident_parent() {
        let f = Fixture::new(three_level_set());
        let view = close_view(&f.globe, 10.0, 10.0);

        let leaf = f.level_set.tile_key_for(LatLon::new(10.0, 10.0), 2).unwrap();
        let parent = f.level_set.tile_key_for(LatLon::new(10.0, 10.0), 1).unwrap();
        f.make_resident(parent.clone());

        let frame = f.run(&view);
        let item = frame
            .draw_list
            .iter()
            .find(|item| item.tile.key() == &leaf)
            .expect("leaf should be drawn with its parent's texture");
        assert_eq!(item.fallback.as_ref().map(|t| t.key()), Some(&parent));
        assert!(!item.tex_transform.is_identity());
        assert_eq!(f.scheduler.state_of(&leaf), Some(crate::scheduler::TaskState::Pending));

        // Requesting the same frame again collapses onto the queued task
        let again = f.run(&view);
        assert_eq!(again.stats.requests, 0);
        assert_eq!(f.scheduler.pending(), 2);
    }

    #[test]
    fn test_resident_leaf_draws_own_texture() {
        let f = Fixture::new(three_level_set());
        let leaf = f.level_set.tile_key_for(LatLon::new(10.0, 10.0), 2).unwrap();
        f.make_resident(leaf.clone());

        let frame = f.run(&close_view(&f.globe, 10.0, 10.0));
        let item = frame.draw_list.iter().find(|i| i.tile.key() == &leaf).unwrap();
        assert!(item.fallback.is_none());
        assert!(item.tex_transform.is_identity());
    }

    #[test]
    fn test_fallback_is_always_coarser_and_list_sorted() {
        let f = Fixture::new(three_level_set());
        for tile in f.level_set.top_level_tiles() {
            f.make_resident(tile.key().clone());
        }
        let frame = f.run(&close_view(&f.globe, 20.0, 20.0));

        assert!(!frame.draw_list.is_empty());
        for item in &frame.draw_list {
            if let Some(fallback) = &item.fallback {
                assert!(fallback.level_index() < item.tile.level_index());
            }
        }
        let levels: Vec<_> = frame.draw_list.iter().map(DrawItem::effective_level).collect();
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_far_view_draws_level_zero() {
        let f = Fixture::new(three_level_set());
        for tile in f.level_set.top_level_tiles() {
            f.make_resident(tile.key().clone());
        }
        let view = ViewSnapshot::new(
            f.globe.compute_point(0.0, 0.0, 1.0e9),
            Sector::FULL_SPHERE,
            None,
        );
        let frame = f.run(&view);
        assert_eq!(frame.stats.emitted, 50);
        assert_eq!(frame.stats.max_depth, 0);
        assert!(frame.draw_list.iter().all(|i| i.tile.level_index() == 0));
    }

    #[test]
    fn test_empty_levels_are_never_requested() {
        let level_set = LevelSetConfig::new("test", Sector::FULL_SPHERE, LatLon::new(36.0, 36.0), 3)
            .with_empty_levels(1)
            .build()
            .unwrap();
        let f = Fixture::new(level_set);
        let view = ViewSnapshot::new(
            f.globe.compute_point(0.0, 0.0, 1.0e9),
            Sector::new(0.0, 30.0, 0.0, 30.0).unwrap(),
            None,
        );
        f.run(&view);
        let level_zero = f.level_set.tile_key_for(LatLon::new(10.0, 10.0), 0).unwrap();
        assert_eq!(f.scheduler.state_of(&level_zero), None);
        assert!(f.scheduler.pending() > 0);
    }

    #[test]
    fn test_force_level_zero_loads() {
        let f = Fixture::new(three_level_set());
        let frame = traverse(&f.ctx(true), &f.globe, &close_view(&f.globe, 10.0, 10.0));

        // Every top-level tile is requested, nothing finer
        assert_eq!(frame.stats.requests, 50);
        assert!(frame.draw_list.is_empty());

        f.scheduler.drain(usize::MAX);
        for tile in f.level_set.top_level_tiles() {
            f.scheduler.complete(tile.key());
            f.make_resident(tile.key().clone());
        }
        let frame = traverse(&f.ctx(true), &f.globe, &close_view(&f.globe, 10.0, 10.0));
        assert_eq!(frame.stats.max_depth, 2);
    }
}
