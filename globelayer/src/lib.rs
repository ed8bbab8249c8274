//! GlobeLayer - Adaptive tile pyramid streaming for imagery draped on a globe
//!
//! Imagery is organised as a quadtree pyramid of fixed-size tiles. Every
//! frame the renderer asks a [`TilePyramid`](pyramid::TilePyramid) for a draw
//! list; the pyramid walks the tree, keeps only tiles in view, refines where
//! the camera is close, and draws the nearest resident ancestor's texture
//! wherever a tile's own texture has not arrived yet. Missing tiles are
//! fetched in the background from a local store or the network.
//!
//! # Modules
//!
//! - [`geo`] - sectors, Mercator math, the globe collaborator
//! - [`level`] - level sets, tile addressing, resource URLs
//! - [`tile`] - tiles and their cache keys
//! - [`traversal`] - per-frame refinement and draw-list assembly
//! - [`scheduler`] - request queue and fetch worker pool
//! - [`pipeline`] - fetch, classify, decode, remap and install
//! - [`cache`] - size-bounded resident textures
//! - [`absent`] - back-off for tiles that keep failing
//! - [`store`] - on-disk tile store
//! - [`fetch`] - network fetcher
//! - [`config`], [`logging`], [`telemetry`] - ambient plumbing

pub mod absent;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod geo;
pub mod level;
pub mod logging;
pub mod pipeline;
pub mod pyramid;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod tile;
pub mod traversal;

pub use error::PyramidError;
pub use pyramid::{TilePyramid, TilePyramidBuilder};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
