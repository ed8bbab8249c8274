//! In-memory resource cache for decoded tile textures.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use globelayer::cache::{ResourceCache, Texture};
//! use globelayer::tile::TileKey;
//!
//! let cache = ResourceCache::new(64 * 1024 * 1024, true);
//! let key = TileKey::new(0, 0, 0, "earth");
//! cache.put(key.clone(), Arc::new(Texture::from_rgba(image::RgbaImage::new(2, 2))));
//! assert!(cache.get(&key).is_some());
//! ```

mod resource;
mod texture;

pub use resource::{ResourceCache, ResourceCacheStats, DEFAULT_MEMORY_CACHE_BYTES};
pub use texture::{Texture, TextureData};
