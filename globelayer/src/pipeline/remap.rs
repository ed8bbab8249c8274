//! Mercator to geographic resampling.
//!
//! Mercator tiles arrive with rows spaced linearly in projected percent space.
//! The globe drapes textures linearly in latitude, so each destination row is
//! filled from the source row whose projected position matches the
//! destination row's latitude. Columns are unchanged.

use image::RgbaImage;
use rayon::prelude::*;

use crate::geo::{gudermannian_inverse, MercatorSector};

/// Source row feeding destination row `y` of an image `height` rows tall.
///
/// Row 0 is the northern edge. Destination rows are spaced evenly in
/// latitude, source rows evenly in Mercator percent.
pub fn source_row(y: u32, height: u32, sector: &MercatorSector) -> u32 {
    if height < 2 {
        return 0;
    }
    let last = (height - 1) as f64;
    let geographic = sector.geographic();
    let lat = geographic.max_lat - y as f64 * geographic.delta_lat() / last;

    let span = sector.max_lat_percent - sector.min_lat_percent;
    if span <= 0.0 {
        return y;
    }
    let t = (gudermannian_inverse(lat) - sector.min_lat_percent) / span;
    (last * (1.0 - t)).round().clamp(0.0, last) as u32
}

/// Resamples a Mercator-projected image onto a geographic-linear grid.
///
/// Fully transparent source pixels are written as all-zero so resampling
/// never tints the transparent trim around partial tiles.
pub fn remap_mercator(image: &RgbaImage, sector: &MercatorSector) -> RgbaImage {
    let (width, height) = image.dimensions();
    let row_len = width as usize * 4;
    let mut out = RgbaImage::new(width, height);
    if row_len == 0 {
        return out;
    }

    let source = image.as_raw();
    let pixels: &mut [u8] = &mut out;
    pixels
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let src_y = source_row(y as u32, height, sector) as usize;
            let src_row = &source[src_y * row_len..(src_y + 1) * row_len];
            for (dst, px) in row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                if px[3] == 0 {
                    dst.fill(0);
                } else {
                    dst.copy_from_slice(px);
                }
            }
        });
    out
}
