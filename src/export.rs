//! PNG overview export
//!
//! One colored block per tile, committed zone footprints outlined in white.
//! A developer-facing overview, not the game's renderer.

use std::path::Path;

use image::{Rgb, RgbImage};

use crate::catalog::TileCatalog;
use crate::config::MapScale;
use crate::generator::MapModel;

const ZONE_OUTLINE: Rgb<u8> = Rgb([255, 255, 255]);

/// Render the map to an RGB image at `pixels_per_tile` resolution.
pub fn render_overview(model: &MapModel, catalog: &TileCatalog, scale: &MapScale) -> RgbImage {
    let ppt = scale.pixels_per_tile.max(1);
    let (width, height) = model.dimensions();
    let mut img = RgbImage::new(width as u32 * ppt, height as u32 * ppt);

    for y in 0..height {
        for x in 0..width {
            let color = model
                .tile_at(x, y)
                .map(|id| catalog.kind(id).color)
                .unwrap_or([0, 0, 0]);
            let (px, py) = (x as u32 * ppt, y as u32 * ppt);
            for dy in 0..ppt {
                for dx in 0..ppt {
                    img.put_pixel(px + dx, py + dy, Rgb(color));
                }
            }
        }
    }

    for zone in model.zones() {
        outline_zone(&mut img, zone.center, zone.radius, ppt);
    }

    img
}

/// Render and write the overview as a PNG.
pub fn export_map_png(
    model: &MapModel,
    catalog: &TileCatalog,
    scale: &MapScale,
    path: &Path,
) -> Result<(), image::ImageError> {
    render_overview(model, catalog, scale).save(path)
}

/// White square outline around a zone's footprint, clipped to the image.
fn outline_zone(img: &mut RgbImage, center: (usize, usize), radius: u32, ppt: u32) {
    let r = radius as i64;
    let x0 = (center.0 as i64 - r) * ppt as i64;
    let y0 = (center.1 as i64 - r) * ppt as i64;
    let x1 = (center.0 as i64 + r + 1) * ppt as i64 - 1;
    let y1 = (center.1 as i64 + r + 1) * ppt as i64 - 1;

    let mut put = |x: i64, y: i64| {
        if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
            img.put_pixel(x as u32, y as u32, ZONE_OUTLINE);
        }
    };
    for x in x0..=x1 {
        put(x, y0);
        put(x, y1);
    }
    for y in y0..=y1 {
        put(x0, y);
        put(x1, y);
    }
}
