//! ASCII preview of a resolved map
//!
//! One glyph per tile, zone centers marked with '@'. Debug tooling for the
//! CLI; renderers proper live outside this crate.

use crate::catalog::TileCatalog;
use crate::generator::MapModel;

/// Render the whole map as glyph rows.
pub fn render_map(model: &MapModel, catalog: &TileCatalog) -> String {
    let (width, height) = model.dimensions();
    let mut out = String::with_capacity((width + 1) * height);

    for y in 0..height {
        for x in 0..width {
            if model.zones().iter().any(|z| z.center == (x, y)) {
                out.push('@');
                continue;
            }
            let glyph = model
                .tile_at(x, y)
                .map(|id| catalog.kind(id).glyph)
                .unwrap_or(' ');
            out.push(glyph);
        }
        out.push('\n');
    }
    out
}

/// One legend line per tile kind.
pub fn render_legend(catalog: &TileCatalog) -> String {
    let mut out = String::new();
    for kind in catalog.kinds() {
        out.push_str(&format!("  {} {}\n", kind.glyph, kind.name));
    }
    out
}
