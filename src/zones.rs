//! Zone placement: candidate search, pinning, and localized refine
//!
//! Zones are designer-significant square-footprint regions placed after the
//! first solver pass. Placement and refine are two separate phases: this
//! module first searches centers and pins footprints, then the refine pass
//! re-solves each footprint (plus a one-cell halo) against the surrounding
//! resolved terrain. A refine contradiction abandons the whole attempt;
//! overwriting neighbors directly would break the adjacency invariant.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{ConfigError, TileCatalog};
use crate::config::GenerationConfig;
use crate::grid::{Domain, Grid};
use crate::rng::GenRng;
use crate::solver::{Contradiction, Solver};

/// A zone to place, in priority order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZoneRequest {
    pub name: String,
    /// Chebyshev radius; the footprint is a (2r+1) x (2r+1) square
    pub radius: u32,
    /// Tile names the footprint is restricted to
    pub allowed_tiles: Vec<String>,
    /// Reject candidates whose footprint elevation variance is too high
    #[serde(default)]
    pub require_flat: bool,
    /// Reject candidates covering any water tile
    #[serde(default)]
    pub forbid_water: bool,
    /// Mandatory zones fail generation when unplaceable; optional ones skip
    #[serde(default)]
    pub mandatory: bool,
    /// Minimum center distance to the map edge, in tiles
    #[serde(default)]
    pub min_edge_distance: u32,
    /// Minimum center distance to other committed zones; the larger of the
    /// two zones' minimums applies
    #[serde(default)]
    pub min_separation: u32,
    /// Ordered sub-placement offsets from the center, consumed by external
    /// decoration collaborators
    #[serde(default)]
    pub anchors: Vec<(i16, i16)>,
}

/// A committed zone with its final center.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedZone {
    pub name: String,
    pub center: (usize, usize),
    pub radius: u32,
    pub min_separation: u32,
    pub anchors: Vec<(i16, i16)>,
}

impl PlacedZone {
    /// Footprint cells, clipped to the grid.
    pub fn footprint(&self, width: usize, height: usize) -> Vec<(usize, usize)> {
        cells_within(self.center, self.radius as i64, width, height)
    }
}

#[derive(Debug, Error)]
pub enum ZoneError {
    #[error("zone \"{zone}\" references unknown tile \"{tile}\"")]
    UnknownTile { zone: String, tile: String },
    #[error("zone \"{zone}\" allows no tiles")]
    EmptyAllowedSet { zone: String },
    #[error("mandatory zone \"{0}\" could not be placed")]
    MandatoryUnplaced(String),
}

/// A request with its allowed-tile subset resolved against the catalog.
pub struct ResolvedRequest {
    pub request: ZoneRequest,
    pub allowed: Domain,
}

/// Validate zone requests against a catalog. Done once before the first
/// attempt so a bad request never consumes retries.
pub fn resolve_requests(
    catalog: &TileCatalog,
    requests: &[ZoneRequest],
) -> Result<Vec<ResolvedRequest>, ZoneError> {
    requests
        .iter()
        .map(|request| {
            if request.allowed_tiles.is_empty() {
                return Err(ZoneError::EmptyAllowedSet {
                    zone: request.name.clone(),
                });
            }
            for tile in &request.allowed_tiles {
                if catalog.id_of(tile).is_none() {
                    return Err(ZoneError::UnknownTile {
                        zone: request.name.clone(),
                        tile: tile.clone(),
                    });
                }
            }
            let allowed = catalog
                .domain_of_names(&request.allowed_tiles)
                .expect("names checked above");
            Ok(ResolvedRequest {
                request: request.clone(),
                allowed,
            })
        })
        .collect()
}

/// Load an ordered zone request list from a JSON file.
pub fn load_zone_requests(path: &Path) -> Result<Vec<ZoneRequest>, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Outcome of the placement phase.
pub struct PlacementReport {
    pub placed: Vec<PlacedZone>,
    /// Optional zones that found no valid center within budget
    pub skipped: Vec<String>,
}

/// Search centers for each request in order and pin committed footprints.
///
/// Each candidate draws its center from the stream and is validated against
/// edge distance, separation from committed zones, flatness and water
/// constraints. The first passing candidate commits; covered cells are
/// pinned to the allowed subset and reopened for the refine pass.
pub fn place_zones(
    grid: &mut Grid,
    catalog: &TileCatalog,
    requests: &[ResolvedRequest],
    rng: &mut GenRng,
    config: &GenerationConfig,
) -> Result<PlacementReport, ZoneError> {
    let mut placed: Vec<PlacedZone> = Vec::new();
    let mut skipped = Vec::new();

    for resolved in requests {
        let request = &resolved.request;
        let mut committed = None;

        for _ in 0..config.zone_candidate_budget {
            let cx = rng.next_int(0, grid.width() as i64) as usize;
            let cy = rng.next_int(0, grid.height() as i64) as usize;
            if candidate_ok(grid, catalog, request, (cx, cy), &placed, config) {
                committed = Some((cx, cy));
                break;
            }
        }

        match committed {
            Some(center) => {
                for (x, y) in cells_within(center, request.radius as i64, grid.width(), grid.height())
                {
                    grid.pin(x, y, resolved.allowed);
                }
                placed.push(PlacedZone {
                    name: request.name.clone(),
                    center,
                    radius: request.radius,
                    min_separation: request.min_separation,
                    anchors: request.anchors.clone(),
                });
            }
            None if request.mandatory => {
                return Err(ZoneError::MandatoryUnplaced(request.name.clone()));
            }
            None => skipped.push(request.name.clone()),
        }
    }

    Ok(PlacementReport { placed, skipped })
}

/// Re-solve each committed footprint plus a one-cell halo against the
/// surrounding terrain. Cells outside the region stay frozen.
pub fn refine_zones(
    grid: &mut Grid,
    catalog: &TileCatalog,
    solver: &Solver,
    placed: &[PlacedZone],
    rng: &mut GenRng,
) -> Result<(), Contradiction> {
    for zone in placed {
        let halo_radius = zone.radius as i64 + 1;
        let region = cells_within(zone.center, halo_radius, grid.width(), grid.height());

        for &(x, y) in &region {
            let cell = grid.get(x, y);
            // Footprint cells keep their pin; halo cells reopen fully.
            // A pinned halo cell belongs to another zone and keeps its pin.
            if !cell.pinned && cell.resolved.is_some() {
                grid.reopen(x, y, catalog.full_domain());
            }
        }

        solver.solve_region(grid, rng, &region)?;
    }
    Ok(())
}

/// Validate one candidate center against every placement constraint.
fn candidate_ok(
    grid: &Grid,
    catalog: &TileCatalog,
    request: &ZoneRequest,
    center: (usize, usize),
    placed: &[PlacedZone],
    config: &GenerationConfig,
) -> bool {
    let (cx, cy) = center;
    let r = request.radius as i64;

    // Footprint must fit entirely inside the map.
    if (cx as i64) < r
        || (cy as i64) < r
        || cx as i64 + r >= grid.width() as i64
        || cy as i64 + r >= grid.height() as i64
    {
        return false;
    }

    // Center-to-edge distance.
    let edge = cx
        .min(cy)
        .min(grid.width() - 1 - cx)
        .min(grid.height() - 1 - cy);
    if (edge as u32) < request.min_edge_distance {
        return false;
    }

    // Center separation: the larger of the two zones' minimums applies.
    for other in placed {
        let dx = cx as i64 - other.center.0 as i64;
        let dy = cy as i64 - other.center.1 as i64;
        let need = request.min_separation.max(other.min_separation) as i64;
        if dx * dx + dy * dy < need * need {
            return false;
        }
    }

    let footprint = cells_within(center, r, grid.width(), grid.height());

    if request.forbid_water {
        for &(x, y) in &footprint {
            if let Some(id) = grid.resolved_tile(x, y) {
                if catalog.kind(id).water {
                    return false;
                }
            }
        }
    }

    if request.require_flat {
        let heights: Vec<f64> = footprint
            .iter()
            .filter_map(|&(x, y)| grid.resolved_tile(x, y))
            .map(|id| catalog.kind(id).base_elevation as f64)
            .collect();
        if variance(&heights) > config.flatness_threshold as f64 {
            return false;
        }
    }

    true
}

/// Cells within Chebyshev distance `radius` of `center`, clipped to bounds,
/// in row-major order.
fn cells_within(
    center: (usize, usize),
    radius: i64,
    width: usize,
    height: usize,
) -> Vec<(usize, usize)> {
    let (cx, cy) = (center.0 as i64, center.1 as i64);
    let mut cells = Vec::new();
    for y in (cy - radius).max(0)..=(cy + radius).min(height as i64 - 1) {
        for x in (cx - radius).max(0)..=(cx + radius).min(width as i64 - 1) {
            cells.push((x as usize, y as usize));
        }
    }
    cells
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogConfig, TileDef};
    use crate::solver::SolverParams;

    fn tile(name: &str, elevation: f32, rarity: u32, compatible: &[&str]) -> TileDef {
        TileDef {
            name: name.into(),
            glyph: name.chars().next().unwrap(),
            color: [0, 0, 0],
            base_elevation: elevation,
            elevation_variance: 0.0,
            walkable: true,
            water: false,
            rarity,
            compatible: compatible.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Land-only chain where every kind borders grass; solving a grid under
    /// this catalog can never contradict, so fixed seeds always succeed.
    fn land_catalog() -> TileCatalog {
        TileCatalog::from_config(&CatalogConfig {
            tiles: vec![
                tile("sand", 2.0, 6, &["sand", "grass"]),
                tile("grass", 10.0, 14, &["sand", "grass", "forest", "hills"]),
                tile("forest", 14.0, 10, &["grass", "forest", "hills"]),
                tile("hills", 22.0, 7, &["grass", "forest", "hills"]),
            ],
        })
        .unwrap()
    }

    fn solved_grid(seed: u64, size: usize) -> (Grid, TileCatalog) {
        let catalog = land_catalog();
        let mut grid = Grid::new(size, size, catalog.full_domain());
        let solver = Solver::new(
            &catalog,
            SolverParams {
                max_height_delta: 30.0,
            },
        );
        let mut rng = GenRng::from_seed(seed);
        solver.solve(&mut grid, &mut rng).expect("solvable");
        (grid, catalog)
    }

    fn request(name: &str, radius: u32, mandatory: bool) -> ZoneRequest {
        ZoneRequest {
            name: name.into(),
            radius,
            allowed_tiles: vec!["grass".into()],
            require_flat: false,
            forbid_water: false,
            mandatory,
            min_edge_distance: 0,
            min_separation: 0,
            anchors: vec![],
        }
    }

    #[test]
    fn test_placement_pins_footprint() {
        let (mut grid, catalog) = solved_grid(11, 24);
        let requests = resolve_requests(&catalog, &[request("camp", 2, true)]).unwrap();
        let mut rng = GenRng::from_seed(3);
        let report =
            place_zones(&mut grid, &catalog, &requests, &mut rng, &GenerationConfig::default())
                .expect("placeable");

        assert_eq!(report.placed.len(), 1);
        assert!(report.skipped.is_empty());
        let zone = &report.placed[0];
        let grass = catalog.id_of("grass").unwrap();
        for (x, y) in zone.footprint(grid.width(), grid.height()) {
            let cell = grid.get(x, y);
            assert!(cell.pinned);
            assert!(cell.resolved.is_none());
            assert_eq!(cell.domain, Domain::single(grass));
        }
    }

    #[test]
    fn test_separation_respects_larger_minimum() {
        let (mut grid, catalog) = solved_grid(11, 48);
        let mut near = request("near", 1, true);
        near.min_separation = 20;
        let far = request("far", 1, true);
        // `far` asks for no separation itself; the committed zone's 20 must
        // still hold.
        let requests = resolve_requests(&catalog, &[near, far]).unwrap();
        let mut rng = GenRng::from_seed(8);
        let report =
            place_zones(&mut grid, &catalog, &requests, &mut rng, &GenerationConfig::default())
                .expect("both placeable on a 48x48 map");

        let a = report.placed[0].center;
        let b = report.placed[1].center;
        let dx = a.0 as i64 - b.0 as i64;
        let dy = a.1 as i64 - b.1 as i64;
        assert!(dx * dx + dy * dy >= 20 * 20);
    }

    #[test]
    fn test_unplaceable_optional_zone_is_skipped() {
        let (mut grid, catalog) = solved_grid(11, 16);
        let mut impossible = request("nowhere", 2, false);
        impossible.min_edge_distance = 100; // cannot hold on a 16x16 map
        let requests = resolve_requests(&catalog, &[impossible]).unwrap();
        let mut rng = GenRng::from_seed(3);
        let report =
            place_zones(&mut grid, &catalog, &requests, &mut rng, &GenerationConfig::default())
                .expect("optional zones never error");

        assert!(report.placed.is_empty());
        assert_eq!(report.skipped, vec!["nowhere".to_string()]);
    }

    #[test]
    fn test_unplaceable_mandatory_zone_errors() {
        let (mut grid, catalog) = solved_grid(11, 16);
        let mut impossible = request("keep", 2, true);
        impossible.min_edge_distance = 100;
        let requests = resolve_requests(&catalog, &[impossible]).unwrap();
        let mut rng = GenRng::from_seed(3);
        let result =
            place_zones(&mut grid, &catalog, &requests, &mut rng, &GenerationConfig::default());
        assert!(matches!(result, Err(ZoneError::MandatoryUnplaced(name)) if name == "keep"));
    }

    #[test]
    fn test_unknown_allowed_tile_rejected_upfront() {
        let catalog = TileCatalog::default_catalog();
        let mut bad = request("bad", 1, true);
        bad.allowed_tiles = vec!["lava".into()];
        assert!(matches!(
            resolve_requests(&catalog, &[bad]),
            Err(ZoneError::UnknownTile { .. })
        ));
    }

    #[test]
    fn test_refine_resolves_footprint_to_allowed_subset() {
        let catalog = TileCatalog::default_catalog();
        let solver = Solver::new(
            &catalog,
            SolverParams {
                max_height_delta: 30.0,
            },
        );
        let grass = catalog.id_of("grass").unwrap();
        let forest = catalog.id_of("forest").unwrap();

        // Uniform grass terrain with a forest zone pinned in the middle.
        // Forest borders grass, so the halo always has a legal bridge.
        let mut grid = Grid::new(24, 24, catalog.full_domain());
        for y in 0..24 {
            for x in 0..24 {
                grid.set_resolved(x, y, grass);
            }
        }
        let zone = PlacedZone {
            name: "grove".into(),
            center: (11, 11),
            radius: 2,
            min_separation: 0,
            anchors: vec![],
        };
        for (x, y) in zone.footprint(24, 24) {
            grid.pin(x, y, Domain::single(forest));
        }

        let mut refine_rng = GenRng::from_seed(4);
        refine_zones(&mut grid, &catalog, &solver, &[zone.clone()], &mut refine_rng)
            .expect("refine should converge");

        assert!(grid.is_fully_resolved());
        for (x, y) in zone.footprint(24, 24) {
            assert_eq!(grid.resolved_tile(x, y), Some(forest));
        }
    }

    #[test]
    fn test_footprint_size() {
        let zone = PlacedZone {
            name: "z".into(),
            center: (5, 5),
            radius: 3,
            min_separation: 0,
            anchors: vec![],
        };
        assert_eq!(zone.footprint(16, 16).len(), 49);
    }
}
