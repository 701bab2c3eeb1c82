//! Map generation orchestrator
//!
//! Composes the solver, the zone placer and the serializer into
//! `generate(seed) -> MapModel` and `load(bytes) -> MapModel`. Every attempt
//! owns a fresh grid and draws from its own forked sub-seed; contradictions
//! are recovered only by retrying the whole attempt, never by local
//! patching, so a given seed always produces a bit-identical map.

use std::time::Instant;

use thiserror::Error;

use crate::catalog::{TileCatalog, TileId};
use crate::config::GenerationConfig;
use crate::grid::Grid;
use crate::rng::GenRng;
use crate::serialize::{self, CorruptDataError, SizeExceededError, FORMAT_VERSION};
use crate::solver::{Solver, SolverParams};
use crate::zones::{self, PlacedZone, ResolvedRequest, ZoneError, ZoneRequest};

/// A fully generated map: seed, resolved grid, committed zones.
/// Immutable once built; external collaborators hold it by reference.
pub struct MapModel {
    seed: u64,
    grid: Grid,
    zones: Vec<PlacedZone>,
    format_version: u16,
}

impl MapModel {
    pub(crate) fn from_parts(
        seed: u64,
        grid: Grid,
        zones: Vec<PlacedZone>,
        format_version: u16,
    ) -> Self {
        Self {
            seed,
            grid,
            zones,
            format_version,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.grid.width(), self.grid.height())
    }

    /// The tile at a position; `None` outside the map.
    pub fn tile_at(&self, x: usize, y: usize) -> Option<TileId> {
        if x < self.grid.width() && y < self.grid.height() {
            self.grid.resolved_tile(x, y)
        } else {
            None
        }
    }

    pub fn zones(&self) -> &[PlacedZone] {
        &self.zones
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn format_version(&self) -> u16 {
        self.format_version
    }
}

impl PartialEq for MapModel {
    fn eq(&self, other: &Self) -> bool {
        self.seed == other.seed
            && self.format_version == other.format_version
            && self.zones == other.zones
            && self.grid.same_resolution(&other.grid)
    }
}

/// Generation gave up: retry budget spent, or a mandatory zone failed.
/// No partial grid is ever exposed.
#[derive(Debug, Error)]
pub enum GenerationFailure {
    #[error("retry budget exhausted after {attempts} contradicted attempts")]
    RetryBudgetExhausted { attempts: u32 },
    #[error("mandatory zone \"{zone}\" could not be placed")]
    MandatoryZoneUnplaced { zone: String },
    #[error("wall-clock budget exceeded after {attempts} attempts")]
    TimeBudgetExceeded { attempts: u32 },
    #[error(transparent)]
    BadZoneRequest(ZoneError),
}

/// A successful generation: the model plus bookkeeping the caller needs
/// for reproduction and reporting.
pub struct GenerationOutcome {
    pub model: MapModel,
    /// Effective seed, also returned when the caller omitted one
    pub seed: u64,
    /// Optional zones that found no valid placement
    pub skipped_zones: Vec<String>,
    /// Attempts consumed, including the successful one
    pub attempts: u32,
}

enum AttemptFailure {
    Contradiction,
    MandatoryZone(String),
    BadRequest(ZoneError),
}

/// Owns a validated catalog and a parameter set; stateless across calls, so
/// concurrent `generate` calls never share mutable state.
pub struct MapGenerator {
    catalog: TileCatalog,
    config: GenerationConfig,
}

impl MapGenerator {
    pub fn new(catalog: TileCatalog, config: GenerationConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &TileCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Generate a map. An omitted seed is freshly drawn and returned in the
    /// outcome so the run can be reproduced.
    pub fn generate(
        &self,
        seed: Option<u64>,
        requests: &[ZoneRequest],
    ) -> Result<GenerationOutcome, GenerationFailure> {
        let seed = seed.unwrap_or_else(rand::random);
        let resolved = zones::resolve_requests(&self.catalog, requests).map_err(|e| match e {
            ZoneError::MandatoryUnplaced(zone) => GenerationFailure::MandatoryZoneUnplaced { zone },
            other => GenerationFailure::BadZoneRequest(other),
        })?;

        let master = GenRng::from_seed(seed);
        let solver = Solver::new(
            &self.catalog,
            SolverParams {
                max_height_delta: self.config.max_height_delta,
            },
        );

        let started = Instant::now();
        for attempt in 0..self.config.max_attempts {
            // Checked only between attempts; a partially propagated grid is
            // not a valid resumption point.
            if let Some(budget) = self.config.time_budget {
                if attempt > 0 && started.elapsed() >= budget {
                    return Err(GenerationFailure::TimeBudgetExceeded { attempts: attempt });
                }
            }

            let attempt_rng = master.fork_indexed("attempt", attempt as u64);
            match self.run_attempt(&solver, &attempt_rng, &resolved) {
                Ok((grid, placed, skipped)) => {
                    return Ok(GenerationOutcome {
                        model: MapModel::from_parts(seed, grid, placed, FORMAT_VERSION),
                        seed,
                        skipped_zones: skipped,
                        attempts: attempt + 1,
                    });
                }
                Err(AttemptFailure::Contradiction) => continue,
                Err(AttemptFailure::MandatoryZone(zone)) => {
                    return Err(GenerationFailure::MandatoryZoneUnplaced { zone });
                }
                Err(AttemptFailure::BadRequest(e)) => {
                    return Err(GenerationFailure::BadZoneRequest(e));
                }
            }
        }
        Err(GenerationFailure::RetryBudgetExhausted {
            attempts: self.config.max_attempts,
        })
    }

    /// One full attempt: solve, place zones, refine footprints.
    fn run_attempt(
        &self,
        solver: &Solver,
        attempt_rng: &GenRng,
        requests: &[ResolvedRequest],
    ) -> Result<(Grid, Vec<PlacedZone>, Vec<String>), AttemptFailure> {
        let mut grid = Grid::new(self.config.width, self.config.height, self.catalog.full_domain());

        let mut solver_rng = attempt_rng.fork("solver");
        solver
            .solve(&mut grid, &mut solver_rng)
            .map_err(|_| AttemptFailure::Contradiction)?;

        let mut zone_rng = attempt_rng.fork("zones");
        let report = match zones::place_zones(
            &mut grid,
            &self.catalog,
            requests,
            &mut zone_rng,
            &self.config,
        ) {
            Ok(report) => report,
            Err(ZoneError::MandatoryUnplaced(zone)) => {
                return Err(AttemptFailure::MandatoryZone(zone));
            }
            Err(other) => return Err(AttemptFailure::BadRequest(other)),
        };

        let mut refine_rng = attempt_rng.fork("refine");
        zones::refine_zones(&mut grid, &self.catalog, solver, &report.placed, &mut refine_rng)
            .map_err(|_| AttemptFailure::Contradiction)?;

        Ok((grid, report.placed, report.skipped))
    }

    /// Encode a model against this generator's catalog and byte budget.
    pub fn encode(&self, model: &MapModel) -> Result<Vec<u8>, SizeExceededError> {
        serialize::encode(model, &self.catalog, self.config.encode_byte_budget)
    }

    /// Decode a previously encoded map, rejecting catalog mismatches.
    pub fn load(&self, bytes: &[u8]) -> Result<MapModel, CorruptDataError> {
        serialize::decode(bytes, &self.catalog, self.catalog.checksum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogConfig, TileDef};

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

    /// Land-only chain where every kind borders grass; such a catalog can
    /// never contradict, which keeps scenario tests deterministic.
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

    fn start_zone() -> ZoneRequest {
        ZoneRequest {
            name: "start".into(),
            radius: 3,
            allowed_tiles: vec!["grass".into()],
            require_flat: true,
            forbid_water: true,
            mandatory: true,
            min_edge_distance: 0,
            min_separation: 0,
            anchors: vec![(0, 0)],
        }
    }

    #[test]
    fn test_generate_is_deterministic() {
        let generator =
            MapGenerator::new(TileCatalog::default_catalog(), GenerationConfig::with_size(24, 24));
        let a = generator.generate(Some(4242), &[]).expect("generates");
        let b = generator.generate(Some(4242), &[]).expect("generates");
        assert!(a.model == b.model);
        assert_eq!(a.attempts, b.attempts);
    }

    #[test]
    fn test_adjacency_invariant_holds() {
        let generator =
            MapGenerator::new(TileCatalog::default_catalog(), GenerationConfig::with_size(24, 24));
        for seed in [1u64, 2, 3, 900] {
            let outcome = generator.generate(Some(seed), &[]).expect("generates");
            let grid = outcome.model.grid();
            let catalog = generator.catalog();
            for (x, y, cell) in grid.iter() {
                let a = cell.resolved.expect("model grids are resolved");
                for (nx, ny) in grid.neighbors(x, y) {
                    let b = grid.resolved_tile(nx, ny).expect("resolved");
                    assert!(catalog.adjacency_allowed(a, b), "seed {} broke adjacency", seed);
                    assert!(catalog.height_delta(a, b) <= generator.config().max_height_delta);
                }
            }
        }
    }

    #[test]
    fn test_round_trip_law() {
        let generator =
            MapGenerator::new(TileCatalog::default_catalog(), GenerationConfig::with_size(32, 24));
        let outcome = generator.generate(Some(31337), &[]).expect("generates");
        let bytes = generator.encode(&outcome.model).expect("within budget");
        let decoded = generator.load(&bytes).expect("decodes");
        assert!(decoded == outcome.model);
    }

    #[test]
    fn test_omitted_seed_is_returned_and_reproducible() {
        let generator =
            MapGenerator::new(TileCatalog::default_catalog(), GenerationConfig::with_size(16, 16));
        let first = generator.generate(None, &[]).expect("generates");
        let again = generator
            .generate(Some(first.seed), &[])
            .expect("generates");
        assert!(first.model == again.model);
    }

    #[test]
    fn test_size_bound_over_hundred_seeds() {
        let generator = MapGenerator::new(TileCatalog::default_catalog(), GenerationConfig::default());
        for seed in 0..100u64 {
            let outcome = generator.generate(Some(seed), &[]).expect("generates");
            let bytes = generator.encode(&outcome.model).expect("within byte budget");
            assert!(bytes.len() <= generator.config().encode_byte_budget);
        }
    }

    // Scenario A: seed 12345, 16x16 grid, one mandatory flat no-water
    // "start" zone of radius 3. Every footprint cell must come from the
    // zone's allowed subset, and a rerun must reproduce the same layout.
    #[test]
    fn test_start_zone_scenario() {
        let generator = MapGenerator::new(land_catalog(), GenerationConfig::with_size(16, 16));
        let outcome = generator
            .generate(Some(12345), &[start_zone()])
            .expect("start zone must place");

        assert_eq!(outcome.model.zones().len(), 1);
        assert!(outcome.skipped_zones.is_empty());

        let zone = &outcome.model.zones()[0];
        let footprint = zone.footprint(16, 16);
        assert_eq!(footprint.len(), 49, "radius 3 means a full 7x7 footprint");
        let grass = generator.catalog().id_of("grass").unwrap();
        for (x, y) in footprint {
            assert_eq!(outcome.model.tile_at(x, y), Some(grass));
        }

        let rerun = generator
            .generate(Some(12345), &[start_zone()])
            .expect("reruns place identically");
        assert_eq!(rerun.model.zones()[0].center, zone.center);
        assert!(rerun.model == outcome.model);
    }

    // Scenario B: a catalog whose two kinds are incompatible with
    // everything exhausts the retry budget and fails cleanly.
    #[test]
    fn test_incompatible_catalog_exhausts_retries() {
        let catalog = TileCatalog::from_config(&CatalogConfig {
            tiles: vec![tile("a", 0.0, 1, &[]), tile("b", 0.0, 1, &[])],
        })
        .unwrap();
        let config = GenerationConfig::with_size(8, 8);
        let max_attempts = config.max_attempts;
        let generator = MapGenerator::new(catalog, config);

        match generator.generate(Some(5), &[]) {
            Err(GenerationFailure::RetryBudgetExhausted { attempts }) => {
                assert_eq!(attempts, max_attempts);
            }
            Err(other) => panic!("unexpected failure: {}", other),
            Ok(_) => panic!("an unsolvable catalog cannot generate"),
        }
    }

    #[test]
    fn test_zone_separation_survives_generation_and_round_trip() {
        let mut first = start_zone();
        first.name = "alpha".into();
        first.min_separation = 12;
        first.require_flat = false;
        let mut second = start_zone();
        second.name = "beta".into();
        second.min_separation = 16;
        second.require_flat = false;

        let generator = MapGenerator::new(land_catalog(), GenerationConfig::with_size(48, 48));
        let outcome = generator
            .generate(Some(808), &[first, second])
            .expect("both zones place on a 48x48 map");

        let zones = outcome.model.zones();
        assert_eq!(zones.len(), 2);
        let dx = zones[0].center.0 as i64 - zones[1].center.0 as i64;
        let dy = zones[0].center.1 as i64 - zones[1].center.1 as i64;
        assert!(dx * dx + dy * dy >= 16 * 16, "the larger minimum applies");

        // The separation fields survive encoding, so the invariant is still
        // checkable after a round trip.
        let bytes = generator.encode(&outcome.model).expect("within budget");
        let decoded = generator.load(&bytes).expect("decodes");
        assert_eq!(decoded.zones()[1].min_separation, 16);
    }

    #[test]
    fn test_mandatory_zone_failure_is_reported() {
        let mut zone = start_zone();
        zone.min_edge_distance = 1000; // cannot hold anywhere

        let generator = MapGenerator::new(land_catalog(), GenerationConfig::with_size(16, 16));
        match generator.generate(Some(7), &[zone]) {
            Err(GenerationFailure::MandatoryZoneUnplaced { zone }) => {
                assert_eq!(zone, "start");
            }
            _ => panic!("expected MandatoryZoneUnplaced"),
        }
    }

    #[test]
    fn test_optional_zone_failure_is_soft() {
        let mut zone = start_zone();
        zone.mandatory = false;
        zone.min_edge_distance = 1000;

        let generator = MapGenerator::new(land_catalog(), GenerationConfig::with_size(16, 16));
        let outcome = generator
            .generate(Some(7), &[zone])
            .expect("optional zones never fail generation");
        assert!(outcome.model.zones().is_empty());
        assert_eq!(outcome.skipped_zones, vec!["start".to_string()]);
    }

    #[test]
    fn test_unknown_zone_tile_fails_before_any_attempt() {
        let mut zone = start_zone();
        zone.allowed_tiles = vec!["obsidian".into()];

        let generator = MapGenerator::new(land_catalog(), GenerationConfig::with_size(16, 16));
        assert!(matches!(
            generator.generate(Some(7), &[zone]),
            Err(GenerationFailure::BadZoneRequest(ZoneError::UnknownTile { .. }))
        ));
    }

    #[test]
    fn test_tile_at_outside_map_is_none() {
        let generator = MapGenerator::new(land_catalog(), GenerationConfig::with_size(8, 8));
        let outcome = generator.generate(Some(1), &[]).expect("generates");
        assert!(outcome.model.tile_at(8, 0).is_none());
        assert!(outcome.model.tile_at(0, 8).is_none());
        assert!(outcome.model.tile_at(3, 3).is_some());
    }
}
