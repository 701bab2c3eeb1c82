//! Generation parameters and map scale configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Documented maximum grid edge. The serialized format stores dimensions as
/// u16, but size-budget guarantees are only stated up to this edge.
pub const MAX_GRID_EDGE: usize = 1024;

/// Knobs for one generator instance. All budgets are counts, not time,
/// except the optional wall-clock ceiling checked only between attempts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Map width in tiles
    pub width: usize,
    /// Map height in tiles
    pub height: usize,
    /// Whole-attempt retries before giving up (contradiction recovery)
    pub max_attempts: u32,
    /// Candidate centers drawn per zone before skipping/failing it
    pub zone_candidate_budget: u32,
    /// Maximum baseline elevation difference between adjacent tiles (meters)
    pub max_height_delta: f32,
    /// Maximum elevation variance for a footprint to count as flat
    pub flatness_threshold: f32,
    /// Encoded-map byte budget; `encode` fails rather than exceed it
    pub encode_byte_budget: usize,
    /// Optional wall-clock ceiling, checked between attempts only
    #[serde(skip)]
    pub time_budget: Option<Duration>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            max_attempts: 24,
            zone_candidate_budget: 48,
            max_height_delta: 30.0,
            flatness_threshold: 150.0,
            encode_byte_budget: 32 * 1024,
            time_budget: None,
        }
    }
}

impl GenerationConfig {
    pub fn with_size(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }
}

/// Physical scale of the map: world units per tile and pixels per tile for
/// image export.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MapScale {
    /// World-space edge length of one tile
    pub world_units_per_tile: f32,
    /// Image pixels per tile in PNG exports
    pub pixels_per_tile: u32,
}

impl Default for MapScale {
    fn default() -> Self {
        Self {
            world_units_per_tile: 4.0,
            pixels_per_tile: 4,
        }
    }
}

impl MapScale {
    /// Total map extent in world units.
    pub fn map_size_world(&self, width: usize, height: usize) -> (f32, f32) {
        (
            width as f32 * self.world_units_per_tile,
            height as f32 * self.world_units_per_tile,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = GenerationConfig::default();
        assert!(config.width <= MAX_GRID_EDGE);
        assert!(config.height <= MAX_GRID_EDGE);
        assert!(config.max_attempts > 0);
        assert!(config.zone_candidate_budget > 0);
    }

    #[test]
    fn test_map_size_world() {
        let scale = MapScale {
            world_units_per_tile: 4.0,
            pixels_per_tile: 4,
        };
        assert_eq!(scale.map_size_world(16, 8), (64.0, 32.0));
    }
}
