//! Seeded world-map generation library
//!
//! A constraint solver fills a tile grid with mutually-compatible terrain,
//! a zone placer pins designer regions into it, and a versioned codec
//! round-trips the result. Fully deterministic given a seed.

pub mod ascii;
pub mod catalog;
pub mod config;
pub mod export;
pub mod generator;
pub mod grid;
pub mod rng;
pub mod serialize;
pub mod solver;
pub mod zones;

pub use catalog::{ConfigError, TileCatalog, TileId};
pub use config::GenerationConfig;
pub use generator::{GenerationFailure, GenerationOutcome, MapGenerator, MapModel};
pub use serialize::{CorruptDataError, SizeExceededError};
pub use zones::{PlacedZone, ZoneRequest};
