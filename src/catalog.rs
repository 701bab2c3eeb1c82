//! Static tile-kind registry with adjacency and height rules
//!
//! The catalog is validated once at construction and read-only afterwards;
//! the solver never re-checks it. Tile kinds get dense ids in definition
//! order, which is also the order every domain iterates in.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::Domain;

/// Dense tile identifier, assigned in catalog definition order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub u8);

impl TileId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Maximum number of tile kinds one catalog may define.
/// Cell domains are a 64-bit candidate mask, one bit per kind.
pub const MAX_TILE_KINDS: usize = 64;

/// Configuration errors, all caught at catalog construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("catalog defines no tiles")]
    EmptyCatalog,
    #[error("catalog defines {0} tiles, maximum is {MAX_TILE_KINDS}")]
    TooManyTiles(usize),
    #[error("duplicate tile name \"{0}\"")]
    DuplicateTile(String),
    #[error("tile \"{0}\" has a rarity weight of zero")]
    ZeroRarity(String),
    #[error("tile \"{tile}\" lists unknown neighbor \"{neighbor}\"")]
    UnknownTile { tile: String, neighbor: String },
    #[error("adjacency is asymmetric: \"{a}\" allows \"{b}\" but not the reverse")]
    AsymmetricAdjacency { a: String, b: String },
    #[error("failed to read catalog file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog file")]
    Parse(#[from] serde_json::Error),
}

/// One tile definition as it appears in a catalog file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TileDef {
    pub name: String,
    /// Glyph used by the ASCII preview
    #[serde(default = "default_glyph")]
    pub glyph: char,
    /// RGB color used by the PNG overview export
    #[serde(default = "default_color")]
    pub color: [u8; 3],
    /// Baseline elevation in meters (negative = below sea level)
    pub base_elevation: f32,
    /// Per-cell elevation spread handed to terrain collaborators
    #[serde(default)]
    pub elevation_variance: f32,
    #[serde(default = "default_true")]
    pub walkable: bool,
    #[serde(default)]
    pub water: bool,
    /// Prior weight for collapse choices and tie-breaking (must be > 0)
    #[serde(default = "default_rarity")]
    pub rarity: u32,
    /// Names of tile kinds this one may sit next to.
    /// Self-adjacency must be listed explicitly; the table must be symmetric.
    pub compatible: Vec<String>,
}

fn default_glyph() -> char {
    '?'
}

fn default_color() -> [u8; 3] {
    [128, 128, 128]
}

fn default_true() -> bool {
    true
}

fn default_rarity() -> u32 {
    1
}

/// A catalog file: just the tile list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub tiles: Vec<TileDef>,
}

/// Validated per-kind properties.
#[derive(Clone, Debug)]
pub struct TileKind {
    pub name: String,
    pub glyph: char,
    pub color: [u8; 3],
    pub base_elevation: f32,
    pub elevation_variance: f32,
    pub walkable: bool,
    pub water: bool,
    pub rarity: u32,
}

/// Read-only tile registry: kinds, adjacency matrix, checksum.
pub struct TileCatalog {
    kinds: Vec<TileKind>,
    /// Row-major n*n symmetric adjacency matrix
    adjacency: Vec<bool>,
    by_name: HashMap<String, TileId>,
    checksum: u32,
}

impl TileCatalog {
    /// Validate a configuration into a catalog. All `ConfigError` cases are
    /// raised here, never during solving.
    pub fn from_config(config: &CatalogConfig) -> Result<Self, ConfigError> {
        let n = config.tiles.len();
        if n == 0 {
            return Err(ConfigError::EmptyCatalog);
        }
        if n > MAX_TILE_KINDS {
            return Err(ConfigError::TooManyTiles(n));
        }

        let mut by_name = HashMap::new();
        for (i, def) in config.tiles.iter().enumerate() {
            if by_name.insert(def.name.clone(), TileId(i as u8)).is_some() {
                return Err(ConfigError::DuplicateTile(def.name.clone()));
            }
            if def.rarity == 0 {
                return Err(ConfigError::ZeroRarity(def.name.clone()));
            }
        }

        let mut adjacency = vec![false; n * n];
        for (i, def) in config.tiles.iter().enumerate() {
            for neighbor in &def.compatible {
                let Some(&id) = by_name.get(neighbor) else {
                    return Err(ConfigError::UnknownTile {
                        tile: def.name.clone(),
                        neighbor: neighbor.clone(),
                    });
                };
                adjacency[i * n + id.index()] = true;
            }
        }

        for a in 0..n {
            for b in (a + 1)..n {
                if adjacency[a * n + b] != adjacency[b * n + a] {
                    let (a, b) = if adjacency[a * n + b] { (a, b) } else { (b, a) };
                    return Err(ConfigError::AsymmetricAdjacency {
                        a: config.tiles[a].name.clone(),
                        b: config.tiles[b].name.clone(),
                    });
                }
            }
        }

        let kinds: Vec<TileKind> = config
            .tiles
            .iter()
            .map(|def| TileKind {
                name: def.name.clone(),
                glyph: def.glyph,
                color: def.color,
                base_elevation: def.base_elevation,
                elevation_variance: def.elevation_variance,
                walkable: def.walkable,
                water: def.water,
                rarity: def.rarity,
            })
            .collect();

        let checksum = catalog_checksum(&kinds, &adjacency);

        Ok(Self {
            kinds,
            adjacency,
            by_name,
            checksum,
        })
    }

    /// Load and validate a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: CatalogConfig = serde_json::from_str(&text)?;
        Self::from_config(&config)
    }

    /// The built-in terrain set: a water-to-snow elevation chain.
    pub fn default_catalog() -> Self {
        Self::from_config(&default_config()).expect("built-in catalog is valid")
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn kind(&self, id: TileId) -> &TileKind {
        &self.kinds[id.index()]
    }

    pub fn kinds(&self) -> &[TileKind] {
        &self.kinds
    }

    pub fn id_of(&self, name: &str) -> Option<TileId> {
        self.by_name.get(name).copied()
    }

    /// Symmetric adjacency predicate.
    pub fn adjacency_allowed(&self, a: TileId, b: TileId) -> bool {
        self.adjacency[a.index() * self.kinds.len() + b.index()]
    }

    /// Absolute baseline elevation difference between two kinds.
    pub fn height_delta(&self, a: TileId, b: TileId) -> f32 {
        (self.kinds[a.index()].base_elevation - self.kinds[b.index()].base_elevation).abs()
    }

    /// Domain containing every kind in this catalog.
    pub fn full_domain(&self) -> Domain {
        Domain::all(self.kinds.len())
    }

    /// Domain for a list of tile names. `None` if any name is unknown.
    pub fn domain_of_names(&self, names: &[String]) -> Option<Domain> {
        let mut domain = Domain::none();
        for name in names {
            domain.insert(self.id_of(name)?);
        }
        Some(domain)
    }

    /// CRC32 over a canonical encoding of every definition and the adjacency
    /// table. Stored in serialized maps so decoding against a different
    /// catalog fails loudly instead of silently misreading ids.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }
}

fn catalog_checksum(kinds: &[TileKind], adjacency: &[bool]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for kind in kinds {
        hasher.update(kind.name.as_bytes());
        hasher.update(&[0]); // name terminator
        hasher.update(&(kind.glyph as u32).to_le_bytes());
        hasher.update(&kind.color);
        hasher.update(&kind.base_elevation.to_le_bytes());
        hasher.update(&kind.elevation_variance.to_le_bytes());
        hasher.update(&[kind.walkable as u8, kind.water as u8]);
        hasher.update(&kind.rarity.to_le_bytes());
    }
    for &allowed in adjacency {
        hasher.update(&[allowed as u8]);
    }
    hasher.finalize()
}

/// Built-in tile definitions. Kinds form an elevation chain so that any two
/// adjacent kinds differ by at most one terrain band.
fn default_config() -> CatalogConfig {
    fn tile(
        name: &str,
        glyph: char,
        color: [u8; 3],
        base_elevation: f32,
        elevation_variance: f32,
        walkable: bool,
        water: bool,
        rarity: u32,
        compatible: &[&str],
    ) -> TileDef {
        TileDef {
            name: name.to_string(),
            glyph,
            color,
            base_elevation,
            elevation_variance,
            walkable,
            water,
            rarity,
            compatible: compatible.iter().map(|s| s.to_string()).collect(),
        }
    }

    CatalogConfig {
        tiles: vec![
            tile("deep_water", '~', [16, 42, 94], -40.0, 8.0, false, true, 6,
                &["deep_water", "water"]),
            tile("water", ',', [38, 88, 158], -10.0, 4.0, false, true, 8,
                &["deep_water", "water", "sand"]),
            tile("sand", '.', [214, 196, 138], 2.0, 1.0, true, false, 7,
                &["water", "sand", "grass"]),
            tile("grass", '"', [92, 156, 70], 10.0, 3.0, true, false, 14,
                &["sand", "grass", "forest", "hills"]),
            tile("forest", 'T', [42, 104, 48], 14.0, 4.0, true, false, 10,
                &["grass", "forest", "hills"]),
            tile("hills", 'n', [142, 120, 84], 30.0, 6.0, true, false, 8,
                &["grass", "forest", "hills", "mountain"]),
            tile("mountain", '^', [120, 116, 112], 55.0, 10.0, true, false, 5,
                &["hills", "mountain", "snow"]),
            tile("snow", '*', [236, 240, 244], 75.0, 8.0, true, false, 3,
                &["mountain", "snow"]),
        ],
    }
}
