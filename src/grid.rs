//! Cell grid for the constraint solver
//!
//! A bounded 2D map (no wrapping), addressed row-major. Each cell carries a
//! candidate domain until it resolves to a single tile kind. All mutation is
//! in place; a grid belongs to exactly one generation attempt.

use crate::catalog::TileId;
use crate::config::MapScale;

/// Set of still-possible tile kinds for one cell, one bit per `TileId`.
/// Iteration ascends by id, so nothing downstream depends on the order of
/// an unordered container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Domain(u64);

impl Domain {
    /// Empty set (a contradiction if it ever belongs to a live cell).
    pub fn none() -> Self {
        Domain(0)
    }

    /// All of the first `count` tile ids.
    pub fn all(count: usize) -> Self {
        debug_assert!(count >= 1 && count <= 64);
        if count == 64 {
            Domain(u64::MAX)
        } else {
            Domain((1u64 << count) - 1)
        }
    }

    pub fn single(id: TileId) -> Self {
        Domain(1u64 << id.0)
    }

    pub fn contains(self, id: TileId) -> bool {
        self.0 & (1u64 << id.0) != 0
    }

    pub fn insert(&mut self, id: TileId) {
        self.0 |= 1u64 << id.0;
    }

    pub fn remove(&mut self, id: TileId) {
        self.0 &= !(1u64 << id.0);
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The single remaining candidate, if exactly one is left.
    pub fn sole(self) -> Option<TileId> {
        if self.0.count_ones() == 1 {
            Some(TileId(self.0.trailing_zeros() as u8))
        } else {
            None
        }
    }

    pub fn intersect(self, other: Domain) -> Domain {
        Domain(self.0 & other.0)
    }

    pub fn union(self, other: Domain) -> Domain {
        Domain(self.0 | other.0)
    }

    /// Candidates in ascending id order.
    pub fn iter(self) -> impl Iterator<Item = TileId> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                None
            } else {
                let id = bits.trailing_zeros() as u8;
                bits &= bits - 1;
                Some(TileId(id))
            }
        })
    }
}

/// One grid cell: candidate domain, resolved kind, zone pin.
#[derive(Clone, Debug)]
pub struct Cell {
    pub domain: Domain,
    pub resolved: Option<TileId>,
    pub pinned: bool,
}

/// Row-major cell container with bounds-checked neighbor access and
/// coordinate transforms.
#[derive(Clone)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Grid {
    /// Create a grid with every cell open to `initial` candidates.
    pub fn new(width: usize, height: usize, initial: Domain) -> Self {
        debug_assert!(width > 0 && height > 0);
        Self {
            width,
            height,
            cells: vec![
                Cell {
                    domain: initial,
                    resolved: None,
                    pinned: false,
                };
                width * height
            ],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.width + x
    }

    pub fn get(&self, x: usize, y: usize) -> &Cell {
        &self.cells[self.index(x, y)]
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut Cell {
        let idx = self.index(x, y);
        &mut self.cells[idx]
    }

    /// The resolved tile at a position, if the cell has collapsed.
    pub fn resolved_tile(&self, x: usize, y: usize) -> Option<TileId> {
        self.cells[self.index(x, y)].resolved
    }

    /// Fix a cell to a single tile kind.
    pub fn set_resolved(&mut self, x: usize, y: usize, id: TileId) {
        let cell = self.get_mut(x, y);
        cell.domain = Domain::single(id);
        cell.resolved = Some(id);
    }

    /// Pin a cell to a zone's allowed subset and queue it for re-solving.
    pub fn pin(&mut self, x: usize, y: usize, allowed: Domain) {
        let cell = self.get_mut(x, y);
        cell.domain = allowed;
        cell.resolved = None;
        cell.pinned = true;
    }

    /// Reopen a cell to a fresh candidate set (used for the refine halo).
    pub fn reopen(&mut self, x: usize, y: usize, domain: Domain) {
        let cell = self.get_mut(x, y);
        cell.domain = domain;
        cell.resolved = None;
        cell.pinned = false;
    }

    /// Up to 4 in-bounds neighbors, probed in fixed N, E, S, W order.
    pub fn neighbors(&self, x: usize, y: usize) -> Vec<(usize, usize)> {
        let mut result = Vec::with_capacity(4);
        if y > 0 {
            result.push((x, y - 1));
        }
        if x < self.width - 1 {
            result.push((x + 1, y));
        }
        if y < self.height - 1 {
            result.push((x, y + 1));
        }
        if x > 0 {
            result.push((x - 1, y));
        }
        result
    }

    /// Iterate over all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &Cell)> {
        self.cells.iter().enumerate().map(move |(idx, cell)| {
            let x = idx % self.width;
            let y = idx / self.width;
            (x, y, cell)
        })
    }

    pub fn unresolved_count(&self) -> usize {
        self.cells.iter().filter(|c| c.resolved.is_none()).count()
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.cells.iter().all(|c| c.resolved.is_some())
    }

    /// Whether two grids resolved to the same tiles.
    pub fn same_resolution(&self, other: &Grid) -> bool {
        self.width == other.width
            && self.height == other.height
            && self
                .cells
                .iter()
                .zip(other.cells.iter())
                .all(|(a, b)| a.resolved == b.resolved)
    }

    /// World coordinates of a cell's center.
    pub fn grid_to_world(&self, x: usize, y: usize, scale: &MapScale) -> (f32, f32) {
        (
            (x as f32 + 0.5) * scale.world_units_per_tile,
            (y as f32 + 0.5) * scale.world_units_per_tile,
        )
    }

    /// Grid cell containing a world position, if inside the map.
    pub fn world_to_grid(&self, wx: f32, wy: f32, scale: &MapScale) -> Option<(usize, usize)> {
        if wx < 0.0 || wy < 0.0 {
            return None;
        }
        let x = (wx / scale.world_units_per_tile).floor() as usize;
        let y = (wy / scale.world_units_per_tile).floor() as usize;
        if x < self.width && y < self.height {
            Some((x, y))
        } else {
            None
        }
    }

    /// Top-left image pixel of a cell in the PNG overview.
    pub fn grid_to_pixel(&self, x: usize, y: usize, scale: &MapScale) -> (u32, u32) {
        (
            x as u32 * scale.pixels_per_tile,
            y as u32 * scale.pixels_per_tile,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_all_and_iter_order() {
        let domain = Domain::all(5);
        assert_eq!(domain.len(), 5);
        let ids: Vec<u8> = domain.iter().map(|id| id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_domain_remove_to_sole() {
        let mut domain = Domain::all(3);
        domain.remove(TileId(0));
        domain.remove(TileId(2));
        assert_eq!(domain.sole(), Some(TileId(1)));
        domain.remove(TileId(1));
        assert!(domain.is_empty());
    }

    #[test]
    fn test_domain_all_64() {
        let domain = Domain::all(64);
        assert_eq!(domain.len(), 64);
        assert!(domain.contains(TileId(63)));
    }

    #[test]
    fn test_neighbors_at_corner_and_interior() {
        let grid = Grid::new(4, 3, Domain::all(2));
        assert_eq!(grid.neighbors(0, 0), vec![(1, 0), (0, 1)]);
        assert_eq!(grid.neighbors(3, 2), vec![(3, 1), (2, 2)]);
        assert_eq!(grid.neighbors(1, 1), vec![(1, 0), (2, 1), (1, 2), (0, 1)]);
    }

    #[test]
    fn test_pin_and_reopen() {
        let mut grid = Grid::new(2, 2, Domain::all(4));
        grid.set_resolved(0, 0, TileId(3));
        assert_eq!(grid.resolved_tile(0, 0), Some(TileId(3)));

        grid.pin(0, 0, Domain::single(TileId(1)));
        let cell = grid.get(0, 0);
        assert!(cell.pinned);
        assert!(cell.resolved.is_none());
        assert_eq!(cell.domain, Domain::single(TileId(1)));

        grid.reopen(0, 0, Domain::all(4));
        let cell = grid.get(0, 0);
        assert!(!cell.pinned);
        assert_eq!(cell.domain.len(), 4);
    }

    #[test]
    fn test_world_round_trip() {
        let grid = Grid::new(8, 8, Domain::all(2));
        let scale = MapScale::default();
        let (wx, wy) = grid.grid_to_world(3, 5, &scale);
        assert_eq!(grid.world_to_grid(wx, wy, &scale), Some((3, 5)));
        assert_eq!(grid.world_to_grid(-1.0, 0.0, &scale), None);
    }

    #[test]
    fn test_pixel_transform() {
        let grid = Grid::new(8, 8, Domain::all(2));
        let scale = MapScale {
            world_units_per_tile: 2.0,
            pixels_per_tile: 8,
        };
        assert_eq!(grid.grid_to_pixel(3, 1, &scale), (24, 8));
    }
}
