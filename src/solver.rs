//! Constraint solver: entropy-ordered collapse with arc propagation
//!
//! Repeatedly picks the unresolved cell with the smallest domain, collapses
//! it to one rarity-weighted candidate, and drives the consequences to a
//! fixed point before the next collapse. A domain emptied during propagation
//! is a contradiction; the whole attempt is abandoned and retried from a
//! fresh sub-seed rather than patched locally.
//!
//! Cell selection scans in row-major order and every random choice draws
//! from the owned stream, so a given grid state always evolves identically.

use std::collections::VecDeque;

use crate::catalog::{TileCatalog, TileId};
use crate::grid::{Domain, Grid};
use crate::rng::GenRng;

/// Solver knobs, fixed for one generation attempt.
#[derive(Clone, Copy, Debug)]
pub struct SolverParams {
    /// Maximum baseline elevation difference between adjacent tiles
    pub max_height_delta: f32,
}

/// A cell's domain emptied during propagation.
#[derive(Clone, Copy, Debug)]
pub struct Contradiction {
    pub x: usize,
    pub y: usize,
}

pub struct Solver<'a> {
    catalog: &'a TileCatalog,
    /// compat[s] = set of kinds that may sit next to kind `s`
    /// (adjacency allowed and height delta within bounds)
    compat: Vec<Domain>,
}

impl<'a> Solver<'a> {
    pub fn new(catalog: &'a TileCatalog, params: SolverParams) -> Self {
        let n = catalog.len();
        let mut compat = Vec::with_capacity(n);
        for a in 0..n {
            let a = TileId(a as u8);
            let mut allowed = Domain::none();
            for b in 0..n {
                let b = TileId(b as u8);
                if catalog.adjacency_allowed(a, b)
                    && catalog.height_delta(a, b) <= params.max_height_delta
                {
                    allowed.insert(b);
                }
            }
            compat.push(allowed);
        }
        Self { catalog, compat }
    }

    /// Solve every unresolved cell in the grid.
    pub fn solve(&self, grid: &mut Grid, rng: &mut GenRng) -> Result<(), Contradiction> {
        self.run(grid, rng, None)
    }

    /// Solve only the given cells; everything outside is frozen and acts as
    /// a boundary constraint. Used for the localized zone refine pass.
    pub fn solve_region(
        &self,
        grid: &mut Grid,
        rng: &mut GenRng,
        region: &[(usize, usize)],
    ) -> Result<(), Contradiction> {
        let mut mask = vec![false; grid.width() * grid.height()];
        for &(x, y) in region {
            mask[y * grid.width() + x] = true;
        }
        self.run(grid, rng, Some(&mask))
    }

    fn run(
        &self,
        grid: &mut Grid,
        rng: &mut GenRng,
        mask: Option<&[bool]>,
    ) -> Result<(), Contradiction> {
        // Already-resolved cells constrain their open neighbors from the
        // start; matters for partially pinned grids, a no-op on a fresh one.
        let mut queue: VecDeque<(usize, usize)> = grid
            .iter()
            .filter(|(_, _, cell)| cell.resolved.is_some())
            .map(|(x, y, _)| (x, y))
            .collect();
        self.propagate(grid, &mut queue, mask)?;

        while let Some((x, y)) = self.select_cell(grid, rng, mask) {
            self.collapse_cell(grid, rng, x, y);
            queue.push_back((x, y));
            self.propagate(grid, &mut queue, mask)?;
        }
        Ok(())
    }

    /// Minimum-entropy cell selection: smallest domain wins, ties broken by
    /// a rarity-weighted draw (cell weight = summed candidate rarities).
    fn select_cell(
        &self,
        grid: &Grid,
        rng: &mut GenRng,
        mask: Option<&[bool]>,
    ) -> Option<(usize, usize)> {
        let width = grid.width();
        let mut best = usize::MAX;
        let mut ties: Vec<(usize, usize)> = Vec::new();

        for (x, y, cell) in grid.iter() {
            if cell.resolved.is_some() {
                continue;
            }
            if let Some(mask) = mask {
                if !mask[y * width + x] {
                    continue;
                }
            }
            let entropy = cell.domain.len();
            if entropy < best {
                best = entropy;
                ties.clear();
                ties.push((x, y));
            } else if entropy == best {
                ties.push((x, y));
            }
        }

        match ties.len() {
            0 => None,
            1 => Some(ties[0]),
            _ => {
                let weights: Vec<u64> = ties
                    .iter()
                    .map(|&(x, y)| {
                        grid.get(x, y)
                            .domain
                            .iter()
                            .map(|id| self.catalog.kind(id).rarity as u64)
                            .sum()
                    })
                    .collect();
                Some(ties[rng.weighted_pick(&weights)])
            }
        }
    }

    /// Fix one cell to a rarity-weighted pick from its domain.
    fn collapse_cell(&self, grid: &mut Grid, rng: &mut GenRng, x: usize, y: usize) {
        let candidates: Vec<TileId> = grid.get(x, y).domain.iter().collect();
        let chosen = if candidates.len() == 1 {
            candidates[0]
        } else {
            let weights: Vec<u64> = candidates
                .iter()
                .map(|&id| self.catalog.kind(id).rarity as u64)
                .collect();
            candidates[rng.weighted_pick(&weights)]
        };
        grid.set_resolved(x, y, chosen);
    }

    /// Breadth-first propagation: each changed cell revises its neighbors,
    /// keeping only candidates supported by some candidate of the source.
    fn propagate(
        &self,
        grid: &mut Grid,
        queue: &mut VecDeque<(usize, usize)>,
        mask: Option<&[bool]>,
    ) -> Result<(), Contradiction> {
        let width = grid.width();
        while let Some((x, y)) = queue.pop_front() {
            let mut support = Domain::none();
            for s in grid.get(x, y).domain.iter() {
                support = support.union(self.compat[s.index()]);
            }

            for (nx, ny) in grid.neighbors(x, y) {
                if let Some(mask) = mask {
                    if !mask[ny * width + nx] {
                        continue;
                    }
                }
                let neighbor = grid.get_mut(nx, ny);
                if neighbor.resolved.is_some() {
                    continue;
                }
                let narrowed = neighbor.domain.intersect(support);
                if narrowed == neighbor.domain {
                    continue;
                }
                if narrowed.is_empty() {
                    return Err(Contradiction { x: nx, y: ny });
                }
                neighbor.domain = narrowed;
                if let Some(id) = narrowed.sole() {
                    neighbor.resolved = Some(id);
                }
                queue.push_back((nx, ny));
            }
        }
        Ok(())
    }
}
