//! Randomized 3-coloring search
//!
//! Each round colors every node uniformly at random with one of three colors
//! and proposes the monochromatic edges as the removal set.
//!
//! A candidate is dropped if it does not fit in a [`Solution`], or if it
//! removes as many edges as the graph has node ids (highest id + 1).

use crate::solution::{Edge, Solution};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of colors
pub const COLORS: u8 = 3;

/// Generate-and-filter search over random colorings
pub struct ColoringSearch<R> {
    edges: Vec<Edge>,
    /// Dense node indices of each edge's endpoints
    endpoints: Vec<(usize, usize)>,
    colors: Vec<u8>,
    /// Highest node id + 1
    id_span: u64,
    rng: R,
}

impl ColoringSearch<StdRng> {
    /// Search seeded from the operating system
    pub fn from_entropy(edges: Vec<Edge>) -> Self {
        Self::new(edges, StdRng::from_entropy())
    }
}

impl<R: Rng> ColoringSearch<R> {
    pub fn new(edges: Vec<Edge>, rng: R) -> Self {
        let mut nodes: Vec<u32> = edges.iter().flat_map(|e| [e.u, e.v]).collect();
        nodes.sort_unstable();
        nodes.dedup();

        let index = |id: u32| nodes.binary_search(&id).unwrap_or_else(|i| i);
        let endpoints = edges.iter().map(|e| (index(e.u), index(e.v))).collect();
        let id_span = nodes.last().map_or(0, |&max| u64::from(max) + 1);

        Self {
            edges,
            endpoints,
            colors: vec![0; nodes.len()],
            id_span,
            rng,
        }
    }

    /// Number of distinct nodes in the graph
    pub fn node_count(&self) -> usize {
        self.colors.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Color the graph once and return the conflicting edges, in input
    /// order. `None` if the candidate is dropped.
    pub fn next_candidate(&mut self) -> Option<Solution> {
        for color in self.colors.iter_mut() {
            *color = self.rng.gen_range(0..COLORS);
        }

        let mut solution = Solution::EMPTY;
        for (edge, &(a, b)) in self.edges.iter().zip(&self.endpoints) {
            if self.colors[a] == self.colors[b] && !solution.push(*edge) {
                return None;
            }
        }
        if solution.len() as u64 == self.id_span {
            return None;
        }
        Some(solution)
    }
}
