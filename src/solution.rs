//! Candidate solutions: small, fixed-size edge sets
//!
//! A [`Solution`] is laid out `#[repr(C)]` and is `Copy`, so it can be stored
//! in a shared memory slot with a single plain copy.

use crate::error::ParseEdgeError;
use std::fmt;
use std::str::FromStr;

/// Maximum number of edges a solution can carry
pub const MAX_EDGES: usize = 8;

/// An undirected edge between two node ids
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Edge {
    pub u: u32,
    pub v: u32,
}

impl Edge {
    pub const fn new(u: u32, v: u32) -> Self {
        Self { u, v }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.u, self.v)
    }
}

impl FromStr for Edge {
    type Err = ParseEdgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (u, v) = s
            .split_once('-')
            .ok_or_else(|| ParseEdgeError::Format(s.to_string()))?;
        Ok(Edge::new(node_id(u, s)?, node_id(v, s)?))
    }
}

fn node_id(part: &str, token: &str) -> Result<u32, ParseEdgeError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseEdgeError::Format(token.to_string()));
    }
    part.parse()
        .map_err(|_| ParseEdgeError::Overflow(token.to_string()))
}

/// A set of at most [`MAX_EDGES`] edges proposed for removal
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Solution {
    edges: [Edge; MAX_EDGES],
    len: u32,
}

impl Solution {
    /// The zero-edge solution: the graph is already 3-colorable.
    pub const EMPTY: Solution = Solution {
        edges: [Edge::new(0, 0); MAX_EDGES],
        len: 0,
    };

    /// Append an edge. Returns `false` if the solution is full.
    pub fn push(&mut self, edge: Edge) -> bool {
        let len = self.len();
        if len == MAX_EDGES {
            return false;
        }
        self.edges[len] = edge;
        self.len += 1;
        true
    }

    /// Build a solution from `edges`, or `None` if there are too many.
    pub fn from_edges(edges: &[Edge]) -> Option<Self> {
        if edges.len() > MAX_EDGES {
            return None;
        }
        let mut solution = Self::EMPTY;
        solution.edges[..edges.len()].copy_from_slice(edges);
        solution.len = edges.len() as u32;
        Some(solution)
    }

    /// Number of valid edges. Clamped so a corrupted slot cannot index out of
    /// bounds.
    #[inline]
    pub fn len(&self) -> usize {
        (self.len as usize).min(MAX_EDGES)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The zero-edge optimum.
    #[inline]
    pub fn is_optimal(&self) -> bool {
        self.is_empty()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges[..self.len()]
    }
}

impl Default for Solution {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl PartialEq for Solution {
    fn eq(&self, other: &Self) -> bool {
        self.edges() == other.edges()
    }
}

impl Eq for Solution {}

impl fmt::Debug for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.edges()).finish()
    }
}

/// Renders `(a-b) (c-d) ...`
impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, edge) in self.edges().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "({})", edge)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_edge_tokens() {
        assert_eq!("0-1".parse::<Edge>(), Ok(Edge::new(0, 1)));
        assert_eq!("12-345".parse::<Edge>(), Ok(Edge::new(12, 345)));
        assert_eq!("7-7".parse::<Edge>(), Ok(Edge::new(7, 7)));
    }

    #[test]
    fn rejects_malformed_tokens() {
        for bad in ["", "1", "1-", "-1", "a-b", "1-2-3", "-1-2", "1 -2", "+1-2", "1-2x", "x1-2"] {
            assert_eq!(
                bad.parse::<Edge>(),
                Err(ParseEdgeError::Format(bad.to_string())),
                "token {bad:?}"
            );
        }
        assert_eq!(
            "99999999999-1".parse::<Edge>(),
            Err(ParseEdgeError::Overflow("99999999999-1".to_string()))
        );
    }

    #[test]
    fn push_respects_capacity() {
        let mut s = Solution::EMPTY;
        for i in 0..MAX_EDGES as u32 {
            assert!(s.push(Edge::new(i, i + 1)));
        }
        assert!(!s.push(Edge::new(100, 101)));
        assert_eq!(s.len(), MAX_EDGES);
        assert!(Solution::from_edges(&[Edge::default(); MAX_EDGES + 1]).is_none());
    }

    #[test]
    fn displays_edges_in_parentheses() {
        let s = Solution::from_edges(&[Edge::new(0, 1), Edge::new(2, 3)]).unwrap();
        assert_eq!(s.to_string(), "(0-1) (2-3)");
        assert_eq!(Solution::EMPTY.to_string(), "");
        assert!(Solution::EMPTY.is_optimal());
        assert!(!s.is_optimal());
    }

    #[test]
    fn equality_ignores_unused_slots() {
        let mut a = Solution::EMPTY;
        a.push(Edge::new(1, 2));
        let mut b = Solution::from_edges(&[Edge::new(1, 2), Edge::new(5, 6)]).unwrap();
        b.len = 1;
        assert_eq!(a, b);
    }
}
