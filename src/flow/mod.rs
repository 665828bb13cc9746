//! Grid max-flow solvers.
//!
//! Overview
//! - Each voxel is a node; edges follow a fixed [`Neighbourhood`] offset
//!   table, so no adjacency lists are stored. The forward residual of
//!   direction `i` at node `v` lives at `v * ndirs + i`; the reverse edge is
//!   the opposite direction at the neighbour, reachable through the pairing
//!   invariant (`i ^ 1`).
//! - Terminal capacities are folded into a signed excess per node;
//!   `min(cap_src, cap_snk)` is pushed trivially and accumulated in the flow
//!   base, so recycled and rebuilt runs report identical flow values.
//! - Masked nodes are excluded from traversal; edges toward them are pruned.
//!
//! Back-ends
//! - [`kohli::Kohli`] ("GRD-KO"): Boykov-Kolmogorov augmenting paths with
//!   Kohli-style search-tree recycling across terminal-capacity updates.
//! - [`push_relabel::PushRelabel`] ("GRD-PRF", "GRD-PRH"): preflow-push with
//!   FIFO or highest-level node selection.
//!
//! Drivers talk to solvers through the object-safe [`GridMaxFlow`] trait and
//! pick an implementation by symbol via [`create`].

pub mod kohli;
pub mod push_relabel;

use crate::array::DenseArray;
use crate::error::Error;
use crate::math::Real;
use crate::nbhood::Neighbourhood;
use crate::types::MASK_UNKNOWN;

/// Side of the minimum cut a node ends up on.
///
/// `Free` nodes are reachable from neither terminal; drivers treat them as
/// source side (`origin != Sink`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalOrigin {
    Source,
    Sink,
    Free,
}

/// Capability set every grid max-flow back-end provides.
///
/// Lifecycle: `init` (or `init_masked`), then `set_edge_cap` for the
/// neighbour residuals, then one or more rounds of `set_terminal_caps`
/// followed by `compute`. Between rounds only terminal capacities may
/// change; back-ends may recycle internal state across rounds.
pub trait GridMaxFlow<T: Real, const N: usize> {
    /// Allocates or resets solver state for a grid of `shape` connected by
    /// `nb`. All capacities start at zero.
    fn init(&mut self, shape: [usize; N], nb: &Neighbourhood<N>) -> Result<(), Error>;

    /// Like [`GridMaxFlow::init`], but nodes whose mask value is not
    /// [`MASK_UNKNOWN`] are excluded from the graph.
    fn init_masked(
        &mut self,
        shape: [usize; N],
        nb: &Neighbourhood<N>,
        mask: &DenseArray<u8, N>,
    ) -> Result<(), Error>;

    /// Sets the source/sink capacities of a node. May be called again after
    /// `compute` to run a warm-started solve.
    fn set_terminal_caps(&mut self, node: usize, cap_src: T, cap_snk: T);

    /// Sets the forward residual of `(node, dir)`. Calls on pruned edges are
    /// ignored.
    fn set_edge_cap(&mut self, node: usize, dir: usize, cap: T);

    /// Runs the solver to completion and returns the maximum flow.
    fn compute(&mut self) -> Result<T, Error>;

    /// Cut side of a node after `compute`.
    fn origin(&self, node: usize) -> TerminalOrigin;

    /// Hint consumed by topology-preserving back-ends; ignored by default.
    fn set_initial_labelling(&mut self, _labels: &DenseArray<u8, N>) {}
}

/// Creates a grid solver from its selector symbol.
///
/// Supported: `"GRD-KO"`, `"GRD-PRF"`, `"GRD-PRH"`. General-graph selectors
/// (`"GEN-..."`) are recognized but rejected with a dedicated message.
pub fn create<T: Real, const N: usize>(
    symbol: &str,
) -> Result<Box<dyn GridMaxFlow<T, N>>, Error> {
    match symbol {
        "GRD-KO" => Ok(Box::new(kohli::Kohli::new())),
        "GRD-PRF" => Ok(Box::new(push_relabel::PushRelabel::fifo())),
        "GRD-PRH" => Ok(Box::new(push_relabel::PushRelabel::highest_level())),
        other => Err(Error::UnknownSolver(other.to_string())),
    }
}

/// Precomputed grid connectivity shared by the back-ends: linear direction
/// offsets, per-edge validity and node exclusion.
#[derive(Clone, Debug)]
pub(crate) struct GridTopology<const N: usize> {
    pub shape: [usize; N],
    pub nodes: usize,
    pub ndirs: usize,
    /// Signed linear displacement per direction.
    pub dir_off: Vec<isize>,
    /// `nodes * ndirs` flags: in bounds and neither endpoint excluded.
    pub edge_ok: Vec<bool>,
    /// Mask-excluded nodes; empty when no mask was supplied.
    pub excluded: Vec<bool>,
}

impl<const N: usize> Default for GridTopology<N> {
    fn default() -> Self {
        Self {
            shape: [0usize; N],
            nodes: 0,
            ndirs: 0,
            dir_off: Vec::new(),
            edge_ok: Vec::new(),
            excluded: Vec::new(),
        }
    }
}

impl<const N: usize> GridTopology<N> {
    pub fn build(
        &mut self,
        shape: [usize; N],
        nb: &Neighbourhood<N>,
        mask: Option<&DenseArray<u8, N>>,
    ) -> Result<(), Error> {
        if !nb.is_paired() {
            return Err(Error::InvalidArgument(
                "neighbourhood must be closed under negation with (d, -d) pairs".to_string(),
            ));
        }
        if let Some(m) = mask {
            if m.shape() != shape {
                return Err(Error::InvalidArgument(format!(
                    "mask shape {:?} does not match grid shape {:?}",
                    m.shape(),
                    shape
                )));
            }
        }

        let nodes: usize = shape.iter().product();
        let ndirs = nb.len();
        let strides = crate::array::strides_for(shape);

        self.shape = shape;
        self.nodes = nodes;
        self.ndirs = ndirs;
        self.dir_off.clear();
        for &d in nb.offsets() {
            let mut off = 0isize;
            for a in 0..N {
                off += d[a] * strides[a] as isize;
            }
            self.dir_off.push(off);
        }

        self.excluded.clear();
        match mask {
            Some(m) => self
                .excluded
                .extend(m.as_slice().iter().map(|&v| v != MASK_UNKNOWN)),
            None => self.excluded.resize(nodes, false),
        }

        self.edge_ok.clear();
        self.edge_ok.resize(nodes * ndirs, false);
        let mut coords = [0usize; N];
        for v in 0..nodes {
            if !self.excluded[v] {
                for (i, &d) in nb.offsets().iter().enumerate() {
                    if let Some(w) = in_bounds(shape, coords, d) {
                        if !self.excluded[w] {
                            self.edge_ok[v * ndirs + i] = true;
                        }
                    }
                }
            }
            advance(&mut coords, shape);
        }
        Ok(())
    }

    /// Neighbour of `v` through direction `i`. Only meaningful when the edge
    /// is valid.
    #[inline]
    pub fn neighbour(&self, v: usize, i: usize) -> usize {
        (v as isize + self.dir_off[i]) as usize
    }

    #[inline]
    pub fn edge(&self, v: usize, i: usize) -> usize {
        v * self.ndirs + i
    }
}

/// Linear index of `coords + d`, or `None` when any axis leaves the grid.
#[inline]
fn in_bounds<const N: usize>(
    shape: [usize; N],
    coords: [usize; N],
    d: [isize; N],
) -> Option<usize> {
    let strides = crate::array::strides_for(shape);
    let mut idx = 0usize;
    for a in 0..N {
        let x = coords[a] as isize + d[a];
        if x < 0 || x as usize >= shape[a] {
            return None;
        }
        idx += x as usize * strides[a];
    }
    Some(idx)
}

/// Odometer-style coordinate increment matching linear iteration order.
#[inline]
fn advance<const N: usize>(coords: &mut [usize; N], shape: [usize; N]) {
    for a in (0..N).rev() {
        coords[a] += 1;
        if coords[a] < shape[a] {
            return;
        }
        coords[a] = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_marks_border_edges_invalid() {
        let nb = Neighbourhood::<2>::from_symbol("N4").unwrap();
        let mut topo = GridTopology::<2>::default();
        topo.build([2, 3], &nb, None).unwrap();
        assert_eq!(topo.nodes, 6);
        assert_eq!(topo.ndirs, 4);

        // Node (0, 0): +col and +row valid, -col and -row out of bounds.
        let dirs: Vec<[isize; 2]> = nb.offsets().to_vec();
        for (i, d) in dirs.iter().enumerate() {
            let expect = d == &[0, 1] || d == &[1, 0];
            assert_eq!(topo.edge_ok[topo.edge(0, i)], expect, "dir {d:?}");
        }
        // Node (0, 1) can move along the column axis both ways and down.
        let v = 1;
        for (i, d) in dirs.iter().enumerate() {
            let r = d[0];
            let c = 1 + d[1];
            let expect = r >= 0 && r < 2 && c >= 0 && c < 3;
            assert_eq!(topo.edge_ok[topo.edge(v, i)], expect, "dir {d:?}");
        }
    }

    #[test]
    fn masked_nodes_prune_their_edges() {
        let nb = Neighbourhood::<2>::from_symbol("N4").unwrap();
        let mut mask = DenseArray::<u8, 2>::filled([1, 3], MASK_UNKNOWN);
        mask[1] = crate::types::MASK_FOREGROUND_FIXED;
        let mut topo = GridTopology::<2>::default();
        topo.build([1, 3], &nb, Some(&mask)).unwrap();

        assert!(topo.excluded[1]);
        // No edge may point into or out of the excluded middle node.
        for i in 0..topo.ndirs {
            assert!(!topo.edge_ok[topo.edge(1, i)]);
        }
        let to_middle = nb.offsets().iter().position(|&d| d == [0, 1]).unwrap();
        assert!(!topo.edge_ok[topo.edge(0, to_middle)]);
        let back = nb.offsets().iter().position(|&d| d == [0, -1]).unwrap();
        assert!(!topo.edge_ok[topo.edge(2, back)]);
    }

    #[test]
    fn factory_symbols() {
        assert!(create::<f64, 2>("GRD-KO").is_ok());
        assert!(create::<f64, 2>("GRD-PRF").is_ok());
        assert!(create::<f64, 2>("GRD-PRH").is_ok());
        let err = create::<f64, 2>("GEN-BK").err().unwrap();
        assert!(err.to_string().contains("general-graph"));
        assert!(create::<f64, 2>("nope").is_err());
    }
}
