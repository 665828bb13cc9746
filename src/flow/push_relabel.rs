//! Preflow-push grid max-flow ("GRD-PRF", "GRD-PRH").
//!
//! A single engine covers both selector symbols; they differ only in which
//! active node is discharged next (FIFO queue vs highest-level buckets).
//! Terminals are implicit: source arcs are saturated up front, sink arcs are
//! per-node residuals, and heights start from a BFS labelling rooted at the
//! sink. The first phase alone determines the max-flow value and the cut, so
//! excess stranded at height >= n is parked instead of routed back to the
//! source.
//!
//! Unlike the Kohli engine this back-end keeps no state between solves; a
//! `compute` after new terminal capacities rebuilds the working arrays from
//! the stored capacities, which is the conformant non-recycling behaviour.

use std::collections::VecDeque;

use log::debug;

use crate::array::DenseArray;
use crate::error::Error;
use crate::math::{wide, Real};
use crate::nbhood::Neighbourhood;

use super::{GridMaxFlow, GridTopology, TerminalOrigin};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Discipline {
    Fifo,
    HighestLevel,
}

/// Grid push-relabel solver.
pub struct PushRelabel<T, const N: usize> {
    discipline: Discipline,
    topo: GridTopology<N>,
    cap_edge: Vec<T>,
    cap_src: Vec<T>,
    cap_snk: Vec<T>,
    // Working state, rebuilt by every compute.
    res: Vec<T>,
    res_snk: Vec<T>,
    excess: Vec<T>,
    height: Vec<u32>,
    cur: Vec<u32>,
    in_queue: Vec<bool>,
    sink_side: Vec<bool>,
    computed: bool,
}

impl<T: Real, const N: usize> PushRelabel<T, N> {
    pub fn fifo() -> Self {
        Self::with_discipline(Discipline::Fifo)
    }

    pub fn highest_level() -> Self {
        Self::with_discipline(Discipline::HighestLevel)
    }

    fn with_discipline(discipline: Discipline) -> Self {
        Self {
            discipline,
            topo: GridTopology::default(),
            cap_edge: Vec::new(),
            cap_src: Vec::new(),
            cap_snk: Vec::new(),
            res: Vec::new(),
            res_snk: Vec::new(),
            excess: Vec::new(),
            height: Vec::new(),
            cur: Vec::new(),
            in_queue: Vec::new(),
            sink_side: Vec::new(),
            computed: false,
        }
    }

    fn reset(
        &mut self,
        shape: [usize; N],
        nb: &Neighbourhood<N>,
        mask: Option<&DenseArray<u8, N>>,
    ) -> Result<(), Error> {
        self.topo.build(shape, nb, mask)?;
        let nodes = self.topo.nodes;
        fill(&mut self.cap_edge, nodes * self.topo.ndirs, T::zero());
        fill(&mut self.cap_src, nodes, T::zero());
        fill(&mut self.cap_snk, nodes, T::zero());
        self.computed = false;
        Ok(())
    }

    /// BFS height labelling rooted at the sink over the full capacities.
    fn global_relabel(&mut self, n: u32) {
        let nd = self.topo.ndirs;
        fill(&mut self.height, self.topo.nodes, n);
        let mut queue = VecDeque::new();
        for v in 0..self.topo.nodes {
            if !self.topo.excluded[v] && self.cap_snk[v] > T::zero() {
                self.height[v] = 1;
                queue.push_back(v);
            }
        }
        while let Some(u) = queue.pop_front() {
            let h = self.height[u];
            for i in 0..nd {
                if !self.topo.edge_ok[self.topo.edge(u, i)] {
                    continue;
                }
                // Arc w -> u seen from u through the opposite direction.
                let w = self.topo.neighbour(u, i);
                if self.height[w] == n && self.cap_edge[w * nd + (i ^ 1)] > T::zero() {
                    self.height[w] = h + 1;
                    queue.push_back(w);
                }
            }
        }
    }

    /// Discharges `u` until its excess is gone or it parks at height >= n.
    fn discharge(
        &mut self,
        u: usize,
        n: u32,
        activated: &mut impl FnMut(&mut Vec<bool>, usize, u32),
    ) {
        let nd = self.topo.ndirs;
        while self.excess[u] > T::zero() && self.height[u] < n {
            let arc = self.cur[u];
            if arc == 0 {
                // Sink arc.
                if self.res_snk[u] > T::zero() && self.height[u] == 1 {
                    let d = self.excess[u].min(self.res_snk[u]);
                    self.res_snk[u] -= d;
                    self.excess[u] -= d;
                    continue;
                }
                self.cur[u] = 1;
                continue;
            }
            if (arc as usize) <= nd {
                let i = arc as usize - 1;
                let e = self.topo.edge(u, i);
                if self.topo.edge_ok[e] && self.res[e] > T::zero() {
                    let w = self.topo.neighbour(u, i);
                    if self.height[u] == self.height[w] + 1 {
                        let d = self.excess[u].min(self.res[e]);
                        self.res[e] -= d;
                        self.res[w * nd + (i ^ 1)] += d;
                        self.excess[u] -= d;
                        let had_none = self.excess[w] == T::zero();
                        self.excess[w] += d;
                        if had_none && self.height[w] < n {
                            activated(&mut self.in_queue, w, self.height[w]);
                        }
                        continue;
                    }
                }
                self.cur[u] = arc + 1;
                continue;
            }
            // All arcs tried: relabel to one above the lowest residual
            // target, or park when nothing is left.
            let mut lift = n;
            if self.res_snk[u] > T::zero() {
                lift = 1;
            }
            for i in 0..nd {
                let e = self.topo.edge(u, i);
                if self.topo.edge_ok[e] && self.res[e] > T::zero() {
                    let w = self.topo.neighbour(u, i);
                    lift = lift.min(self.height[w] + 1);
                }
            }
            self.height[u] = lift.max(self.height[u] + 1).min(n);
            self.cur[u] = 0;
        }
    }

    /// Nodes with a residual path to the sink after the preflow phase.
    fn mark_sink_side(&mut self) {
        let nd = self.topo.ndirs;
        fill(&mut self.sink_side, self.topo.nodes, false);
        let mut queue = VecDeque::new();
        for v in 0..self.topo.nodes {
            if !self.topo.excluded[v] && self.res_snk[v] > T::zero() {
                self.sink_side[v] = true;
                queue.push_back(v);
            }
        }
        while let Some(u) = queue.pop_front() {
            for i in 0..nd {
                if !self.topo.edge_ok[self.topo.edge(u, i)] {
                    continue;
                }
                let w = self.topo.neighbour(u, i);
                if !self.sink_side[w] && self.res[w * nd + (i ^ 1)] > T::zero() {
                    self.sink_side[w] = true;
                    queue.push_back(w);
                }
            }
        }
    }
}

impl<T: Real, const N: usize> GridMaxFlow<T, N> for PushRelabel<T, N> {
    fn init(&mut self, shape: [usize; N], nb: &Neighbourhood<N>) -> Result<(), Error> {
        self.reset(shape, nb, None)
    }

    fn init_masked(
        &mut self,
        shape: [usize; N],
        nb: &Neighbourhood<N>,
        mask: &DenseArray<u8, N>,
    ) -> Result<(), Error> {
        self.reset(shape, nb, Some(mask))
    }

    fn set_terminal_caps(&mut self, node: usize, cap_src: T, cap_snk: T) {
        debug_assert!(cap_src >= T::zero() && cap_snk >= T::zero());
        if self.topo.excluded[node] {
            return;
        }
        self.cap_src[node] = cap_src;
        self.cap_snk[node] = cap_snk;
    }

    fn set_edge_cap(&mut self, node: usize, dir: usize, cap: T) {
        debug_assert!(cap >= T::zero());
        let e = self.topo.edge(node, dir);
        if self.topo.edge_ok[e] {
            self.cap_edge[e] = cap;
        }
    }

    fn compute(&mut self) -> Result<T, Error> {
        let nodes = self.topo.nodes;
        if nodes == 0 {
            return Err(Error::InvalidArgument(
                "max-flow computed before init".to_string(),
            ));
        }
        let n = (nodes + 2) as u32;

        self.res.clear();
        self.res.extend_from_slice(&self.cap_edge);
        self.res_snk.clear();
        self.res_snk.extend_from_slice(&self.cap_snk);
        fill(&mut self.cur, nodes, 0);
        fill(&mut self.in_queue, nodes, false);
        self.global_relabel(n);

        // Saturate the source arcs.
        self.excess.clear();
        self.excess.extend_from_slice(&self.cap_src);
        for v in 0..nodes {
            if self.topo.excluded[v] {
                self.excess[v] = T::zero();
            }
        }

        match self.discipline {
            Discipline::Fifo => {
                let mut queue: VecDeque<usize> = VecDeque::new();
                for v in 0..nodes {
                    if self.excess[v] > T::zero() && self.height[v] < n {
                        self.in_queue[v] = true;
                        queue.push_back(v);
                    }
                }
                while let Some(u) = queue.pop_front() {
                    self.in_queue[u] = false;
                    self.discharge(u, n, &mut |in_queue, w, _h| {
                        if !in_queue[w] {
                            in_queue[w] = true;
                            queue.push_back(w);
                        }
                    });
                }
            }
            Discipline::HighestLevel => {
                let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); n as usize + 1];
                let mut top = 0usize;
                for v in 0..nodes {
                    if self.excess[v] > T::zero() && self.height[v] < n {
                        let h = self.height[v] as usize;
                        self.in_queue[v] = true;
                        buckets[h].push(v);
                        top = top.max(h);
                    }
                }
                loop {
                    while top > 0 && buckets[top].is_empty() {
                        top -= 1;
                    }
                    let Some(u) = buckets[top].pop() else {
                        break;
                    };
                    self.in_queue[u] = false;
                    let mut new_top = top;
                    self.discharge(u, n, &mut |in_queue, w, h| {
                        if !in_queue[w] {
                            in_queue[w] = true;
                            buckets[h as usize].push(w);
                            new_top = new_top.max(h as usize);
                        }
                    });
                    top = new_top;
                }
            }
        }

        self.mark_sink_side();
        self.computed = true;

        let mut flow = T::zero();
        for v in 0..nodes {
            flow += self.cap_snk[v] - self.res_snk[v];
        }
        debug!("push-relabel done: flow={:.6}", wide(flow));
        Ok(flow)
    }

    fn origin(&self, node: usize) -> TerminalOrigin {
        if self.topo.excluded[node] {
            return TerminalOrigin::Free;
        }
        if self.computed && self.sink_side[node] {
            TerminalOrigin::Sink
        } else {
            TerminalOrigin::Source
        }
    }
}

fn fill<V: Clone>(buf: &mut Vec<V>, len: usize, value: V) {
    buf.clear();
    buf.resize(len, value);
}
