mod common;

use common::synthetic::Lcg;
use gridcut::flow::{self, GridMaxFlow, TerminalOrigin};
use gridcut::nbhood::Neighbourhood;

/// Deterministic pseudo-random capacity for an edge, keyed by the actual
/// displacement vector so relabelled direction indices see the same graph.
fn edge_cap(v: usize, d: [isize; 2]) -> f64 {
    let h = (v as u64)
        .wrapping_mul(31)
        .wrapping_add(((d[0] + 3) * 11 + (d[1] + 3)) as u64)
        .wrapping_mul(2654435761);
    0.05 + (h % 997) as f64 / 997.0
}

fn load_graph(
    mf: &mut dyn GridMaxFlow<f64, 2>,
    nb: &Neighbourhood<2>,
    shape: [usize; 2],
    terminals: &[(f64, f64)],
) {
    mf.init(shape, nb).unwrap();
    let [h, w] = shape;
    for v in 0..h * w {
        mf.set_terminal_caps(v, terminals[v].0, terminals[v].1);
        let (r, c) = (v / w, v % w);
        for (i, &d) in nb.offsets().iter().enumerate() {
            let nr = r as isize + d[0];
            let nc = c as isize + d[1];
            if nr >= 0 && (nr as usize) < h && nc >= 0 && (nc as usize) < w {
                mf.set_edge_cap(v, i, edge_cap(v, d));
            }
        }
    }
}

/// Capacity of the cut induced by a source-side indicator.
fn cut_value(
    src_side: &[bool],
    nb: &Neighbourhood<2>,
    shape: [usize; 2],
    terminals: &[(f64, f64)],
) -> f64 {
    let [h, w] = shape;
    let mut total = 0.0;
    for v in 0..h * w {
        if src_side[v] {
            total += terminals[v].1;
        } else {
            total += terminals[v].0;
        }
        let (r, c) = (v / w, v % w);
        for &d in nb.offsets() {
            let nr = r as isize + d[0];
            let nc = c as isize + d[1];
            if nr >= 0 && (nr as usize) < h && nc >= 0 && (nc as usize) < w {
                let u = nr as usize * w + nc as usize;
                if src_side[v] && !src_side[u] {
                    total += edge_cap(v, d);
                }
            }
        }
    }
    total
}

fn random_terminals(nodes: usize, seed: u64) -> Vec<(f64, f64)> {
    let mut rng = Lcg::new(seed);
    (0..nodes)
        .map(|_| {
            let cs = 2.0 * (rng.next_u32() as f64 / u32::MAX as f64);
            let ct = 2.0 * (rng.next_u32() as f64 / u32::MAX as f64);
            (cs, ct)
        })
        .collect()
}

#[test]
fn all_solvers_agree_on_a_random_grid() {
    let nb = Neighbourhood::<2>::from_symbol("N8").unwrap();
    let shape = [6, 6];
    let terminals = random_terminals(36, 42);

    let mut flows = Vec::new();
    let mut cuts: Vec<Vec<bool>> = Vec::new();
    for sym in ["GRD-KO", "GRD-PRF", "GRD-PRH"] {
        let mut mf = flow::create::<f64, 2>(sym).unwrap();
        load_graph(mf.as_mut(), &nb, shape, &terminals);
        flows.push((sym, mf.compute().unwrap()));
        cuts.push(
            (0..36)
                .map(|v| mf.origin(v) != TerminalOrigin::Sink)
                .collect(),
        );
    }
    let reference = flows[0].1;
    for (sym, f) in &flows {
        assert!(
            (f - reference).abs() < 1e-9,
            "{sym}: flow {f} vs {reference}"
        );
    }
    // Every solver's cut must be minimal: its capacity equals the flow.
    // (The partitions themselves may differ when minima tie.)
    for (cut, (sym, f)) in cuts.iter().zip(&flows) {
        let value = cut_value(cut, &nb, shape, &terminals);
        assert!(
            (value - f).abs() < 1e-9,
            "{sym}: cut value {value} vs flow {f}"
        );
    }
}

#[test]
fn swapping_paired_directions_does_not_change_the_cut() {
    let base = Neighbourhood::<2>::from_symbol("N4").unwrap();
    // The same offset system with the roles of d and -d exchanged in every
    // pair.
    let swapped_offsets: Vec<[isize; 2]> = (0..base.len())
        .map(|i| base.offset(i ^ 1))
        .collect();
    let swapped = Neighbourhood::from_offsets(swapped_offsets).unwrap();

    let shape = [5, 7];
    let terminals = random_terminals(35, 7);

    let mut outcomes = Vec::new();
    for nb in [&base, &swapped] {
        let mut mf = flow::create::<f64, 2>("GRD-KO").unwrap();
        load_graph(mf.as_mut(), nb, shape, &terminals);
        let flow_value = mf.compute().unwrap();
        let cut: Vec<bool> = (0..35)
            .map(|v| mf.origin(v) != TerminalOrigin::Sink)
            .collect();
        // Both runs describe the same graph, so both cuts must be minimal
        // for it; evaluate each against the unswapped offsets.
        let value = cut_value(&cut, &base, shape, &terminals);
        outcomes.push((flow_value, value));
    }
    assert!((outcomes[0].0 - outcomes[1].0).abs() < 1e-9);
    assert!((outcomes[0].1 - outcomes[0].0).abs() < 1e-9);
    assert!((outcomes[1].1 - outcomes[1].0).abs() < 1e-9);
}

#[test]
fn warm_restart_tracks_cold_solves_across_updates() {
    let nb = Neighbourhood::<2>::from_symbol("N4").unwrap();
    let shape = [5, 5];

    let mut warm = flow::create::<f64, 2>("GRD-KO").unwrap();
    load_graph(warm.as_mut(), &nb, shape, &random_terminals(25, 1));
    warm.compute().unwrap();

    for round in 2..6u64 {
        let terminals = random_terminals(25, round);
        for (v, &(cs, ct)) in terminals.iter().enumerate() {
            warm.set_terminal_caps(v, cs, ct);
        }
        let dynamic = warm.compute().unwrap();

        let mut cold = flow::create::<f64, 2>("GRD-KO").unwrap();
        load_graph(cold.as_mut(), &nb, shape, &terminals);
        let rebuilt = cold.compute().unwrap();
        assert!(
            (dynamic - rebuilt).abs() < 1e-9,
            "round {round}: dynamic {dynamic} vs rebuilt {rebuilt}"
        );
    }
}
