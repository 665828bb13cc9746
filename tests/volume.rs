mod common;

use common::synthetic::single_voxel;
use gridcut::nbhood::{metric, Neighbourhood};
use gridcut::prelude::*;

#[test]
fn lone_bright_voxel_is_the_whole_foreground() {
    let img = single_voxel(4, [2, 2, 2]);
    let opts = ChanVeseOptions {
        lambda1: 100.0,
        lambda2: 100.0,
        mu: 0.1,
        convergence: 1e-6,
        max_iter: 10,
        neighbourhood: "N6".to_string(),
        ..ChanVeseOptions::default()
    };
    let out = chanvese::segment(&img, &opts).unwrap();

    for v in 0..out.labels.len() {
        let expected = (out.labels.coords(v) == [2, 2, 2]) as u8;
        assert_eq!(out.labels[v], expected, "voxel {:?}", out.labels.coords(v));
    }
    assert!(out.c1.abs() < 1e-9);
    assert!((out.c2 - 1.0).abs() < 1e-9);
}

#[test]
fn dense_neighbourhoods_solve_volumes() {
    let img = single_voxel(4, [1, 2, 1]);
    for nb in ["N18", "N26"] {
        let opts = ChanVeseOptions {
            lambda1: 100.0,
            lambda2: 100.0,
            mu: 0.05,
            convergence: 1e-6,
            max_iter: 10,
            neighbourhood: nb.to_string(),
            ..ChanVeseOptions::default()
        };
        let out = chanvese::segment(&img, &opts).unwrap();
        assert_eq!(*out.labels.get([1, 2, 1]), 1, "{nb}");
        assert_eq!(*out.labels.get([3, 3, 3]), 0, "{nb}");
    }
}

#[test]
fn volume_weights_tile_the_sphere() {
    for sym in ["N6", "N18", "N26", "N98"] {
        let nb = Neighbourhood::<3>::from_symbol(sym).unwrap();
        let w: Vec<f64> = metric::cauchy_crofton(&nb).unwrap();
        assert_eq!(w.len(), nb.len());
        assert!(w.iter().all(|&x| x > 0.0), "{sym}");
        for i in (0..nb.len()).step_by(2) {
            assert!((w[i] - w[i + 1]).abs() < 1e-9, "{sym} direction {i}");
        }
    }
}

#[test]
fn anisotropic_spacing_shifts_the_cut_cost() {
    // Stretching the slice axis makes cuts across it cheaper per voxel
    // boundary than cuts along it, relative to the isotropic table.
    let nb = Neighbourhood::<3>::from_symbol("N6").unwrap();
    let iso: Vec<f64> = metric::cauchy_crofton(&nb).unwrap();
    let aniso: Vec<f64> = metric::anisotropic(&nb, [2.0, 1.0, 1.0]).unwrap();
    let along = nb.offsets().iter().position(|&d| d == [1, 0, 0]).unwrap();
    let across = nb.offsets().iter().position(|&d| d == [0, 0, 1]).unwrap();
    let iso_ratio = iso[along] / iso[across];
    let aniso_ratio = aniso[along] / aniso[across];
    assert!(
        aniso_ratio < iso_ratio,
        "stretched axis should get relatively cheaper: {aniso_ratio} vs {iso_ratio}"
    );
}
