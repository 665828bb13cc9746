//! Voronoi partition of the unit (N-1)-sphere over a direction set.
//!
//! The Cauchy-Crofton weights need the solid-angle share of every direction.
//! In 2-D the partition is exact: sort the directions by angle and give each
//! one half of the gap to its angular neighbours. In 3-D the cells of a
//! spherical Voronoi diagram are approximated by assigning a deterministic
//! Fibonacci lattice of sample points to their nearest direction; the share
//! of samples times 4 pi converges to the cell area and the partition sums to
//! the full sphere measure by construction.

use rayon::prelude::*;

use crate::error::Error;

/// Samples used for the 3-D partition. Cells of the densest supported system
/// (N98) still collect thousands of samples each.
const SPHERE_SAMPLES: usize = 400_000;

/// Solid-angle share of each direction on the unit (N-1)-sphere.
///
/// Directions must be normalized and pairwise distinct. The shares sum to
/// `2 pi` (N = 2) or `4 pi` (N = 3).
pub fn partition<const N: usize>(dirs: &[[f64; N]]) -> Result<Vec<f64>, Error> {
    match N {
        2 => {
            let d2: Vec<[f64; 2]> = dirs.iter().map(|d| [d[0], d[1]]).collect();
            Ok(circle_partition(&d2))
        }
        3 => {
            let d3: Vec<[f64; 3]> = dirs.iter().map(|d| [d[0], d[1], d[2]]).collect();
            Ok(sphere_partition(&d3))
        }
        _ => Err(Error::InvalidArgument(format!(
            "hypersphere partition supports 2-D and 3-D direction sets, got {N}-D"
        ))),
    }
}

/// Exact circular Voronoi cells: half the angular gap on either side.
fn circle_partition(dirs: &[[f64; 2]]) -> Vec<f64> {
    let tau = 2.0 * std::f64::consts::PI;
    let mut order: Vec<usize> = (0..dirs.len()).collect();
    let angle = |i: usize| -> f64 { dirs[i][1].atan2(dirs[i][0]).rem_euclid(tau) };
    order.sort_by(|&a, &b| angle(a).total_cmp(&angle(b)));

    let m = order.len();
    let mut shares = vec![0.0; dirs.len()];
    for k in 0..m {
        let here = angle(order[k]);
        let prev = angle(order[(k + m - 1) % m]);
        let next = angle(order[(k + 1) % m]);
        let gap_prev = (here - prev).rem_euclid(tau);
        let gap_next = (next - here).rem_euclid(tau);
        shares[order[k]] = 0.5 * (gap_prev + gap_next);
    }
    shares
}

/// Approximate spherical Voronoi cell areas by nearest-direction assignment
/// of a Fibonacci lattice. Integer sample counts keep the parallel reduction
/// deterministic.
fn sphere_partition(dirs: &[[f64; 3]]) -> Vec<f64> {
    let golden_angle = std::f64::consts::PI * (3.0 - 5.0f64.sqrt());
    let m = dirs.len();

    let counts = (0..SPHERE_SAMPLES)
        .into_par_iter()
        .fold(
            || vec![0u64; m],
            |mut acc, k| {
                let z = 1.0 - 2.0 * (k as f64 + 0.5) / SPHERE_SAMPLES as f64;
                let r = (1.0 - z * z).max(0.0).sqrt();
                let phi = golden_angle * k as f64;
                let p = [r * phi.cos(), r * phi.sin(), z];

                let mut best = 0usize;
                let mut best_dot = f64::NEG_INFINITY;
                for (j, d) in dirs.iter().enumerate() {
                    let dot = d[0] * p[0] + d[1] * p[1] + d[2] * p[2];
                    if dot > best_dot {
                        best_dot = dot;
                        best = j;
                    }
                }
                acc[best] += 1;
                acc
            },
        )
        .reduce(
            || vec![0u64; m],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
                a
            },
        );

    let full = 4.0 * std::f64::consts::PI;
    counts
        .into_iter()
        .map(|c| full * c as f64 / SPHERE_SAMPLES as f64)
        .collect()
}
