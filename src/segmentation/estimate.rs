//! Initial statistics estimators for the drivers.
//!
//! All estimators work on the flat intensity distribution; spatial structure
//! only enters later through the graph cut.

use log::warn;

use crate::math::{real, wide, Real};

/// Two-mean estimate produced by the Gibou-Fedkiw iteration.
#[derive(Clone, Copy, Debug)]
pub struct TwoMeans<T> {
    pub c1: T,
    pub c2: T,
    /// One side of the split came up empty at some point; the previous mean
    /// was kept.
    pub degenerate: bool,
}

/// Two-phase statistics with per-region variances (Rousson-Deriche init).
#[derive(Clone, Copy, Debug)]
pub struct TwoPhaseStats<T> {
    pub c1: T,
    pub v1: T,
    pub c2: T,
    pub v2: T,
    pub degenerate: bool,
}

/// Gibou-Fedkiw two-mean fixed point.
///
/// Starts from `c1 = (min + avg) / 2`, `c2 = (avg + max) / 2` and iterates
/// the residual indicator `R = -l1 (I - c1)^2 + l2 (I - c2)^2`: pixels with
/// `R >= 0` vote for `c1`, the rest for `c2`. Stops when `|dc1| + |dc2|`
/// falls below `convergence` or after `max_iter` rounds.
pub fn gibou_fedkiw<T: Real>(
    img: &[T],
    lambda1: T,
    lambda2: T,
    convergence: T,
    max_iter: usize,
) -> TwoMeans<T> {
    let (lo, hi, avg) = min_max_mean(img);
    let half: T = real(0.5);
    let mut c1 = (lo + avg) * half;
    let mut c2 = (avg + hi) * half;
    let mut degenerate = false;

    for _ in 0..max_iter {
        let mut sum1 = T::zero();
        let mut n1 = 0usize;
        let mut sum2 = T::zero();
        let mut n2 = 0usize;
        for &x in img {
            let r = lambda2 * (x - c2) * (x - c2) - lambda1 * (x - c1) * (x - c1);
            if r >= T::zero() {
                sum1 += x;
                n1 += 1;
            } else {
                sum2 += x;
                n2 += 1;
            }
        }
        let new_c1 = mean_or(sum1, n1, c1, &mut degenerate);
        let new_c2 = mean_or(sum2, n2, c2, &mut degenerate);
        let dc = (new_c1 - c1).abs() + (new_c2 - c2).abs();
        c1 = new_c1;
        c2 = new_c2;
        if dc < convergence {
            break;
        }
    }
    if degenerate {
        warn!(
            "two-mean estimate degenerated (c1={:.4}, c2={:.4})",
            wide(c1),
            wide(c2)
        );
    }
    TwoMeans { c1, c2, degenerate }
}

/// Gibou-Fedkiw split with unit weights, extended by per-region variances.
pub fn gibou_fedkiw_variance<T: Real>(img: &[T], max_iter: usize) -> TwoPhaseStats<T> {
    let est = gibou_fedkiw(img, T::one(), T::one(), T::zero(), max_iter);
    let mut acc1 = T::zero();
    let mut n1 = 0usize;
    let mut acc2 = T::zero();
    let mut n2 = 0usize;
    for &x in img {
        let r = (x - est.c2) * (x - est.c2) - (x - est.c1) * (x - est.c1);
        if r >= T::zero() {
            acc1 += (x - est.c1) * (x - est.c1);
            n1 += 1;
        } else {
            acc2 += (x - est.c2) * (x - est.c2);
            n2 += 1;
        }
    }
    let mut degenerate = est.degenerate;
    let v1 = variance_or(acc1, n1, &mut degenerate);
    let v2 = variance_or(acc2, n2, &mut degenerate);
    TwoPhaseStats {
        c1: est.c1,
        v1,
        c2: est.c2,
        v2,
        degenerate,
    }
}

/// Result of the weighted 1-D Lloyd iteration.
#[derive(Clone, Debug)]
pub struct LloydCenters<T> {
    pub centers: Vec<T>,
    /// Some class ended up empty; its previous center was kept.
    pub degenerate: bool,
}

/// Weighted Lloyd k-means on the intensity distribution.
///
/// Centers are seeded evenly across the intensity range; each pixel joins
/// the class minimizing `lambda_l (I - c_l)^2`.
pub fn lloyd_1d<T: Real>(
    img: &[T],
    k: usize,
    lambda: &[T],
    convergence: T,
    max_iter: usize,
) -> LloydCenters<T> {
    debug_assert_eq!(lambda.len(), k);
    let (lo, hi, _) = min_max_mean(img);
    let span = hi - lo;
    let kt = T::from_usize(k).expect("class count fits the scalar");
    let half: T = real(0.5);
    let mut centers: Vec<T> = (0..k)
        .map(|l| lo + span * (T::from_usize(l).expect("class index") + half) / kt)
        .collect();
    let mut degenerate = false;

    let mut sums = vec![T::zero(); k];
    let mut counts = vec![0usize; k];
    for _ in 0..max_iter {
        sums.iter_mut().for_each(|s| *s = T::zero());
        counts.iter_mut().for_each(|c| *c = 0);
        for &x in img {
            let l = nearest_class(x, &centers, lambda);
            sums[l] += x;
            counts[l] += 1;
        }
        let mut shift = T::zero();
        degenerate = false;
        for l in 0..k {
            let new_c = mean_or(sums[l], counts[l], centers[l], &mut degenerate);
            shift += (new_c - centers[l]).abs();
            centers[l] = new_c;
        }
        if shift < convergence {
            break;
        }
    }
    if degenerate {
        warn!("k-means left at least one intensity class empty (k may be too large)");
    }
    LloydCenters { centers, degenerate }
}

/// Class with the smallest weighted squared distance; ties go to the lowest
/// index.
pub(crate) fn nearest_class<T: Real>(x: T, centers: &[T], lambda: &[T]) -> usize {
    let mut best = 0usize;
    let mut best_cost = lambda[0] * (x - centers[0]) * (x - centers[0]);
    for l in 1..centers.len() {
        let cost = lambda[l] * (x - centers[l]) * (x - centers[l]);
        if cost < best_cost {
            best_cost = cost;
            best = l;
        }
    }
    best
}

fn min_max_mean<T: Real>(img: &[T]) -> (T, T, T) {
    let mut lo = T::infinity();
    let mut hi = T::neg_infinity();
    let mut sum = T::zero();
    for &x in img {
        lo = lo.min(x);
        hi = hi.max(x);
        sum += x;
    }
    let n = T::from_usize(img.len().max(1)).expect("pixel count fits the scalar");
    (lo, hi, sum / n)
}

fn mean_or<T: Real>(sum: T, count: usize, fallback: T, degenerate: &mut bool) -> T {
    if count == 0 {
        *degenerate = true;
        fallback
    } else {
        sum / T::from_usize(count).expect("pixel count fits the scalar")
    }
}

fn variance_or<T: Real>(acc: T, count: usize, degenerate: &mut bool) -> T {
    let floor: T = real(1e-12);
    if count == 0 {
        *degenerate = true;
        floor
    } else {
        (acc / T::from_usize(count).expect("pixel count fits the scalar")).max(floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_means_separate_a_bimodal_histogram() {
        let mut img = vec![0.1f64; 40];
        img.extend(vec![0.9f64; 60]);
        let est = gibou_fedkiw(&img, 1.0, 1.0, 1e-9, 50);
        assert!(!est.degenerate);
        assert!((est.c1 - 0.1).abs() < 1e-9);
        assert!((est.c2 - 0.9).abs() < 1e-9);
    }

    #[test]
    fn asymmetric_weights_move_the_split() {
        let img: Vec<f64> = (0..100).map(|i| i as f64 / 99.0).collect();
        let balanced = gibou_fedkiw(&img, 1.0, 1.0, 1e-9, 50);
        let skewed = gibou_fedkiw(&img, 10.0, 1.0, 1e-9, 50);
        // A heavier penalty on the dark class shrinks it.
        assert!(skewed.c1 < balanced.c1);
    }

    #[test]
    fn constant_image_flags_degeneracy() {
        let img = vec![0.5f64; 16];
        let est = gibou_fedkiw(&img, 1.0, 1.0, 1e-9, 50);
        assert!(est.degenerate);
    }

    #[test]
    fn variance_estimate_tracks_the_spread() {
        let mut img = Vec::new();
        for i in 0..50 {
            img.push(0.2 + 0.01 * ((i % 5) as f64 - 2.0));
            img.push(0.8 + 0.04 * ((i % 5) as f64 - 2.0));
        }
        let est = gibou_fedkiw_variance(&img, 50);
        assert!((est.c1 - 0.2).abs() < 0.02);
        assert!((est.c2 - 0.8).abs() < 0.02);
        assert!(est.v2 > est.v1);
    }

    #[test]
    fn lloyd_recovers_three_clusters() {
        let mut img = Vec::new();
        img.extend(vec![0.0f64; 30]);
        img.extend(vec![0.5f64; 30]);
        img.extend(vec![1.0f64; 30]);
        let lambda = vec![1.0f64; 3];
        let res = lloyd_1d(&img, 3, &lambda, 1e-9, 50);
        assert!(!res.degenerate);
        assert!((res.centers[0] - 0.0).abs() < 1e-6);
        assert!((res.centers[1] - 0.5).abs() < 1e-6);
        assert!((res.centers[2] - 1.0).abs() < 1e-6);
    }
}
