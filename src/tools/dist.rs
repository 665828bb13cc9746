//! Cityblock distance transform.
//!
//! Two-pass chamfer over the axis offsets. Unit axis steps are exact for the
//! L1 metric, so the forward sweep (predecessor neighbours) plus the
//! backward sweep (successor neighbours) yields the true distance to the
//! nearest seed.

use crate::array::DenseArray;

const FAR: u32 = u32::MAX / 2;

/// L1 distance of every element to the nearest seed. Elements stay at a
/// large sentinel when no seed exists.
pub fn cityblock_distance<const N: usize>(seeds: &DenseArray<bool, N>) -> DenseArray<u32, N> {
    let shape = seeds.shape();
    let strides = seeds.strides();
    let mut dist = DenseArray::<u32, N>::filled(shape, FAR);
    for v in 0..seeds.len() {
        if seeds[v] {
            dist[v] = 0;
        }
    }

    // Forward sweep: each axis predecessor is already final for this pass.
    for v in 0..dist.len() {
        let c = dist.coords(v);
        let mut best = dist[v];
        for a in 0..N {
            if c[a] > 0 {
                best = best.min(dist[v - strides[a]].saturating_add(1));
            }
        }
        dist[v] = best;
    }
    // Backward sweep over the axis successors.
    for v in (0..dist.len()).rev() {
        let c = dist.coords(v);
        let mut best = dist[v];
        for a in 0..N {
            if c[a] + 1 < shape[a] {
                best = best.min(dist[v + strides[a]].saturating_add(1));
            }
        }
        dist[v] = best;
    }
    dist
}

/// Band of pixels within cityblock `radius` of a label boundary.
///
/// A pixel seeds the transform when any axis neighbour carries a different
/// label, so both sides of every boundary are in the band.
pub fn boundary_band<const N: usize>(
    labels: &DenseArray<u8, N>,
    radius: u32,
) -> DenseArray<bool, N> {
    let shape = labels.shape();
    let strides = labels.strides();
    let mut seeds = DenseArray::<bool, N>::new(shape);
    for v in 0..labels.len() {
        let c = labels.coords(v);
        let mut on_boundary = false;
        for a in 0..N {
            if c[a] + 1 < shape[a] && labels[v + strides[a]] != labels[v] {
                on_boundary = true;
            }
            if c[a] > 0 && labels[v - strides[a]] != labels[v] {
                on_boundary = true;
            }
        }
        seeds[v] = on_boundary;
    }

    let dist = cityblock_distance(&seeds);
    let mut band = DenseArray::<bool, N>::new(shape);
    for v in 0..band.len() {
        band[v] = dist[v] <= radius;
    }
    band
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances_from_a_single_seed() {
        let mut seeds = DenseArray::<bool, 2>::new([3, 4]);
        seeds.set([1, 1], true);
        let dist = cityblock_distance(&seeds);
        assert_eq!(*dist.get([1, 1]), 0);
        assert_eq!(*dist.get([0, 0]), 2);
        assert_eq!(*dist.get([2, 3]), 3);
        assert_eq!(*dist.get([1, 3]), 2);
    }

    #[test]
    fn no_seeds_leaves_the_sentinel() {
        let seeds = DenseArray::<bool, 2>::new([2, 2]);
        let dist = cityblock_distance(&seeds);
        assert!(dist.iter().all(|&d| d >= FAR));
    }

    #[test]
    fn band_straddles_a_vertical_split() {
        // Columns 0..3 labelled 0, columns 3..6 labelled 1.
        let labels = DenseArray::<u8, 2>::from_fn([4, 6], |c| (c[1] >= 3) as u8);
        let band = boundary_band(&labels, 1);
        for r in 0..4 {
            assert!(!*band.get([r, 0]));
            assert!(*band.get([r, 2]));
            assert!(*band.get([r, 3]));
            assert!(*band.get([r, 4]));
            assert!(!*band.get([r, 5]));
        }
    }

    #[test]
    fn works_in_three_dimensions() {
        let mut seeds = DenseArray::<bool, 3>::new([3, 3, 3]);
        seeds.set([0, 0, 0], true);
        let dist = cityblock_distance(&seeds);
        assert_eq!(*dist.get([2, 2, 2]), 6);
        assert_eq!(*dist.get([1, 0, 2]), 3);
    }
}
