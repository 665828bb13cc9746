//! Segmentation drivers built on the grid max-flow back-ends.
//!
//! Overview
//! - Each driver is a fixed-point loop: estimate region statistics, rebuild
//!   the terminal capacities of a grid graph, run one min-cut, read the
//!   labelling back and iterate until the statistics settle.
//! - The pairwise capacities come from the Cauchy-Crofton metric weights, so
//!   the cut approximates a boundary integral.
//! - Prelabelled pixels are excluded from the graph through a mask; each of
//!   their directions folds its weight into the terminal capacities of the
//!   free neighbour (once per direction, summed).
//!
//! Modules
//! - `chanvese`: two-phase Chan-Vese, including the banded two-stage
//!   variant.
//! - `mumford_shah`: piecewise-constant multi-label model via
//!   alpha-expansion.
//! - `rousson_deriche`: two-phase model with per-region variances.
//! - `estimate`: Gibou-Fedkiw two-mean and Lloyd 1-D k-means initializers.
//!
//! Drivers never fail after validation: running out of iterations or hitting
//! a numerical degeneracy is reported through [`Termination`] next to the
//! partial result.

pub mod chanvese;
pub mod estimate;
pub mod mumford_shah;
pub mod rousson_deriche;

use serde::Serialize;

use crate::array::{DenseArray, Image};
use crate::error::Error;
use crate::flow::GridMaxFlow;
use crate::math::Real;
use crate::nbhood::Neighbourhood;
use crate::types::{MASK_BACKGROUND_FIXED, MASK_FOREGROUND_FIXED, MASK_UNKNOWN};

/// How a driver loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// The convergence criterion was met.
    Converged,
    /// `max_iter` elapsed first; the last labelling and statistics are
    /// returned as a partial result.
    MaxIterReached,
    /// A statistics update degenerated (typically an empty region). The
    /// partial result is returned; parameters or the class count are likely
    /// wrong for the data.
    Degenerate,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Converged => write!(f, "converged"),
            Termination::MaxIterReached => write!(f, "maximum iterations reached"),
            Termination::Degenerate => {
                write!(f, "convergence error: a region became empty during estimation")
            }
        }
    }
}

pub(crate) fn validate_dims<const N: usize>() -> Result<(), Error> {
    if N == 2 || N == 3 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "only 2-D and 3-D images are supported, got {N}-D"
        )))
    }
}

pub(crate) fn validate_positive<T: Real>(name: &str, v: T) -> Result<(), Error> {
    if v > T::zero() {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "parameter {name} must be greater than zero"
        )))
    }
}

pub(crate) fn validate_loop<T: Real>(convergence: T, max_iter: usize) -> Result<(), Error> {
    if convergence < T::zero() {
        return Err(Error::InvalidArgument(
            "convergence criterion must be greater or equal to zero".to_string(),
        ));
    }
    if max_iter == 0 {
        return Err(Error::InvalidArgument(
            "parameter max_iter must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_mask<T: Real, const N: usize>(
    img: &Image<T, N>,
    mask: &DenseArray<u8, N>,
) -> Result<(), Error> {
    if mask.shape() != img.shape() {
        return Err(Error::InvalidArgument(format!(
            "mask shape {:?} does not match image shape {:?}",
            mask.shape(),
            img.shape()
        )));
    }
    if let Some(v) = mask
        .as_slice()
        .iter()
        .find(|&&v| v != MASK_BACKGROUND_FIXED && v != MASK_FOREGROUND_FIXED && v != MASK_UNKNOWN)
    {
        return Err(Error::InvalidArgument(format!(
            "mask values must be 1 (background), 2 (foreground) or 3 (unknown), got {v}"
        )));
    }
    Ok(())
}

/// Sets the symmetric pairwise capacities on every valid direction of every
/// free node.
pub(crate) fn fill_pairwise<T: Real, const N: usize>(
    mf: &mut dyn GridMaxFlow<T, N>,
    shape_probe: &DenseArray<T, N>,
    nb: &Neighbourhood<N>,
    weights: &[T],
    mask: Option<&DenseArray<u8, N>>,
) {
    for v in 0..shape_probe.len() {
        if let Some(m) = mask {
            if m[v] != MASK_UNKNOWN {
                continue;
            }
        }
        let c = shape_probe.coords(v);
        for (i, &d) in nb.offsets().iter().enumerate() {
            if let Some(wc) = shape_probe.offset_coords(c, d) {
                let w = shape_probe.linear(wc);
                if mask.map_or(true, |m| m[w] == MASK_UNKNOWN) {
                    mf.set_edge_cap(v, i, weights[i]);
                }
            }
        }
    }
}

/// Terminal contributions of pinned neighbours: a foreground-fixed neighbour
/// through direction `i` adds `w_i` toward the source, a background-fixed
/// one adds `w_i` toward the sink.
pub(crate) fn fold_fixed_neighbours<T: Real, const N: usize>(
    shape_probe: &DenseArray<T, N>,
    nb: &Neighbourhood<N>,
    weights: &[T],
    mask: &DenseArray<u8, N>,
) -> (Vec<T>, Vec<T>) {
    let len = shape_probe.len();
    let mut to_src = vec![T::zero(); len];
    let mut to_snk = vec![T::zero(); len];
    for v in 0..len {
        if mask[v] != MASK_UNKNOWN {
            continue;
        }
        let c = shape_probe.coords(v);
        for (i, &d) in nb.offsets().iter().enumerate() {
            if let Some(wc) = shape_probe.offset_coords(c, d) {
                match mask[shape_probe.linear(wc)] {
                    MASK_FOREGROUND_FIXED => to_src[v] += weights[i],
                    MASK_BACKGROUND_FIXED => to_snk[v] += weights[i],
                    _ => {}
                }
            }
        }
    }
    (to_src, to_snk)
}

/// Evaluates the discrete energy of a labelling: per-node unary cost plus
/// the metric weight of every boundary edge, counted once per undirected
/// pair.
pub(crate) fn labelling_energy<T: Real, const N: usize>(
    labels: &DenseArray<u8, N>,
    nb: &Neighbourhood<N>,
    weights: &[T],
    unary: impl Fn(usize, u8) -> T,
) -> T {
    let mut energy = T::zero();
    for v in 0..labels.len() {
        energy += unary(v, labels[v]);
        let c = labels.coords(v);
        for i in (0..nb.len()).step_by(2) {
            if let Some(wc) = labels.offset_coords(c, nb.offset(i)) {
                if labels[labels.linear(wc)] != labels[v] {
                    energy += weights[i];
                }
            }
        }
    }
    energy
}

/// Mean intensity over the pixels labelled `value`, or `None` for an empty
/// region.
pub(crate) fn region_mean<T: Real>(img: &[T], labels: &[u8], value: u8) -> Option<T> {
    let mut sum = T::zero();
    let mut count = 0usize;
    for (&x, &l) in img.iter().zip(labels) {
        if l == value {
            sum += x;
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some(sum / T::from_usize(count).expect("pixel count fits the scalar"))
    }
}
