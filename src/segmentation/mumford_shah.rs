//! Piecewise-constant Mumford-Shah segmentation via alpha-expansion.
//!
//! Minimizes
//!
//! ```text
//! E(L, c) = sum_v lambda_{L(v)} (I(v) - c_{L(v)})^2
//!         + sum_{(u,v)} w_uv [L(u) != L(v)]
//! ```
//!
//! over `k` labels. Each inner move fixes a candidate label `alpha` and lets
//! every node choose between its current label and `alpha`; that binary
//! subproblem is one min-cut. Nodes already labelled `alpha` are pinned to
//! the source side through the mask machinery, which also folds their
//! boundary cost into the free neighbours. A mixed pair (different current
//! labels, neither `alpha`) uses the submodular decomposition of the Potts
//! move energy: the full weight on the keep side of one endpoint plus a
//! one-directional edge, which cuts to the same minima as the textbook
//! auxiliary-node construction.
//!
//! A full round visits every `alpha`; rounds repeat until no label changes,
//! then the class means are re-estimated (Lloyd step) and the outer loop
//! continues until the means settle.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::array::{DenseArray, Image};
use crate::error::Error;
use crate::flow::{self, GridMaxFlow, TerminalOrigin};
use crate::math::{real, wide, Real};
use crate::nbhood::{metric, Neighbourhood};
use crate::types::{MASK_FOREGROUND_FIXED, MASK_UNKNOWN};

use super::{
    estimate, fold_fixed_neighbours, labelling_energy, region_mean, validate_dims, validate_loop,
    Termination,
};

/// Mumford-Shah parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MumfordShahOptions<T> {
    /// Number of labels, `1 < k < 255`.
    pub k: usize,
    /// Data weights: one entry broadcast to every class, or one per class.
    pub lambda: Vec<T>,
    /// Outer-loop threshold on the total mean shift.
    pub convergence: T,
    pub max_iter: usize,
    pub neighbourhood: String,
    pub solver: String,
}

impl<T: Real> Default for MumfordShahOptions<T> {
    fn default() -> Self {
        Self {
            k: 2,
            lambda: vec![T::one()],
            convergence: real(1e-3),
            max_iter: 30,
            neighbourhood: "N8".to_string(),
            solver: "GRD-KO".to_string(),
        }
    }
}

/// Driver output: label field in `0..k`, final energy and class means.
#[derive(Clone, Debug, Serialize)]
pub struct MumfordShahOutput<T, const N: usize> {
    pub labels: DenseArray<u8, N>,
    pub energy: T,
    pub iterations: usize,
    pub means: Vec<T>,
    pub status: Termination,
}

/// Segments an image, building the solver from the options.
pub fn segment<T: Real, const N: usize>(
    img: &Image<T, N>,
    opts: &MumfordShahOptions<T>,
) -> Result<MumfordShahOutput<T, N>, Error> {
    let mut mf = flow::create::<T, N>(&opts.solver)?;
    compute(img, opts, mf.as_mut())
}

/// Lower-level entry taking a caller-owned solver.
pub fn compute<T: Real, const N: usize>(
    img: &Image<T, N>,
    opts: &MumfordShahOptions<T>,
    mf: &mut dyn GridMaxFlow<T, N>,
) -> Result<MumfordShahOutput<T, N>, Error> {
    validate_dims::<N>()?;
    if opts.k < 2 || opts.k > 254 {
        return Err(Error::InvalidArgument(
            "Condition 1 < k < 255 not satisfied".to_string(),
        ));
    }
    let lambda = expand_lambda(&opts.lambda, opts.k)?;
    validate_loop(opts.convergence, opts.max_iter)?;
    if img.is_empty() {
        return Err(Error::InvalidArgument("image must not be empty".to_string()));
    }

    let nb = Neighbourhood::from_symbol(&opts.neighbourhood)?;
    let weights: Vec<T> = metric::for_spacing(&nb, img.spacing)?;
    let pixels = img.data.as_slice();

    // Lloyd seeding on the intensity distribution.
    let init = estimate::lloyd_1d(pixels, opts.k, &lambda, opts.convergence, 50);
    let mut means = init.centers;
    let mut labels = DenseArray::<u8, N>::from_fn(img.shape(), |_| 0);
    for v in 0..pixels.len() {
        labels[v] = estimate::nearest_class(pixels[v], &means, &lambda) as u8;
    }

    let unary = |m: &[T], v: usize, l: u8| {
        let x = pixels[v];
        let c = m[l as usize];
        lambda[l as usize] * (x - c) * (x - c)
    };

    let mut energy = labelling_energy(&labels, &nb, &weights, |v, l| unary(&means, v, l));
    let mut status = Termination::MaxIterReached;
    let mut iterations = 0usize;
    let mut mask = DenseArray::<u8, N>::new(img.shape());
    let mut cap_src = vec![T::zero(); pixels.len()];
    let mut cap_snk = vec![T::zero(); pixels.len()];

    'outer: for outer in 1..=opts.max_iter {
        iterations = outer;

        let mut rounds = 0usize;
        loop {
            let mut changed = false;
            for alpha in 0..opts.k as u8 {
                let candidate = expansion_move(
                    img, &labels, alpha, &means, &lambda, &nb, &weights, mf, &mut mask,
                    &mut cap_src, &mut cap_snk,
                )?;
                let candidate_energy =
                    labelling_energy(&candidate, &nb, &weights, |v, l| unary(&means, v, l));
                if candidate_energy < energy {
                    changed = changed || candidate != labels;
                    labels = candidate;
                    energy = candidate_energy;
                } else if candidate_energy > energy + move_tolerance(energy) {
                    warn!(
                        "expansion move for label {alpha} raised the energy ({:.6} -> {:.6})",
                        wide(energy),
                        wide(candidate_energy)
                    );
                }
            }
            rounds += 1;
            if !changed || rounds >= opts.max_iter {
                break;
            }
        }

        // Lloyd step: class means from the current partition.
        let mut new_means = means.clone();
        for l in 0..opts.k {
            match region_mean(pixels, labels.as_slice(), l as u8) {
                Some(c) => new_means[l] = c,
                None => {
                    status = Termination::Degenerate;
                    break 'outer;
                }
            }
        }
        let shift = means
            .iter()
            .zip(&new_means)
            .fold(T::zero(), |acc, (&a, &b)| acc + (a - b).abs());
        means = new_means;
        energy = labelling_energy(&labels, &nb, &weights, |v, l| unary(&means, v, l));
        info!(
            "mumford-shah iteration {outer}: energy={:.6} mean shift={:.6}",
            wide(energy),
            wide(shift)
        );
        if shift < opts.convergence {
            status = Termination::Converged;
            break;
        }
    }

    Ok(MumfordShahOutput {
        labels,
        energy,
        iterations,
        means,
        status,
    })
}

fn expand_lambda<T: Real>(lambda: &[T], k: usize) -> Result<Vec<T>, Error> {
    let expanded: Vec<T> = match lambda.len() {
        1 => vec![lambda[0]; k],
        n if n == k => lambda.to_vec(),
        n => {
            return Err(Error::InvalidArgument(format!(
                "lambda must hold one weight or one per class ({k}), got {n}"
            )))
        }
    };
    if expanded.iter().any(|&l| !(l > T::zero())) {
        return Err(Error::InvalidArgument(
            "parameter lambda must be greater than zero".to_string(),
        ));
    }
    Ok(expanded)
}

fn move_tolerance<T: Real>(energy: T) -> T {
    let eps: T = real(1e-9);
    eps * (T::one() + energy.abs())
}

/// One binary expansion subproblem: every node keeps its label (sink side)
/// or switches to `alpha` (source side).
#[allow(clippy::too_many_arguments)]
fn expansion_move<T: Real, const N: usize>(
    img: &Image<T, N>,
    labels: &DenseArray<u8, N>,
    alpha: u8,
    means: &[T],
    lambda: &[T],
    nb: &Neighbourhood<N>,
    weights: &[T],
    mf: &mut dyn GridMaxFlow<T, N>,
    mask: &mut DenseArray<u8, N>,
    cap_src: &mut [T],
    cap_snk: &mut [T],
) -> Result<DenseArray<u8, N>, Error> {
    let pixels = img.data.as_slice();

    for v in 0..labels.len() {
        mask[v] = if labels[v] == alpha {
            MASK_FOREGROUND_FIXED
        } else {
            MASK_UNKNOWN
        };
    }
    mf.init_masked(img.shape(), nb, mask)?;

    // Keeping the current label costs its data term; switching costs the
    // alpha data term. Alpha-labelled neighbours fold in through the mask.
    let (fold_src, _fold_snk) = fold_fixed_neighbours(&img.data, nb, weights, mask);
    for v in 0..labels.len() {
        if labels[v] == alpha {
            continue;
        }
        let x = pixels[v];
        let keep = labels[v] as usize;
        let ck = means[keep];
        let ca = means[alpha as usize];
        cap_src[v] = lambda[keep] * (x - ck) * (x - ck) + fold_src[v];
        cap_snk[v] = lambda[alpha as usize] * (x - ca) * (x - ca);
    }

    // Pairwise terms, once per undirected pair of free nodes. Equal labels
    // keep the symmetric edge; mixed pairs use the submodular decomposition
    // (full weight on one keep side plus a one-directional edge).
    for v in 0..labels.len() {
        if labels[v] == alpha {
            continue;
        }
        let c = labels.coords(v);
        for i in (0..nb.len()).step_by(2) {
            let Some(wc) = labels.offset_coords(c, nb.offset(i)) else {
                continue;
            };
            let u = labels.linear(wc);
            if labels[u] == alpha {
                continue;
            }
            let w = weights[i];
            if labels[v] == labels[u] {
                mf.set_edge_cap(v, i, w);
                mf.set_edge_cap(u, i ^ 1, w);
            } else {
                cap_src[v] += w;
                mf.set_edge_cap(v, i, w);
            }
        }
    }

    for v in 0..labels.len() {
        if labels[v] != alpha {
            mf.set_terminal_caps(v, cap_src[v], cap_snk[v]);
        }
    }
    mf.compute()?;

    let mut out = labels.clone();
    for v in 0..labels.len() {
        if labels[v] != alpha && mf.origin(v) != TerminalOrigin::Sink {
            out[v] = alpha;
        }
    }
    Ok(out)
}
