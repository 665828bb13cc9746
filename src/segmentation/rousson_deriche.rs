//! Two-phase Rousson-Deriche segmentation.
//!
//! The data term models each region as a Gaussian with its own mean and
//! variance:
//!
//! ```text
//! u_l(v) = (I(v) - c_l)^2 / (2 s_l^2) + ln(s_l^2) / 2
//! ```
//!
//! The log-variance term can push a capacity negative, so each node's pair
//! of terminal capacities is shifted by their minimum before it reaches the
//! solver; the shift is constant per node and leaves the minimizer
//! unchanged. The outer loop re-estimates means and (biased) variances as
//! maximum-likelihood statistics over the two regions.

use log::info;
use serde::{Deserialize, Serialize};

use crate::array::{DenseArray, Image};
use crate::error::Error;
use crate::flow::{self, GridMaxFlow, TerminalOrigin};
use crate::math::{real, wide, Real};
use crate::nbhood::{metric, Neighbourhood};

use super::{
    estimate, fill_pairwise, labelling_energy, validate_dims, validate_loop, validate_positive,
    Termination,
};

/// Rousson-Deriche parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoussonDericheOptions<T> {
    /// Boundary weight applied to the metric edge weights.
    pub lambda: T,
    /// Outer-loop threshold on `|dc1| + |dc2|`.
    pub convergence: T,
    pub max_iter: usize,
    pub neighbourhood: String,
    /// Max-flow selector symbol.
    pub solver: String,
}

impl<T: Real> Default for RoussonDericheOptions<T> {
    fn default() -> Self {
        Self {
            lambda: T::one(),
            convergence: real(1e-3),
            max_iter: 30,
            neighbourhood: "N8".to_string(),
            solver: "GRD-KO".to_string(),
        }
    }
}

/// Driver output: binary labelling plus per-region Gaussian statistics.
#[derive(Clone, Debug, Serialize)]
pub struct RoussonDericheOutput<T, const N: usize> {
    pub labels: DenseArray<u8, N>,
    pub energy: T,
    pub iterations: usize,
    pub c1: T,
    pub v1: T,
    pub c2: T,
    pub v2: T,
    pub status: Termination,
}

/// Segments an image, building the solver from the selector symbol.
pub fn segment<T: Real, const N: usize>(
    img: &Image<T, N>,
    opts: &RoussonDericheOptions<T>,
) -> Result<RoussonDericheOutput<T, N>, Error> {
    let mut mf = flow::create::<T, N>(&opts.solver)?;
    compute(img, opts, mf.as_mut())
}

/// Lower-level entry taking a caller-owned solver.
pub fn compute<T: Real, const N: usize>(
    img: &Image<T, N>,
    opts: &RoussonDericheOptions<T>,
    mf: &mut dyn GridMaxFlow<T, N>,
) -> Result<RoussonDericheOutput<T, N>, Error> {
    validate_dims::<N>()?;
    validate_positive("lambda", opts.lambda)?;
    validate_loop(opts.convergence, opts.max_iter)?;
    if img.is_empty() {
        return Err(Error::InvalidArgument("image must not be empty".to_string()));
    }

    let nb = Neighbourhood::from_symbol(&opts.neighbourhood)?;
    let base: Vec<T> = metric::for_spacing(&nb, img.spacing)?;
    let weights: Vec<T> = base.iter().map(|&x| x * opts.lambda).collect();
    let pixels = img.data.as_slice();

    let init = estimate::gibou_fedkiw_variance(pixels, 50);
    let (mut c1, mut var1, mut c2, mut var2) = (init.c1, init.v1, init.c2, init.v2);

    let shape = img.shape();
    mf.init(shape, &nb)?;
    fill_pairwise(mf, &img.data, &nb, &weights, None);

    let mut labels = DenseArray::<u8, N>::new(shape);
    let mut status = Termination::MaxIterReached;
    let mut iterations = 0usize;
    let half: T = real(0.5);
    let var_floor: T = real(1e-12);

    for iter in 1..=opts.max_iter {
        iterations = iter;
        for v in 0..pixels.len() {
            let x = pixels[v];
            let u0 = (x - c1) * (x - c1) / (var1 + var1) + half * var1.ln();
            let u1 = (x - c2) * (x - c2) / (var2 + var2) + half * var2.ln();
            // Shift both capacities by their minimum; residuals must stay
            // non-negative while the cut is unaffected.
            let shift = u0.min(u1);
            mf.set_terminal_caps(v, u0 - shift, u1 - shift);
        }
        mf.compute()?;
        for v in 0..labels.len() {
            labels[v] = (mf.origin(v) != TerminalOrigin::Sink) as u8;
        }

        let Some((new_c1, new_v1)) = gaussian_mle(pixels, labels.as_slice(), 0, var_floor) else {
            status = Termination::Degenerate;
            break;
        };
        let Some((new_c2, new_v2)) = gaussian_mle(pixels, labels.as_slice(), 1, var_floor) else {
            status = Termination::Degenerate;
            break;
        };
        let dc = (new_c1 - c1).abs() + (new_c2 - c2).abs();
        c1 = new_c1;
        var1 = new_v1;
        c2 = new_c2;
        var2 = new_v2;
        info!(
            "rousson-deriche iteration {iter}: c1={:.5} v1={:.6} c2={:.5} v2={:.6} dc={:.6}",
            wide(c1),
            wide(var1),
            wide(c2),
            wide(var2),
            wide(dc)
        );
        if dc <= opts.convergence {
            status = Termination::Converged;
            break;
        }
    }

    let energy = labelling_energy(&labels, &nb, &weights, |v, l| {
        let x = pixels[v];
        if l == 0 {
            (x - c1) * (x - c1) / (var1 + var1) + half * var1.ln()
        } else {
            (x - c2) * (x - c2) / (var2 + var2) + half * var2.ln()
        }
    });

    Ok(RoussonDericheOutput {
        labels,
        energy,
        iterations,
        c1,
        v1: var1,
        c2,
        v2: var2,
        status,
    })
}

/// Mean and biased variance of a region, floored to keep the model finite.
fn gaussian_mle<T: Real>(img: &[T], labels: &[u8], value: u8, floor: T) -> Option<(T, T)> {
    let mut sum = T::zero();
    let mut count = 0usize;
    for (&x, &l) in img.iter().zip(labels) {
        if l == value {
            sum += x;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    let n = T::from_usize(count).expect("pixel count fits the scalar");
    let mean = sum / n;
    let mut acc = T::zero();
    for (&x, &l) in img.iter().zip(labels) {
        if l == value {
            acc += (x - mean) * (x - mean);
        }
    }
    Some((mean, (acc / n).max(floor)))
}
