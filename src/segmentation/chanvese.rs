//! Two-phase Chan-Vese segmentation.
//!
//! Minimizes
//!
//! ```text
//! E = l1 * int_{omega^c} (I - c1)^2 + l2 * int_{omega} (I - c2)^2
//!     + mu * Perimeter(omega)
//! ```
//!
//! For fixed means the binary subproblem is submodular, so the exact
//! minimizer over the region is one min-cut: a node pays
//! `l1 (I - c1)^2` on the sink side (background) and `l2 (I - c2)^2` on the
//! source side (foreground), while boundary edges carry the metric weights
//! scaled by `mu`. The outer loop re-estimates the means from the cut and
//! repeats until they settle.

use log::info;
use serde::{Deserialize, Serialize};

use crate::array::{DenseArray, Image};
use crate::error::Error;
use crate::flow::{self, GridMaxFlow, TerminalOrigin};
use crate::math::{real, wide, Real};
use crate::nbhood::{metric, Neighbourhood};
use crate::tools;
use crate::types::{MASK_BACKGROUND_FIXED, MASK_FOREGROUND_FIXED, MASK_UNKNOWN};

use super::{
    estimate, fill_pairwise, fold_fixed_neighbours, labelling_energy, region_mean, validate_dims,
    validate_loop, validate_mask, validate_positive, Termination,
};

/// Chan-Vese parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChanVeseOptions<T> {
    /// Data weight of the background region.
    pub lambda1: T,
    /// Data weight of the foreground region.
    pub lambda2: T,
    /// Perimeter weight applied on top of the metric edge weights.
    pub mu: T,
    /// Outer-loop threshold on `|dc1| + |dc2|`.
    pub convergence: T,
    pub max_iter: usize,
    /// Neighbourhood symbol ("N4".."N32" in 2-D, "N6".."N98" in 3-D).
    pub neighbourhood: String,
    /// Max-flow selector symbol.
    pub solver: String,
    /// Initial means; estimated with the two-mean iteration when absent.
    /// When supplied, `c1 < c2` is required.
    pub seed: Option<(T, T)>,
}

impl<T: Real> Default for ChanVeseOptions<T> {
    fn default() -> Self {
        Self {
            lambda1: T::one(),
            lambda2: T::one(),
            mu: T::one(),
            convergence: real(1e-3),
            max_iter: 30,
            neighbourhood: "N8".to_string(),
            solver: "GRD-KO".to_string(),
            seed: None,
        }
    }
}

/// Banded refinement pass appended to a coarse solve.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TwoStageOptions {
    /// Cityblock radius of the free band around the first-stage boundary.
    pub band_radius: u32,
    /// Denser neighbourhood used inside the band.
    pub fine_neighbourhood: String,
}

/// Driver output. The labelling is binary (1 = foreground).
#[derive(Clone, Debug, Serialize)]
pub struct ChanVeseOutput<T, const N: usize> {
    pub labels: DenseArray<u8, N>,
    pub energy: T,
    pub iterations: usize,
    pub c1: T,
    pub c2: T,
    pub status: Termination,
}

/// Segments an image, building the solver from the options.
pub fn segment<T: Real, const N: usize>(
    img: &Image<T, N>,
    opts: &ChanVeseOptions<T>,
) -> Result<ChanVeseOutput<T, N>, Error> {
    let mut mf = flow::create::<T, N>(&opts.solver)?;
    compute(img, None, opts, mf.as_mut())
}

/// Segments an image with prelabelled pixels pinned through `mask`.
pub fn segment_masked<T: Real, const N: usize>(
    img: &Image<T, N>,
    mask: &DenseArray<u8, N>,
    opts: &ChanVeseOptions<T>,
) -> Result<ChanVeseOutput<T, N>, Error> {
    let mut mf = flow::create::<T, N>(&opts.solver)?;
    compute(img, Some(mask), opts, mf.as_mut())
}

/// Runs the coarse pass, then re-solves a band around its boundary with a
/// denser neighbourhood while pixels outside the band stay pinned.
pub fn segment_two_stage<T: Real, const N: usize>(
    img: &Image<T, N>,
    opts: &ChanVeseOptions<T>,
    two: &TwoStageOptions,
) -> Result<ChanVeseOutput<T, N>, Error> {
    let coarse = segment(img, opts)?;
    if coarse.status == Termination::Degenerate {
        return Ok(coarse);
    }
    let band = tools::boundary_band(&coarse.labels, two.band_radius);
    if !band.iter().any(|&b| b) {
        return Ok(coarse);
    }

    let mut mask = DenseArray::<u8, N>::new(img.shape());
    for v in 0..mask.len() {
        mask[v] = if band[v] {
            MASK_UNKNOWN
        } else if coarse.labels[v] == 1 {
            MASK_FOREGROUND_FIXED
        } else {
            MASK_BACKGROUND_FIXED
        };
    }

    let mut fine_opts = opts.clone();
    fine_opts.neighbourhood = two.fine_neighbourhood.clone();
    let mut mf = flow::create::<T, N>(&fine_opts.solver)?;
    validate(img, Some(&mask), &fine_opts)?;
    let nb = Neighbourhood::from_symbol(&fine_opts.neighbourhood)?;
    let mut fine = run(
        img,
        Some(&mask),
        &nb,
        &fine_opts,
        (coarse.c1, coarse.c2),
        mf.as_mut(),
    )?;
    fine.iterations += coarse.iterations;
    Ok(fine)
}

/// Lower-level entry taking a caller-owned solver, so warm-started state can
/// be reused across calls.
pub fn compute<T: Real, const N: usize>(
    img: &Image<T, N>,
    mask: Option<&DenseArray<u8, N>>,
    opts: &ChanVeseOptions<T>,
    mf: &mut dyn GridMaxFlow<T, N>,
) -> Result<ChanVeseOutput<T, N>, Error> {
    validate(img, mask, opts)?;
    if let Some((c1, c2)) = opts.seed {
        if !(c1 < c2) {
            return Err(Error::InvalidArgument(
                "Condition c1 < c2 is not satisfied".to_string(),
            ));
        }
    }
    let nb = Neighbourhood::from_symbol(&opts.neighbourhood)?;
    let seed = match opts.seed {
        Some(seed) => seed,
        None => {
            let est = estimate::gibou_fedkiw(
                img.data.as_slice(),
                opts.lambda1,
                opts.lambda2,
                opts.convergence,
                50,
            );
            (est.c1, est.c2)
        }
    };
    run(img, mask, &nb, opts, seed, mf)
}

fn validate<T: Real, const N: usize>(
    img: &Image<T, N>,
    mask: Option<&DenseArray<u8, N>>,
    opts: &ChanVeseOptions<T>,
) -> Result<(), Error> {
    validate_dims::<N>()?;
    validate_positive("lambda1", opts.lambda1)?;
    validate_positive("lambda2", opts.lambda2)?;
    if opts.mu < T::zero() {
        return Err(Error::InvalidArgument(
            "parameter mu must be greater or equal to zero".to_string(),
        ));
    }
    validate_loop(opts.convergence, opts.max_iter)?;
    if img.is_empty() {
        return Err(Error::InvalidArgument("image must not be empty".to_string()));
    }
    if let Some(m) = mask {
        validate_mask(img, m)?;
    }
    Ok(())
}

fn run<T: Real, const N: usize>(
    img: &Image<T, N>,
    mask: Option<&DenseArray<u8, N>>,
    nb: &Neighbourhood<N>,
    opts: &ChanVeseOptions<T>,
    seed: (T, T),
    mf: &mut dyn GridMaxFlow<T, N>,
) -> Result<ChanVeseOutput<T, N>, Error> {
    let shape = img.shape();
    let base: Vec<T> = metric::for_spacing(nb, img.spacing)?;
    let weights: Vec<T> = base.iter().map(|&x| x * opts.mu).collect();

    match mask {
        None => mf.init(shape, nb)?,
        Some(m) => mf.init_masked(shape, nb, m)?,
    }
    fill_pairwise(mf, &img.data, nb, &weights, mask);
    let folds = mask.map(|m| fold_fixed_neighbours(&img.data, nb, &weights, m));

    let pixels = img.data.as_slice();
    let mut labels = DenseArray::<u8, N>::new(shape);
    let (mut c1, mut c2) = seed;
    let mut status = Termination::MaxIterReached;
    let mut iterations = 0usize;

    for iter in 1..=opts.max_iter {
        iterations = iter;
        for v in 0..pixels.len() {
            if mask.map_or(false, |m| m[v] != MASK_UNKNOWN) {
                continue;
            }
            let x = pixels[v];
            let mut cap_src = opts.lambda1 * (x - c1) * (x - c1);
            let mut cap_snk = opts.lambda2 * (x - c2) * (x - c2);
            if let Some((to_src, to_snk)) = &folds {
                cap_src += to_src[v];
                cap_snk += to_snk[v];
            }
            mf.set_terminal_caps(v, cap_src, cap_snk);
        }
        mf.compute()?;

        for v in 0..labels.len() {
            labels[v] = match mask.map(|m| m[v]) {
                Some(MASK_FOREGROUND_FIXED) => 1,
                Some(MASK_BACKGROUND_FIXED) => 0,
                _ => (mf.origin(v) != TerminalOrigin::Sink) as u8,
            };
        }

        let background = region_mean(pixels, labels.as_slice(), 0);
        let foreground = region_mean(pixels, labels.as_slice(), 1);
        let (new_c1, new_c2) = match (background, foreground) {
            (Some(b), Some(f)) => (b, f),
            _ => {
                status = Termination::Degenerate;
                break;
            }
        };
        let dc = (new_c1 - c1).abs() + (new_c2 - c2).abs();
        c1 = new_c1;
        c2 = new_c2;
        info!(
            "chan-vese iteration {iter}: c1={:.5} c2={:.5} dc={:.6}",
            wide(c1),
            wide(c2),
            wide(dc)
        );
        if dc <= opts.convergence {
            status = Termination::Converged;
            break;
        }
    }

    let energy = labelling_energy(&labels, nb, &weights, |v, l| {
        let x = pixels[v];
        if l == 0 {
            opts.lambda1 * (x - c1) * (x - c1)
        } else {
            opts.lambda2 * (x - c2) * (x - c2)
        }
    });

    Ok(ChanVeseOutput {
        labels,
        energy,
        iterations,
        c1,
        c2,
        status,
    })
}
