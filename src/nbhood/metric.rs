//! Cauchy-Crofton edge weight tables.
//!
//! A cut through a grid graph approximates the boundary integral of a metric
//! when every direction `d_i` carries
//!
//! ```text
//! w_i = (phi_i * drho_i) / K_N,   K_2 = 2, K_3 = pi,
//! drho_i = det(M) / |M d_i|
//! ```
//!
//! where `phi_i` is the hyperspherical Voronoi share of the transformed,
//! normalized direction `M d_i` and `M` is the linear metric transform
//! (identity for the Euclidean case, a diagonal matrix for anisotropic voxel
//! spacing, any symmetric positive definite matrix for the Riemannian
//! variant). Tables are computed in `f64` once per (neighbourhood, metric)
//! and converted to the pipeline scalar.

use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};

use super::{sphere, Neighbourhood};
use crate::error::Error;
use crate::math::{real, Real};

/// Euclidean weights: unit spacing, identity transform.
pub fn cauchy_crofton<T: Real, const N: usize>(nb: &Neighbourhood<N>) -> Result<Vec<T>, Error> {
    weights_impl(nb, |d| std::array::from_fn(|a| d[a] as f64), 1.0)
}

/// Weights for axis-aligned anisotropy: `M = diag(spacing)`.
pub fn anisotropic<T: Real, const N: usize>(
    nb: &Neighbourhood<N>,
    spacing: [f64; N],
) -> Result<Vec<T>, Error> {
    if spacing.iter().any(|&s| !(s > 0.0)) {
        return Err(Error::InvalidArgument(format!(
            "voxel spacing must be positive, got {spacing:?}"
        )));
    }
    let det = spacing.iter().product();
    weights_impl(nb, move |d| std::array::from_fn(|a| d[a] as f64 * spacing[a]), det)
}

/// Weights under a general 2-D Riemannian transform.
pub fn riemannian_2d<T: Real>(
    nb: &Neighbourhood<2>,
    mt: &Matrix2<f64>,
) -> Result<Vec<T>, Error> {
    let det = mt.determinant();
    if !(det > 0.0) {
        return Err(Error::InvalidArgument(
            "metric transform must have positive determinant".to_string(),
        ));
    }
    weights_impl(
        nb,
        move |d| {
            let v = mt * Vector2::new(d[0] as f64, d[1] as f64);
            [v.x, v.y]
        },
        det,
    )
}

/// Weights under a general 3-D Riemannian transform.
pub fn riemannian_3d<T: Real>(
    nb: &Neighbourhood<3>,
    mt: &Matrix3<f64>,
) -> Result<Vec<T>, Error> {
    let det = mt.determinant();
    if !(det > 0.0) {
        return Err(Error::InvalidArgument(
            "metric transform must have positive determinant".to_string(),
        ));
    }
    weights_impl(
        nb,
        move |d| {
            let v = mt * Vector3::new(d[0] as f64, d[1] as f64, d[2] as f64);
            [v.x, v.y, v.z]
        },
        det,
    )
}

/// Weights for an image: identity metric when the spacing is uniform,
/// diagonal transform otherwise.
pub fn for_spacing<T: Real, const N: usize>(
    nb: &Neighbourhood<N>,
    spacing: [f64; N],
) -> Result<Vec<T>, Error> {
    if spacing.iter().all(|&s| s == 1.0) {
        cauchy_crofton(nb)
    } else {
        anisotropic(nb, spacing)
    }
}

fn weights_impl<T: Real, const N: usize>(
    nb: &Neighbourhood<N>,
    transform: impl Fn([isize; N]) -> [f64; N],
    det: f64,
) -> Result<Vec<T>, Error> {
    let coef = match N {
        2 => 2.0,
        3 => std::f64::consts::PI,
        _ => {
            return Err(Error::InvalidArgument(format!(
                "edge weights support 2-D and 3-D neighbourhoods, got {N}-D"
            )))
        }
    };

    let transformed: Vec<[f64; N]> = nb.offsets().iter().map(|&d| transform(d)).collect();
    let lengths: Vec<f64> = transformed
        .iter()
        .map(|v| v.iter().map(|x| x * x).sum::<f64>().sqrt())
        .collect();
    let dirs: Vec<[f64; N]> = transformed
        .iter()
        .zip(&lengths)
        .map(|(v, &len)| std::array::from_fn(|a| v[a] / len))
        .collect();

    let dphi = sphere::partition(&dirs)?;

    Ok(dphi
        .iter()
        .zip(&lengths)
        .map(|(&phi, &len)| real::<T>(phi * (det / len) / coef))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn n4_weight_is_quarter_pi() {
        let nb = Neighbourhood::<2>::from_symbol("N4").unwrap();
        let w: Vec<f64> = cauchy_crofton(&nb).unwrap();
        for &x in &w {
            assert!((x - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
        }
    }

    #[test]
    fn weights_match_for_opposite_directions() {
        for sym in ["N8", "N16", "N32"] {
            let nb = Neighbourhood::<2>::from_symbol(sym).unwrap();
            let w: Vec<f64> = cauchy_crofton(&nb).unwrap();
            for i in (0..nb.len()).step_by(2) {
                assert!(
                    (w[i] - w[i + 1]).abs() < 1e-12,
                    "{sym}: w({i}) != w({})",
                    i + 1
                );
            }
        }
    }

    #[test]
    fn partition_covers_the_full_sphere() {
        // The shares behind the weights must tile the sphere exactly.
        let nb = Neighbourhood::<3>::from_symbol("N26").unwrap();
        let dirs: Vec<[f64; 3]> = nb
            .offsets()
            .iter()
            .map(|d| {
                let len = d.iter().map(|&x| (x * x) as f64).sum::<f64>().sqrt();
                [d[0] as f64 / len, d[1] as f64 / len, d[2] as f64 / len]
            })
            .collect();
        let total: f64 = sphere::partition(&dirs).unwrap().iter().sum();
        assert!((total - 4.0 * std::f64::consts::PI).abs() < 1e-9);
    }

    #[test]
    fn longer_directions_weigh_less() {
        let nb = Neighbourhood::<2>::from_symbol("N16").unwrap();
        let w: Vec<f64> = cauchy_crofton(&nb).unwrap();
        let axis = nb.offsets().iter().position(|&d| d == [0, 1]).unwrap();
        let knight = nb.offsets().iter().position(|&d| d == [1, 2]).unwrap();
        assert!(w[axis] > w[knight]);
    }

    #[test]
    fn doubled_isotropic_spacing_scales_weights() {
        let nb = Neighbourhood::<2>::from_symbol("N8").unwrap();
        let base: Vec<f64> = cauchy_crofton(&nb).unwrap();
        let scaled: Vec<f64> = anisotropic(&nb, [2.0, 2.0]).unwrap();
        // det(M) / |M d| = 4 / (2 |d|): every weight doubles.
        for (b, s) in base.iter().zip(&scaled) {
            assert!((s - 2.0 * b).abs() < 1e-9);
        }
    }

    #[test]
    fn identity_riemannian_matches_euclidean() {
        let nb = Neighbourhood::<2>::from_symbol("N8").unwrap();
        let base: Vec<f64> = cauchy_crofton(&nb).unwrap();
        let rm: Vec<f64> = riemannian_2d(&nb, &Matrix2::identity()).unwrap();
        for (b, r) in base.iter().zip(&rm) {
            assert!((b - r).abs() < 1e-12);
        }
    }

    #[test]
    fn degenerate_transform_is_rejected() {
        let nb = Neighbourhood::<2>::from_symbol("N4").unwrap();
        let singular = Matrix2::new(1.0, 0.0, 1.0, 0.0);
        assert!(riemannian_2d::<f64>(&nb, &singular).is_err());
        assert!(anisotropic::<f64, 2>(&nb, [1.0, 0.0]).is_err());
    }
}
