//! Scalar abstraction shared by the solvers and drivers.
use num_traits::{Float, FromPrimitive, NumAssign};

/// Floating-point scalar used for image samples, capacities, residuals,
/// energies and tolerances. A pipeline instance picks one type (`f32` or
/// `f64`) and keeps it throughout so comparisons never mix precisions.
pub trait Real:
    Float + FromPrimitive + NumAssign + Default + std::fmt::Debug + Send + Sync + 'static
{
}

impl Real for f32 {}
impl Real for f64 {}

/// Converts an `f64` constant into the pipeline scalar.
#[inline]
pub(crate) fn real<T: Real>(v: f64) -> T {
    T::from_f64(v).expect("constant representable in the pipeline scalar")
}

/// Widens a pipeline scalar for logging and reports.
#[inline]
pub(crate) fn wide<T: Real>(v: T) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}
