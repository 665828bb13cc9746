#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod array;
pub mod config;
pub mod error;
pub mod flow;
pub mod nbhood;
pub mod segmentation;
pub mod types;

// "Expert" modules - public, but considered unstable internals.
pub mod image;
pub mod tools;

mod math;

// --- High-level re-exports -------------------------------------------------

pub use crate::array::{DenseArray, Image};
pub use crate::error::Error;
pub use crate::flow::{GridMaxFlow, TerminalOrigin};
pub use crate::math::Real;
pub use crate::nbhood::Neighbourhood;
pub use crate::segmentation::Termination;

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use gridcut::prelude::*;
///
/// # fn main() -> Result<(), gridcut::Error> {
/// let img: Image<f64, 2> = Image::from_fn([32, 32], |c| (c[1] >= 16) as u8 as f64);
/// let out = chanvese::segment(&img, &ChanVeseOptions::default())?;
/// println!("energy={:.4} after {} iterations", out.energy, out.iterations);
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::array::{DenseArray, Image};
    pub use crate::flow::{GridMaxFlow, TerminalOrigin};
    pub use crate::nbhood::Neighbourhood;
    pub use crate::segmentation::chanvese::{self, ChanVeseOptions};
    pub use crate::segmentation::mumford_shah::{self, MumfordShahOptions};
    pub use crate::segmentation::rousson_deriche::{self, RoussonDericheOptions};
    pub use crate::segmentation::Termination;
    pub use crate::types::{MASK_BACKGROUND_FIXED, MASK_FOREGROUND_FIXED, MASK_UNKNOWN};
    pub use crate::Error;
}
