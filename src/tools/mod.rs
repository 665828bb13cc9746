//! Grid utilities shared by the drivers.

mod dist;

pub use dist::{boundary_band, cityblock_distance};
