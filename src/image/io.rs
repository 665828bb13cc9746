//! I/O helpers for grayscale images, label fields and JSON reports.
use serde::Serialize;
use std::fs;
use std::path::Path;

use image::GrayImage;

use crate::array::{DenseArray, Image};
use crate::math::{real, Real};

/// Load an image from disk, convert to 8-bit grayscale and scale the
/// intensities into `[0, 1]`. Axis order is row-major: shape `[height,
/// width]`.
pub fn load_grayscale<T: Real>(path: &Path) -> Result<Image<T, 2>, String> {
    let img = image::open(path)
        .map_err(|e| format!("Failed to open {}: {e}", path.display()))?
        .into_luma8();
    let h = img.height() as usize;
    let w = img.width() as usize;
    let scale: T = real(1.0 / 255.0);
    let data: Vec<T> = img
        .into_raw()
        .into_iter()
        .map(|p| T::from_u8(p).expect("8-bit sample fits the scalar") * scale)
        .collect();
    Ok(Image::from_array(DenseArray::from_vec([h, w], data)))
}

/// Save a label field as a grayscale PNG, spreading `0..k` over `0..=255`.
pub fn save_labels(labels: &DenseArray<u8, 2>, k: usize, path: &Path) -> Result<(), String> {
    prepare_destination(path)?;
    let [h, w] = labels.shape();
    let step = 255.0 / (k.max(2) - 1) as f64;
    let mut out = GrayImage::new(w as u32, h as u32);
    for r in 0..h {
        for c in 0..w {
            let v = (*labels.get([r, c]) as f64 * step).round().clamp(0.0, 255.0);
            out.put_pixel(c as u32, r as u32, image::Luma([v as u8]));
        }
    }
    out.save(path)
        .map_err(|e| format!("Failed to save {}: {e}", path.display()))
}

/// Serialize a value as pretty JSON to `path`, creating parent directories.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    prepare_destination(path)?;
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| format!("Report for {} does not serialize: {e}", path.display()))?;
    fs::write(path, json).map_err(|e| format!("Cannot write {}: {e}", path.display()))
}

/// Creates the directory a file is about to land in, if any.
fn prepare_destination(path: &Path) -> Result<(), String> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir)
            .map_err(|e| format!("Cannot create directory {}: {e}", dir.display())),
        _ => Ok(()),
    }
}
