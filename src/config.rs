//! JSON runtime configuration for the CLI.
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::segmentation::chanvese::ChanVeseOptions;
use crate::segmentation::mumford_shah::MumfordShahOptions;
use crate::segmentation::rousson_deriche::RoussonDericheOptions;

#[derive(Clone, Default, Deserialize)]
pub struct OutputConfig {
    pub labels_out: Option<PathBuf>,
    pub json_out: Option<PathBuf>,
}

/// Segmentation method plus its parameters, selected by the `name` tag.
#[derive(Clone, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum MethodConfig {
    ChanVese(ChanVeseOptions<f64>),
    MumfordShah(MumfordShahOptions<f64>),
    RoussonDeriche(RoussonDericheOptions<f64>),
}

#[derive(Clone, Deserialize)]
pub struct RuntimeConfig {
    pub input_path: PathBuf,
    #[serde(default)]
    pub output: OutputConfig,
    pub method: MethodConfig,
}

/// Reads and parses a runtime configuration. Unreadable or malformed files
/// surface as [`Error::InvalidArgument`] so CLI and library callers share one
/// error channel.
pub fn load_config(path: &Path) -> Result<RuntimeConfig, Error> {
    let bytes = fs::read(path).map_err(|e| {
        Error::InvalidArgument(format!("cannot read config {}: {e}", path.display()))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        Error::InvalidArgument(format!(
            "config {} is not a valid runtime configuration: {e}",
            path.display()
        ))
    })
}
