//! JSON run configuration. Every field is optional; command-line flags win.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::align::AlignParams;
use crate::blend::BlendMode;
use crate::error::{AlignError, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlignConfig {
    pub grayscale: Option<bool>,
    pub mode: Option<BlendMode>,
    pub alpha: Option<f64>,
    pub homography_out: Option<PathBuf>,
    pub aligned_out: Option<PathBuf>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub align: AlignParams,
}

pub fn load_config(path: &Path) -> Result<AlignConfig> {
    let file = File::open(path)
        .map_err(|e| AlignError::Config(format!("opening {}: {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AlignError::Config(format!("parsing {}: {e}", path.display())))
}
