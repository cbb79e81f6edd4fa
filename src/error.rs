use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AlignError>;

#[derive(Error, Debug)]
pub enum AlignError {
    #[error("Could not read image: {}", path.display())]
    ReadImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Could not write image: {}", path.display())]
    WriteImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("not enough matches to estimate a homography: {found} found, {required} required")]
    TooFewMatches { found: usize, required: usize },

    #[error("no homography found")]
    NoHomography,

    #[error("degenerate point configuration")]
    DegeneratePoints,

    #[error("homography is singular")]
    SingularHomography,

    #[error("image dimensions differ: {first:?} vs {second:?}")]
    DimensionMismatch {
        first: (u32, u32),
        second: (u32, u32),
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
