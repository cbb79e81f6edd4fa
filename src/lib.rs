//! Register one image onto another with a feature-based homography and blend
//! the aligned pair.
//!
//! The pipeline is Harris corners, BRIEF descriptors, brute-force Hamming
//! matching with Lowe's ratio test, a RANSAC homography and a bilinear
//! perspective warp; see [`align::align_images`] and [`blend::blend`].

pub mod align;
pub mod app;
pub mod blend;
pub mod brief;
pub mod config;
pub mod error;
pub mod filter;
pub mod harris;
pub mod homography;
pub mod matching;
pub mod ransac;

pub use crate::align::{align_images, AlignParams, Alignment};
pub use crate::blend::{blend, BlendMode};
pub use crate::error::{AlignError, Result};
