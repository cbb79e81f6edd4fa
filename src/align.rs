use image::{DynamicImage, GenericImageView, ImageBuffer, Pixel};
use log::{debug, info};
use nalgebra as na;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::brief;
use crate::error::{AlignError, Result};
use crate::filter;
use crate::harris::{self, HarrisParams};
use crate::homography::{self, HomographyModel};
use crate::matching;
use crate::ransac::{self, Model, RansacParams};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignParams {
    pub harris: HarrisParams,
    /// Smoothing applied before sampling BRIEF tests.
    pub descriptor_sigma: f64,
    pub patch_size: u32,
    pub descriptor_bits: usize,
    /// Lowe ratio; a match is kept when `best < ratio * second_best`.
    pub ratio: f64,
    pub cross_check: bool,
    pub ransac: RansacParams,
    /// Seeds BRIEF pair sampling and RANSAC; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for AlignParams {
    fn default() -> Self {
        Self {
            harris: HarrisParams::default(),
            descriptor_sigma: 2.0,
            patch_size: 31,
            descriptor_bits: 256,
            ratio: 0.75,
            cross_check: false,
            ransac: RansacParams::default(),
            seed: None,
        }
    }
}

impl AlignParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return Err(AlignError::InvalidParameter(format!(
                "ratio must be in (0, 1], got {}",
                self.ratio
            )));
        }
        if self.patch_size < 3 {
            return Err(AlignError::InvalidParameter("patch size must be >= 3".into()));
        }
        if self.descriptor_bits == 0 {
            return Err(AlignError::InvalidParameter("descriptor bits must be >= 1".into()));
        }
        if self.ransac.iterations == 0 {
            return Err(AlignError::InvalidParameter("ransac iterations must be >= 1".into()));
        }
        if !(self.ransac.threshold > 0.0) {
            return Err(AlignError::InvalidParameter("ransac threshold must be > 0".into()));
        }
        if !(self.harris.sigma > 0.0 && self.descriptor_sigma > 0.0) {
            return Err(AlignError::InvalidParameter("sigma must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AlignStats {
    pub corners: (usize, usize),
    pub descriptors: (usize, usize),
    pub matches: usize,
    pub inliers: usize,
}

pub struct Alignment {
    /// First image warped into the frame of the second.
    pub aligned: DynamicImage,
    /// Maps first-image pixel coordinates to second-image coordinates.
    pub homography: na::Matrix3<f64>,
    pub stats: AlignStats,
}

/// Bilinear sample with pixel centers on integer coordinates. `None` outside the image.
pub fn bilinear_interpolation<P>(img: &ImageBuffer<P, Vec<u8>>, x: f64, y: f64) -> Option<P>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    const EPS: f64 = 1e-9;
    let max_x = (width - 1) as f64;
    let max_y = (height - 1) as f64;
    if !(x >= -EPS && y >= -EPS && x <= max_x + EPS && y <= max_y + EPS) {
        return None;
    }
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut out = *p00;
    for (c, o) in out.channels_mut().iter_mut().enumerate() {
        let top = p00.channels()[c] as f64 * (1.0 - fx) + p10.channels()[c] as f64 * fx;
        let bottom = p01.channels()[c] as f64 * (1.0 - fx) + p11.channels()[c] as f64 * fx;
        *o = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(out)
}

fn warp_buffer<P>(
    src: &ImageBuffer<P, Vec<u8>>,
    h_inv: &na::Matrix3<f64>,
    width: u32,
    height: u32,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let mut out = ImageBuffer::new(width, height);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let Some(p) = homography::project(h_inv, &na::Point2::new(x as f64, y as f64)) else {
            continue;
        };
        if let Some(v) = bilinear_interpolation(src, p.x, p.y) {
            *px = v;
        }
    }
    out
}

/// Warp `img` by `h` into a `width` x `height` canvas. Destination pixels that
/// map outside the source stay zero.
pub fn warp_perspective(
    img: &DynamicImage,
    h: &na::Matrix3<f64>,
    width: u32,
    height: u32,
) -> Result<DynamicImage> {
    let h_inv = h.try_inverse().ok_or(AlignError::SingularHomography)?;
    let warped = match img {
        DynamicImage::ImageLuma8(b) => {
            DynamicImage::ImageLuma8(warp_buffer(b, &h_inv, width, height))
        }
        DynamicImage::ImageLumaA8(b) => {
            DynamicImage::ImageLumaA8(warp_buffer(b, &h_inv, width, height))
        }
        DynamicImage::ImageRgb8(b) => {
            DynamicImage::ImageRgb8(warp_buffer(b, &h_inv, width, height))
        }
        DynamicImage::ImageRgba8(b) => {
            DynamicImage::ImageRgba8(warp_buffer(b, &h_inv, width, height))
        }
        other => {
            DynamicImage::ImageRgba8(warp_buffer(&other.to_rgba8(), &h_inv, width, height))
        }
    };
    Ok(warped)
}

fn describe(
    img: &DynamicImage,
    params: &AlignParams,
    pairs: &[brief::TestPair],
) -> (usize, Vec<brief::Descriptor>) {
    let gray = filter::to_gray_f64(img);
    let corners = harris::detect_harris_corners(&gray, &params.harris);
    let smoothed = filter::gaussian_blur(&gray, params.descriptor_sigma);
    let descriptors = brief::brief_descriptor(&smoothed, &corners, params.patch_size, pairs);
    (corners.len(), descriptors)
}

/// Estimate the homography taking `im1` onto `im2` and warp `im1` into `im2`'s frame.
pub fn align_images(
    im1: &DynamicImage,
    im2: &DynamicImage,
    params: &AlignParams,
) -> Result<Alignment> {
    params.validate()?;
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let pairs = brief::generate_pairs(params.descriptor_bits, params.patch_size, &mut rng);
    let (corners1, descriptors1) = describe(im1, params, &pairs);
    let (corners2, descriptors2) = describe(im2, params, &pairs);
    info!(
        "detected {corners1}/{corners2} corners, described {}/{}",
        descriptors1.len(),
        descriptors2.len()
    );

    let matches = matching::match_descriptors(
        &descriptors1,
        &descriptors2,
        params.ratio,
        params.cross_check,
    );
    info!("{} good matches", matches.len());
    let required = HomographyModel::min_samples();
    if matches.len() < required {
        return Err(AlignError::TooFewMatches {
            found: matches.len(),
            required,
        });
    }

    let ransac_params = RansacParams {
        min_inliers: params.ransac.min_inliers.max(required),
        ..params.ransac.clone()
    };
    let fit = ransac::ransac::<HomographyModel, _>(&matches, &ransac_params, &mut rng)
        .ok_or(AlignError::NoHomography)?;
    info!("homography has {} inliers of {} matches", fit.inliers.len(), matches.len());
    debug!("homography: {}", fit.model);

    let (width, height) = im2.dimensions();
    let aligned = warp_perspective(im1, &fit.model, width, height)?;

    Ok(Alignment {
        aligned,
        homography: fit.model,
        stats: AlignStats {
            corners: (corners1, corners2),
            descriptors: (descriptors1.len(), descriptors2.len()),
            matches: matches.len(),
            inliers: fit.inliers.len(),
        },
    })
}
