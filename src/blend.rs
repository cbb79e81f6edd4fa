use std::fmt;
use std::str::FromStr;

use image::{DynamicImage, GenericImageView, ImageBuffer, Pixel};
use serde::{Deserialize, Serialize};

use crate::error::{AlignError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// `alpha * a + (1 - alpha) * b`
    #[default]
    #[value(alias = "avg", alias = "mean")]
    Average,
    Lighten,
    Darken,
    Multiply,
    Screen,
}

impl FromStr for BlendMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "average" | "avg" | "mean" => Ok(BlendMode::Average),
            "lighten" => Ok(BlendMode::Lighten),
            "darken" => Ok(BlendMode::Darken),
            "multiply" => Ok(BlendMode::Multiply),
            "screen" => Ok(BlendMode::Screen),
            other => Err(format!(
                "invalid blend mode '{other}', expected average|lighten|darken|multiply|screen"
            )),
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlendMode::Average => "average",
            BlendMode::Lighten => "lighten",
            BlendMode::Darken => "darken",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
        };
        f.write_str(s)
    }
}

#[inline]
fn saturate(v: f64) -> u8 {
    v.round_ties_even().clamp(0.0, 255.0) as u8
}

impl BlendMode {
    /// Combine one channel value from each image.
    #[inline]
    pub fn apply(self, a: u8, b: u8, alpha: f64) -> u8 {
        let (fa, fb) = (a as f64, b as f64);
        match self {
            BlendMode::Average => saturate(alpha * fa + (1.0 - alpha) * fb),
            BlendMode::Lighten => a.max(b),
            BlendMode::Darken => a.min(b),
            BlendMode::Multiply => saturate(fa * fb / 255.0),
            BlendMode::Screen => saturate(255.0 - (255.0 - fa) * (255.0 - fb) / 255.0),
        }
    }
}

fn blend_buffers<P>(
    a: &ImageBuffer<P, Vec<u8>>,
    b: &ImageBuffer<P, Vec<u8>>,
    mode: BlendMode,
    alpha: f64,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let mut out = a.clone();
    for (o, pb) in out.pixels_mut().zip(b.pixels()) {
        o.apply2(pb, |ca, cb| mode.apply(ca, cb, alpha));
    }
    out
}

/// Blend two equally sized images channel by channel. Both images are
/// compared as 8-bit gray when `grayscale` is set, otherwise as 8-bit RGB.
pub fn blend(
    a: &DynamicImage,
    b: &DynamicImage,
    mode: BlendMode,
    alpha: f64,
    grayscale: bool,
) -> Result<DynamicImage> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(AlignError::InvalidParameter(format!(
            "alpha must be in [0, 1], got {alpha}"
        )));
    }
    if a.dimensions() != b.dimensions() {
        return Err(AlignError::DimensionMismatch {
            first: a.dimensions(),
            second: b.dimensions(),
        });
    }

    let out = if grayscale {
        DynamicImage::ImageLuma8(blend_buffers(&a.to_luma8(), &b.to_luma8(), mode, alpha))
    } else {
        DynamicImage::ImageRgb8(blend_buffers(&a.to_rgb8(), &b.to_rgb8(), mode, alpha))
    };
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn test_modes() {
        assert_eq!(BlendMode::Average.apply(100, 201, 0.5), 150);
        assert_eq!(BlendMode::Average.apply(100, 200, 1.0), 100);
        assert_eq!(BlendMode::Lighten.apply(10, 200, 0.5), 200);
        assert_eq!(BlendMode::Darken.apply(10, 200, 0.5), 10);
        assert_eq!(BlendMode::Multiply.apply(255, 77, 0.5), 77);
        assert_eq!(BlendMode::Multiply.apply(128, 128, 0.5), 64);
        assert_eq!(BlendMode::Screen.apply(0, 77, 0.5), 77);
        assert_eq!(BlendMode::Screen.apply(128, 128, 0.5), 192);
    }

    #[test]
    fn test_multiply_and_screen_differ_from_lighten() {
        let (a, b) = (90, 160);
        let lighten = BlendMode::Lighten.apply(a, b, 0.5);
        assert_ne!(BlendMode::Multiply.apply(a, b, 0.5), lighten);
        assert_ne!(BlendMode::Screen.apply(a, b, 0.5), lighten);
    }

    #[test]
    fn test_parse() {
        assert_eq!("AVG".parse::<BlendMode>(), Ok(BlendMode::Average));
        assert_eq!("screen".parse::<BlendMode>(), Ok(BlendMode::Screen));
        assert!("overlay".parse::<BlendMode>().is_err());
        assert_eq!(BlendMode::Darken.to_string(), "darken");
    }

    #[test]
    fn test_blend_rgb_and_gray() -> Result<()> {
        let a = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([200, 0, 100])));
        let b = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([0, 100, 100])));
        let out = blend(&a, &b, BlendMode::Average, 0.5, false)?;
        assert_eq!(out.to_rgb8().get_pixel(1, 1), &Rgb([100, 50, 100]));

        let out = blend(&a, &b, BlendMode::Lighten, 0.5, true)?;
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
        let ga = a.to_luma8().get_pixel(0, 0)[0];
        let gb = b.to_luma8().get_pixel(0, 0)[0];
        assert_eq!(out.to_luma8().get_pixel(0, 0), &Luma([ga.max(gb)]));
        Ok(())
    }

    #[test]
    fn test_blend_rejects_bad_input() {
        let a = DynamicImage::ImageLuma8(GrayImage::new(3, 2));
        let b = DynamicImage::ImageLuma8(GrayImage::new(2, 3));
        assert!(matches!(
            blend(&a, &b, BlendMode::Average, 0.5, true),
            Err(AlignError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            blend(&a, &a, BlendMode::Average, 1.5, true),
            Err(AlignError::InvalidParameter(_))
        ));
    }
}
