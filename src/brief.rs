//! BRIEF binary descriptors over a smoothed gray plane.

use nalgebra as na;
use rand::Rng;

use crate::filter::GrayF64;
use crate::harris::Corner;

/// Offset pair `(p, q)` relative to the keypoint; bit is `I(p) < I(q)`.
pub type TestPair = ((i32, i32), (i32, i32));

#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    pub point: na::Point2<f64>,
    pub bits: Vec<u64>,
}

#[inline]
pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.bits
        .iter()
        .zip(&b.bits)
        .map(|(x, y)| (x ^ y).count_ones())
        .sum()
}

/// Box-Muller sample with standard deviation `sigma`, clamped to `[-limit, limit]`.
fn normal_clamped<R: Rng + ?Sized>(rng: &mut R, sigma: f64, limit: i32) -> i32 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    ((z * sigma).round() as i32).clamp(-limit, limit)
}

/// Sample `n_bits` test pairs isotropically around the patch center
/// (sigma = patch_size / 5), the second sampling strategy of the BRIEF paper.
pub fn generate_pairs<R: Rng + ?Sized>(
    n_bits: usize,
    patch_size: u32,
    rng: &mut R,
) -> Vec<TestPair> {
    let half = (patch_size / 2) as i32;
    let sigma = patch_size as f64 / 5.0;
    (0..n_bits)
        .map(|_| {
            (
                (normal_clamped(rng, sigma, half), normal_clamped(rng, sigma, half)),
                (normal_clamped(rng, sigma, half), normal_clamped(rng, sigma, half)),
            )
        })
        .collect()
}

/// Describe every corner whose patch lies fully inside the image.
pub fn brief_descriptor(
    smoothed: &GrayF64,
    corners: &[Corner],
    patch_size: u32,
    pairs: &[TestPair],
) -> Vec<Descriptor> {
    let half = (patch_size / 2) as i64;
    let words = pairs.len().div_ceil(64);
    let (w, h) = (smoothed.width as i64, smoothed.height as i64);

    corners
        .iter()
        .filter_map(|c| {
            let cx = c.point.x.round() as i64;
            let cy = c.point.y.round() as i64;
            if cx - half < 0 || cy - half < 0 || cx + half >= w || cy + half >= h {
                return None;
            }
            let mut bits = vec![0u64; words];
            for (i, &((px, py), (qx, qy))) in pairs.iter().enumerate() {
                let p = smoothed.get((cx + px as i64) as u32, (cy + py as i64) as u32);
                let q = smoothed.get((cx + qx as i64) as u32, (cy + qy as i64) as u32);
                if p < q {
                    bits[i / 64] |= 1u64 << (i % 64);
                }
            }
            Some(Descriptor {
                point: c.point,
                bits,
            })
        })
        .collect()
}
