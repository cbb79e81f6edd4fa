use log::debug;
use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::filter::{self, GrayF64};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarrisCornerDetector {
    /// det(M) - k * trace(M)^2
    Harris,
    /// min eigenvalue of M
    ShiTomasi,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HarrisParams {
    pub detector: HarrisCornerDetector,
    pub k: f64,
    /// Gaussian window applied to the structure tensor.
    pub sigma: f64,
    /// Responses below `threshold_rel * max_response` are discarded.
    pub threshold_rel: f64,
    pub nms_radius: u32,
    pub max_corners: usize,
    /// Corners closer than this to the image border are dropped.
    pub border: u32,
}

impl Default for HarrisParams {
    fn default() -> Self {
        Self {
            detector: HarrisCornerDetector::Harris,
            k: 0.04,
            sigma: 1.5,
            threshold_rel: 0.01,
            nms_radius: 4,
            max_corners: 1000,
            border: 16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corner {
    pub point: na::Point2<f64>,
    pub response: f64,
}

pub fn corner_response(gray: &GrayF64, params: &HarrisParams) -> GrayF64 {
    let (gx, gy) = filter::gradients(gray);
    let sxx = filter::gaussian_blur(&filter::product(&gx, &gx), params.sigma);
    let syy = filter::gaussian_blur(&filter::product(&gy, &gy), params.sigma);
    let sxy = filter::gaussian_blur(&filter::product(&gx, &gy), params.sigma);

    let data = sxx
        .data
        .iter()
        .zip(&syy.data)
        .zip(&sxy.data)
        .map(|((&a, &b), &c)| match params.detector {
            HarrisCornerDetector::Harris => {
                let det = a * b - c * c;
                let trace = a + b;
                det - params.k * trace * trace
            }
            HarrisCornerDetector::ShiTomasi => {
                let half_trace = 0.5 * (a + b);
                let d = (0.25 * (a - b) * (a - b) + c * c).sqrt();
                half_trace - d
            }
        })
        .collect();

    GrayF64 {
        width: gray.width,
        height: gray.height,
        data,
    }
}

fn is_local_max(response: &GrayF64, x: u32, y: u32, radius: u32) -> bool {
    let v = response.get(x, y);
    let x0 = x.saturating_sub(radius);
    let y0 = y.saturating_sub(radius);
    let x1 = x.saturating_add(radius).min(response.width - 1);
    let y1 = y.saturating_add(radius).min(response.height - 1);
    for yy in y0..=y1 {
        for xx in x0..=x1 {
            if (xx, yy) == (x, y) {
                continue;
            }
            let n = response.get(xx, yy);
            // ties resolved towards the first pixel in raster order
            if n > v || (n == v && (yy, xx) < (y, x)) {
                return false;
            }
        }
    }
    true
}

/// Detect corners, strongest first.
pub fn detect_harris_corners(gray: &GrayF64, params: &HarrisParams) -> Vec<Corner> {
    let border = params.border;
    if gray.width <= border.saturating_mul(2) || gray.height <= border.saturating_mul(2) {
        return Vec::new();
    }

    let response = corner_response(gray, params);
    let max_response = response.max();
    if !(max_response > 0.0) {
        return Vec::new();
    }
    let threshold = params.threshold_rel * max_response;

    let mut corners = Vec::new();
    for y in border..gray.height - border {
        for x in border..gray.width - border {
            let v = response.get(x, y);
            if v > threshold && v > 0.0 && is_local_max(&response, x, y, params.nms_radius) {
                corners.push(Corner {
                    point: na::Point2::new(x as f64, y as f64),
                    response: v,
                });
            }
        }
    }

    corners.sort_by(|a, b| b.response.total_cmp(&a.response));
    corners.truncate(params.max_corners);
    debug!(
        "harris: {} corners above {:.3e} (max response {:.3e})",
        corners.len(),
        threshold,
        max_response
    );
    corners
}
