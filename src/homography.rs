use nalgebra as na;

use crate::error::{AlignError, Result};
use crate::matching::FeatureMatch;
use crate::ransac::Model;

/// Move the centroid to the origin and scale each axis to unit mean absolute
/// deviation. Returns the normalized points and the transform that produced them.
fn normalize(points: &[na::Point2<f64>]) -> Result<(Vec<na::Point2<f64>>, na::Matrix3<f64>)> {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dev_x = points.iter().map(|p| (p.x - mean_x).abs()).sum::<f64>() / n;
    let mean_dev_y = points.iter().map(|p| (p.y - mean_y).abs()).sum::<f64>() / n;
    if !(mean_dev_x > f64::EPSILON && mean_dev_y > f64::EPSILON) {
        return Err(AlignError::DegeneratePoints);
    }
    let sx = 1.0 / mean_dev_x;
    let sy = 1.0 / mean_dev_y;

    let normed = points
        .iter()
        .map(|p| na::Point2::new(sx * (p.x - mean_x), sy * (p.y - mean_y)))
        .collect();

    let mut t = na::Matrix3::<f64>::identity();
    t[(0, 0)] = sx;
    t[(0, 2)] = -mean_x * sx;
    t[(1, 1)] = sy;
    t[(1, 2)] = -mean_y * sy;

    Ok((normed, t))
}

/// Normalized DLT: the homography `H` with `dst ~ H * src`, scaled so `H[2,2] = 1`.
pub fn compute_h(src: &[na::Point2<f64>], dst: &[na::Point2<f64>]) -> Result<na::Matrix3<f64>> {
    let num_points = src.len();
    if num_points != dst.len() {
        return Err(AlignError::InvalidParameter(format!(
            "point count mismatch: {} vs {}",
            num_points,
            dst.len()
        )));
    }
    // at least 4 points to compute H
    if num_points < 4 {
        return Err(AlignError::TooFewMatches {
            found: num_points,
            required: 4,
        });
    }

    let (norm_src, t_src) = normalize(src)?;
    let (norm_dst, t_dst) = normalize(dst)?;

    // pad to 9 rows so the SVD always exposes the full right singular basis
    let rows = (2 * num_points).max(9);
    let mut a = na::DMatrix::<f64>::zeros(rows, 9);
    for (idx, (s, d)) in norm_src.iter().zip(norm_dst.iter()).enumerate() {
        let (x, y) = (s.x, s.y);
        let (u, v) = (d.x, d.y);
        let ax = [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, -u];
        let ay = [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, -v];
        for c in 0..9 {
            a[(2 * idx, c)] = ax[c];
            a[(2 * idx + 1, c)] = ay[c];
        }
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(AlignError::NoHomography)?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .ok_or(AlignError::NoHomography)?;
    let h = v_t.row(min_idx);
    let h_norm = na::Matrix3::from_iterator(h.iter().cloned()).transpose();

    let t_dst_inv = t_dst.try_inverse().ok_or(AlignError::DegeneratePoints)?;
    let ret = t_dst_inv * h_norm * t_src;
    if ret[(2, 2)].abs() < 1e-12 {
        return Err(AlignError::SingularHomography);
    }
    Ok(ret / ret[(2, 2)])
}

/// Apply `h` to `p`; `None` when the point maps to infinity.
pub fn project(h: &na::Matrix3<f64>, p: &na::Point2<f64>) -> Option<na::Point2<f64>> {
    let v = h * na::Vector3::new(p.x, p.y, 1.0);
    if v.z.abs() < 1e-12 {
        return None;
    }
    Some(na::Point2::new(v.x / v.z, v.y / v.z))
}

/// RANSAC model: maps `FeatureMatch::first` onto `FeatureMatch::second`.
pub struct HomographyModel;

impl Model for HomographyModel {
    type Point = FeatureMatch;
    type ModelParams = na::Matrix3<f64>;

    fn min_samples() -> usize {
        4
    }

    fn estimate_model(points: &[Self::Point]) -> Option<Self::ModelParams> {
        let src: Vec<_> = points.iter().map(|m| m.first).collect();
        let dst: Vec<_> = points.iter().map(|m| m.second).collect();
        compute_h(&src, &dst).ok()
    }

    fn consensus_distance(params: &Self::ModelParams, point: &Self::Point) -> f64 {
        match project(params, &point.first) {
            Some(p) => (p - point.second).norm(),
            None => f64::INFINITY,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ground_truth() -> na::Matrix3<f64> {
        na::Matrix3::new(1.05, 0.02, 12.0, -0.03, 0.98, -7.5, 1e-5, -2e-5, 1.0)
    }

    fn grid_points() -> Vec<na::Point2<f64>> {
        let mut pts = Vec::new();
        for y in 0..4 {
            for x in 0..5 {
                pts.push(na::Point2::new(20.0 + 40.0 * x as f64, 15.0 + 35.0 * y as f64));
            }
        }
        pts
    }

    #[test]
    fn test_recovers_known_homography() -> Result<()> {
        let h = ground_truth();
        let src = grid_points();
        let dst: Vec<_> = src.iter().filter_map(|p| project(&h, p)).collect();
        let est = compute_h(&src, &dst)?;
        assert!((est - h).abs().max() < 1e-6, "{est}");
        Ok(())
    }

    #[test]
    fn test_exactly_four_points() -> Result<()> {
        let h = ground_truth();
        let src = vec![
            na::Point2::new(0.0, 0.0),
            na::Point2::new(100.0, 0.0),
            na::Point2::new(100.0, 80.0),
            na::Point2::new(0.0, 80.0),
        ];
        let dst: Vec<_> = src.iter().filter_map(|p| project(&h, p)).collect();
        let est = compute_h(&src, &dst)?;
        for (s, d) in src.iter().zip(&dst) {
            let p = project(&est, s).expect("finite");
            assert!((p - d).norm() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_too_few_points() {
        let pts = vec![na::Point2::new(0.0, 0.0); 3];
        assert!(matches!(
            compute_h(&pts, &pts),
            Err(AlignError::TooFewMatches { found: 3, required: 4 })
        ));
    }

    #[test]
    fn test_collinear_axis_is_degenerate() {
        let src: Vec<_> = (0..5).map(|i| na::Point2::new(i as f64, 3.0)).collect();
        assert!(matches!(
            compute_h(&src, &src),
            Err(AlignError::DegeneratePoints)
        ));
    }

    #[test]
    fn test_consensus_distance() {
        let h = na::Matrix3::new(1.0, 0.0, 5.0, 0.0, 1.0, -2.0, 0.0, 0.0, 1.0);
        let m = FeatureMatch {
            first: na::Point2::new(10.0, 10.0),
            second: na::Point2::new(18.0, 12.0),
            distance: 0,
        };
        let d = HomographyModel::consensus_distance(&h, &m);
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_few_exact_matches_fit_with_default_ransac() {
        use crate::align::AlignParams;
        use crate::ransac::ransac;
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let pts = [
            (10.0, 12.0),
            (150.0, 20.0),
            (140.0, 130.0),
            (25.0, 110.0),
            (83.0, 47.0),
            (61.0, 95.0),
            (122.0, 71.0),
        ];
        let params = AlignParams::default().ransac;
        for n in 4..=7 {
            let matches: Vec<FeatureMatch> = pts[..n]
                .iter()
                .map(|&(x, y)| FeatureMatch {
                    first: na::Point2::new(x, y),
                    second: na::Point2::new(x + 9.0, y - 6.0),
                    distance: 0,
                })
                .collect();
            let mut rng = StdRng::seed_from_u64(n as u64);
            let fit = ransac::<HomographyModel, _>(&matches, &params, &mut rng)
                .unwrap_or_else(|| panic!("no fit for {n} matches"));
            assert_eq!(fit.inliers.len(), n);
            let p = project(&fit.model, &na::Point2::new(50.0, 50.0)).expect("finite");
            assert!((p - na::Point2::new(59.0, 44.0)).norm() < 1e-6, "{}", fit.model);
        }
    }
}
