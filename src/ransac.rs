use log::debug;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub trait Model
where
    Self::Point: Clone,
{
    type Point;
    type ModelParams;

    /// Smallest sample `estimate_model` can fit.
    fn min_samples() -> usize;
    fn estimate_model(points: &[Self::Point]) -> Option<Self::ModelParams>;
    fn consensus_distance(params: &Self::ModelParams, point: &Self::Point) -> f64;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Points drawn per hypothesis; raised to `Model::min_samples` if smaller.
    pub sample_size: usize,
    pub iterations: usize,
    /// Inlier threshold on `consensus_distance`.
    pub threshold: f64,
    /// Minimum consensus for a hypothesis to be accepted.
    pub min_inliers: usize,
    pub refit: bool,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            sample_size: 4,
            iterations: 2000,
            threshold: 3.0,
            min_inliers: 4,
            refit: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RansacFit<P> {
    pub model: P,
    /// Indices into the input points.
    pub inliers: Vec<usize>,
}

fn consensus<M: Model>(points: &[M::Point], params: &M::ModelParams, t: f64) -> Vec<usize> {
    points
        .iter()
        .enumerate()
        .filter(|(_, p)| M::consensus_distance(params, p) < t)
        .map(|(i, _)| i)
        .collect()
}

pub fn ransac<M: Model, R: Rng + ?Sized>(
    points: &[M::Point],
    params: &RansacParams,
    rng: &mut R,
) -> Option<RansacFit<M::ModelParams>> {
    let n = params.sample_size.max(M::min_samples());
    if points.len() < n {
        return None;
    }

    let mut best_fit: Option<RansacFit<M::ModelParams>> = None;

    for _ in 0..params.iterations {
        let sample_points: Vec<M::Point> = sample(rng, points.len(), n)
            .into_iter()
            .map(|i| points[i].clone())
            .collect();
        let Some(model) = M::estimate_model(&sample_points) else {
            continue;
        };
        let inliers = consensus::<M>(points, &model, params.threshold);
        let best = best_fit.as_ref().map_or(0, |f| f.inliers.len());
        if inliers.len() > best && inliers.len() >= params.min_inliers {
            best_fit = Some(RansacFit { model, inliers });
            if best_fit.as_ref().is_some_and(|f| f.inliers.len() == points.len()) {
                break;
            }
        }
    }

    let fit = best_fit?;
    debug!("ransac: best hypothesis has {} of {} inliers", fit.inliers.len(), points.len());
    if !params.refit {
        return Some(fit);
    }

    let inlier_points: Vec<M::Point> = fit.inliers.iter().map(|&i| points[i].clone()).collect();
    match M::estimate_model(&inlier_points) {
        Some(model) => {
            let inliers = consensus::<M>(points, &model, params.threshold);
            if inliers.len() >= fit.inliers.len() {
                debug!("ransac: refit keeps {} inliers", inliers.len());
                Some(RansacFit { model, inliers })
            } else {
                Some(fit)
            }
        }
        None => Some(fit),
    }
}
