use log::debug;
use nalgebra as na;

use crate::brief::{hamming, Descriptor};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: u32,
}

/// A correspondence: `first` lies in the image being aligned, `second` in the reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureMatch {
    pub first: na::Point2<f64>,
    pub second: na::Point2<f64>,
    pub distance: u32,
}

/// For every query descriptor, its `k` nearest train descriptors by Hamming
/// distance, closest first.
pub fn knn_match(query: &[Descriptor], train: &[Descriptor], k: usize) -> Vec<Vec<DMatch>> {
    query
        .iter()
        .enumerate()
        .map(|(qi, q)| {
            let mut best: Vec<DMatch> = Vec::with_capacity(k + 1);
            for (ti, t) in train.iter().enumerate() {
                let distance = hamming(q, t);
                let pos = best.partition_point(|m| m.distance <= distance);
                if pos < k {
                    best.insert(
                        pos,
                        DMatch {
                            query_idx: qi,
                            train_idx: ti,
                            distance,
                        },
                    );
                    best.truncate(k);
                }
            }
            best
        })
        .collect()
}

/// Lowe's ratio test. Queries with fewer than two neighbours are dropped.
pub fn ratio_filter(knn: &[Vec<DMatch>], ratio: f64) -> Vec<DMatch> {
    knn.iter()
        .filter_map(|m| match m.as_slice() {
            [best, second, ..] if (best.distance as f64) < ratio * second.distance as f64 => {
                Some(*best)
            }
            _ => None,
        })
        .collect()
}

/// Keep only matches whose train descriptor maps back to the same query.
pub fn cross_check(
    matches: Vec<DMatch>,
    query: &[Descriptor],
    train: &[Descriptor],
) -> Vec<DMatch> {
    let reverse = knn_match(train, query, 1);
    matches
        .into_iter()
        .filter(|m| {
            reverse[m.train_idx]
                .first()
                .is_some_and(|r| r.train_idx == m.query_idx)
        })
        .collect()
}

/// Ratio-filtered (and optionally cross-checked) matches resolved to points.
pub fn match_descriptors(
    query: &[Descriptor],
    train: &[Descriptor],
    ratio: f64,
    mutual: bool,
) -> Vec<FeatureMatch> {
    let knn = knn_match(query, train, 2);
    let mut good = ratio_filter(&knn, ratio);
    debug!(
        "matching: {} query, {} train, {} pass ratio {ratio}",
        query.len(),
        train.len(),
        good.len()
    );
    if mutual {
        good = cross_check(good, query, train);
        debug!("matching: {} survive cross-check", good.len());
    }

    good.iter()
        .map(|m| FeatureMatch {
            first: query[m.query_idx].point,
            second: train[m.train_idx].point,
            distance: m.distance,
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn desc(x: f64, word: u64) -> Descriptor {
        Descriptor {
            point: na::Point2::new(x, 0.0),
            bits: vec![word],
        }
    }

    #[test]
    fn test_knn_sorted_and_truncated() {
        let query = [desc(0.0, 0b0000)];
        let train = [desc(1.0, 0b0111), desc(2.0, 0b0001), desc(3.0, 0b0011)];
        let knn = knn_match(&query, &train, 2);
        assert_eq!(knn.len(), 1);
        let ids: Vec<_> = knn[0].iter().map(|m| m.train_idx).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(knn[0][0].distance, 1);
        assert_eq!(knn[0][1].distance, 2);
    }

    #[test]
    fn test_ratio_filter() {
        let query = [desc(0.0, 0b0000_0000), desc(1.0, 0b0001_1111)];
        // query 0: distances 1 and 7, kept; query 1: distances 4 and 4, ambiguous
        let train = [desc(10.0, 0b0000_0001), desc(11.0, 0b1111_1110)];
        let matches = match_descriptors(&query, &train, 0.75, false);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].first.x, 0.0);
        assert_eq!(matches[0].second.x, 10.0);
    }

    #[test]
    fn test_single_train_descriptor_drops_everything() {
        let query = [desc(0.0, 0)];
        let train = [desc(1.0, 0)];
        assert!(match_descriptors(&query, &train, 0.75, false).is_empty());
    }

    #[test]
    fn test_cross_check_rejects_non_mutual() {
        let query = [desc(0.0, 0b0000), desc(1.0, 0b0001)];
        let train = [desc(10.0, 0b0001), desc(11.0, 0b1111_0000)];
        let knn = knn_match(&query, &train, 1);
        let all: Vec<DMatch> = knn.into_iter().flatten().collect();
        assert_eq!(all.len(), 2);
        // both queries pick train 0, which only points back at query 1
        let kept = cross_check(all, &query, &train);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].query_idx, 1);
    }
}
