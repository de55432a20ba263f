// src/analysis/boundary_estimator.rs
//
// Raw left/right lane-boundary pixel estimates from a segmentation mask.
//
// Input preparation for the lane tracker. Strategies are interchangeable
// and picked in config (`lane.estimator`); the tracker and the lane-change /
// departure state machines downstream never know which one ran.
//
// Both strategies look at the same band of the mask (60%-95% of the height,
// where markings are closest and clearest) and pick the boundary nearest
// the ego column on each side.

use crate::interface::LaneMask;
use ndarray::{s, Array1, Axis};
use serde::{Deserialize, Serialize};

const BAND_TOP: f32 = 0.6;
const BAND_BOTTOM: f32 = 0.95;

/// Per-frame, unsmoothed boundary columns in mask pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawBoundaries {
    pub left: Option<f32>,
    pub right: Option<f32>,
}

impl RawBoundaries {
    pub const NONE: Self = Self {
        left: None,
        right: None,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryStrategy {
    /// Weighted column sums, columns clustered by gap, nearest cluster each side
    ColumnCluster,
    /// Columns above a fraction of the strongest column, nearest run each side
    PeakColumn,
}

pub trait BoundaryEstimator: Send {
    fn name(&self) -> &'static str;
    fn estimate(&self, mask: &LaneMask, vehicle_x: f32) -> RawBoundaries;
}

pub fn build_estimator(
    strategy: BoundaryStrategy,
    mask_threshold: f32,
) -> Box<dyn BoundaryEstimator> {
    match strategy {
        BoundaryStrategy::ColumnCluster => Box::new(ColumnClusterEstimator {
            mask_threshold,
            ..Default::default()
        }),
        BoundaryStrategy::PeakColumn => Box::new(PeakColumnEstimator {
            mask_threshold,
            ..Default::default()
        }),
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Column sums of the binarized band, each row scaled by `row_weight(i, n)`.
fn band_column_sums(
    mask: &LaneMask,
    mask_threshold: f32,
    row_weight: impl Fn(usize, usize) -> f32,
) -> Option<Array1<f32>> {
    let height = mask.nrows();
    let top = (height as f32 * BAND_TOP) as usize;
    let bottom = (height as f32 * BAND_BOTTOM) as usize;
    if bottom <= top || mask.ncols() == 0 {
        return None;
    }

    let band = mask.slice(s![top..bottom, ..]);
    let rows = band.nrows();
    let weights = Array1::from_iter((0..rows).map(|i| row_weight(i, rows)));
    let binary = band.mapv(|v| if v > mask_threshold { 1.0f32 } else { 0.0 });
    Some((&binary * &weights.insert_axis(Axis(1))).sum_axis(Axis(0)))
}

/// Split ascending column indices into groups where neighbours are at most
/// `max_gap` apart.
fn group_columns(columns: &[usize], max_gap: usize) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for &c in columns {
        match groups.last_mut() {
            Some(group) if group.last().is_some_and(|&prev| c - prev <= max_gap) => group.push(c),
            _ => groups.push(vec![c]),
        }
    }
    groups
}

fn weighted_center(group: &[usize], sums: &Array1<f32>) -> Option<f32> {
    let total: f32 = group.iter().map(|&c| sums[c]).sum();
    if total <= 0.0 {
        return None;
    }
    Some(group.iter().map(|&c| c as f32 * sums[c]).sum::<f32>() / total)
}

fn nearest_each_side(centers: &[f32], vehicle_x: f32) -> RawBoundaries {
    let left = centers
        .iter()
        .copied()
        .filter(|&c| c < vehicle_x)
        .fold(None, |acc: Option<f32>, c| Some(acc.map_or(c, |a| a.max(c))));
    let right = centers
        .iter()
        .copied()
        .filter(|&c| c > vehicle_x)
        .fold(None, |acc: Option<f32>, c| Some(acc.map_or(c, |a| a.min(c))));
    RawBoundaries { left, right }
}

// ============================================================================
// COLUMN CLUSTER
// ============================================================================

#[derive(Debug, Clone)]
pub struct ColumnClusterEstimator {
    pub mask_threshold: f32,
    /// Weighted column sum a column needs to count as a lane column
    pub min_column_sum: f32,
    pub max_gap: usize,
}

impl Default for ColumnClusterEstimator {
    fn default() -> Self {
        Self {
            mask_threshold: 0.5,
            min_column_sum: 1.0,
            max_gap: 15,
        }
    }
}

impl BoundaryEstimator for ColumnClusterEstimator {
    fn name(&self) -> &'static str {
        "column_cluster"
    }

    fn estimate(&self, mask: &LaneMask, vehicle_x: f32) -> RawBoundaries {
        // Rows further down the image weigh more: 0.5 at the band top → 1.0 at its bottom.
        let Some(sums) = band_column_sums(mask, self.mask_threshold, |i, n| {
            if n <= 1 {
                0.5
            } else {
                0.5 + 0.5 * i as f32 / (n - 1) as f32
            }
        }) else {
            return RawBoundaries::NONE;
        };

        let columns: Vec<usize> = sums
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v > self.min_column_sum)
            .map(|(c, _)| c)
            .collect();
        let centers: Vec<f32> = group_columns(&columns, self.max_gap)
            .iter()
            .filter_map(|g| weighted_center(g, &sums))
            .collect();

        nearest_each_side(&centers, vehicle_x)
    }
}

// ============================================================================
// PEAK COLUMN
// ============================================================================

#[derive(Debug, Clone)]
pub struct PeakColumnEstimator {
    pub mask_threshold: f32,
    /// Fraction of the strongest column a column must exceed
    pub peak_fraction: f32,
}

impl Default for PeakColumnEstimator {
    fn default() -> Self {
        Self {
            mask_threshold: 0.5,
            peak_fraction: 0.2,
        }
    }
}

impl BoundaryEstimator for PeakColumnEstimator {
    fn name(&self) -> &'static str {
        "peak_column"
    }

    fn estimate(&self, mask: &LaneMask, vehicle_x: f32) -> RawBoundaries {
        let Some(sums) = band_column_sums(mask, self.mask_threshold, |_, _| 1.0) else {
            return RawBoundaries::NONE;
        };
        let peak = sums.fold(0.0f32, |m, &v| m.max(v));
        if peak <= 0.0 {
            return RawBoundaries::NONE;
        }

        let cutoff = peak * self.peak_fraction;
        let columns: Vec<usize> = sums
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v > cutoff)
            .map(|(c, _)| c)
            .collect();
        // Contiguous runs only.
        let centers: Vec<f32> = group_columns(&columns, 1)
            .iter()
            .filter_map(|g| weighted_center(g, &sums))
            .collect();

        nearest_each_side(&centers, vehicle_x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// 100×200 mask with vertical stripes at the given column ranges.
    fn striped_mask(stripes: &[(usize, usize)]) -> LaneMask {
        let mut mask = Array2::<f32>::zeros((100, 200));
        for &(from, to) in stripes {
            mask.slice_mut(s![.., from..to]).fill(1.0);
        }
        mask
    }

    #[test]
    fn test_group_columns_by_gap() {
        let groups = group_columns(&[1, 2, 3, 20, 40, 50], 15);
        assert_eq!(groups, vec![vec![1, 2, 3, 20], vec![40, 50]]);
        assert!(group_columns(&[], 15).is_empty());
    }

    #[test]
    fn test_column_cluster_picks_nearest_each_side() {
        let mask = striped_mask(&[(10, 14), (48, 52), (148, 152), (190, 194)]);
        let est = ColumnClusterEstimator::default();
        let b = est.estimate(&mask, 100.0);
        assert!((b.left.unwrap() - 49.5).abs() < 1e-3);
        assert!((b.right.unwrap() - 149.5).abs() < 1e-3);
    }

    #[test]
    fn test_column_cluster_one_side_missing() {
        let mask = striped_mask(&[(48, 52)]);
        let b = ColumnClusterEstimator::default().estimate(&mask, 100.0);
        assert!(b.left.is_some());
        assert_eq!(b.right, None);
    }

    #[test]
    fn test_empty_mask_has_no_boundaries() {
        let mask = Array2::<f32>::zeros((100, 200));
        assert_eq!(
            ColumnClusterEstimator::default().estimate(&mask, 100.0),
            RawBoundaries::NONE
        );
        assert_eq!(
            PeakColumnEstimator::default().estimate(&mask, 100.0),
            RawBoundaries::NONE
        );
    }

    #[test]
    fn test_markings_outside_band_ignored() {
        let mut mask = Array2::<f32>::zeros((100, 200));
        // Only the top half has a marking.
        mask.slice_mut(s![0..50, 48..52]).fill(1.0);
        let b = ColumnClusterEstimator::default().estimate(&mask, 100.0);
        assert_eq!(b, RawBoundaries::NONE);
    }

    #[test]
    fn test_peak_column_drops_weak_columns() {
        let mut mask = striped_mask(&[(48, 52), (148, 152)]);
        // A faint speck left of center, far below 20% of the peak column.
        mask[[90, 80]] = 1.0;
        let b = PeakColumnEstimator::default().estimate(&mask, 100.0);
        assert!((b.left.unwrap() - 49.5).abs() < 1e-3);
        assert!((b.right.unwrap() - 149.5).abs() < 1e-3);
    }

    #[test]
    fn test_build_estimator_by_strategy() {
        assert_eq!(
            build_estimator(BoundaryStrategy::ColumnCluster, 0.5).name(),
            "column_cluster"
        );
        assert_eq!(
            build_estimator(BoundaryStrategy::PeakColumn, 0.5).name(),
            "peak_column"
        );
    }
}
