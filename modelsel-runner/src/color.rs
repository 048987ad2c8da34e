//! Outlier ("color") detector.
//!
//! A candidate's color is `2 × (CVCF.mcc − CV.mcc)`: how much consensus-feature
//! refinement moved its MCC. Each candidate is compared with its neighbors,
//! the candidates whose CVCF (AUC, MCC) point lies within
//! `neighbor_distance × |AUC + MCC|` of its own. A candidate whose color sits
//! far below its neighbors' (z ≤ −z_threshold) gained unusually little from
//! refinement and is selected as unlikely to have overfit to it.

use modelsel_core::domain::MeasureSet;
use serde::{Deserialize, Serialize};

/// Below this the neighbor colors are treated as constant and z is undefined.
const MIN_NEIGHBOR_STD: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorParams {
    pub z_threshold: f64,
    pub neighbor_distance: f64,
    pub min_neighbors: usize,
}

impl Default for ColorParams {
    fn default() -> Self {
        Self {
            z_threshold: 2.0,
            neighbor_distance: 0.03,
            min_neighbors: 3,
        }
    }
}

/// `2 × (CVCF.mcc − CV.mcc)`.
pub fn color(cv: &MeasureSet, cvcf: &MeasureSet) -> f64 {
    2.0 * (cvcf.mcc - cv.mcc)
}

/// Detector input for one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorPoint {
    /// CVCF AUC.
    pub auc: f64,
    /// CVCF MCC.
    pub mcc: f64,
    pub color: f64,
}

impl ColorPoint {
    pub fn new(cv: &MeasureSet, cvcf: &MeasureSet) -> Self {
        Self {
            auc: cvcf.auc,
            mcc: cvcf.mcc,
            color: color(cv, cvcf),
        }
    }

    fn is_complete(&self) -> bool {
        !(self.auc.is_nan() || self.mcc.is_nan() || self.color.is_nan())
    }

    fn distance(&self, other: &ColorPoint) -> f64 {
        ((self.auc - other.auc).powi(2) + (self.mcc - other.mcc).powi(2)).sqrt()
    }
}

/// Detector decision for one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorVerdict {
    Selected { z: f64, neighbors: usize },
    NotSelected { z: f64, neighbors: usize },
    InsufficientNeighbors { neighbors: usize },
    /// CVCF AUC/MCC or the color itself is missing.
    Incomplete,
}

impl ColorVerdict {
    pub fn is_selected(&self) -> bool {
        matches!(self, Self::Selected { .. })
    }
}

/// Judge every point against its neighbors. Output is index-aligned with input.
///
/// Incomplete points are never anyone's neighbor. O(n²) in the candidate
/// count, which stays in the hundreds per triple.
pub fn detect(points: &[ColorPoint], params: &ColorParams) -> Vec<ColorVerdict> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            if !p.is_complete() {
                return ColorVerdict::Incomplete;
            }
            let radius = params.neighbor_distance * (p.auc + p.mcc).abs();
            let colors: Vec<f64> = points
                .iter()
                .enumerate()
                .filter(|(j, q)| *j != i && q.is_complete() && p.distance(q) <= radius)
                .map(|(_, q)| q.color)
                .collect();

            let count = colors.len();
            if count < params.min_neighbors {
                return ColorVerdict::InsufficientNeighbors { neighbors: count };
            }
            let (mean, sd) = mean_std(&colors);
            if sd < MIN_NEIGHBOR_STD {
                return ColorVerdict::NotSelected {
                    z: f64::NAN,
                    neighbors: count,
                };
            }
            let z = (p.color - mean) / sd;
            if z <= -params.z_threshold {
                ColorVerdict::Selected {
                    z,
                    neighbors: count,
                }
            } else {
                ColorVerdict::NotSelected {
                    z,
                    neighbors: count,
                }
            }
        })
        .collect()
}

/// Two-pass mean and sample standard deviation. Needs at least two values.
fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(auc: f64, mcc: f64, color: f64) -> ColorPoint {
        ColorPoint { auc, mcc, color }
    }

    /// One low-color candidate in a tight cluster of similar candidates.
    fn cluster() -> Vec<ColorPoint> {
        vec![
            point(0.800, 0.500, -0.20),
            point(0.801, 0.501, 0.20),
            point(0.799, 0.502, 0.22),
            point(0.802, 0.499, 0.18),
            point(0.800, 0.498, 0.20),
        ]
    }

    #[test]
    fn color_formula() {
        let mut cv = MeasureSet::missing();
        cv.mcc = 0.4;
        let mut cvcf = MeasureSet::missing();
        cvcf.mcc = 0.6;
        assert!((color(&cv, &cvcf) - 0.4).abs() < 1e-10);
    }

    #[test]
    fn low_color_outlier_is_selected() {
        let verdicts = detect(&cluster(), &ColorParams::default());
        assert!(verdicts[0].is_selected(), "{:?}", verdicts[0]);
        for v in &verdicts[1..] {
            assert!(!v.is_selected(), "{v:?}");
        }
    }

    #[test]
    fn isolated_candidate_has_insufficient_neighbors() {
        let mut points = cluster();
        points.push(point(0.55, 0.05, -1.0));
        let verdicts = detect(&points, &ColorParams::default());
        assert_eq!(
            verdicts[5],
            ColorVerdict::InsufficientNeighbors { neighbors: 0 }
        );
    }

    #[test]
    fn fewer_than_three_neighbors_never_selected() {
        // Three points: each has at most two neighbors.
        let points = vec![
            point(0.8, 0.5, -5.0),
            point(0.8, 0.5, 0.2),
            point(0.8, 0.5, 0.3),
        ];
        let verdicts = detect(&points, &ColorParams::default());
        assert!(verdicts
            .iter()
            .all(|v| matches!(v, ColorVerdict::InsufficientNeighbors { neighbors: 2 })));
    }

    #[test]
    fn constant_neighbor_colors_select_nothing() {
        let points = vec![
            point(0.8, 0.5, -1.0),
            point(0.8, 0.5, 0.2),
            point(0.8, 0.5, 0.2),
            point(0.8, 0.5, 0.2),
        ];
        let verdicts = detect(&points, &ColorParams::default());
        assert!(matches!(verdicts[0], ColorVerdict::NotSelected { neighbors: 3, .. }));
    }

    #[test]
    fn incomplete_points_are_skipped_and_not_neighbors() {
        let mut points = cluster();
        points.push(point(f64::NAN, 0.5, 0.2));
        let verdicts = detect(&points, &ColorParams::default());
        assert_eq!(verdicts[5], ColorVerdict::Incomplete);
        // The cluster still sees exactly four neighbors each.
        assert!(matches!(
            verdicts[0],
            ColorVerdict::Selected { neighbors: 4, .. }
        ));
    }

    #[test]
    fn radius_scales_with_magnitude() {
        // 0.03 × |0.8 + 0.5| = 0.039; a point 0.05 away is outside.
        let points = vec![point(0.8, 0.5, 0.0), point(0.85, 0.5, 0.0)];
        let params = ColorParams {
            min_neighbors: 1,
            ..ColorParams::default()
        };
        let verdicts = detect(&points, &params);
        assert_eq!(
            verdicts[0],
            ColorVerdict::InsufficientNeighbors { neighbors: 0 }
        );
    }
}
