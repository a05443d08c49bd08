//! Bead peak detection on the maximum intensity projection
//!
//! Peak detection runs in two stages:
//!  - [`find_maxima`]: maxima standing higher than the noise tolerance above
//!    the saddle separating them from any higher maximum
//!  - [`prune`]: rejection of the maxima too close to the border or to
//!    another maximum

use serde::Serialize;

use crate::volume::Projection;

mod maxima;
mod prune;
pub use maxima::{find_maxima, local_maxima};
pub use prune::{prune, too_close, within_border};

/// Pixel coordinate into the projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Peak {
    pub row: usize,
    pub col: usize,
}
impl Peak {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}
impl From<(usize, usize)> for Peak {
    fn from((row, col): (usize, usize)) -> Self {
        Self { row, col }
    }
}

/// Peaks found in a projection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Detection {
    /// Maxima above the noise tolerance, before pruning
    pub raw: Vec<Peak>,
    /// Maxima kept after the border and proximity rejections
    pub kept: Vec<Peak>,
}
impl Detection {
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

/// Peak detector settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakDetector {
    min_distance: usize,
    tolerance: f64,
}
impl PeakDetector {
    /// Creates a detector
    ///
    /// - `min_distance`: minimum distance (in pixels) of a peak to the image
    ///   border and to any other peak
    /// - `tolerance`: noise tolerance of the maxima finder
    pub fn new(min_distance: usize, tolerance: f64) -> Self {
        Self {
            min_distance,
            tolerance,
        }
    }
    pub fn min_distance(&self) -> usize {
        self.min_distance
    }
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
    pub fn detect(&self, projection: &Projection) -> Detection {
        let raw = find_maxima(projection, self.tolerance);
        let kept = prune(
            &raw,
            projection.rows(),
            projection.cols(),
            self.min_distance,
        );
        log::debug!(
            "{} maxima above tolerance {}, {} kept at minimum distance {}",
            raw.len(),
            self.tolerance,
            kept.len(),
            self.min_distance
        );
        Detection { raw, kept }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::volume::Plane;

    fn spot(row: f64, col: f64, amplitude: f64, sigma: f64) -> impl Fn(usize, usize) -> f64 {
        move |r, c| {
            let dr = r as f64 - row;
            let dc = c as f64 - col;
            amplitude * (-(dr * dr + dc * dc) / (2. * sigma * sigma)).exp()
        }
    }

    fn beads(rows: usize, cols: usize, centers: &[(usize, usize)]) -> Plane {
        let spots: Vec<_> = centers
            .iter()
            .map(|&(r, c)| spot(r as f64, c as f64, 1000., 1.5))
            .collect();
        Plane::from_fn(rows, cols, |r, c| 10. + spots.iter().map(|s| s(r, c)).sum::<f64>())
    }

    #[test]
    fn single_isolated_bead() {
        let mip = beads(40, 40, &[(20, 17)]);
        let detection = PeakDetector::new(5, 20.).detect(&mip);
        assert_eq!(detection.raw, vec![Peak::new(20, 17)]);
        assert_eq!(detection.kept, vec![Peak::new(20, 17)]);
    }

    #[test]
    fn retained_peaks_satisfy_invariants() {
        let centers = [
            (6, 6),
            (10, 30),
            (12, 33),
            (25, 25),
            (33, 8),
            (38, 38),
            (20, 2),
            (30, 18),
        ];
        let (rows, cols, d) = (42, 44, 5);
        let mip = beads(rows, cols, &centers);
        let detection = PeakDetector::new(d, 20.).detect(&mip);
        assert!(detection.kept.len() <= detection.raw.len());
        for p in &detection.kept {
            assert!(d <= p.row && p.row <= rows - d, "{p:?} too close to a row edge");
            assert!(d <= p.col && p.col <= cols - d, "{p:?} too close to a column edge");
        }
        for (i, a) in detection.kept.iter().enumerate() {
            for b in &detection.kept[i + 1..] {
                assert!(
                    !(a.row.abs_diff(b.row) < d && a.col.abs_diff(b.col) < d),
                    "{a:?} and {b:?} are too close"
                );
            }
        }
        let kept: HashSet<_> = detection.kept.iter().copied().collect();
        let expected: HashSet<_> = [(6, 6), (25, 25), (33, 8), (30, 18)]
            .into_iter()
            .map(Peak::from)
            .collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn detection_is_idempotent() {
        let mip = beads(50, 50, &[(10, 10), (12, 40), (30, 30), (31, 33), (45, 20)]);
        let detector = PeakDetector::new(6, 15.);
        let first: HashSet<_> = detector.detect(&mip).kept.into_iter().collect();
        let second: HashSet<_> = detector.detect(&mip).kept.into_iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn flat_projection_has_no_peaks() {
        let mip = Plane::from_fn(20, 20, |_, _| 42.);
        let detection = PeakDetector::new(3, 0.).detect(&mip);
        assert!(detection.raw.is_empty());
        assert!(detection.is_empty());
    }
}
