use std::collections::HashSet;

use itertools::Itertools;

use super::Peak;

/// Checks that `peak` lies strictly more than `distance` pixels away from
/// every border of a `rows` by `cols` image
pub fn within_border(peak: &Peak, rows: usize, cols: usize, distance: usize) -> bool {
    peak.row > distance
        && peak.row + distance < rows
        && peak.col > distance
        && peak.col + distance < cols
}

/// Checks if two peaks are closer than `distance` along both rows and columns
pub fn too_close(a: &Peak, b: &Peak, distance: usize) -> bool {
    a.row.abs_diff(b.row) < distance && a.col.abs_diff(b.col) < distance
}

/// Rejects the peaks near the image border and the peaks too close to each other
///
/// Both peaks of a close pair are rejected: there is no winner. The close
/// pairs are found among all the `peaks`, including the ones near the border,
/// before any of them is removed. The order of the remaining peaks is
/// preserved.
pub fn prune(peaks: &[Peak], rows: usize, cols: usize, distance: usize) -> Vec<Peak> {
    let crowded: HashSet<usize> = peaks
        .iter()
        .enumerate()
        .tuple_combinations()
        .filter(|((_, a), (_, b))| too_close(a, b, distance))
        .flat_map(|((i, _), (j, _))| [i, j])
        .collect();
    peaks
        .iter()
        .enumerate()
        .filter(|(i, peak)| !crowded.contains(i) && within_border(peak, rows, cols, distance))
        .map(|(_, peak)| *peak)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_rule_is_strict() {
        let d = 4;
        let (rows, cols) = (20, 30);
        assert!(within_border(&Peak::new(5, 5), rows, cols, d));
        assert!(!within_border(&Peak::new(d, 10), rows, cols, d));
        assert!(!within_border(&Peak::new(d - 1, 10), rows, cols, d));
        assert!(!within_border(&Peak::new(10, cols - d), rows, cols, d));
        assert!(within_border(&Peak::new(rows - d - 1, cols - d - 1), rows, cols, d));
    }

    #[test]
    fn peak_inside_forbidden_border_is_rejected() {
        let d = 3;
        let peaks = [Peak::new(d - 1, 10), Peak::new(10, 10)];
        assert_eq!(prune(&peaks, 20, 20, d), vec![Peak::new(10, 10)]);
    }

    #[test]
    fn both_members_of_close_pair_are_rejected() {
        let peaks = [
            Peak::new(10, 10),
            Peak::new(12, 13),
            Peak::new(30, 30),
            Peak::new(10, 30),
        ];
        assert_eq!(
            prune(&peaks, 50, 50, 5),
            vec![Peak::new(30, 30), Peak::new(10, 30)]
        );
    }

    #[test]
    fn close_along_one_axis_only_is_kept() {
        let peaks = [Peak::new(10, 10), Peak::new(11, 20), Peak::new(20, 11)];
        assert_eq!(prune(&peaks, 40, 40, 5), peaks.to_vec());
    }

    #[test]
    fn clusters_are_dropped_without_rechecking() {
        // the middle peak links the two outer ones, all three go
        let peaks = [Peak::new(10, 10), Peak::new(10, 14), Peak::new(10, 18)];
        assert!(prune(&peaks, 40, 40, 5).is_empty());
    }

    #[test]
    fn peaks_outside_the_border_still_crowd() {
        let peaks = [Peak::new(2, 10), Peak::new(6, 10), Peak::new(20, 20)];
        assert_eq!(prune(&peaks, 40, 40, 5), vec![Peak::new(20, 20)]);
        // same close pair across the far column border
        let peaks = [Peak::new(20, 37), Peak::new(20, 33), Peak::new(10, 10)];
        assert_eq!(prune(&peaks, 40, 40, 5), vec![Peak::new(10, 10)]);
    }
}
