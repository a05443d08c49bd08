use itertools::Itertools;

use super::Peak;
use crate::volume::Plane;

/// Pixel already flooded from a stronger candidate
const CLAIMED: u8 = 1;
/// Pixel in the region currently being flooded
const LISTED: u8 = 2;

const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// 8-connected neighbours of (`row`, `col`) inside a `rows` by `cols` grid
fn neighbours(
    row: usize,
    col: usize,
    rows: usize,
    cols: usize,
) -> impl Iterator<Item = (usize, usize)> {
    NEIGHBOURS.iter().filter_map(move |&(dr, dc)| {
        let r = row.checked_add_signed(dr)?;
        let c = col.checked_add_signed(dc)?;
        (r < rows && c < cols).then_some((r, c))
    })
}

/// Interior pixels not lower than any of their 8 neighbours, in row-major order
///
/// Pixels at the image minimum are never maxima, so a flat image has none.
pub fn local_maxima(plane: &Plane) -> Vec<Peak> {
    let (rows, cols) = (plane.rows(), plane.cols());
    if rows < 3 || cols < 3 {
        return Vec::new();
    }
    let floor = plane.min();
    (1..rows - 1)
        .cartesian_product(1..cols - 1)
        .filter(|&(row, col)| {
            let value = plane[(row, col)];
            value > floor && neighbours(row, col, rows, cols).all(|rc| plane[rc] <= value)
        })
        .map(Peak::from)
        .collect()
}

/// Maxima of `plane` standing out by more than `tolerance`
///
/// Local maxima are flooded from the highest down. A flood spreads over the
/// 8-connected pixels not lower than the maximum minus `tolerance`; the
/// maximum is rejected if its flood reaches a higher pixel or a pixel already
/// flooded from a higher maximum. Either way the flooded pixels are claimed.
/// Within a plateau the peak is the pixel nearest the plateau centroid.
///
/// The maxima are returned in row-major order.
pub fn find_maxima(plane: &Plane, tolerance: f64) -> Vec<Peak> {
    let mut candidates = local_maxima(plane);
    // stable sort: equal heights keep the scan order
    candidates.sort_by(|a, b| plane[(b.row, b.col)].total_cmp(&plane[(a.row, a.col)]));

    let mut state = vec![0u8; plane.rows() * plane.cols()];
    let mut maxima: Vec<Peak> = candidates
        .into_iter()
        .filter_map(|seed| {
            if state[seed.row * plane.cols() + seed.col] & CLAIMED != 0 {
                None
            } else {
                flood(plane, seed, tolerance, &mut state)
            }
        })
        .collect();
    maxima.sort();
    maxima
}

fn flood(plane: &Plane, seed: Peak, tolerance: f64, state: &mut [u8]) -> Option<Peak> {
    let (rows, cols) = (plane.rows(), plane.cols());
    let top = plane[(seed.row, seed.col)];
    let lowest = top - tolerance;

    let mut region = vec![(seed.row, seed.col)];
    let mut plateau = vec![(seed.row, seed.col)];
    state[seed.row * cols + seed.col] |= LISTED;
    let mut is_maximum = true;
    let mut i = 0;
    'grow: while i < region.len() {
        let (row, col) = region[i];
        i += 1;
        for (r, c) in neighbours(row, col, rows, cols) {
            let k = r * cols + c;
            if state[k] & LISTED != 0 {
                continue;
            }
            let value = plane[(r, c)];
            if state[k] & CLAIMED != 0 || value > top {
                is_maximum = false;
                break 'grow;
            }
            if value >= lowest {
                state[k] |= LISTED;
                region.push((r, c));
                if value == top {
                    plateau.push((r, c));
                }
            }
        }
    }
    for &(r, c) in &region {
        let k = r * cols + c;
        state[k] = (state[k] & !LISTED) | CLAIMED;
    }

    is_maximum.then(|| {
        let n = plateau.len() as f64;
        let (sum_r, sum_c) = plateau
            .iter()
            .fold((0f64, 0f64), |(sr, sc), &(r, c)| (sr + r as f64, sc + c as f64));
        let (mean_r, mean_c) = (sum_r / n, sum_c / n);
        plateau
            .iter()
            .copied()
            .min_by(|a, b| {
                let da = (a.0 as f64 - mean_r).powi(2) + (a.1 as f64 - mean_c).powi(2);
                let db = (b.0 as f64 - mean_r).powi(2) + (b.1 as f64 - mean_c).powi(2);
                da.total_cmp(&db)
            })
            .map(Peak::from)
            .unwrap_or(seed)
    })
}
