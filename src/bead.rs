//! Bead cropping
//!
//! A [`Bead`] is a retained peak together with the square lateral patch cut
//! out of the projection around it and the axial trace through the volume at
//! its position.

use itertools::{Either, Itertools};
use serde::Serialize;

use crate::{
    peaks::Peak,
    volume::{Plane, Projection, Volume},
};

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
pub enum CropError {
    #[error("crop window of half-width {crop} around {peak:?} exceeds the {rows}x{cols} image")]
    OutOfBounds {
        peak: Peak,
        crop: usize,
        rows: usize,
        cols: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bead {
    /// Index of the peak in the retained peak list
    pub index: usize,
    pub peak: Peak,
    /// `2 crop` by `2 crop` patch of the projection
    pub patch: Plane,
    /// Volume intensity along z at the peak
    pub trace: Vec<f64>,
}

/// Cuts beads out of a volume and its projection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeadCropper {
    crop: usize,
}
impl BeadCropper {
    /// Creates a cropper with the half-width `crop` of the lateral patch
    pub fn new(crop: usize) -> Self {
        Self { crop }
    }
    pub fn crop_size(&self) -> usize {
        self.crop
    }
    /// Crops the bead of the `index`th peak
    ///
    /// The patch spans rows `peak.row - crop .. peak.row + crop` and columns
    /// `peak.col - crop .. peak.col + crop` of the projection.
    pub fn crop(
        &self,
        index: usize,
        peak: Peak,
        volume: &Volume,
        projection: &Projection,
    ) -> Result<Bead, CropError> {
        let out_of_bounds = || CropError::OutOfBounds {
            peak,
            crop: self.crop,
            rows: projection.rows(),
            cols: projection.cols(),
        };
        let row = peak.row.checked_sub(self.crop).ok_or_else(out_of_bounds)?;
        let col = peak.col.checked_sub(self.crop).ok_or_else(out_of_bounds)?;
        let side = 2 * self.crop;
        let patch = projection
            .window(row, col, side, side)
            .ok_or_else(out_of_bounds)?;
        let trace = volume
            .axial_trace(peak.row, peak.col)
            .ok_or_else(out_of_bounds)?
            .to_vec();
        Ok(Bead {
            index,
            peak,
            patch,
            trace,
        })
    }
    /// Crops the beads of all the peaks
    ///
    /// Peaks which crop window does not fit in the image are returned
    /// separately with the reason.
    pub fn crop_all(
        &self,
        peaks: &[Peak],
        volume: &Volume,
        projection: &Projection,
    ) -> (Vec<Bead>, Vec<CropError>) {
        peaks
            .iter()
            .enumerate()
            .partition_map(|(index, &peak)| match self.crop(index, peak, volume, projection) {
                Ok(bead) => Either::Left(bead),
                Err(e) => {
                    log::warn!("dropping bead #{index}: {e}");
                    Either::Right(e)
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume() -> Volume {
        Volume::from_fn([12, 10, 4], |x, y, z| (100 * x + 10 * y + z) as f64).unwrap()
    }

    #[test]
    fn bead_patch_and_trace() {
        let volume = volume();
        let mip = volume.projection();
        let bead = BeadCropper::new(2)
            .crop(3, Peak::new(5, 4), &volume, &mip)
            .unwrap();
        assert_eq!(bead.index, 3);
        assert_eq!((bead.patch.rows(), bead.patch.cols()), (4, 4));
        // top left corner of the patch is (3, 2), the MIP keeps z = 3
        assert_eq!(bead.patch[(0, 0)], 323.);
        assert_eq!(bead.patch[(3, 3)], 653.);
        assert_eq!(bead.trace, vec![540., 541., 542., 543.]);
    }

    #[test]
    fn out_of_bounds_window() {
        let volume = volume();
        let mip = volume.projection();
        let cropper = BeadCropper::new(3);
        assert!(matches!(
            cropper.crop(0, Peak::new(2, 5), &volume, &mip),
            Err(CropError::OutOfBounds { crop: 3, .. })
        ));
        // the window is [peak - crop, peak + crop), so the last row is free
        assert!(cropper.crop(0, Peak::new(9, 5), &volume, &mip).is_ok());
        assert!(cropper.crop(0, Peak::new(10, 5), &volume, &mip).is_err());
        assert!(cropper.crop(0, Peak::new(5, 8), &volume, &mip).is_err());
    }

    #[test]
    fn dropped_beads_do_not_abort_the_others() {
        let volume = volume();
        let mip = volume.projection();
        let peaks = [Peak::new(5, 5), Peak::new(1, 1), Peak::new(6, 4)];
        let (beads, dropped) = BeadCropper::new(2).crop_all(&peaks, &volume, &mip);
        assert_eq!(
            beads.iter().map(|b| (b.index, b.peak)).collect::<Vec<_>>(),
            vec![(0, Peak::new(5, 5)), (2, Peak::new(6, 4))]
        );
        assert_eq!(dropped.len(), 1);
    }
}
