//! Image volume and its maximum intensity projection

use std::ops::Index;

use crate::source::{ImageSource, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("empty volume extent {0}x{1}x{2}")]
    EmptyExtent(usize, usize, usize),
    #[error("found {found} samples, expected {expected}")]
    SampleCount { found: usize, expected: usize },
    #[error("invalid intensity {value} at (x={x}, y={y}, z={z})")]
    InvalidSample {
        value: f64,
        x: usize,
        y: usize,
        z: usize,
    },
    #[error("failed to read the image planes")]
    Source(#[from] SourceError),
}
type Result<T> = std::result::Result<T, VolumeError>;

/// 3-D intensity volume indexed by (x, y, z)
///
/// Samples are non-negative and stored as `[x][y][z]`, so the axial trace at
/// a lateral position is contiguous.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    size: [usize; 3],
    samples: Vec<f64>,
}
impl Volume {
    /// Creates a volume from `[x][y][z]` ordered samples
    pub fn new(size: [usize; 3], samples: Vec<f64>) -> Result<Self> {
        let [n_x, n_y, n_z] = size;
        if n_x == 0 || n_y == 0 || n_z == 0 {
            return Err(VolumeError::EmptyExtent(n_x, n_y, n_z));
        }
        let expected = n_x * n_y * n_z;
        if samples.len() != expected {
            return Err(VolumeError::SampleCount {
                found: samples.len(),
                expected,
            });
        }
        if let Some((i, &value)) = samples
            .iter()
            .enumerate()
            .find(|(_, v)| !(v.is_finite() && **v >= 0f64))
        {
            return Err(VolumeError::InvalidSample {
                value,
                x: i / (n_y * n_z),
                y: (i / n_z) % n_y,
                z: i % n_z,
            });
        }
        Ok(Self { size, samples })
    }
    /// Creates a volume sampling `f(x, y, z)`
    pub fn from_fn(size: [usize; 3], mut f: impl FnMut(usize, usize, usize) -> f64) -> Result<Self> {
        let [n_x, n_y, n_z] = size;
        let mut samples = Vec::with_capacity(n_x * n_y * n_z);
        for x in 0..n_x {
            for y in 0..n_y {
                for z in 0..n_z {
                    samples.push(f(x, y, z));
                }
            }
        }
        Self::new(size, samples)
    }
    /// Stacks z-planes of `n_x` rows by `n_y` columns
    pub fn from_planes(n_x: usize, n_y: usize, planes: &[Vec<f64>]) -> Result<Self> {
        let plane_len = n_x * n_y;
        if let Some(plane) = planes.iter().find(|plane| plane.len() != plane_len) {
            return Err(VolumeError::SampleCount {
                found: plane.len(),
                expected: plane_len,
            });
        }
        let samples = (0..plane_len)
            .flat_map(|i| planes.iter().map(move |plane| plane[i]))
            .collect();
        Self::new([n_x, n_y, planes.len()], samples)
    }
    /// Loads the z-stack of `channel` at `time_point` from an image source
    pub fn from_source<S: ImageSource + ?Sized>(
        source: &S,
        channel: usize,
        time_point: usize,
    ) -> Result<Self> {
        let dims = source.dimensions();
        let planes = (0..dims.z)
            .map(|z| source.plane(z, channel, time_point))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if planes.is_empty() {
            return Err(VolumeError::EmptyExtent(dims.x, dims.y, dims.z));
        }
        Self::from_planes(dims.x, dims.y, &planes)
    }
    /// Volume size as `[x, y, z]`
    pub fn size(&self) -> [usize; 3] {
        self.size
    }
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<f64> {
        let [n_x, n_y, n_z] = self.size;
        (x < n_x && y < n_y && z < n_z).then(|| self.samples[(x * n_y + y) * n_z + z])
    }
    /// Intensity profile along z at the lateral position (x, y)
    pub fn axial_trace(&self, x: usize, y: usize) -> Option<&[f64]> {
        let [n_x, n_y, n_z] = self.size;
        (x < n_x && y < n_y).then(|| {
            let start = (x * n_y + y) * n_z;
            &self.samples[start..start + n_z]
        })
    }
    /// Maximum intensity projection along z
    ///
    /// Every lateral position folds its axial trace into its maximum; the
    /// volume guarantees a non-empty z-extent.
    pub fn projection(&self) -> Projection {
        let [n_x, n_y, n_z] = self.size;
        let data = self
            .samples
            .chunks_exact(n_z)
            .map(|trace| trace.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            .collect();
        Plane {
            rows: n_x,
            cols: n_y,
            data,
        }
    }
}

/// 2-D array of intensities, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}
/// Maximum intensity projection of a [`Volume`], rows along x and columns along y
pub type Projection = Plane;

impl Plane {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(VolumeError::SampleCount {
                found: data.len(),
                expected: rows * cols,
            });
        }
        Ok(Self { rows, cols, data })
    }
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                data.push(f(row, col));
            }
        }
        Self { rows, cols, data }
    }
    pub fn rows(&self) -> usize {
        self.rows
    }
    pub fn cols(&self) -> usize {
        self.cols
    }
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
    pub fn max(&self) -> f64 {
        self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
    pub fn min(&self) -> f64 {
        self.data.iter().copied().fold(f64::INFINITY, f64::min)
    }
    /// Copy of the `rows` by `cols` window starting at (`row`, `col`)
    ///
    /// Returns `None` if the window does not fit inside the plane.
    pub fn window(&self, row: usize, col: usize, rows: usize, cols: usize) -> Option<Plane> {
        if row + rows > self.rows || col + cols > self.cols {
            return None;
        }
        let data = (row..row + rows)
            .flat_map(|r| {
                let start = r * self.cols + col;
                self.data[start..start + cols].iter().copied()
            })
            .collect();
        Some(Plane { rows, cols, data })
    }
}
impl Index<(usize, usize)> for Plane {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &Self::Output {
        &self.data[row * self.cols + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryImage;

    #[test]
    fn projection_is_max_along_z() {
        let volume = Volume::from_fn([3, 4, 5], |x, y, z| ((x + 2 * y) * z % 7) as f64).unwrap();
        let mip = volume.projection();
        assert_eq!((mip.rows(), mip.cols()), (3, 4));
        for x in 0..3 {
            for y in 0..4 {
                let expected = (0..5).map(|z| ((x + 2 * y) * z % 7) as f64).fold(0f64, f64::max);
                assert_eq!(mip[(x, y)], expected);
            }
        }
    }

    #[test]
    fn single_plane_projection() {
        let volume = Volume::from_fn([2, 2, 1], |x, y, _| (x * 2 + y) as f64).unwrap();
        assert_eq!(volume.projection().as_slice(), &[0., 1., 2., 3.]);
    }

    #[test]
    fn empty_z_extent_is_invalid() {
        assert!(matches!(
            Volume::new([4, 4, 0], vec![]),
            Err(VolumeError::EmptyExtent(4, 4, 0))
        ));
        assert!(matches!(
            Volume::from_planes(4, 4, &[]),
            Err(VolumeError::EmptyExtent(4, 4, 0))
        ));
    }

    #[test]
    fn malformed_volumes() {
        assert!(matches!(
            Volume::new([2, 2, 2], vec![0f64; 7]),
            Err(VolumeError::SampleCount {
                found: 7,
                expected: 8
            })
        ));
        let mut samples = vec![1f64; 8];
        samples[5] = -1.;
        assert!(matches!(
            Volume::new([2, 2, 2], samples),
            Err(VolumeError::InvalidSample { x: 1, y: 0, z: 1, .. })
        ));
        assert!(Volume::new([1, 1, 2], vec![0., f64::NAN]).is_err());
    }

    #[test]
    fn axial_trace_and_planes() {
        let planes = vec![vec![1., 2., 3., 4.], vec![5., 6., 7., 8.]];
        let volume = Volume::from_planes(2, 2, &planes).unwrap();
        assert_eq!(volume.size(), [2, 2, 2]);
        assert_eq!(volume.axial_trace(1, 0), Some(&[3., 7.][..]));
        assert_eq!(volume.get(0, 1, 1), Some(6.));
        assert_eq!(volume.get(2, 0, 0), None);
        assert!(volume.axial_trace(0, 2).is_none());
    }

    #[test]
    fn volume_from_source() {
        let samples: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let image = InMemoryImage::from_volume("test", [2, 2, 3], samples.clone());
        let volume = Volume::from_source(&image, 0, 0).unwrap();
        assert_eq!(volume, Volume::new([2, 2, 3], samples).unwrap());
        assert!(matches!(
            Volume::from_source(&image, 1, 0),
            Err(VolumeError::Source(SourceError::ChannelOutOfRange(1, 1)))
        ));
    }

    #[test]
    fn plane_window() {
        let plane = Plane::from_fn(4, 5, |r, c| (r * 5 + c) as f64);
        let window = plane.window(1, 2, 2, 3).unwrap();
        assert_eq!(window.as_slice(), &[7., 8., 9., 12., 13., 14.]);
        assert!(plane.window(3, 0, 2, 2).is_none());
        assert!(plane.window(0, 4, 1, 2).is_none());
    }
}
