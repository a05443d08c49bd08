//! Access to the microscope images
//!
//! The pipeline reads images through the [`ImageSource`] trait: the declared
//! dimensions, the z-planes of one channel at one time point, the physical
//! pixel size and, when known, the acquisition metadata.
//! [`InMemoryImage`] is the implementation used by the command line tool and
//! the tests.

use serde::Serialize;

use crate::resolution::Axis;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("channel {0} out of range, the image has {1} channel(s)")]
    ChannelOutOfRange(usize, usize),
    #[error("time point {0} out of range, the image has {1} time point(s)")]
    TimePointOutOfRange(usize, usize),
    #[error("plane {0} out of range, the image has {1} plane(s)")]
    PlaneOutOfRange(usize, usize),
}

/// Image dimensions as declared by the image source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub channels: usize,
    pub time_points: usize,
}
impl Dimensions {
    /// Single channel, single time point volume
    pub fn volume(x: usize, y: usize, z: usize) -> Self {
        Self {
            x,
            y,
            z,
            channels: 1,
            time_points: 1,
        }
    }
    /// Number of samples in one z-plane
    pub fn plane_len(&self) -> usize {
        self.x * self.y
    }
    /// Number of samples in one volume
    pub fn volume_len(&self) -> usize {
        self.plane_len() * self.z
    }
}

/// Physical size of a voxel along each axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelSize {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}
impl Default for PixelSize {
    fn default() -> Self {
        Self {
            x: 1f64,
            y: 1f64,
            z: 1f64,
        }
    }
}
impl PixelSize {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
    pub fn along(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// Acquisition settings relevant to the expected resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AcquisitionMetadata {
    /// Emission wavelength of the imaged channel
    pub emission_wavelength: Option<f64>,
    /// Numerical aperture of the objective
    pub numerical_aperture: Option<f64>,
}

/// Provider of microscope image planes
pub trait ImageSource {
    /// Image name used in logs and reports
    fn name(&self) -> String;
    fn dimensions(&self) -> Dimensions;
    /// Returns the z-plane `z` of `channel` at `time_point`
    ///
    /// The plane is `dimensions().x` rows by `dimensions().y` columns in
    /// row-major order.
    fn plane(&self, z: usize, channel: usize, time_point: usize) -> Result<Vec<f64>, SourceError>;
    fn pixel_size(&self) -> PixelSize;
    fn metadata(&self) -> AcquisitionMetadata {
        AcquisitionMetadata::default()
    }
}

impl<S: ImageSource + ?Sized> ImageSource for &S {
    fn name(&self) -> String {
        (**self).name()
    }
    fn dimensions(&self) -> Dimensions {
        (**self).dimensions()
    }
    fn plane(&self, z: usize, channel: usize, time_point: usize) -> Result<Vec<f64>, SourceError> {
        (**self).plane(z, channel, time_point)
    }
    fn pixel_size(&self) -> PixelSize {
        (**self).pixel_size()
    }
    fn metadata(&self) -> AcquisitionMetadata {
        (**self).metadata()
    }
}

/// Image held in memory
///
/// Samples are stored as `[time][channel][x][y][z]`, z running fastest.
#[derive(Debug, Clone)]
pub struct InMemoryImage {
    name: String,
    dimensions: Dimensions,
    samples: Vec<f64>,
    pixel_size: PixelSize,
    metadata: AcquisitionMetadata,
}
impl InMemoryImage {
    /// Creates an image from samples laid out as `[time][channel][x][y][z]`
    ///
    /// Sample count mismatches are reported when the volume is built
    /// with [`Volume::from_source`](crate::Volume::from_source).
    pub fn new(name: impl ToString, dimensions: Dimensions, samples: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            dimensions,
            samples,
            pixel_size: PixelSize::default(),
            metadata: AcquisitionMetadata::default(),
        }
    }
    /// Creates a single channel, single time point image from `[x][y][z]` samples
    pub fn from_volume(name: impl ToString, size: [usize; 3], samples: Vec<f64>) -> Self {
        let [x, y, z] = size;
        Self::new(name, Dimensions::volume(x, y, z), samples)
    }
    pub fn pixel_size(self, pixel_size: PixelSize) -> Self {
        Self { pixel_size, ..self }
    }
    pub fn metadata(self, metadata: AcquisitionMetadata) -> Self {
        Self { metadata, ..self }
    }
}
impl ImageSource for InMemoryImage {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn plane(&self, z: usize, channel: usize, time_point: usize) -> Result<Vec<f64>, SourceError> {
        let Dimensions {
            z: n_z,
            channels,
            time_points,
            ..
        } = self.dimensions;
        if channel >= channels {
            return Err(SourceError::ChannelOutOfRange(channel, channels));
        }
        if time_point >= time_points {
            return Err(SourceError::TimePointOutOfRange(time_point, time_points));
        }
        if z >= n_z {
            return Err(SourceError::PlaneOutOfRange(z, n_z));
        }
        let offset = (time_point * channels + channel) * self.dimensions.volume_len();
        // a short sample buffer yields a short plane, caught by the volume checks
        Ok((0..self.dimensions.plane_len())
            .filter_map(|i| self.samples.get(offset + i * n_z + z).copied())
            .collect())
    }

    fn pixel_size(&self) -> PixelSize {
        self.pixel_size
    }

    fn metadata(&self) -> AcquisitionMetadata {
        self.metadata
    }
}
