//! PSF analysis of bead images
//!
//! Runs projection, peak detection, bead cropping, Gaussian fitting and
//! resolution aggregation in sequence for each image.

use rayon::prelude::*;
use serde::{Serialize, Serializer};

use crate::{
    bead::{Bead, BeadCropper, CropError},
    fit::{
        axial::{fit_axial, AxialParams},
        lateral::{fit_lateral, LateralParams},
        FitConfig, FitResult, Parameters,
    },
    peaks::{Peak, PeakDetector},
    resolution::{aggregate, ResolutionEstimate, TheoreticalResolution},
    source::{AcquisitionMetadata, ImageSource, PixelSize},
    volume::Volume,
    Error,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("the minimum peak distance must be at least 1 pixel")]
    ZeroMinDistance,
    #[error("the crop half-width must be at least 1 pixel")]
    ZeroCrop,
    #[error("the noise tolerance must be a non-negative number, found {0}")]
    InvalidTolerance(f64),
}

/// PSF analysis settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsfConfig {
    /// Minimum distance [pixel] of a peak to the image border and to another peak
    pub min_distance: usize,
    /// Noise tolerance of the maxima finder
    pub tolerance: f64,
    /// Half-width [pixel] of the lateral bead patch
    pub crop: usize,
    pub channel: usize,
    pub time_point: usize,
    pub fit: FitConfig,
    /// Fits the beads in parallel
    pub parallel: bool,
}
impl Default for PsfConfig {
    fn default() -> Self {
        Self {
            min_distance: 10,
            tolerance: 50f64,
            crop: 8,
            channel: 0,
            time_point: 0,
            fit: FitConfig::default(),
            parallel: false,
        }
    }
}
impl PsfConfig {
    pub fn min_distance(self, min_distance: usize) -> Self {
        Self {
            min_distance,
            ..self
        }
    }
    pub fn tolerance(self, tolerance: f64) -> Self {
        Self { tolerance, ..self }
    }
    pub fn crop(self, crop: usize) -> Self {
        Self { crop, ..self }
    }
    pub fn channel(self, channel: usize) -> Self {
        Self { channel, ..self }
    }
    pub fn time_point(self, time_point: usize) -> Self {
        Self { time_point, ..self }
    }
    pub fn fit(self, fit: FitConfig) -> Self {
        Self { fit, ..self }
    }
    pub fn parallel(self, parallel: bool) -> Self {
        Self { parallel, ..self }
    }
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_distance == 0 {
            return Err(ConfigError::ZeroMinDistance);
        }
        if self.crop == 0 {
            return Err(ConfigError::ZeroCrop);
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.) {
            return Err(ConfigError::InvalidTolerance(self.tolerance));
        }
        if self.crop > self.min_distance {
            log::warn!(
                "crop half-width ({}) larger than the minimum peak distance ({}): beads near the border will be dropped",
                self.crop,
                self.min_distance
            );
        }
        Ok(())
    }
}

fn serialize_record<P, S>(fit: &FitResult<P>, serializer: S) -> Result<S::Ok, S::Error>
where
    P: Parameters,
    P::Record: Serialize,
    S: Serializer,
{
    fit.to_record().serialize(serializer)
}

/// Lateral and axial fits of a bead
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeadFit {
    /// Index of the bead peak in [`Analysis::peaks`]
    pub index: usize,
    pub peak: Peak,
    #[serde(serialize_with = "serialize_record")]
    pub lateral: FitResult<LateralParams>,
    #[serde(serialize_with = "serialize_record")]
    pub axial: FitResult<AxialParams>,
}
impl BeadFit {
    fn new(bead: &Bead, config: &FitConfig) -> Self {
        let lateral = fit_lateral(&bead.patch, config);
        let axial = fit_axial(&bead.trace, config);
        log::debug!(
            "bead #{} at {:?}: lateral {}, axial {}",
            bead.index,
            bead.peak,
            if lateral.is_success() { "ok" } else { "failed" },
            if axial.is_success() { "ok" } else { "failed" },
        );
        Self {
            index: bead.index,
            peak: bead.peak,
            lateral,
            axial,
        }
    }
    /// `[amplitude, x0, y0, sigma_x, sigma_y, theta, offset]`, NaN if the fit failed
    pub fn lateral_record(&self) -> [f64; 7] {
        self.lateral.to_record()
    }
    /// `[amplitude, center, sigma, offset]`, NaN if the fit failed
    pub fn axial_record(&self) -> [f64; 4] {
        self.axial.to_record()
    }
}

/// PSF analysis of an image with at least one retained peak
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    /// Maxima of the projection before pruning
    pub raw_peaks: Vec<Peak>,
    /// Retained peaks
    pub peaks: Vec<Peak>,
    /// Peaks which crop window does not fit in the image
    pub dropped: Vec<CropError>,
    /// Bead fits, in the order of the retained peaks
    pub beads: Vec<BeadFit>,
    pub resolution: ResolutionEstimate,
    pub metadata: AcquisitionMetadata,
    /// Diffraction limit, if the acquisition metadata is known
    pub theoretical: Option<TheoreticalResolution>,
}
impl Analysis {
    pub fn n_fitted(&self) -> usize {
        self.beads
            .iter()
            .filter(|bead| bead.lateral.is_success() && bead.axial.is_success())
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ImageReport {
    Analysed(Analysis),
    /// No peak survived the pruning
    NoPeaksFound { raw_peaks: Vec<Peak> },
}

/// Analysis result of one image of a batch
#[derive(Debug)]
pub struct ImageOutcome {
    pub name: String,
    pub result: Result<ImageReport, Error>,
}

/// Runs the PSF analysis of a volume
pub fn analyse_volume(
    volume: &Volume,
    pixel_size: &PixelSize,
    metadata: &AcquisitionMetadata,
    config: &PsfConfig,
) -> ImageReport {
    let projection = volume.projection();
    let detection = PeakDetector::new(config.min_distance, config.tolerance).detect(&projection);
    log::info!(
        "{} maxima found, {} peaks kept",
        detection.raw.len(),
        detection.kept.len()
    );
    if detection.is_empty() {
        log::warn!("no peaks found");
        return ImageReport::NoPeaksFound {
            raw_peaks: detection.raw,
        };
    }

    let (beads, dropped) =
        BeadCropper::new(config.crop).crop_all(&detection.kept, volume, &projection);
    let fits: Vec<BeadFit> = if config.parallel {
        beads
            .par_iter()
            .map(|bead| BeadFit::new(bead, &config.fit))
            .collect()
    } else {
        beads
            .iter()
            .map(|bead| BeadFit::new(bead, &config.fit))
            .collect()
    };

    let (lateral, axial): (Vec<_>, Vec<_>) = fits.iter().map(|fit| (fit.lateral, fit.axial)).unzip();
    let resolution = aggregate(&lateral, &axial, pixel_size);
    let analysis = Analysis {
        raw_peaks: detection.raw,
        peaks: detection.kept,
        dropped,
        beads: fits,
        resolution,
        metadata: *metadata,
        theoretical: TheoreticalResolution::from_metadata(metadata),
    };
    log::info!(
        "{} beads fitted out of {} peaks",
        analysis.n_fitted(),
        analysis.peaks.len()
    );
    ImageReport::Analysed(analysis)
}

/// Runs the PSF analysis of the configured channel and time point of an image
pub fn analyse_image<S: ImageSource + ?Sized>(
    source: &S,
    config: &PsfConfig,
) -> Result<ImageReport, Error> {
    config.validate()?;
    let volume = Volume::from_source(source, config.channel, config.time_point)?;
    let [x, y, z] = volume.size();
    log::info!("{}: {}x{}x{} volume loaded", source.name(), x, y, z);
    Ok(analyse_volume(
        &volume,
        &source.pixel_size(),
        &source.metadata(),
        config,
    ))
}

/// Runs the PSF analysis of each image in turn
///
/// An invalid image is reported in its outcome and does not stop the batch;
/// only an invalid configuration is an error.
pub fn analyse_batch<I>(images: I, config: &PsfConfig) -> Result<Vec<ImageOutcome>, Error>
where
    I: IntoIterator,
    I::Item: ImageSource,
{
    config.validate()?;
    Ok(images
        .into_iter()
        .map(|image| {
            let name = image.name();
            let result = analyse_image(&image, config);
            if let Err(e) = &result {
                log::warn!("{name}: {e}");
            }
            ImageOutcome { name, result }
        })
        .collect())
}
