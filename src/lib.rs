/*!
# PSF distiller

Estimates the point spread function (PSF) of a fluorescence microscope from
3-D images of sub-resolution beads.

## Pipeline

1. [`Volume::projection`] folds the volume into its maximum intensity
   projection (MIP)
2. [`PeakDetector`] finds the maxima of the MIP standing above the noise
   tolerance and rejects the ones close to the image border or to each other
3. [`BeadCropper`] cuts a lateral patch out of the MIP and the axial trace out
   of the volume around each peak
4. [`fit_lateral`] and [`fit_axial`] fit a rotated elliptical 2-D Gaussian and
   a 1-D Gaussian to each bead
5. [`aggregate`] turns the fitted widths into Rayleigh ranges averaged over
   the beads, independently for each axis

[`analyse_image`] and [`analyse_batch`] run the whole pipeline over
[`ImageSource`]s.

## Usage

```rust,no_run
use psf_distiller::{analyse_image, ImageReport, InMemoryImage, PixelSize, PsfConfig};

# fn volume_samples() -> Vec<f64> { vec![] }
let image = InMemoryImage::from_volume("beads", [256, 256, 32], volume_samples())
    .pixel_size(PixelSize::new(0.065, 0.065, 0.2));
let config = PsfConfig::default().min_distance(10).crop(8).tolerance(50.);

match analyse_image(&image, &config)? {
    ImageReport::Analysed(analysis) => println!("{}", analysis.resolution),
    ImageReport::NoPeaksFound { .. } => println!("No peaks found!"),
}
# Ok::<(), psf_distiller::Error>(())
```
*/

pub mod bead;
mod error;
pub mod fit;
pub mod peaks;
pub mod pipeline;
pub mod resolution;
pub mod source;
pub mod volume;

pub use bead::{Bead, BeadCropper, CropError};
pub use error::Error;
pub use fit::{
    axial::{fit_axial, AxialParams},
    lateral::{fit_lateral, LateralParams},
    Fit, FitConfig, FitFailure, FitResult, Parameters,
};
pub use peaks::{Detection, Peak, PeakDetector};
pub use pipeline::{
    analyse_batch, analyse_image, analyse_volume, Analysis, BeadFit, ConfigError, ImageOutcome,
    ImageReport, PsfConfig,
};
pub use resolution::{
    aggregate, Axis, AxisEstimate, ResolutionEstimate, TheoreticalResolution, RAYLEIGH_FACTOR,
};
pub use source::{AcquisitionMetadata, Dimensions, ImageSource, InMemoryImage, PixelSize, SourceError};
pub use volume::{Plane, Projection, Volume, VolumeError};
