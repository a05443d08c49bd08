//! PSF resolution from the fitted bead widths
//!
//! The resolution along an axis is the Rayleigh range `K σ` converted to
//! physical units with the pixel size and averaged over the beads which fit
//! succeeded on that axis, with `K = 2√(2 ln2) × 1.1853`.

use std::fmt;

use serde::Serialize;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::{
    fit::{axial::AxialParams, lateral::LateralParams, FitResult},
    source::{AcquisitionMetadata, PixelSize},
};

/// Full width at half maximum of a Gaussian in units of its standard deviation
pub const FWHM_PER_SIGMA: f64 = 2.354820045030949;
/// Rayleigh range in units of the full width at half maximum
pub const RAYLEIGH_PER_FWHM: f64 = 1.1853;
/// Rayleigh range in units of the Gaussian standard deviation
pub const RAYLEIGH_FACTOR: f64 = FWHM_PER_SIGMA * RAYLEIGH_PER_FWHM;

#[derive(EnumIter, Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum Axis {
    X,
    Y,
    Z,
}
impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
            Axis::Z => write!(f, "z"),
        }
    }
}

/// Resolution along one axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum AxisEstimate {
    /// Mean Rayleigh range over `n_beads` beads
    Rayleigh { range: f64, n_beads: usize },
    /// No bead was successfully fitted along the axis
    NoValidFits,
}
impl AxisEstimate {
    /// Averages the Rayleigh range of the finite `sigmas`
    pub fn from_sigmas(sigmas: impl IntoIterator<Item = f64>, pixel_size: f64) -> Self {
        let (sum, n_beads) = sigmas
            .into_iter()
            .filter(|sigma| sigma.is_finite())
            .fold((0f64, 0usize), |(sum, n), sigma| {
                (sum + sigma * RAYLEIGH_FACTOR * pixel_size, n + 1)
            });
        if n_beads == 0 {
            AxisEstimate::NoValidFits
        } else {
            AxisEstimate::Rayleigh {
                range: sum / n_beads as f64,
                n_beads,
            }
        }
    }
    pub fn range(&self) -> Option<f64> {
        match self {
            AxisEstimate::Rayleigh { range, .. } => Some(*range),
            AxisEstimate::NoValidFits => None,
        }
    }
}
impl fmt::Display for AxisEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisEstimate::Rayleigh { range, n_beads } => {
                write!(f, "{:.4} ({} beads)", range, n_beads)
            }
            AxisEstimate::NoValidFits => write!(f, "no valid fits"),
        }
    }
}

/// Resolution along the x, y and z axes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolutionEstimate {
    pub x: AxisEstimate,
    pub y: AxisEstimate,
    pub z: AxisEstimate,
}
impl ResolutionEstimate {
    pub fn get(&self, axis: Axis) -> &AxisEstimate {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }
}
impl fmt::Display for ResolutionEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = Axis::iter()
            .map(|axis| format!("{} resolution: {}", axis, self.get(axis)))
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}

/// Aggregates the bead fits into the resolution estimate
///
/// x and y use the lateral standard deviations and z the axial one; each axis
/// only counts the beads which fit succeeded.
pub fn aggregate(
    lateral: &[FitResult<LateralParams>],
    axial: &[FitResult<AxialParams>],
    pixel_size: &PixelSize,
) -> ResolutionEstimate {
    let estimate = |axis: Axis| {
        let sigmas: Vec<f64> = match axis {
            Axis::X => lateral.iter().filter_map(|fit| fit.params()).map(|p| p.sigma_x).collect(),
            Axis::Y => lateral.iter().filter_map(|fit| fit.params()).map(|p| p.sigma_y).collect(),
            Axis::Z => axial.iter().filter_map(|fit| fit.params()).map(|p| p.sigma).collect(),
        };
        let estimate = AxisEstimate::from_sigmas(sigmas, pixel_size.along(axis));
        match estimate {
            AxisEstimate::Rayleigh { range, n_beads } => {
                log::info!("{axis} resolution: {range:.4} from {n_beads} bead(s)")
            }
            AxisEstimate::NoValidFits => log::warn!("{axis} resolution: no valid fits"),
        }
        estimate
    };
    ResolutionEstimate {
        x: estimate(Axis::X),
        y: estimate(Axis::Y),
        z: estimate(Axis::Z),
    }
}

/// Diffraction limited resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TheoreticalResolution {
    /// `0.61 λ / NA`
    pub lateral: f64,
    /// `2 λ / NA`
    pub axial: f64,
}
impl TheoreticalResolution {
    pub fn new(emission_wavelength: f64, numerical_aperture: f64) -> Self {
        Self {
            lateral: 0.61 * emission_wavelength / numerical_aperture,
            axial: 2. * emission_wavelength / numerical_aperture,
        }
    }
    /// Returns the theoretical resolution if both the wavelength and the
    /// numerical aperture are known
    pub fn from_metadata(metadata: &AcquisitionMetadata) -> Option<Self> {
        match (metadata.emission_wavelength, metadata.numerical_aperture) {
            (Some(wavelength), Some(na)) if wavelength > 0. && na > 0. => {
                Some(Self::new(wavelength, na))
            }
            _ => None,
        }
    }
}
impl fmt::Display for TheoreticalResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "theoretical resolution: {:.4} (lateral), {:.4} (axial)",
            self.lateral, self.axial
        )
    }
}
