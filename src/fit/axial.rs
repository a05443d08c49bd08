//! 1-D Gaussian fit of the axial bead trace
//!
//! The model is `offset + amplitude exp(-(z - center)²/(2σ²))` with `z` the
//! plane index.

use serde::Serialize;

use super::{
    solver::{self, Model},
    Fit, FitConfig, FitResult, Parameters,
};

const N_PARAMS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxialParams {
    pub amplitude: f64,
    /// Plane index of the maximum
    pub center: f64,
    pub sigma: f64,
    pub offset: f64,
}
impl From<&[f64]> for AxialParams {
    fn from(p: &[f64]) -> Self {
        Self {
            amplitude: p[0],
            center: p[1],
            sigma: p[2],
            offset: p[3],
        }
    }
}
impl Parameters for AxialParams {
    type Record = [f64; N_PARAMS];
    fn to_record(&self) -> Self::Record {
        [self.amplitude, self.center, self.sigma, self.offset]
    }
    fn nan_record() -> Self::Record {
        [f64::NAN; N_PARAMS]
    }
}
impl AxialParams {
    /// Model value at plane `z`
    pub fn evaluate(&self, z: f64) -> f64 {
        let mut gradient = [0f64; N_PARAMS];
        gaussian(&self.to_record(), z, &mut gradient)
    }
}

fn gaussian(p: &[f64], z: f64, gradient: &mut [f64]) -> f64 {
    let (amplitude, center, sigma, offset) = (p[0], p[1], p[2], p[3]);
    let dz = z - center;
    let sigma2 = sigma * sigma;
    let e = (-dz * dz / (2. * sigma2)).exp();
    let ae = amplitude * e;
    gradient[0] = e;
    gradient[1] = ae * dz / sigma2;
    gradient[2] = ae * dz * dz / (sigma2 * sigma);
    gradient[3] = 1.;
    offset + ae
}

struct TraceModel<'a> {
    trace: &'a [f64],
}
impl<'a> Model for TraceModel<'a> {
    const BOUNDS: &'static [(f64, f64)] = &[(0., f64::INFINITY); N_PARAMS];
    fn observations(&self) -> &[f64] {
        self.trace
    }
    fn value(&self, i: usize, params: &[f64], gradient: &mut [f64]) -> f64 {
        gaussian(params, i as f64, gradient)
    }
}

/// Fits the 1-D Gaussian to a bead axial `trace`
///
/// The fit starts from the trace maximum at the middle plane.
pub fn fit_axial(trace: &[f64], config: &FitConfig) -> FitResult<AxialParams> {
    let initial = [
        trace.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        trace.len() as f64 / 2.,
        config.axial_sigma,
        config.offset,
    ];
    match solver::minimize(&TraceModel { trace }, &initial, config) {
        Ok(fit) => {
            log::debug!(
                "axial fit converged in {} evaluations (rms: {:.3e})",
                fit.iterations,
                fit.rms_residual
            );
            FitResult::Success(Fit {
                params: AxialParams::from(fit.params.as_slice()),
                rms_residual: fit.rms_residual,
                iterations: fit.iterations,
            })
        }
        Err(e) => {
            log::debug!("axial fit failed: {e}");
            FitResult::Failed(e)
        }
    }
}
