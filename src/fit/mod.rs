/*!
# Gaussian fitting

Bead profiles are fitted by bounded non-linear least squares with the
Levenberg-Marquardt algorithm:
 - [`lateral`]: rotated elliptical 2-D Gaussian on the lateral patch
 - [`axial`]: 1-D Gaussian on the axial trace

A fit either succeeds or fails, see [`FitResult`]; a failed fit is written as
a NaN filled record of the same width as a successful one.
*/

use serde::Serialize;

pub mod axial;
pub mod lateral;
mod solver;
pub use solver::FitFailure;

/// Least-squares fitting settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitConfig {
    /// Maximum number of model evaluations
    pub max_iterations: usize,
    /// Tolerance on the relative decrease of the cost
    pub ftol: f64,
    /// Tolerance on the relative parameter step
    pub xtol: f64,
    /// Tolerance on the largest gradient component
    pub gtol: f64,
    /// Initial Levenberg-Marquardt damping
    pub initial_damping: f64,
    /// Damping multiplier after a rejected step
    pub damping_up: f64,
    /// Damping multiplier after an accepted step
    pub damping_down: f64,
    /// Initial guess of the lateral standard deviations [pixel]
    pub lateral_sigma: f64,
    /// Initial guess of the axial standard deviation [plane]
    pub axial_sigma: f64,
    /// Initial guess of the background offset
    pub offset: f64,
}
impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-12,
            initial_damping: 1e-3,
            damping_up: 10f64,
            damping_down: 0.1,
            lateral_sigma: 2f64,
            axial_sigma: 1f64,
            offset: 100f64,
        }
    }
}
impl FitConfig {
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }
    pub fn offset(self, offset: f64) -> Self {
        Self { offset, ..self }
    }
}

/// Fixed width numeric record of fitted parameters
pub trait Parameters {
    /// Record type, `[f64; N]`
    type Record;
    fn to_record(&self) -> Self::Record;
    /// Record of a failed fit
    fn nan_record() -> Self::Record;
}

/// Fitted parameters with fit diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fit<P> {
    pub params: P,
    /// Root mean square of the residuals
    pub rms_residual: f64,
    /// Number of model evaluations
    pub iterations: usize,
}

/// Outcome of a bead fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitResult<P> {
    Success(Fit<P>),
    Failed(FitFailure),
}
impl<P> FitResult<P> {
    pub fn is_success(&self) -> bool {
        matches!(self, FitResult::Success(_))
    }
    pub fn params(&self) -> Option<&P> {
        match self {
            FitResult::Success(fit) => Some(&fit.params),
            FitResult::Failed(_) => None,
        }
    }
}
impl<P: Parameters> FitResult<P> {
    /// Fitted parameters record, all NaN if the fit failed
    pub fn to_record(&self) -> P::Record {
        match self {
            FitResult::Success(fit) => fit.params.to_record(),
            FitResult::Failed(_) => P::nan_record(),
        }
    }
}
