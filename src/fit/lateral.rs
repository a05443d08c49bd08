//! Rotated elliptical 2-D Gaussian fit of the lateral bead patch
//!
//! The model is
//! `offset + amplitude exp(-(a dx² + 2b dx dy + c dy²))`
//! with `dx = x - x0`, `dy = y - y0` and
//!  - `a = cos²θ/(2σx²) + sin²θ/(2σy²)`
//!  - `b = -sin2θ/(4σx²) + sin2θ/(4σy²)`
//!  - `c = sin²θ/(2σx²) + cos²θ/(2σy²)`
//!
//! where `x` is the patch row and `y` the patch column, so `σx` and `σy` are
//! the widths along the volume x and y axes.

use serde::Serialize;

use super::{
    solver::{self, Model},
    Fit, FitConfig, FitResult, Parameters,
};
use crate::volume::Plane;

const N_PARAMS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LateralParams {
    pub amplitude: f64,
    pub x0: f64,
    pub y0: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    /// Rotation angle [rd]
    pub theta: f64,
    pub offset: f64,
}
impl From<&[f64]> for LateralParams {
    fn from(p: &[f64]) -> Self {
        Self {
            amplitude: p[0],
            x0: p[1],
            y0: p[2],
            sigma_x: p[3],
            sigma_y: p[4],
            theta: p[5],
            offset: p[6],
        }
    }
}
impl Parameters for LateralParams {
    type Record = [f64; N_PARAMS];
    fn to_record(&self) -> Self::Record {
        [
            self.amplitude,
            self.x0,
            self.y0,
            self.sigma_x,
            self.sigma_y,
            self.theta,
            self.offset,
        ]
    }
    fn nan_record() -> Self::Record {
        [f64::NAN; N_PARAMS]
    }
}
impl LateralParams {
    /// Model value at row `x` and column `y`
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let mut gradient = [0f64; N_PARAMS];
        gaussian(&self.to_record(), x, y, &mut gradient)
    }
}

fn gaussian(p: &[f64], x: f64, y: f64, gradient: &mut [f64]) -> f64 {
    let (amplitude, x0, y0, sx, sy, theta) = (p[0], p[1], p[2], p[3], p[4], p[5]);
    let (sin, cos) = theta.sin_cos();
    let (sin2, cos2) = (2. * theta).sin_cos();
    let (sin_sq, cos_sq) = (sin * sin, cos * cos);
    let (sx2, sy2) = (sx * sx, sy * sy);
    let a = cos_sq / (2. * sx2) + sin_sq / (2. * sy2);
    let b = -sin2 / (4. * sx2) + sin2 / (4. * sy2);
    let c = sin_sq / (2. * sx2) + cos_sq / (2. * sy2);

    let (dx, dy) = (x - x0, y - y0);
    let (dx2, dxy, dy2) = (dx * dx, dx * dy, dy * dy);
    let e = (-(a * dx2 + 2. * b * dxy + c * dy2)).exp();
    let ae = amplitude * e;

    let dq_dsx = (-cos_sq * dx2 + sin2 * dxy - sin_sq * dy2) / (sx2 * sx);
    let dq_dsy = (-sin_sq * dx2 - sin2 * dxy - cos_sq * dy2) / (sy2 * sy);
    let h = 1. / (2. * sy2) - 1. / (2. * sx2);
    let dq_dtheta = h * (sin2 * dx2 + 2. * cos2 * dxy - sin2 * dy2);

    gradient[0] = e;
    gradient[1] = ae * (2. * a * dx + 2. * b * dy);
    gradient[2] = ae * (2. * b * dx + 2. * c * dy);
    gradient[3] = -ae * dq_dsx;
    gradient[4] = -ae * dq_dsy;
    gradient[5] = -ae * dq_dtheta;
    gradient[6] = 1.;
    p[6] + ae
}

struct PatchModel<'a> {
    patch: &'a Plane,
}
impl<'a> Model for PatchModel<'a> {
    const BOUNDS: &'static [(f64, f64)] = &[
        (0., f64::INFINITY),
        (0., f64::INFINITY),
        (0., f64::INFINITY),
        (0., f64::INFINITY),
        (0., f64::INFINITY),
        (f64::NEG_INFINITY, f64::INFINITY),
        (0., f64::INFINITY),
    ];
    fn observations(&self) -> &[f64] {
        self.patch.as_slice()
    }
    fn value(&self, i: usize, params: &[f64], gradient: &mut [f64]) -> f64 {
        let cols = self.patch.cols();
        let (row, col) = (i / cols, i % cols);
        gaussian(params, row as f64, col as f64, gradient)
    }
}

/// Fits the rotated elliptical Gaussian to a bead `patch`
///
/// The fit starts from the patch maximum at the patch center, with circular
/// standard deviations and no rotation.
pub fn fit_lateral(patch: &Plane, config: &FitConfig) -> FitResult<LateralParams> {
    let initial = [
        patch.max(),
        (patch.rows() / 2) as f64,
        (patch.cols() / 2) as f64,
        config.lateral_sigma,
        config.lateral_sigma,
        0.,
        config.offset,
    ];
    match solver::minimize(&PatchModel { patch }, &initial, config) {
        Ok(fit) => {
            log::debug!(
                "lateral fit converged in {} evaluations (rms: {:.3e})",
                fit.iterations,
                fit.rms_residual
            );
            FitResult::Success(Fit {
                params: LateralParams::from(fit.params.as_slice()),
                rms_residual: fit.rms_residual,
                iterations: fit.iterations,
            })
        }
        Err(e) => {
            log::debug!("lateral fit failed: {e}");
            FitResult::Failed(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::FitFailure;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn synthetic(truth: &LateralParams, side: usize) -> Plane {
        Plane::from_fn(side, side, |r, c| truth.evaluate(r as f64, c as f64))
    }

    fn assert_close(found: f64, expected: f64, rel: f64) {
        assert!(
            (found - expected).abs() <= rel * expected.abs(),
            "found {found}, expected {expected}"
        );
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let p = [80., 9.3, 10.6, 2.2, 3.1, 0.4, 7.];
        let (x, y) = (11., 8.);
        let mut gradient = [0f64; N_PARAMS];
        gaussian(&p, x, y, &mut gradient);
        let mut scratch = [0f64; N_PARAMS];
        for k in 0..N_PARAMS {
            let step = 1e-6;
            let (mut up, mut down) = (p, p);
            up[k] += step;
            down[k] -= step;
            let numeric = (gaussian(&up, x, y, &mut scratch) - gaussian(&down, x, y, &mut scratch))
                / (2. * step);
            assert!(
                (numeric - gradient[k]).abs() < 1e-5 * (1. + numeric.abs()),
                "parameter #{k}: {numeric} vs {}",
                gradient[k]
            );
        }
    }

    #[test]
    fn recovers_elliptical_gaussian() {
        let truth = LateralParams {
            amplitude: 100.,
            x0: 10.,
            y0: 10.,
            sigma_x: 2.,
            sigma_y: 3.,
            theta: 0.,
            offset: 5.,
        };
        let fit = match fit_lateral(&synthetic(&truth, 20), &FitConfig::default()) {
            FitResult::Success(fit) => fit,
            FitResult::Failed(e) => panic!("fit failed: {e}"),
        };
        let p = fit.params;
        assert_close(p.amplitude, 100., 1e-2);
        assert_close(p.x0, 10., 1e-2);
        assert_close(p.y0, 10., 1e-2);
        assert_close(p.sigma_x, 2., 1e-2);
        assert_close(p.sigma_y, 3., 1e-2);
        assert_close(p.offset, 5., 1e-2);
        assert!(p.theta.abs() < 1e-3, "theta: {}", p.theta);
    }

    #[test]
    fn sigma_x_is_the_width_along_rows() {
        // wide along rows, narrow along columns
        let patch = Plane::from_fn(18, 18, |r, c| {
            let (dr, dc) = (r as f64 - 9., c as f64 - 9.);
            20. + 300. * (-dr * dr / (2. * 3. * 3.) - dc * dc / (2. * 1.5 * 1.5)).exp()
        });
        let p = *fit_lateral(&patch, &FitConfig::default())
            .params()
            .expect("fit failed");
        assert_close(p.sigma_x, 3., 1e-2);
        assert_close(p.sigma_y, 1.5, 1e-2);
        assert!(p.theta.abs() < 1e-3, "theta: {}", p.theta);
    }

    #[test]
    fn recovers_rotated_gaussian_widths() {
        let truth = LateralParams {
            amplitude: 60.,
            x0: 8.4,
            y0: 7.6,
            sigma_x: 1.8,
            sigma_y: 2.7,
            theta: 0.5,
            offset: 10.,
        };
        let fit = match fit_lateral(&synthetic(&truth, 16), &FitConfig::default()) {
            FitResult::Success(fit) => fit,
            FitResult::Failed(e) => panic!("fit failed: {e}"),
        };
        let p = fit.params;
        // widths may come out swapped with the angle turned by 90°
        let (narrow, wide) = if p.sigma_x < p.sigma_y {
            (p.sigma_x, p.sigma_y)
        } else {
            (p.sigma_y, p.sigma_x)
        };
        assert_close(narrow, 1.8, 1e-2);
        assert_close(wide, 2.7, 1e-2);
        assert_close(p.x0, 8.4, 1e-2);
        assert_close(p.y0, 7.6, 1e-2);
        assert!(fit.rms_residual < 1e-3);
    }

    #[test]
    fn noisy_patch() {
        let truth = LateralParams {
            amplitude: 200.,
            x0: 8.,
            y0: 8.,
            sigma_x: 2.,
            sigma_y: 2.5,
            theta: 0.,
            offset: 100.,
        };
        let mut rng = StdRng::seed_from_u64(7);
        let patch = Plane::from_fn(16, 16, |r, c| {
            truth.evaluate(r as f64, c as f64) + rng.gen_range(-2.0..2.0)
        });
        let p = *fit_lateral(&patch, &FitConfig::default())
            .params()
            .expect("fit failed");
        assert_close(p.sigma_x, 2., 5e-2);
        assert_close(p.sigma_y, 2.5, 5e-2);
    }

    #[test]
    fn nan_patch_fails_with_nan_record() {
        let patch = Plane::from_fn(8, 8, |r, c| if (r, c) == (3, 3) { f64::NAN } else { 1. });
        let fit = fit_lateral(&patch, &FitConfig::default());
        assert_eq!(fit, FitResult::Failed(FitFailure::NonFinite));
        let record = fit.to_record();
        assert_eq!(record.len(), 7);
        assert!(record.iter().all(|x| x.is_nan()));
    }

    #[test]
    fn iteration_cap() {
        let truth = LateralParams {
            amplitude: 100.,
            x0: 9.,
            y0: 11.,
            sigma_x: 2.,
            sigma_y: 3.,
            theta: 0.,
            offset: 5.,
        };
        let config = FitConfig::default().max_iterations(1);
        assert!(matches!(
            fit_lateral(&synthetic(&truth, 20), &config),
            FitResult::Failed(FitFailure::IterationCap(1))
        ));
    }
}
