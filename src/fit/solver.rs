//! Bounded Levenberg-Marquardt least squares

use nalgebra::{DMatrix, DVector};

use super::{Fit, FitConfig};

const MIN_DAMPING: f64 = 1e-15;
const MAX_DAMPING: f64 = 1e15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FitFailure {
    #[error("no convergence after {0} model evaluations")]
    IterationCap(usize),
    #[error("non-finite model residuals")]
    NonFinite,
    #[error("{samples} samples cannot constrain {params} parameters")]
    TooFewSamples { samples: usize, params: usize },
    #[error("damping diverged without decreasing the cost")]
    Stalled,
}
type Result<T> = std::result::Result<T, FitFailure>;

/// Parametric model fitted to a set of observations
pub(crate) trait Model {
    /// Lower and upper bounds of each parameter
    const BOUNDS: &'static [(f64, f64)];
    fn observations(&self) -> &[f64];
    /// Model value for the `i`th observation
    ///
    /// The partial derivatives with respect to the parameters are written to
    /// `gradient`.
    fn value(&self, i: usize, params: &[f64], gradient: &mut [f64]) -> f64;
}

struct Evaluation {
    residuals: DVector<f64>,
    jacobian: DMatrix<f64>,
    cost: f64,
}

fn evaluate<M: Model>(model: &M, params: &DVector<f64>) -> Evaluation {
    let observations = model.observations();
    let n_params = M::BOUNDS.len();
    let mut jacobian = DMatrix::zeros(observations.len(), n_params);
    let mut gradient = vec![0f64; n_params];
    let residuals = DVector::from_iterator(
        observations.len(),
        observations.iter().enumerate().map(|(i, &y)| {
            let value = model.value(i, params.as_slice(), &mut gradient);
            jacobian.row_mut(i).copy_from_slice(&gradient);
            y - value
        }),
    );
    let cost = 0.5 * residuals.norm_squared();
    Evaluation {
        residuals,
        jacobian,
        cost,
    }
}

fn project(params: &mut DVector<f64>, bounds: &[(f64, f64)]) {
    params
        .iter_mut()
        .zip(bounds)
        .for_each(|(p, &(lower, upper))| *p = p.clamp(lower, upper));
}

/// Minimizes the sum of squared residuals of `model` starting from `initial`
///
/// Each trial step is projected onto the parameter bounds. The fit converges
/// when the relative cost decrease falls below `ftol`, the relative step below
/// `xtol` or the gradient below `gtol`; running out of model evaluations is a
/// failure.
pub(crate) fn minimize<M: Model>(
    model: &M,
    initial: &[f64],
    config: &FitConfig,
) -> Result<Fit<Vec<f64>>> {
    let n_samples = model.observations().len();
    let n_params = M::BOUNDS.len();
    if n_samples < n_params {
        return Err(FitFailure::TooFewSamples {
            samples: n_samples,
            params: n_params,
        });
    }

    let mut params = DVector::from_column_slice(initial);
    project(&mut params, M::BOUNDS);
    let mut current = evaluate(model, &params);
    let mut evaluations = 1;
    if !current.cost.is_finite() {
        return Err(FitFailure::NonFinite);
    }

    let converged = |params: DVector<f64>, cost: f64, evaluations: usize| {
        if params.iter().all(|p| p.is_finite()) {
            Ok(Fit {
                params: params.as_slice().to_vec(),
                rms_residual: (2. * cost / n_samples as f64).sqrt(),
                iterations: evaluations,
            })
        } else {
            Err(FitFailure::NonFinite)
        }
    };

    let mut damping = config.initial_damping;
    loop {
        let normal = current.jacobian.tr_mul(&current.jacobian);
        let gradient = current.jacobian.tr_mul(&current.residuals);
        if gradient.amax() <= config.gtol {
            return converged(params, current.cost, evaluations);
        }
        loop {
            if evaluations >= config.max_iterations {
                return Err(FitFailure::IterationCap(evaluations));
            }
            let mut system = normal.clone();
            for k in 0..n_params {
                system[(k, k)] += damping * normal[(k, k)].max(f64::EPSILON);
            }
            let Some(step) = system.cholesky().map(|c| c.solve(&gradient)) else {
                damping *= config.damping_up;
                if damping > MAX_DAMPING {
                    return Err(FitFailure::Stalled);
                }
                continue;
            };
            let mut trial = &params + step;
            project(&mut trial, M::BOUNDS);
            let small_step =
                (&trial - &params).norm() <= config.xtol * (config.xtol + params.norm());
            let candidate = evaluate(model, &trial);
            evaluations += 1;
            if candidate.cost.is_finite() && candidate.cost < current.cost {
                let decrease = (current.cost - candidate.cost) / current.cost;
                params = trial;
                current = candidate;
                damping = (damping * config.damping_down).max(MIN_DAMPING);
                if decrease <= config.ftol || small_step {
                    return converged(params, current.cost, evaluations);
                }
                break;
            }
            // no decrease even for a vanishing step: the cost is at its minimum
            if small_step {
                return converged(params, current.cost, evaluations);
            }
            damping *= config.damping_up;
            if damping > MAX_DAMPING {
                return Err(FitFailure::Stalled);
            }
        }
    }
}
