use nalgebra::DMatrix;
use tracing::trace;

use crate::config::SolverConfig;
use crate::system::{ResidualSystem, SolveOutcome};

const LAMBDA_INITIAL: f64 = 1e-3;
const LAMBDA_FACTOR: f64 = 10.0;

/// Levenberg-Marquardt: damped Gauss-Newton steps through the normal
/// equations, with the damping raised on rejected steps and relaxed on
/// accepted ones.
pub fn solve<S: ResidualSystem + ?Sized>(
    system: &S,
    x: &mut [f64],
    config: &SolverConfig,
) -> SolveOutcome {
    let n = x.len();
    if n == 0 || system.residual_count() == 0 {
        let residual = system.residual_norm(x);
        return SolveOutcome {
            converged: residual < config.convergence,
            iterations: 0,
            residual,
        };
    }

    let mut r = system.residual_vector(x);
    let mut cost = r.norm();
    let mut lambda = LAMBDA_INITIAL;
    let mut iterations = 0;

    for iteration in 0..config.max_iterations {
        if cost < config.convergence {
            return SolveOutcome {
                converged: true,
                iterations,
                residual: cost,
            };
        }
        iterations = iteration + 1;

        let jac = system.jacobian(x);
        let jtj = jac.transpose() * &jac;
        let grad = jac.transpose() * &r;
        if grad.norm() < 1e-16 {
            break; // stationary point, possibly a conflict
        }

        let mut improved = false;
        for _ in 0..20 {
            let mut damped: DMatrix<f64> = jtj.clone();
            for i in 0..n {
                damped[(i, i)] += lambda * (1.0 + jtj[(i, i)]);
            }
            let step = match damped.cholesky() {
                Some(chol) => chol.solve(&grad.scale(-1.0)),
                None => {
                    lambda *= LAMBDA_FACTOR;
                    continue;
                }
            };

            let mut trial = x.to_vec();
            for i in 0..n {
                trial[i] += step[i];
            }
            let r_trial = system.residual_vector(&trial);
            let trial_cost = r_trial.norm();

            if trial_cost < cost {
                x.copy_from_slice(&trial);
                r = r_trial;
                cost = trial_cost;
                lambda = (lambda / LAMBDA_FACTOR).max(1e-12);
                improved = true;
                break;
            }
            lambda *= LAMBDA_FACTOR;
        }

        if config.per_iteration() {
            trace!(iteration, residual = cost, lambda, "lm iteration");
        }
        if !improved {
            break;
        }
    }

    SolveOutcome {
        converged: cost < config.convergence,
        iterations,
        residual: cost,
    }
}
