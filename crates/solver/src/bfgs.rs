use nalgebra::DMatrix;
use tracing::trace;

use crate::config::SolverConfig;
use crate::system::{ResidualSystem, SolveOutcome};

/// BFGS quasi-Newton minimization of `0.5 * ||r(x)||^2` with a
/// backtracking Armijo line search.
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
    let mut grad = system.jacobian(x).transpose() * &r;
    let mut h_inv: DMatrix<f64> = DMatrix::identity(n, n);
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

        if grad.norm() < 1e-16 {
            break;
        }

        let mut direction = (&h_inv * &grad).scale(-1.0);
        let mut slope = grad.dot(&direction);
        if slope >= 0.0 {
            // curvature information went bad, fall back to steepest descent
            h_inv = DMatrix::identity(n, n);
            direction = grad.scale(-1.0);
            slope = grad.dot(&direction);
        }

        let f = 0.5 * cost * cost;
        let mut t = 1.0;
        let mut accepted = false;
        let mut trial = x.to_vec();
        for _ in 0..30 {
            for i in 0..n {
                trial[i] = x[i] + t * direction[i];
            }
            let r_trial = system.residual_vector(&trial);
            let f_trial = 0.5 * r_trial.norm_squared();
            if f_trial <= f + 1e-4 * t * slope {
                let step = direction.scale(t);
                x.copy_from_slice(&trial);
                r = r_trial;
                cost = r.norm();
                let grad_new = system.jacobian(x).transpose() * &r;
                let y = &grad_new - &grad;
                let sy = step.dot(&y);
                if sy > 1e-12 {
                    let rho = 1.0 / sy;
                    let identity = DMatrix::<f64>::identity(n, n);
                    let left = &identity - (&step * y.transpose()).scale(rho);
                    let right = &identity - (&y * step.transpose()).scale(rho);
                    h_inv = &left * &h_inv * &right + (&step * step.transpose()).scale(rho);
                }
                grad = grad_new;
                accepted = true;
                break;
            }
            t *= 0.5;
        }

        if config.per_iteration() {
            trace!(iteration, residual = cost, "bfgs iteration");
        }
        if !accepted {
            break;
        }
    }

    SolveOutcome {
        converged: cost < config.convergence,
        iterations,
        residual: cost,
    }
}
