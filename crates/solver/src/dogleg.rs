use tracing::trace;

use crate::config::SolverConfig;
use crate::system::{ResidualSystem, SolveOutcome};

/// Powell dog-leg: trust-region blend of the Cauchy (steepest descent)
/// point and the Gauss-Newton step.
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
    let mut radius = 1.0_f64;
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
        let grad = jac.transpose() * &r;
        let grad_norm = grad.norm();
        if grad_norm < 1e-16 {
            break;
        }

        // Cauchy point along -grad
        let jg = &jac * &grad;
        let alpha = (grad_norm * grad_norm) / jg.norm_squared().max(1e-300);
        let cauchy = grad.scale(-alpha);

        // Gauss-Newton step from the (lightly regularized) normal equations
        let mut jtj = jac.transpose() * &jac;
        for i in 0..n {
            jtj[(i, i)] += 1e-12;
        }
        let gauss_newton = match jtj.cholesky() {
            Some(chol) => chol.solve(&grad.scale(-1.0)),
            None => cauchy.clone(),
        };

        let step = if gauss_newton.norm() <= radius {
            gauss_newton
        } else if cauchy.norm() >= radius {
            cauchy.scale(radius / cauchy.norm())
        } else {
            // walk from the Cauchy point toward Gauss-Newton until the boundary
            let leg = &gauss_newton - &cauchy;
            let a = leg.norm_squared();
            let b = 2.0 * cauchy.dot(&leg);
            let c = cauchy.norm_squared() - radius * radius;
            let t = (-b + (b * b - 4.0 * a * c).max(0.0).sqrt()) / (2.0 * a);
            &cauchy + leg.scale(t)
        };

        let mut trial = x.to_vec();
        for i in 0..n {
            trial[i] += step[i];
        }
        let r_trial = system.residual_vector(&trial);
        let trial_cost = r_trial.norm();

        let linear = &r + &jac * &step;
        let predicted = cost * cost - linear.norm_squared();
        let actual = cost * cost - trial_cost * trial_cost;
        let rho = if predicted.abs() > 1e-300 {
            actual / predicted
        } else {
            0.0
        };

        if trial_cost < cost {
            x.copy_from_slice(&trial);
            r = r_trial;
            cost = trial_cost;
            if rho > 0.75 {
                radius = (radius * 2.0).min(1e6);
            } else if rho < 0.25 {
                radius *= 0.5;
            }
        } else {
            radius *= 0.25;
            if radius < 1e-14 {
                break;
            }
        }

        if config.per_iteration() {
            trace!(iteration, residual = cost, radius, rho, "dogleg iteration");
        }
    }

    SolveOutcome {
        converged: cost < config.convergence,
        iterations,
        residual: cost,
    }
}
