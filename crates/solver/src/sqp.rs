use nalgebra::{DMatrix, DVector};
use tracing::trace;

use crate::config::SolverConfig;
use crate::system::{ResidualSystem, SolveOutcome};
use crate::lm;

/// Sequential quadratic programming variant used whenever temporary
/// constraints are registered.
///
/// The driving ("hard") residuals are solved to convergence first; the
/// temporary ("soft") residuals are then reduced best-effort with steps
/// projected onto the null space of the hard Jacobian, so a temporary
/// constraint never displaces a satisfied driving constraint and never
/// consumes a degree of freedom.
pub fn solve<H, S>(hard: &H, soft: &S, x: &mut [f64], config: &SolverConfig) -> SolveOutcome
where
    H: ResidualSystem + ?Sized,
    S: ResidualSystem + ?Sized,
{
    let n = x.len();
    let outcome = lm::solve(hard, x, config);
    if n == 0 || soft.residual_count() == 0 {
        return outcome;
    }

    // Short restoration runs pull the iterate back onto the hard manifold
    // after each projected soft step.
    let restore = SolverConfig {
        max_iterations: 25,
        ..config.clone()
    };

    let mut soft_cost = soft.residual_norm(x);
    for iteration in 0..config.max_iterations {
        if soft_cost < config.convergence {
            break;
        }

        let rs = soft.residual_vector(x);
        let js = soft.jacobian(x);
        let grad = js.transpose() * &rs;
        let mut jtj = js.transpose() * &js;
        for i in 0..n {
            jtj[(i, i)] += 1e-8;
        }
        let step = match jtj.cholesky() {
            Some(chol) => chol.solve(&grad.scale(-1.0)),
            None => grad.scale(-1.0),
        };

        let projected = project_on_null_space(hard, x, step);
        if projected.norm() < 1e-12 {
            break; // soft system fully opposed by driving constraints
        }

        let mut accepted = false;
        let mut t = 1.0;
        for _ in 0..8 {
            let mut trial = x.to_vec();
            for i in 0..n {
                trial[i] += t * projected[i];
            }
            lm::solve(hard, &mut trial, &restore);
            let trial_cost = soft.residual_norm(&trial);
            if trial_cost < soft_cost - 1e-14 {
                x.copy_from_slice(&trial);
                soft_cost = trial_cost;
                accepted = true;
                break;
            }
            t *= 0.5;
        }

        if config.per_iteration() {
            trace!(iteration, soft_residual = soft_cost, "sqp iteration");
        }
        if !accepted {
            break;
        }
    }

    SolveOutcome {
        converged: outcome.converged,
        iterations: outcome.iterations,
        residual: hard.residual_norm(x),
    }
}

/// `(I - V_r V_r^T) step`, where `V_r` spans the row space of the hard
/// Jacobian at `x`. With no hard residuals the projection is the identity.
fn project_on_null_space<H: ResidualSystem + ?Sized>(
    hard: &H,
    x: &[f64],
    step: DVector<f64>,
) -> DVector<f64> {
    if hard.residual_count() == 0 {
        return step;
    }
    let jac = hard.jacobian(x);
    let n = x.len();
    let svd = jac.svd(false, true);
    let Some(v_t) = svd.v_t.as_ref() else {
        return step;
    };
    let max_sv = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let tol = max_sv * 1e-10;
    let mut projector: DMatrix<f64> = DMatrix::identity(n, n);
    for (i, sv) in svd.singular_values.iter().enumerate() {
        if *sv > tol {
            let row = v_t.row(i);
            projector -= row.transpose() * row;
        }
    }
    projector * step
}
