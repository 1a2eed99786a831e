use nalgebra::{DMatrix, DVector};

/// Residual/Jacobian oracle consumed by the iterative algorithms.
///
/// `x` is always the free-variable vector; fixed parameters are the
/// caller's concern and never appear here.
pub trait ResidualSystem {
    /// Number of residual rows this system produces.
    fn residual_count(&self) -> usize;

    /// Evaluate all residuals at `x` into `out` (`out.len() == residual_count()`).
    fn eval(&self, x: &[f64], out: &mut [f64]);

    fn residual_vector(&self, x: &[f64]) -> DVector<f64> {
        let mut out = vec![0.0; self.residual_count()];
        self.eval(x, &mut out);
        DVector::from_vec(out)
    }

    /// Residual 2-norm at `x`.
    fn residual_norm(&self, x: &[f64]) -> f64 {
        self.residual_vector(x).norm()
    }

    /// Central-difference Jacobian. Implementors with analytic derivatives
    /// can override; the step follows the finite-difference scheme the
    /// gradient loop uses.
    fn jacobian(&self, x: &[f64]) -> DMatrix<f64> {
        let m = self.residual_count();
        let n = x.len();
        let mut jac = DMatrix::zeros(m, n);
        let mut probe = x.to_vec();
        let mut plus = vec![0.0; m];
        let mut minus = vec![0.0; m];
        for j in 0..n {
            let orig = probe[j];
            let h = 1e-7 * orig.abs().max(1.0);
            probe[j] = orig + h;
            self.eval(&probe, &mut plus);
            probe[j] = orig - h;
            self.eval(&probe, &mut minus);
            probe[j] = orig;
            for i in 0..m {
                jac[(i, j)] = (plus[i] - minus[i]) / (2.0 * h);
            }
        }
        jac
    }
}

/// Termination report of one algorithm run.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub converged: bool,
    pub iterations: usize,
    /// Residual 2-norm at termination.
    pub residual: f64,
}
