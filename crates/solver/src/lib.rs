//! Iterative nonlinear least-squares algorithms for the planar constraint core.
//!
//! Everything here operates on a [`ResidualSystem`]: an oracle that maps a
//! free-variable vector to a residual vector (and, optionally, an analytic
//! Jacobian). The algorithms know nothing about geometry or constraints.

pub mod bfgs;
pub mod config;
pub mod dogleg;
pub mod lm;
pub mod sqp;
pub mod system;

pub use config::{Algorithm, DebugMode, SolveMethod, SolverConfig};
pub use system::{ResidualSystem, SolveOutcome};
