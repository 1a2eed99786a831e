use serde::{Deserialize, Serialize};

/// Iterative algorithm requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Algorithm {
    #[default]
    DogLeg,
    LevenbergMarquardt,
    Bfgs,
}

/// Algorithm that actually ran. Differs from the requested [`Algorithm`]
/// only when temporary constraints force the SQP path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SolveMethod {
    DogLeg,
    LevenbergMarquardt,
    Bfgs,
    Sqp,
}

impl From<Algorithm> for SolveMethod {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::DogLeg => SolveMethod::DogLeg,
            Algorithm::LevenbergMarquardt => SolveMethod::LevenbergMarquardt,
            Algorithm::Bfgs => SolveMethod::Bfgs,
        }
    }
}

/// Verbosity of the solve trace emitted through `tracing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DebugMode {
    #[default]
    Off,
    Minimal,
    PerIteration,
}

/// Configuration shared by all algorithms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub max_iterations: usize,
    /// Residual 2-norm below which the system counts as converged.
    pub convergence: f64,
    pub debug: DebugMode,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            convergence: 1e-10,
            debug: DebugMode::Off,
        }
    }
}

impl SolverConfig {
    pub(crate) fn per_iteration(&self) -> bool {
        self.debug == DebugMode::PerIteration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SolverConfig::default();
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.convergence, 1e-10);
        assert_eq!(config.debug, DebugMode::Off);
    }

    #[test]
    fn algorithm_deserializes_from_tagged_form() {
        let alg: Algorithm = serde_json::from_str(r#"{"type":"LevenbergMarquardt"}"#).unwrap();
        assert_eq!(alg, Algorithm::LevenbergMarquardt);
    }

    #[test]
    fn unknown_algorithm_tag_is_rejected() {
        let result: Result<Algorithm, _> = serde_json::from_str(r#"{"type":"Simplex"}"#);
        assert!(result.is_err());
    }
}
