//! Stop conditions detected by the adaptation loop.

use std::fmt;

/// A single matched stop criterion, carrying the values that triggered it.
///
/// Conditions are tested disjunctively; every reason that has fired so far is
/// retained by the engine and rendered into the stop message.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationReason {
    /// Best function value of the generation dropped below the target.
    Fitness { value: f64, limit: f64 },
    /// Range of recent and current function values collapsed.
    TolFun { range: f64, limit: f64 },
    /// Range of the best-value history collapsed.
    TolFunHist { range: f64, limit: f64 },
    /// All coordinate-wise standard deviations and path components are tiny.
    TolX { limit: f64 },
    /// Some standard deviation grew far beyond its initial value.
    TolUpX { factor: f64 },
    /// Condition number of the covariance matrix exceeded its cap.
    ConditionNumber {
        max_ew: f64,
        min_ew: f64,
        limit: f64,
    },
    /// A principal axis no longer moves the mean at working precision.
    NoEffectAxis { axis: usize },
    /// A coordinate no longer moves the mean at working precision.
    NoEffectCoordinate { coordinate: usize },
    /// Budget of objective function evaluations exhausted.
    MaxFunEvals { evals: u64, limit: u64 },
    /// Budget of generations exhausted.
    MaxIter { iterations: u64, limit: u64 },
}

impl TerminationReason {
    /// Short stable identifier, usable for matching in logs and tests.
    pub fn label(&self) -> &'static str {
        match self {
            TerminationReason::Fitness { .. } => "Fitness",
            TerminationReason::TolFun { .. } => "TolFun",
            TerminationReason::TolFunHist { .. } => "TolFunHist",
            TerminationReason::TolX { .. } => "TolX",
            TerminationReason::TolUpX { .. } => "TolUpX",
            TerminationReason::ConditionNumber { .. } => "ConditionNumber",
            TerminationReason::NoEffectAxis { .. } => "NoEffectAxis",
            TerminationReason::NoEffectCoordinate { .. } => "NoEffectCoordinate",
            TerminationReason::MaxFunEvals { .. } => "MaxFunEvals",
            TerminationReason::MaxIter { .. } => "MaxIter",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Fitness { value, limit } => {
                write!(f, "Fitness: function value {value:e} <= stopFitness ({limit:e})")
            }
            TerminationReason::TolFun { range, limit } => {
                write!(f, "TolFun: function value differences {range:e} < stopTolFun={limit:e}")
            }
            TerminationReason::TolFunHist { range, limit } => write!(
                f,
                "TolFunHist: history of function value changes {range:e} < stopTolFunHist={limit:e}"
            ),
            TerminationReason::TolX { limit } => {
                write!(f, "TolX: object variable changes below {limit:e}")
            }
            TerminationReason::TolUpX { factor } => write!(
                f,
                "TolUpX: standard deviation increased by more than {factor:e}, \
                 larger initial standard deviation recommended"
            ),
            TerminationReason::ConditionNumber { max_ew, min_ew, limit } => write!(
                f,
                "ConditionNumber: maximal condition number {limit:e} reached, \
                 maxEW={max_ew:e}, minEW={min_ew:e}"
            ),
            TerminationReason::NoEffectAxis { axis } => {
                write!(f, "NoEffectAxis: mutation in principal axis {axis} has no effect")
            }
            TerminationReason::NoEffectCoordinate { coordinate } => write!(
                f,
                "NoEffectCoordinate: mutation in coordinate {coordinate} has no effect"
            ),
            TerminationReason::MaxFunEvals { evals, limit } => write!(
                f,
                "MaxFunEvals: conducted function evaluations {evals} >= {limit}"
            ),
            TerminationReason::MaxIter { iterations, limit } => {
                write!(f, "MaxIter: number of iterations {iterations} >= {limit}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_variants() {
        let r = TerminationReason::TolX { limit: 1e-12 };
        assert_eq!(r.label(), "TolX");
        assert!(r.to_string().starts_with("TolX:"));

        let r = TerminationReason::MaxIter { iterations: 100, limit: 100 };
        assert_eq!(r.label(), "MaxIter");
        assert!(r.to_string().contains("100"));
    }
}
