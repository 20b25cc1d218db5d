use hardware::AxisPair;
use thiserror::Error;

use crate::scan::ScanKind;

/// Failure of a single scan, centering move, or the configuration behind
/// them.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("voltmeter unavailable: {0}")]
    InstrumentUnavailable(String),

    #[error("scan did not complete within its {budget_secs:.1} s budget, axes stopped")]
    ScanTimeout { budget_secs: f64 },

    #[error("trace has {got} usable sample(s), at least 2 required")]
    EmptyTrace { got: usize },

    #[error("motion command failed: {0}")]
    MotionCommandFailure(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failure of the magnetic-axis search, with enough context to say which
/// step of which iteration went wrong.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("{kind} scan of the {pair} pair failed in iteration {iteration}: {source}")]
    Step {
        kind: ScanKind,
        pair: AxisPair,
        iteration: u32,
        #[source]
        source: ScanError,
    },

    #[error("failed to read axis positions in iteration {iteration}: {message}")]
    Snapshot { iteration: u32, message: String },

    #[error("invalid search configuration: {source}")]
    Config {
        #[source]
        source: ScanError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_names_the_failing_step() {
        let err = SearchError::Step {
            kind: ScanKind::First,
            pair: AxisPair::X,
            iteration: 2,
            source: ScanError::EmptyTrace { got: 1 },
        };
        assert_eq!(
            err.to_string(),
            "first-integral scan of the X pair failed in iteration 2: \
             trace has 1 usable sample(s), at least 2 required"
        );
    }
}
