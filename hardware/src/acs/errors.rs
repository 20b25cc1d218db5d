use thiserror::Error;

pub type AcsResult<T> = Result<T, AcsError>;

#[derive(Error, Debug)]
pub enum AcsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for controller reply")]
    Timeout,

    #[error("controller error {code}: {}", error_description(*code))]
    Controller { code: i32 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Human-readable text for the controller error codes the bench actually
/// runs into. Anything else reports as unrecognized.
pub fn error_description(code: i32) -> &'static str {
    match code {
        1015 => "parameter out of range",
        2009 => "axis is not activated",
        2035 => "motor is disabled",
        3021 => "motion terminated by kill command",
        3062 => "motion terminated by limit switch",
        5001 => "command syntax error",
        _ => "unrecognized controller error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_error_display_includes_description() {
        let err = AcsError::Controller { code: 2035 };
        assert_eq!(err.to_string(), "controller error 2035: motor is disabled");
    }
}
