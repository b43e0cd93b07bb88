use thiserror::Error;

/// Errors raised while configuring or running an optimizer
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EsError {
    /// An optimizer setting is out of range
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Name of the offending setting
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// The environment produced a reward which can't be used for an update
    #[error("environment returned a non-finite reward at pass {0}")]
    NonFiniteReward(usize),
}

impl EsError {
    pub(crate) fn config<R: Into<String>>(field: &'static str, reason: R) -> Self {
        EsError::InvalidConfig {
            field: field,
            reason: reason.into(),
        }
    }
}

/// Result type for optimizer operations
pub type Result<T> = std::result::Result<T, EsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EsError::config("sigma", "must be non-zero");
        assert_eq!(
            format!("{}", err),
            "invalid configuration for sigma: must be non-zero"
        );

        let err = EsError::NonFiniteReward(3);
        assert!(format!("{}", err).contains("pass 3"));
    }
}
