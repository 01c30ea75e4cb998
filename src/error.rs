use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MortgageError {
    #[error("invalid parameter {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, MortgageError>;

impl MortgageError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        MortgageError::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}
