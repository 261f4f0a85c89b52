//! Error taxonomy surfaced by the ledger and its services.

use thiserror::Error;

use super::validation::ValidationError;
use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("Storage operation failed: {0:#}")]
    Persistence(#[source] anyhow::Error),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("No signed-in session")]
    NotAuthenticated,
}

impl LedgerError {
    pub fn persistence(error: anyhow::Error) -> Self {
        LedgerError::Persistence(error)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound(_))
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let error = LedgerError::persistence(anyhow::anyhow!("disk full"));
        assert_eq!(error.to_string(), "Storage operation failed: disk full");

        let error: LedgerError = ValidationError::EmptyName.into();
        assert!(matches!(error, LedgerError::Validation(ValidationError::EmptyName)));

        assert!(LedgerError::NotFound("r-1".to_string()).is_not_found());
    }
}
