//! Input rules for rentals.
//!
//! - Name must be non-empty after trimming and no longer than the configured
//!   maximum (counted in characters)
//! - Amount must be strictly positive
//! - A rental is billed either by hours (> 0) or by a date range whose end is
//!   not before its start; one of the two must be present
//!
//! Registration asks for a username of at least three characters and a
//! ten-digit phone number.

use rust_decimal::Decimal;
use shared::{AddTransactionRequest, TransactionPatch};
use thiserror::Error;

use crate::config::ValidationConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Name cannot be empty")]
    EmptyName,
    #[error("Name cannot exceed {max} characters")]
    NameTooLong { max: usize },
    #[error("Amount must be greater than zero")]
    AmountNotPositive,
    #[error("Either hours or a date range is required")]
    MissingPeriod,
    #[error("Hours must be greater than zero")]
    HoursNotPositive,
    #[error("Date range cannot end before it starts")]
    InvalidDateRange,
    #[error("Username must be at least {min} characters")]
    UsernameTooShort { min: usize },
    #[error("Phone number must be {digits} digits")]
    InvalidPhone { digits: usize },
}

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const PHONE_DIGITS: usize = 10;

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.trim().chars().count() < MIN_USERNAME_LENGTH {
        return Err(ValidationError::UsernameTooShort {
            min: MIN_USERNAME_LENGTH,
        });
    }
    Ok(())
}

pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let phone = phone.trim();
    if phone.len() != PHONE_DIGITS || !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidPhone {
            digits: PHONE_DIGITS,
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct TransactionValidator {
    max_name_length: usize,
}

impl Default for TransactionValidator {
    fn default() -> Self {
        Self::new(&ValidationConfig::default())
    }
}

impl TransactionValidator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            max_name_length: config.max_name_length,
        }
    }

    pub fn validate_new(&self, request: &AddTransactionRequest) -> Result<(), ValidationError> {
        self.validate_name(&request.name)?;
        Self::validate_amount(request.amount)?;

        if let Some(range) = &request.date_range {
            if !range.is_valid() {
                return Err(ValidationError::InvalidDateRange);
            }
        }
        if let Some(hours) = request.hours {
            if hours <= Decimal::ZERO {
                return Err(ValidationError::HoursNotPositive);
            }
        }
        if request.hours.is_none() && request.date_range.is_none() {
            return Err(ValidationError::MissingPeriod);
        }
        Ok(())
    }

    /// Only the fields present in the patch are checked
    pub fn validate_patch(&self, patch: &TransactionPatch) -> Result<(), ValidationError> {
        if let Some(name) = &patch.name {
            self.validate_name(name)?;
        }
        if let Some(amount) = patch.amount {
            Self::validate_amount(amount)?;
        }
        Ok(())
    }

    fn validate_name(&self, name: &str) -> Result<(), ValidationError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if trimmed.chars().count() > self.max_name_length {
            return Err(ValidationError::NameTooLong {
                max: self.max_name_length,
            });
        }
        Ok(())
    }

    fn validate_amount(amount: Decimal) -> Result<(), ValidationError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::AmountNotPositive);
        }
        Ok(())
    }
}
