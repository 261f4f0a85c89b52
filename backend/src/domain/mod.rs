//! Domain layer: the daily ledger, its rollover and the account and history
//! services around it.

pub mod account_service;
pub mod calendar;
pub mod error;
pub mod history_service;
pub mod ledger;
pub mod rollover;
pub mod validation;

pub use account_service::AccountService;
pub use error::{LedgerError, LedgerResult};
pub use history_service::HistoryService;
pub use ledger::{DailyLedger, DayBucket, LedgerPhase, LedgerSnapshot, Session};
pub use rollover::{ArchiveOutcome, DayArchiver, RolloverScheduler};
pub use validation::{TransactionValidator, ValidationError};
