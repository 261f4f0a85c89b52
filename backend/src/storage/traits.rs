//! # Storage Traits
//!
//! This module defines the storage abstraction traits that allow different
//! document store backends to be used interchangeably by the ledger.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::BoxStream;
use shared::{
    HistoryRecord, NewHistoryRecord, NewTransaction, NewUserProfile, ProfilePatch, Transaction,
    TransactionPatch, UserProfile,
};

/// Stream of full result sets pushed by a rental subscription.
///
/// Each item replaces the previous one; an `Err` item ends the subscription.
pub type SnapshotStream = BoxStream<'static, Result<Vec<Transaction>>>;

/// Filter over the rentals collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalFilter {
    pub user_id: String,
    /// Inclusive lower bound on `created_at`
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`
    pub created_before: Option<DateTime<Utc>>,
}

impl RentalFilter {
    /// Every rental owned by `user_id`
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            created_from: None,
            created_before: None,
        }
    }

    /// Rentals owned by `user_id` created inside `[from, before)`
    pub fn for_window(
        user_id: impl Into<String>,
        from: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            created_from: Some(from),
            created_before: Some(before),
        }
    }

    pub fn matches(&self, transaction: &Transaction) -> bool {
        transaction.user_id == self.user_id
            && self
                .created_from
                .map_or(true, |from| transaction.created_at >= from)
            && self
                .created_before
                .map_or(true, |before| transaction.created_at < before)
    }
}

/// Trait defining the interface for rental storage operations
#[async_trait]
pub trait RentalStorage: Send + Sync {
    /// Store a new rental, returning the id the store assigned
    async fn store_rental(&self, rental: &NewTransaction) -> Result<String>;

    /// Apply a partial update to an existing rental
    async fn update_rental(
        &self,
        rental_id: &str,
        patch: &TransactionPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Delete a rental. Deleting a missing rental is an error.
    async fn delete_rental(&self, rental_id: &str) -> Result<()>;

    /// One-shot query, ordered by `created_at` ascending
    async fn query_rentals(&self, filter: &RentalFilter) -> Result<Vec<Transaction>>;

    /// Live query: yields the current result set immediately and again
    /// after every change to the collection
    fn subscribe_rentals(&self, filter: RentalFilter) -> SnapshotStream;
}

/// Trait defining the interface for history archive operations
#[async_trait]
pub trait HistoryStorage: Send + Sync {
    /// Find the archive of `date` for `user_id`, if one was written
    async fn find_history(&self, user_id: &str, date: NaiveDate) -> Result<Option<HistoryRecord>>;

    /// Store a new archive, returning its id
    async fn store_history(&self, record: &NewHistoryRecord) -> Result<String>;

    /// List all archives for a user, newest date first
    async fn list_history(&self, user_id: &str) -> Result<Vec<HistoryRecord>>;

    /// Retrieve a specific archive by id
    async fn get_history(&self, history_id: &str) -> Result<Option<HistoryRecord>>;
}

/// Trait defining the interface for user profile operations
#[async_trait]
pub trait ProfileStorage: Send + Sync {
    async fn store_profile(&self, profile: &NewUserProfile) -> Result<String>;

    async fn find_profile_by_uid(&self, uid: &str) -> Result<Option<UserProfile>>;

    /// First profile (in insertion order) whose `name` equals `name`
    async fn find_first_profile_by_name(&self, name: &str) -> Result<Option<UserProfile>>;

    async fn update_profile(&self, profile_id: &str, patch: &ProfilePatch) -> Result<()>;

    async fn delete_profile(&self, profile_id: &str) -> Result<()>;
}

/// Trait defining the interface for storage connections
///
/// This trait abstracts away the specific backend (in-memory, CSV files, ...)
/// and provides factory methods for creating repositories.
pub trait Connection: Send + Sync + Clone + 'static {
    type RentalRepository: RentalStorage + Clone + 'static;
    type HistoryRepository: HistoryStorage + Clone + 'static;
    type ProfileRepository: ProfileStorage + Clone + 'static;

    fn create_rental_repository(&self) -> Self::RentalRepository;

    fn create_history_repository(&self) -> Self::HistoryRepository;

    fn create_profile_repository(&self) -> Self::ProfileRepository;
}
