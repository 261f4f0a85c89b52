use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use shared::{
    HistoryRecord, NewHistoryRecord, NewTransaction, NewUserProfile, ProfilePatch, Transaction,
    TransactionPatch, UserProfile,
};
use std::sync::Arc;
use uuid::Uuid;

use super::Documents;
use crate::storage::traits::{
    HistoryStorage, ProfileStorage, RentalFilter, RentalStorage, SnapshotStream,
};

fn new_document_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Rental repository over the shared document collections
#[derive(Clone)]
pub struct DocumentRentalRepository {
    documents: Arc<Documents>,
}

impl DocumentRentalRepository {
    pub fn new(documents: Arc<Documents>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl RentalStorage for DocumentRentalRepository {
    async fn store_rental(&self, rental: &NewTransaction) -> Result<String> {
        let id = new_document_id();
        let stored = rental.clone().with_id(id.clone());
        self.documents.mutate_rentals(|rentals| {
            rentals.push(stored);
            Ok(())
        })?;
        info!("Stored rental {} for user {}", id, rental.user_id);
        Ok(id)
    }

    async fn update_rental(
        &self,
        rental_id: &str,
        patch: &TransactionPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.documents.mutate_rentals(|rentals| {
            let rental = rentals
                .iter_mut()
                .find(|rental| rental.id == rental_id)
                .ok_or_else(|| anyhow!("Rental {} does not exist", rental_id))?;
            rental.apply_patch(patch, updated_at);
            Ok(())
        })
    }

    async fn delete_rental(&self, rental_id: &str) -> Result<()> {
        self.documents.mutate_rentals(|rentals| {
            let before = rentals.len();
            rentals.retain(|rental| rental.id != rental_id);
            if rentals.len() == before {
                return Err(anyhow!("Rental {} does not exist", rental_id));
            }
            Ok(())
        })
    }

    async fn query_rentals(&self, filter: &RentalFilter) -> Result<Vec<Transaction>> {
        self.documents.rentals_matching(filter)
    }

    fn subscribe_rentals(&self, filter: RentalFilter) -> SnapshotStream {
        self.documents.subscribe_rentals(filter)
    }
}

/// History repository over the shared document collections
#[derive(Clone)]
pub struct DocumentHistoryRepository {
    documents: Arc<Documents>,
}

impl DocumentHistoryRepository {
    pub fn new(documents: Arc<Documents>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl HistoryStorage for DocumentHistoryRepository {
    async fn find_history(&self, user_id: &str, date: NaiveDate) -> Result<Option<HistoryRecord>> {
        self.documents.read_history(|history| {
            history
                .iter()
                .find(|record| record.user_id == user_id && record.date == date)
                .cloned()
        })
    }

    async fn store_history(&self, record: &NewHistoryRecord) -> Result<String> {
        let id = new_document_id();
        self.documents
            .append_history(record.clone().with_id(id.clone()))?;
        info!(
            "Archived {} rentals for user {} on {}",
            record.transactions.len(),
            record.user_id,
            record.date
        );
        Ok(id)
    }

    async fn list_history(&self, user_id: &str) -> Result<Vec<HistoryRecord>> {
        let mut records = self.documents.read_history(|history| {
            history
                .iter()
                .filter(|record| record.user_id == user_id)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        records.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(records)
    }

    async fn get_history(&self, history_id: &str) -> Result<Option<HistoryRecord>> {
        self.documents.read_history(|history| {
            history
                .iter()
                .find(|record| record.id == history_id)
                .cloned()
        })
    }
}

/// Profile repository over the shared document collections
#[derive(Clone)]
pub struct DocumentProfileRepository {
    documents: Arc<Documents>,
}

impl DocumentProfileRepository {
    pub fn new(documents: Arc<Documents>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl ProfileStorage for DocumentProfileRepository {
    async fn store_profile(&self, profile: &NewUserProfile) -> Result<String> {
        let id = new_document_id();
        let stored = profile.clone().with_id(id.clone());
        self.documents.mutate_profiles(|profiles| {
            profiles.push(stored);
            Ok(())
        })?;
        Ok(id)
    }

    async fn find_profile_by_uid(&self, uid: &str) -> Result<Option<UserProfile>> {
        self.documents
            .read_profiles(|profiles| profiles.iter().find(|profile| profile.uid == uid).cloned())
    }

    async fn find_first_profile_by_name(&self, name: &str) -> Result<Option<UserProfile>> {
        self.documents.read_profiles(|profiles| {
            profiles
                .iter()
                .find(|profile| profile.name.as_deref() == Some(name))
                .cloned()
        })
    }

    async fn update_profile(&self, profile_id: &str, patch: &ProfilePatch) -> Result<()> {
        self.documents.mutate_profiles(|profiles| {
            let profile = profiles
                .iter_mut()
                .find(|profile| profile.id == profile_id)
                .ok_or_else(|| anyhow!("Profile {} does not exist", profile_id))?;
            if let Some(name) = &patch.name {
                profile.name = Some(name.clone());
            }
            if let Some(phone_number) = &patch.phone_number {
                profile.phone_number = Some(phone_number.clone());
            }
            Ok(())
        })
    }

    async fn delete_profile(&self, profile_id: &str) -> Result<()> {
        self.documents.mutate_profiles(|profiles| {
            let before = profiles.len();
            profiles.retain(|profile| profile.id != profile_id);
            if profiles.len() == before {
                return Err(anyhow!("Profile {} does not exist", profile_id));
            }
            Ok(())
        })
    }
}
