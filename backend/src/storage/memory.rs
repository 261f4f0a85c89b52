//! In-process document store.
//!
//! Nothing is persisted; the connection is what tests and embedded hosts use
//! when the data does not need to outlive the process.

use std::sync::Arc;

use super::documents::{
    DocumentHistoryRepository, DocumentProfileRepository, DocumentRentalRepository, Documents,
};
use super::traits::Connection;

#[derive(Clone)]
pub struct MemoryConnection {
    documents: Arc<Documents>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(Documents::new(None)),
        }
    }

    /// Make every subsequent write fail until switched back off
    pub fn set_fail_writes(&self, fail: bool) {
        self.documents.set_fail_writes(fail);
    }

    /// Make every subsequent read (including subscription pushes) fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.documents.set_fail_reads(fail);
    }

    pub fn revision(&self) -> u64 {
        self.documents.revision()
    }
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection for MemoryConnection {
    type RentalRepository = DocumentRentalRepository;
    type HistoryRepository = DocumentHistoryRepository;
    type ProfileRepository = DocumentProfileRepository;

    fn create_rental_repository(&self) -> Self::RentalRepository {
        DocumentRentalRepository::new(self.documents.clone())
    }

    fn create_history_repository(&self) -> Self::HistoryRepository {
        DocumentHistoryRepository::new(self.documents.clone())
    }

    fn create_profile_repository(&self) -> Self::ProfileRepository {
        DocumentProfileRepository::new(self.documents.clone())
    }
}
