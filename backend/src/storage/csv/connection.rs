use anyhow::Result;
use log::info;
use std::path::Path;
use std::sync::Arc;

use super::files::CsvFiles;
use crate::storage::documents::{
    DocumentHistoryRepository, DocumentProfileRepository, DocumentRentalRepository, Documents,
};
use crate::storage::traits::Connection;

/// CsvConnection keeps the collections in memory and mirrors every change
/// into CSV files under one data directory
#[derive(Clone)]
pub struct CsvConnection {
    files: CsvFiles,
    documents: Arc<Documents>,
}

impl CsvConnection {
    /// Open (or initialize) the data directory and load its contents
    pub fn open<P: AsRef<Path>>(base_directory: P) -> Result<Self> {
        let files = CsvFiles::new(base_directory.as_ref());
        files.ensure_layout()?;

        let rentals = files.load_rentals()?;
        let history = files.load_history()?;
        let profiles = files.load_profiles()?;
        info!(
            "Opened data directory {:?}: {} rentals, {} archives, {} profiles",
            files.base_directory(),
            rentals.len(),
            history.len(),
            profiles.len()
        );

        let documents = Documents::with_contents(
            rentals,
            history,
            profiles,
            Some(Box::new(files.clone())),
        );
        Ok(Self {
            files,
            documents: Arc::new(documents),
        })
    }

    pub fn base_directory(&self) -> &Path {
        self.files.base_directory()
    }
}

impl Connection for CsvConnection {
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
