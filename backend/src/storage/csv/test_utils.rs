//! Test utilities providing a throwaway data directory per test.
//!
//! The directory is removed when the `TestEnvironment` is dropped, even if
//! the test panics.

use anyhow::Result;
use std::path::PathBuf;
use tempfile::TempDir;

use super::connection::CsvConnection;

pub struct TestEnvironment {
    /// Kept alive so the directory outlives the connection
    _temp_dir: TempDir,
    pub connection: CsvConnection,
    pub base_path: PathBuf,
}

impl TestEnvironment {
    pub async fn new() -> Result<Self> {
        Self::from_temp_dir(TempDir::new()?)
    }

    /// Same as `new`, with a recognizable directory name for debugging
    pub async fn new_with_prefix(prefix: &str) -> Result<Self> {
        Self::from_temp_dir(TempDir::with_prefix(prefix)?)
    }

    fn from_temp_dir(temp_dir: TempDir) -> Result<Self> {
        let base_path = temp_dir.path().to_path_buf();
        let connection = CsvConnection::open(&base_path)?;
        Ok(Self {
            _temp_dir: temp_dir,
            connection,
            base_path,
        })
    }

    /// Open a second connection on the same directory, as a restart would
    pub fn reopen(&self) -> Result<CsvConnection> {
        CsvConnection::open(&self.base_path)
    }

    pub fn base_directory(&self) -> &std::path::Path {
        &self.base_path
    }
}

impl Drop for TestEnvironment {
    fn drop(&mut self) {
        if std::env::var("RENTAL_LEDGER_DEBUG_TESTS").is_ok() {
            println!("Cleaning up test environment: {:?}", self.base_path);
        }
    }
}
