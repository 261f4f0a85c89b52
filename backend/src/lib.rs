//! # Rental Ledger Backend
//!
//! Daily rental ledger with a live view of one day's rentals, a running
//! revenue total and an end-of-day history archive written at midnight.
//!
//! - `domain`: the ledger, rollover, history and account services
//! - `storage`: repository traits plus in-memory and CSV document stores
//! - `auth`: the auth provider interface and an in-process provider
//! - `config` / `logging`: runtime settings and log output

use anyhow::{Context, Result};
use log::{debug, info};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub mod auth;
pub mod config;
pub mod domain;
pub mod logging;
pub mod storage;

use auth::{AuthService, MemoryAuthService};
use config::LedgerConfig;
use domain::{AccountService, DailyLedger, HistoryService};
pub use storage::csv::CsvConnection;

/// All services wired onto one CSV data directory
pub struct Backend {
    pub config: LedgerConfig,
    pub connection: CsvConnection,
    pub auth: Arc<MemoryAuthService>,
    pub ledger: DailyLedger<CsvConnection>,
    pub history_service: HistoryService<CsvConnection>,
    pub account_service: AccountService<MemoryAuthService, CsvConnection>,
    identity_follower: JoinHandle<()>,
}

impl Backend {
    /// Open the data directory and start the ledger following sign-ins.
    /// Installs log output at `config.log_level` unless the host already
    /// set up a subscriber.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: LedgerConfig) -> Result<Self> {
        if let Err(e) = logging::init_logging(&config.log_level) {
            debug!("Keeping existing log subscriber: {:#}", e);
        }

        let connection = CsvConnection::open(&config.data_directory).with_context(|| {
            format!("Failed to open data directory {:?}", config.data_directory)
        })?;

        let auth = Arc::new(MemoryAuthService::new(config.auth.clone()));
        let ledger = DailyLedger::new(&connection, &config);
        let history_service = HistoryService::new(&connection);
        let account_service = AccountService::new(Arc::clone(&auth), &connection, &config);
        let identity_follower = ledger.follow_identity(auth.on_identity_change());

        info!("Backend ready on {:?}", connection.base_directory());
        Ok(Self {
            config,
            connection,
            auth,
            ledger,
            history_service,
            account_service,
            identity_follower,
        })
    }

    /// Stop following identity changes and end any running session
    pub fn shutdown(&self) {
        self.identity_follower.abort();
        self.ledger.teardown();
        info!("Backend shut down");
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.identity_follower.abort();
        self.ledger.teardown();
    }
}
