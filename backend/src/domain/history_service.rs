//! Read access to a user's day archives.

use log::{debug, info};
use shared::{HistoryRecord, HistorySummary};

use super::error::{LedgerError, LedgerResult};
use super::ledger::Session;
use crate::storage::{Connection, HistoryStorage};

pub struct HistoryService<C: Connection> {
    history: C::HistoryRepository,
}

impl<C: Connection> Clone for HistoryService<C> {
    fn clone(&self) -> Self {
        Self {
            history: self.history.clone(),
        }
    }
}

impl<C: Connection> HistoryService<C> {
    pub fn new(connection: &C) -> Self {
        Self {
            history: connection.create_history_repository(),
        }
    }

    /// Archives of the session's user, newest day first
    pub async fn list_history(&self, session: &Session) -> LedgerResult<Vec<HistorySummary>> {
        let records = self
            .history
            .list_history(session.uid())
            .await
            .map_err(LedgerError::persistence)?;
        info!("Found {} archived day(s) for {}", records.len(), session.uid());
        Ok(records.iter().map(HistorySummary::from).collect())
    }

    /// One archive with its rentals. Archives of other users are reported
    /// as missing.
    pub async fn get_history(&self, session: &Session, history_id: &str) -> LedgerResult<HistoryRecord> {
        let record = self
            .history
            .get_history(history_id)
            .await
            .map_err(LedgerError::persistence)?;
        match record {
            Some(record) if record.user_id == session.uid() => Ok(record),
            Some(_) => {
                debug!("History {} belongs to another user", history_id);
                Err(LedgerError::NotFound(history_id.to_string()))
            }
            None => Err(LedgerError::NotFound(history_id.to_string())),
        }
    }
}
