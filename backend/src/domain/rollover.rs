//! Midnight rollover.
//!
//! [`DayArchiver`] writes the end-of-day [`HistoryRecord`] for one user and
//! one day, at most once. [`RolloverScheduler`] drives it: on start it can
//! archive the previous day (covering a restart across midnight), then it
//! sleeps until the next local midnight, archives the day that just ended,
//! and re-arms for the following midnight.

use chrono::{Local, NaiveDate, Utc};
use log::{debug, error, info};
use rust_decimal::Decimal;
use shared::{HistoryRecord, NewHistoryRecord, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::calendar;
use super::error::{LedgerError, LedgerResult};
use crate::storage::{Connection, HistoryStorage, RentalFilter, RentalStorage};

#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveOutcome {
    Archived(HistoryRecord),
    /// A record for this user and day already exists
    AlreadyArchived,
    /// The day had no rentals, nothing was written
    NothingToArchive,
}

/// Writes day archives with a check-then-write under a process-local guard
pub struct DayArchiver<C: Connection> {
    rentals: C::RentalRepository,
    history: C::HistoryRepository,
    guard: Arc<Mutex<()>>,
}

impl<C: Connection> Clone for DayArchiver<C> {
    fn clone(&self) -> Self {
        Self {
            rentals: self.rentals.clone(),
            history: self.history.clone(),
            guard: Arc::clone(&self.guard),
        }
    }
}

impl<C: Connection> DayArchiver<C> {
    pub fn new(connection: &C) -> Self {
        Self {
            rentals: connection.create_rental_repository(),
            history: connection.create_history_repository(),
            guard: Arc::new(Mutex::new(())),
        }
    }

    /// Archive `date` for `user_id`.
    ///
    /// The total is computed from the queried rentals, not from any
    /// in-memory bucket.
    pub async fn archive_day(&self, user_id: &str, date: NaiveDate) -> LedgerResult<ArchiveOutcome> {
        let _guard = self.guard.lock().await;

        if self
            .history
            .find_history(user_id, date)
            .await
            .map_err(LedgerError::persistence)?
            .is_some()
        {
            debug!("History for {} on {} already exists", user_id, date);
            return Ok(ArchiveOutcome::AlreadyArchived);
        }

        let (from, before) = calendar::day_window(date);
        let transactions = self
            .rentals
            .query_rentals(&RentalFilter::for_window(user_id, from, before))
            .await
            .map_err(LedgerError::persistence)?;
        if transactions.is_empty() {
            debug!("No rentals for {} on {}, skipping archive", user_id, date);
            return Ok(ArchiveOutcome::NothingToArchive);
        }

        let total_revenue: Decimal = transactions.iter().map(Transaction::paid_amount).sum();
        let record = NewHistoryRecord {
            user_id: user_id.to_string(),
            date,
            total_revenue,
            transactions,
            created_at: Utc::now(),
        };
        let id = self
            .history
            .store_history(&record)
            .await
            .map_err(LedgerError::persistence)?;

        info!(
            "Archived {} rental(s) for {} on {} (revenue {})",
            record.transactions.len(),
            user_id,
            date,
            total_revenue
        );
        Ok(ArchiveOutcome::Archived(record.with_id(id)))
    }
}

/// Called after each midnight with `(finished_day, new_day)`
pub type DayChangeHook = Box<dyn Fn(NaiveDate, NaiveDate) + Send + Sync>;

pub struct RolloverScheduler<C: Connection> {
    archiver: DayArchiver<C>,
    user_id: String,
    catch_up_on_start: bool,
    shutdown: CancellationToken,
    on_day_change: Option<DayChangeHook>,
}

impl<C: Connection> RolloverScheduler<C> {
    pub fn new(
        archiver: DayArchiver<C>,
        user_id: impl Into<String>,
        catch_up_on_start: bool,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            archiver,
            user_id: user_id.into(),
            catch_up_on_start,
            shutdown,
            on_day_change: None,
        }
    }

    pub fn with_day_change(mut self, hook: DayChangeHook) -> Self {
        self.on_day_change = Some(hook);
        self
    }

    /// Catch up, then fire once per local midnight until shut down
    pub async fn run(self) {
        info!("Rollover scheduler started for {}", self.user_id);

        if self.catch_up_on_start {
            if let Some(yesterday) = calendar::today().pred_opt() {
                self.archive(yesterday).await;
            }
        }

        let mut day = calendar::today();
        while let Some(next_day) = day.succ_opt() {
            let wait = calendar::duration_until(calendar::local_midnight(next_day), Local::now());
            debug!(
                "Next rollover for {} in {} minutes",
                self.user_id,
                wait.as_secs() / 60
            );

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.shutdown.cancelled() => break,
            }

            self.archive(day).await;
            if let Some(hook) = &self.on_day_change {
                hook(day, next_day);
            }
            day = next_day;
        }

        info!("Rollover scheduler stopped for {}", self.user_id);
    }

    async fn archive(&self, date: NaiveDate) {
        if self.shutdown.is_cancelled() {
            return;
        }
        if let Err(e) = self.archiver.archive_day(&self.user_id, date).await {
            error!("Failed to archive {} for {}: {}", date, self.user_id, e);
        }
    }
}
