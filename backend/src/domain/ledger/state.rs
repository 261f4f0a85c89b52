//! State held by the ledger: the active day bucket, the phase machine and
//! the snapshot published to observers.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::{Identity, Transaction, TransactionPatch};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

use crate::domain::calendar;

/// Signed-in identity the ledger is scoped to
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub identity: Identity,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            started_at: Utc::now(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.identity.uid
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerPhase {
    Unauthenticated,
    /// Subscribed, waiting for the first push
    Loading { date: NaiveDate },
    Ready { date: NaiveDate },
    /// The subscription ended with an error; the bucket was cleared
    Failed { date: NaiveDate, message: String },
}

/// Rentals of one local day with their paid revenue.
///
/// `total_revenue` is kept equal to the sum of paid amounts: every mutation
/// adjusts it by the change it makes, and a full replace recomputes it.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket {
    date: NaiveDate,
    window: (DateTime<Utc>, DateTime<Utc>),
    transactions: Vec<Transaction>,
    total_revenue: Decimal,
}

impl DayBucket {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            window: calendar::day_window(date),
            transactions: Vec::new(),
            total_revenue: Decimal::ZERO,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn total_revenue(&self) -> Decimal {
        self.total_revenue
    }

    pub fn get(&self, id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.id == id)
    }

    /// Whether `instant` falls inside this bucket's day
    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        let (start, end) = self.window;
        instant >= start && instant < end
    }

    /// Add a rental unless one with the same id is already present
    pub fn insert(&mut self, transaction: Transaction) -> bool {
        if self.get(&transaction.id).is_some() {
            return false;
        }
        self.total_revenue += transaction.paid_amount();
        self.transactions.push(transaction);
        true
    }

    /// Patch a rental in place, returning the patched record
    pub fn apply_patch(
        &mut self,
        id: &str,
        patch: &TransactionPatch,
        updated_at: DateTime<Utc>,
    ) -> Option<Transaction> {
        let transaction = self.transactions.iter_mut().find(|t| t.id == id)?;
        let before = transaction.paid_amount();
        transaction.apply_patch(patch, updated_at);
        let after = transaction.paid_amount();
        let patched = transaction.clone();
        self.total_revenue += after - before;
        Some(patched)
    }

    pub fn remove(&mut self, id: &str) -> Option<Transaction> {
        let index = self.transactions.iter().position(|t| t.id == id)?;
        let removed = self.transactions.remove(index);
        self.total_revenue -= removed.paid_amount();
        Some(removed)
    }

    /// Replace the whole set, as delivered by a subscription push
    pub fn replace(&mut self, transactions: Vec<Transaction>) {
        self.transactions = transactions;
        self.total_revenue = self.recomputed_revenue();
    }

    pub fn recomputed_revenue(&self) -> Decimal {
        self.transactions.iter().map(Transaction::paid_amount).sum()
    }
}

/// What observers of the ledger see
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSnapshot {
    pub phase: LedgerPhase,
    pub user_id: Option<String>,
    pub selected_date: Option<NaiveDate>,
    pub transactions: Vec<Transaction>,
    pub total_revenue: Decimal,
    /// Local days that have at least one rental, ascending
    pub known_dates: Vec<NaiveDate>,
    pub last_error: Option<String>,
}

impl Default for LedgerSnapshot {
    fn default() -> Self {
        Self {
            phase: LedgerPhase::Unauthenticated,
            user_id: None,
            selected_date: None,
            transactions: Vec::new(),
            total_revenue: Decimal::ZERO,
            known_dates: Vec::new(),
            last_error: None,
        }
    }
}

/// Mutable ledger state; lives behind the ledger's mutex
#[derive(Debug)]
pub(crate) struct LedgerState {
    pub session: Option<Session>,
    pub phase: LedgerPhase,
    pub bucket: Option<DayBucket>,
    pub known_dates: BTreeSet<NaiveDate>,
    /// Bumped on every day (re)subscription; pushes tagged with an older
    /// value are dropped
    pub generation: u64,
    /// Bumped on every sign-in and sign-out
    pub epoch: u64,
    pub last_error: Option<String>,
    pub day_subscription: Option<CancellationToken>,
    pub dates_subscription: Option<CancellationToken>,
    pub rollover: Option<CancellationToken>,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            session: None,
            phase: LedgerPhase::Unauthenticated,
            bucket: None,
            known_dates: BTreeSet::new(),
            generation: 0,
            epoch: 0,
            last_error: None,
            day_subscription: None,
            dates_subscription: None,
            rollover: None,
        }
    }
}

impl LedgerState {
    pub fn uid(&self) -> Option<&str> {
        self.session.as_ref().map(Session::uid)
    }

    pub fn selected_date(&self) -> Option<NaiveDate> {
        self.bucket.as_ref().map(DayBucket::date)
    }

    /// Cancel every running task and forget the session. Counters keep
    /// increasing so tasks from the old session can tell they are stale.
    pub fn reset(&mut self) {
        for token in [
            self.day_subscription.take(),
            self.dates_subscription.take(),
            self.rollover.take(),
        ]
        .into_iter()
        .flatten()
        {
            token.cancel();
        }
        self.session = None;
        self.phase = LedgerPhase::Unauthenticated;
        self.bucket = None;
        self.known_dates.clear();
        self.last_error = None;
        self.generation += 1;
        self.epoch += 1;
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            phase: self.phase.clone(),
            user_id: self.uid().map(str::to_string),
            selected_date: self.selected_date(),
            transactions: self
                .bucket
                .as_ref()
                .map(|bucket| bucket.transactions().to_vec())
                .unwrap_or_default(),
            total_revenue: self
                .bucket
                .as_ref()
                .map(DayBucket::total_revenue)
                .unwrap_or(Decimal::ZERO),
            known_dates: self.known_dates.iter().copied().collect(),
            last_error: self.last_error.clone(),
        }
    }
}
