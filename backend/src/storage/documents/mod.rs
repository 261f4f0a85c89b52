//! # Document Collections
//!
//! In-process document collections shared by every storage backend. The
//! collections live in memory; a backend may attach a [`DocumentSink`] that
//! receives the full collection after each change and must accept it before
//! the change becomes visible.
//!
//! Every committed change to the rentals collection bumps a revision counter
//! published on a `watch` channel, which is what drives live subscriptions.

pub mod repositories;

use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt};
use log::debug;
use shared::{HistoryRecord, Transaction, UserProfile};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;

use super::traits::{RentalFilter, SnapshotStream};

pub use repositories::{DocumentHistoryRepository, DocumentProfileRepository, DocumentRentalRepository};

/// Receives collection contents after a change, before it is committed
pub trait DocumentSink: Send + Sync {
    fn write_rentals(&self, rentals: &[Transaction]) -> Result<()>;

    /// `added` is the record that was just appended to `history`
    fn write_history(&self, history: &[HistoryRecord], added: &HistoryRecord) -> Result<()>;

    fn write_profiles(&self, profiles: &[UserProfile]) -> Result<()>;
}

/// Switches that make operations fail, for exercising error paths
#[derive(Default)]
struct Faults {
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

pub struct Documents {
    rentals: RwLock<Vec<Transaction>>,
    history: RwLock<Vec<HistoryRecord>>,
    profiles: RwLock<Vec<UserProfile>>,
    revision: watch::Sender<u64>,
    faults: Faults,
    sink: Option<Box<dyn DocumentSink>>,
}

impl Documents {
    pub fn new(sink: Option<Box<dyn DocumentSink>>) -> Self {
        Self::with_contents(Vec::new(), Vec::new(), Vec::new(), sink)
    }

    pub fn with_contents(
        rentals: Vec<Transaction>,
        history: Vec<HistoryRecord>,
        profiles: Vec<UserProfile>,
        sink: Option<Box<dyn DocumentSink>>,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            rentals: RwLock::new(rentals),
            history: RwLock::new(history),
            profiles: RwLock::new(profiles),
            revision,
            faults: Faults::default(),
            sink,
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.faults.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.faults.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("document store rejected the write"));
        }
        Ok(())
    }

    fn check_readable(&self) -> Result<()> {
        if self.faults.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("document store is unavailable for reads"));
        }
        Ok(())
    }

    /// Current revision of the rentals collection
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn rentals_matching(&self, filter: &RentalFilter) -> Result<Vec<Transaction>> {
        self.check_readable()?;
        let rentals = self.rentals.read().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<Transaction> = rentals
            .iter()
            .filter(|rental| filter.matches(rental))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }

    pub fn read_history<R>(&self, read: impl FnOnce(&[HistoryRecord]) -> R) -> Result<R> {
        self.check_readable()?;
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        Ok(read(&history))
    }

    pub fn read_profiles<R>(&self, read: impl FnOnce(&[UserProfile]) -> R) -> Result<R> {
        self.check_readable()?;
        let profiles = self.profiles.read().unwrap_or_else(PoisonError::into_inner);
        Ok(read(&profiles))
    }

    /// Apply `change` to a draft of the rentals collection and commit it once
    /// the sink accepted the result. Subscribers are notified on commit.
    pub fn mutate_rentals<R>(
        &self,
        change: impl FnOnce(&mut Vec<Transaction>) -> Result<R>,
    ) -> Result<R> {
        self.check_writable()?;
        let result = {
            let mut rentals = self.rentals.write().unwrap_or_else(PoisonError::into_inner);
            let mut draft = rentals.clone();
            let result = change(&mut draft)?;
            if let Some(sink) = &self.sink {
                sink.write_rentals(&draft)?;
            }
            *rentals = draft;
            result
        };
        self.revision.send_modify(|revision| *revision += 1);
        debug!("Rentals collection now at revision {}", self.revision());
        Ok(result)
    }

    pub fn append_history(&self, record: HistoryRecord) -> Result<()> {
        self.check_writable()?;
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        let mut draft = history.clone();
        draft.push(record);
        if let (Some(sink), Some(added)) = (&self.sink, draft.last()) {
            sink.write_history(&draft, added)?;
        }
        *history = draft;
        Ok(())
    }

    pub fn mutate_profiles<R>(
        &self,
        change: impl FnOnce(&mut Vec<UserProfile>) -> Result<R>,
    ) -> Result<R> {
        self.check_writable()?;
        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        let mut draft = profiles.clone();
        let result = change(&mut draft)?;
        if let Some(sink) = &self.sink {
            sink.write_profiles(&draft)?;
        }
        *profiles = draft;
        Ok(result)
    }

    /// Live query over the rentals collection.
    ///
    /// Yields the matching set immediately, then again after every committed
    /// change. A read failure is yielded once and ends the stream.
    pub fn subscribe_rentals(self: &Arc<Self>, filter: RentalFilter) -> SnapshotStream {
        let receiver = self.revision.subscribe();
        let documents = Arc::clone(self);
        stream::unfold(
            (documents, receiver, filter, true, false),
            |(documents, mut receiver, filter, first, done)| async move {
                if done {
                    return None;
                }
                if !first {
                    receiver.changed().await.ok()?;
                }
                receiver.borrow_and_update();
                let snapshot = documents.rentals_matching(&filter);
                let failed = snapshot.is_err();
                Some((snapshot, (documents, receiver, filter, false, failed)))
            },
        )
        .boxed()
    }
}
