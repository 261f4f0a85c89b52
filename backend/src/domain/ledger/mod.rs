//! # Daily Ledger
//!
//! Process-local reactive store for one signed-in user's rentals.
//!
//! The ledger keeps a single [`DayBucket`] bound to the selected local day,
//! fed by a live subscription on the document store. Local mutations are
//! applied optimistically after the store accepted them, and every push
//! from the subscription replaces the bucket wholesale.
//!
//! ## Lifecycle
//!
//! `Unauthenticated -> Loading(date) -> Ready(date)`; selecting another day
//! goes back through `Loading`. A failed subscription moves to `Failed` and
//! is not retried until a day is selected again. Signing out returns to
//! `Unauthenticated` and cancels every task the session started.
//!
//! ## Tasks
//!
//! Each session runs up to three tasks, each bound to a cancellation token:
//! the day subscription, the known-dates subscription and the rollover
//! scheduler. Day pushes carry the generation they were subscribed under and
//! are dropped once a newer subscription exists.

pub mod state;

use chrono::{NaiveDate, Utc};
use futures::StreamExt;
use log::{debug, error, info, warn};
use shared::{
    AddTransactionRequest, Identity, NewTransaction, ProfilePatch, Transaction, TransactionPatch,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::calendar;
use super::error::{LedgerError, LedgerResult};
use super::rollover::{ArchiveOutcome, DayArchiver, RolloverScheduler};
use super::validation::TransactionValidator;
use crate::config::{LedgerConfig, RolloverConfig};
use crate::storage::{Connection, ProfileStorage, RentalFilter, RentalStorage, SnapshotStream};

pub use state::{DayBucket, LedgerPhase, LedgerSnapshot, Session};
use state::LedgerState;

pub struct DailyLedger<C: Connection> {
    inner: Arc<LedgerInner<C>>,
}

impl<C: Connection> Clone for DailyLedger<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct LedgerInner<C: Connection> {
    rentals: C::RentalRepository,
    profiles: C::ProfileRepository,
    archiver: DayArchiver<C>,
    validator: TransactionValidator,
    rollover: RolloverConfig,
    state: Mutex<LedgerState>,
    snapshots: watch::Sender<LedgerSnapshot>,
}

impl<C: Connection> DailyLedger<C> {
    pub fn new(connection: &C, config: &LedgerConfig) -> Self {
        let (snapshots, _) = watch::channel(LedgerSnapshot::default());
        Self {
            inner: Arc::new(LedgerInner {
                rentals: connection.create_rental_repository(),
                profiles: connection.create_profile_repository(),
                archiver: DayArchiver::new(connection),
                validator: TransactionValidator::new(&config.validation),
                rollover: config.rollover.clone(),
                state: Mutex::new(LedgerState::default()),
                snapshots,
            }),
        }
    }

    /// Observe the ledger; the receiver holds the latest snapshot
    pub fn watch(&self) -> watch::Receiver<LedgerSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &LedgerState) {
        self.inner.snapshots.send_replace(state.snapshot());
    }

    fn require_uid(&self) -> LedgerResult<String> {
        self.lock()
            .uid()
            .map(str::to_string)
            .ok_or(LedgerError::NotAuthenticated)
    }

    /// Start a session: subscribe to today, track known dates and arm the
    /// rollover. Re-initializing with the same user is a no-op; a different
    /// user replaces the current session.
    pub fn init(&self, session: Session) {
        let mut state = self.lock();
        if state.uid() == Some(session.uid()) {
            debug!("Ledger already running for {}", session.uid());
            return;
        }
        state.reset();

        info!(
            "Starting ledger session for {} ({})",
            session.identity.username,
            session.uid()
        );
        let uid = session.uid().to_string();
        state.session = Some(session);
        let epoch = state.epoch;

        state.dates_subscription = Some(self.spawn_known_dates(&uid, epoch));
        if self.inner.rollover.enabled {
            state.rollover = Some(self.spawn_rollover(&uid, epoch));
        }
        self.subscribe_locked(&mut state, calendar::today());
        self.publish(&state);
    }

    /// End the session, cancel its tasks and clear all local state
    pub fn teardown(&self) {
        let mut state = self.lock();
        if let Some(session) = &state.session {
            info!("Tearing down ledger session for {}", session.uid());
        }
        state.reset();
        self.publish(&state);
    }

    /// Drive `init`/`teardown` from an identity stream
    pub fn follow_identity(&self, mut identities: watch::Receiver<Option<Identity>>) -> JoinHandle<()> {
        let ledger = self.clone();
        tokio::spawn(async move {
            loop {
                let identity = identities.borrow_and_update().clone();
                match identity {
                    Some(identity) => ledger.init(Session::new(identity)),
                    None => {
                        if ledger.session().is_some() {
                            ledger.teardown();
                        }
                    }
                }
                if identities.changed().await.is_err() {
                    debug!("Identity stream closed");
                    break;
                }
            }
        })
    }

    /// Bind the ledger to `date` for `user_id`, which must be the session's
    /// user. Subscribing again to the live (date, user) pair keeps the
    /// existing subscription.
    pub fn subscribe(
        &self,
        date: NaiveDate,
        user_id: &str,
    ) -> LedgerResult<watch::Receiver<LedgerSnapshot>> {
        let mut state = self.lock();
        if state.uid() != Some(user_id) {
            return Err(LedgerError::NotAuthenticated);
        }
        let live = state.day_subscription.is_some() && state.selected_date() == Some(date);
        if !live {
            self.subscribe_locked(&mut state, date);
            self.publish(&state);
        }
        drop(state);
        Ok(self.watch())
    }

    pub fn select_date(&self, date: NaiveDate) -> LedgerResult<()> {
        let uid = self.require_uid()?;
        self.subscribe(date, &uid).map(|_| ())
    }

    fn subscribe_locked(&self, state: &mut LedgerState, date: NaiveDate) {
        let Some(uid) = state.uid().map(str::to_string) else {
            return;
        };
        if let Some(previous) = state.day_subscription.take() {
            previous.cancel();
        }

        state.generation += 1;
        let generation = state.generation;
        state.bucket = Some(DayBucket::new(date));
        state.phase = LedgerPhase::Loading { date };
        state.last_error = None;

        let (from, before) = calendar::day_window(date);
        let stream = self
            .inner
            .rentals
            .subscribe_rentals(RentalFilter::for_window(uid, from, before));
        let token = CancellationToken::new();
        state.day_subscription = Some(token.clone());
        debug!("Subscribed to {} (generation {})", date, generation);

        tokio::spawn(self.clone().pump_day(generation, stream, token));
    }

    async fn pump_day(self, generation: u64, mut stream: SnapshotStream, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                push = stream.next() => match push {
                    Some(Ok(transactions)) => self.apply_push(generation, transactions),
                    Some(Err(e)) => {
                        self.fail_subscription(generation, e);
                        break;
                    }
                    None => break,
                },
            }
        }
    }

    fn apply_push(&self, generation: u64, transactions: Vec<Transaction>) {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(
                "Dropping push from generation {} (current {})",
                generation, state.generation
            );
            return;
        }
        let Some(bucket) = state.bucket.as_mut() else {
            return;
        };
        bucket.replace(transactions);
        let date = bucket.date();
        state.phase = LedgerPhase::Ready { date };
        self.publish(&state);
    }

    fn fail_subscription(&self, generation: u64, failure: anyhow::Error) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        let Some(bucket) = state.bucket.as_mut() else {
            return;
        };
        bucket.replace(Vec::new());
        let date = bucket.date();

        let message = format!("{:#}", failure);
        error!("Rental subscription for {} failed: {}", date, message);
        state.phase = LedgerPhase::Failed {
            date,
            message: message.clone(),
        };
        state.last_error = Some(message);
        state.day_subscription = None;
        self.publish(&state);
    }

    fn spawn_known_dates(&self, uid: &str, epoch: u64) -> CancellationToken {
        let token = CancellationToken::new();
        let stream = self
            .inner
            .rentals
            .subscribe_rentals(RentalFilter::for_user(uid));
        tokio::spawn(self.clone().pump_known_dates(epoch, stream, token.clone()));
        token
    }

    async fn pump_known_dates(self, epoch: u64, mut stream: SnapshotStream, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                push = stream.next() => match push {
                    Some(Ok(transactions)) => {
                        let mut state = self.lock();
                        if state.epoch != epoch {
                            break;
                        }
                        state.known_dates = transactions
                            .iter()
                            .map(|t| calendar::local_date_of(t.created_at))
                            .collect();
                        self.publish(&state);
                    }
                    Some(Err(e)) => {
                        self.fail_known_dates(epoch, e);
                        break;
                    }
                    None => break,
                },
            }
        }
    }

    fn fail_known_dates(&self, epoch: u64, failure: anyhow::Error) {
        let mut state = self.lock();
        if state.epoch != epoch {
            return;
        }
        let message = format!("{:#}", failure);
        warn!("Known dates subscription failed: {}", message);
        state.last_error = Some(message);
        if let Some(token) = state.dates_subscription.take() {
            token.cancel();
        }
        self.publish(&state);
    }

    fn spawn_rollover(&self, uid: &str, epoch: u64) -> CancellationToken {
        let token = CancellationToken::new();
        let ledger = self.clone();
        let scheduler = RolloverScheduler::new(
            self.inner.archiver.clone(),
            uid,
            self.inner.rollover.catch_up_on_start,
            token.clone(),
        )
        .with_day_change(Box::new(move |finished, new_day| {
            ledger.follow_new_day(epoch, finished, new_day)
        }));
        tokio::spawn(scheduler.run());
        token
    }

    /// Move a ledger that was showing the day that just ended onto the new day
    fn follow_new_day(&self, epoch: u64, finished: NaiveDate, new_day: NaiveDate) {
        let mut state = self.lock();
        if state.epoch != epoch || state.selected_date() != Some(finished) {
            return;
        }
        info!("Day rolled over from {} to {}", finished, new_day);
        self.subscribe_locked(&mut state, new_day);
        self.publish(&state);
    }

    /// Validate and store a new rental created now.
    ///
    /// The rental shows up in the active bucket only when the bucket's day
    /// covers its creation instant.
    pub async fn add_transaction(&self, request: AddTransactionRequest) -> LedgerResult<Transaction> {
        let uid = self.require_uid()?;
        self.inner.validator.validate_new(&request)?;

        let new_transaction = NewTransaction::from_request(request, uid.as_str(), Utc::now());
        let id = self
            .inner
            .rentals
            .store_rental(&new_transaction)
            .await
            .map_err(LedgerError::persistence)?;
        let transaction = new_transaction.with_id(id);
        info!(
            "Added rental {} for {} ({}, {})",
            transaction.id, transaction.name, transaction.amount, transaction.status
        );

        let mut state = self.lock();
        if state.uid() == Some(uid.as_str()) {
            if let Some(bucket) = state
                .bucket
                .as_mut()
                .filter(|bucket| bucket.covers(transaction.created_at))
            {
                if bucket.insert(transaction.clone()) {
                    self.publish(&state);
                }
            }
        }
        Ok(transaction)
    }

    /// Patch a rental of the active bucket.
    ///
    /// Renaming or changing the phone also updates the first profile whose
    /// name matches the old name. That update is best-effort.
    pub async fn update_transaction(
        &self,
        id: &str,
        mut patch: TransactionPatch,
    ) -> LedgerResult<Transaction> {
        let uid = self.require_uid()?;
        self.inner.validator.validate_patch(&patch)?;
        if let Some(name) = patch.name.as_mut() {
            *name = name.trim().to_string();
        }
        let original = self.find_local(id)?;

        let updated_at = Utc::now();
        self.inner
            .rentals
            .update_rental(id, &patch, updated_at)
            .await
            .map_err(LedgerError::persistence)?;

        let patched = {
            let mut state = self.lock();
            let patched = if state.uid() == Some(uid.as_str()) {
                state
                    .bucket
                    .as_mut()
                    .and_then(|bucket| bucket.apply_patch(id, &patch, updated_at))
            } else {
                None
            };
            if patched.is_some() {
                self.publish(&state);
            }
            patched
        };
        let updated = patched.unwrap_or_else(|| {
            let mut updated = original.clone();
            updated.apply_patch(&patch, updated_at);
            updated
        });
        info!("Updated rental {}", id);

        if patch.changes_contact() {
            self.sync_profile_update(&original.name, &patch).await;
        }
        Ok(updated)
    }

    /// Delete a rental of the active bucket, along with the first profile
    /// named like it (best-effort)
    pub async fn delete_transaction(&self, id: &str) -> LedgerResult<()> {
        let uid = self.require_uid()?;
        let original = self.find_local(id)?;

        self.inner
            .rentals
            .delete_rental(id)
            .await
            .map_err(LedgerError::persistence)?;
        self.sync_profile_delete(&original.name).await;

        let mut state = self.lock();
        if state.uid() == Some(uid.as_str()) {
            let removed = state
                .bucket
                .as_mut()
                .and_then(|bucket| bucket.remove(id))
                .is_some();
            if removed {
                self.publish(&state);
            }
        }
        info!("Deleted rental {}", id);
        Ok(())
    }

    fn find_local(&self, id: &str) -> LedgerResult<Transaction> {
        self.lock()
            .bucket
            .as_ref()
            .and_then(|bucket| bucket.get(id))
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    async fn sync_profile_update(&self, old_name: &str, patch: &TransactionPatch) {
        let profiles = &self.inner.profiles;
        let profile = match profiles.find_first_profile_by_name(old_name).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                debug!("No profile named '{}' to update", old_name);
                return;
            }
            Err(e) => {
                warn!("Profile lookup for '{}' failed: {:#}", old_name, e);
                return;
            }
        };

        let profile_patch = ProfilePatch {
            name: patch.name.clone(),
            phone_number: patch.phone.clone(),
        };
        if let Err(e) = profiles.update_profile(&profile.id, &profile_patch).await {
            warn!("Profile {} was not updated: {:#}", profile.id, e);
        }
    }

    async fn sync_profile_delete(&self, name: &str) {
        let profiles = &self.inner.profiles;
        match profiles.find_first_profile_by_name(name).await {
            Ok(Some(profile)) => {
                if let Err(e) = profiles.delete_profile(&profile.id).await {
                    warn!("Profile {} was not deleted: {:#}", profile.id, e);
                }
            }
            Ok(None) => debug!("No profile named '{}' to delete", name),
            Err(e) => warn!("Profile lookup for '{}' failed: {:#}", name, e),
        }
    }

    /// Archive the current local day now instead of waiting for midnight
    pub async fn save_daily_history(&self) -> LedgerResult<ArchiveOutcome> {
        let uid = self.require_uid()?;
        self.inner.archiver.archive_day(&uid, calendar::today()).await
    }

    /// Days covered by a rental, both endpoints included; 0 when either is unset
    pub fn compute_span(start: Option<NaiveDate>, end: Option<NaiveDate>) -> u64 {
        calendar::compute_span(start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthService, MemoryAuthService};
    use crate::config::AuthConfig;
    use crate::storage::{HistoryStorage, MemoryConnection};
    use chrono::Duration;
    use rust_decimal::Decimal;
    use shared::{NewUserProfile, TransactionStatus};

    fn identity(uid: &str) -> Identity {
        Identity {
            uid: uid.to_string(),
            identifier: format!("{}@knowapp.com", uid),
            username: uid.to_string(),
        }
    }

    fn config() -> LedgerConfig {
        let mut config = LedgerConfig::default();
        config.rollover.enabled = false;
        config
    }

    fn ledger(connection: &MemoryConnection) -> DailyLedger<MemoryConnection> {
        DailyLedger::new(connection, &config())
    }

    fn request(name: &str, amount: i64, status: TransactionStatus) -> AddTransactionRequest {
        AddTransactionRequest {
            name: name.to_string(),
            amount: Decimal::from(amount),
            status,
            hours: Some(Decimal::ONE),
            ..AddTransactionRequest::default()
        }
    }

    fn stored_rental(user_id: &str, date: NaiveDate, name: &str, amount: i64) -> NewTransaction {
        NewTransaction {
            user_id: user_id.to_string(),
            name: name.to_string(),
            amount: Decimal::from(amount),
            status: TransactionStatus::Paid,
            created_at: calendar::day_window(date).0 + Duration::hours(1),
            hours: Some(Decimal::ONE),
            date_range: None,
            phone: None,
            has_warning: false,
        }
    }

    async fn wait_until(
        ledger: &DailyLedger<MemoryConnection>,
        condition: impl Fn(&LedgerSnapshot) -> bool,
    ) -> LedgerSnapshot {
        let mut snapshots = ledger.watch();
        let snapshot = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            snapshots.wait_for(|snapshot| condition(snapshot)),
        )
        .await
        .expect("ledger did not reach the expected state")
        .expect("ledger dropped")
        .clone();
        snapshot
    }

    async fn ready_ledger(connection: &MemoryConnection, uid: &str) -> DailyLedger<MemoryConnection> {
        let ledger = ledger(connection);
        ledger.init(Session::new(identity(uid)));
        let today = calendar::today();
        wait_until(&ledger, |s| s.phase == LedgerPhase::Ready { date: today }).await;
        ledger
    }

    #[tokio::test]
    async fn test_add_pay_delete_tracks_revenue() {
        let connection = MemoryConnection::new();
        let ledger = ready_ledger(&connection, "u1").await;

        let added = ledger
            .add_transaction(request("Alice", 100, TransactionStatus::Pending))
            .await
            .unwrap();
        assert_eq!(added.user_id, "u1");
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.transactions.len(), 1);
        assert_eq!(snapshot.total_revenue, Decimal::ZERO);

        let paid = ledger
            .update_transaction(&added.id, TransactionPatch::status(TransactionStatus::Paid))
            .await
            .unwrap();
        assert!(paid.is_paid());
        assert!(paid.updated_at.is_some());
        assert_eq!(ledger.snapshot().total_revenue, Decimal::from(100));

        ledger.delete_transaction(&added.id).await.unwrap();
        assert_eq!(ledger.snapshot().total_revenue, Decimal::ZERO);

        let settled = wait_until(&ledger, |s| s.transactions.is_empty()).await;
        assert_eq!(settled.total_revenue, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_revenue_matches_paid_sum_after_mixed_changes() {
        let connection = MemoryConnection::new();
        let ledger = ready_ledger(&connection, "u1").await;

        let a = ledger
            .add_transaction(request("A", 30, TransactionStatus::Paid))
            .await
            .unwrap();
        let b = ledger
            .add_transaction(request("B", 20, TransactionStatus::Pending))
            .await
            .unwrap();
        let c = ledger
            .add_transaction(request("C", 15, TransactionStatus::Paid))
            .await
            .unwrap();
        let repriced = TransactionPatch {
            amount: Some(Decimal::from(45)),
            ..TransactionPatch::default()
        };
        ledger.update_transaction(&a.id, repriced).await.unwrap();
        ledger
            .update_transaction(&b.id, TransactionPatch::status(TransactionStatus::Paid))
            .await
            .unwrap();
        ledger.delete_transaction(&c.id).await.unwrap();

        let snapshot = wait_until(&ledger, |s| s.transactions.len() == 2).await;
        let paid_sum: Decimal = snapshot.transactions.iter().map(Transaction::paid_amount).sum();
        assert_eq!(snapshot.total_revenue, paid_sum);
        assert_eq!(snapshot.total_revenue, Decimal::from(65));
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let connection = MemoryConnection::new();
        let ledger = ready_ledger(&connection, "u1").await;

        let empty_name = ledger
            .add_transaction(request("", 5, TransactionStatus::Pending))
            .await;
        assert!(matches!(empty_name, Err(LedgerError::Validation(_))));

        let negative = ledger
            .add_transaction(request("Alice", -1, TransactionStatus::Pending))
            .await;
        assert!(matches!(negative, Err(LedgerError::Validation(_))));

        let stored = connection
            .create_rental_repository()
            .query_rentals(&RentalFilter::for_user("u1"))
            .await
            .unwrap();
        assert!(stored.is_empty());
        assert!(ledger.snapshot().transactions.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let connection = MemoryConnection::new();
        let ledger = ready_ledger(&connection, "u1").await;
        ledger
            .add_transaction(request("Alice", 50, TransactionStatus::Paid))
            .await
            .unwrap();

        let result = ledger
            .update_transaction("missing", TransactionPatch::status(TransactionStatus::Paid))
            .await;
        assert!(matches!(result, Err(LedgerError::NotFound(id)) if id == "missing"));
        assert!(ledger.delete_transaction("missing").await.unwrap_err().is_not_found());
        assert_eq!(ledger.snapshot().total_revenue, Decimal::from(50));
    }

    #[tokio::test]
    async fn test_operations_need_a_session() {
        let connection = MemoryConnection::new();
        let ledger = ledger(&connection);

        assert!(matches!(
            ledger
                .add_transaction(request("Alice", 5, TransactionStatus::Paid))
                .await,
            Err(LedgerError::NotAuthenticated)
        ));
        assert!(matches!(
            ledger.select_date(calendar::today()),
            Err(LedgerError::NotAuthenticated)
        ));
        assert!(matches!(
            ledger.save_daily_history().await,
            Err(LedgerError::NotAuthenticated)
        ));

        ledger.init(Session::new(identity("u1")));
        assert!(matches!(
            ledger.subscribe(calendar::today(), "someone-else"),
            Err(LedgerError::NotAuthenticated)
        ));
        assert!(ledger.subscribe(calendar::today(), "u1").is_ok());
    }

    #[tokio::test]
    async fn test_write_failure_leaves_state_unchanged() {
        let connection = MemoryConnection::new();
        let ledger = ready_ledger(&connection, "u1").await;
        let added = ledger
            .add_transaction(request("Alice", 40, TransactionStatus::Pending))
            .await
            .unwrap();
        let before = wait_until(&ledger, |s| s.transactions.len() == 1).await;

        connection.set_fail_writes(true);
        assert!(matches!(
            ledger
                .add_transaction(request("Bob", 10, TransactionStatus::Paid))
                .await,
            Err(LedgerError::Persistence(_))
        ));
        assert!(matches!(
            ledger
                .update_transaction(&added.id, TransactionPatch::status(TransactionStatus::Paid))
                .await,
            Err(LedgerError::Persistence(_))
        ));
        assert!(matches!(
            ledger.delete_transaction(&added.id).await,
            Err(LedgerError::Persistence(_))
        ));

        let after = ledger.snapshot();
        assert_eq!(after.transactions, before.transactions);
        assert_eq!(after.total_revenue, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_subscription_failure_clears_bucket() {
        let connection = MemoryConnection::new();
        let today = calendar::today();
        let rentals = connection.create_rental_repository();
        rentals
            .store_rental(&stored_rental("u1", today, "Alice", 25))
            .await
            .unwrap();

        let ledger = ready_ledger(&connection, "u1").await;
        wait_until(&ledger, |s| s.total_revenue == Decimal::from(25)).await;

        connection.set_fail_reads(true);
        rentals
            .store_rental(&stored_rental("u1", today, "Bob", 5))
            .await
            .unwrap();

        let failed = wait_until(&ledger, |s| matches!(s.phase, LedgerPhase::Failed { .. })).await;
        assert!(failed.transactions.is_empty());
        assert_eq!(failed.total_revenue, Decimal::ZERO);
        assert!(failed.last_error.is_some());

        connection.set_fail_reads(false);
        ledger.select_date(today).unwrap();
        let recovered = wait_until(&ledger, |s| s.phase == LedgerPhase::Ready { date: today }).await;
        assert_eq!(recovered.total_revenue, Decimal::from(30));
        assert!(recovered.last_error.is_none());
    }

    #[tokio::test]
    async fn test_switching_days_drops_stale_pushes() {
        let connection = MemoryConnection::new();
        let today = calendar::today();
        let yesterday = today.pred_opt().unwrap();
        connection
            .create_rental_repository()
            .store_rental(&stored_rental("u1", yesterday, "Yesterday", 12))
            .await
            .unwrap();

        let ledger = ready_ledger(&connection, "u1").await;
        let today_generation = ledger.lock().generation;

        ledger.select_date(yesterday).unwrap();
        let switched =
            wait_until(&ledger, |s| s.phase == LedgerPhase::Ready { date: yesterday }).await;
        assert_eq!(switched.selected_date, Some(yesterday));
        assert_eq!(switched.total_revenue, Decimal::from(12));

        let late = stored_rental("u1", today, "Late", 99).with_id("late");
        ledger.apply_push(today_generation, vec![late]);

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.selected_date, Some(yesterday));
        assert_eq!(snapshot.transactions.len(), 1);
        assert_eq!(snapshot.total_revenue, Decimal::from(12));
    }

    #[tokio::test]
    async fn test_resubscribing_same_day_keeps_subscription() {
        let connection = MemoryConnection::new();
        let ledger = ready_ledger(&connection, "u1").await;
        let generation = ledger.lock().generation;

        ledger.subscribe(calendar::today(), "u1").unwrap();
        assert_eq!(ledger.lock().generation, generation);
    }

    #[tokio::test]
    async fn test_rental_for_another_day_is_not_shown() {
        let connection = MemoryConnection::new();
        let ledger = ready_ledger(&connection, "u1").await;
        let yesterday = calendar::today().pred_opt().unwrap();
        ledger.select_date(yesterday).unwrap();
        wait_until(&ledger, |s| s.phase == LedgerPhase::Ready { date: yesterday }).await;

        ledger
            .add_transaction(request("Alice", 10, TransactionStatus::Paid))
            .await
            .unwrap();
        let snapshot = ledger.snapshot();
        assert!(snapshot.transactions.is_empty());
        assert_eq!(snapshot.total_revenue, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_known_dates_follow_the_collection() {
        let connection = MemoryConnection::new();
        let today = calendar::today();
        let two_days_ago = today - Duration::days(2);
        let rentals = connection.create_rental_repository();
        rentals
            .store_rental(&stored_rental("u1", two_days_ago, "Old", 5))
            .await
            .unwrap();
        rentals
            .store_rental(&stored_rental("u2", today, "Other user", 5))
            .await
            .unwrap();

        let ledger = ready_ledger(&connection, "u1").await;
        wait_until(&ledger, |s| s.known_dates == vec![two_days_ago]).await;

        ledger
            .add_transaction(request("New", 5, TransactionStatus::Pending))
            .await
            .unwrap();
        wait_until(&ledger, |s| s.known_dates == vec![two_days_ago, today]).await;
    }

    #[tokio::test]
    async fn test_known_dates_failure_is_reported() {
        let connection = MemoryConnection::new();
        let ledger = ready_ledger(&connection, "u1").await;
        let today = calendar::today();
        let epoch = ledger.lock().epoch;

        ledger.fail_known_dates(epoch + 1, anyhow::anyhow!("stale session"));
        assert!(ledger.snapshot().last_error.is_none());

        ledger.fail_known_dates(epoch, anyhow::anyhow!("dates query denied"));
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.last_error.as_deref(), Some("dates query denied"));
        assert_eq!(snapshot.phase, LedgerPhase::Ready { date: today });
        assert!(ledger.lock().dates_subscription.is_none());
    }

    #[tokio::test]
    async fn test_contact_changes_reach_first_matching_profile() {
        let connection = MemoryConnection::new();
        let profiles = connection.create_profile_repository();
        profiles
            .store_profile(&NewUserProfile {
                uid: "p1".to_string(),
                username: "alice".to_string(),
                name: Some("Alice".to_string()),
                phone_number: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let ledger = ready_ledger(&connection, "u1").await;
        let added = ledger
            .add_transaction(request("Alice", 10, TransactionStatus::Pending))
            .await
            .unwrap();

        let rename = TransactionPatch {
            name: Some(" Alicia ".to_string()),
            phone: Some("555-0100".to_string()),
            ..TransactionPatch::default()
        };
        let renamed = ledger.update_transaction(&added.id, rename).await.unwrap();
        assert_eq!(renamed.name, "Alicia");

        let profile = profiles.find_profile_by_uid("p1").await.unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("Alicia"));
        assert_eq!(profile.phone_number.as_deref(), Some("555-0100"));

        ledger.delete_transaction(&added.id).await.unwrap();
        assert!(profiles.find_profile_by_uid("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_manual_archive_runs_once_per_day() {
        let connection = MemoryConnection::new();
        let ledger = ready_ledger(&connection, "u1").await;
        ledger
            .add_transaction(request("Alice", 80, TransactionStatus::Paid))
            .await
            .unwrap();
        ledger
            .add_transaction(request("Bob", 20, TransactionStatus::Pending))
            .await
            .unwrap();

        let ArchiveOutcome::Archived(record) = ledger.save_daily_history().await.unwrap() else {
            panic!("expected an archive");
        };
        assert_eq!(record.total_revenue, Decimal::from(80));
        assert_eq!(record.transactions.len(), 2);
        assert_eq!(
            ledger.save_daily_history().await.unwrap(),
            ArchiveOutcome::AlreadyArchived
        );

        let history = connection.create_history_repository();
        assert_eq!(history.list_history("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rollover_moves_ledger_to_new_day() {
        let connection = MemoryConnection::new();
        let ledger = ready_ledger(&connection, "u1").await;
        let today = calendar::today();
        let tomorrow = today.succ_opt().unwrap();
        let epoch = ledger.lock().epoch;

        ledger.follow_new_day(epoch + 1, today, tomorrow);
        assert_eq!(ledger.snapshot().selected_date, Some(today));

        ledger.follow_new_day(epoch, today, tomorrow);
        assert_eq!(ledger.snapshot().selected_date, Some(tomorrow));
        wait_until(&ledger, |s| s.phase == LedgerPhase::Ready { date: tomorrow }).await;
    }

    #[tokio::test]
    async fn test_sign_out_returns_to_unauthenticated() {
        let connection = MemoryConnection::new();
        let auth = MemoryAuthService::new(AuthConfig::default());
        let ledger = ledger(&connection);
        let follower = ledger.follow_identity(auth.on_identity_change());

        let identity = auth.sign_up("kim@knowapp.com", "hunter22").await.unwrap();
        let today = calendar::today();
        let ready = wait_until(&ledger, |s| s.phase == LedgerPhase::Ready { date: today }).await;
        assert_eq!(ready.user_id.as_deref(), Some(identity.uid.as_str()));
        ledger
            .add_transaction(request("Alice", 10, TransactionStatus::Paid))
            .await
            .unwrap();

        auth.sign_out().await.unwrap();
        let signed_out = wait_until(&ledger, |s| s.phase == LedgerPhase::Unauthenticated).await;
        assert_eq!(signed_out, LedgerSnapshot::default());
        assert!(ledger.session().is_none());

        follower.abort();
    }

    #[test]
    fn test_compute_span() {
        let day = |d| NaiveDate::from_ymd_opt(2025, 1, d).unwrap();
        assert_eq!(DailyLedger::<MemoryConnection>::compute_span(Some(day(1)), Some(day(1))), 1);
        assert_eq!(DailyLedger::<MemoryConnection>::compute_span(Some(day(1)), Some(day(3))), 3);
        assert_eq!(DailyLedger::<MemoryConnection>::compute_span(None, Some(day(3))), 0);
    }
}
