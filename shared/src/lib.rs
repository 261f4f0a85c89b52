use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment state of a rental
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Rental logged but not yet paid for
    #[default]
    Pending,
    /// Rental paid; counts toward the day's revenue
    Paid,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive range of calendar days a rental covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRange {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
        }
    }

    /// A range is valid when it does not end before it starts
    pub fn is_valid(&self) -> bool {
        self.end_date >= self.start_date
    }
}

/// A single rental entry as stored by the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Store-assigned identifier
    pub id: String,
    /// Identity that owns this rental
    pub user_id: String,
    /// Display name of the renter
    pub name: String,
    /// Amount charged (never negative)
    pub amount: Decimal,
    pub status: TransactionStatus,
    /// When the rental was logged; decides which day bucket it belongs to
    pub created_at: DateTime<Utc>,
    /// Set on every successful update
    pub updated_at: Option<DateTime<Utc>>,
    /// Rental length in hours, when billed hourly
    pub hours: Option<Decimal>,
    /// Rental length in days, when billed by calendar range
    pub date_range: Option<DateRange>,
    /// Contact number captured with the rental
    pub phone: Option<String>,
    /// Advisory flag for the presentation layer
    pub has_warning: bool,
}

impl Transaction {
    pub fn is_paid(&self) -> bool {
        self.status == TransactionStatus::Paid
    }

    /// Contribution of this rental to the day's revenue
    pub fn paid_amount(&self) -> Decimal {
        if self.is_paid() {
            self.amount
        } else {
            Decimal::ZERO
        }
    }

    /// Hours rendered the way the rental list shows them, e.g. `1.5h`
    pub fn formatted_hours(&self) -> String {
        match self.hours {
            Some(hours) if !hours.is_zero() => format!("{}h", hours.normalize()),
            _ => "0h".to_string(),
        }
    }

    /// Apply the fields present in `patch`, stamping `updated_at`
    pub fn apply_patch(&mut self, patch: &TransactionPatch, updated_at: DateTime<Utc>) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(phone) = &patch.phone {
            self.phone = Some(phone.clone());
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        self.updated_at = Some(updated_at);
    }
}

/// A rental that has not been assigned an id yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub user_id: String,
    pub name: String,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub hours: Option<Decimal>,
    pub date_range: Option<DateRange>,
    pub phone: Option<String>,
    pub has_warning: bool,
}

impl NewTransaction {
    pub fn from_request(
        request: AddTransactionRequest,
        user_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            name: request.name.trim().to_string(),
            amount: request.amount,
            status: request.status,
            created_at,
            hours: request.hours,
            date_range: request.date_range,
            phone: request.phone,
            has_warning: request.has_warning,
        }
    }

    pub fn with_id(self, id: impl Into<String>) -> Transaction {
        Transaction {
            id: id.into(),
            user_id: self.user_id,
            name: self.name,
            amount: self.amount,
            status: self.status,
            created_at: self.created_at,
            updated_at: None,
            hours: self.hours,
            date_range: self.date_range,
            phone: self.phone,
            has_warning: self.has_warning,
        }
    }
}

/// Input for logging a new rental
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddTransactionRequest {
    pub name: String,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub hours: Option<Decimal>,
    pub date_range: Option<DateRange>,
    pub phone: Option<String>,
    pub has_warning: bool,
}

/// Partial update of a rental; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub amount: Option<Decimal>,
    pub status: Option<TransactionStatus>,
}

impl TransactionPatch {
    pub fn status(status: TransactionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// True when the patch touches fields mirrored into the profile record
    pub fn changes_contact(&self) -> bool {
        self.name.is_some() || self.phone.is_some()
    }
}

/// End-of-day archive of one user's rentals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub user_id: String,
    /// The archived calendar day
    pub date: NaiveDate,
    /// Paid revenue captured at snapshot time
    pub total_revenue: Decimal,
    /// Rentals as they existed at snapshot time
    pub transactions: Vec<Transaction>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHistoryRecord {
    pub user_id: String,
    pub date: NaiveDate,
    pub total_revenue: Decimal,
    pub transactions: Vec<Transaction>,
    pub created_at: DateTime<Utc>,
}

impl NewHistoryRecord {
    pub fn with_id(self, id: impl Into<String>) -> HistoryRecord {
        HistoryRecord {
            id: id.into(),
            user_id: self.user_id,
            date: self.date,
            total_revenue: self.total_revenue,
            transactions: self.transactions,
            created_at: self.created_at,
        }
    }
}

/// One row of the history browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub id: String,
    pub date: NaiveDate,
    pub total_revenue: Decimal,
    pub rental_count: usize,
}

impl From<&HistoryRecord> for HistorySummary {
    fn from(record: &HistoryRecord) -> Self {
        Self {
            id: record.id.clone(),
            date: record.date,
            total_revenue: record.total_revenue,
            rental_count: record.transactions.len(),
        }
    }
}

/// Authenticated identity as reported by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    /// Login identifier the provider knows the user by (email form)
    pub identifier: String,
    pub username: String,
}

/// Denormalized profile document written at registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub uid: String,
    pub username: String,
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUserProfile {
    pub uid: String,
    pub username: String,
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewUserProfile {
    pub fn with_id(self, id: impl Into<String>) -> UserProfile {
        UserProfile {
            id: id.into(),
            uid: self.uid,
            username: self.username,
            name: self.name,
            phone_number: self.phone_number,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub phone_number: Option<String>,
}
