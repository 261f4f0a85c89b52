//! On-disk layout of the CSV document store.
//!
//! ```text
//! data/
//! ├── rentals.csv          all rentals, one row each
//! ├── profiles.csv         user profile documents
//! ├── history.csv          one row per archived day
//! └── history/
//!     └── {history_id}.csv rentals captured by that archive
//! ```
//!
//! Every write replaces the whole file through a temp file and a rename.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use csv::{Reader, Writer};
use log::debug;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::{DateRange, HistoryRecord, Transaction, TransactionStatus, UserProfile};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::storage::documents::DocumentSink;

const RENTALS_FILE: &str = "rentals.csv";
const PROFILES_FILE: &str = "profiles.csv";
const HISTORY_FILE: &str = "history.csv";
const HISTORY_DIR: &str = "history";

#[derive(Debug, Serialize, Deserialize)]
struct RentalRow {
    id: String,
    user_id: String,
    name: String,
    amount: String,
    status: TransactionStatus,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    hours: Option<String>,
    range_start: Option<NaiveDate>,
    range_end: Option<NaiveDate>,
    phone: Option<String>,
    has_warning: bool,
}

impl From<&Transaction> for RentalRow {
    fn from(rental: &Transaction) -> Self {
        Self {
            id: rental.id.clone(),
            user_id: rental.user_id.clone(),
            name: rental.name.clone(),
            amount: rental.amount.to_string(),
            status: rental.status,
            created_at: rental.created_at,
            updated_at: rental.updated_at,
            hours: rental.hours.map(|hours| hours.to_string()),
            range_start: rental.date_range.map(|range| range.start_date),
            range_end: rental.date_range.map(|range| range.end_date),
            phone: rental.phone.clone(),
            has_warning: rental.has_warning,
        }
    }
}

impl TryFrom<RentalRow> for Transaction {
    type Error = anyhow::Error;

    fn try_from(row: RentalRow) -> Result<Self> {
        let amount = Decimal::from_str(&row.amount)
            .with_context(|| format!("Invalid amount '{}' for rental {}", row.amount, row.id))?;
        let hours = row
            .hours
            .as_deref()
            .map(Decimal::from_str)
            .transpose()
            .with_context(|| format!("Invalid hours for rental {}", row.id))?;
        let date_range = match (row.range_start, row.range_end) {
            (Some(start), Some(end)) => Some(DateRange::new(start, end)),
            (None, None) => None,
            _ => return Err(anyhow!("Rental {} has a half-open date range", row.id)),
        };
        Ok(Transaction {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            amount,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            hours,
            date_range,
            phone: row.phone,
            has_warning: row.has_warning,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryRow {
    id: String,
    user_id: String,
    date: NaiveDate,
    total_revenue: String,
    created_at: DateTime<Utc>,
}

/// Paths and row codecs for one data directory
#[derive(Debug, Clone)]
pub struct CsvFiles {
    base_directory: PathBuf,
}

impl CsvFiles {
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: base_directory.into(),
        }
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// Create the directory tree if it does not exist yet
    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(self.base_directory.join(HISTORY_DIR))?;
        Ok(())
    }

    fn history_rentals_path(&self, history_id: &str) -> PathBuf {
        self.base_directory
            .join(HISTORY_DIR)
            .join(format!("{}.csv", history_id))
    }

    pub fn load_rentals(&self) -> Result<Vec<Transaction>> {
        Self::load_rentals_from(&self.base_directory.join(RENTALS_FILE))
    }

    fn load_rentals_from(path: &Path) -> Result<Vec<Transaction>> {
        read_rows::<RentalRow>(path)?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    pub fn load_profiles(&self) -> Result<Vec<UserProfile>> {
        read_rows(&self.base_directory.join(PROFILES_FILE))
    }

    pub fn load_history(&self) -> Result<Vec<HistoryRecord>> {
        read_rows::<HistoryRow>(&self.base_directory.join(HISTORY_FILE))?
            .into_iter()
            .map(|row| {
                let total_revenue = Decimal::from_str(&row.total_revenue).with_context(|| {
                    format!("Invalid total revenue for archive {}", row.id)
                })?;
                let transactions = Self::load_rentals_from(&self.history_rentals_path(&row.id))?;
                Ok(HistoryRecord {
                    id: row.id,
                    user_id: row.user_id,
                    date: row.date,
                    total_revenue,
                    transactions,
                    created_at: row.created_at,
                })
            })
            .collect()
    }
}

impl DocumentSink for CsvFiles {
    fn write_rentals(&self, rentals: &[Transaction]) -> Result<()> {
        write_rows(
            &self.base_directory.join(RENTALS_FILE),
            rentals.iter().map(RentalRow::from),
        )
    }

    fn write_history(&self, history: &[HistoryRecord], added: &HistoryRecord) -> Result<()> {
        write_rows(
            &self.history_rentals_path(&added.id),
            added.transactions.iter().map(RentalRow::from),
        )?;
        write_rows(
            &self.base_directory.join(HISTORY_FILE),
            history.iter().map(|record| HistoryRow {
                id: record.id.clone(),
                user_id: record.user_id.clone(),
                date: record.date,
                total_revenue: record.total_revenue.to_string(),
                created_at: record.created_at,
            }),
        )
    }

    fn write_profiles(&self, profiles: &[UserProfile]) -> Result<()> {
        write_rows(&self.base_directory.join(PROFILES_FILE), profiles.iter())
    }
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.with_context(|| format!("Malformed row in {:?}", path))?);
    }
    debug!("Read {} rows from {:?}", rows.len(), path);
    Ok(rows)
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        let mut writer = Writer::from_writer(BufWriter::new(file));
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}
