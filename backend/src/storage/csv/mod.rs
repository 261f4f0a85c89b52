//! CSV-file document store.

pub mod connection;
pub mod files;

#[cfg(test)]
pub mod test_utils;

pub use connection::CsvConnection;
pub use files::CsvFiles;
