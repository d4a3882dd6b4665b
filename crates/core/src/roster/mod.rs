//! Recipient roster loading and validation.
//!
//! A roster is a parsed contact list: one phone number per row plus the
//! template variables for that recipient. The whole list is materialized
//! before dispatch begins, since the engine needs the total count up front
//! for aggregate tracking.

mod csv;

pub use csv::load_csv;

use thiserror::Error;

/// Error type for roster loading.
#[derive(Debug, Error)]
pub enum RosterError {
    /// Required column is missing from the header row.
    #[error("missing required column: {0}")]
    MissingColumn(String),

    /// A row's phone number failed the format check.
    #[error("invalid phone number on line {line}: {value}")]
    InvalidPhone { line: usize, value: String },

    /// A row has fewer fields than the header.
    #[error("malformed row on line {line}: expected {expected} fields, got {got}")]
    MalformedRow {
        line: usize,
        expected: usize,
        got: usize,
    },

    /// The roster contains no recipients at all.
    #[error("roster is empty")]
    Empty,
}
