//! Object naming for archived editions
//!
//! Object names are derived from the upstream edition date by a literal
//! substitution: every `/` becomes `-`. No calendar validation takes part in
//! naming, so whatever the upstream publishes maps to the same name every time.

use chrono::NaiveDate;

use crate::error::{CifpError, Result};

/// Namespace for untouched archive copies.
pub const ORIGINAL_PREFIX: &str = "original";

/// Namespace for transformed outputs.
pub const PROCESSED_PREFIX: &str = "processed";

/// Date format used by the upstream edition feed.
pub const EDITION_DATE_FORMAT: &str = "%m/%d/%Y";

/// Filesystem-safe token for an edition date (`06/18/2020` -> `06-18-2020`).
pub fn date_token(edition_date: &str) -> String {
    edition_date.replace('/', "-")
}

/// Durable object names for one edition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNames {
    /// `original/<BASE>_original_<token>.zip`
    pub original: String,
    /// `processed/<BASE>_processed_<token>`
    pub processed: String,
}

impl ObjectNames {
    pub fn new(base_filename: &str, edition_date: &str) -> Self {
        let token = date_token(edition_date);
        Self {
            original: format!("{}/{}_original_{}.zip", ORIGINAL_PREFIX, base_filename, token),
            processed: format!("{}/{}_processed_{}", PROCESSED_PREFIX, base_filename, token),
        }
    }
}

/// Parse an upstream edition date (`MM/DD/YYYY`).
pub fn parse_edition_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), EDITION_DATE_FORMAT).map_err(|_| {
        CifpError::InvalidEditionDate {
            value: value.to_string(),
        }
    })
}
