//! Shared domain types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Maximum number of cycles returned by a recency listing.
pub const CYCLE_LISTING_LIMIT: usize = 10;

/// One fully processed edition of the upstream CIFP dataset.
///
/// A cycle is only ever written after both the original archive and the
/// processed output have been committed to durable storage, so the presence
/// of a cycle with a given `name` means that edition needs no further work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    /// Upstream edition identifier, unique across all cycles
    pub name: String,
    /// Edition date, used to order listings newest-first
    pub date: NaiveDate,
    /// Locator of the untouched archive copy
    pub original_location: String,
    /// Locator of the transformed output
    pub processed_location: String,
}

impl Cycle {
    pub fn new(
        name: impl Into<String>,
        date: NaiveDate,
        original_location: impl Into<String>,
        processed_location: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            date,
            original_location: original_location.into(),
            processed_location: processed_location.into(),
        }
    }
}

/// Order cycles newest-first and keep at most [`CYCLE_LISTING_LIMIT`].
pub fn most_recent(mut cycles: Vec<Cycle>) -> Vec<Cycle> {
    cycles.sort_by(|a, b| b.date.cmp(&a.date));
    cycles.truncate(CYCLE_LISTING_LIMIT);
    cycles
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn cycle(name: &str, y: i32, m: u32, d: u32) -> Cycle {
        Cycle::new(
            name,
            NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            format!("original/{}", name),
            format!("processed/{}", name),
        )
    }

    #[test]
    fn test_most_recent_orders_newest_first() {
        let cycles = vec![
            cycle("a", 2020, 5, 21),
            cycle("c", 2020, 7, 16),
            cycle("b", 2020, 6, 18),
        ];

        let names: Vec<_> = most_recent(cycles).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_most_recent_is_bounded() {
        let cycles: Vec<_> = (1..=15).map(|d| cycle(&d.to_string(), 2021, 1, d)).collect();

        let listed = most_recent(cycles);
        assert_eq!(listed.len(), CYCLE_LISTING_LIMIT);
        assert_eq!(listed[0].name, "15");
        assert_eq!(listed[9].name, "6");
    }

    #[test]
    fn test_cycle_serializes_date_as_iso() {
        let json = serde_json::to_value(cycle("06/18/2020", 2020, 6, 18)).unwrap();
        assert_eq!(json["date"], "2020-06-18");
        assert_eq!(json["name"], "06/18/2020");
    }
}
