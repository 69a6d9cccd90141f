//! Time-partition resolution
//!
//! Turns a query's time filter into inclusive partition-label bounds for
//! the index's partitioning scheme. Labels within one scheme order
//! lexicographically by time, so the metadata store can compare them
//! directly.

use chrono::{DateTime, Datelike, IsoWeek, Utc};
use squall_common::prelude::*;

/// Inclusive partition-label bounds; `None` on a side means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionBounds {
    pub min: Option<String>,
    pub max: Option<String>,
}

impl PartitionBounds {
    /// Unbounded on both sides.
    pub fn all() -> Self {
        PartitionBounds::default()
    }

    /// True when `partition` falls within the bounds.
    pub fn contains(&self, partition: &str) -> bool {
        if let Some(min) = &self.min {
            if partition < min.as_str() {
                return false;
            }
        }
        if let Some(max) = &self.max {
            if partition > max.as_str() {
                return false;
            }
        }
        true
    }
}

/// Label of the partition containing `t` under `scheme`.
pub fn partition_label(scheme: PartitionScheme, t: DateTime<Utc>) -> String {
    match scheme {
        PartitionScheme::All => "all".to_string(),
        PartitionScheme::ByDay => t.format("%Y-%m-%d").to_string(),
        PartitionScheme::ByWeek => {
            let week: IsoWeek = t.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        PartitionScheme::ByMonth => t.format("%Y-%m").to_string(),
        PartitionScheme::ByYear => format!("{}", t.year()),
    }
}

/// Resolve a time filter into partition bounds for `scheme`.
///
/// An `All` scheme has a single partition, so any time filter still
/// selects it; the bounds come back unbounded.
pub fn partition_bounds(scheme: PartitionScheme, range: &TimeRange) -> PartitionBounds {
    if scheme == PartitionScheme::All {
        return PartitionBounds::all();
    }
    PartitionBounds {
        min: range.from.map(|t| partition_label(scheme, t)),
        max: range.to.map(|t| partition_label(scheme, t)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_partition_labels() {
        let t = at(2026, 8, 7);
        assert_eq!(partition_label(PartitionScheme::All, t), "all");
        assert_eq!(partition_label(PartitionScheme::ByDay, t), "2026-08-07");
        assert_eq!(partition_label(PartitionScheme::ByMonth, t), "2026-08");
        assert_eq!(partition_label(PartitionScheme::ByYear, t), "2026");
        assert_eq!(partition_label(PartitionScheme::ByWeek, t), "2026-W32");
    }

    #[test]
    fn test_labels_order_lexicographically() {
        let a = partition_label(PartitionScheme::ByDay, at(2026, 8, 7));
        let b = partition_label(PartitionScheme::ByDay, at(2026, 11, 2));
        assert!(a < b);
    }

    #[test]
    fn test_bounds_contains() {
        let bounds = partition_bounds(
            PartitionScheme::ByDay,
            &TimeRange::between(at(2026, 8, 1), at(2026, 8, 7)),
        );
        assert!(bounds.contains("2026-08-01"));
        assert!(bounds.contains("2026-08-07"));
        assert!(!bounds.contains("2026-07-31"));
        assert!(!bounds.contains("2026-08-08"));
    }

    #[test]
    fn test_all_scheme_ignores_time_filter() {
        let bounds = partition_bounds(
            PartitionScheme::All,
            &TimeRange::between(at(2026, 8, 1), at(2026, 8, 7)),
        );
        assert!(bounds.contains("all"));
    }

    #[test]
    fn test_half_open_bounds() {
        let bounds = partition_bounds(
            PartitionScheme::ByMonth,
            &TimeRange {
                from: Some(at(2026, 3, 1)),
                to: None,
            },
        );
        assert!(!bounds.contains("2026-02"));
        assert!(bounds.contains("2027-01"));
    }
}
