//! The snapshot document and the row normalizer.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::RawInstrument;

/// One instrument entry in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentRecord {
    pub name: String,
    /// Industry classification, empty when the provider has none.
    #[serde(default)]
    pub industry: String,
    pub market: String,
}

/// The persisted instrument list for one calendar day.
///
/// Instruments are keyed by identifier and kept in ascending order so that
/// consecutive snapshots diff cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredSnapshot")]
pub struct Snapshot {
    pub date: NaiveDate,
    pub timestamp: DateTime<FixedOffset>,
    pub count: usize,
    pub instruments: BTreeMap<String, InstrumentRecord>,
}

/// Snapshot as found on disk.
///
/// Files from the older job use the key `stocks`, carry a timestamp with no
/// UTC offset, and count raw rows including duplicates.
#[derive(Deserialize)]
struct StoredSnapshot {
    date: NaiveDate,
    timestamp: StoredTimestamp,
    count: usize,
    #[serde(default)]
    instruments: Option<BTreeMap<String, InstrumentRecord>>,
    #[serde(default)]
    stocks: Option<BTreeMap<String, InstrumentRecord>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredTimestamp {
    Offset(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl StoredTimestamp {
    /// A naive timestamp is read as machine-local time.
    fn with_offset(self) -> DateTime<FixedOffset> {
        match self {
            StoredTimestamp::Offset(ts) => ts,
            StoredTimestamp::Naive(naive) => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|ts| ts.fixed_offset())
                .unwrap_or_else(|| naive.and_utc().fixed_offset()),
        }
    }
}

impl TryFrom<StoredSnapshot> for Snapshot {
    type Error = String;

    fn try_from(stored: StoredSnapshot) -> Result<Self, Self::Error> {
        let (instruments, count) = match (stored.instruments, stored.stocks) {
            (Some(instruments), _) => (instruments, stored.count),
            (None, Some(stocks)) => {
                let count = stocks.len();
                (stocks, count)
            }
            (None, None) => return Err("missing field `instruments`".to_string()),
        };

        Ok(Self {
            date: stored.date,
            timestamp: stored.timestamp.with_offset(),
            count,
            instruments,
        })
    }
}

impl Snapshot {
    /// Build a snapshot from raw provider rows.
    ///
    /// Duplicate identifiers resolve to the last row seen. `count` is taken
    /// from the resulting map and `date` from `now`'s calendar day.
    pub fn from_rows(rows: &[RawInstrument], market: &str, now: DateTime<FixedOffset>) -> Self {
        let mut instruments = BTreeMap::new();
        for row in rows {
            instruments.insert(
                row.stock_id.clone(),
                InstrumentRecord {
                    name: row.stock_name.clone(),
                    industry: row.industry_category.clone().unwrap_or_default(),
                    market: market.to_string(),
                },
            );
        }

        Self {
            date: now.date_naive(),
            timestamp: now,
            count: instruments.len(),
            instruments,
        }
    }

    /// Check the document's internal invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.count != self.instruments.len() {
            return Err(format!(
                "count {} does not match {} instruments",
                self.count,
                self.instruments.len()
            ));
        }
        if self.timestamp.date_naive() != self.date {
            return Err(format!(
                "date {} does not match timestamp {}",
                self.date, self.timestamp
            ));
        }
        Ok(())
    }

    /// First `n` entries in key order.
    pub fn preview(&self, n: usize) -> impl Iterator<Item = (&str, &InstrumentRecord)> {
        self.instruments
            .iter()
            .take(n)
            .map(|(id, record)| (id.as_str(), record))
    }
}
