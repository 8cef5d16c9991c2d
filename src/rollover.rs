//! Daily rollover of ephemeral counters.
//!
//! A snapshot's water, calories and completed-exercise marks belong to the
//! day in `lastUpdateDate`. When the engine's calendar day moves on, they are
//! reset and the date is restamped. Plans, inventory and profile data are
//! never touched.

use crate::error::{Result, StoreError};
use crate::types::Snapshot;
use chrono::{FixedOffset, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Source of the engine's current calendar day.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Wall clock read in a fixed reference time zone.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    /// Calendar days at a fixed offset east of UTC.
    pub fn with_offset_secs(secs: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(secs).ok_or_else(|| {
            StoreError::InvalidValue(format!("UTC offset out of range: {}s", secs))
        })?;
        Ok(Self { offset })
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }
}

/// Manually driven clock. Clones share the same day.
#[derive(Clone, Debug)]
pub struct FixedClock {
    day: Arc<Mutex<NaiveDate>>,
}

impl FixedClock {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day: Arc::new(Mutex::new(day)),
        }
    }

    pub fn set(&self, day: NaiveDate) {
        *self.day.lock() = day;
    }

    /// Move forward by `days`.
    pub fn advance(&self, days: u64) {
        let mut day = self.day.lock();
        if let Some(next) = day.checked_add_days(chrono::Days::new(days)) {
            *day = next;
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.day.lock()
    }
}

/// Whether the snapshot's counters belong to a day other than `today`.
pub fn is_due(snapshot: &Snapshot, today: NaiveDate) -> bool {
    snapshot.last_update_date != Some(today)
}

/// The rolled-over snapshot, or `None` if it is already current.
///
/// A date later than `today` (clock moved back, or another device in a zone
/// ahead) also counts as stale, so the stored date never runs ahead.
pub fn reconcile(snapshot: &Snapshot, today: NaiveDate) -> Option<Snapshot> {
    if !is_due(snapshot, today) {
        return None;
    }

    Some(Snapshot {
        calories: 0.0,
        water: 0.0,
        done_ex: BTreeMap::new(),
        last_update_date: Some(today),
        ..snapshot.clone()
    })
}
