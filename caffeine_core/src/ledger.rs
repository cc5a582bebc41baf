//! In-memory dose ledger with a 24-hour retention window.
//!
//! Every mutating operation returns a new, sorted and pruned ledger; the
//! receiver is never modified, so readers holding the previous ledger never
//! see a half-applied change.

use crate::{DecayModel, Dose};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// How long a dose is retained after it was consumed
pub fn retention() -> Duration {
    Duration::hours(24)
}

/// Doses ordered by `consumed_at`, oldest first
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DoseLedger {
    doses: Vec<Dose>,
}

impl DoseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from doses in any order. No pruning is applied.
    pub fn from_doses(mut doses: Vec<Dose>) -> Self {
        sort_by_time(&mut doses);
        Self { doses }
    }

    pub fn doses(&self) -> &[Dose] {
        &self.doses
    }

    pub fn into_doses(self) -> Vec<Dose> {
        self.doses
    }

    pub fn len(&self) -> usize {
        self.doses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doses.is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.doses.iter().any(|d| &d.id == id)
    }

    /// Add one dose, then sort and prune relative to `now`.
    ///
    /// The amount is not validated.
    pub fn append(&self, dose: Dose, now: DateTime<Utc>) -> Self {
        let mut doses = self.doses.clone();
        doses.push(dose);
        sort_by_time(&mut doses);
        Self { doses }.prune(now)
    }

    /// Drop every dose whose id is in `removals`, add `additions`, then sort
    /// and prune relative to `now`.
    ///
    /// With nothing to add or remove the ledger is returned as is, without
    /// pruning; callers use [`is_noop_merge`] to skip publishing entirely.
    pub fn merge(
        &self,
        additions: Vec<Dose>,
        removals: &HashSet<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        if is_noop_merge(&additions, removals) {
            return self.clone();
        }

        let mut doses: Vec<Dose> = self
            .doses
            .iter()
            .filter(|d| !removals.contains(&d.id))
            .cloned()
            .collect();
        doses.extend(additions);
        sort_by_time(&mut doses);
        Self { doses }.prune(now)
    }

    /// Keep only doses consumed within `[now - 24h, now]`
    pub fn prune(&self, now: DateTime<Utc>) -> Self {
        let oldest = now - retention();
        let before = self.doses.len();
        let doses: Vec<Dose> = self
            .doses
            .iter()
            .filter(|d| d.consumed_at >= oldest && d.consumed_at <= now)
            .cloned()
            .collect();

        let dropped = before - doses.len();
        if dropped > 0 {
            tracing::debug!("Pruned {} doses outside the retention window", dropped);
        }
        Self { doses }
    }

    /// Caffeine still active at `at`, summed over every retained dose
    pub fn aggregate_at(&self, model: &DecayModel, at: DateTime<Utc>) -> f64 {
        model.total(&self.doses, at)
    }

    /// Total intake since local midnight of `now`, in reference servings.
    ///
    /// Uses the undecayed amounts; `now`'s time zone decides where midnight is.
    /// A dose logged exactly at midnight belongs to the day before.
    pub fn daily_equivalent_servings<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        reference_serving_mg: f64,
    ) -> f64 {
        let midnight = start_of_day(now);
        let total_mg: f64 = self
            .doses
            .iter()
            .filter(|d| d.consumed_at > midnight)
            .map(|d| d.amount_mg)
            .sum();
        total_mg / reference_serving_mg
    }
}

/// True when a merge would neither add nor remove anything
pub fn is_noop_merge(additions: &[Dose], removals: &HashSet<Uuid>) -> bool {
    additions.is_empty() && removals.is_empty()
}

fn sort_by_time(doses: &mut [Dose]) {
    // Stable, so doses sharing a timestamp keep insertion order
    doses.sort_by_key(|d| d.consumed_at);
}

/// Midnight at the start of `now`'s local day, as UTC
fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    match now.timezone().from_local_datetime(&midnight).earliest() {
        Some(start) => start.with_timezone(&Utc),
        // Midnight skipped by a DST jump: count back from the wall clock instead
        None => {
            let since_midnight = Duration::seconds(i64::from(now.num_seconds_from_midnight()));
            now.with_timezone(&Utc) - since_midnight
        }
    }
}
