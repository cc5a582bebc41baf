//! The tracker facade: sole owner of the dose ledger.
//!
//! Lifecycle is `Uninitialized -> Loading -> Ready`. [`Tracker::start`] issues
//! the load in the background and returns at once; mutations made before the
//! load has completed are rejected with [`Error::NotReady`]. A corrupted ledger
//! file leaves the tracker in `Loading` for good and [`Tracker::ready`] reports
//! [`Error::CorruptStore`].
//!
//! Every mutation builds a new ledger and publishes it on a watch channel.
//! Observers subscribe to that channel, and so does a single background
//! persister, which always saves the latest published ledger one save at a
//! time. Health-store reports are spawned per dose and never block the owner.

use crate::config::BandConfig;
use crate::ledger::{is_noop_merge, retention};
use crate::{
    Band, Config, DecayModel, Dose, DoseLedger, DoseRecord, Error, HealthRecordStore, Result,
    SaveOutcome, StoreHandle,
};
use chrono::{DateTime, Local, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Externally visible lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Loading,
    Ready,
}

/// What observers receive on every publish
#[derive(Clone, Debug)]
pub struct TrackerSnapshot {
    pub phase: Phase,
    pub ledger: Arc<DoseLedger>,
    /// Bumped once per published ledger change
    pub generation: u64,
}

/// Model and banding parameters for derived values
#[derive(Clone, Debug)]
pub struct TrackerSettings {
    pub model: DecayModel,
    pub reference_serving_mg: f64,
    pub bands: BandConfig,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl TrackerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: DecayModel::new(config.model.half_life_hours),
            reference_serving_mg: config.model.reference_serving_mg,
            bands: config.bands.clone(),
        }
    }
}

pub struct Tracker {
    state: Arc<watch::Sender<TrackerSnapshot>>,
    settled: watch::Receiver<u64>,
    loading: Option<oneshot::Receiver<Result<()>>>,
    health: Arc<dyn HealthRecordStore>,
    clock: Arc<dyn Clock>,
    settings: TrackerSettings,
    authorized: bool,
    reports: Vec<JoinHandle<()>>,
}

impl Tracker {
    /// Start a tracker on the system clock. Must be called within a Tokio runtime.
    pub fn start(
        store: StoreHandle,
        health: Arc<dyn HealthRecordStore>,
        settings: TrackerSettings,
    ) -> Self {
        Self::start_with_clock(store, health, Arc::new(SystemClock), settings)
    }

    /// Start a tracker reading time from `clock`. Must be called within a Tokio runtime.
    pub fn start_with_clock(
        store: StoreHandle,
        health: Arc<dyn HealthRecordStore>,
        clock: Arc<dyn Clock>,
        settings: TrackerSettings,
    ) -> Self {
        let (state, persisted) = watch::channel(TrackerSnapshot {
            phase: Phase::Uninitialized,
            ledger: Arc::new(DoseLedger::new()),
            generation: 0,
        });
        let state = Arc::new(state);
        let (settled_tx, settled) = watch::channel(0);

        tokio::spawn(persist_latest(persisted, store.clone(), settled_tx));

        state.send_modify(|s| s.phase = Phase::Loading);
        let (loaded_tx, loading) = oneshot::channel();
        tokio::spawn(load_ledger(
            store,
            Arc::clone(&state),
            Arc::clone(&clock),
            loaded_tx,
        ));

        Self {
            state,
            settled,
            loading: Some(loading),
            health,
            clock,
            settings,
            authorized: false,
            reports: Vec::new(),
        }
    }

    /// Wait for the initial load.
    ///
    /// Returns the load error, typically [`Error::CorruptStore`], if the
    /// ledger could not be read. The tracker never becomes ready after that.
    pub async fn ready(&mut self) -> Result<()> {
        if let Some(loading) = self.loading.take() {
            loading.await.map_err(|_| Error::StoreClosed)??;
        }
        self.ensure_ready()
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    /// The current published state
    pub fn snapshot(&self) -> TrackerSnapshot {
        self.state.borrow().clone()
    }

    /// Current ledger
    pub fn ledger(&self) -> Arc<DoseLedger> {
        Arc::clone(&self.state.borrow().ledger)
    }

    /// Receive every published state from now on
    pub fn subscribe(&self) -> watch::Receiver<TrackerSnapshot> {
        self.state.subscribe()
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.phase() == Phase::Ready {
            Ok(())
        } else {
            Err(Error::NotReady)
        }
    }

    fn publish(&self, ledger: DoseLedger) {
        self.state.send_modify(|s| {
            s.ledger = Arc::new(ledger);
            s.generation += 1;
        });
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Record a dose consumed at `at`.
    ///
    /// The new ledger is published before anything is written; the save and
    /// the health-store report run in the background. A dose pruned right
    /// away (older than 24 hours, or in the future) is not reported.
    pub fn add_dose(&mut self, amount_mg: f64, at: DateTime<Utc>) -> Result<Dose> {
        self.ensure_ready()?;
        tracing::debug!("Adding a dose of {} mg at {}", amount_mg, at);

        let dose = Dose::new(amount_mg, at);
        let ledger = self.ledger().append(dose.clone(), self.clock.now());
        let retained = ledger.contains(&dose.id);
        self.publish(ledger);

        if retained {
            self.report(HealthChange::Recorded(DoseRecord::from(&dose)));
        } else {
            tracing::debug!("Dose {} is outside the retention window", dose.id);
        }
        Ok(dose)
    }

    /// Apply doses added and removed elsewhere.
    ///
    /// Returns `false` without publishing or saving when both inputs are empty.
    pub fn apply_sync(
        &mut self,
        new_doses: Vec<Dose>,
        deleted_ids: &HashSet<Uuid>,
    ) -> Result<bool> {
        self.ensure_ready()?;
        if is_noop_merge(&new_doses, deleted_ids) {
            tracing::debug!("No doses to add or delete.");
            return Ok(false);
        }

        tracing::debug!(
            "Merging {} new and {} deleted doses",
            new_doses.len(),
            deleted_ids.len()
        );
        let ledger = self
            .ledger()
            .merge(new_doses, deleted_ids, self.clock.now());
        self.publish(ledger);
        Ok(true)
    }

    /// Remove one dose by id and mark it deleted in the health store.
    ///
    /// Returns `false`, publishing nothing, when the ledger has no such dose.
    pub fn remove_dose(&mut self, id: Uuid) -> Result<bool> {
        self.ensure_ready()?;
        if !self.ledger().contains(&id) {
            return Ok(false);
        }

        let deleted: HashSet<Uuid> = [id].into_iter().collect();
        self.apply_sync(Vec::new(), &deleted)?;
        self.report(HealthChange::Deleted(id));
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Health store
    // ------------------------------------------------------------------

    /// Request health-store access. Denial keeps the tracker local-only.
    pub async fn authorize(&mut self) -> bool {
        self.authorized = self.health.authorize().await;
        if !self.authorized {
            tracing::info!("Unable to authorize the health store; staying local-only");
        }
        self.authorized
    }

    /// Bring the ledger in line with the health store.
    ///
    /// Adds doses from the last 24 hours that the ledger does not have yet
    /// and drops doses the store has marked deleted. Returns how many doses
    /// were added; records that would be pruned straight away are not counted.
    /// Authorization or fetch failures are logged and count as zero.
    pub async fn sync_from_health(&mut self) -> Result<usize> {
        self.ensure_ready()?;
        if !self.authorize().await {
            return Ok(0);
        }

        let now = self.clock.now();
        let fetched = tokio::try_join!(
            self.health.fetch_new_doses(now - retention()),
            self.health.fetch_deleted_ids(),
        );
        let (records, deleted) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!("Failed to fetch doses from the health store: {}", e);
                return Ok(0);
            }
        };

        let ledger = self.ledger();
        let unseen: Vec<Dose> = records
            .into_iter()
            .filter(|r| !ledger.contains(&r.external_id) && !deleted.contains(&r.external_id))
            .map(Dose::from)
            .collect();
        let new_doses = DoseLedger::from_doses(unseen).prune(now).into_doses();
        let removed: HashSet<Uuid> = deleted
            .into_iter()
            .filter(|id| ledger.contains(id))
            .collect();
        let count = new_doses.len();

        if !removed.is_empty() {
            tracing::info!("Dropping {} doses deleted in the health store", removed.len());
        }
        self.apply_sync(new_doses, &removed)?;
        if count > 0 {
            tracing::info!("Synced {} new doses from the health store", count);
        }
        Ok(count)
    }

    fn report(&mut self, change: HealthChange) {
        self.reports.retain(|handle| !handle.is_finished());
        if !self.authorized {
            tracing::debug!("Health store not authorized; not reporting {}", change);
            return;
        }

        let health = Arc::clone(&self.health);
        self.reports.push(tokio::spawn(async move {
            let result = match &change {
                HealthChange::Recorded(record) => health.record_dose(record).await,
                HealthChange::Deleted(id) => health.delete_dose(*id).await,
            };
            if let Err(e) = result {
                tracing::warn!("Failed to report {} to the health store: {}", change, e);
            }
        }));
    }

    /// Wait until outstanding reports have finished and the latest published
    /// ledger has gone through the persister.
    pub async fn flush(&mut self) -> Result<()> {
        for handle in self.reports.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!("Health report task failed: {}", e);
            }
        }

        let target = self.state.borrow().generation;
        self.settled
            .wait_for(|settled| *settled >= target)
            .await
            .map_err(|_| Error::StoreClosed)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Derived values
    // ------------------------------------------------------------------

    /// Active caffeine right now, in mg
    pub fn current_level(&self) -> f64 {
        self.level_at(self.clock.now())
    }

    /// Active caffeine at `at` from doses within the 24 hours before it
    pub fn level_at(&self, at: DateTime<Utc>) -> f64 {
        self.ledger()
            .prune(at)
            .aggregate_at(&self.settings.model, at)
    }

    /// Today's intake in reference servings, with midnight in the local zone
    pub fn cups_today(&self) -> f64 {
        self.cups_as_of(&self.clock.now().with_timezone(&Local))
    }

    /// Intake since midnight of `now`'s day in `now`'s zone, in reference servings
    pub fn cups_as_of<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> f64 {
        self.ledger()
            .daily_equivalent_servings(now, self.settings.reference_serving_mg)
    }

    pub fn level_band(&self) -> Band {
        self.band_for_level(self.current_level())
    }

    pub fn cups_band(&self) -> Band {
        self.band_for_cups(self.cups_today())
    }

    pub fn band_for_level(&self, mg: f64) -> Band {
        let bands = &self.settings.bands;
        Band::classify(mg, bands.level_moderate_mg, bands.level_high_mg)
    }

    pub fn band_for_cups(&self, cups: f64) -> Band {
        let bands = &self.settings.bands;
        Band::classify(cups, bands.cups_moderate, bands.cups_high)
    }
}

/// A ledger change forwarded to the health store
#[derive(Debug)]
enum HealthChange {
    Recorded(DoseRecord),
    Deleted(Uuid),
}

impl std::fmt::Display for HealthChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthChange::Recorded(record) => write!(f, "dose {}", record.external_id),
            HealthChange::Deleted(id) => write!(f, "removal of dose {}", id),
        }
    }
}

async fn load_ledger(
    store: StoreHandle,
    state: Arc<watch::Sender<TrackerSnapshot>>,
    clock: Arc<dyn Clock>,
    done: oneshot::Sender<Result<()>>,
) {
    let result = match store.load().await {
        Ok(doses) => {
            // Loaded data may be stale relative to now
            let ledger = DoseLedger::from_doses(doses).prune(clock.now());
            state.send_modify(|s| {
                s.phase = Phase::Ready;
                s.ledger = Arc::new(ledger);
                s.generation += 1;
            });
            tracing::debug!("Tracker ready");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Unable to load the dose ledger: {}", e);
            Err(e)
        }
    };
    let _ = done.send(result);
}

/// Save each published ledger in order, skipping intermediate ones that were
/// superseded while a save was running.
async fn persist_latest(
    mut published: watch::Receiver<TrackerSnapshot>,
    store: StoreHandle,
    settled: watch::Sender<u64>,
) {
    while published.changed().await.is_ok() {
        let (generation, doses) = {
            let snapshot = published.borrow_and_update();
            if snapshot.phase != Phase::Ready {
                continue;
            }
            (snapshot.generation, snapshot.ledger.doses().to_vec())
        };

        match store.save(doses).await {
            Ok(SaveOutcome::Written) => {
                tracing::debug!("Persisted ledger generation {}", generation)
            }
            Ok(SaveOutcome::Unchanged) => {}
            Err(e) => {
                tracing::error!("Failed to persist ledger generation {}: {}", generation, e)
            }
        }
        settled.send_replace(generation);
    }
}
