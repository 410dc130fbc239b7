//! Slot polling scheduler.
//!
//! Drives the main polling loop: each cycle fetches every configured
//! location, filters the results against the user's preferences and the
//! dedup store, notifies about new slots and records them so they are never
//! reported again.
//!
//! Cycles never overlap. A cancellation request interrupts the sleep between
//! cycles immediately but lets an in-flight cycle finish, so the dedup store
//! never holds a half-recorded location.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::alerts::{message, Notifier, NotifyError, Severity};
use crate::config::Config;
use crate::error::{AppError, StoreError};
use crate::locations::LocationDirectory;
use crate::metrics::AppMetrics;
use crate::slots::{AppointmentSlot, FetchError, RawSlot, SlotFetcher, SlotFilter};
use crate::store::DedupStore;

/// Source of "now" for travel-time checks, local wall-clock.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Fetching,
    Filtering,
    Notifying,
    Recording,
    Sleeping,
    Stopped,
}

/// What happened during one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub locations_checked: usize,
    pub new_slots: Vec<AppointmentSlot>,
    pub failed_locations: Vec<(u32, FetchError)>,
    pub malformed: usize,
}

/// Published after every cycle for the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleStatus {
    pub cycles_completed: u64,
    pub last_finished_at: Option<String>,
    pub last_new_slots: usize,
    pub last_failed_locations: Vec<u32>,
}

/// Totals for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub new_slots: usize,
}

pub struct Scheduler {
    config: Config,
    filter: SlotFilter,
    fetcher: Arc<dyn SlotFetcher + Send + Sync>,
    store: Arc<dyn DedupStore + Send + Sync>,
    notifier: Notifier,
    metrics: Arc<AppMetrics>,
    directory: LocationDirectory,
    cancel: CancellationToken,
    clock: Clock,
    state: SchedulerState,
    status_tx: watch::Sender<CycleStatus>,
}

impl Scheduler {
    pub fn new(
        config: Config,
        fetcher: Arc<dyn SlotFetcher + Send + Sync>,
        store: Arc<dyn DedupStore + Send + Sync>,
        notifier: Notifier,
        metrics: Arc<AppMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        let (status_tx, _) = watch::channel(CycleStatus::default());
        Self {
            filter: SlotFilter::from_config(&config),
            config,
            fetcher,
            store,
            notifier,
            metrics,
            directory: LocationDirectory::default(),
            cancel,
            clock: Arc::new(|| Local::now().naive_local()),
            state: SchedulerState::Idle,
            status_tx,
        }
    }

    pub fn with_directory(mut self, directory: LocationDirectory) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Receiver that sees a fresh [`CycleStatus`] after each cycle.
    pub fn status(&self) -> watch::Receiver<CycleStatus> {
        self.status_tx.subscribe()
    }

    fn transition(&mut self, next: SchedulerState) {
        if self.state != next {
            tracing::trace!(from = ?self.state, to = ?next, "Scheduler state change");
            self.state = next;
        }
    }

    /// Run cycles until cancelled, or once when the retrieval interval is
    /// zero.
    ///
    /// Fetch failures never stop the loop. A dedup store failure does: it
    /// is reported once at error severity and returned.
    pub async fn run(&mut self) -> Result<RunSummary, AppError> {
        let interval = self.config.retrieval_interval;
        let mut summary = RunSummary::default();

        tracing::info!(
            locations = ?self.config.location_ids,
            interval_secs = interval.as_secs(),
            fetcher = self.fetcher.fetcher_name(),
            "Slot polling started"
        );

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Shutdown requested. Not starting a new cycle.");
                break;
            }

            let started = Instant::now();

            match self.run_cycle().await {
                Ok(report) => {
                    summary.cycles += 1;
                    summary.new_slots += report.new_slots.len();
                }
                Err(err) => {
                    tracing::error!("Dedup store failure, stopping: {}", err);
                    self.dispatch(&message::fatal(&err), Severity::Error).await;
                    self.transition(SchedulerState::Stopped);
                    return Err(err.into());
                }
            }

            if self.config.is_one_shot() {
                break;
            }

            let wait = sleep_duration(interval, started.elapsed());
            self.transition(SchedulerState::Sleeping);
            tracing::debug!(wait_secs = wait.as_secs_f64(), "Sleeping until next cycle");

            let cancel = self.cancel.clone();
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Shutdown signal received. Stopping polling.");
                    break;
                }
                _ = time::sleep(wait) => {
                    self.transition(SchedulerState::Idle);
                }
            }
        }

        self.transition(SchedulerState::Stopped);
        tracing::info!(
            cycles = summary.cycles,
            new_slots = summary.new_slots,
            "Slot polling stopped cleanly"
        );
        Ok(summary)
    }

    /// Execute a single cycle over every configured location.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, StoreError> {
        let mut report = CycleReport::default();
        let location_ids = self.config.location_ids.clone();

        for location_id in location_ids {
            report.locations_checked += 1;

            self.transition(SchedulerState::Fetching);
            let raw = match self.fetcher.fetch(location_id).await {
                Ok(raw) => raw,
                Err(err) => {
                    tracing::warn!(location_id, "Fetch failed, skipping location: {}", err);
                    self.metrics.fetch_errors_total.inc();
                    report.failed_locations.push((location_id, err));
                    continue;
                }
            };

            self.transition(SchedulerState::Filtering);
            let fetched = raw.len();
            let (raw, foreign) = split_foreign(location_id, raw);
            let seen = self.store.recorded_at(location_id).await?;
            let now = (self.clock)();
            let outcome = self.filter.filter(&raw, now, |key| seen.contains(key));

            let dropped = outcome.malformed + foreign;
            if dropped > 0 {
                self.metrics.malformed_slots_total.inc_by(dropped as f64);
                report.malformed += dropped;
            }

            tracing::debug!(
                location_id,
                fetched,
                eligible = outcome.eligible.len(),
                rejected = outcome.rejected,
                malformed = outcome.malformed,
                foreign,
                "Filtered location"
            );

            if outcome.eligible.is_empty() {
                continue;
            }

            self.transition(SchedulerState::Notifying);
            if self.config.notification_level.allows(Severity::Info) {
                let body = message::new_slots(&self.directory, location_id, &outcome.eligible);
                self.dispatch(&body, Severity::Info).await;
            }

            // Recorded whatever the delivery outcome: a missed alert is
            // preferable to a repeated one.
            self.transition(SchedulerState::Recording);
            for slot in &outcome.eligible {
                self.store.record(&slot.key()).await?;
            }

            self.metrics
                .new_slots_total
                .inc_by(outcome.eligible.len() as f64);
            report.new_slots.extend(outcome.eligible);
        }

        if !report.failed_locations.is_empty()
            && self.config.notification_level.allows(Severity::Error)
        {
            let body = message::fetch_failures(&self.directory, &report.failed_locations);
            self.dispatch(&body, Severity::Error).await;
        }

        self.metrics.cycles_total.inc();
        self.metrics.dedup_records.set(self.store.count().await? as f64);
        self.publish(&report);
        self.transition(SchedulerState::Idle);

        Ok(report)
    }

    fn publish(&self, report: &CycleReport) {
        self.status_tx.send_modify(|status| {
            status.cycles_completed += 1;
            status.last_finished_at = Some(Utc::now().to_rfc3339());
            status.last_new_slots = report.new_slots.len();
            status.last_failed_locations = report
                .failed_locations
                .iter()
                .map(|(location_id, _)| *location_id)
                .collect();
        });
    }

    /// Hand a message to the notifier. Delivery problems are logged and
    /// counted, never propagated.
    async fn dispatch(&self, body: &str, severity: Severity) {
        self.metrics.notification_sent(severity);

        match self.notifier.send(body, severity).await {
            Ok(report) if report.is_partial() => {
                tracing::warn!(
                    delivered = report.delivered,
                    failed = report.failures.len(),
                    "Notification partially delivered"
                );
            }
            Ok(_) => {}
            Err(NotifyError::AllFailed { failures }) => {
                self.metrics.notification_failures_total.inc();
                tracing::error!(
                    targets = failures.len(),
                    "No notification target accepted the message"
                );
            }
            Err(err) => {
                self.metrics.notification_failures_total.inc();
                tracing::error!("Notification could not be sent: {}", err);
            }
        }
    }
}

/// Keep only records tagged with the location that was asked for.
///
/// The dedup lookup, the message label and the recorded key all use
/// `location_id`, so a record carrying any other id is a data-quality drop.
/// Returns the kept records and how many were dropped.
fn split_foreign(location_id: u32, raw: Vec<RawSlot>) -> (Vec<RawSlot>, usize) {
    let total = raw.len();
    let own: Vec<RawSlot> = raw
        .into_iter()
        .filter(|slot| {
            let matches = slot.location_id == location_id;
            if !matches {
                tracing::debug!(
                    requested = location_id,
                    tagged = slot.location_id,
                    "Dropping slot record tagged with another location"
                );
            }
            matches
        })
        .collect();
    let foreign = total - own.len();
    (own, foreign)
}

/// Time left until the next cycle should start, never negative.
pub fn sleep_duration(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use async_trait::async_trait;

    use crate::alerts::recording::RecordingTarget;
    use crate::config::NotificationLevel;
    use crate::services::mock::MockSlotFetcher;
    use crate::slots::{RawSlot, SlotKey};
    use crate::store::MemoryDedupStore;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").unwrap()
    }

    fn slot(location_id: u32, s: &str) -> AppointmentSlot {
        AppointmentSlot::new(location_id, at(s))
    }

    fn config(location_ids: &[u32], interval: Duration) -> Config {
        Config {
            location_ids: location_ids.to_vec(),
            retrieval_interval: interval,
            ..Config::default()
        }
    }

    struct Harness {
        fetcher: Arc<MockSlotFetcher>,
        store: Arc<MemoryDedupStore>,
        target: Arc<RecordingTarget>,
        metrics: Arc<AppMetrics>,
        cancel: CancellationToken,
    }

    impl Harness {
        fn new(fetcher: MockSlotFetcher) -> Self {
            Self {
                fetcher: Arc::new(fetcher),
                store: Arc::new(MemoryDedupStore::new()),
                target: Arc::new(RecordingTarget::new("recorder")),
                metrics: Arc::new(AppMetrics::new().unwrap()),
                cancel: CancellationToken::new(),
            }
        }

        fn scheduler(&self, config: Config) -> Scheduler {
            Scheduler::new(
                config,
                self.fetcher.clone(),
                self.store.clone(),
                Notifier::new().with_target(self.target.clone()),
                self.metrics.clone(),
                self.cancel.clone(),
            )
            .with_clock(Arc::new(|| at("2024-01-01T00:00")))
        }
    }

    /// Store whose medium is gone.
    struct BrokenStore;

    #[async_trait]
    impl DedupStore for BrokenStore {
        async fn contains(&self, _: &SlotKey) -> Result<bool, StoreError> {
            Err(StoreError::Poisoned)
        }
        async fn record(&self, _: &SlotKey) -> Result<bool, StoreError> {
            Err(StoreError::Poisoned)
        }
        async fn recorded_at(&self, _: u32) -> Result<HashSet<SlotKey>, StoreError> {
            Err(StoreError::Poisoned)
        }
        async fn count(&self) -> Result<u64, StoreError> {
            Err(StoreError::Poisoned)
        }
        async fn clear(&self) -> Result<u64, StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    /// Fetcher that requests shutdown while one location is being fetched.
    struct CancelOnFetch {
        inner: MockSlotFetcher,
        trigger: u32,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl SlotFetcher for CancelOnFetch {
        async fn fetch(&self, location_id: u32) -> Result<Vec<RawSlot>, FetchError> {
            if location_id == self.trigger {
                self.cancel.cancel();
            }
            self.inner.fetch(location_id).await
        }

        fn fetcher_name(&self) -> &str {
            "cancel-on-fetch"
        }
    }

    #[test]
    fn sleep_duration_subtracts_elapsed_and_floors_at_zero() {
        let minute = Duration::from_secs(60);
        assert_eq!(sleep_duration(minute, Duration::from_secs(15)), Duration::from_secs(45));
        assert_eq!(sleep_duration(minute, Duration::from_secs(90)), Duration::ZERO);
        assert_eq!(sleep_duration(Duration::ZERO, Duration::from_secs(1)), Duration::ZERO);
    }

    #[tokio::test]
    async fn same_slot_is_notified_only_once_across_cycles() {
        let h = Harness::new(
            MockSlotFetcher::new().with_slots(5140, &[slot(5140, "2024-02-01T08:00")]),
        );
        let mut scheduler = h.scheduler(config(&[5140], Duration::ZERO));

        let first = scheduler.run_cycle().await.unwrap();
        let second = scheduler.run_cycle().await.unwrap();
        let third = scheduler.run_cycle().await.unwrap();

        assert_eq!(first.new_slots.len(), 1);
        assert!(second.new_slots.is_empty());
        assert!(third.new_slots.is_empty());
        assert_eq!(h.target.sent_with(Severity::Info).len(), 1);
        assert_eq!(h.fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn later_new_slot_is_notified_without_repeating_old_one() {
        let h = Harness::new(
            MockSlotFetcher::new().with_slots(5140, &[slot(5140, "2024-02-01T08:00")]),
        );
        let mut scheduler = h.scheduler(config(&[5140], Duration::ZERO));
        scheduler.run_cycle().await.unwrap();

        h.fetcher.set(
            5140,
            Ok(vec![
                RawSlot::new(5140, "2024-02-01T08:00"),
                RawSlot::new(5140, "2024-02-03T09:30"),
            ]),
        );
        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(report.new_slots, vec![slot(5140, "2024-02-03T09:30")]);
        let info = h.target.sent_with(Severity::Info);
        assert_eq!(info.len(), 2);
        assert!(info[1].contains("[09:30 AM]"));
        assert!(!info[1].contains("08:00 AM"));
    }

    #[tokio::test]
    async fn slot_tagged_with_other_location_is_never_announced() {
        let h = Harness::new(
            MockSlotFetcher::new().with_raw(1, vec![RawSlot::new(2, "2024-02-01T08:00")]),
        );
        let mut scheduler = h.scheduler(config(&[1], Duration::ZERO));

        for _ in 0..3 {
            let report = scheduler.run_cycle().await.unwrap();
            assert!(report.new_slots.is_empty());
            assert_eq!(report.malformed, 1);
        }

        assert!(h.target.sent().is_empty());
        assert_eq!(h.store.count().await.unwrap(), 0);
        assert!((h.metrics.malformed_slots_total.get() - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn message_label_and_recorded_key_name_the_same_location() {
        let h = Harness::new(MockSlotFetcher::new().with_raw(
            1,
            vec![
                RawSlot::new(1, "2024-02-01T08:00"),
                RawSlot::new(2, "2024-02-01T09:00"),
            ],
        ));
        let mut scheduler = h.scheduler(config(&[1], Duration::ZERO));

        scheduler.run_cycle().await.unwrap();
        scheduler.run_cycle().await.unwrap();

        let info = h.target.sent_with(Severity::Info);
        assert_eq!(info.len(), 1);
        assert!(info[0].starts_with("New appointment(s) found for Location 1\n"));
        assert!(!info[0].contains("09:00 AM"));

        let recorded = h.store.recorded_at(1).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert!(recorded.contains(&slot(1, "2024-02-01T08:00").key()));
        assert!(h.store.recorded_at(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_fetch_failure_still_processes_other_locations() {
        let h = Harness::new(
            MockSlotFetcher::new()
                .with_slots(1, &[slot(1, "2024-02-01T08:00")])
                .with_error(2, FetchError::Status { status: 503 })
                .with_slots(3, &[slot(3, "2024-02-01T08:00")]),
        );
        let mut scheduler = h.scheduler(config(&[1, 2, 3], Duration::ZERO));

        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(report.locations_checked, 3);
        assert_eq!(report.new_slots.len(), 2);
        assert_eq!(report.failed_locations.len(), 1);
        assert_eq!(report.failed_locations[0].0, 2);

        assert_eq!(h.target.sent_with(Severity::Info).len(), 2);
        let errors = h.target.sent_with(Severity::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Location 2"));
        assert!(!errors[0].contains("Location 1"));

        assert!(h.store.contains(&slot(1, "2024-02-01T08:00").key()).await.unwrap());
        assert!(h.store.contains(&slot(3, "2024-02-01T08:00").key()).await.unwrap());
        assert!((h.metrics.fetch_errors_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn level_two_suppresses_new_slot_messages() {
        let h = Harness::new(
            MockSlotFetcher::new().with_slots(5140, &[slot(5140, "2024-02-01T08:00")]),
        );
        let mut cfg = config(&[5140], Duration::ZERO);
        cfg.notification_level = NotificationLevel::Error;
        let mut scheduler = h.scheduler(cfg);

        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(report.new_slots.len(), 1);
        assert!(h.target.sent().is_empty());
        // Still recorded so switching levels later does not replay it.
        assert_eq!(h.store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn level_one_sends_exactly_one_message_for_one_slot() {
        let h = Harness::new(
            MockSlotFetcher::new().with_slots(5140, &[slot(5140, "2024-02-01T08:00")]),
        );
        let mut scheduler = h.scheduler(config(&[5140], Duration::ZERO));

        scheduler.run_cycle().await.unwrap();

        assert_eq!(h.target.sent().len(), 1);
    }

    #[tokio::test]
    async fn level_two_still_reports_fetch_errors() {
        let h = Harness::new(MockSlotFetcher::new().with_error(1, FetchError::network("down")));
        let mut cfg = config(&[1], Duration::ZERO);
        cfg.notification_level = NotificationLevel::Error;
        let mut scheduler = h.scheduler(cfg);

        scheduler.run_cycle().await.unwrap();

        assert_eq!(h.target.sent_with(Severity::Error).len(), 1);
    }

    #[tokio::test]
    async fn failed_delivery_still_records_slot() {
        let fetcher = Arc::new(
            MockSlotFetcher::new().with_slots(5140, &[slot(5140, "2024-02-01T08:00")]),
        );
        let store = Arc::new(MemoryDedupStore::new());
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let mut scheduler = Scheduler::new(
            config(&[5140], Duration::ZERO),
            fetcher,
            store.clone(),
            Notifier::new().with_target(Arc::new(RecordingTarget::failing("down"))),
            metrics.clone(),
            CancellationToken::new(),
        )
        .with_clock(Arc::new(|| at("2024-01-01T00:00")));

        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(report.new_slots.len(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!((metrics.notification_failures_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn malformed_records_are_counted_not_reported() {
        let h = Harness::new(MockSlotFetcher::new().with_raw(
            1,
            vec![RawSlot::missing_time(1), RawSlot::new(1, "2024-02-01T08:00")],
        ));
        let mut scheduler = h.scheduler(config(&[1], Duration::ZERO));

        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(report.malformed, 1);
        assert_eq!(report.new_slots.len(), 1);
        assert!(h.target.sent_with(Severity::Error).is_empty());
        assert!((h.metrics.malformed_slots_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn one_shot_run_performs_single_cycle_and_stops() {
        let h = Harness::new(
            MockSlotFetcher::new().with_slots(5140, &[slot(5140, "2024-02-01T08:00")]),
        );
        let mut scheduler = h.scheduler(config(&[5140, 5446], Duration::ZERO));

        let summary = scheduler.run().await.unwrap();

        assert_eq!(summary, RunSummary { cycles: 1, new_slots: 1 });
        assert_eq!(h.fetcher.calls(), 2);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn empty_location_set_is_a_quiet_noop() {
        let h = Harness::new(MockSlotFetcher::new());
        let mut scheduler = h.scheduler(config(&[], Duration::ZERO));

        let summary = scheduler.run().await.unwrap();

        assert_eq!(summary.cycles, 1);
        assert_eq!(h.fetcher.calls(), 0);
        assert!(h.target.sent().is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_fatal_and_reported_once() {
        let fetcher = Arc::new(
            MockSlotFetcher::new().with_slots(1, &[slot(1, "2024-02-01T08:00")]),
        );
        let target = Arc::new(RecordingTarget::new("recorder"));
        let mut scheduler = Scheduler::new(
            config(&[1, 2], Duration::from_secs(60)),
            fetcher.clone(),
            Arc::new(BrokenStore),
            Notifier::new().with_target(target.clone()),
            Arc::new(AppMetrics::new().unwrap()),
            CancellationToken::new(),
        );

        let result = scheduler.run().await;

        assert!(matches!(result, Err(AppError::Store(_))));
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(fetcher.calls(), 1);
        let errors = target.sent_with(Severity::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Scheduler stopped"));
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_no_cycle() {
        let h = Harness::new(MockSlotFetcher::new());
        let mut scheduler = h.scheduler(config(&[1], Duration::from_secs(60)));
        h.cancel.cancel();

        let summary = scheduler.run().await.unwrap();

        assert_eq!(summary.cycles, 0);
        assert_eq!(h.fetcher.calls(), 0);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn repeats_on_interval_and_stops_promptly_when_cancelled() {
        let h = Harness::new(MockSlotFetcher::new());
        let mut scheduler = h.scheduler(config(&[1], Duration::from_secs(60)));
        let cancel = h.cancel.clone();

        let task = tokio::spawn(async move {
            let summary = scheduler.run().await;
            (summary, scheduler.state())
        });

        // Cycles at t = 0s, 60s, 120s; the cancel lands mid-sleep.
        time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();

        let (summary, state) = time::timeout(Duration::from_secs(1), task)
            .await
            .expect("scheduler should stop promptly")
            .unwrap();

        assert_eq!(summary.unwrap().cycles, 3);
        assert_eq!(state, SchedulerState::Stopped);
        assert_eq!(h.fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_cycle_finishes_that_cycle_then_stops() {
        let cancel = CancellationToken::new();
        let fetcher = Arc::new(CancelOnFetch {
            inner: MockSlotFetcher::new()
                .with_slots(1, &[slot(1, "2024-02-01T08:00")])
                .with_slots(2, &[slot(2, "2024-02-01T08:00")])
                .with_slots(3, &[slot(3, "2024-02-01T08:00")]),
            trigger: 2,
            cancel: cancel.clone(),
        });
        let store = Arc::new(MemoryDedupStore::new());
        let target = Arc::new(RecordingTarget::new("recorder"));
        let mut scheduler = Scheduler::new(
            config(&[1, 2, 3], Duration::from_secs(60)),
            fetcher.clone(),
            store.clone(),
            Notifier::new().with_target(target.clone()),
            Arc::new(AppMetrics::new().unwrap()),
            cancel.clone(),
        )
        .with_clock(Arc::new(|| at("2024-01-01T00:00")));

        let summary = time::timeout(Duration::from_secs(1), scheduler.run())
            .await
            .expect("scheduler should stop without waiting out the interval")
            .unwrap();

        assert_eq!(summary, RunSummary { cycles: 1, new_slots: 3 });
        assert_eq!(fetcher.inner.calls(), 3);
        assert_eq!(store.count().await.unwrap(), 3);
        for location_id in [1, 2, 3] {
            assert!(store.contains(&slot(location_id, "2024-02-01T08:00").key()).await.unwrap());
        }
        assert_eq!(target.sent_with(Severity::Info).len(), 3);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn status_is_published_after_each_cycle() {
        let h = Harness::new(MockSlotFetcher::new().with_error(9, FetchError::network("down")));
        let mut scheduler = h.scheduler(config(&[9], Duration::ZERO));
        let status = scheduler.status();

        scheduler.run_cycle().await.unwrap();

        let current = status.borrow().clone();
        assert_eq!(current.cycles_completed, 1);
        assert_eq!(current.last_failed_locations, vec![9]);
        assert!(current.last_finished_at.is_some());
    }

    #[tokio::test]
    async fn directory_names_appear_in_messages() {
        let h = Harness::new(
            MockSlotFetcher::new().with_slots(5020, &[slot(5020, "2024-02-01T08:00")]),
        );
        let mut scheduler = h
            .scheduler(config(&[5020], Duration::ZERO))
            .with_directory(LocationDirectory::new().with_name(5020, "Blaine NEXUS"));

        scheduler.run_cycle().await.unwrap();

        assert!(h.target.sent()[0].0.contains("Blaine NEXUS (5020)"));
    }
}
