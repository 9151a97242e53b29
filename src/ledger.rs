//! Runtime interval ledger.
//!
//! Tracks the spans during which the service was accepting connections and
//! answers "how long was the service up between `from` and `to`?".
//!
//! Lifecycle, driven by the binary:
//! 1. [`RuntimeLedger::reconcile_on_startup`] closes periods a crashed run left open.
//! 2. [`RuntimeLedger::open_interval`] runs once the listener is bound.
//! 3. [`RuntimeLedger::close_interval`] runs on graceful shutdown.
//!
//! The ledger itself holds no per-process state; the handle returned by
//! `open_interval` is owned by whoever drives the lifecycle.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    clock::Clock,
    models::{OperationalTimeQuery, OperationalTimeReport, PeriodView, RuntimePeriod},
    store::{RuntimePeriodStore, StoreError, StoreResult},
};

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid from/to query params")]
    InvalidWindow,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reference to the period opened by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodHandle {
    id: Uuid,
    started_at: DateTime<Utc>,
}

impl PeriodHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Resolved query window. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Window {
    /// Fills missing bounds: `from` falls back to the Unix epoch, `to` to `now`.
    pub fn resolve(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            from: from.unwrap_or(DateTime::UNIX_EPOCH),
            to: to.unwrap_or(now),
        }
    }

    pub fn from_query(
        query: &OperationalTimeQuery,
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let from = parse_bound(query.from.as_deref())?;
        let to = parse_bound(query.to.as_deref())?;
        Ok(Self::resolve(from, to, now))
    }
}

#[derive(Clone)]
pub struct RuntimeLedger {
    store: Arc<dyn RuntimePeriodStore>,
    clock: Arc<dyn Clock>,
}

impl RuntimeLedger {
    pub fn new(store: Arc<dyn RuntimePeriodStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Closes every period left open by a previous run, stamping it with the
    /// current startup time since the real crash time is unknown.
    ///
    /// Must complete before [`open_interval`](Self::open_interval). An error
    /// here means storage is unreachable and startup should abort.
    pub async fn reconcile_on_startup(&self) -> StoreResult<usize> {
        let now = self.clock.now();
        let closed = self.store.close_all_open(now).await?;

        if closed > 0 {
            info!(closed, at = %now, "closed runtime periods left open by a previous run");
        } else {
            debug!("no stale runtime periods to reconcile");
        }

        Ok(closed)
    }

    /// Records the start of this run. Failure is logged and tolerated; the
    /// service keeps running without an uptime entry.
    pub async fn open_interval(&self) -> Option<PeriodHandle> {
        let now = self.clock.now();
        match self.store.create(now).await {
            Ok(period) => {
                info!(period_id = %period.id, started_at = %period.start_time, "runtime period opened");
                Some(PeriodHandle {
                    id: period.id,
                    started_at: period.start_time,
                })
            }
            Err(err) => {
                error!(error = %err, "failed to open runtime period; uptime for this run is not recorded");
                None
            }
        }
    }

    /// Closes the period opened by this process. Safe to call with `None` or
    /// with an already closed period. Returns whether a period was closed.
    pub async fn close_interval(&self, handle: Option<&PeriodHandle>) -> bool {
        let Some(handle) = handle else {
            debug!("no runtime period to close");
            return false;
        };

        let now = self.clock.now();
        match self.store.close_one(handle.id, now).await {
            Ok(true) => {
                info!(period_id = %handle.id, ended_at = %now, "runtime period closed");
                true
            }
            Ok(false) => {
                debug!(period_id = %handle.id, "runtime period already closed");
                false
            }
            Err(err) => {
                error!(period_id = %handle.id, error = %err, "failed to close runtime period");
                false
            }
        }
    }

    /// Parses the raw query and aggregates uptime over the resulting window.
    pub async fn operational_time(
        &self,
        query: &OperationalTimeQuery,
    ) -> Result<OperationalTimeReport, LedgerError> {
        let now = self.clock.now();
        let window = Window::from_query(query, now)?;
        Ok(self.operational_time_in(window, now).await?)
    }

    pub async fn operational_time_in(
        &self,
        window: Window,
        now: DateTime<Utc>,
    ) -> StoreResult<OperationalTimeReport> {
        let periods = self
            .store
            .find_overlapping(Some(window.from), Some(window.to))
            .await?;

        let total_millis: i64 = periods
            .iter()
            .map(|period| overlap_millis(period, window, now))
            .sum();
        let total_seconds = u64::try_from(total_millis / 1_000).unwrap_or(0);

        Ok(OperationalTimeReport {
            from: window.from,
            to: window.to,
            total_seconds,
            total_human: format_duration(total_seconds),
            periods: periods.iter().map(PeriodView::from).collect(),
        })
    }
}

/// Milliseconds of `period` that fall inside `window`. An open period runs
/// until `now`. Never negative.
pub fn overlap_millis(period: &RuntimePeriod, window: Window, now: DateTime<Utc>) -> i64 {
    let start = period.start_time.max(window.from);
    let end = period.end_time.unwrap_or(now).min(window.to);
    (end - start).num_milliseconds().max(0)
}

/// Renders seconds as `"1d 2h 3m 4s"`, dropping zero units except seconds.
pub fn format_duration(total_seconds: u64) -> String {
    let days = total_seconds / SECONDS_PER_DAY;
    let hours = total_seconds % SECONDS_PER_DAY / SECONDS_PER_HOUR;
    let minutes = total_seconds % SECONDS_PER_HOUR / SECONDS_PER_MINUTE;
    let seconds = total_seconds % SECONDS_PER_MINUTE;

    let mut parts = Vec::with_capacity(4);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    parts.push(format!("{seconds}s"));
    parts.join(" ")
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.fff]` (UTC), or a bare date (UTC midnight).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

fn parse_bound(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, LedgerError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => parse_timestamp(value)
            .map(Some)
            .ok_or(LedgerError::InvalidWindow),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, store::DocumentStore};
    use async_trait::async_trait;
    use chrono::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + Duration::seconds(secs)
    }

    fn period(start: i64, end: Option<i64>) -> RuntimePeriod {
        RuntimePeriod {
            id: Uuid::new_v4(),
            start_time: at(start),
            end_time: end.map(at),
            created_at: at(start),
            updated_at: at(start),
        }
    }

    fn ledger_at(secs: i64) -> (RuntimeLedger, Arc<DocumentStore>, Arc<ManualClock>) {
        let store = Arc::new(DocumentStore::in_memory());
        let clock = Arc::new(ManualClock::at_secs(secs));
        let ledger = RuntimeLedger::new(store.clone(), clock.clone());
        (ledger, store, clock)
    }

    /// Reads a formatted duration back into seconds.
    fn parse_duration(text: &str) -> u64 {
        text.split(' ')
            .map(|token| {
                let (value, unit) = token.split_at(token.len() - 1);
                let value: u64 = value.parse().unwrap();
                match unit {
                    "d" => value * SECONDS_PER_DAY,
                    "h" => value * SECONDS_PER_HOUR,
                    "m" => value * SECONDS_PER_MINUTE,
                    "s" => value,
                    other => panic!("unexpected unit {other}"),
                }
            })
            .sum()
    }

    struct UnavailableStore;

    #[async_trait]
    impl RuntimePeriodStore for UnavailableStore {
        async fn find_open(&self) -> StoreResult<Vec<RuntimePeriod>> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn close_all_open(&self, _at: DateTime<Utc>) -> StoreResult<usize> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn create(&self, _start: DateTime<Utc>) -> StoreResult<RuntimePeriod> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn close_one(&self, _id: Uuid, _at: DateTime<Utc>) -> StoreResult<bool> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn find_overlapping(
            &self,
            _from: Option<DateTime<Utc>>,
            _to: Option<DateTime<Utc>>,
        ) -> StoreResult<Vec<RuntimePeriod>> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[test]
    fn format_duration_examples() {
        assert_eq!(format_duration(90_061), "1d 1h 1m 1s");
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(100), "1m 40s");
        assert_eq!(format_duration(3_600), "1h 0s");
        assert_eq!(format_duration(86_400 + 5), "1d 5s");
    }

    #[test]
    fn format_duration_reads_back_to_the_same_seconds() {
        let samples = (0..5_000)
            .chain([59, 60, 61, 3_599, 3_600, 86_399, 86_400, 1_000_000, u64::from(u32::MAX)]);
        for seconds in samples {
            let text = format_duration(seconds);
            assert!(text.ends_with('s'), "{text}");
            assert_eq!(parse_duration(&text), seconds, "{text}");
        }
    }

    #[test]
    fn overlap_is_bounded_by_period_and_window() {
        let now = at(1_000);
        let periods = [
            period(0, Some(100)),
            period(50, Some(60)),
            period(200, None),
            period(900, Some(950)),
            period(10, Some(10)),
        ];
        let windows = [(0, 100), (20, 80), (55, 500), (300, 400), (950, 2_000), (70, 70)];

        for p in &periods {
            let period_len = (p.end_time.unwrap_or(now) - p.start_time).num_milliseconds();
            for (from, to) in windows {
                let window = Window { from: at(from), to: at(to) };
                let window_len = (window.to - window.from).num_milliseconds();
                let overlap = overlap_millis(p, window, now);
                assert!(overlap >= 0);
                assert!(overlap <= period_len.min(window_len), "{p:?} {window:?}");
            }
        }
    }

    #[test]
    fn period_outside_window_contributes_nothing() {
        let window = Window { from: at(100), to: at(200) };
        assert_eq!(overlap_millis(&period(0, Some(50)), window, at(300)), 0);
        assert_eq!(overlap_millis(&period(250, None), window, at(300)), 0);
    }

    #[test]
    fn inverted_window_yields_zero() {
        let window = Window { from: at(100), to: at(50) };
        assert_eq!(overlap_millis(&period(0, Some(200)), window, at(300)), 0);
    }

    #[test]
    fn timestamps_parse_in_supported_shapes() {
        assert_eq!(parse_timestamp("1970-01-01T00:01:40Z"), Some(at(100)));
        assert_eq!(parse_timestamp("1970-01-01T01:01:40+01:00"), Some(at(100)));
        assert_eq!(parse_timestamp("1970-01-01T00:01:40.000"), Some(at(100)));
        assert_eq!(parse_timestamp("1970-01-02"), Some(at(86_400)));
        assert_eq!(parse_timestamp("not-a-date"), None);
        assert_eq!(parse_timestamp("2024-13-01"), None);
    }

    #[test]
    fn window_defaults_to_epoch_and_now() {
        let query = OperationalTimeQuery::default();
        let window = Window::from_query(&query, at(42)).unwrap();
        assert_eq!(window.from, DateTime::UNIX_EPOCH);
        assert_eq!(window.to, at(42));

        let blank = OperationalTimeQuery {
            from: Some("  ".into()),
            to: Some(String::new()),
        };
        assert_eq!(Window::from_query(&blank, at(42)).unwrap(), window);
    }

    #[test]
    fn unparsable_bound_is_a_validation_error() {
        let query = OperationalTimeQuery {
            from: Some("not-a-date".into()),
            to: None,
        };
        let err = Window::from_query(&query, at(0)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidWindow));
        assert_eq!(err.to_string(), "Invalid from/to query params");
    }

    #[tokio::test]
    async fn closed_period_inside_window_counts_fully() {
        let (ledger, store, _clock) = ledger_at(200);
        let p = store.create(at(0)).await.unwrap();
        store.close_one(p.id, at(100)).await.unwrap();

        let report = ledger
            .operational_time_in(Window { from: at(0), to: at(100) }, at(200))
            .await
            .unwrap();

        assert_eq!(report.total_seconds, 100);
        assert_eq!(report.total_human, "1m 40s");
        assert_eq!(
            report.periods,
            vec![PeriodView { start_time: at(0), end_time: Some(at(100)) }]
        );
    }

    #[tokio::test]
    async fn open_period_runs_until_now() {
        let (ledger, store, _clock) = ledger_at(100);
        let first = store.create(at(0)).await.unwrap();
        store.close_one(first.id, at(50)).await.unwrap();
        store.create(at(80)).await.unwrap();

        let query = OperationalTimeQuery {
            from: Some("1970-01-01T00:00:00Z".into()),
            to: Some("1970-01-01T00:01:40Z".into()),
        };
        let report = ledger.operational_time(&query).await.unwrap();

        assert_eq!(report.total_seconds, 70);
        assert_eq!(report.periods.len(), 2);
        assert_eq!(report.periods[1].end_time, None);
    }

    #[tokio::test]
    async fn partial_seconds_are_truncated() {
        let (ledger, store, _clock) = ledger_at(10);
        let p = store.create(at(0)).await.unwrap();
        store
            .close_one(p.id, at(1) + Duration::milliseconds(999))
            .await
            .unwrap();

        let report = ledger
            .operational_time_in(Window { from: at(0), to: at(10) }, at(10))
            .await
            .unwrap();
        assert_eq!(report.total_seconds, 1);
    }

    #[tokio::test]
    async fn reconcile_then_open_keeps_a_single_open_period() {
        let (ledger, store, clock) = ledger_at(0);
        let stale = store.create(at(0)).await.unwrap();

        clock.set_secs(30);
        assert_eq!(ledger.reconcile_on_startup().await.unwrap(), 1);

        let all = store.find_overlapping(None, None).await.unwrap();
        assert_eq!(all[0].id, stale.id);
        assert_eq!(all[0].end_time, Some(at(30)));

        clock.set_secs(35);
        let handle = ledger.open_interval().await.unwrap();
        assert_eq!(handle.started_at(), at(35));

        let open = store.find_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, handle.id());
        assert_eq!(open[0].start_time, at(35));
        assert_eq!(open[0].end_time, None);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let (ledger, store, clock) = ledger_at(0);
        store.create(at(0)).await.unwrap();

        clock.set_secs(10);
        assert_eq!(ledger.reconcile_on_startup().await.unwrap(), 1);
        let after_first = store.find_overlapping(None, None).await.unwrap();

        clock.set_secs(20);
        assert_eq!(ledger.reconcile_on_startup().await.unwrap(), 0);
        assert_eq!(store.find_overlapping(None, None).await.unwrap(), after_first);
    }

    #[tokio::test]
    async fn close_interval_is_idempotent() {
        let (ledger, store, clock) = ledger_at(5);
        let handle = ledger.open_interval().await;

        clock.set_secs(15);
        assert!(ledger.close_interval(handle.as_ref()).await);

        clock.set_secs(25);
        assert!(!ledger.close_interval(handle.as_ref()).await);
        assert!(!ledger.close_interval(None).await);

        let all = store.find_overlapping(None, None).await.unwrap();
        assert_eq!(all[0].end_time, Some(at(15)));
    }

    #[tokio::test]
    async fn unavailable_storage_fails_reconcile_but_not_open_or_close() {
        let ledger = RuntimeLedger::new(
            Arc::new(UnavailableStore),
            Arc::new(ManualClock::at_secs(0)),
        );

        assert!(ledger.reconcile_on_startup().await.is_err());
        assert!(ledger.open_interval().await.is_none());

        let orphan = PeriodHandle { id: Uuid::new_v4(), started_at: at(0) };
        assert!(!ledger.close_interval(Some(&orphan)).await);

        let err = ledger
            .operational_time(&OperationalTimeQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Store(_)));
    }
}
