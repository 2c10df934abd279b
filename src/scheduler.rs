//! Periodic run scheduling.
//!
//! A single ticker thread wakes up on each cadence boundary and hands the run
//! to a worker thread. At most one run is in flight at any time: a tick that
//! fires while a run is still executing is skipped and counted, never queued.
//! Stopping the scheduler stops future ticks only; an in-flight run finishes
//! and is recorded.

use crate::logging::{self, DataSource};
use crate::model::{RunError, RunSummary};
use crate::monitor::{Monitor, RunReport};
use crate::persist::PersistOutcome;
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Timelike, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Cadence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum CadenceKind {
    /// Fire at these minutes past every hour (sorted, deduplicated).
    Minutes(Vec<u32>),
    /// Fire at every multiple of the interval since the Unix epoch.
    Interval(Duration),
}

/// When runs fire.
///
/// Accepts a five-field cron expression whose minute field is `*`, `*/N`,
/// a single minute or a comma list, with the remaining fields `*`; or the
/// shorthands `every Nm` and `every Ns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cadence {
    expr: String,
    kind: CadenceKind,
}

impl Cadence {
    pub fn parse(expr: &str) -> Result<Self, String> {
        let trimmed = expr.trim();
        let kind = match trimmed.strip_prefix("every ") {
            Some(rest) => parse_interval(rest.trim())?,
            None => parse_cron(trimmed)?,
        };
        Ok(Self {
            expr: trimmed.to_string(),
            kind,
        })
    }

    /// Every `minutes` minutes, aligned to the top of the hour.
    pub fn every_minutes(minutes: u32) -> Result<Self, String> {
        Self::parse(&format!("*/{} * * * *", minutes))
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First firing time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match &self.kind {
            CadenceKind::Minutes(minutes) => {
                let floor = now
                    .duration_trunc(ChronoDuration::minutes(1))
                    .unwrap_or(now);
                let mut candidate = floor + ChronoDuration::minutes(1);
                // Every minute list is non-empty, so one hour always has a hit
                for _ in 0..60 {
                    if minutes.contains(&candidate.minute()) {
                        return candidate;
                    }
                    candidate += ChronoDuration::minutes(1);
                }
                candidate
            }
            CadenceKind::Interval(interval) => {
                let step = interval.as_secs().max(1) as i64;
                let next = (now.timestamp().div_euclid(step) + 1) * step;
                DateTime::from_timestamp(next, 0)
                    .or_else(|| ChronoDuration::try_seconds(step).and_then(|d| now.checked_add_signed(d)))
                    .unwrap_or(now)
            }
        }
    }
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expr)
    }
}

/// Longest accepted `every` interval.
const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

fn parse_interval(raw: &str) -> Result<CadenceKind, String> {
    if raw.is_empty() || !raw.is_ascii() {
        return Err(format!("invalid interval '{}'", raw));
    }
    let (digits, unit) = raw.split_at(raw.len().saturating_sub(1));
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid interval '{}'", raw))?;
    if value == 0 {
        return Err("interval must be positive".to_string());
    }
    let seconds = match unit {
        "s" => Some(value),
        "m" => value.checked_mul(60),
        _ => return Err(format!("interval '{}' must end in 's' or 'm'", raw)),
    };
    let seconds = match seconds {
        Some(s) if s <= MAX_INTERVAL_SECS => s,
        _ => return Err(format!("interval '{}' exceeds 24h", raw)),
    };
    Ok(CadenceKind::Interval(Duration::from_secs(seconds)))
}

fn parse_cron(raw: &str) -> Result<CadenceKind, String> {
    let fields: Vec<&str> = raw.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!("expected 5 cron fields, got {} in '{}'", fields.len(), raw));
    }
    if let Some(field) = fields[1..].iter().find(|f| **f != "*") {
        return Err(format!(
            "only the minute field may be restricted, found '{}' in '{}'",
            field, raw
        ));
    }

    let minute = fields[0];
    let mut minutes: Vec<u32> = if minute == "*" {
        (0..60).collect()
    } else if let Some(step) = minute.strip_prefix("*/") {
        let step: u32 = step
            .parse()
            .map_err(|_| format!("invalid minute step '{}'", minute))?;
        if !(1..=59).contains(&step) {
            return Err(format!("minute step must be 1-59, got {}", step));
        }
        (0..60).step_by(step as usize).collect()
    } else {
        minute
            .split(',')
            .map(|m| match m.parse::<u32>() {
                Ok(v) if v < 60 => Ok(v),
                _ => Err(format!("invalid minute '{}'", m)),
            })
            .collect::<Result<_, _>>()?
    };
    minutes.sort_unstable();
    minutes.dedup();
    Ok(CadenceKind::Minutes(minutes))
}

// ---------------------------------------------------------------------------
// Run execution and bookkeeping
// ---------------------------------------------------------------------------

/// Something that can perform one monitoring run.
pub trait RunExecutor: Send + Sync {
    fn execute(&self, threshold_mm_per_hour: f64) -> Result<RunReport, RunError>;
}

impl RunExecutor for Monitor {
    fn execute(&self, threshold_mm_per_hour: f64) -> Result<RunReport, RunError> {
        self.run_once(threshold_mm_per_hour)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub category: String,
    pub message: String,
}

/// How one run ended, as reported in status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub summary: Option<RunSummary>,
    pub record_id: Option<i64>,
    /// The run succeeded but its record failed validation and was not stored.
    pub persistence_rejected: bool,
    pub error: Option<ErrorSummary>,
}

impl RunOutcome {
    fn from_result(
        started_at: DateTime<Utc>,
        duration_ms: u64,
        result: &Result<RunReport, RunError>,
    ) -> Self {
        match result {
            Ok(report) => {
                let (record_id, persistence_rejected) = match &report.persistence {
                    PersistOutcome::Stored { record_id, .. } => (Some(*record_id), false),
                    PersistOutcome::Rejected(_) => (None, true),
                };
                Self {
                    started_at,
                    duration_ms,
                    success: true,
                    summary: Some(report.summary),
                    record_id,
                    persistence_rejected,
                    error: None,
                }
            }
            Err(e) => Self {
                started_at,
                duration_ms,
                success: false,
                summary: None,
                record_id: None,
                persistence_rejected: false,
                error: Some(ErrorSummary {
                    category: e.category().to_string(),
                    message: e.to_string(),
                }),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatistics {
    pub success_count: u64,
    pub error_count: u64,
    /// Ticks dropped because a run was still in flight.
    pub skipped_ticks: u64,
    pub rejected_records: u64,
    pub last_run: Option<RunOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub run_in_flight: bool,
    pub cadence: Option<String>,
    pub threshold_mm_per_hour: f64,
    pub next_run_at: Option<DateTime<Utc>>,
    pub stats: RunStatistics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a monitoring run is already in flight")]
pub struct SchedulerBusy;

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct SharedState {
    cadence: Option<Cadence>,
    threshold_mm_per_hour: f64,
    next_run_at: Option<DateTime<Utc>>,
    stats: RunStatistics,
}

struct Shared {
    executor: Arc<dyn RunExecutor>,
    in_flight: AtomicBool,
    state: Mutex<SharedState>,
    idle: Condvar,
}

/// Releases the in-flight slot when a run ends, even if it panicked.
struct InFlightGuard<'a> {
    shared: &'a Shared,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let _state = self.shared.lock_state();
        self.shared.in_flight.store(false, Ordering::SeqCst);
        self.shared.idle.notify_all();
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_claim(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlightGuard { shared: self })
    }

    fn threshold(&self) -> f64 {
        self.lock_state().threshold_mm_per_hour
    }

    /// Runs once and folds the result into the statistics. The caller holds
    /// the in-flight slot.
    fn execute_and_record(&self, threshold_mm_per_hour: f64) -> RunOutcome {
        let started_at = Utc::now();
        let clock = Instant::now();
        let result = self.executor.execute(threshold_mm_per_hour);
        let outcome = RunOutcome::from_result(started_at, clock.elapsed().as_millis() as u64, &result);

        match &outcome.error {
            None => logging::info(
                DataSource::Scheduler,
                None,
                &format!("Run finished in {} ms", outcome.duration_ms),
            ),
            Some(e) => logging::error(
                DataSource::Scheduler,
                None,
                &format!("Run failed [{}]: {}", e.category, e.message),
            ),
        }

        let mut state = self.lock_state();
        if outcome.success {
            state.stats.success_count += 1;
        } else {
            state.stats.error_count += 1;
        }
        if outcome.persistence_rejected {
            state.stats.rejected_records += 1;
        }
        state.stats.last_run = Some(outcome.clone());
        outcome
    }

    /// One cadence tick: start a run on a worker thread, or skip if busy.
    fn tick(self: &Arc<Self>) {
        if self.in_flight.load(Ordering::SeqCst) {
            self.skip_tick();
            return;
        }
        let threshold = self.threshold();
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("rainmon-run".to_string())
            .spawn(move || match shared.try_claim() {
                Some(_guard) => {
                    shared.execute_and_record(threshold);
                }
                None => shared.skip_tick(),
            });
        if let Err(e) = spawned {
            logging::error(
                DataSource::Scheduler,
                None,
                &format!("Cannot spawn run thread: {}", e),
            );
        }
    }

    fn skip_tick(&self) {
        self.lock_state().stats.skipped_ticks += 1;
        logging::warn(
            DataSource::Scheduler,
            None,
            "Tick skipped: previous run still in flight",
        );
    }
}

struct Ticker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the periodic timer and the run statistics. Constructed once at
/// start-up; dropping it stops the timer.
pub struct Scheduler {
    shared: Arc<Shared>,
    ticker: Mutex<Option<Ticker>>,
}

impl Scheduler {
    pub fn new(executor: Arc<dyn RunExecutor>, threshold_mm_per_hour: f64) -> Self {
        Self {
            shared: Arc::new(Shared {
                executor,
                in_flight: AtomicBool::new(false),
                state: Mutex::new(SharedState {
                    cadence: None,
                    threshold_mm_per_hour,
                    next_run_at: None,
                    stats: RunStatistics::default(),
                }),
                idle: Condvar::new(),
            }),
            ticker: Mutex::new(None),
        }
    }

    fn lock_ticker(&self) -> MutexGuard<'_, Option<Ticker>> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts ticking on `cadence`. Returns `false` (and changes nothing) if
    /// the scheduler is already running.
    pub fn start(&self, cadence: Cadence, threshold_mm_per_hour: f64) -> bool {
        let mut ticker = self.lock_ticker();
        if ticker.is_some() {
            logging::info(DataSource::Scheduler, None, "Scheduler already running");
            return false;
        }

        {
            let mut state = self.shared.lock_state();
            state.cadence = Some(cadence.clone());
            state.threshold_mm_per_hour = threshold_mm_per_hour;
        }

        let expr = cadence.expr().to_string();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("rainmon-ticker".to_string())
            .spawn(move || ticker_loop(shared, cadence, stop_rx));
        match spawned {
            Ok(handle) => {
                *ticker = Some(Ticker { stop_tx, handle });
                logging::info(
                    DataSource::Scheduler,
                    None,
                    &format!(
                        "Scheduler started: cadence '{}', threshold {:.1} mm/h",
                        expr, threshold_mm_per_hour
                    ),
                );
                true
            }
            Err(e) => {
                logging::error(
                    DataSource::Scheduler,
                    None,
                    &format!("Cannot spawn ticker thread: {}", e),
                );
                false
            }
        }
    }

    /// Stops future ticks. Does not wait for, or abort, an in-flight run.
    /// Returns `false` if the scheduler was not running.
    pub fn stop(&self) -> bool {
        let Some(ticker) = self.lock_ticker().take() else {
            return false;
        };
        // The receiver only disappears if the ticker already exited
        let _ = ticker.stop_tx.send(());
        if ticker.handle.join().is_err() {
            logging::error(DataSource::Scheduler, None, "Ticker thread panicked");
        }
        self.shared.lock_state().next_run_at = None;
        logging::info(DataSource::Scheduler, None, "Scheduler stopped");
        true
    }

    pub fn restart(&self, cadence: Cadence, threshold_mm_per_hour: f64) -> bool {
        self.stop();
        self.start(cadence, threshold_mm_per_hour)
    }

    pub fn is_running(&self) -> bool {
        self.lock_ticker().is_some()
    }

    /// Changes the threshold used by subsequent runs.
    pub fn set_threshold(&self, threshold_mm_per_hour: f64) -> Result<(), String> {
        if !(threshold_mm_per_hour.is_finite() && threshold_mm_per_hour > 0.0) {
            return Err(format!(
                "threshold must be a positive number, got {}",
                threshold_mm_per_hour
            ));
        }
        self.shared.lock_state().threshold_mm_per_hour = threshold_mm_per_hour;
        Ok(())
    }

    /// Runs immediately on the calling thread, unless a run is in flight.
    pub fn trigger_now(&self) -> Result<RunOutcome, SchedulerBusy> {
        let _guard = self.shared.try_claim().ok_or(SchedulerBusy)?;
        let threshold = self.shared.threshold();
        logging::info(DataSource::Scheduler, None, "Manual run triggered");
        Ok(self.shared.execute_and_record(threshold))
    }

    pub fn status(&self) -> SchedulerStatus {
        let running = self.is_running();
        let state = self.shared.lock_state();
        SchedulerStatus {
            state: if running {
                SchedulerState::Running
            } else {
                SchedulerState::Stopped
            },
            run_in_flight: self.shared.in_flight.load(Ordering::SeqCst),
            cadence: state.cadence.as_ref().map(|c| c.expr().to_string()),
            threshold_mm_per_hour: state.threshold_mm_per_hour,
            next_run_at: state.next_run_at,
            stats: state.stats.clone(),
        }
    }

    /// Blocks until no run is in flight or `timeout` passes. Returns whether
    /// the scheduler is idle.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let state = self.shared.lock_state();
        let (_state, result) = self
            .shared
            .idle
            .wait_timeout_while(state, timeout, |_| self.shared.in_flight.load(Ordering::SeqCst))
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn ticker_loop(shared: Arc<Shared>, cadence: Cadence, stop_rx: mpsc::Receiver<()>) {
    loop {
        let now = Utc::now();
        let next = cadence.next_after(now);
        shared.lock_state().next_run_at = Some(next);

        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        match stop_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => shared.tick(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
