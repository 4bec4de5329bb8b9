//! Refresh orchestrator: runs every registered source handler once and folds
//! their partial updates into one update map.
//!
//! Per run, for each handler in registration order:
//! - missing required keys → skipped, the handler is never called
//! - fetch error or panic → failed, nothing from it is merged
//! - success → its touched indicators are checked against their declared
//!   granularity and the conforming ones are merged
//!
//! Exactly one outcome (and one log line) is produced per handler. Handlers
//! may run on a bounded thread pool; results are collected by registration
//! index, so completion order never affects logs or merge precedence.
//!
//! With a deadline set, each fetch runs on its own thread and a handler that
//! overruns is reported as failed. Its thread is abandoned, not killed, and
//! finishes once its own HTTP timeouts expire.

use civicsync_core::domain::{IndicatorDefinition, IndicatorSeries};
use civicsync_core::granularity::Granularity;
use civicsync_core::registry::{RegisteredSource, SourceRegistry};
use civicsync_core::series::merge_into_global;
use civicsync_core::settings::Settings;
use civicsync_core::sources::{SourceHandler, SourceUpdate};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SourceStatus {
    Updated {
        indicators: Vec<String>,
        /// Touched indicators dropped for a nonconforming period label.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        rejected: Vec<String>,
    },
    Skipped {
        missing: Vec<String>,
    },
    Failed {
        detail: String,
    },
}

/// Structured per-handler result of one refresh run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOutcome {
    pub source_id: String,
    pub label: String,
    #[serde(flatten)]
    pub status: SourceStatus,
}

impl fmt::Display for SourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            SourceStatus::Updated {
                indicators,
                rejected,
            } => {
                write!(f, "{}: updated {} indicators", self.label, indicators.len())?;
                if !rejected.is_empty() {
                    write!(f, "; rejected {} (period label does not match granularity)", rejected.join(", "))?;
                }
                Ok(())
            }
            SourceStatus::Skipped { missing } => {
                write!(f, "{}: skipped (missing {})", self.label, missing.join(", "))
            }
            SourceStatus::Failed { detail } => write!(f, "{}: failed ({detail})", self.label),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshResult {
    /// Replacement sequences, only for indicators a successful handler touched.
    pub updates: IndicatorSeries,
    /// One line per registered handler, in registration order.
    pub logs: Vec<String>,
    pub outcomes: Vec<SourceOutcome>,
}

impl RefreshResult {
    pub fn updated_ids(&self) -> Vec<String> {
        self.updates.keys().cloned().collect()
    }

    pub fn has_updates(&self) -> bool {
        !self.updates.is_empty()
    }
}

/// What happened when one handler was driven.
enum Attempt {
    Skipped(Vec<String>),
    Fetched(SourceUpdate),
    Failed(String),
}

pub struct RefreshOrchestrator {
    registry: SourceRegistry,
    settings: Arc<Settings>,
    workers: usize,
    deadline: Option<Duration>,
    granularity: BTreeMap<String, Granularity>,
}

impl RefreshOrchestrator {
    pub fn new(registry: SourceRegistry, settings: Arc<Settings>) -> Self {
        Self {
            registry,
            settings,
            workers: 1,
            deadline: None,
            granularity: BTreeMap::new(),
        }
    }

    /// Run handlers on a pool of `workers` threads; 1 is sequential.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Wall-clock limit on one handler's whole fetch, retries included.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Enforce each definition's granularity on touched indicators.
    pub fn with_definitions(mut self, definitions: &[IndicatorDefinition]) -> Self {
        self.granularity = definitions
            .iter()
            .map(|d| (d.id.clone(), d.granularity))
            .collect();
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Drive every handler once against a read-only view of `current`.
    #[tracing::instrument(level = "info", skip_all, fields(sources = self.registry.len(), workers = self.workers))]
    pub fn refresh_all(&self, current: &IndicatorSeries) -> RefreshResult {
        let entries = self.registry.entries();
        let current = Arc::new(current.clone());
        let attempts = self.run_all(entries, &current);

        let mut outcomes = Vec::with_capacity(entries.len());
        let mut accepted: Vec<Option<IndicatorSeries>> = Vec::with_capacity(entries.len());

        for (entry, attempt) in entries.iter().zip(attempts) {
            let handler = &entry.handler;
            let (status, merged) = match attempt {
                Attempt::Skipped(missing) => (SourceStatus::Skipped { missing }, None),
                Attempt::Failed(detail) => (SourceStatus::Failed { detail }, None),
                Attempt::Fetched(update) => {
                    for note in &update.logs {
                        tracing::debug!(source = handler.id(), note = %note, "handler note");
                    }
                    let (kept, rejected) = self.check_granularity(update.updated_series);
                    let indicators = kept.keys().cloned().collect();
                    (SourceStatus::Updated { indicators, rejected }, Some(kept))
                }
            };
            let outcome = SourceOutcome {
                source_id: handler.id().to_string(),
                label: handler.label().to_string(),
                status,
            };
            match &outcome.status {
                SourceStatus::Failed { .. } => tracing::warn!(source = handler.id(), "{outcome}"),
                _ => tracing::info!(source = handler.id(), "{outcome}"),
            }
            outcomes.push(outcome);
            accepted.push(merged);
        }

        let mut updates = IndicatorSeries::new();
        for idx in self.registry.merge_order() {
            if let Some(Some(series)) = accepted.get(idx) {
                updates = merge_into_global(&updates, series);
            }
        }

        RefreshResult {
            updates,
            logs: outcomes.iter().map(ToString::to_string).collect(),
            outcomes,
        }
    }

    /// One attempt per entry, in registration order.
    fn run_all(&self, entries: &[RegisteredSource], current: &Arc<IndicatorSeries>) -> Vec<Attempt> {
        if self.workers > 1 && entries.len() > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(self.workers).build() {
                Ok(pool) => {
                    return pool.install(|| {
                        entries
                            .par_iter()
                            .map(|entry| self.run_one(entry, current))
                            .collect()
                    });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "thread pool unavailable, running sequentially");
                }
            }
        }
        entries.iter().map(|entry| self.run_one(entry, current)).collect()
    }

    fn run_one(&self, entry: &RegisteredSource, current: &Arc<IndicatorSeries>) -> Attempt {
        let handler = &entry.handler;
        let missing = self.settings.missing(handler.required_keys());
        if !missing.is_empty() {
            return Attempt::Skipped(missing.into_iter().map(String::from).collect());
        }

        let Some(deadline) = self.deadline else {
            return guarded_fetch(handler.as_ref(), current, &self.settings);
        };

        let (tx, rx) = mpsc::channel();
        let (handler, current, settings) = (handler.clone(), current.clone(), self.settings.clone());
        let spawned = thread::Builder::new()
            .name(format!("source-{}", handler.id()))
            .spawn(move || {
                // The receiver is gone once the deadline has passed.
                let _ = tx.send(guarded_fetch(handler.as_ref(), &current, &settings));
            });
        if let Err(err) = spawned {
            return Attempt::Failed(format!("could not start handler thread: {err}"));
        }
        match rx.recv_timeout(deadline) {
            Ok(attempt) => attempt,
            Err(RecvTimeoutError::Timeout) => Attempt::Failed(format!("timed out after {deadline:?}")),
            Err(RecvTimeoutError::Disconnected) => Attempt::Failed("handler thread exited without a result".into()),
        }
    }

    /// Split touched indicators into conforming and rejected ids.
    fn check_granularity(&self, touched: IndicatorSeries) -> (IndicatorSeries, Vec<String>) {
        let mut kept = IndicatorSeries::new();
        let mut rejected = Vec::new();
        for (id, points) in touched {
            let conforms = match (self.granularity.get(&id), points.last()) {
                (Some(g), Some(last)) => g.accepts(&last.date),
                _ => true,
            };
            if conforms {
                kept.insert(id, points);
            } else {
                rejected.push(id);
            }
        }
        (kept, rejected)
    }
}

fn guarded_fetch(handler: &dyn SourceHandler, current: &IndicatorSeries, settings: &Settings) -> Attempt {
    match catch_unwind(AssertUnwindSafe(|| handler.fetch(current, settings))) {
        Ok(Ok(update)) => Attempt::Fetched(update),
        Ok(Err(err)) => Attempt::Failed(err.to_string()),
        Err(payload) => Attempt::Failed(format!("handler panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civicsync_core::domain::SeriesPoint;
    use civicsync_core::sources::{Cadence, SourceError};
    use std::time::Instant;

    struct Fixed {
        id: &'static str,
        points: Vec<(&'static str, &'static str, f64)>,
    }

    impl SourceHandler for Fixed {
        fn id(&self) -> &str {
            self.id
        }
        fn label(&self) -> &str {
            self.id
        }
        fn cadence(&self) -> Cadence {
            Cadence::Daily
        }
        fn required_keys(&self) -> &[&'static str] {
            &[]
        }
        fn fetch(&self, _: &IndicatorSeries, _: &Settings) -> Result<SourceUpdate, SourceError> {
            let mut update = SourceUpdate::default();
            for (indicator, date, value) in &self.points {
                update.insert(indicator, vec![SeriesPoint::new(*date, *value)]);
            }
            Ok(update)
        }
    }

    struct Panics;

    impl SourceHandler for Panics {
        fn id(&self) -> &str {
            "panics"
        }
        fn label(&self) -> &str {
            "Panics"
        }
        fn cadence(&self) -> Cadence {
            Cadence::Daily
        }
        fn required_keys(&self) -> &[&'static str] {
            &[]
        }
        fn fetch(&self, _: &IndicatorSeries, _: &Settings) -> Result<SourceUpdate, SourceError> {
            panic!("index out of range")
        }
    }

    struct Sleeps(Duration);

    impl SourceHandler for Sleeps {
        fn id(&self) -> &str {
            "slow"
        }
        fn label(&self) -> &str {
            "Slow"
        }
        fn cadence(&self) -> Cadence {
            Cadence::Daily
        }
        fn required_keys(&self) -> &[&'static str] {
            &[]
        }
        fn fetch(&self, _: &IndicatorSeries, _: &Settings) -> Result<SourceUpdate, SourceError> {
            thread::sleep(self.0);
            let mut update = SourceUpdate::default();
            update.insert("late", vec![SeriesPoint::new("2023", 1.0)]);
            Ok(update)
        }
    }

    fn fixed(id: &'static str, points: Vec<(&'static str, &'static str, f64)>) -> Arc<dyn SourceHandler> {
        Arc::new(Fixed { id, points })
    }

    fn orchestrator(registry: SourceRegistry) -> RefreshOrchestrator {
        RefreshOrchestrator::new(registry, Arc::new(Settings::new()))
    }

    #[test]
    fn later_registration_wins_at_equal_priority() {
        let registry = SourceRegistry::new()
            .with(fixed("first", vec![("x", "2023", 1.0)]))
            .with(fixed("second", vec![("x", "2023", 2.0)]));
        let result = orchestrator(registry).refresh_all(&IndicatorSeries::new());
        assert_eq!(result.updates["x"], vec![SeriesPoint::new("2023", 2.0)]);
    }

    #[test]
    fn explicit_priority_beats_registration_order() {
        let mut registry = SourceRegistry::new();
        registry.register_with_priority(fixed("preferred", vec![("x", "2023", 1.0)]), 10);
        registry.register(fixed("fallback", vec![("x", "2023", 2.0)]));
        let result = orchestrator(registry).refresh_all(&IndicatorSeries::new());
        assert_eq!(result.updates["x"], vec![SeriesPoint::new("2023", 1.0)]);
        assert_eq!(result.logs, vec!["preferred: updated 1 indicators", "fallback: updated 1 indicators"]);
    }

    #[test]
    fn panic_becomes_failure_line() {
        let registry = SourceRegistry::new()
            .with(Arc::new(Panics))
            .with(fixed("ok", vec![("x", "2023", 1.0)]));
        let result = orchestrator(registry).refresh_all(&IndicatorSeries::new());
        assert_eq!(result.logs[0], "Panics: failed (handler panicked: index out of range)");
        assert_eq!(result.logs[1], "ok: updated 1 indicators");
        assert_eq!(result.updated_ids(), vec!["x".to_string()]);
    }

    #[test]
    fn overrunning_handler_fails_at_deadline() {
        let registry = SourceRegistry::new()
            .with(Arc::new(Sleeps(Duration::from_secs(5))))
            .with(fixed("ok", vec![("x", "2023", 1.0)]));
        let started = Instant::now();
        let result = orchestrator(registry)
            .with_deadline(Duration::from_millis(100))
            .refresh_all(&IndicatorSeries::new());

        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(result.logs[0], "Slow: failed (timed out after 100ms)");
        assert_eq!(result.logs[1], "ok: updated 1 indicators");
        assert_eq!(result.updated_ids(), vec!["x".to_string()]);
    }

    #[test]
    fn deadline_keeps_fast_results_and_panics() {
        let registry = SourceRegistry::new()
            .with(Arc::new(Sleeps(Duration::from_millis(10))))
            .with(Arc::new(Panics));
        let result = orchestrator(registry)
            .with_deadline(Duration::from_secs(5))
            .refresh_all(&IndicatorSeries::new());
        assert_eq!(result.logs[0], "Slow: updated 1 indicators");
        assert_eq!(result.logs[1], "Panics: failed (handler panicked: index out of range)");
    }

    #[test]
    fn nonconforming_period_is_rejected() {
        let defs = civicsync_core::defaults::BundledDefaults::load().unwrap().definitions;
        let registry = SourceRegistry::new().with(fixed(
            "mixed",
            vec![("unemployment_rate", "2023", 4.4), ("median_rent", "2023", 1500.0)],
        ));
        let result = orchestrator(registry)
            .with_definitions(&defs)
            .refresh_all(&IndicatorSeries::new());

        assert_eq!(result.updated_ids(), vec!["median_rent".to_string()]);
        assert_eq!(
            result.outcomes[0].status,
            SourceStatus::Updated {
                indicators: vec!["median_rent".into()],
                rejected: vec!["unemployment_rate".into()],
            }
        );
        assert_eq!(
            result.logs[0],
            "mixed: updated 1 indicators; rejected unemployment_rate (period label does not match granularity)"
        );
    }

    #[test]
    fn pooled_run_keeps_registration_order() {
        let mut registry = SourceRegistry::new();
        for (i, id) in ["a", "b", "c", "d", "e", "f"].into_iter().enumerate() {
            registry.register(fixed(id, vec![("x", "2023", i as f64)]));
        }
        let result = orchestrator(registry).with_workers(4).refresh_all(&IndicatorSeries::new());
        let ids: Vec<&str> = result.outcomes.iter().map(|o| o.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e", "f"]);
        assert_eq!(result.updates["x"][0].value, 5.0);
    }

    #[test]
    fn outcome_serializes_flat() {
        let outcome = SourceOutcome {
            source_id: "noaa_ncei".into(),
            label: "NOAA NCEI".into(),
            status: SourceStatus::Skipped {
                missing: vec!["NOAA_TOKEN".into()],
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sourceId": "noaa_ncei",
                "label": "NOAA NCEI",
                "outcome": "skipped",
                "missing": ["NOAA_TOKEN"]
            })
        );
    }
}
