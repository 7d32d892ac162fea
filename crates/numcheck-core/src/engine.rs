//! Sequential number-checking engine.
//!
//! One engine instance owns one run at a time:
//! - identifiers are checked strictly in input order, one at a time
//! - each attempt draws the next relay from the ring (retries rotate too)
//! - `stop()` is cooperative and observed before the next identifier
//! - per-item failures become `TransientFailure` outcomes; nothing aborts the loop

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::{
    config::EngineConfig,
    domain::{
        CheckOutcome, Identifier, OutcomeKind, ProgressSnapshot, ProgressView, Relay, RunPhase,
        RunStats, Verdict, DIRECT,
    },
    errors::Error,
    normalize::{apply_cap, normalize_identifiers, normalize_relays},
    ports::{CompletionSink, Discard, IdentityOracle, ProgressSink, ResultStore},
    relay::RelayRing,
    store::{render_found_txt, render_full_csv},
    utils::{iso_timestamp_utc, truncate_text},
    Result,
};

const MAX_MESSAGE_CHARS: usize = 300;

// Values of the shared run flag.
const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;

#[derive(Debug, Default)]
struct RunState {
    phase: RunPhase,
    identifiers: Vec<Identifier>,
    relays: RelayRing,
    outcomes: Vec<CheckOutcome>,
    stats: RunStats,
}

/// What `load` accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadSummary {
    pub identifiers: usize,
    pub relays: usize,
    /// Entries beyond the configured caps.
    pub dropped_identifiers: usize,
    pub dropped_relays: usize,
    /// Relays the oracle cannot route through.
    pub rejected_relays: usize,
}

/// Terminal state of one `start()` call.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub phase: RunPhase,
    pub stats: RunStats,
    pub outcomes: Vec<CheckOutcome>,
}

/// Cloneable handle that requests a cooperative stop.
#[derive(Clone, Debug)]
pub struct StopHandle {
    flag: Arc<AtomicU8>,
}

impl StopHandle {
    /// Returns whether a run was in progress.
    pub fn stop(&self) -> bool {
        match self
            .flag
            .compare_exchange(RUNNING, STOPPING, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => true,
            Err(current) => current == STOPPING,
        }
    }
}

pub struct CheckEngine {
    cfg: EngineConfig,
    oracle: Arc<dyn IdentityOracle>,
    progress: Arc<dyn ProgressSink>,
    store: Arc<dyn ResultStore>,
    completion: Arc<dyn CompletionSink>,
    flag: Arc<AtomicU8>,
    state: Mutex<RunState>,
}

impl CheckEngine {
    pub fn new(cfg: EngineConfig, oracle: Arc<dyn IdentityOracle>) -> Self {
        Self {
            cfg,
            oracle,
            progress: Arc::new(Discard),
            store: Arc::new(Discard),
            completion: Arc::new(Discard),
            flag: Arc::new(AtomicU8::new(IDLE)),
            state: Mutex::new(RunState::default()),
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_completion(mut self, sink: Arc<dyn CompletionSink>) -> Self {
        self.completion = sink;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Parse raw identifier/relay text and stage it for the next run.
    ///
    /// Fails when no identifier survives normalization or a run is in progress.
    pub async fn load(
        &self,
        identifiers_text: &str,
        relays_text: Option<&str>,
    ) -> Result<LoadSummary> {
        let identifiers = normalize_identifiers(identifiers_text, &self.cfg.identifier_policy);
        let relays = relays_text.map(normalize_relays).unwrap_or_default();
        self.load_items(identifiers, relays).await
    }

    /// Stage already-normalized inputs, applying the configured caps.
    ///
    /// Relays the oracle reports as unusable are dropped with a warning.
    pub async fn load_items(
        &self,
        mut identifiers: Vec<Identifier>,
        mut relays: Vec<Relay>,
    ) -> Result<LoadSummary> {
        if identifiers.is_empty() {
            return Err(Error::InvalidInput("no valid phone numbers found".to_string()));
        }

        // Held until the new state is installed; `start` needs it to begin.
        let mut st = self.state.lock().await;
        if self.is_running() || st.phase == RunPhase::Running {
            return Err(Error::InvalidInput(
                "cannot load while a run is in progress".to_string(),
            ));
        }

        let before = relays.len();
        relays.retain(|relay| match self.oracle.check_relay(relay) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(relay = %relay, "relay rejected: {e}");
                false
            }
        });
        let rejected_relays = before - relays.len();

        let dropped_identifiers = apply_cap(&mut identifiers, self.cfg.max_identifiers);
        let dropped_relays = apply_cap(&mut relays, self.cfg.max_relays);
        if dropped_identifiers > 0 || dropped_relays > 0 {
            tracing::warn!(
                dropped_identifiers,
                dropped_relays,
                "input exceeds per-run caps; extra entries ignored"
            );
        }

        let summary = LoadSummary {
            identifiers: identifiers.len(),
            relays: relays.len(),
            dropped_identifiers,
            dropped_relays,
            rejected_relays,
        };
        tracing::info!(
            identifiers = summary.identifiers,
            relays = summary.relays,
            rejected_relays,
            "loaded check inputs"
        );

        *st = RunState {
            phase: RunPhase::Idle,
            stats: RunStats::new(identifiers.len()),
            identifiers,
            relays: RelayRing::new(relays),
            outcomes: Vec::new(),
        };
        Ok(summary)
    }

    pub fn is_running(&self) -> bool {
        self.flag.load(Ordering::SeqCst) != IDLE
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: self.flag.clone(),
        }
    }

    /// Request a cooperative stop. The identifier in flight still completes.
    pub fn stop(&self) -> bool {
        self.stop_handle().stop()
    }

    pub async fn phase(&self) -> RunPhase {
        self.state.lock().await.phase
    }

    pub async fn stats(&self) -> RunStats {
        self.state.lock().await.stats
    }

    pub async fn outcomes(&self) -> Vec<CheckOutcome> {
        self.state.lock().await.outcomes.clone()
    }

    pub async fn progress(&self) -> ProgressView {
        let st = self.state.lock().await;
        ProgressView {
            running: self.is_running(),
            phase: st.phase,
            stats: st.stats,
            progress_percent: st.stats.progress_percent(),
        }
    }

    pub async fn found_txt(&self) -> String {
        render_found_txt(&self.state.lock().await.outcomes)
    }

    pub async fn full_results_csv(&self) -> String {
        render_full_csv(&self.state.lock().await.outcomes)
    }

    /// Run over the loaded identifiers until exhausted or stopped.
    pub async fn start(&self) -> Result<RunReport> {
        if self
            .flag
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::InvalidInput("a run is already in progress".to_string()));
        }

        let (identifiers, mut ring) = {
            let mut st = self.state.lock().await;
            if st.identifiers.is_empty() {
                self.flag.store(IDLE, Ordering::SeqCst);
                return Err(Error::InvalidInput("no identifiers loaded".to_string()));
            }
            st.phase = RunPhase::Running;
            st.outcomes.clear();
            st.stats = RunStats::new(st.identifiers.len());
            (
                std::mem::take(&mut st.identifiers),
                std::mem::take(&mut st.relays),
            )
        };

        let total = identifiers.len();
        tracing::info!(total, relays = ring.len(), "run started");

        let mut stopped = false;
        for (idx, identifier) in identifiers.iter().enumerate() {
            if self.flag.load(Ordering::SeqCst) == STOPPING {
                stopped = true;
                break;
            }

            let outcome = self.check_one(identifier, &mut ring).await;
            tracing::debug!(%identifier, kind = ?outcome.kind, relay = %outcome.relay, "checked");

            let (snapshot, persist_due) = {
                let mut st = self.state.lock().await;
                st.stats.record(outcome.kind);
                st.outcomes.push(outcome);
                (
                    ProgressSnapshot::from_stats(&st.stats, Some(identifier.clone())),
                    self.cfg.persist.is_due(st.stats.checked),
                )
            };
            self.progress.on_progress(&snapshot);
            if persist_due {
                self.persist().await;
            }

            if idx + 1 < total && !self.cfg.delay.is_zero() {
                sleep(self.cfg.delay).await;
            }
        }

        self.persist().await;

        let report = {
            let mut st = self.state.lock().await;
            st.phase = if stopped {
                RunPhase::Stopped
            } else {
                RunPhase::Completed
            };
            st.identifiers = identifiers;
            st.relays = ring;
            RunReport {
                phase: st.phase,
                stats: st.stats,
                outcomes: st.outcomes.clone(),
            }
        };
        self.flag.store(IDLE, Ordering::SeqCst);

        let s = &report.stats;
        if stopped {
            tracing::info!(checked = s.checked, total = s.total, "run stopped");
        } else {
            tracing::info!(
                checked = s.checked,
                found = s.found,
                not_found = s.not_found,
                errors = s.errors,
                "run completed"
            );
            self.completion.on_complete(&report.outcomes, &report.stats);
        }

        Ok(report)
    }

    /// Verify one identifier with bounded retry; always yields exactly one outcome.
    async fn check_one(&self, identifier: &Identifier, ring: &mut RelayRing) -> CheckOutcome {
        let max_attempts = self.cfg.max_retries.saturating_add(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let relay = ring.next_relay();
            let relay_label = relay
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| DIRECT.to_string());

            let (kind, message, endpoint) =
                match self.oracle.verify(identifier, relay.as_ref()).await {
                    Ok(Verdict::Found { endpoint }) => (OutcomeKind::Found, None, endpoint),
                    Ok(Verdict::NotFound) => (OutcomeKind::NotFound, None, None),
                    Err(e) if e.is_transient() && attempt < max_attempts => {
                        tracing::warn!(
                            %identifier,
                            relay = %relay_label,
                            attempt,
                            max_attempts,
                            "check failed, retrying: {e}"
                        );
                        if !self.cfg.retry_delay.is_zero() {
                            sleep(self.cfg.retry_delay).await;
                        }
                        continue;
                    }
                    Err(e) => (
                        OutcomeKind::TransientFailure,
                        Some(truncate_text(&e.to_string(), MAX_MESSAGE_CHARS)),
                        None,
                    ),
                };

            return CheckOutcome {
                identifier: identifier.clone(),
                kind,
                relay: relay_label,
                message,
                endpoint,
                checked_at: iso_timestamp_utc(),
            };
        }
    }

    async fn persist(&self) {
        let outcomes = self.state.lock().await.outcomes.clone();
        if let Err(e) = self.store.save(&outcomes).await {
            tracing::warn!("failed to persist results: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::PersistCadence,
        normalize::{normalize_relays, IdentifierPolicy},
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Mutex as StdMutex, OnceLock};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Plays back scripted answers, then answers `NotFound` forever.
    #[derive(Default)]
    struct ScriptedOracle {
        script: StdMutex<VecDeque<Result<Verdict>>>,
        calls: StdMutex<Vec<(String, Option<String>)>>,
        unusable_relays: Vec<String>,
    }

    impl ScriptedOracle {
        fn new(script: Vec<Result<Verdict>>) -> Self {
            Self {
                script: StdMutex::new(script.into()),
                ..Self::default()
            }
        }

        fn relays_seen(&self) -> Vec<Option<String>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(_, r)| r.clone())
                .collect()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl IdentityOracle for ScriptedOracle {
        async fn verify(&self, identifier: &Identifier, relay: Option<&Relay>) -> Result<Verdict> {
            self.calls
                .lock()
                .unwrap()
                .push((identifier.to_string(), relay.map(|r| r.to_string())));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Verdict::NotFound))
        }

        fn check_relay(&self, relay: &Relay) -> Result<()> {
            if self.unusable_relays.iter().any(|r| r == relay.as_str()) {
                return Err(Error::InvalidRelay(relay.to_string()));
            }
            Ok(())
        }
    }

    /// Blocks inside every `verify` until released.
    #[derive(Default)]
    struct GatedOracle {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl IdentityOracle for GatedOracle {
        async fn verify(
            &self,
            _identifier: &Identifier,
            _relay: Option<&Relay>,
        ) -> Result<Verdict> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Verdict::NotFound)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        snapshots: StdMutex<Vec<ProgressSnapshot>>,
        completions: StdMutex<Vec<RunStats>>,
        stop_after: Option<usize>,
        stop: OnceLock<StopHandle>,
    }

    impl ProgressSink for RecordingSink {
        fn on_progress(&self, snapshot: &ProgressSnapshot) {
            self.snapshots.lock().unwrap().push(snapshot.clone());
            if Some(snapshot.checked) == self.stop_after {
                if let Some(h) = self.stop.get() {
                    h.stop();
                }
            }
        }
    }

    impl CompletionSink for RecordingSink {
        fn on_complete(&self, _outcomes: &[CheckOutcome], stats: &RunStats) {
            self.completions.lock().unwrap().push(*stats);
        }
    }

    #[derive(Default)]
    struct CountingStore {
        saves: StdMutex<Vec<usize>>,
    }

    #[async_trait]
    impl ResultStore for CountingStore {
        async fn save(&self, outcomes: &[CheckOutcome]) -> Result<()> {
            self.saves.lock().unwrap().push(outcomes.len());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FailingStore {
        attempts: StdMutex<usize>,
    }

    #[async_trait]
    impl ResultStore for FailingStore {
        async fn save(&self, _outcomes: &[CheckOutcome]) -> Result<()> {
            *self.attempts.lock().unwrap() += 1;
            Err(Error::External("disk full".to_string()))
        }
    }

    fn fast_config(max_retries: u32) -> EngineConfig {
        EngineConfig {
            delay: Duration::ZERO,
            max_retries,
            retry_delay: Duration::ZERO,
            identifier_policy: IdentifierPolicy::lenient(),
            max_identifiers: Some(10_000),
            max_relays: Some(1_000),
            persist: PersistCadence::EveryItem,
        }
    }

    fn timeout(n: usize) -> Result<Verdict> {
        Err(Error::Network(format!("timeout #{n}")))
    }

    #[tokio::test]
    async fn completed_run_checks_everything_once() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(Verdict::Found { endpoint: None }),
            Ok(Verdict::NotFound),
            Ok(Verdict::Found {
                endpoint: Some("https://o/3".to_string()),
            }),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(CountingStore::default());
        let engine = CheckEngine::new(fast_config(0), oracle.clone())
            .with_progress(sink.clone())
            .with_completion(sink.clone())
            .with_store(store.clone());

        engine.load("111\n222\n333\n444", None).await.unwrap();
        let report = engine.start().await.unwrap();

        assert_eq!(report.phase, RunPhase::Completed);
        assert!(!engine.is_running());
        let s = report.stats;
        assert_eq!(s.checked, 4);
        assert_eq!(s.total, 4);
        assert_eq!(s.found + s.not_found + s.errors, s.checked);
        assert_eq!((s.found, s.not_found, s.errors), (2, 2, 0));

        let ids: Vec<&str> = report
            .outcomes
            .iter()
            .map(|o| o.identifier.as_str())
            .collect();
        assert_eq!(ids, vec!["111", "222", "333", "444"]);
        assert!(report.outcomes.iter().all(|o| o.relay == DIRECT));
        assert_eq!(report.outcomes[2].endpoint.as_deref(), Some("https://o/3"));

        let checked: Vec<usize> = sink
            .snapshots
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.checked)
            .collect();
        assert_eq!(checked, vec![1, 2, 3, 4]);
        let last = sink.snapshots.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.progress_percent, 100.0);
        assert_eq!(last.current.as_ref().map(|i| i.as_str()), Some("444"));

        assert_eq!(sink.completions.lock().unwrap().len(), 1);
        // every item + final flush
        assert_eq!(*store.saves.lock().unwrap(), vec![1, 2, 3, 4, 4]);

        assert_eq!(engine.found_txt().await, "111\n333");
        assert!(engine.full_results_csv().await.ends_with("444,NO"));
    }

    #[tokio::test]
    async fn relays_rotate_round_robin_across_identifiers() {
        let oracle = Arc::new(ScriptedOracle::default());
        let engine = CheckEngine::new(fast_config(3), oracle.clone());
        let summary = engine
            .load("1\n2\n3", Some("1.2.3.4:8080\n5.6.7.8:3128"))
            .await
            .unwrap();
        assert_eq!(summary.relays, 2);

        let report = engine.start().await.unwrap();
        let used: Vec<&str> = report.outcomes.iter().map(|o| o.relay.as_str()).collect();
        assert_eq!(used, vec!["1.2.3.4:8080", "5.6.7.8:3128", "1.2.3.4:8080"]);
        assert_eq!(
            oracle.relays_seen(),
            vec![
                Some("1.2.3.4:8080".to_string()),
                Some("5.6.7.8:3128".to_string()),
                Some("1.2.3.4:8080".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn retry_draws_new_relay_and_records_final_attempt() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            timeout(1),
            timeout(2),
            Ok(Verdict::NotFound),
        ]));
        let engine = CheckEngine::new(fast_config(3), oracle.clone());
        engine
            .load_items(
                normalize_identifiers("971501234567", &IdentifierPolicy::lenient()),
                normalize_relays("r1:1\nr2:2\nr3:3"),
            )
            .await
            .unwrap();

        let report = engine.start().await.unwrap();
        assert_eq!(report.outcomes.len(), 1);
        let o = &report.outcomes[0];
        assert_eq!(o.kind, OutcomeKind::NotFound);
        assert_eq!(o.relay, "r3:3");
        assert_eq!(o.message, None);
        assert_eq!(oracle.call_count(), 3);
        assert_eq!(report.stats.errors, 0);
    }

    #[tokio::test]
    async fn exhausted_retries_record_last_error() {
        let oracle = Arc::new(ScriptedOracle::new(vec![timeout(1), timeout(2), timeout(3)]));
        let engine = CheckEngine::new(fast_config(1), oracle.clone());
        engine.load("5551234", Some("a:1\nb:2")).await.unwrap();

        let report = engine.start().await.unwrap();
        let o = &report.outcomes[0];
        assert_eq!(o.kind, OutcomeKind::TransientFailure);
        assert_eq!(o.relay, "b:2");
        let msg = o.message.as_deref().unwrap();
        assert!(msg.contains("timeout #2"), "unexpected message: {msg}");
        assert_eq!(oracle.call_count(), 2);
        assert_eq!(report.stats.errors, 1);
        assert_eq!(report.phase, RunPhase::Completed);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Err(Error::Config(
            "bad endpoint".to_string(),
        ))]));
        let engine = CheckEngine::new(fast_config(3), oracle.clone());
        engine.load("5551234", None).await.unwrap();

        let report = engine.start().await.unwrap();
        assert_eq!(report.outcomes[0].kind, OutcomeKind::TransientFailure);
        assert_eq!(oracle.call_count(), 1);
    }

    #[tokio::test]
    async fn stop_is_observed_before_next_identifier() {
        let oracle = Arc::new(ScriptedOracle::default());
        let sink = Arc::new(RecordingSink {
            stop_after: Some(2),
            ..RecordingSink::default()
        });
        let store = Arc::new(CountingStore::default());
        let engine = CheckEngine::new(fast_config(0), oracle.clone())
            .with_progress(sink.clone())
            .with_completion(sink.clone())
            .with_store(store.clone());
        sink.stop.set(engine.stop_handle()).unwrap();

        engine.load("1\n2\n3\n4\n5", None).await.unwrap();
        let report = engine.start().await.unwrap();

        assert_eq!(report.phase, RunPhase::Stopped);
        assert_eq!(report.stats.checked, 2);
        assert_eq!(report.stats.total, 5);
        assert_eq!(sink.snapshots.lock().unwrap().len(), 2);
        assert_eq!(oracle.call_count(), 2);
        assert!(sink.completions.lock().unwrap().is_empty());
        // partial results were flushed and stay readable
        assert_eq!(store.saves.lock().unwrap().last().copied(), Some(2));
        assert_eq!(engine.outcomes().await.len(), 2);
        assert_eq!(engine.phase().await, RunPhase::Stopped);
    }

    #[tokio::test]
    async fn restart_resets_stats_and_outcomes() {
        let oracle = Arc::new(ScriptedOracle::default());
        let engine = CheckEngine::new(fast_config(0), oracle);
        engine.load("1\n2", None).await.unwrap();

        engine.start().await.unwrap();
        let second = engine.start().await.unwrap();
        assert_eq!(second.stats.checked, 2);
        assert_eq!(second.outcomes.len(), 2);
    }

    #[tokio::test]
    async fn persistence_cadence_every_n() {
        let store = Arc::new(CountingStore::default());
        let mut cfg = fast_config(0);
        cfg.persist = PersistCadence::EveryN(2);
        let engine =
            CheckEngine::new(cfg, Arc::new(ScriptedOracle::default())).with_store(store.clone());
        engine.load("1\n2\n3\n4\n5", None).await.unwrap();
        engine.start().await.unwrap();
        assert_eq!(*store.saves.lock().unwrap(), vec![2, 4, 5]);
    }

    #[tokio::test]
    async fn load_rejects_empty_input_and_applies_caps() {
        let mut cfg = fast_config(0);
        cfg.max_identifiers = Some(2);
        cfg.max_relays = Some(1);
        let engine = CheckEngine::new(cfg, Arc::new(ScriptedOracle::default()));

        let err = engine.load("abc\n# only comments\n", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(matches!(engine.start().await, Err(Error::InvalidInput(_))));
        assert!(!engine.is_running());

        let summary = engine.load("1\n2\n3", Some("a:1\nb:2")).await.unwrap();
        assert_eq!(
            summary,
            LoadSummary {
                identifiers: 2,
                relays: 1,
                dropped_identifiers: 1,
                dropped_relays: 1,
                rejected_relays: 0,
            }
        );
    }

    #[tokio::test]
    async fn unusable_relays_are_dropped_at_load() {
        let oracle = Arc::new(ScriptedOracle {
            unusable_relays: vec!["http://[bad:8080".to_string()],
            ..ScriptedOracle::default()
        });
        let engine = CheckEngine::new(fast_config(0), oracle.clone());

        let summary = engine
            .load("1\n2", Some("http://[bad:8080\n1.2.3.4:8080"))
            .await
            .unwrap();
        assert_eq!((summary.relays, summary.rejected_relays), (1, 1));
        let report = engine.start().await.unwrap();
        assert!(report.outcomes.iter().all(|o| o.relay == "1.2.3.4:8080"));

        // nothing usable left: the label says what actually happened
        let summary = engine.load("3", Some("http://[bad:8080")).await.unwrap();
        assert_eq!((summary.relays, summary.rejected_relays), (0, 1));
        let report = engine.start().await.unwrap();
        assert_eq!(report.outcomes[0].relay, DIRECT);
        assert_eq!(
            oracle.relays_seen(),
            vec![
                Some("1.2.3.4:8080".to_string()),
                Some("1.2.3.4:8080".to_string()),
                None
            ]
        );
    }

    #[tokio::test]
    async fn failing_store_does_not_abort_the_run() {
        let store = Arc::new(FailingStore::default());
        let sink = Arc::new(RecordingSink::default());
        let engine = CheckEngine::new(fast_config(0), Arc::new(ScriptedOracle::default()))
            .with_store(store.clone())
            .with_completion(sink.clone());

        engine.load("1\n2\n3", None).await.unwrap();
        let report = engine.start().await.unwrap();

        assert_eq!(report.phase, RunPhase::Completed);
        assert_eq!(report.stats.checked, 3);
        assert_eq!(report.outcomes.len(), 3);
        // every item + final flush, all failed
        assert_eq!(*store.attempts.lock().unwrap(), 4);
        assert_eq!(sink.completions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn load_is_rejected_while_a_run_is_in_flight() {
        let oracle = Arc::new(GatedOracle::default());
        let engine = Arc::new(CheckEngine::new(fast_config(0), oracle.clone()));
        engine.load("1\n2", None).await.unwrap();

        let run = tokio::spawn({
            let engine = engine.clone();
            async move { engine.start().await }
        });

        oracle.entered.notified().await;
        let err = engine.load("7\n8\n9", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        oracle.release.notify_one();
        oracle.entered.notified().await;
        oracle.release.notify_one();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.phase, RunPhase::Completed);
        assert_eq!((report.stats.checked, report.stats.total), (2, 2));
        let ids: Vec<&str> = report
            .outcomes
            .iter()
            .map(|o| o.identifier.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn stop_while_idle_does_not_leak_into_the_next_run() {
        let engine = CheckEngine::new(fast_config(0), Arc::new(ScriptedOracle::default()));
        engine.load("1\n2\n3", None).await.unwrap();
        assert!(!engine.stop_handle().stop());

        let report = engine.start().await.unwrap();
        assert_eq!(report.phase, RunPhase::Completed);
        assert_eq!(report.stats.checked, 3);
        assert!(!engine.stop());
    }

    #[tokio::test]
    async fn idle_engine_reports_zero_progress() {
        let engine = CheckEngine::new(fast_config(0), Arc::new(ScriptedOracle::default()));
        let view = engine.progress().await;
        assert!(!view.running);
        assert_eq!(view.phase, RunPhase::Idle);
        assert_eq!(view.stats, RunStats::default());
        assert_eq!(view.progress_percent, 0.0);
        assert!(!engine.stop());
    }
}
