use async_trait::async_trait;

use crate::{
    domain::{CheckOutcome, Identifier, ProgressSnapshot, Relay, RunStats, Verdict},
    Result,
};

/// Raw HTTP response handed back by a [`Fetcher`].
#[derive(Clone, Debug)]
pub struct FetchedResponse {
    pub status: u16,
    pub body: String,
}

impl FetchedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Hexagonal port for the outbound GET used by endpoint oracles.
///
/// Implementations route the request through `relay` as a forward proxy, or
/// connect directly when it is `None`. Transport failures map to `Error::Network`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str, relay: Option<&Relay>) -> Result<FetchedResponse>;

    /// Whether `relay` can be used as a forward proxy at all.
    fn check_relay(&self, _relay: &Relay) -> Result<()> {
        Ok(())
    }
}

/// The third-party service that decides whether a number is registered.
///
/// `Err` means "no usable answer on this attempt" and makes the engine retry;
/// a well-formed negative answer is `Ok(Verdict::NotFound)`.
#[async_trait]
pub trait IdentityOracle: Send + Sync {
    async fn verify(&self, identifier: &Identifier, relay: Option<&Relay>) -> Result<Verdict>;

    /// Relays failing this are dropped when inputs are loaded.
    fn check_relay(&self, _relay: &Relay) -> Result<()> {
        Ok(())
    }
}

/// Receives a snapshot after every processed identifier. Fire-and-forget.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

/// Durable storage for the outcome list.
///
/// Always called with the full list so far; implementations must overwrite, not append.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save(&self, outcomes: &[CheckOutcome]) -> Result<()>;
}

/// Notified exactly once when a run completes (not when it is stopped).
pub trait CompletionSink: Send + Sync {
    fn on_complete(&self, outcomes: &[CheckOutcome], stats: &RunStats);
}

/// Sink that ignores everything; default for engines without observers.
#[derive(Clone, Copy, Debug, Default)]
pub struct Discard;

impl ProgressSink for Discard {
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}
}

#[async_trait]
impl ResultStore for Discard {
    async fn save(&self, _outcomes: &[CheckOutcome]) -> Result<()> {
        Ok(())
    }
}

impl CompletionSink for Discard {
    fn on_complete(&self, _outcomes: &[CheckOutcome], _stats: &RunStats) {}
}

impl ProgressSink for tokio::sync::mpsc::UnboundedSender<ProgressSnapshot> {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        // Receiver gone means nobody is watching; that is fine.
        let _ = self.send(snapshot.clone());
    }
}

/// Logs a line per processed identifier.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_progress(&self, s: &ProgressSnapshot) {
        tracing::info!(
            checked = s.checked,
            total = s.total,
            found = s.found,
            not_found = s.not_found,
            errors = s.errors,
            current = s.current.as_ref().map(|i| i.as_str()).unwrap_or(""),
            "progress {:.1}%",
            s.progress_percent
        );
    }
}
