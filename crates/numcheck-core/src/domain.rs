use std::fmt;

use serde::{Deserialize, Serialize};

/// Label recorded for outcomes checked without a relay.
pub const DIRECT: &str = "direct";

/// Normalized phone number (ASCII digits only).
///
/// Only `normalize` builds these, so every value satisfies the acceptance policy
/// it was created under.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(pub(crate) String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Forward proxy descriptor: `host:port` or a full `http…` URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Relay(pub(crate) String);

impl Relay {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Proxy URL for the transport; bare `host:port` relays are treated as plain HTTP proxies.
    pub fn proxy_url(&self) -> String {
        if self.0.starts_with("http") {
            self.0.clone()
        } else {
            format!("http://{}", self.0)
        }
    }
}

impl fmt::Display for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the oracle said about one identifier on one attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Found {
        /// Endpoint that produced the positive match, if the oracle reports it.
        endpoint: Option<String>,
    },
    NotFound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Found,
    NotFound,
    /// Every attempt failed; `CheckOutcome::message` carries the last error.
    TransientFailure,
}

/// Final result for one identifier in one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub identifier: Identifier,
    pub kind: OutcomeKind,
    /// Relay of the final attempt, or [`DIRECT`].
    pub relay: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub checked_at: String,
}

impl CheckOutcome {
    pub fn is_found(&self) -> bool {
        self.kind == OutcomeKind::Found
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub checked: usize,
    pub found: usize,
    pub not_found: usize,
    pub errors: usize,
    pub total: usize,
}

impl RunStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Found => self.found += 1,
            OutcomeKind::NotFound => self.not_found += 1,
            OutcomeKind::TransientFailure => self.errors += 1,
        }
        self.checked += 1;
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.checked as f64 / self.total as f64 * 100.0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Completed,
    Stopped,
}

/// Snapshot handed to the progress sink after every processed identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub checked: usize,
    pub total: usize,
    pub found: usize,
    pub not_found: usize,
    pub errors: usize,
    pub current: Option<Identifier>,
    pub progress_percent: f64,
}

impl ProgressSnapshot {
    pub fn from_stats(stats: &RunStats, current: Option<Identifier>) -> Self {
        Self {
            checked: stats.checked,
            total: stats.total,
            found: stats.found,
            not_found: stats.not_found,
            errors: stats.errors,
            current,
            progress_percent: stats.progress_percent(),
        }
    }
}

/// Status view for polling callers (parity with a `/progress` style endpoint).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressView {
    pub running: bool,
    pub phase: RunPhase,
    pub stats: RunStats,
    pub progress_percent: f64,
}
