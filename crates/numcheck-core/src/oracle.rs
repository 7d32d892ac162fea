//! Identity oracle strategies over a [`Fetcher`].
//!
//! Two call strategies:
//! - `Single`: one endpoint; transport errors, non-2xx statuses and malformed
//!   bodies are errors, so the engine retries them.
//! - `Fallback`: endpoints tried in order, first positive wins. Per-endpoint
//!   failures are skipped and "no positive anywhere" is `NotFound`. This
//!   conflates "could not confirm" with "not registered", which is the
//!   behavior existing users depend on.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    domain::{Identifier, Relay, Verdict},
    errors::Error,
    ports::{FetchedResponse, Fetcher, IdentityOracle},
    Result,
};

/// Placeholder substituted with the identifier in endpoint templates.
pub const PHONE_PLACEHOLDER: &str = "{phone}";

pub const DEFAULT_ENDPOINTS: [&str; 3] = [
    "https://web.whatsapp.com/check?phone={phone}",
    "https://api.whatsapp.com/send?phone={phone}",
    "https://umnico.com/api/tools/checker?phone={phone}",
];

pub const DEFAULT_KEYWORDS: [&str; 9] = [
    "whatsapp", "wa.me", "exists", "true", "valid", "success", "ok", "found", "active",
];

/// How a 2xx response body is turned into a verdict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndicatorPolicy {
    /// JSON body with a boolean `exists` field.
    ExistsField,
    /// Any of these (lowercase) keywords in the lowercased body means found.
    Keywords(Vec<String>),
}

impl IndicatorPolicy {
    pub fn default_keywords() -> Self {
        Self::Keywords(DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect())
    }

    /// Interpret one response.
    ///
    /// Non-2xx is always an error. `ExistsField` also rejects bodies without a
    /// boolean `exists`; `Keywords` accepts any body.
    pub fn interpret(&self, resp: &FetchedResponse) -> Result<bool> {
        if !resp.is_success() {
            return Err(Error::Network(format!(
                "oracle returned HTTP {}",
                resp.status
            )));
        }

        match self {
            IndicatorPolicy::ExistsField => {
                let v: serde_json::Value = serde_json::from_str(&resp.body)
                    .map_err(|e| Error::MalformedResponse(format!("body is not JSON: {e}")))?;
                v.get("exists").and_then(|e| e.as_bool()).ok_or_else(|| {
                    Error::MalformedResponse("missing boolean `exists` field".to_string())
                })
            }
            IndicatorPolicy::Keywords(words) => {
                let body = resp.body.to_lowercase();
                Ok(words.iter().any(|w| !w.is_empty() && body.contains(w.as_str())))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OracleStrategy {
    Single,
    Fallback,
}

impl OracleStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "single" => Some(Self::Single),
            "fallback" | "multi" => Some(Self::Fallback),
            _ => None,
        }
    }
}

/// Render an endpoint template for one identifier.
pub fn render_endpoint(template: &str, identifier: &Identifier) -> String {
    template.replace(PHONE_PLACEHOLDER, identifier.as_str())
}

/// [`IdentityOracle`] that queries HTTP endpoints through a [`Fetcher`].
pub struct EndpointOracle {
    fetcher: Arc<dyn Fetcher>,
    endpoints: Vec<String>,
    strategy: OracleStrategy,
    policy: IndicatorPolicy,
}

impl EndpointOracle {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        endpoints: Vec<String>,
        strategy: OracleStrategy,
        policy: IndicatorPolicy,
    ) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::Config("oracle needs at least one endpoint".to_string()));
        }
        if let Some(bad) = endpoints.iter().find(|e| !e.contains(PHONE_PLACEHOLDER)) {
            return Err(Error::Config(format!(
                "endpoint template has no {PHONE_PLACEHOLDER} placeholder: {bad}"
            )));
        }
        Ok(Self {
            fetcher,
            endpoints,
            strategy,
            policy,
        })
    }

    async fn verify_single(
        &self,
        identifier: &Identifier,
        relay: Option<&Relay>,
    ) -> Result<Verdict> {
        let url = render_endpoint(&self.endpoints[0], identifier);
        let resp = self.fetcher.get(&url, relay).await?;
        if self.policy.interpret(&resp)? {
            Ok(Verdict::Found {
                endpoint: Some(url),
            })
        } else {
            Ok(Verdict::NotFound)
        }
    }

    async fn verify_fallback(
        &self,
        identifier: &Identifier,
        relay: Option<&Relay>,
    ) -> Result<Verdict> {
        for template in &self.endpoints {
            let url = render_endpoint(template, identifier);
            let positive = match self.fetcher.get(&url, relay).await {
                Ok(resp) => self.policy.interpret(&resp),
                Err(e) => Err(e),
            };
            match positive {
                Ok(true) => {
                    return Ok(Verdict::Found {
                        endpoint: Some(url),
                    })
                }
                Ok(false) => {}
                Err(e) => tracing::debug!(%identifier, endpoint = %url, "endpoint skipped: {e}"),
            }
        }
        Ok(Verdict::NotFound)
    }
}

#[async_trait]
impl IdentityOracle for EndpointOracle {
    async fn verify(&self, identifier: &Identifier, relay: Option<&Relay>) -> Result<Verdict> {
        match self.strategy {
            OracleStrategy::Single => self.verify_single(identifier, relay).await,
            OracleStrategy::Fallback => self.verify_fallback(identifier, relay).await,
        }
    }

    fn check_relay(&self, relay: &Relay) -> Result<()> {
        self.fetcher.check_relay(relay)
    }
}
