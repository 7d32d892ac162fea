//! reqwest adapter for the oracle [`Fetcher`] port.
//!
//! Relays become forward proxies: bare `host:port` entries are used as
//! `http://host:port`, `http…` entries verbatim. A relay reqwest cannot turn
//! into a proxy is logged and the request goes out directly.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER};

use numcheck_core::{
    config::OracleConfig,
    domain::Relay,
    errors::Error,
    ports::{FetchedResponse, Fetcher},
    Result,
};

const REFERER_URL: &str = "https://web.whatsapp.com/";
const ORIGIN_URL: &str = "https://web.whatsapp.com";

/// Cap on bodies we keep; indicator matching never needs more.
const MAX_BODY_BYTES: usize = 256 * 1024;

#[derive(Debug)]
pub struct ReqwestFetcher {
    timeout: Duration,
    user_agent: String,
    direct: reqwest::Client,
    // One client per relay; reqwest binds proxies at build time.
    proxied: Mutex<HashMap<String, reqwest::Client>>,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Result<Self> {
        let user_agent = user_agent.into();
        let direct = build_client(timeout, &user_agent, None)?;
        Ok(Self {
            timeout,
            user_agent,
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_config(cfg: &OracleConfig) -> Result<Self> {
        Self::new(cfg.request_timeout, cfg.user_agent.clone())
    }

    fn proxied_client(&self, relay: &Relay) -> Result<reqwest::Client> {
        let mut cache = match self.proxied.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(c) = cache.get(relay.as_str()) {
            return Ok(c.clone());
        }

        let c = build_client(self.timeout, &self.user_agent, Some(relay))?;
        cache.insert(relay.as_str().to_string(), c.clone());
        Ok(c)
    }

    fn client_for(&self, relay: Option<&Relay>) -> reqwest::Client {
        let Some(relay) = relay else {
            return self.direct.clone();
        };

        match self.proxied_client(relay) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(relay = %relay, "relay unusable, connecting directly: {e}");
                self.direct.clone()
            }
        }
    }
}

fn default_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9,ar;q=0.8"));
    h.insert(REFERER, HeaderValue::from_static(REFERER_URL));
    h.insert(ORIGIN, HeaderValue::from_static(ORIGIN_URL));
    h
}

fn build_client(
    timeout: Duration,
    user_agent: &str,
    relay: Option<&Relay>,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .default_headers(default_headers());

    builder = match relay {
        Some(r) => {
            let proxy = reqwest::Proxy::all(r.proxy_url())
                .map_err(|e| Error::InvalidRelay(format!("{r}: {e}")))?;
            builder.proxy(proxy)
        }
        None => builder.no_proxy(),
    };

    builder
        .build()
        .map_err(|e| Error::External(format!("http client build error: {e}")))
}

fn map_err(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Network(format!("request timed out: {e}"))
    } else {
        Error::Network(e.to_string())
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn get(&self, url: &str, relay: Option<&Relay>) -> Result<FetchedResponse> {
        let client = self.client_for(relay);
        let mut resp = client.get(url).send().await.map_err(map_err)?;

        let status = resp.status().as_u16();
        let mut buf = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(map_err)? {
            let room = MAX_BODY_BYTES - buf.len();
            buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if buf.len() >= MAX_BODY_BYTES {
                break;
            }
        }
        let body = String::from_utf8_lossy(&buf).into_owned();

        Ok(FetchedResponse { status, body })
    }

    fn check_relay(&self, relay: &Relay) -> Result<()> {
        self.proxied_client(relay).map(|_| ())
    }
}
