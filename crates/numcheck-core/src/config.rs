use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    errors::Error,
    normalize::IdentifierPolicy,
    oracle::{
        IndicatorPolicy, OracleStrategy, DEFAULT_ENDPOINTS, DEFAULT_KEYWORDS, PHONE_PLACEHOLDER,
    },
    Result,
};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// When the run loop hands outcomes to the result store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistCadence {
    EveryItem,
    EveryN(usize),
    /// Only the final flush (completion or stop).
    OnCompletion,
}

impl PersistCadence {
    /// `0` means completion only, `1` every item, `n` every n items.
    pub fn from_every(n: usize) -> Self {
        match n {
            0 => Self::OnCompletion,
            1 => Self::EveryItem,
            n => Self::EveryN(n),
        }
    }

    pub fn is_due(self, checked: usize) -> bool {
        match self {
            Self::EveryItem => true,
            Self::EveryN(n) => checked % n == 0,
            Self::OnCompletion => false,
        }
    }
}

/// Run-level knobs consumed by the engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Pause between identifiers (not after the last one).
    pub delay: Duration,
    /// Extra attempts after the first failed one.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub identifier_policy: IdentifierPolicy,
    pub max_identifiers: Option<usize>,
    pub max_relays: Option<usize>,
    pub persist: PersistCadence,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1000),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            identifier_policy: IdentifierPolicy::lenient(),
            max_identifiers: Some(10_000),
            max_relays: Some(1_000),
            persist: PersistCadence::EveryItem,
        }
    }
}

/// HTTP oracle settings consumed by the fetcher + endpoint oracle.
#[derive(Clone, Debug)]
pub struct OracleConfig {
    pub strategy: OracleStrategy,
    pub endpoints: Vec<String>,
    pub policy: IndicatorPolicy,
    pub request_timeout: Duration,
    pub user_agent: String,
}

/// Typed configuration loaded from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub engine: EngineConfig,
    pub oracle: OracleConfig,
    pub output_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production, a map in tests).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let u64_of = |key: &str| get(key).and_then(|s| s.trim().parse::<u64>().ok());
        let usize_of = |key: &str| get(key).and_then(|s| s.trim().parse::<usize>().ok());
        let cap_of = |key: &str, default: usize| match usize_of(key).unwrap_or(default) {
            0 => None,
            n => Some(n),
        };

        // Engine
        let strict = get("NUMCHECK_STRICT_LENGTH").is_some_and(|s| parse_bool(&s));
        let identifier_policy = if strict {
            IdentifierPolicy::strict()
        } else {
            IdentifierPolicy::lenient()
        };
        let engine = EngineConfig {
            delay: Duration::from_millis(u64_of("NUMCHECK_DELAY_MS").unwrap_or(1000)),
            max_retries: u64_of("NUMCHECK_MAX_RETRIES").unwrap_or(3).min(u32::MAX as u64) as u32,
            retry_delay: Duration::from_millis(u64_of("NUMCHECK_RETRY_DELAY_MS").unwrap_or(1000)),
            identifier_policy,
            max_identifiers: cap_of("NUMCHECK_MAX_IDENTIFIERS", 10_000),
            max_relays: cap_of("NUMCHECK_MAX_RELAYS", 1_000),
            persist: PersistCadence::from_every(usize_of("NUMCHECK_PERSIST_EVERY").unwrap_or(1)),
        };

        // Oracle
        let strategy = match get("NUMCHECK_ORACLE_MODE").and_then(non_empty) {
            None => OracleStrategy::Fallback,
            Some(s) => OracleStrategy::parse(&s).ok_or_else(|| {
                Error::Config(format!("NUMCHECK_ORACLE_MODE must be single or fallback, got {s}"))
            })?,
        };

        let endpoints = parse_csv(get("NUMCHECK_ORACLE_ENDPOINTS"))
            .unwrap_or_else(|| DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect());
        if let Some(bad) = endpoints.iter().find(|e| !e.contains(PHONE_PLACEHOLDER)) {
            return Err(Error::Config(format!(
                "NUMCHECK_ORACLE_ENDPOINTS entry lacks {PHONE_PLACEHOLDER}: {bad}"
            )));
        }

        let policy = match get("NUMCHECK_ORACLE_POLICY")
            .and_then(non_empty)
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            None | Some("keywords") => {
                let words = parse_csv(get("NUMCHECK_ORACLE_KEYWORDS"))
                    .map(|ws| ws.into_iter().map(|w| w.to_lowercase()).collect())
                    .unwrap_or_else(|| DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect());
                IndicatorPolicy::Keywords(words)
            }
            Some("exists") => IndicatorPolicy::ExistsField,
            Some(other) => {
                return Err(Error::Config(format!(
                    "NUMCHECK_ORACLE_POLICY must be keywords or exists, got {other}"
                )))
            }
        };

        let oracle = OracleConfig {
            strategy,
            endpoints,
            policy,
            request_timeout: Duration::from_millis(
                u64_of("NUMCHECK_REQUEST_TIMEOUT_MS").unwrap_or(30_000),
            ),
            user_agent: get("NUMCHECK_USER_AGENT")
                .and_then(non_empty)
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        };

        let output_dir = PathBuf::from(
            get("NUMCHECK_OUTPUT_DIR")
                .and_then(non_empty)
                .unwrap_or_else(|| "results".to_string()),
        );

        Ok(Self {
            engine,
            oracle,
            output_dir,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_csv(v: Option<String>) -> Option<Vec<String>> {
    let out = v?
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
