use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context};

use numcheck_core::{
    config::Config,
    domain::RunPhase,
    engine::CheckEngine,
    oracle::EndpointOracle,
    ports::{Fetcher, LogProgress},
    store::FileResultStore,
};
use numcheck_http::ReqwestFetcher;

const USAGE: &str = "usage: numcheck <numbers.txt> [relays.txt]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    numcheck_core::logging::init("numcheck")?;

    let mut args = std::env::args_os().skip(1).map(PathBuf::from);
    let Some(numbers_path) = args.next() else {
        bail!(USAGE);
    };
    let relays_path = args.next();

    let cfg = Config::load()?;

    let numbers = tokio::fs::read_to_string(&numbers_path)
        .await
        .with_context(|| format!("reading {}", numbers_path.display()))?;
    let relays = match &relays_path {
        Some(p) => Some(
            tokio::fs::read_to_string(p)
                .await
                .with_context(|| format!("reading {}", p.display()))?,
        ),
        None => None,
    };

    let fetcher: Arc<dyn Fetcher> = Arc::new(ReqwestFetcher::from_config(&cfg.oracle)?);
    let oracle = Arc::new(EndpointOracle::new(
        fetcher,
        cfg.oracle.endpoints.clone(),
        cfg.oracle.strategy,
        cfg.oracle.policy.clone(),
    )?);
    let store = Arc::new(FileResultStore::new(cfg.output_dir.clone()));

    let engine = Arc::new(
        CheckEngine::new(cfg.engine.clone(), oracle)
            .with_progress(Arc::new(LogProgress))
            .with_store(store.clone()),
    );

    let summary = engine
        .load(&numbers, relays.as_deref())
        .await
        .context("loading inputs")?;
    tracing::info!(
        numbers = summary.identifiers,
        relays = summary.relays,
        rejected_relays = summary.rejected_relays,
        delay_ms = cfg.engine.delay.as_millis() as u64,
        max_retries = cfg.engine.max_retries,
        "starting check"
    );

    // Ctrl-C requests a cooperative stop; the number in flight still finishes.
    let stop = engine.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("stop requested, finishing current number");
            stop.stop();
        }
    });

    let report = engine.start().await?;
    let s = report.stats;
    println!(
        "{}: checked {}/{}, found {}, not found {}, errors {}",
        match report.phase {
            RunPhase::Stopped => "stopped",
            _ => "completed",
        },
        s.checked,
        s.total,
        s.found,
        s.not_found,
        s.errors
    );
    println!("found numbers: {}", store.found_path().display());
    println!("full results:  {}", store.full_results_path().display());

    Ok(())
}
