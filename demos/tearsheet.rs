use std::{num::NonZeroUsize, time::Instant};

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tearsheet::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing();

    println!("Building performance...");
    let perf = performance()?;

    let mc = MonteCarloConfig::new(NonZeroUsize::new(5).context("n must be non-zero")?)
        .with_preaggregate(true)
        .with_seed(42);
    let cfg = TearsheetConfig::default().with_montecarlo(mc);

    let start = Instant::now();
    let report = Tearsheet::new(cfg).create_full_tearsheet(&perf)?;
    let elapsed = start.elapsed();

    println!("\n--- Aggregate Performance ---");
    println!("{}", serde_json::to_string_pretty(&report.summary()?)?);

    if let Some(details) = &report.performance.details {
        println!("\n--- CAGR (Details) ---");
        for (entity, cagr) in &details.cagr {
            println!("{entity:>8}: {cagr:>8.3}");
        }
    }

    if let Some(sim) = &report.montecarlo {
        let actual = sim.actual_cum_returns().values(AGGREGATE_COL)?;
        println!("\n--- Monte Carlo ({} simulations) ---", sim.n());
        println!("   actual: {:.4}", actual.last().copied().unwrap_or(f64::NAN));
        for entity in sim.simulated_cum_returns().entities() {
            let cum = sim.simulated_cum_returns().values(entity)?;
            println!("{entity:>9}: {:.4}", cum.last().copied().unwrap_or(f64::NAN));
        }
    }

    println!("\nTearsheet computed in {elapsed:?}");
    Ok(())
}

// ================================================================================================
// Tracing Configuration
// ================================================================================================

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
        .with_current_span(true)
        .with_thread_ids(true)
        .init();

    info!("Logging to stdout");
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn performance() -> Result<Performance> {
    let dates = business_days(
        NaiveDate::from_ymd_opt(2022, 1, 3).context("invalid start date")?,
        600,
    );
    let n = dates.len();

    let strategies = [("trend", 0usize, 0.6), ("revert", 4, 0.3), ("carry", 9, 0.1)];
    let column = |f: &dyn Fn(usize, f64) -> Vec<f64>| -> Vec<(&'static str, Vec<f64>)> {
        strategies
            .iter()
            .map(|(name, phase, weight)| (*name, f(*phase, *weight)))
            .collect()
    };

    let returns = DatedFrame::from_columns(
        &dates,
        column(&|phase, weight| {
            (0..n)
                .map(|i| weight * (((i * 13 + phase * 5) % 17) as f64 - 7.8) / 400.0)
                .collect()
        }),
    )?;
    let pnl = DatedFrame::from_columns(
        &dates,
        column(&|phase, weight| {
            (0..n)
                .map(|i| weight * 1_000.0 * (((i * 13 + phase * 5) % 17) as f64 - 7.8) / 400.0)
                .collect()
        }),
    )?;
    let commissions =
        DatedFrame::from_columns(&dates, column(&|_, weight| vec![-0.2 * weight; n]))?;
    let abs_exposures = DatedFrame::from_columns(&dates, column(&|_, weight| vec![weight; n]))?;

    let perf = Performance::builder(returns)
        .pnl(pnl)
        .commissions(commissions)
        .abs_exposures(abs_exposures)
        .build()?;
    Ok(perf)
}

fn business_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    std::iter::successors(Some(start), |d| Some(*d + Duration::days(1)))
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(n)
        .collect()
}
