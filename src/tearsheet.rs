use serde::Serialize;

use crate::{
    config::TearsheetConfig,
    error::TearsheetResult,
    frame::DatedFrame,
    report::{
        aggregate::{AggregatePerformance, AggregateSummary, ExposureSummary},
        annual::AnnualBreakdown,
        io::ToJson,
        monte_carlo::{MonteCarloSimulation, MonteCarloSimulator},
        performance::Performance,
        pnl::PnlBreakdown,
        statistics::EntityScalars,
    },
};

/// Computes every section of a full tearsheet from a [`Performance`].
///
/// Only data is produced; charting is left to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tearsheet {
    cfg: TearsheetConfig,
}

/// Output of [`Tearsheet::create_full_tearsheet`].
#[derive(Debug)]
pub struct TearsheetReport {
    pub performance: PerformanceSection,
    pub annual: Option<AnnualSection>,
    pub exposures: Option<ExposureSection>,
    pub montecarlo: Option<MonteCarloSimulation>,
}

#[derive(Debug)]
pub struct PerformanceSection {
    pub summary: AggregateSummary,
    pub cum_returns: DatedFrame,
    pub drawdowns: DatedFrame,
    /// Running gross vs. net PNL of the aggregate, when PNL and commissions exist.
    pub gross_and_net_pnl: Option<DatedFrame>,
    /// Per-entity view; only for multi-entity performances.
    pub details: Option<PerformanceDetails>,
}

/// Per-entity statistics, each list sorted ascending as the bar charts show them.
#[derive(Debug)]
pub struct PerformanceDetails {
    pub cum_returns: DatedFrame,
    pub drawdowns: DatedFrame,
    pub cagr: Vec<(String, f64)>,
    pub sharpe: Vec<(String, f64)>,
    pub max_drawdown: Vec<(String, f64)>,
    pub total_pnl: Option<Vec<(String, f64)>>,
    /// Net PNL, gross PNL and commissions per entity.
    pub pnl_breakdown: Option<PnlBreakdown>,
}

#[derive(Debug)]
pub struct AnnualSection {
    pub aggregate: AnnualBreakdown,
    pub details: Option<AnnualBreakdown>,
}

#[derive(Debug)]
pub struct ExposureSection {
    pub summary: ExposureSummary,
    pub net_exposures: Option<DatedFrame>,
    pub abs_exposures: Option<DatedFrame>,
    pub details: Option<ExposureDetails>,
}

#[derive(Debug)]
pub struct ExposureDetails {
    pub net_exposures: Option<DatedFrame>,
    pub abs_exposures: Option<DatedFrame>,
    pub avg_net_exposure: Option<Vec<(String, f64)>>,
    pub avg_abs_exposure: Option<Vec<(String, f64)>>,
    pub normalized_cagr: Option<Vec<(String, f64)>>,
}

/// Headline figures of a [`TearsheetReport`] in a serializable form.
#[derive(Debug, Clone, Serialize)]
pub struct TearsheetSummary {
    pub performance: AggregateSummary,
    pub exposures: Option<ExposureSummary>,
    pub annual: Option<serde_json::Value>,
}

impl Tearsheet {
    pub fn new(cfg: TearsheetConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &TearsheetConfig {
        &self.cfg
    }

    #[tracing::instrument(skip_all, fields(entities = performance.entities().len()))]
    pub fn create_full_tearsheet(&self, performance: &Performance) -> TearsheetResult<TearsheetReport> {
        let aggregate = AggregatePerformance::new(performance)?;
        let multi_entity = performance.entities().len() > 1;

        let performance_section = create_performance_section(performance, &aggregate, multi_entity)?;

        let annual = if self.cfg.include_annual_breakdown() {
            Some(AnnualSection {
                aggregate: aggregate.annual_breakdown()?.clone(),
                details: multi_entity
                    .then(|| performance.annual_breakdown().cloned())
                    .transpose()?,
            })
        } else {
            None
        };

        let exposures = if self.cfg.include_exposures() {
            create_exposure_section(performance, &aggregate, multi_entity)?
        } else {
            None
        };

        let montecarlo = self
            .cfg
            .montecarlo()
            .map(|mc| MonteCarloSimulator::new(performance.returns()).simulate_with(mc))
            .transpose()?;

        tracing::info!(
            annual = annual.is_some(),
            exposures = exposures.is_some(),
            montecarlo = montecarlo.is_some(),
            "Tearsheet created"
        );

        Ok(TearsheetReport {
            performance: performance_section,
            annual,
            exposures,
            montecarlo,
        })
    }
}

impl TearsheetReport {
    pub fn summary(&self) -> TearsheetResult<TearsheetSummary> {
        Ok(TearsheetSummary {
            performance: self.performance.summary,
            exposures: self.exposures.as_ref().map(|e| e.summary),
            annual: self
                .annual
                .as_ref()
                .map(|a| a.aggregate.to_json())
                .transpose()?,
        })
    }
}

fn create_performance_section(
    performance: &Performance,
    aggregate: &AggregatePerformance,
    multi_entity: bool,
) -> TearsheetResult<PerformanceSection> {
    let details = if multi_entity {
        Some(PerformanceDetails {
            cum_returns: performance.cum_returns()?.clone(),
            drawdowns: performance.drawdowns()?.clone(),
            cagr: sorted(performance.cagr()?),
            sharpe: sorted(performance.sharpe()?),
            max_drawdown: sorted(performance.max_drawdown()?),
            total_pnl: performance.total_pnl()?.map(sorted),
            pnl_breakdown: performance.pnl_breakdown()?.cloned(),
        })
    } else {
        None
    };

    Ok(PerformanceSection {
        summary: aggregate.summary()?,
        cum_returns: aggregate.cum_returns()?.clone(),
        drawdowns: aggregate.drawdowns()?.clone(),
        gross_and_net_pnl: aggregate.cumulative_pnl_breakdown()?,
        details,
    })
}

fn create_exposure_section(
    performance: &Performance,
    aggregate: &AggregatePerformance,
    multi_entity: bool,
) -> TearsheetResult<Option<ExposureSection>> {
    let Some(summary) = aggregate.exposure_summary()? else {
        tracing::debug!("No exposure tables, skipping exposure section");
        return Ok(None);
    };

    let details = if multi_entity {
        Some(ExposureDetails {
            net_exposures: performance.net_exposures().cloned(),
            abs_exposures: performance.abs_exposures().cloned(),
            avg_net_exposure: performance.avg_net_exposure()?.map(sorted),
            avg_abs_exposure: performance.avg_abs_exposure()?.map(sorted),
            normalized_cagr: performance.normalized_cagr()?.map(sorted),
        })
    } else {
        None
    };

    Ok(Some(ExposureSection {
        summary,
        net_exposures: aggregate.as_performance().net_exposures().cloned(),
        abs_exposures: aggregate.as_performance().abs_exposures().cloned(),
        details,
    }))
}

fn sorted(scalars: &EntityScalars) -> Vec<(String, f64)> {
    scalars
        .sorted()
        .into_iter()
        .map(|(entity, v)| (entity.to_string(), v))
        .collect()
}
