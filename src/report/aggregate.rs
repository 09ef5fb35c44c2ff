use serde::Serialize;

use crate::{
    error::{SystemError, TearsheetResult},
    frame::DatedFrame,
    report::{
        annual::AnnualBreakdown,
        cache::CacheState,
        performance::{AuxTable, Performance, PerformanceBuilder},
        pnl::cumulative_pnl_breakdown,
        statistics::EntityScalars,
    },
};

/// Name of the single column an [`AggregatePerformance`] carries.
pub const AGGREGATE_COL: &str = "aggregate";

/// Portfolio-level view of a [`Performance`]: every present table summed
/// row-wise into one `aggregate` column.
///
/// Tables absent on the source stay absent on the aggregate.
#[derive(Debug)]
pub struct AggregatePerformance {
    inner: Performance,
}

impl AggregatePerformance {
    #[tracing::instrument(skip_all, fields(entities = source.entities().len()))]
    pub fn new(source: &Performance) -> TearsheetResult<Self> {
        let reduce = |table: AuxTable| -> TearsheetResult<Option<DatedFrame>> {
            source
                .table(table)
                .map(|t| t.sum_entities(AGGREGATE_COL))
                .transpose()
        };

        let mut builder = PerformanceBuilder::new(source.returns().sum_entities(AGGREGATE_COL)?)
            .config(*source.config());
        if let Some(pnl) = reduce(AuxTable::Pnl)? {
            builder = builder.pnl(pnl);
        }
        if let Some(commissions) = reduce(AuxTable::Commissions)? {
            builder = builder.commissions(commissions);
        }
        if let Some(net) = reduce(AuxTable::NetExposures)? {
            builder = builder.net_exposures(net);
        }
        if let Some(abs) = reduce(AuxTable::AbsExposures)? {
            builder = builder.abs_exposures(abs);
        }

        Ok(Self {
            inner: builder.build()?,
        })
    }

    /// The aggregate as a regular single-entity [`Performance`].
    pub fn as_performance(&self) -> &Performance {
        &self.inner
    }

    pub fn returns(&self) -> &DatedFrame {
        self.inner.returns()
    }

    pub fn table(&self, table: AuxTable) -> Option<&DatedFrame> {
        self.inner.table(table)
    }

    pub fn cache_state(&self) -> CacheState {
        self.inner.cache_state()
    }

    pub fn fill_performance_cache(&self) -> TearsheetResult<()> {
        self.inner.fill_performance_cache()
    }

    pub fn cum_returns(&self) -> TearsheetResult<&DatedFrame> {
        self.inner.cum_returns()
    }

    pub fn drawdowns(&self) -> TearsheetResult<&DatedFrame> {
        self.inner.drawdowns()
    }

    pub fn annual_breakdown(&self) -> TearsheetResult<&AnnualBreakdown> {
        self.inner.annual_breakdown()
    }

    pub fn cagr(&self) -> TearsheetResult<f64> {
        single(self.inner.cagr()?)
    }

    pub fn sharpe(&self) -> TearsheetResult<f64> {
        single(self.inner.sharpe()?)
    }

    pub fn max_drawdown(&self) -> TearsheetResult<f64> {
        single(self.inner.max_drawdown()?)
    }

    pub fn avg_net_exposure(&self) -> TearsheetResult<Option<f64>> {
        self.inner.avg_net_exposure()?.map(single).transpose()
    }

    pub fn avg_abs_exposure(&self) -> TearsheetResult<Option<f64>> {
        self.inner.avg_abs_exposure()?.map(single).transpose()
    }

    pub fn normalized_cagr(&self) -> TearsheetResult<Option<f64>> {
        self.inner.normalized_cagr()?.map(single).transpose()
    }

    pub fn total_pnl(&self) -> TearsheetResult<Option<f64>> {
        self.inner.total_pnl()?.map(single).transpose()
    }

    pub fn total_commissions(&self) -> TearsheetResult<Option<f64>> {
        self.inner.total_commissions()?.map(single).transpose()
    }

    /// Running `pnl`, `gross_pnl` and `commissions` of the aggregate.
    pub fn cumulative_pnl_breakdown(&self) -> TearsheetResult<Option<DatedFrame>> {
        match (
            self.table(AuxTable::Pnl),
            self.table(AuxTable::Commissions),
        ) {
            (Some(pnl), Some(commissions)) => cumulative_pnl_breakdown(pnl, commissions).map(Some),
            _ => Ok(None),
        }
    }

    /// Headline figures, rounded to three decimals.
    pub fn summary(&self) -> TearsheetResult<AggregateSummary> {
        Ok(AggregateSummary {
            pnl: self.total_pnl()?.map(round3),
            commissions: self.total_commissions()?.map(round3),
            cagr: round3(self.cagr()?),
            sharpe: round3(self.sharpe()?),
            max_drawdown: round3(self.max_drawdown()?),
        })
    }

    /// Exposure figures, rounded to three decimals. `None` without any exposure table.
    pub fn exposure_summary(&self) -> TearsheetResult<Option<ExposureSummary>> {
        if self.table(AuxTable::NetExposures).is_none()
            && self.table(AuxTable::AbsExposures).is_none()
        {
            return Ok(None);
        }

        Ok(Some(ExposureSummary {
            avg_net_exposure: self.avg_net_exposure()?.map(round3),
            avg_abs_exposure: self.avg_abs_exposure()?.map(round3),
            normalized_cagr: self.normalized_cagr()?.map(round3),
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateSummary {
    pub pnl: Option<f64>,
    pub commissions: Option<f64>,
    pub cagr: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExposureSummary {
    pub avg_net_exposure: Option<f64>,
    pub avg_abs_exposure: Option<f64>,
    pub normalized_cagr: Option<f64>,
}

fn single(scalars: &EntityScalars) -> TearsheetResult<f64> {
    scalars.only().ok_or_else(|| {
        SystemError::InvariantViolation(format!(
            "aggregate must have exactly one entity, found {}",
            scalars.len()
        ))
        .into()
    })
}

fn round3(value: f64) -> f64 {
    (value * 1_000.0).round() / 1_000.0
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use polars::prelude::PlSmallStr;

    use super::*;

    fn dates(n: u32) -> Vec<NaiveDate> {
        (1..=n)
            .map(|day| NaiveDate::from_ymd_opt(2024, 5, day).expect("valid date"))
            .collect()
    }

    fn table(n: u32, columns: Vec<(&str, Vec<f64>)>) -> DatedFrame {
        DatedFrame::from_columns(&dates(n), columns).expect("Failed to build table")
    }

    #[test]
    fn test_aggregate_returns_are_row_sums() {
        let perf = Performance::builder(table(
            2,
            vec![("A", vec![0.01, 0.02]), ("B", vec![-0.01, 0.01])],
        ))
        .build()
        .expect("Failed to build");

        let agg = AggregatePerformance::new(&perf).expect("aggregate");
        assert_eq!(agg.returns().entities(), &[PlSmallStr::from(AGGREGATE_COL)]);

        let values = agg.returns().values(AGGREGATE_COL).expect("values");
        assert!((values[0] - 0.0).abs() < 1e-12);
        assert!((values[1] - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_absent_tables_stay_absent() {
        let perf = Performance::builder(table(2, vec![("A", vec![0.01, 0.02])]))
            .abs_exposures(table(2, vec![("A", vec![0.5, 0.5])]))
            .build()
            .expect("Failed to build");

        let agg = AggregatePerformance::new(&perf).expect("aggregate");
        assert!(agg.table(AuxTable::AbsExposures).is_some());
        assert!(agg.table(AuxTable::NetExposures).is_none());
        assert!(agg.table(AuxTable::Pnl).is_none());
        assert_eq!(agg.total_pnl().expect("pnl"), None);
        assert_eq!(agg.avg_net_exposure().expect("net"), None);
        assert!(agg.cumulative_pnl_breakdown().expect("cum pnl").is_none());
    }

    #[test]
    fn test_absolute_exposures_add_up() {
        let perf = Performance::builder(table(
            3,
            vec![("A", vec![0.01, 0.0, 0.01]), ("B", vec![0.0, 0.01, 0.0])],
        ))
        .net_exposures(table(
            3,
            vec![("A", vec![0.25, 0.25, 0.25]), ("B", vec![-0.25, -0.25, -0.25])],
        ))
        .abs_exposures(table(
            3,
            vec![("A", vec![0.25, 0.25, 0.25]), ("B", vec![0.25, 0.25, 0.25])],
        ))
        .build()
        .expect("Failed to build");

        let agg = AggregatePerformance::new(&perf).expect("aggregate");
        let summary = agg.exposure_summary().expect("summary").expect("exposures");
        assert_eq!(summary.avg_abs_exposure, Some(0.5));
        assert_eq!(summary.avg_net_exposure, Some(0.0));

        let norm = agg.normalized_cagr().expect("norm").expect("present");
        let cagr = agg.cagr().expect("cagr");
        assert!((norm - cagr / 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_summary_is_rounded() {
        let perf = Performance::builder(table(
            3,
            vec![("A", vec![0.01, -0.02, 0.03])],
        ))
        .pnl(table(3, vec![("A", vec![10.1234, -20.0, 30.0])]))
        .commissions(table(3, vec![("A", vec![-0.5, -0.5, -0.5])]))
        .build()
        .expect("Failed to build");

        let agg = AggregatePerformance::new(&perf).expect("aggregate");
        let summary = agg.summary().expect("summary");
        assert_eq!(summary.pnl, Some(20.123));
        assert_eq!(summary.commissions, Some(-1.5));
        assert!((summary.max_drawdown - (-0.02)).abs() < 1e-12);
        assert_eq!(summary.cagr, round3(summary.cagr));

        let json = serde_json::to_value(summary).expect("serialize");
        assert_eq!(json["commissions"], serde_json::json!(-1.5));
        assert!(agg.exposure_summary().expect("exposures").is_none());
    }

    #[test]
    fn test_cache_is_shared_with_inner_performance() {
        let perf = Performance::builder(table(2, vec![("A", vec![0.01, 0.02])]))
            .build()
            .expect("Failed to build");
        let agg = AggregatePerformance::new(&perf).expect("aggregate");

        assert_eq!(agg.cache_state(), CacheState::Empty);
        agg.fill_performance_cache().expect("fill");
        assert_eq!(agg.cache_state(), CacheState::Filled);
        assert_eq!(agg.as_performance().cache_state(), CacheState::Filled);
        assert_eq!(perf.cache_state(), CacheState::Empty, "source is untouched");
    }
}
