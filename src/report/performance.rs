use polars::prelude::{DataFrame, Expr, IntoLazy, PlSmallStr, col, lit};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

use crate::{
    config::StatsConfig,
    error::{DataError, TearsheetError, TearsheetResult},
    frame::DatedFrame,
    report::{
        annual::AnnualBreakdown,
        cache::{CacheState, StatCache},
        pnl::{PnlBreakdown, cumulative_pnl_breakdown},
        polars_ext::polars_to_tearsheet_error,
        series::{cum_returns, drawdowns, max_drawdown, with_baseline},
        statistics::{EntityScalars, avg_exposure, cagr, normalized_cagr, sharpe, total},
    },
};

/// Name of the column holding the field label in long-format backtest results.
pub const FIELD_COL: &str = "field";

const TOTAL_COL: &str = "total";

// ================================================================================================
// Optional Tables
// ================================================================================================

/// Optional per-period tables a [`Performance`] may carry next to its returns.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Display,
    PartialOrd,
    Ord,
    EnumIter,
    IntoStaticStr,
    EnumCount,
)]
#[strum(serialize_all = "snake_case")]
pub enum AuxTable {
    Pnl,
    Commissions,
    NetExposures,
    AbsExposures,
}

/// Statistics a [`Performance`] exposes, with the optional tables each needs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum DerivedStat {
    CumReturns,
    Drawdowns,
    MaxDrawdown,
    Cagr,
    Sharpe,
    AnnualBreakdown,
    AvgNetExposure,
    AvgAbsExposure,
    NormalizedCagr,
    TotalPnl,
    TotalCommissions,
    PnlBreakdown,
    CumulativePnlBreakdown,
}

impl DerivedStat {
    pub fn requires(&self) -> &'static [AuxTable] {
        match self {
            Self::CumReturns
            | Self::Drawdowns
            | Self::MaxDrawdown
            | Self::Cagr
            | Self::Sharpe
            | Self::AnnualBreakdown => &[],
            Self::AvgNetExposure => &[AuxTable::NetExposures],
            Self::AvgAbsExposure | Self::NormalizedCagr => &[AuxTable::AbsExposures],
            Self::TotalPnl => &[AuxTable::Pnl],
            Self::TotalCommissions => &[AuxTable::Commissions],
            Self::PnlBreakdown | Self::CumulativePnlBreakdown => {
                &[AuxTable::Pnl, AuxTable::Commissions]
            }
        }
    }
}

/// Fields recognized in long-format backtest results.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "PascalCase")]
pub enum ResultField {
    Return,
    Pnl,
    Commission,
    NetExposure,
    AbsExposure,
}

impl ResultField {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

// ================================================================================================
// Cached Statistics
// ================================================================================================

/// Statistics filled together by [`Performance::fill_performance_cache`].
#[derive(Debug)]
struct CoreStats {
    cum_returns: DatedFrame,
    drawdowns: DatedFrame,
    max_drawdown: EntityScalars,
    cagr: EntityScalars,
    sharpe: EntityScalars,
}

#[derive(Debug)]
struct ExposureStats {
    avg_net: Option<EntityScalars>,
    avg_abs: Option<EntityScalars>,
    normalized_cagr: Option<EntityScalars>,
}

#[derive(Debug)]
struct PnlStats {
    total_pnl: Option<EntityScalars>,
    total_commissions: Option<EntityScalars>,
    breakdown: Option<PnlBreakdown>,
}

// ================================================================================================
// Performance
// ================================================================================================

/// Returns of one or more entities plus optional PNL, commission and exposure
/// tables, with lazily cached derived statistics.
///
/// Every accessor fills the statistics it depends on the first time it is
/// called; afterwards the cached value is returned unchanged.
#[derive(Debug)]
pub struct Performance {
    returns: DatedFrame,
    pnl: Option<DatedFrame>,
    commissions: Option<DatedFrame>,
    net_exposures: Option<DatedFrame>,
    abs_exposures: Option<DatedFrame>,
    cfg: StatsConfig,

    core: StatCache<CoreStats>,
    annual: StatCache<AnnualBreakdown>,
    exposures: StatCache<ExposureStats>,
    pnl_stats: StatCache<PnlStats>,
}

impl Performance {
    pub fn builder(returns: DatedFrame) -> PerformanceBuilder {
        PerformanceBuilder::new(returns)
    }

    /// Builds a performance from long-format backtest results.
    ///
    /// `results` holds a `field` string column, the `date` index and one column
    /// per entity; each field (`Return`, `Pnl`, `Commission`, `NetExposure`,
    /// `AbsExposure`) contributes the rows of one table. `Return` rows are
    /// required, the others are optional.
    pub fn from_results(results: &DataFrame, cfg: StatsConfig) -> TearsheetResult<Self> {
        if results.column(FIELD_COL).is_err() {
            return Err(DataError::KeyNotFound(format!("results column '{FIELD_COL}'")).into());
        }

        let selection: Vec<Expr> = results
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != FIELD_COL)
            .map(|name| col(name.as_str()))
            .collect();

        let extract = |field: ResultField| -> TearsheetResult<Option<DatedFrame>> {
            let df = results
                .clone()
                .lazy()
                .filter(col(FIELD_COL).eq(lit(field.as_str())))
                .select(selection.clone())
                .collect()
                .map_err(convert_err)?;
            if df.height() == 0 {
                return Ok(None);
            }
            DatedFrame::new(df).map(Some)
        };

        let returns = extract(ResultField::Return)?
            .ok_or_else(|| DataError::KeyNotFound("results contain no 'Return' rows".to_string()))?;
        let pnl = extract(ResultField::Pnl)?;
        let commissions = match (&pnl, extract(ResultField::Commission)?) {
            (None, Some(_)) => {
                tracing::debug!("Dropping 'Commission' rows: results contain no 'Pnl' rows");
                None
            }
            (_, commissions) => commissions,
        };

        let mut builder = PerformanceBuilder::new(returns).config(cfg);
        builder.pnl = pnl;
        builder.commissions = commissions;
        builder.net_exposures = extract(ResultField::NetExposure)?;
        builder.abs_exposures = extract(ResultField::AbsExposure)?;
        builder.build()
    }

    pub fn returns(&self) -> &DatedFrame {
        &self.returns
    }

    pub fn entities(&self) -> &[PlSmallStr] {
        self.returns.entities()
    }

    pub fn config(&self) -> &StatsConfig {
        &self.cfg
    }

    pub fn table(&self, table: AuxTable) -> Option<&DatedFrame> {
        match table {
            AuxTable::Pnl => self.pnl.as_ref(),
            AuxTable::Commissions => self.commissions.as_ref(),
            AuxTable::NetExposures => self.net_exposures.as_ref(),
            AuxTable::AbsExposures => self.abs_exposures.as_ref(),
        }
    }

    pub fn pnl(&self) -> Option<&DatedFrame> {
        self.pnl.as_ref()
    }

    pub fn commissions(&self) -> Option<&DatedFrame> {
        self.commissions.as_ref()
    }

    pub fn net_exposures(&self) -> Option<&DatedFrame> {
        self.net_exposures.as_ref()
    }

    pub fn abs_exposures(&self) -> Option<&DatedFrame> {
        self.abs_exposures.as_ref()
    }

    /// Whether every optional table `stat` needs is present.
    pub fn supports(&self, stat: DerivedStat) -> bool {
        stat.requires().iter().all(|t| self.table(*t).is_some())
    }

    /// State of the core statistics slot (cum returns, drawdowns, CAGR, Sharpe).
    pub fn cache_state(&self) -> CacheState {
        self.core.state()
    }

    /// Computes cumulative returns (baseline-anchored), drawdowns, max drawdown,
    /// CAGR and Sharpe. A no-op once filled.
    pub fn fill_performance_cache(&self) -> TearsheetResult<()> {
        self.core_stats().map(|_| ())
    }

    pub fn cum_returns(&self) -> TearsheetResult<&DatedFrame> {
        Ok(&self.core_stats()?.cum_returns)
    }

    pub fn drawdowns(&self) -> TearsheetResult<&DatedFrame> {
        Ok(&self.core_stats()?.drawdowns)
    }

    pub fn max_drawdown(&self) -> TearsheetResult<&EntityScalars> {
        Ok(&self.core_stats()?.max_drawdown)
    }

    pub fn cagr(&self) -> TearsheetResult<&EntityScalars> {
        Ok(&self.core_stats()?.cagr)
    }

    pub fn sharpe(&self) -> TearsheetResult<&EntityScalars> {
        Ok(&self.core_stats()?.sharpe)
    }

    pub fn annual_breakdown(&self) -> TearsheetResult<&AnnualBreakdown> {
        self.annual
            .get_or_try_fill(|| AnnualBreakdown::compute(&self.returns, &self.cfg))
    }

    pub fn avg_net_exposure(&self) -> TearsheetResult<Option<&EntityScalars>> {
        Ok(self.exposure_stats()?.avg_net.as_ref())
    }

    pub fn avg_abs_exposure(&self) -> TearsheetResult<Option<&EntityScalars>> {
        Ok(self.exposure_stats()?.avg_abs.as_ref())
    }

    /// CAGR divided by average absolute exposure; requires absolute exposures.
    pub fn normalized_cagr(&self) -> TearsheetResult<Option<&EntityScalars>> {
        Ok(self.exposure_stats()?.normalized_cagr.as_ref())
    }

    pub fn total_pnl(&self) -> TearsheetResult<Option<&EntityScalars>> {
        Ok(self.pnl_stats()?.total_pnl.as_ref())
    }

    pub fn total_commissions(&self) -> TearsheetResult<Option<&EntityScalars>> {
        Ok(self.pnl_stats()?.total_commissions.as_ref())
    }

    /// Per-entity net PNL, gross PNL and commissions; requires both tables.
    pub fn pnl_breakdown(&self) -> TearsheetResult<Option<&PnlBreakdown>> {
        Ok(self.pnl_stats()?.breakdown.as_ref())
    }

    /// Running net PNL, gross PNL and commissions summed over all entities.
    ///
    /// Not cached. `None` unless both PNL and commissions are present.
    pub fn cumulative_pnl_breakdown(&self) -> TearsheetResult<Option<DatedFrame>> {
        let (Some(pnl), Some(commissions)) = (&self.pnl, &self.commissions) else {
            return Ok(None);
        };
        let pnl = pnl.sum_entities(TOTAL_COL)?;
        let commissions = commissions.sum_entities(TOTAL_COL)?;
        cumulative_pnl_breakdown(&pnl, &commissions).map(Some)
    }

    // --------------------------------------------------------------------------------------------
    // Cache slots
    // --------------------------------------------------------------------------------------------

    fn core_stats(&self) -> TearsheetResult<&CoreStats> {
        self.core.get_or_try_fill(|| {
            let span = tracing::debug_span!("fill_performance_cache", entities = self.entities().len());
            let _enter = span.enter();

            let cum = cum_returns(&with_baseline(&self.returns)?)?;
            let dd = drawdowns(&cum)?;
            let stats = CoreStats {
                max_drawdown: max_drawdown(&dd)?,
                cagr: cagr(&cum, &self.cfg)?,
                sharpe: sharpe(&self.returns, &self.cfg)?,
                cum_returns: cum,
                drawdowns: dd,
            };

            tracing::debug!(periods = self.returns.height(), "Performance cache filled");
            Ok(stats)
        })
    }

    fn exposure_stats(&self) -> TearsheetResult<&ExposureStats> {
        self.exposures.get_or_try_fill(|| {
            let avg_net = self.net_exposures.as_ref().map(avg_exposure).transpose()?;
            let avg_abs = self.abs_exposures.as_ref().map(avg_exposure).transpose()?;
            let normalized_cagr = match &avg_abs {
                Some(avg_abs) => Some(normalized_cagr(self.cagr()?, avg_abs)?),
                None => None,
            };

            tracing::debug!(
                net = avg_net.is_some(),
                abs = avg_abs.is_some(),
                "Exposure statistics filled"
            );
            Ok(ExposureStats {
                avg_net,
                avg_abs,
                normalized_cagr,
            })
        })
    }

    fn pnl_stats(&self) -> TearsheetResult<&PnlStats> {
        self.pnl_stats.get_or_try_fill(|| {
            let breakdown = match (&self.pnl, &self.commissions) {
                (Some(pnl), Some(commissions)) => Some(PnlBreakdown::compute(pnl, commissions)?),
                _ => None,
            };
            Ok(PnlStats {
                total_pnl: self.pnl.as_ref().map(total).transpose()?,
                total_commissions: self.commissions.as_ref().map(total).transpose()?,
                breakdown,
            })
        })
    }
}

// ================================================================================================
// Builder
// ================================================================================================

/// Assembles a [`Performance`], validating that every optional table is
/// aligned with the returns.
#[derive(Debug, Clone)]
pub struct PerformanceBuilder {
    returns: DatedFrame,
    pnl: Option<DatedFrame>,
    commissions: Option<DatedFrame>,
    net_exposures: Option<DatedFrame>,
    abs_exposures: Option<DatedFrame>,
    cfg: StatsConfig,
}

impl PerformanceBuilder {
    pub fn new(returns: DatedFrame) -> Self {
        Self {
            returns,
            pnl: None,
            commissions: None,
            net_exposures: None,
            abs_exposures: None,
            cfg: StatsConfig::default(),
        }
    }

    pub fn pnl(self, pnl: DatedFrame) -> Self {
        Self {
            pnl: Some(pnl),
            ..self
        }
    }

    pub fn commissions(self, commissions: DatedFrame) -> Self {
        Self {
            commissions: Some(commissions),
            ..self
        }
    }

    pub fn net_exposures(self, net_exposures: DatedFrame) -> Self {
        Self {
            net_exposures: Some(net_exposures),
            ..self
        }
    }

    pub fn abs_exposures(self, abs_exposures: DatedFrame) -> Self {
        Self {
            abs_exposures: Some(abs_exposures),
            ..self
        }
    }

    pub fn config(self, cfg: StatsConfig) -> Self {
        Self { cfg, ..self }
    }

    /// # Errors
    /// - `IndexMismatch` if an optional table is not indexed like the returns.
    /// - `ColumnMismatch` if its entity columns differ from the returns'.
    /// - `InvalidInput` if commissions are given without PNL.
    pub fn build(self) -> TearsheetResult<Performance> {
        if self.commissions.is_some() && self.pnl.is_none() {
            return Err(DataError::InvalidInput(
                "commissions require a pnl table".to_string(),
            )
            .into());
        }

        for (kind, table) in [
            (AuxTable::Pnl, &self.pnl),
            (AuxTable::Commissions, &self.commissions),
            (AuxTable::NetExposures, &self.net_exposures),
            (AuxTable::AbsExposures, &self.abs_exposures),
        ] {
            if let Some(table) = table {
                validate_alignment(kind, &self.returns, table)?;
            }
        }

        Ok(Performance {
            returns: self.returns,
            pnl: self.pnl,
            commissions: self.commissions,
            net_exposures: self.net_exposures,
            abs_exposures: self.abs_exposures,
            cfg: self.cfg,
            core: StatCache::default(),
            annual: StatCache::default(),
            exposures: StatCache::default(),
            pnl_stats: StatCache::default(),
        })
    }
}

fn validate_alignment(
    kind: AuxTable,
    returns: &DatedFrame,
    table: &DatedFrame,
) -> TearsheetResult<()> {
    if !returns.same_index(table) {
        return Err(DataError::IndexMismatch {
            table: kind.to_string(),
            msg: format!(
                "returns span {} rows ({}..={}), table spans {} rows ({}..={})",
                returns.height(),
                returns.first_date(),
                returns.last_date(),
                table.height(),
                table.first_date(),
                table.last_date()
            ),
        }
        .into());
    }

    if !returns.same_entities(table) {
        return Err(DataError::ColumnMismatch {
            table: kind.to_string(),
            msg: format!(
                "expected {:?}, found {:?}",
                returns.entities(),
                table.entities()
            ),
        }
        .into());
    }

    Ok(())
}

fn convert_err(e: polars::error::PolarsError) -> TearsheetError {
    polars_to_tearsheet_error("performance", e)
}
