use ordered_float::OrderedFloat;
use polars::prelude::{Column, DataFrame, DataType, Expr, IntoLazy, PlSmallStr, col, lit};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    config::StatsConfig,
    error::{DataError, TearsheetError, TearsheetResult},
    frame::DatedFrame,
    report::polars_ext::{DataFrameExt, polars_to_tearsheet_error},
};

// ================================================================================================
// Entity Scalars
// ================================================================================================

/// One scalar per entity, in the column order of the table it was computed from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityScalars {
    values: Vec<(PlSmallStr, f64)>,
}

impl From<Vec<(PlSmallStr, f64)>> for EntityScalars {
    fn from(values: Vec<(PlSmallStr, f64)>) -> Self {
        Self { values }
    }
}

impl EntityScalars {
    pub fn get(&self, entity: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(name, _)| name.as_str() == entity)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.values.iter().map(|(name, v)| (name.as_str(), *v))
    }

    /// The value of a single-entity result; `None` when there are several.
    pub fn only(&self) -> Option<f64> {
        match self.values.as_slice() {
            [(_, v)] => Some(*v),
            _ => None,
        }
    }

    /// Values in ascending order. `NaN` sorts last.
    pub fn sorted(&self) -> Vec<(&str, f64)> {
        let mut out: Vec<_> = self.iter().collect();
        out.sort_by_key(|(_, v)| OrderedFloat(*v));
        out
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Combines two results entity by entity, matching on names.
    pub fn zip_with(
        &self,
        other: &EntityScalars,
        f: impl Fn(f64, f64) -> f64,
    ) -> TearsheetResult<EntityScalars> {
        if let Some((name, _)) = other
            .values
            .iter()
            .find(|(name, _)| self.get(name.as_str()).is_none())
        {
            return Err(DataError::EntityMismatch(name.to_string()).into());
        }

        self.values
            .iter()
            .map(|(name, lhs)| {
                let rhs = other
                    .get(name.as_str())
                    .ok_or_else(|| DataError::EntityMismatch(name.to_string()))?;
                Ok((name.clone(), f(*lhs, rhs)))
            })
            .collect::<TearsheetResult<Vec<_>>>()
            .map(EntityScalars::from)
    }

    /// Long-format frame with one row per entity.
    pub fn to_df(&self, value_name: &str) -> TearsheetResult<DataFrame> {
        let names: Vec<&str> = self.values.iter().map(|(n, _)| n.as_str()).collect();
        let values: Vec<f64> = self.values.iter().map(|(_, v)| *v).collect();
        DataFrame::new(vec![
            Column::new(ScalarCol::Entity.as_str().into(), names),
            Column::new(value_name.into(), values),
        ])
        .map_err(convert_err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ScalarCol {
    /// Name of the entity (security or strategy) the value belongs to.
    Entity,
}

impl ScalarCol {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

// ================================================================================================
// Statistic Functions
// ================================================================================================

/// Compound annual growth rate from the first to the last cumulative value.
///
/// The growth ratio is annualized with the exponent `periods_per_year / elapsed`
/// where `elapsed` is the number of periods between the first and last row.
/// With fewer than two rows nothing has elapsed and every entity is `NaN`.
pub fn cagr(cum_returns: &DatedFrame, cfg: &StatsConfig) -> TearsheetResult<EntityScalars> {
    let elapsed = cum_returns.height().saturating_sub(1);
    if elapsed == 0 {
        tracing::warn!(
            periods = cum_returns.height(),
            "Insufficient data for CAGR, returning NaN"
        );
        return Ok(nan_scalars(cum_returns));
    }

    let exponent = cfg.periods_per_year_f64() / elapsed as f64;
    aggregate(cum_returns, |c| cagr_expr(c, exponent))
}

/// Annualized Sharpe ratio: mean periodic return over its sample standard
/// deviation, scaled by `sqrt(periods_per_year)`.
///
/// Zero volatility yields a non-finite value. Fewer than two observations
/// yield `NaN`.
pub fn sharpe(returns: &DatedFrame, cfg: &StatsConfig) -> TearsheetResult<EntityScalars> {
    if returns.height() < 2 {
        tracing::warn!(
            periods = returns.height(),
            "Insufficient data for Sharpe ratio, returning NaN"
        );
        return Ok(nan_scalars(returns));
    }

    let scale = cfg.periods_per_year_f64().sqrt();
    aggregate(returns, |c| sharpe_expr(c, scale))
}

/// Mean exposure per entity across the full period.
pub fn avg_exposure(exposures: &DatedFrame) -> TearsheetResult<EntityScalars> {
    aggregate(exposures, |c| c.mean())
}

/// CAGR per unit of average absolute exposure.
///
/// Zero exposure yields a non-finite value.
pub fn normalized_cagr(
    cagr: &EntityScalars,
    avg_abs_exposure: &EntityScalars,
) -> TearsheetResult<EntityScalars> {
    cagr.zip_with(avg_abs_exposure, |c, e| c / e)
}

/// Column sum per entity, e.g. total PNL or total commissions.
pub fn total(table: &DatedFrame) -> TearsheetResult<EntityScalars> {
    aggregate(table, |c| c.sum())
}

// ================================================================================================
// Expressions
// ================================================================================================

fn cagr_expr(cum_returns: Expr, exponent: f64) -> Expr {
    let growth = cum_returns.clone().last() / cum_returns.first();
    growth.pow(lit(exponent)) - lit(1.0)
}

fn sharpe_expr(returns: Expr, scale: f64) -> Expr {
    returns.clone().mean() / returns.std(1) * lit(scale)
}

// ================================================================================================
// Helper Functions
// ================================================================================================

/// Reduces every entity column of `frame` to one scalar with `f`.
pub(crate) fn aggregate(
    frame: &DatedFrame,
    f: impl Fn(Expr) -> Expr,
) -> TearsheetResult<EntityScalars> {
    let selection: Vec<Expr> = frame
        .entities()
        .iter()
        .map(|e| f(col(e.as_str())).cast(DataType::Float64).alias(e.as_str()))
        .collect();

    frame
        .as_df()
        .clone()
        .lazy()
        .select(selection)
        .collect()
        .map_err(convert_err)?
        .to_entity_scalars()
}

fn nan_scalars(frame: &DatedFrame) -> EntityScalars {
    frame
        .entities()
        .iter()
        .map(|e| (e.clone(), f64::NAN))
        .collect::<Vec<_>>()
        .into()
}

fn convert_err(e: polars::error::PolarsError) -> TearsheetError {
    polars_to_tearsheet_error("statistics", e)
}
