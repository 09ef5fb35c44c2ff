use std::sync::Arc;

use polars::{
    frame::DataFrame,
    prelude::{Column, DataType, Field, IntoLazy, PlSmallStr, Schema, SchemaRef, col},
};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    config::StatsConfig,
    error::{DataError, TearsheetError, TearsheetResult},
    frame::{DATE_COL, DatedFrame},
    report::{
        io::{Report, ToSchema},
        polars_ext::polars_to_tearsheet_error,
        series::{cum_returns, with_baseline},
        statistics::{EntityScalars, cagr, sharpe},
    },
};

/// Temporary partition key; prefixed so it cannot collide with an entity name.
const YEAR_KEY: &str = "__year";

/// CAGR and Sharpe per calendar year and entity.
///
/// Long format: one row per (year, entity), ordered by year and then by the
/// entity column order of the source returns.
#[derive(Debug, Clone)]
pub struct AnnualBreakdown {
    df: DataFrame,
}

impl Default for AnnualBreakdown {
    fn default() -> Self {
        let df = DataFrame::empty_with_schema(&Self::to_schema());
        Self { df }
    }
}

impl Report for AnnualBreakdown {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }
}

impl ToSchema for AnnualBreakdown {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = AnnualCol::iter()
            .map(|col| {
                let dtype = match col {
                    AnnualCol::Year => DataType::Int32,
                    AnnualCol::Entity => DataType::String,
                    AnnualCol::Cagr | AnnualCol::Sharpe => DataType::Float64,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }
}

/// Statistics of one (year, entity) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnualStats {
    pub cagr: f64,
    pub sharpe: f64,
}

impl AnnualBreakdown {
    /// Groups `returns` by calendar year and computes, for each year on its own,
    /// the baseline-anchored CAGR and the Sharpe ratio.
    ///
    /// A year with a single observation has an undefined Sharpe ratio (`NaN`).
    #[tracing::instrument(skip_all, fields(entities = returns.entities().len()))]
    pub fn compute(returns: &DatedFrame, cfg: &StatsConfig) -> TearsheetResult<Self> {
        let partitions = returns
            .as_df()
            .clone()
            .lazy()
            .with_column(col(DATE_COL).dt().year().alias(YEAR_KEY))
            .collect()
            .map_err(convert_err)?
            .partition_by_stable([YEAR_KEY], true)
            .map_err(|e| DataError::DataFrame(format!("Partitioning by year failed: {e}")))?;

        let years = partitions
            .into_par_iter()
            .map(|df| year_stats(df, cfg))
            .collect::<TearsheetResult<Vec<_>>>()?;

        tracing::debug!(years = years.len(), "Annual breakdown computed");

        let capacity = years.len() * returns.entities().len();
        let mut year_col = Vec::with_capacity(capacity);
        let mut entity_col = Vec::with_capacity(capacity);
        let mut cagr_col = Vec::with_capacity(capacity);
        let mut sharpe_col = Vec::with_capacity(capacity);

        for (year, cagrs, sharpes) in &years {
            for (entity, cagr) in cagrs.iter() {
                year_col.push(*year);
                entity_col.push(entity.to_string());
                cagr_col.push(cagr);
                sharpe_col.push(sharpes.get(entity).unwrap_or(f64::NAN));
            }
        }

        let df = DataFrame::new(vec![
            Column::new(AnnualCol::Year.name(), year_col),
            Column::new(AnnualCol::Entity.name(), entity_col),
            Column::new(AnnualCol::Cagr.name(), cagr_col),
            Column::new(AnnualCol::Sharpe.name(), sharpe_col),
        ])
        .map_err(convert_err)?;

        Ok(Self { df })
    }

    /// Distinct years present, ascending.
    pub fn years(&self) -> TearsheetResult<Vec<i32>> {
        let mut years: Vec<i32> = self
            .df
            .column(AnnualCol::Year.as_str())
            .map_err(convert_err)?
            .i32()
            .map_err(convert_err)?
            .into_no_null_iter()
            .collect();
        years.dedup();
        Ok(years)
    }

    pub fn get(&self, year: i32, entity: &str) -> TearsheetResult<Option<AnnualStats>> {
        let years = self
            .df
            .column(AnnualCol::Year.as_str())
            .map_err(convert_err)?
            .i32()
            .map_err(convert_err)?;
        let entities = self
            .df
            .column(AnnualCol::Entity.as_str())
            .map_err(convert_err)?
            .str()
            .map_err(convert_err)?;
        let cagrs = self
            .df
            .column(AnnualCol::Cagr.as_str())
            .map_err(convert_err)?
            .f64()
            .map_err(convert_err)?;
        let sharpes = self
            .df
            .column(AnnualCol::Sharpe.as_str())
            .map_err(convert_err)?
            .f64()
            .map_err(convert_err)?;

        let row = (0..self.df.height())
            .find(|&i| years.get(i) == Some(year) && entities.get(i) == Some(entity));

        Ok(row.map(|i| AnnualStats {
            cagr: cagrs.get(i).unwrap_or(f64::NAN),
            sharpe: sharpes.get(i).unwrap_or(f64::NAN),
        }))
    }
}

fn year_stats(
    partition: DataFrame,
    cfg: &StatsConfig,
) -> TearsheetResult<(i32, EntityScalars, EntityScalars)> {
    let year = partition
        .column(YEAR_KEY)
        .map_err(convert_err)?
        .i32()
        .map_err(convert_err)?
        .get(0)
        .ok_or_else(|| DataError::EmptyTable("year partition has no rows".to_string()))?;

    let returns = DatedFrame::new(partition.drop(YEAR_KEY).map_err(convert_err)?)?;
    let cum = cum_returns(&with_baseline(&returns)?)?;

    Ok((year, cagr(&cum, cfg)?, sharpe(&returns, cfg)?))
}

fn convert_err(e: polars::error::PolarsError) -> TearsheetError {
    polars_to_tearsheet_error("annual breakdown", e)
}

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
pub enum AnnualCol {
    /// Calendar year of the group.
    Year,
    /// Entity (security or strategy) the statistics belong to.
    Entity,
    /// Compound annual growth rate within the year.
    Cagr,
    /// Annualized Sharpe ratio within the year.
    Sharpe,
}

impl From<AnnualCol> for PlSmallStr {
    fn from(value: AnnualCol) -> Self {
        value.as_str().into()
    }
}

impl AnnualCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}
