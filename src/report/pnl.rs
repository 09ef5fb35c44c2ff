use std::sync::Arc;

use itertools::izip;
use polars::{
    frame::DataFrame,
    prelude::{Column, DataType, Field, PlSmallStr, Schema, SchemaRef},
};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    error::{DataError, TearsheetError, TearsheetResult},
    frame::DatedFrame,
    report::{
        io::{Report, ToSchema},
        polars_ext::polars_to_tearsheet_error,
        series::cum_sum,
        statistics::{EntityScalars, total},
    },
};

/// Net PNL, gross PNL (before commissions) and commissions per entity.
#[derive(Debug, Clone)]
pub struct PnlBreakdown {
    df: DataFrame,
}

impl Default for PnlBreakdown {
    fn default() -> Self {
        let df = DataFrame::empty_with_schema(&Self::to_schema());
        Self { df }
    }
}

impl Report for PnlBreakdown {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }
}

impl ToSchema for PnlBreakdown {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = PnlBreakdownCol::iter()
            .map(|col| {
                let dtype = match col {
                    PnlBreakdownCol::Entity => DataType::String,
                    PnlBreakdownCol::Pnl
                    | PnlBreakdownCol::GrossPnl
                    | PnlBreakdownCol::Commissions => DataType::Float64,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }
}

impl PnlBreakdown {
    /// Totals over the full period. Gross PNL adds back the absolute commissions.
    pub fn compute(pnl: &DatedFrame, commissions: &DatedFrame) -> TearsheetResult<Self> {
        let net = total(pnl)?;
        let paid = total(commissions)?;
        let gross = gross_pnl(&net, &paid)?;
        let paid = net.zip_with(&paid, |_, c| c)?;

        let entities: Vec<&str> = net.iter().map(|(e, _)| e).collect();
        let df = DataFrame::new(vec![
            Column::new(PnlBreakdownCol::Entity.name(), entities),
            Column::new(PnlBreakdownCol::Pnl.name(), values_of(&net)),
            Column::new(PnlBreakdownCol::GrossPnl.name(), values_of(&gross)),
            Column::new(PnlBreakdownCol::Commissions.name(), values_of(&paid)),
        ])
        .map_err(convert_err)?;

        Ok(Self { df })
    }
}

/// Running net PNL, gross PNL and commissions of a single-entity table.
///
/// The result is indexed like `pnl` and has the columns `pnl`, `gross_pnl`
/// and `commissions`.
pub fn cumulative_pnl_breakdown(
    pnl: &DatedFrame,
    commissions: &DatedFrame,
) -> TearsheetResult<DatedFrame> {
    let entity = single_entity(pnl)?;
    if single_entity(commissions)? != entity {
        return Err(DataError::EntityMismatch(entity.to_string()).into());
    }

    let cum_pnl = cum_sum(pnl)?.values(entity.as_str())?;
    let cum_commissions = cum_sum(commissions)?.values(entity.as_str())?;
    let cum_gross: Vec<f64> = izip!(&cum_pnl, &cum_commissions)
        .map(|(p, c)| p + c.abs())
        .collect();

    DatedFrame::from_columns(
        pnl.dates(),
        vec![
            (PnlBreakdownCol::Pnl.as_str(), cum_pnl),
            (PnlBreakdownCol::GrossPnl.as_str(), cum_gross),
            (PnlBreakdownCol::Commissions.as_str(), cum_commissions),
        ],
    )
}

fn gross_pnl(net: &EntityScalars, commissions: &EntityScalars) -> TearsheetResult<EntityScalars> {
    net.zip_with(commissions, |p, c| p + c.abs())
}

fn values_of(scalars: &EntityScalars) -> Vec<f64> {
    scalars.iter().map(|(_, v)| v).collect()
}

fn single_entity(frame: &DatedFrame) -> TearsheetResult<PlSmallStr> {
    match frame.entities() {
        [entity] => Ok(entity.clone()),
        many => Err(DataError::InvalidInput(format!(
            "expected a single-entity table, found {} entities",
            many.len()
        ))
        .into()),
    }
}

fn convert_err(e: polars::error::PolarsError) -> TearsheetError {
    polars_to_tearsheet_error("pnl breakdown", e)
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
pub enum PnlBreakdownCol {
    /// Entity (security or strategy) the totals belong to.
    Entity,
    /// PNL net of commissions.
    Pnl,
    /// PNL before commissions: `pnl + |commissions|`.
    GrossPnl,
    /// Commissions paid.
    Commissions,
}

impl From<PnlBreakdownCol> for PlSmallStr {
    fn from(value: PnlBreakdownCol) -> Self {
        value.as_str().into()
    }
}

impl PnlBreakdownCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}
