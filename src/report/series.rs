use polars::prelude::{Expr, IntoLazy, UnionArgs, lit};

use crate::{
    error::{TearsheetError, TearsheetResult},
    frame::{DatedFrame, prior_period},
    report::{
        polars_ext::polars_to_tearsheet_error,
        statistics::{EntityScalars, aggregate},
    },
};

/// Prepends a zero-return period one interval before the first date.
///
/// Compounding the result starts from exactly `1.0` instead of `1 + r[0]`.
/// The interval is the distance between the first two dates (one day for a
/// single-row table).
pub fn with_baseline(returns: &DatedFrame) -> TearsheetResult<DatedFrame> {
    let prior = prior_period(returns.dates())?;
    let zeros = returns
        .entities()
        .iter()
        .map(|e| (e.as_str(), vec![0.0]))
        .collect::<Vec<_>>();
    let baseline = DatedFrame::from_columns(&[prior], zeros)?;

    let df = polars::prelude::concat(
        [baseline.into_df().lazy(), returns.as_df().clone().lazy()],
        UnionArgs {
            rechunk: true,
            ..Default::default()
        },
    )
    .map_err(convert_err)?
    .collect()
    .map_err(convert_err)?;

    DatedFrame::new(df)
}

/// Compounds periodic returns per entity: `cum[t] = prod_{i<=t}(1 + r[i])`.
///
/// No baseline is inserted; call [`with_baseline`] first to anchor at `1.0`.
pub fn cum_returns(returns: &DatedFrame) -> TearsheetResult<DatedFrame> {
    returns.map_entities(cum_returns_expr)
}

/// Decline from the running peak per entity: `cum[t] / max(cum[..=t]) - 1`.
///
/// Always `<= 0`, and exactly `0` at every new running maximum.
pub fn drawdowns(cum_returns: &DatedFrame) -> TearsheetResult<DatedFrame> {
    cum_returns.map_entities(drawdown_expr)
}

/// Deepest drawdown per entity (the most negative value).
pub fn max_drawdown(drawdowns: &DatedFrame) -> TearsheetResult<EntityScalars> {
    aggregate(drawdowns, |c| c.min())
}

/// Running sum per entity.
pub fn cum_sum(table: &DatedFrame) -> TearsheetResult<DatedFrame> {
    table.map_entities(|c| c.cum_sum(false))
}

// ================================================================================================
// Expressions
// ================================================================================================

fn cum_returns_expr(returns: Expr) -> Expr {
    (lit(1.0) + returns).cum_prod(false)
}

fn drawdown_expr(cum_returns: Expr) -> Expr {
    let peak = cum_returns.clone().cum_max(false);
    cum_returns / peak - lit(1.0)
}

fn convert_err(e: polars::error::PolarsError) -> TearsheetError {
    polars_to_tearsheet_error("series utilities", e)
}
