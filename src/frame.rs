use chrono::{Datelike, Duration, NaiveDate};
use itertools::Itertools;
use polars::prelude::{Column, DataFrame, DataType, Expr, IntoLazy, PlSmallStr, col};

use crate::{
    error::{DataError, SystemError, TearsheetError, TearsheetResult},
    report::polars_ext::polars_to_tearsheet_error,
};

/// Name of the date index column shared by every table.
pub const DATE_COL: &str = "date";

/// `NaiveDate::num_days_from_ce` of 1970-01-01, the epoch of polars `Date`.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// A date-indexed table with one `Float64` column per entity.
///
/// # Invariants
/// - A `date` column of polars `Date` type, non-null and strictly increasing.
/// - At least one row and at least one entity column.
/// - Entity columns are `Float64` without nulls (`NaN` is a value, not a null).
///
/// The table is never mutated after construction.
#[derive(Debug, Clone)]
pub struct DatedFrame {
    df: DataFrame,
    dates: Vec<NaiveDate>,
    entities: Vec<PlSmallStr>,
}

impl DatedFrame {
    /// Validates `df` and normalizes its dtypes.
    ///
    /// A `Datetime` index is truncated to `Date`; integer entity columns are
    /// cast to `Float64`.
    pub fn new(df: DataFrame) -> TearsheetResult<Self> {
        if df.height() == 0 {
            return Err(DataError::EmptyTable("table has no rows".to_string()).into());
        }

        let index = df
            .column(DATE_COL)
            .map_err(|_| DataError::MissingIndex(DATE_COL.to_string()))?;
        let index = normalize_index(index)?;
        let dates = index_to_dates(&index)?;

        let mut columns = Vec::with_capacity(df.width());
        columns.push(index);

        let mut entities = Vec::with_capacity(df.width().saturating_sub(1));
        for column in df.get_columns() {
            if column.name().as_str() == DATE_COL {
                continue;
            }
            entities.push(column.name().clone());
            columns.push(normalize_entity(column)?);
        }

        if entities.is_empty() {
            return Err(DataError::EmptyTable("table has no entity columns".to_string()).into());
        }

        let df = DataFrame::new(columns).map_err(convert_err)?;
        Ok(Self {
            df,
            dates,
            entities,
        })
    }

    /// Builds a table from an explicit index and named value columns.
    pub fn from_columns<S: AsRef<str>>(
        dates: &[NaiveDate],
        columns: Vec<(S, Vec<f64>)>,
    ) -> TearsheetResult<Self> {
        let mut cols = Vec::with_capacity(columns.len() + 1);
        cols.push(dates_to_column(dates)?);
        for (name, values) in columns {
            if values.len() != dates.len() {
                return Err(DataError::InvalidEntityColumn {
                    entity: name.as_ref().to_string(),
                    msg: format!(
                        "expected {} values to match the index, found {}",
                        dates.len(),
                        values.len()
                    ),
                }
                .into());
            }
            cols.push(Column::new(name.as_ref().into(), values));
        }

        let df = DataFrame::new(cols).map_err(convert_err)?;
        Self::new(df)
    }

    pub fn as_df(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_df(self) -> DataFrame {
        self.df
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn entities(&self) -> &[PlSmallStr] {
        &self.entities
    }

    pub fn height(&self) -> usize {
        self.dates.len()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn last_date(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    pub fn has_entity(&self, entity: &str) -> bool {
        self.entities.iter().any(|e| e.as_str() == entity)
    }

    /// Values of a single entity column, in index order.
    pub fn values(&self, entity: &str) -> TearsheetResult<Vec<f64>> {
        let column = self
            .df
            .column(entity)
            .map_err(|_| DataError::KeyNotFound(format!("entity column '{entity}'")))?;
        let ca = column.f64().map_err(convert_err)?;
        Ok(ca.into_no_null_iter().collect())
    }

    /// Whether `other` is indexed by exactly the same dates, in the same order.
    pub fn same_index(&self, other: &DatedFrame) -> bool {
        self.dates == other.dates
    }

    /// Whether `other` carries the same entity columns, in any order.
    pub fn same_entities(&self, other: &DatedFrame) -> bool {
        self.entities.len() == other.entities.len()
            && self.entities.iter().sorted().eq(other.entities.iter().sorted())
    }

    /// Row-wise sum of every entity column into a single column called `name`.
    pub fn sum_entities(&self, name: &str) -> TearsheetResult<DatedFrame> {
        let total = self
            .entity_exprs()
            .reduce(|acc, e| acc + e)
            .ok_or_else(|| {
                SystemError::InvariantViolation("table without entity columns".to_string())
            })?;

        let df = self
            .df
            .clone()
            .lazy()
            .select([col(DATE_COL), total.alias(name)])
            .collect()
            .map_err(convert_err)?;
        Self::new(df)
    }

    /// Applies one expression per entity column, keeping the index and names.
    ///
    /// The result of each `f(col(entity))` is aliased to the entity name.
    pub(crate) fn map_entities(&self, f: impl Fn(Expr) -> Expr) -> TearsheetResult<DatedFrame> {
        let mut selection = Vec::with_capacity(self.entities.len() + 1);
        selection.push(col(DATE_COL));
        selection.extend(
            self.entities
                .iter()
                .map(|e| f(col(e.as_str())).cast(DataType::Float64).alias(e.as_str())),
        );

        let df = self
            .df
            .clone()
            .lazy()
            .select(selection)
            .collect()
            .map_err(convert_err)?;
        Self::new(df)
    }

    pub(crate) fn entity_exprs(&self) -> impl Iterator<Item = Expr> + '_ {
        self.entities.iter().map(|e| col(e.as_str()))
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

pub(crate) fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub(crate) fn days_to_date(days: i32) -> TearsheetResult<NaiveDate> {
    days
        .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| {
            DataError::InvalidIndex(format!("day number {days} is out of the supported range"))
                .into()
        })
}

/// Returns the date one interval before `dates[0]`, where the interval is the
/// distance between the first two dates (one day for a single-row index).
pub(crate) fn prior_period(dates: &[NaiveDate]) -> TearsheetResult<NaiveDate> {
    let first = *dates
        .first()
        .ok_or_else(|| DataError::EmptyTable("cannot derive a prior period".to_string()))?;
    let interval = match dates.get(1) {
        Some(second) => *second - first,
        None => Duration::days(1),
    };
    first.checked_sub_signed(interval).ok_or_else(|| {
        DataError::InvalidIndex(format!("no prior period exists before {first}")).into()
    })
}

/// Builds the `date` index column for `dates`.
pub fn dates_to_column(dates: &[NaiveDate]) -> TearsheetResult<Column> {
    let days: Vec<i32> = dates.iter().copied().map(date_to_days).collect();
    Column::new(DATE_COL.into(), days)
        .cast(&DataType::Date)
        .map_err(convert_err)
}

fn normalize_index(index: &Column) -> TearsheetResult<Column> {
    let index = match index.dtype() {
        DataType::Date => index.clone(),
        DataType::Datetime(_, _) => index.cast(&DataType::Date).map_err(convert_err)?,
        other => {
            return Err(DataError::InvalidIndex(format!(
                "expected a Date column, found {other}"
            ))
            .into());
        }
    };

    if index.null_count() > 0 {
        return Err(DataError::InvalidIndex(format!(
            "index contains {} null dates",
            index.null_count()
        ))
        .into());
    }

    Ok(index)
}

fn index_to_dates(index: &Column) -> TearsheetResult<Vec<NaiveDate>> {
    let days = index.date().map_err(convert_err)?.physical();

    if let Some((prev, next)) = days
        .into_no_null_iter()
        .tuple_windows()
        .find(|(prev, next)| prev >= next)
    {
        return Err(DataError::InvalidIndex(format!(
            "index must be strictly increasing, found {} followed by {}",
            days_to_date(prev)?,
            days_to_date(next)?
        ))
        .into());
    }

    days.into_no_null_iter().map(days_to_date).collect()
}

fn normalize_entity(column: &Column) -> TearsheetResult<Column> {
    let entity = column.name().to_string();
    let is_numeric = matches!(
        column.dtype(),
        DataType::Float64
            | DataType::Float32
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    );
    if !is_numeric {
        return Err(DataError::InvalidEntityColumn {
            entity,
            msg: format!("expected a numeric column, found {}", column.dtype()),
        }
        .into());
    }

    if column.null_count() > 0 {
        return Err(DataError::InvalidEntityColumn {
            entity,
            msg: format!("column contains {} nulls", column.null_count()),
        }
        .into());
    }

    column.cast(&DataType::Float64).map_err(convert_err)
}

fn convert_err(e: polars::error::PolarsError) -> TearsheetError {
    polars_to_tearsheet_error("dated frame", e)
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    #[test]
    fn test_day_number_conversion() {
        assert_eq!(date_to_days(d(1970, 1, 1)), 0);
        assert_eq!(date_to_days(d(1970, 1, 2)), 1);
        assert_eq!(days_to_date(-1).expect("valid"), d(1969, 12, 31));
        assert_eq!(days_to_date(date_to_days(d(2024, 2, 29))).expect("valid"), d(2024, 2, 29));
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        assert!(days_to_date(i32::MAX).is_err());

        let index = Column::new(DATE_COL.into(), [i32::MAX - 10, i32::MAX - 5])
            .cast(&DataType::Date)
            .expect("Failed to cast to Date");
        let values = Column::new("AAPL".into(), [0.01, 0.02]);
        let df = DataFrame::new(vec![index, values]).expect("Failed to create DF");

        let err = DatedFrame::new(df).expect_err("unrepresentable dates must be rejected");
        assert!(matches!(err, TearsheetError::Data(DataError::InvalidIndex(_))));
    }

    #[test]
    fn test_from_columns_round_trips_index() {
        let dates = [d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 4)];
        let frame = DatedFrame::from_columns(&dates, vec![("AAPL", vec![0.01, 0.02, -0.01])])
            .expect("Failed to build frame");

        assert_eq!(frame.dates(), &dates);
        assert_eq!(frame.entities(), &[PlSmallStr::from("AAPL")]);
        assert_eq!(frame.first_date(), d(2024, 1, 2));
        assert_eq!(frame.last_date(), d(2024, 1, 4));
        assert_eq!(
            frame.as_df().column(DATE_COL).expect("date column").dtype(),
            &DataType::Date
        );
    }

    #[test]
    fn test_rejects_missing_index() {
        let df = df!["AAPL" => &[0.01, 0.02]].expect("Failed to create DF");
        let err = DatedFrame::new(df).expect_err("missing index must be rejected");
        assert!(matches!(
            err,
            TearsheetError::Data(DataError::MissingIndex(_))
        ));
    }

    #[test]
    fn test_rejects_non_increasing_index() {
        let dates = [d(2024, 1, 3), d(2024, 1, 2)];
        let err = DatedFrame::from_columns(&dates, vec![("AAPL", vec![0.0, 0.0])])
            .expect_err("descending index must be rejected");
        assert!(matches!(err, TearsheetError::Data(DataError::InvalidIndex(_))));

        let dates = [d(2024, 1, 2), d(2024, 1, 2)];
        assert!(DatedFrame::from_columns(&dates, vec![("AAPL", vec![0.0, 0.0])]).is_err());
    }

    #[test]
    fn test_rejects_empty_and_entityless_tables() {
        let err = DatedFrame::from_columns::<&str>(&[], vec![]).expect_err("empty table");
        assert!(matches!(err, TearsheetError::Data(DataError::EmptyTable(_))));

        let err = DatedFrame::from_columns::<&str>(&[d(2024, 1, 2)], vec![])
            .expect_err("no entity columns");
        assert!(matches!(err, TearsheetError::Data(DataError::EmptyTable(_))));
    }

    #[test]
    fn test_rejects_non_numeric_and_null_entities() {
        let index = dates_to_column(&[d(2024, 1, 2), d(2024, 1, 3)]).expect("index");

        let text = Column::new("AAPL".into(), ["a", "b"]);
        let df = DataFrame::new(vec![index.clone(), text]).expect("Failed to create DF");
        assert!(matches!(
            DatedFrame::new(df),
            Err(TearsheetError::Data(DataError::InvalidEntityColumn { .. }))
        ));

        let nulls = Column::new("AAPL".into(), [Some(0.01), None]);
        let df = DataFrame::new(vec![index, nulls]).expect("Failed to create DF");
        assert!(matches!(
            DatedFrame::new(df),
            Err(TearsheetError::Data(DataError::InvalidEntityColumn { .. }))
        ));
    }

    #[test]
    fn test_integer_columns_are_cast_to_f64() {
        let index = dates_to_column(&[d(2024, 1, 2), d(2024, 1, 3)]).expect("index");
        let ints = Column::new("AAPL".into(), [1i64, 2]);
        let df = DataFrame::new(vec![index, ints]).expect("Failed to create DF");

        let frame = DatedFrame::new(df).expect("integer columns are numeric");
        assert_eq!(frame.values("AAPL").expect("values"), vec![1.0, 2.0]);
    }

    #[test]
    fn test_sum_entities() {
        let dates = [d(2024, 1, 2), d(2024, 1, 3)];
        let frame = DatedFrame::from_columns(
            &dates,
            vec![("AAPL", vec![0.01, 0.02]), ("MSFT", vec![-0.01, 0.01])],
        )
        .expect("Failed to build frame");

        let total = frame.sum_entities("aggregate").expect("Failed to sum");
        assert_eq!(total.entities(), &[PlSmallStr::from("aggregate")]);
        assert!(total.same_index(&frame));

        let values = total.values("aggregate").expect("values");
        assert!((values[0] - 0.0).abs() < 1e-12);
        assert!((values[1] - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_same_entities_ignores_order() {
        let dates = [d(2024, 1, 2)];
        let a = DatedFrame::from_columns(&dates, vec![("A", vec![0.0]), ("B", vec![0.0])])
            .expect("frame a");
        let b = DatedFrame::from_columns(&dates, vec![("B", vec![0.0]), ("A", vec![0.0])])
            .expect("frame b");
        let c = DatedFrame::from_columns(&dates, vec![("A", vec![0.0])]).expect("frame c");

        assert!(a.same_entities(&b));
        assert!(!a.same_entities(&c));
    }

    #[test]
    fn test_prior_period() {
        let weekly = [d(2024, 1, 8), d(2024, 1, 15)];
        assert_eq!(prior_period(&weekly).expect("prior"), d(2024, 1, 1));
        assert_eq!(prior_period(&[d(2024, 1, 8)]).expect("prior"), d(2024, 1, 7));
        assert!(prior_period(&[]).is_err());
    }
}
