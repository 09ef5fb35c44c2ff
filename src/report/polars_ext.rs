use polars::prelude::{DataFrame, DataType, JsonFormat, JsonWriter, SerWriter};
use serde_json::Value;

use crate::{
    error::{DataError, TearsheetError, TearsheetResult},
    report::statistics::EntityScalars,
};

pub(crate) fn polars_to_tearsheet_error(report: &str, e: polars::error::PolarsError) -> TearsheetError {
    TearsheetError::Data(DataError::DataFrame(format!(
        "Error while building {report}: {e}"
    )))
}

pub trait DataFrameExt {
    fn to_json_rows(&self) -> TearsheetResult<Vec<serde_json::Map<String, Value>>>;

    /// Reads a single-row frame of per-entity aggregates as [`EntityScalars`].
    ///
    /// Nulls (e.g. the standard deviation of a single observation) become `NaN`.
    fn to_entity_scalars(&self) -> TearsheetResult<EntityScalars>;
}

impl DataFrameExt for DataFrame {
    fn to_json_rows(&self) -> TearsheetResult<Vec<serde_json::Map<String, Value>>> {
        let height = self.height();
        if height == 0 {
            return Ok(Vec::new());
        }

        let estimated_row_size = self.width() * (1 << 6);
        let mut buf = Vec::with_capacity(height * estimated_row_size);

        JsonWriter::new(&mut buf)
            .with_json_format(JsonFormat::Json)
            .finish(&mut self.clone())
            .map_err(|e| DataError::DataFrame(e.to_string()))?;

        let json_val: Value = serde_json::from_slice(&buf)
            .map_err(|e| DataError::DataFrame(format!("Polars JSON output is invalid: {e}")))?;

        match json_val {
            Value::Array(rows) => Ok(rows
                .into_iter()
                .filter_map(|v| match v {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect()),
            _ => {
                Err(DataError::DataFrame("Polars JSON output was not an array".to_string()).into())
            }
        }
    }

    fn to_entity_scalars(&self) -> TearsheetResult<EntityScalars> {
        if self.height() != 1 {
            return Err(DataError::DataFrame(format!(
                "Expected a single row of aggregates, found {} rows",
                self.height()
            ))
            .into());
        }

        self.get_columns()
            .iter()
            .map(|column| {
                let value = column
                    .cast(&DataType::Float64)
                    .map_err(|e| polars_to_tearsheet_error("entity scalars", e))?
                    .f64()
                    .map_err(|e| polars_to_tearsheet_error("entity scalars", e))?
                    .get(0)
                    .unwrap_or(f64::NAN);
                Ok((column.name().clone(), value))
            })
            .collect::<TearsheetResult<Vec<_>>>()
            .map(EntityScalars::from)
    }
}
