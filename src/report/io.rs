use polars::{frame::DataFrame, prelude::SchemaRef};
use serde_json::Value;

use crate::{error::TearsheetResult, report::polars_ext::DataFrameExt};

// ================================================================================================
// Traits
// ================================================================================================

/// Defines a common interface for all tabular report types.
pub trait Report {
    /// Access the underlying DataFrame.
    fn as_df(&self) -> &DataFrame;
}

pub trait ToSchema {
    /// Returns the canonical schema for this report type.
    fn to_schema() -> SchemaRef;
}

pub trait ToJson {
    /// Serializes the report to a generic JSON Value.
    /// Returns a `Value::Array` containing row objects.
    fn to_json(&self) -> TearsheetResult<serde_json::Value>;
}

// ================================================================================================
// Blanket Implementations
// ================================================================================================

impl<T> ToJson for T
where
    T: Report,
{
    fn to_json(&self) -> TearsheetResult<serde_json::Value> {
        let rows = self.as_df().to_json_rows()?;
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
}
