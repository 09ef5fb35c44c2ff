use thiserror::Error;

pub type TearsheetResult<T> = Result<T, TearsheetError>;

#[derive(Debug, Error)]
pub enum TearsheetError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Errors related to table shape, alignment and content.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Missing index column '{0}'")]
    MissingIndex(String),

    #[error("Invalid index column: {0}")]
    InvalidIndex(String),

    #[error("Index of '{table}' does not match the returns index: {msg}")]
    IndexMismatch { table: String, msg: String },

    #[error("Columns of '{table}' do not match the returns columns: {msg}")]
    ColumnMismatch { table: String, msg: String },

    #[error("Entity '{0}' is missing from one side of an elementwise operation")]
    EntityMismatch(String),

    #[error("Entity column '{entity}' is invalid: {msg}")]
    InvalidEntityColumn { entity: String, msg: String },

    #[error("Table is empty: {0}")]
    EmptyTable(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Data frame error: {0}")]
    DataFrame(String),
}

/// Errors related to internal invariants and configuration.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
