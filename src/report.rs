pub mod aggregate;
pub mod annual;
pub mod cache;
pub mod io;
pub mod monte_carlo;
pub mod performance;
pub mod pnl;
pub mod polars_ext;
pub mod series;
pub mod statistics;
