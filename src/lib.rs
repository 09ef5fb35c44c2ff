pub mod config;
pub mod error;
pub mod frame;
pub mod prelude;
pub mod report;
pub mod tearsheet;

pub use frame::{DATE_COL, DatedFrame};
pub use report::aggregate::AggregatePerformance;
pub use report::performance::{Performance, PerformanceBuilder};
pub use tearsheet::{Tearsheet, TearsheetReport};
