// 1. Traits
pub use crate::report::io::{Report, ToJson, ToSchema};
pub use crate::report::polars_ext::DataFrameExt;

// 2. Core Types
pub use crate::frame::{DATE_COL, DatedFrame};
pub use crate::report::aggregate::{
    AGGREGATE_COL, AggregatePerformance, AggregateSummary, ExposureSummary,
};
pub use crate::report::cache::CacheState;
pub use crate::report::performance::{
    AuxTable, DerivedStat, FIELD_COL, Performance, PerformanceBuilder, ResultField,
};
pub use crate::report::statistics::EntityScalars;

// 3. Reports
pub use crate::report::annual::{AnnualBreakdown, AnnualCol, AnnualStats};
pub use crate::report::monte_carlo::{MonteCarloSimulation, MonteCarloSimulator};
pub use crate::report::pnl::{PnlBreakdown, PnlBreakdownCol};
pub use crate::tearsheet::{Tearsheet, TearsheetReport, TearsheetSummary};

// 4. Statistic Functions
pub use crate::report::series::{cum_returns, cum_sum, drawdowns, max_drawdown, with_baseline};
pub use crate::report::statistics::{avg_exposure, cagr, normalized_cagr, sharpe, total};

// 5. Errors
pub use crate::error::{DataError, SystemError, TearsheetError, TearsheetResult};

// 6. Configs
pub use crate::config::{MonteCarloConfig, StatsConfig, TearsheetConfig, TRADING_DAYS_PER_YEAR};
