use std::num::NonZeroUsize;

use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::error::{SystemError, TearsheetResult};

/// Trading days in a year, the annualization factor for daily data.
pub const TRADING_DAYS_PER_YEAR: u32 = 252;

// ================================================================================================
// Statistics Configuration
// ================================================================================================

/// Parameters shared by every statistic computed over a return stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Number of periods per year used to annualize CAGR and Sharpe.
    ///
    /// Input data is assumed to be daily, so this defaults to
    /// [`TRADING_DAYS_PER_YEAR`]. Must be strictly positive (> 0).
    periods_per_year: u32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            periods_per_year: TRADING_DAYS_PER_YEAR,
        }
    }
}

impl StatsConfig {
    /// # Validation
    /// Returns error if `periods_per_year` is 0.
    pub fn new(periods_per_year: u32) -> TearsheetResult<Self> {
        if periods_per_year == 0 {
            return Err(SystemError::InvalidConfig(
                "Periods per year must be positive (> 0)".to_string(),
            )
            .into());
        }
        Ok(Self { periods_per_year })
    }

    pub fn periods_per_year(&self) -> u32 {
        self.periods_per_year
    }

    pub fn periods_per_year_f64(&self) -> f64 {
        f64::from(self.periods_per_year)
    }
}

// ================================================================================================
// Monte Carlo Configuration
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    /// How many shuffled return series to generate.
    n: NonZeroUsize,

    /// Aggregate across entities before shuffling (randomizes the order of
    /// daily portfolio outcomes) instead of shuffling each entity on its own
    /// and aggregating afterwards.
    preaggregate: bool,

    /// Seed for the random source. `None` draws entropy from the OS.
    seed: Option<u64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            n: NonZeroUsize::new(5).unwrap_or(NonZeroUsize::MIN),
            preaggregate: true,
            seed: None,
        }
    }
}

impl MonteCarloConfig {
    pub fn new(n: NonZeroUsize) -> Self {
        Self {
            n,
            ..Default::default()
        }
    }

    pub fn with_preaggregate(self, preaggregate: bool) -> Self {
        Self {
            preaggregate,
            ..self
        }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    pub fn n(&self) -> usize {
        self.n.get()
    }

    pub fn preaggregate(&self) -> bool {
        self.preaggregate
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Builds the random source the simulator draws its permutations from.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

// ================================================================================================
// Tearsheet Configuration
// ================================================================================================

/// Selects which sections a full tearsheet computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TearsheetConfig {
    include_exposures: bool,
    include_annual_breakdown: bool,
    montecarlo: Option<MonteCarloConfig>,
}

impl Default for TearsheetConfig {
    fn default() -> Self {
        Self {
            include_exposures: true,
            include_annual_breakdown: true,
            montecarlo: None,
        }
    }
}

impl TearsheetConfig {
    pub fn with_exposures(self, include: bool) -> Self {
        Self {
            include_exposures: include,
            ..self
        }
    }

    pub fn with_annual_breakdown(self, include: bool) -> Self {
        Self {
            include_annual_breakdown: include,
            ..self
        }
    }

    pub fn with_montecarlo(self, cfg: MonteCarloConfig) -> Self {
        Self {
            montecarlo: Some(cfg),
            ..self
        }
    }

    pub fn include_exposures(&self) -> bool {
        self.include_exposures
    }

    pub fn include_annual_breakdown(&self) -> bool {
        self.include_annual_breakdown
    }

    pub fn montecarlo(&self) -> Option<&MonteCarloConfig> {
        self.montecarlo.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_config_rejects_zero_periods() {
        assert!(StatsConfig::new(0).is_err());
        let cfg = StatsConfig::new(12).expect("12 periods per year is valid");
        assert_eq!(cfg.periods_per_year(), 12);
        assert_eq!(StatsConfig::default().periods_per_year(), 252);
    }

    #[test]
    fn test_montecarlo_config_serde() {
        let n = NonZeroUsize::new(3).expect("non-zero");
        let cfg = MonteCarloConfig::new(n)
            .with_preaggregate(false)
            .with_seed(7);

        let json = serde_json::to_string(&cfg).expect("Failed to serialize config");
        let back: MonteCarloConfig = serde_json::from_str(&json).expect("Failed to deserialize");

        assert_eq!(back, cfg);
        assert_eq!(back.n(), 3);
        assert!(!back.preaggregate());
        assert_eq!(back.seed(), Some(7));
    }

    #[test]
    fn test_montecarlo_config_rejects_zero_simulations() {
        let res = serde_json::from_str::<MonteCarloConfig>(
            r#"{"n":0,"preaggregate":true,"seed":null}"#,
        );
        assert!(res.is_err(), "n = 0 must not deserialize");
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        use rand::Rng;

        let cfg = MonteCarloConfig::default().with_seed(42);
        let a: Vec<u32> = (0..4).map(|_| cfg.rng().random()).collect();
        let mut r1 = cfg.rng();
        let mut r2 = cfg.rng();
        let xs: Vec<u32> = (0..4).map(|_| r1.random()).collect();
        let ys: Vec<u32> = (0..4).map(|_| r2.random()).collect();
        assert_eq!(xs, ys);
        assert!(a.iter().all(|v| *v == a[0]), "fresh rngs restart the stream");
    }

    #[test]
    fn test_tearsheet_config_defaults() {
        let cfg = TearsheetConfig::default();
        assert!(cfg.include_exposures());
        assert!(cfg.include_annual_breakdown());
        assert!(cfg.montecarlo().is_none());

        let cfg = cfg.with_exposures(false).with_montecarlo(MonteCarloConfig::default());
        assert!(!cfg.include_exposures());
        assert_eq!(cfg.montecarlo().map(|m| m.n()), Some(5));
    }
}
