use rand::{Rng, seq::SliceRandom};

use crate::{
    config::MonteCarloConfig,
    error::{DataError, TearsheetResult},
    frame::DatedFrame,
    report::{
        aggregate::AGGREGATE_COL,
        series::{cum_returns, drawdowns, with_baseline},
    },
};

/// Resamples a returns table by random permutation.
///
/// With `preaggregate` the entities are summed first and the aggregate
/// sequence is shuffled. Without it every entity column is shuffled on its own
/// and the shuffled columns are summed, which breaks the cross-entity
/// alignment as well as the ordering.
#[derive(Debug, Clone, Copy)]
pub struct MonteCarloSimulator<'a> {
    returns: &'a DatedFrame,
}

/// `n` shuffled aggregate return series plus the true aggregate, each with
/// baseline-anchored cumulative returns and drawdowns.
#[derive(Debug, Clone)]
pub struct MonteCarloSimulation {
    preaggregate: bool,
    simulated: DatedFrame,
    simulated_cum_returns: DatedFrame,
    simulated_drawdowns: DatedFrame,
    actual: DatedFrame,
    actual_cum_returns: DatedFrame,
    actual_drawdowns: DatedFrame,
}

impl<'a> MonteCarloSimulator<'a> {
    pub fn new(returns: &'a DatedFrame) -> Self {
        Self { returns }
    }

    /// Runs `n` simulations, drawing every permutation from `rng`.
    ///
    /// # Errors
    /// `InvalidInput` if `n` is zero.
    #[tracing::instrument(skip(self, rng), fields(entities = self.returns.entities().len()))]
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        n: usize,
        preaggregate: bool,
        rng: &mut R,
    ) -> TearsheetResult<MonteCarloSimulation> {
        if n == 0 {
            return Err(DataError::InvalidInput(
                "Monte Carlo requires at least one simulation".to_string(),
            )
            .into());
        }

        let actual = self.returns.sum_entities(AGGREGATE_COL)?;
        let series = if preaggregate {
            let values = actual.values(AGGREGATE_COL)?;
            (0..n).map(|_| shuffled(&values, rng)).collect::<Vec<_>>()
        } else {
            let columns = self
                .returns
                .entities()
                .iter()
                .map(|e| self.returns.values(e.as_str()))
                .collect::<TearsheetResult<Vec<_>>>()?;
            (0..n)
                .map(|_| shuffle_and_sum(&columns, self.returns.height(), rng))
                .collect::<Vec<_>>()
        };

        let simulated = DatedFrame::from_columns(
            self.returns.dates(),
            series
                .into_iter()
                .enumerate()
                .map(|(i, values)| (sim_col(i), values))
                .collect(),
        )?;

        let simulated_cum_returns = cum_returns(&with_baseline(&simulated)?)?;
        let simulated_drawdowns = drawdowns(&simulated_cum_returns)?;
        let actual_cum_returns = cum_returns(&with_baseline(&actual)?)?;
        let actual_drawdowns = drawdowns(&actual_cum_returns)?;

        tracing::debug!(n, preaggregate, periods = simulated.height(), "Monte Carlo simulated");

        Ok(MonteCarloSimulation {
            preaggregate,
            simulated,
            simulated_cum_returns,
            simulated_drawdowns,
            actual,
            actual_cum_returns,
            actual_drawdowns,
        })
    }

    /// Runs the simulation described by `cfg` with the random source it builds.
    pub fn simulate_with(&self, cfg: &MonteCarloConfig) -> TearsheetResult<MonteCarloSimulation> {
        let mut rng = cfg.rng();
        self.simulate(cfg.n(), cfg.preaggregate(), &mut rng)
    }
}

impl MonteCarloSimulation {
    /// Number of simulated series, excluding the true aggregate.
    pub fn n(&self) -> usize {
        self.simulated.entities().len()
    }

    pub fn preaggregate(&self) -> bool {
        self.preaggregate
    }

    /// Shuffled returns, one column per simulation (`sim_0`, `sim_1`, ...).
    pub fn simulated_returns(&self) -> &DatedFrame {
        &self.simulated
    }

    pub fn simulated_cum_returns(&self) -> &DatedFrame {
        &self.simulated_cum_returns
    }

    pub fn simulated_drawdowns(&self) -> &DatedFrame {
        &self.simulated_drawdowns
    }

    /// Unshuffled aggregate returns in a single `aggregate` column.
    pub fn actual_returns(&self) -> &DatedFrame {
        &self.actual
    }

    pub fn actual_cum_returns(&self) -> &DatedFrame {
        &self.actual_cum_returns
    }

    pub fn actual_drawdowns(&self) -> &DatedFrame {
        &self.actual_drawdowns
    }
}

pub fn sim_col(i: usize) -> String {
    format!("sim_{i}")
}

fn shuffled<R: Rng + ?Sized>(values: &[f64], rng: &mut R) -> Vec<f64> {
    let mut out = values.to_vec();
    out.shuffle(rng);
    out
}

fn shuffle_and_sum<R: Rng + ?Sized>(columns: &[Vec<f64>], height: usize, rng: &mut R) -> Vec<f64> {
    columns.iter().fold(vec![0.0; height], |mut acc, column| {
        for (a, v) in acc.iter_mut().zip(shuffled(column, rng)) {
            *a += v;
        }
        acc
    })
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use chrono::NaiveDate;
    use ordered_float::OrderedFloat;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::error::TearsheetError;

    fn dates(n: u32) -> Vec<NaiveDate> {
        (1..=n)
            .map(|day| NaiveDate::from_ymd_opt(2024, 7, day).expect("valid date"))
            .collect()
    }

    fn sorted(values: &[f64]) -> Vec<OrderedFloat<f64>> {
        let mut out: Vec<_> = values.iter().copied().map(OrderedFloat).collect();
        out.sort();
        out
    }

    fn ten_day_returns() -> DatedFrame {
        let values = vec![0.01, -0.02, 0.03, 0.0, 0.01, -0.005, 0.02, -0.01, 0.004, 0.015];
        DatedFrame::from_columns(&dates(10), vec![("A", values)]).expect("returns")
    }

    #[test]
    fn test_preaggregate_produces_permutations() {
        let returns = ten_day_returns();
        let mut rng = StdRng::seed_from_u64(42);
        let sim = MonteCarloSimulator::new(&returns)
            .simulate(3, true, &mut rng)
            .expect("simulate");

        assert_eq!(sim.n(), 3);
        assert_eq!(sim.simulated_returns().height(), 10);
        assert_eq!(sim.actual_returns().height(), 10);
        assert_eq!(sim.simulated_cum_returns().height(), 11);
        assert_eq!(sim.actual_drawdowns().height(), 11);

        let original = sorted(&returns.values("A").expect("values"));
        for i in 0..3 {
            let values = sim.simulated_returns().values(&sim_col(i)).expect("sim");
            assert_eq!(sorted(&values), original, "sim_{i} must be a permutation");
            let cum = sim.simulated_cum_returns().values(&sim_col(i)).expect("cum");
            assert_eq!(cum[0], 1.0);
        }
    }

    #[test]
    fn test_true_series_is_not_shuffled() {
        let returns = ten_day_returns();
        let mut rng = StdRng::seed_from_u64(7);
        let sim = MonteCarloSimulator::new(&returns)
            .simulate(2, false, &mut rng)
            .expect("simulate");

        assert_eq!(
            sim.actual_returns().values(AGGREGATE_COL).expect("actual"),
            returns.values("A").expect("values")
        );
        assert!(!sim.simulated_returns().has_entity(AGGREGATE_COL));
    }

    #[test]
    fn test_entity_wise_shuffle_preserves_each_entity() {
        // B is constant, so every aggregate is a permutation of A + 1.
        let a = vec![0.01, -0.02, 0.03, 0.0, 0.05];
        let returns = DatedFrame::from_columns(
            &dates(5),
            vec![("A", a.clone()), ("B", vec![1.0; 5])],
        )
        .expect("returns");

        let mut rng = StdRng::seed_from_u64(3);
        let sim = MonteCarloSimulator::new(&returns)
            .simulate(4, false, &mut rng)
            .expect("simulate");

        let expected = sorted(&a.iter().map(|v| v + 1.0).collect::<Vec<_>>());
        for i in 0..4 {
            let values = sim.simulated_returns().values(&sim_col(i)).expect("sim");
            assert_eq!(sorted(&values), expected);
        }
    }

    /// A in 1..=6 and B in 10..=60 (steps of 10): every sum `a + b` splits
    /// back uniquely into its two parts.
    fn separable_returns() -> DatedFrame {
        let a: Vec<f64> = (1..=6).map(f64::from).collect();
        let b: Vec<f64> = (1..=6).map(|i| f64::from(i * 10)).collect();
        DatedFrame::from_columns(&dates(6), vec![("A", a), ("B", b)]).expect("returns")
    }

    #[test]
    fn test_entity_wise_shuffle_is_independent_per_entity() {
        let returns = separable_returns();
        let actual = sorted(&returns.sum_entities("sum").expect("sum").values("sum").expect("sum"));

        let mut rng = StdRng::seed_from_u64(17);
        let n = 20;
        let sim = MonteCarloSimulator::new(&returns)
            .simulate(n, false, &mut rng)
            .expect("simulate");

        let expected_a = sorted(&returns.values("A").expect("A"));
        let expected_b = sorted(&returns.values("B").expect("B"));
        let mut differs_from_actual = 0;
        for i in 0..n {
            let values = sim.simulated_returns().values(&sim_col(i)).expect("sim");
            let a: Vec<f64> = values.iter().map(|v| v % 10.0).collect();
            let b: Vec<f64> = values.iter().zip(&a).map(|(v, a)| v - a).collect();
            assert_eq!(sorted(&a), expected_a, "A values preserved in sim_{i}");
            assert_eq!(sorted(&b), expected_b, "B values preserved in sim_{i}");

            if sorted(&values) != actual {
                differs_from_actual += 1;
            }
        }
        assert!(
            differs_from_actual > 0,
            "independent shuffles must break the row pairing of A and B"
        );
    }

    #[test]
    fn test_preaggregate_permutes_row_sums() {
        let returns = separable_returns();
        let row_sums = sorted(&[11.0, 22.0, 33.0, 44.0, 55.0, 66.0]);

        let mut rng = StdRng::seed_from_u64(5);
        let sim = MonteCarloSimulator::new(&returns)
            .simulate(10, true, &mut rng)
            .expect("simulate");

        assert_eq!(
            sorted(&sim.actual_returns().values(AGGREGATE_COL).expect("actual")),
            row_sums
        );
        for i in 0..10 {
            let values = sim.simulated_returns().values(&sim_col(i)).expect("sim");
            assert_eq!(sorted(&values), row_sums, "sim_{i} must permute the row sums");
        }
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let returns = ten_day_returns();
        let cfg = MonteCarloConfig::new(NonZeroUsize::new(5).expect("non-zero")).with_seed(11);

        let first = MonteCarloSimulator::new(&returns).simulate_with(&cfg).expect("first");
        let second = MonteCarloSimulator::new(&returns).simulate_with(&cfg).expect("second");
        for i in 0..5 {
            assert_eq!(
                first.simulated_returns().values(&sim_col(i)).expect("first"),
                second.simulated_returns().values(&sim_col(i)).expect("second")
            );
        }
    }

    #[test]
    fn test_rejects_zero_simulations() {
        let returns = ten_day_returns();
        let mut rng = StdRng::seed_from_u64(0);
        let err = MonteCarloSimulator::new(&returns)
            .simulate(0, true, &mut rng)
            .expect_err("n = 0 must be rejected");
        assert!(matches!(err, TearsheetError::Data(DataError::InvalidInput(_))));
    }
}
