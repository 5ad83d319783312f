//! # storage_sim: Spot Price Simulation
//!
//! Monte Carlo spot price models producing the panel-layout simulation data
//! ([`SpotSims`]) consumed by the valuation layer.
//!
//! The one model provided is a one-factor mean-reverting log-spot process:
//! simulated spot prices are the forward curve multiplied by a mean-one
//! lognormal stochastic multiplier, which is exactly the form the
//! valuation's pathwise deltas assume.
//!
//! ## Usage Example
//!
//! ```rust
//! use storage_core::series::TimeSeries;
//! use storage_core::types::time::{Date, Period};
//! use storage_sim::OneFactorSpotSimulator;
//!
//! let start = Date::from_ymd(2024, 4, 1).unwrap();
//! let end = start.offset(30);
//! let vols = TimeSeries::from_fn(start, end, |_| 0.7);
//! let forward_curve = TimeSeries::from_fn(start, end, |_| 50.0);
//!
//! let simulator = OneFactorSpotSimulator::new(14.5, vols, 2_000, 42, true).unwrap();
//! let sims = simulator
//!     .simulate(Date::from_ymd(2024, 3, 15).unwrap(), start, end, &forward_curve)
//!     .unwrap();
//! assert_eq!(sims.num_sims(), 2_000);
//! assert_eq!(sims.num_factors(), 1);
//! ```

#![warn(missing_docs)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use thiserror::Error;

use storage_core::panel::Panel;
use storage_core::series::DoubleSeries;
use storage_core::sim::SpotSims;
use storage_core::types::time::{Date, Period};

/// Errors from configuring or running a simulation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// A model parameter is outside its valid domain.
    #[error("invalid simulation parameter: {0}")]
    InvalidParameter(String),

    /// An input curve does not cover the simulated periods.
    #[error("missing market data: {0}")]
    MissingMarketData(String),
}

/// One-factor mean-reverting spot price simulator.
///
/// The log-spot driver follows an Ornstein-Uhlenbeck process with mean
/// reversion speed `alpha` and per-period spot volatility, stepped exactly
/// over each period gap:
///
/// ```text
/// x(t_j) = x(t_{j-1}) e^(-alpha dt) + vol_j sqrt((1 - e^(-2 alpha dt)) / (2 alpha)) Z_j
/// ```
///
/// and the simulated spot is `F(t_j) exp(-Var(x(t_j)) / 2 + x(t_j))`, so
/// every simulated price has expectation equal to the forward price.
///
/// With antithetic sampling each odd-indexed simulation reuses the previous
/// simulation's normal draws negated, halving the number of draws and
/// pairing simulations for variance reduction downstream.
pub struct OneFactorSpotSimulator<P: Period> {
    mean_reversion: f64,
    spot_vols: DoubleSeries<P>,
    num_sims: usize,
    seed: u64,
    antithetic: bool,
}

impl<P: Period> OneFactorSpotSimulator<P> {
    /// Creates a simulator.
    ///
    /// `spot_vols` must cover every period that will be simulated. With
    /// `antithetic` set, `num_sims` must be even.
    pub fn new(
        mean_reversion: f64,
        spot_vols: DoubleSeries<P>,
        num_sims: usize,
        seed: u64,
        antithetic: bool,
    ) -> Result<Self, SimError> {
        if !(mean_reversion >= 0.0) || !mean_reversion.is_finite() {
            return Err(SimError::InvalidParameter(format!(
                "mean reversion must be non-negative and finite, got {}",
                mean_reversion
            )));
        }
        if num_sims == 0 {
            return Err(SimError::InvalidParameter(
                "num_sims must be positive".into(),
            ));
        }
        if antithetic && num_sims % 2 != 0 {
            return Err(SimError::InvalidParameter(format!(
                "antithetic sampling requires an even number of simulations, got {}",
                num_sims
            )));
        }
        Ok(OneFactorSpotSimulator {
            mean_reversion,
            spot_vols,
            num_sims,
            seed,
            antithetic,
        })
    }

    /// Whether simulations are generated in antithetic pairs.
    pub fn is_antithetic(&self) -> bool {
        self.antithetic
    }

    /// Simulates spot prices for every period in `sim_start..=sim_end`.
    ///
    /// `valuation_date` anchors the first time step; the factor starts at
    /// zero there. The forward curve must cover the simulated periods.
    pub fn simulate(
        &self,
        valuation_date: Date,
        sim_start: P,
        sim_end: P,
        forward_curve: &DoubleSeries<P>,
    ) -> Result<SpotSims<P>, SimError> {
        let num_periods = sim_end.offset_from(sim_start) + 1;
        if num_periods <= 0 {
            return Err(SimError::InvalidParameter(format!(
                "simulation end {} is before start {}",
                sim_end, sim_start
            )));
        }
        let num_periods = num_periods as usize;

        // deterministic per-period quantities
        let mut decay = vec![0.0; num_periods];
        let mut vol_scale = vec![0.0; num_periods];
        let mut log_variance = vec![0.0; num_periods];
        let mut forwards = vec![0.0; num_periods];

        let alpha = self.mean_reversion;
        let mut previous_day = valuation_date;
        let mut variance = 0.0;
        for i in 0..num_periods {
            let period = sim_start.offset(i as i32);
            let day = period.first_day();
            let dt = (day - previous_day) as f64 / 365.0;
            if dt <= 0.0 {
                return Err(SimError::InvalidParameter(format!(
                    "period {} does not advance time from the valuation date",
                    period
                )));
            }
            previous_day = day;

            let vol = *self.spot_vols.get(period).ok_or_else(|| {
                SimError::MissingMarketData(format!("no spot volatility for period {}", period))
            })?;
            forwards[i] = *forward_curve.get(period).ok_or_else(|| {
                SimError::MissingMarketData(format!("no forward price for period {}", period))
            })?;

            let step_decay = (-alpha * dt).exp();
            decay[i] = step_decay;
            // alpha -> 0 degenerates to a driftless Brownian step
            let step_variance = if alpha == 0.0 {
                vol * vol * dt
            } else {
                vol * vol * (1.0 - step_decay * step_decay) / (2.0 * alpha)
            };
            vol_scale[i] = step_variance.sqrt();
            variance = variance * step_decay * step_decay + step_variance;
            log_variance[i] = variance;
        }

        let mut spot = Panel::zeros(sim_start, num_periods, self.num_sims);
        let mut factor = Panel::zeros(sim_start, num_periods, self.num_sims);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut draws = vec![0.0f64; num_periods];
        for sim in 0..self.num_sims {
            let mirror = self.antithetic && sim % 2 == 1;
            if !mirror {
                for draw in draws.iter_mut() {
                    *draw = rng.sample(StandardNormal);
                }
            }
            let sign = if mirror { -1.0 } else { 1.0 };

            let mut x = 0.0;
            for i in 0..num_periods {
                x = x * decay[i] + vol_scale[i] * sign * draws[i];
                factor.row_mut(i)[sim] = x;
                spot.row_mut(i)[sim] = forwards[i] * (-0.5 * log_variance[i] + x).exp();
            }
        }

        SpotSims::new(spot, vec![factor])
            .map_err(|e| SimError::InvalidParameter(e.to_string()))
    }
}
