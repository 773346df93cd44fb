use std::f64::consts::TAU;

use cogex_core::Randomization;
use rand::Rng;

/// [`Randomization`] backed by any `rand` generator.
pub struct Randomizer<R: Rng> {
    rng: R,
}

impl<R: Rng> Randomizer<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    // Box-Muller; `1 - u` keeps the log argument in (0, 1].
    fn standard_normal(&mut self) -> f64 {
        let u1 = 1.0 - self.rng.random::<f64>();
        let u2 = self.rng.random::<f64>();
        (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
    }

    fn exponential(&mut self, rate: f64) -> f64 {
        -(1.0 - self.rng.random::<f64>()).ln() / rate
    }
}

impl<R: Rng> Randomization for Randomizer<R> {
    fn sample_ex_gaussian(&mut self, mean: f64, sd: f64, rate: f64, positive: bool) -> f64 {
        loop {
            let sample = mean + sd * self.standard_normal() + self.exponential(rate);
            if !positive || sample > 0.0 {
                return sample;
            }
        }
    }

    fn random_int(&mut self, lower: i64, upper: i64) -> i64 {
        if upper <= lower {
            return lower;
        }
        self.rng.random_range(lower..=upper)
    }
}
