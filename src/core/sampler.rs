use std::f64::consts::PI;

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

const MIN_RETURN: f64 = -0.95;
const MAX_RETURN: f64 = 2.5;

pub struct GrowthSampler {
    rng: Pcg64Mcg,
    cached_normal: Option<f64>,
}

impl GrowthSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Pcg64Mcg::seed_from_u64(seed),
            cached_normal: None,
        }
    }

    pub fn sample(&mut self, mean: f64, stdev: f64, override_mean: Option<f64>) -> f64 {
        let mean = override_mean.unwrap_or(mean);
        if stdev == 0.0 {
            return mean;
        }
        (mean + stdev * self.standard_normal()).clamp(MIN_RETURN, MAX_RETURN)
    }

    fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.rng.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }

    fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.cached_normal.take() {
            return z;
        }

        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        self.cached_normal = Some(r * theta.sin());
        r * theta.cos()
    }
}

pub fn derive_seed(base_seed: u64, trial: u32) -> u64 {
    splitmix64(base_seed ^ ((trial as u64) << 17) ^ trial as u64)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
