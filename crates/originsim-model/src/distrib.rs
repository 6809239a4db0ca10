//! Parameterised samplers for the service and delay models.
//!
//! Gamma and normal distributions are parameterised by mean and coefficient
//! of variation, the way the cluster config specifies them. Construction is
//! fallible so bad parameters surface at startup, not mid-run.

use crate::rng::SimRng;
use rand_distr::{Gamma, LogNormal, Normal};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DistribError {
    #[error("invalid gamma parameters (mean={mean}, cv={cv}): {source}")]
    Gamma {
        mean: f64,
        cv: f64,
        source: rand_distr::GammaError,
    },
    #[error("invalid normal parameters: {0}")]
    Normal(#[from] rand_distr::NormalError),
}

/// Gamma distribution with the given mean and coefficient of variation.
///
/// Shape `k = 1/cv²`, scale `θ = mean/k`; both mean and cv must be positive.
pub fn gamma_mean_cv(mean: f64, cv: f64) -> Result<Gamma<f64>, DistribError> {
    let k = 1.0 / (cv * cv);
    let theta = mean / k;
    Gamma::new(k, theta).map_err(|source| DistribError::Gamma { mean, cv, source })
}

/// Normal distribution with standard deviation `mean · cv`.
pub fn normal_mean_cv(mean: f64, cv: f64) -> Result<Normal<f64>, DistribError> {
    Ok(Normal::new(mean, mean * cv)?)
}

/// Log-normal distribution over `exp(μ + σ·N)`.
pub fn log_normal(mu: f64, sigma: f64) -> Result<LogNormal<f64>, DistribError> {
    Ok(LogNormal::new(mu, sigma)?)
}

/// Per-session fragment counts: a bucket is chosen by weight, then the count
/// is uniform within `1..=bucket`. Short sessions dominate; the long tail
/// models binge playback.
const FRAGMENT_WEIGHTS: [(u32, f64); 4] =
    [(15, 0.55), (100, 0.30), (300, 0.10), (900, 0.05)];

/// Draw a fragment count for a new session.
pub fn random_fragments(rng: &SimRng) -> u32 {
    let r = rng.f64();
    let mut acc = 0.0;
    for (max_fragments, probability) in FRAGMENT_WEIGHTS {
        acc += probability;
        if r <= acc {
            return 1 + rng.index(max_fragments as usize) as u32;
        }
    }
    10
}
