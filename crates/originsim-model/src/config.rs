//! YAML configuration for simulation runs.
//!
//! Every section rejects unknown keys. Numeric keys left at zero (and empty
//! strings) fall back to defaults after parsing, so a partial config stays
//! valid; derived quantities are computed last.

use serde::Deserialize;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default)]
    pub traffic: TrafficSection,
    /// Ordered traffic spike schedule.
    #[serde(default)]
    pub spikes: Vec<SpikeSection>,
    #[serde(default)]
    pub cluster: ClusterSection,
    #[serde(default)]
    pub jitter: JitterSection,
    #[serde(default)]
    pub balancer: BalancerSection,
}

/// Horizon, snapshot step and seed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationSection {
    /// Total simulated time in seconds.
    #[serde(default)]
    pub time_seconds: f64,
    /// Snapshot collection period in seconds.
    #[serde(default)]
    pub step_seconds: f64,
    /// RNG seed; 0 draws one from the system clock.
    #[serde(default)]
    pub seed: u64,
}

/// Poisson arrival process parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrafficSection {
    /// Baseline arrival rate, requests per second.
    #[serde(default)]
    pub base_rps: f64,
    /// Size of the session-id population.
    #[serde(default)]
    pub users_amount: u64,
}

/// One interval during which the arrival rate is multiplied.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpikeSection {
    /// Start time in seconds.
    pub at: f64,
    /// Length in seconds.
    pub duration: f64,
    /// Multiplier applied to `base_rps`.
    pub factor: f64,
}

/// Cluster shape and the per-session retry policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterSection {
    /// Number of origin servers.
    #[serde(default)]
    pub servers: u32,
    /// Stream bitrate in Mbps; one connection consumes one bitrate unit.
    #[serde(default)]
    pub bitrate: f64,
    /// Playback length of one media segment, seconds.
    #[serde(default)]
    pub segment_duration: f64,
    /// Median server capacity in Mbps.
    #[serde(default)]
    pub cap_mean_mbps: f64,
    /// Relative spread of server capacity.
    #[serde(default)]
    pub cap_cv: f64,
    /// Mean one-way delay, milliseconds.
    #[serde(default)]
    pub owd_mean: f64,
    /// Relative spread of one-way delay.
    #[serde(default)]
    pub owd_cv: f64,
    /// Log-normal noise on transfer time.
    #[serde(default)]
    pub sigma_server: f64,
    /// Attempts to fetch one segment from the same server before switching.
    #[serde(default)]
    pub max_retries: u32,
    /// Server switches allowed within one session.
    #[serde(default)]
    pub max_switches: u32,
    /// Accepted for compatibility; the generator drops a session whose
    /// first pick fails instead of retrying.
    #[serde(default)]
    pub first_pick_retries: u32,
    /// Accepted for compatibility, see `first_pick_retries`.
    #[serde(default)]
    pub first_pick_backoff: f64,
    /// Latency cost in ms charged to the first request after a redirect.
    #[serde(default)]
    pub redirect_penalty_ms: f64,
    /// Bytes per segment, derived from bitrate and segment duration.
    #[serde(skip)]
    pub segment_size_bytes: f64,
}

/// Per-server OWD jitter process.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JitterSection {
    /// OWD update period in seconds.
    #[serde(rename = "tick_s", default)]
    pub tick: f64,
    /// Probability of entering a delay spike on each tick.
    #[serde(default)]
    pub spike_prob: f64,
    /// Extra milliseconds of OWD while spiking.
    #[serde(default)]
    pub spike_extra: f64,
    /// Spike length in seconds.
    #[serde(rename = "spike_duration_s", default)]
    pub spike_duration: f64,
}

/// Balancing strategy selection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BalancerSection {
    /// Strategy name, or a `"a+b+c"` fallback chain.
    #[serde(default)]
    pub strategy: String,
    /// Virtual nodes per server on the consistent-hash ring.
    #[serde(default)]
    pub ch_replicas: u32,
    /// Peak-EWMA decay factor.
    #[serde(default)]
    pub ewma_alpha: f64,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(s)?;
        config.fill_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Replace zero/empty keys with defaults and compute derived fields.
    pub fn fill_defaults(&mut self) {
        let sim = &mut self.simulation;
        if sim.time_seconds == 0.0 {
            sim.time_seconds = 600.0;
        }
        if sim.step_seconds == 0.0 {
            sim.step_seconds = 1.0;
        }
        if sim.seed == 0 {
            sim.seed = clock_seed();
        }

        let traffic = &mut self.traffic;
        if traffic.base_rps == 0.0 {
            traffic.base_rps = 200.0;
        }
        if traffic.users_amount == 0 {
            traffic.users_amount = 10_000;
        }

        let cluster = &mut self.cluster;
        if cluster.servers == 0 {
            cluster.servers = 5;
        }
        if cluster.bitrate == 0.0 {
            cluster.bitrate = 4.0;
        }
        if cluster.segment_duration == 0.0 {
            cluster.segment_duration = 6.0;
        }
        if cluster.cap_mean_mbps == 0.0 {
            cluster.cap_mean_mbps = 500.0;
        }
        if cluster.cap_cv == 0.0 {
            cluster.cap_cv = 0.2;
        }
        if cluster.owd_mean == 0.0 {
            cluster.owd_mean = 100.0;
        }
        if cluster.owd_cv == 0.0 {
            cluster.owd_cv = 0.3;
        }
        if cluster.sigma_server == 0.0 {
            cluster.sigma_server = 0.25;
        }
        if cluster.max_retries == 0 {
            cluster.max_retries = 2;
        }
        if cluster.max_switches == 0 {
            cluster.max_switches = 4;
        }
        if cluster.first_pick_retries == 0 {
            cluster.first_pick_retries = 3;
        }
        if cluster.first_pick_backoff == 0.0 {
            cluster.first_pick_backoff = 100.0;
        }
        if cluster.redirect_penalty_ms == 0.0 {
            cluster.redirect_penalty_ms = 100.0;
        }
        cluster.segment_size_bytes =
            cluster.bitrate * 1_000_000.0 / 8.0 * cluster.segment_duration;

        let jitter = &mut self.jitter;
        if jitter.tick == 0.0 {
            jitter.tick = 1.0;
        }
        if jitter.spike_prob == 0.0 {
            jitter.spike_prob = 0.002;
        }
        if jitter.spike_extra == 0.0 {
            jitter.spike_extra = 300.0;
        }
        if jitter.spike_duration == 0.0 {
            jitter.spike_duration = 5.0;
        }

        let balancer = &mut self.balancer;
        if balancer.strategy.is_empty() {
            balancer.strategy = "ch".to_string();
        }
        if balancer.ch_replicas == 0 {
            balancer.ch_replicas = 100;
        }
        if balancer.ewma_alpha == 0.0 {
            balancer.ewma_alpha = 0.3;
        }
    }

    /// Validate configuration consistency.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.time_seconds <= 0.0 {
            return Err(ConfigError::Validation(
                "time_seconds must be > 0".to_string(),
            ));
        }
        if self.traffic.base_rps <= 0.0 {
            return Err(ConfigError::Validation("base_rps must be > 0".to_string()));
        }
        if self.cluster.bitrate <= 0.0 {
            return Err(ConfigError::Validation("bitrate must be > 0".to_string()));
        }
        if self.cluster.cap_cv <= 0.0 || self.cluster.owd_cv <= 0.0 {
            return Err(ConfigError::Validation(
                "cap_cv and owd_cv must be > 0".to_string(),
            ));
        }
        if self.cluster.sigma_server < 0.0 {
            return Err(ConfigError::Validation(
                "sigma_server must be >= 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.balancer.ewma_alpha) {
            return Err(ConfigError::Validation(
                "ewma_alpha must be in (0, 1]".to_string(),
            ));
        }
        let mut last_at = f64::NEG_INFINITY;
        for spike in &self.spikes {
            if spike.at < last_at {
                return Err(ConfigError::Validation(format!(
                    "spikes must be ordered by start time, got at={} after at={}",
                    spike.at, last_at,
                )));
            }
            if spike.duration < 0.0 || spike.factor <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "spike at={} needs duration >= 0 and factor > 0",
                    spike.at,
                )));
            }
            last_at = spike.at;
        }
        Ok(())
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}
