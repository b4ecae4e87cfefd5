use crate::error::{Result, SchedulerError};
use crate::priority::PriorityTimeouts;
use serde::{Deserialize, Serialize};

/// Length of one time slice when no frame rate has been forced.
pub const DEFAULT_FRAME_INTERVAL_MS: f64 = 5.0;
/// Upper bound accepted by `force_frame_rate`.
pub const MAX_FRAME_RATE: f64 = 125.0;

/// Tunables for a [`crate::Scheduler`].
///
/// The defaults are tuned for interactive work at 60 fps. Everything else can
/// be loaded from JSON; missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub frame_interval_ms: f64,
    pub timeouts: PriorityTimeouts,
    /// Only consulted when an input-pending predicate is installed.
    pub continuous_input_interval_ms: f64,
    /// Only consulted when an input-pending predicate is installed.
    pub max_yield_interval_ms: f64,
    pub profiling: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            timeouts: PriorityTimeouts::default(),
            continuous_input_interval_ms: 50.0,
            max_yield_interval_ms: 300.0,
            profiling: false,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SchedulerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.frame_interval_ms.is_finite() || self.frame_interval_ms <= 0.0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "frame_interval_ms must be a positive number, got {}",
                self.frame_interval_ms
            )));
        }
        if self.continuous_input_interval_ms < self.frame_interval_ms
            || self.max_yield_interval_ms < self.continuous_input_interval_ms
        {
            return Err(SchedulerError::InvalidConfig(
                "yield intervals must satisfy frame <= continuous input <= max".to_string(),
            ));
        }
        self.timeouts.validate()
    }
}
