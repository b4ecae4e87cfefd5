use crate::error::SchedulerError;
use serde::{Deserialize, Serialize};

/// The largest value of a 31-bit signed integer. Idle work never ages past it.
pub const MAX_SIGNED_31_BIT_INT: f64 = 1_073_741_823.0;

pub const IMMEDIATE_PRIORITY_TIMEOUT: f64 = -1.0;
pub const USER_BLOCKING_PRIORITY_TIMEOUT: f64 = 250.0;
pub const NORMAL_PRIORITY_TIMEOUT: f64 = 5000.0;
pub const LOW_PRIORITY_TIMEOUT: f64 = 10000.0;
pub const IDLE_PRIORITY_TIMEOUT: f64 = MAX_SIGNED_31_BIT_INT;

/// Priority of a unit of work, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PriorityLevel {
    Immediate = 1,
    UserBlocking = 2,
    Normal = 3,
    Low = 4,
    Idle = 5,
}

impl PriorityLevel {
    pub const ALL: [PriorityLevel; 5] = [
        PriorityLevel::Immediate,
        PriorityLevel::UserBlocking,
        PriorityLevel::Normal,
        PriorityLevel::Low,
        PriorityLevel::Idle,
    ];

    /// Lenient conversion: anything unrecognized is Normal.
    pub fn from_raw(raw: u8) -> Self {
        Self::try_from(raw).unwrap_or(PriorityLevel::Normal)
    }

    pub fn as_raw(self) -> u8 {
        self as u8
    }
}

impl Default for PriorityLevel {
    fn default() -> Self {
        PriorityLevel::Normal
    }
}

impl TryFrom<u8> for PriorityLevel {
    type Error = SchedulerError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(PriorityLevel::Immediate),
            2 => Ok(PriorityLevel::UserBlocking),
            3 => Ok(PriorityLevel::Normal),
            4 => Ok(PriorityLevel::Low),
            5 => Ok(PriorityLevel::Idle),
            other => Err(SchedulerError::UnknownPriority(other)),
        }
    }
}

impl std::fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PriorityLevel::Immediate => "immediate",
            PriorityLevel::UserBlocking => "user-blocking",
            PriorityLevel::Normal => "normal",
            PriorityLevel::Low => "low",
            PriorityLevel::Idle => "idle",
        };
        f.write_str(name)
    }
}

/// Relative expiration offsets (ms) per priority level.
///
/// A task expires `timeout` ms after it becomes eligible to run. Expired tasks
/// are no longer subject to yielding, which is what keeps low priority work
/// from starving.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityTimeouts {
    pub immediate: f64,
    pub user_blocking: f64,
    pub normal: f64,
    pub low: f64,
    pub idle: f64,
}

impl Default for PriorityTimeouts {
    fn default() -> Self {
        Self {
            immediate: IMMEDIATE_PRIORITY_TIMEOUT,
            user_blocking: USER_BLOCKING_PRIORITY_TIMEOUT,
            normal: NORMAL_PRIORITY_TIMEOUT,
            low: LOW_PRIORITY_TIMEOUT,
            idle: IDLE_PRIORITY_TIMEOUT,
        }
    }
}

impl PriorityTimeouts {
    pub fn timeout(&self, level: PriorityLevel) -> f64 {
        match level {
            PriorityLevel::Immediate => self.immediate,
            PriorityLevel::UserBlocking => self.user_blocking,
            PriorityLevel::Normal => self.normal,
            PriorityLevel::Low => self.low,
            PriorityLevel::Idle => self.idle,
        }
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        let table = PriorityLevel::ALL.map(|level| (level, self.timeout(level)));
        if let Some((level, _)) = table.iter().find(|(_, t)| !t.is_finite()) {
            return Err(SchedulerError::InvalidConfig(format!(
                "timeout for {level} priority is not finite"
            )));
        }
        for pair in table.windows(2) {
            let ((urgent, a), (lax, b)) = (pair[0], pair[1]);
            if a >= b {
                return Err(SchedulerError::InvalidConfig(format!(
                    "timeout for {urgent} ({a}ms) must be shorter than for {lax} ({b}ms)"
                )));
            }
        }
        Ok(())
    }
}
