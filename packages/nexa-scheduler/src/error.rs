use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("frame rate {0} is outside (0, 125]; forcing frame rates higher than 125 fps is not supported")]
    InvalidFrameRate(f64),

    #[error("unknown priority level {0}")]
    UnknownPriority(u8),

    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),

    #[error("no host platform was provided to the scheduler builder")]
    MissingPlatform,

    #[error("failed to parse scheduler config: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
