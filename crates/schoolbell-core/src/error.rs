use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchoolbellError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid time of day: {0} (expected HH:MM)")]
    InvalidTimeOfDay(String),
}

impl SchoolbellError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            SchoolbellError::Config(_) => "CONFIG_ERROR",
            SchoolbellError::InvalidTimezone(_) => "INVALID_TIMEZONE",
            SchoolbellError::InvalidTimeOfDay(_) => "INVALID_TIME_OF_DAY",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchoolbellError>;
