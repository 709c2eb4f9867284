use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("band table '{table}' is empty")]
    EmptyBands { table: &'static str },

    #[error("band table '{table}' must have strictly ascending bounds starting at 0")]
    UnorderedBands { table: &'static str },

    #[error("rate '{name}' must be within [0, 1], got {value}")]
    RateOutOfRange { name: String, value: f64 },

    #[error("value '{name}' must be finite and >= 0, got {value}")]
    NegativeValue { name: String, value: f64 },

    #[error("invalid age range: {0}")]
    InvalidAgeRange(String),

    #[error("priority for '{asset}' must be in 0..=4, got {value}")]
    InvalidPriority { asset: &'static str, value: u8 },

    #[error("monteCarloTrials must be > 0 when any return stdev is non-zero")]
    NoTrials,

    #[error("invalid event '{id}': {reason}")]
    InvalidEvent { id: String, reason: String },

    #[error("failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse scenario: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
