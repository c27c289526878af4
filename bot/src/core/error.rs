// tactical_bot_core/bot/src/core/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Capacity exceeded: {what} (capacity {capacity})")]
    CapacityExceeded { what: &'static str, capacity: usize },

    #[error("Stale handle: {0}")]
    StaleHandle(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Precomputed data error: {0}")]
    PrecomputedData(String),

    #[error("Map data error: {0}")]
    MapData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Capacity and invariant violations mean the search state can't be trusted anymore.
    pub fn is_internal_consistency_error(&self) -> bool {
        matches!(
            self,
            BotError::CapacityExceeded { .. } | BotError::StaleHandle(_) | BotError::InvariantViolation(_)
        )
    }
}

pub type BotResult<T> = Result<T, BotError>;
