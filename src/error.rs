//! Error types shared by the instance loaders and the exact solver.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TspError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// Rejected before any solver interaction.
    #[error("invalid input: {0}")]
    InputError(String),
    /// Backend failure that is not a modelling outcome.
    #[error("solver failure: {0}")]
    Solver(String),
}

pub type TspResult<T> = std::result::Result<T, TspError>;

impl TspError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::InputError(message.into())
    }

    pub fn solver(message: impl Into<String>) -> Self {
        Self::Solver(message.into())
    }
}
