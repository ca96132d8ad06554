use thiserror::Error;

use crate::machine::MachinePhase;

#[derive(Error, Debug)]
pub enum LullabyError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("A spin is already in progress")]
    SpinInProgress,

    #[error("Operation '{operation}' not allowed in phase {phase:?}")]
    InvalidPhase {
        operation: &'static str,
        phase: MachinePhase,
    },

    #[error("Item '{id}' not found in catalog")]
    UnknownItem { id: String },

    #[error("Item '{id}' has not been unlocked")]
    ItemLocked { id: String },

    #[error("Invalid catalog: {reason}")]
    InvalidCatalog { reason: String },

    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error("Reset requires explicit confirmation")]
    ResetNotConfirmed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type LullabyResult<T> = Result<T, LullabyError>;
