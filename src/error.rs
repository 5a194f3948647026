//! Error types
//!
//! Three layers, matching who owns the failure:
//! - [`StorageError`]: key-value store and storage provider failures, handed
//!   to the engine's own error channel
//! - [`EngineError`]: failures reported by the editor engine
//! - [`BridgeError`]: misuse of the bridge lifecycle (attach order, calls
//!   before the engine is live)

use crate::lifecycle::BridgeKind;
use thiserror::Error;

/// Failure of a key-value store or storage provider operation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no active storage provider selected")]
    NoActiveProvider,

    #[error("unknown storage provider: {0}")]
    UnknownProvider(String),

    #[error("corrupt record under key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by the editor engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("page not found: {0}")]
    PageNotFound(String),

    #[error("page already exists: {0}")]
    DuplicatePage(String),

    #[error("no page is selected")]
    NoSelectedPage,

    #[error("invalid {kind} code: {reason}")]
    InvalidCode { kind: String, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Misuse of the bridge lifecycle, or an engine failure surfaced through a bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The bridge must be attached before the engine initializes.
    #[error("cannot attach {bridge} bridge: engine is already initialized")]
    AlreadyInitialized { bridge: BridgeKind },

    /// The operation needs the live engine.
    #[error("{bridge} bridge is not live: engine has not initialized yet")]
    NotInitialized { bridge: BridgeKind },

    #[error("engine handle was already initialized")]
    EngineAlreadyInitialized,

    #[error("registry entry for {bridge} holds a different mirror type")]
    MirrorTypeMismatch { bridge: BridgeKind },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type StorageResult<T> = Result<T, StorageError>;
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_bridge() {
        let err = BridgeError::AlreadyInitialized {
            bridge: BridgeKind::Storage,
        };
        assert_eq!(
            err.to_string(),
            "cannot attach storage bridge: engine is already initialized"
        );
    }

    #[test]
    fn test_storage_error_converts_into_engine_error() {
        let err: EngineError = StorageError::NoActiveProvider.into();
        assert!(matches!(err, EngineError::Storage(StorageError::NoActiveProvider)));
        assert_eq!(err.to_string(), "no active storage provider selected");
    }
}
