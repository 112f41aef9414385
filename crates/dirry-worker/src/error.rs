//! Error types for the worker bridge.

use thiserror::Error;

/// Worker bridge error type
#[derive(Error, Debug)]
pub enum BridgeError {
    /// WebAssembly runtime error (engine, linking, calls, memory access)
    #[error("WASM error: {0}")]
    WasmError(String),

    /// The computation module could not be fetched or instantiated
    #[error("module load failed: {0}")]
    ModuleLoad(String),

    /// A request arrived before the computation module finished loading
    #[error("{0} is not initialized yet.")]
    NotReady(String),

    /// Inbound message could not be turned into a request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Chunk content was not valid JSON
    #[error("content decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// The host side of the message channel is gone
    #[error("channel closed: {0}")]
    Channel(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_message() {
        let err = BridgeError::NotReady("WASM".to_string());
        assert_eq!(err.to_string(), "WASM is not initialized yet.");
    }

    #[test]
    fn test_decode_from_serde() {
        let err: BridgeError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, BridgeError::Decode(_)));
    }
}
