//! Worker configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BridgeError, Result};

#[cfg(feature = "wasm")]
use crate::wasm::WasmConfig;

/// Configuration for a worker instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Name used in the not-initialized error ("<label> is not initialized yet.")
    pub module_label: String,

    /// Report unrecognized actions, malformed requests and undecodable chunk
    /// content to the host instead of dropping them
    pub strict_errors: bool,

    /// WASM runtime configuration
    #[cfg(feature = "wasm")]
    pub wasm: WasmConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            module_label: "WASM".to_string(),
            strict_errors: false,
            #[cfg(feature = "wasm")]
            wasm: WasmConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| BridgeError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Text of the error posted for requests that arrive too early.
    pub fn not_ready_message(&self) -> String {
        BridgeError::NotReady(self.module_label.clone()).to_string()
    }

    /// Builder: set module label
    pub fn module_label(mut self, label: impl Into<String>) -> Self {
        self.module_label = label.into();
        self
    }

    /// Builder: enable strict error reporting
    pub fn strict_errors(mut self, strict: bool) -> Self {
        self.strict_errors = strict;
        self
    }

    /// Builder: set WASM runtime configuration
    #[cfg(feature = "wasm")]
    pub fn wasm(mut self, wasm: WasmConfig) -> Self {
        self.wasm = wasm;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.module_label, "WASM");
        assert!(!config.strict_errors);
        assert_eq!(config.not_ready_message(), "WASM is not initialized yet.");
    }

    #[test]
    fn test_partial_json() {
        let config: WorkerConfig = serde_json::from_str(r#"{ "strict_errors": true }"#).unwrap();
        assert!(config.strict_errors);
        assert_eq!(config.module_label, "WASM");
    }

    #[test]
    fn test_from_missing_file() {
        assert!(matches!(
            WorkerConfig::from_file("/nonexistent/dirry.json"),
            Err(BridgeError::Io(_))
        ));
    }

    #[test]
    fn test_builder() {
        let config = WorkerConfig::default().module_label("Parser").strict_errors(true);
        assert_eq!(config.not_ready_message(), "Parser is not initialized yet.");
        assert!(config.strict_errors);
    }
}
