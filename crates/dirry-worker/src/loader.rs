//! Computation module loading.
//!
//! Runs once per worker: fetch the module image, compile and instantiate it
//! against the bridge imports, run its entry point. Failures are returned to
//! the caller and never retried.

use std::path::PathBuf;

use crate::error::{BridgeError, Result};
use crate::module::{share, SharedModule};
use crate::wasm::{WasmConfig, WasmRuntime};

/// Where the module image comes from.
#[derive(Debug, Clone)]
pub enum ModuleSource {
    /// A `.wasm` (or `.wat`) file on disk
    Path(PathBuf),
    /// An image already in memory
    Bytes { name: String, bytes: Vec<u8> },
}

impl ModuleSource {
    fn name(&self) -> String {
        match self {
            ModuleSource::Path(path) => path.display().to_string(),
            ModuleSource::Bytes { name, .. } => name.clone(),
        }
    }
}

/// Loads a computation module into a fresh WASM instance.
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    source: ModuleSource,
    config: WasmConfig,
}

impl ModuleLoader {
    pub fn new(source: ModuleSource, config: WasmConfig) -> Self {
        Self { source, config }
    }

    /// Loader for a module file.
    pub fn from_path(path: impl Into<PathBuf>, config: WasmConfig) -> Self {
        Self::new(ModuleSource::Path(path.into()), config)
    }

    /// Fetch, instantiate and start the module.
    pub async fn load(self) -> Result<SharedModule> {
        let name = self.source.name();
        let bytes = match self.source {
            ModuleSource::Path(path) => tokio::fs::read(&path).await.map_err(|e| {
                BridgeError::ModuleLoad(format!("{}: {}", path.display(), e))
            })?,
            ModuleSource::Bytes { bytes, .. } => bytes,
        };
        tracing::info!(module = %name, bytes = bytes.len(), "fetched computation module");

        let config = self.config;
        let instance = tokio::task::spawn_blocking(move || {
            let runtime = WasmRuntime::new(config)?;
            let module = runtime.load_module_bytes(&name, &bytes)?;
            let mut instance = runtime.instantiate(&module)?;
            instance.start()?;
            Ok::<_, BridgeError>(instance)
        })
        .await
        .map_err(|e| BridgeError::ModuleLoad(format!("loader task failed: {}", e)))??;

        Ok(share(instance))
    }
}
