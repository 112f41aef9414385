//! Configuration for the WASM computation module runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// WASI capability grants for the computation module.
///
/// All capabilities start disabled and must be explicitly enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WasiCapabilities {
    /// Allow access to stdin
    pub stdin: bool,

    /// Allow access to stdout
    pub stdout: bool,

    /// Allow access to stderr
    pub stderr: bool,

    /// Directories to pre-open for filesystem access (read-only)
    pub preopened_dirs_ro: Vec<PathBuf>,

    /// Environment variables to expose
    pub env_vars: Vec<(String, String)>,

    /// Command-line arguments to pass (argv[0] included)
    pub args: Vec<String>,
}

impl WasiCapabilities {
    /// Nothing allowed
    pub fn none() -> Self {
        Self::default()
    }

    /// Module diagnostics go to the worker's stderr.
    ///
    /// Stdout is withheld: in `dirry worker` it carries the message channel.
    pub fn diagnostics() -> Self {
        Self {
            stderr: true,
            ..Default::default()
        }
    }

    /// Builder: enable stdin
    pub fn stdin(mut self, allow: bool) -> Self {
        self.stdin = allow;
        self
    }

    /// Builder: enable stdout
    pub fn stdout(mut self, allow: bool) -> Self {
        self.stdout = allow;
        self
    }

    /// Builder: enable stderr
    pub fn stderr(mut self, allow: bool) -> Self {
        self.stderr = allow;
        self
    }

    /// Builder: add environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Builder: add command-line argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Configuration for the WASM runtime hosting the computation module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WasmConfig {
    /// WASI capability configuration
    pub capabilities: WasiCapabilities,

    /// Maximum linear memory in bytes
    pub max_memory: usize,

    /// Fuel granted to each processFile call (None = unmetered)
    pub fuel_limit: Option<u64>,

    /// Cranelift optimization level (0-2)
    pub optimization_level: u8,

    /// Enable SIMD support
    pub enable_simd: bool,

    /// Wasmtime cache config file for compiled modules
    pub cache_path: Option<PathBuf>,

    /// Export called for each processFile request
    pub entry_point: String,

    /// Import namespace the callback host functions are registered under
    pub import_namespace: String,
}

impl Default for WasmConfig {
    fn default() -> Self {
        Self {
            capabilities: WasiCapabilities::diagnostics(),
            max_memory: 512 * 1024 * 1024, // 512 MB, files are copied in whole
            fuel_limit: None,
            optimization_level: 2,
            enable_simd: true,
            cache_path: None,
            entry_point: "process_file".to_string(),
            import_namespace: "dirry_bridge".to_string(),
        }
    }
}

impl WasmConfig {
    /// Tight limits for untrusted modules
    pub fn minimal() -> Self {
        Self {
            capabilities: WasiCapabilities::none(),
            max_memory: 64 * 1024 * 1024,     // 64 MB
            fuel_limit: Some(10_000_000_000), // 10B fuel units per file
            ..Default::default()
        }
    }

    /// Builder: set capabilities
    pub fn capabilities(mut self, caps: WasiCapabilities) -> Self {
        self.capabilities = caps;
        self
    }

    /// Builder: set max memory
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = bytes;
        self
    }

    /// Builder: set fuel limit
    pub fn fuel_limit(mut self, fuel: u64) -> Self {
        self.fuel_limit = Some(fuel);
        self
    }

    /// Builder: enable SIMD
    pub fn simd(mut self, enable: bool) -> Self {
        self.enable_simd = enable;
        self
    }

    /// Builder: set optimization level
    pub fn optimize(mut self, level: u8) -> Self {
        self.optimization_level = level.min(2);
        self
    }

    /// Builder: set cache path
    pub fn cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Builder: set processing entry point export
    pub fn entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = name.into();
        self
    }

    /// Builder: set host import namespace
    pub fn import_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.import_namespace = namespace.into();
        self
    }
}
