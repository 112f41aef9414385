//! WebAssembly runtime for the computation module.
//!
//! The computation module is a precompiled WASM binary. It is compiled and
//! instantiated with wasmtime, linked against WASI preview1 and the bridge
//! host functions, and then driven through [`ComputationModule`].
//!
//! ## Security Model
//!
//! - **Memory isolation**: the module only sees its own linear memory; files
//!   are copied in, callback arguments are copied out
//! - **Deny-by-default WASI**: filesystem, env vars and stdio need explicit grants
//! - **Resource limits**: linear memory cap and optional fuel metering
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dirry_worker::wasm::{WasmRuntime, WasmConfig};
//!
//! let runtime = WasmRuntime::new(WasmConfig::default())?;
//! let module = runtime.load_module("main.wasm")?;
//! let mut instance = runtime.instantiate(&module)?;
//! instance.start()?;
//! instance.process_file("movie.dir", &bytes, &callbacks)?;
//! ```
//!
//! [`ComputationModule`]: crate::module::ComputationModule

mod config;
mod host_functions;
mod runtime;

pub use config::{WasiCapabilities, WasmConfig};
pub use runtime::{WasmHostState, WasmInstance, WasmModule, WasmRuntime};
