//! # Dirry Worker
//!
//! Message bridge between a host application and a precompiled computation
//! module that parses binary files.
//!
//! The host hands a file to the worker as a `processFile` message. The worker
//! passes the bytes to the module and translates every callback the module
//! makes into an outbound message: structured chunks on one channel (with
//! module-local handles stripped from their content), raw binary payloads on
//! the other.
//!
//! ## Flow
//!
//! ```text
//! startup: ModuleLoader ──load──> Readiness (false → true, once)
//! request: host ──InboundMessage──> Dispatcher ──(ready?)──> ComputationModule
//!                                       │ no                     │ callbacks
//!                                       ▼                        ▼
//!                              error message          ChunkAdapter ─ sanitize ─┐
//!                                                     BinaryAdapter ───────────┤
//!                                                                              ▼
//! host <──────────────────────────── Outbound (FIFO) ──────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dirry_worker::{InboundMessage, ModuleLoader, Worker, WorkerConfig};
//!
//! let config = WorkerConfig::default();
//! let loader = ModuleLoader::from_path("main.wasm", config.wasm.clone());
//! let mut worker = Worker::spawn(config, loader.load());
//!
//! worker.startup().await?;
//! worker.send(InboundMessage::process_file("movie.dir", bytes))?;
//! for msg in worker.finish().await {
//!     println!("{}", serde_json::to_string(&msg)?);
//! }
//! ```
//!
//! ## Features
//!
//! - `wasm` (default) - wasmtime runtime, module loader and bridge host functions

#![warn(rust_2018_idioms)]

pub mod adapter;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod module;
pub mod protocol;
pub mod readiness;
pub mod sanitize;
pub mod worker;

#[cfg(feature = "wasm")]
pub mod loader;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export main types
pub use adapter::{CallbackAdapters, ChunkEvent, Outbox};
pub use config::WorkerConfig;
pub use dispatch::Dispatcher;
pub use error::{BridgeError, Result};
pub use module::{share, ComputationModule, SharedModule};
pub use protocol::{BinaryArg, ChunkArgs, InboundMessage, Outbound, ProcessFile, Request};
pub use readiness::Readiness;
pub use worker::{Worker, WorkerHandle};

#[cfg(feature = "wasm")]
pub use loader::{ModuleLoader, ModuleSource};

#[cfg(feature = "wasm")]
pub use wasm::{WasiCapabilities, WasmConfig, WasmInstance, WasmModule, WasmRuntime};
