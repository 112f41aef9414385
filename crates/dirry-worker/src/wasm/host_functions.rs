//! Bridge host functions imported by the computation module.
//!
//! These are the native ends of the callback adapters: the module calls them
//! with pointers into its own linear memory, the host copies the arguments
//! out and hands them to the adapters bound for the current processing call.
//!
//! ## Import Module
//!
//! Host functions are imported under the configured namespace
//! (`dirry_bridge` by default):
//! ```wat
//! (import "dirry_bridge" "callback_chunk"
//!   (func (param i32 i32 i64 i64 i32 i32 i32 i32 i32 i32 i32 i32)))
//! (import "dirry_bridge" "callback_binary" (func (param i32 i32)))
//! (import "dirry_bridge" "log_message" (func (param i32 i32 i32)))
//! ```
//!
//! ## Binary Argument Framing
//!
//! `callback_binary` receives one memory range holding the argument list:
//! ```text
//! [tag: u8][len: u32 LE][payload: len bytes] ...
//! ```
//! tag 0 = bytes, 1 = UTF-8 text, 2 = i64 LE (len 8).

use wasmtime::{Caller, Linker, Memory};

use super::runtime::WasmHostState;
use crate::adapter::ChunkEvent;
use crate::error::{BridgeError, Result};
use crate::protocol::BinaryArg;

const TAG_BYTES: u8 = 0;
const TAG_TEXT: u8 = 1;
const TAG_INT: u8 = 2;

/// Bridge host functions exposed to the computation module.
pub struct BridgeHostFunctions;

impl BridgeHostFunctions {
    /// Register all bridge host functions with the wasmtime linker.
    pub fn register(linker: &mut Linker<WasmHostState>, namespace: &str) -> Result<()> {
        Self::register_callback_chunk(linker, namespace)?;
        Self::register_callback_binary(linker, namespace)?;
        Self::register_log_message(linker, namespace)?;
        Ok(())
    }

    fn register_callback_chunk(linker: &mut Linker<WasmHostState>, namespace: &str) -> Result<()> {
        linker
            .func_wrap(
                namespace,
                "callback_chunk",
                |mut caller: Caller<'_, WasmHostState>,
                 type_ptr: i32,
                 type_len: i32,
                 offset: i64,
                 uncompressed_size: i64,
                 path_ptr: i32,
                 path_len: i32,
                 content_ptr: i32,
                 content_len: i32,
                 pkg_ptr: i32,
                 pkg_len: i32,
                 prefix_ptr: i32,
                 prefix_len: i32|
                 -> wasmtime::Result<()> {
                    let memory = get_memory(&mut caller)?;
                    let (data, state) = memory.data_and_store_mut(&mut caller);
                    let callbacks = state.callbacks()?;

                    let chunk_type = read_str_lossy(data, type_ptr, type_len)?;
                    let content = match std::str::from_utf8(
                        read_bytes(data, content_ptr, content_len)?,
                    ) {
                        Ok(content) => content.to_owned(),
                        Err(e) => {
                            callbacks.reject_chunk(&chunk_type, offset, e)?;
                            return Ok(());
                        }
                    };

                    let event = ChunkEvent {
                        chunk_type,
                        offset,
                        uncompressed_size,
                        file_path: read_str_lossy(data, path_ptr, path_len)?,
                        content,
                        package_name: read_str_lossy(data, pkg_ptr, pkg_len)?,
                        prefix: read_str_lossy(data, prefix_ptr, prefix_len)?,
                    };

                    callbacks.chunk(event)?;
                    Ok(())
                },
            )
            .map_err(|e| {
                BridgeError::WasmError(format!("failed to register callback_chunk: {}", e))
            })?;
        Ok(())
    }

    fn register_callback_binary(linker: &mut Linker<WasmHostState>, namespace: &str) -> Result<()> {
        linker
            .func_wrap(
                namespace,
                "callback_binary",
                |mut caller: Caller<'_, WasmHostState>,
                 args_ptr: i32,
                 args_len: i32|
                 -> wasmtime::Result<()> {
                    let memory = get_memory(&mut caller)?;
                    let (data, state) = memory.data_and_store_mut(&mut caller);

                    let args = decode_binary_args(read_bytes(data, args_ptr, args_len)?)?;

                    state.callbacks()?.binary(args)?;
                    Ok(())
                },
            )
            .map_err(|e| {
                BridgeError::WasmError(format!("failed to register callback_binary: {}", e))
            })?;
        Ok(())
    }

    fn register_log_message(linker: &mut Linker<WasmHostState>, namespace: &str) -> Result<()> {
        linker
            .func_wrap(
                namespace,
                "log_message",
                |mut caller: Caller<'_, WasmHostState>,
                 level: i32,
                 msg_ptr: i32,
                 msg_len: i32|
                 -> wasmtime::Result<()> {
                    let memory = get_memory(&mut caller)?;
                    let msg = read_str_lossy(memory.data(&caller), msg_ptr, msg_len)?;

                    // Levels follow the module's own scale: 0 debug .. 3 error
                    match level {
                        i32::MIN..=0 => tracing::debug!(target: "dirry::module", "{}", msg),
                        1 => tracing::info!(target: "dirry::module", "{}", msg),
                        2 => tracing::warn!(target: "dirry::module", "{}", msg),
                        _ => tracing::error!(target: "dirry::module", "{}", msg),
                    }
                    Ok(())
                },
            )
            .map_err(|e| {
                BridgeError::WasmError(format!("failed to register log_message: {}", e))
            })?;
        Ok(())
    }
}

// ============================================================================
// Memory Access Helpers
// ============================================================================

/// Get the memory export from the caller.
fn get_memory(caller: &mut Caller<'_, WasmHostState>) -> Result<Memory> {
    caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .ok_or_else(|| BridgeError::WasmError("no memory export found".to_string()))
}

/// Borrow a `(ptr, len)` range of linear memory.
///
/// Pointers and lengths are wasm32 values and read as unsigned.
pub(crate) fn read_bytes(data: &[u8], ptr: i32, len: i32) -> Result<&[u8]> {
    let start = ptr as u32 as usize;
    let end = start
        .checked_add(len as u32 as usize)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| BridgeError::WasmError("memory read out of bounds".to_string()))?;
    Ok(&data[start..end])
}

/// Copy a string out of linear memory, replacing invalid UTF-8 with U+FFFD.
pub(crate) fn read_str_lossy(data: &[u8], ptr: i32, len: i32) -> Result<String> {
    let bytes = read_bytes(data, ptr, len)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Split a framed binary argument list.
pub(crate) fn decode_binary_args(mut buf: &[u8]) -> Result<Vec<BinaryArg>> {
    let mut args = Vec::new();

    while !buf.is_empty() {
        if buf.len() < 5 {
            return Err(BridgeError::WasmError("truncated binary argument header".to_string()));
        }
        let tag = buf[0];
        let len = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        let rest = &buf[5..];
        if rest.len() < len {
            return Err(BridgeError::WasmError("truncated binary argument payload".to_string()));
        }
        let (payload, tail) = rest.split_at(len);

        let arg = match tag {
            TAG_BYTES => BinaryArg::Bytes(payload.to_vec()),
            TAG_TEXT => BinaryArg::Text(
                std::str::from_utf8(payload)
                    .map_err(|e| BridgeError::WasmError(format!("invalid UTF-8 argument: {}", e)))?
                    .to_owned(),
            ),
            TAG_INT => {
                let raw: [u8; 8] = payload.try_into().map_err(|_| {
                    BridgeError::WasmError(format!("integer argument of {} bytes", len))
                })?;
                BinaryArg::Int(i64::from_le_bytes(raw))
            }
            other => {
                return Err(BridgeError::WasmError(format!(
                    "unknown binary argument tag {}",
                    other
                )))
            }
        };

        args.push(arg);
        buf = tail;
    }

    Ok(args)
}
