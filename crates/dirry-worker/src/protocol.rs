//! Message shapes crossing the host/worker boundary.
//!
//! Inbound (host → worker):
//! ```text
//! { "action": "processFile", "data": { "fileName": "...", "byteArray": [..] } }
//! ```
//!
//! Outbound (worker → host):
//! ```text
//! { "action": "error", "message": "..." }
//! { "action": "callbackChunk",
//!   "args": [chunkType, offset, uncompressedSize, filePath, contentText, packageName, prefix] }
//! { "action": "callbackBinary", "args": [..] }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Action name of the only defined request.
pub const ACTION_PROCESS_FILE: &str = "processFile";

/// Raw inbound message as it arrives from the host.
///
/// The action is kept as a string so that unrecognized actions can be
/// detected and dropped instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Requested action
    pub action: String,

    /// Action payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl InboundMessage {
    /// Build a `processFile` message.
    pub fn process_file(file_name: impl Into<String>, byte_array: Vec<u8>) -> Self {
        let payload = ProcessFile {
            file_name: file_name.into(),
            byte_array,
        };
        Self {
            action: ACTION_PROCESS_FILE.to_string(),
            data: serde_json::to_value(payload).ok(),
        }
    }
}

/// Payload of a `processFile` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFile {
    /// Name the computation module sees for the input
    pub file_name: String,

    /// File contents; may be empty
    #[serde(default)]
    pub byte_array: Vec<u8>,
}

/// A recognized request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Hand a file to the computation module
    ProcessFile(ProcessFile),
}

impl Request {
    /// Interpret an inbound message.
    ///
    /// Returns `Ok(None)` for actions outside the known set and an
    /// `InvalidRequest` error when a known action carries a bad payload.
    pub fn from_inbound(msg: InboundMessage) -> Result<Option<Self>> {
        match msg.action.as_str() {
            ACTION_PROCESS_FILE => {
                let data = msg.data.ok_or_else(|| {
                    BridgeError::InvalidRequest("processFile without data".to_string())
                })?;
                let payload: ProcessFile = serde_json::from_value(data)
                    .map_err(|e| BridgeError::InvalidRequest(format!("processFile: {}", e)))?;
                if payload.file_name.is_empty() {
                    return Err(BridgeError::InvalidRequest(
                        "processFile: empty fileName".to_string(),
                    ));
                }
                Ok(Some(Request::ProcessFile(payload)))
            }
            _ => Ok(None),
        }
    }
}

/// Positional chunk callback arguments, serialized as a 7-element array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkArgs(
    pub String,
    pub i64,
    pub i64,
    pub String,
    pub String,
    pub String,
    pub String,
);

impl ChunkArgs {
    /// Chunk type tag (e.g. `CASt`, `+chunkmap`)
    pub fn chunk_type(&self) -> &str {
        &self.0
    }

    /// Cleaned, indented content text
    pub fn content(&self) -> &str {
        &self.4
    }
}

/// One argument of a binary callback.
///
/// Binary arguments are forwarded untouched; the variants only describe how
/// the value is carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinaryArg {
    /// Integer argument
    Int(i64),
    /// Text argument
    Text(String),
    /// Raw byte buffer
    Bytes(Vec<u8>),
}

/// Messages posted from the worker to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Outbound {
    /// Request-level failure (not initialized, or strict-mode rejections)
    Error {
        message: String,
    },

    /// Structured chunk with sanitized content
    CallbackChunk {
        args: ChunkArgs,
    },

    /// Raw binary payload
    CallbackBinary {
        args: Vec<BinaryArg>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_process_file() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "action": "processFile",
            "data": { "fileName": "a.bin", "byteArray": [0x50, 0x4B, 3, 4] }
        }))
        .unwrap();

        let req = Request::from_inbound(msg).unwrap().unwrap();
        let Request::ProcessFile(payload) = req;
        assert_eq!(payload.file_name, "a.bin");
        assert_eq!(payload.byte_array, vec![0x50, 0x4B, 3, 4]);
    }

    #[test]
    fn test_unknown_action_is_none() {
        let msg: InboundMessage =
            serde_json::from_value(json!({ "action": "extractAll", "data": {} })).unwrap();
        assert!(Request::from_inbound(msg).unwrap().is_none());
    }

    #[test]
    fn test_missing_data_is_invalid() {
        let msg: InboundMessage =
            serde_json::from_value(json!({ "action": "processFile" })).unwrap();
        assert!(matches!(
            Request::from_inbound(msg),
            Err(BridgeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_empty_file_name_is_invalid() {
        let msg = InboundMessage::process_file("", vec![1, 2]);
        assert!(matches!(
            Request::from_inbound(msg),
            Err(BridgeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_empty_byte_array_is_accepted() {
        let msg = InboundMessage::process_file("empty.dir", Vec::new());
        let Request::ProcessFile(payload) = Request::from_inbound(msg).unwrap().unwrap();
        assert!(payload.byte_array.is_empty());
    }

    #[test]
    fn test_outbound_shapes() {
        let err = Outbound::Error {
            message: "WASM is not initialized yet.".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({ "action": "error", "message": "WASM is not initialized yet." })
        );

        let chunk = Outbound::CallbackChunk {
            args: ChunkArgs(
                "CASt".to_string(),
                120,
                64,
                "movie.dir".to_string(),
                "{}".to_string(),
                "pkg".to_string(),
                String::new(),
            ),
        };
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({
                "action": "callbackChunk",
                "args": ["CASt", 120, 64, "movie.dir", "{}", "pkg", ""]
            })
        );

        let binary = Outbound::CallbackBinary {
            args: vec![BinaryArg::Text("BITD".to_string()), BinaryArg::Bytes(vec![1, 2])],
        };
        assert_eq!(
            serde_json::to_value(&binary).unwrap(),
            json!({ "action": "callbackBinary", "args": ["BITD", [1, 2]] })
        );
    }
}
