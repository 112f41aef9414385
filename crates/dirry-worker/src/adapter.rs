//! Callback adapters.
//!
//! The computation module reports results by calling back into the host.
//! Those calls cannot cross the worker boundary, so each callback role is
//! wrapped in an adapter that turns the call into an [`Outbound`] message and
//! posts it immediately.

use std::fmt;

use tokio::sync::mpsc;

use crate::error::{BridgeError, Result};
use crate::protocol::{BinaryArg, ChunkArgs, Outbound};
use crate::sanitize::sanitize_content;

/// Sending half of the worker → host channel.
///
/// Messages are delivered in the order they are posted.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    /// Create an outbox together with the host's receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn post(&self, msg: Outbound) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| BridgeError::Channel("host receiver dropped".to_string()))
    }

    pub fn post_error(&self, message: impl Into<String>) -> Result<()> {
        self.post(Outbound::Error {
            message: message.into(),
        })
    }
}

/// One chunk callback invocation, content still encoded as the module sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEvent {
    pub chunk_type: String,
    pub offset: i64,
    pub uncompressed_size: i64,
    pub file_path: String,
    pub content: String,
    pub package_name: String,
    pub prefix: String,
}

/// Adapter for the chunk callback role.
#[derive(Debug, Clone)]
pub struct ChunkAdapter {
    outbox: Outbox,
    strict_errors: bool,
}

impl ChunkAdapter {
    pub fn new(outbox: Outbox, strict_errors: bool) -> Self {
        Self {
            outbox,
            strict_errors,
        }
    }

    /// Sanitize the content slot and post a `callbackChunk` message.
    ///
    /// Content that does not decode loses this one event; processing goes on.
    /// Only a closed channel is reported as an error.
    pub fn call(&self, event: ChunkEvent) -> Result<()> {
        let content = match sanitize_content(&event.content) {
            Ok(content) => content,
            Err(e) => return self.reject(&event.chunk_type, event.offset, e),
        };

        tracing::debug!(chunk_type = %event.chunk_type, offset = event.offset, "callbackChunk");

        self.outbox.post(Outbound::CallbackChunk {
            args: ChunkArgs(
                event.chunk_type,
                event.offset,
                event.uncompressed_size,
                event.file_path,
                content,
                event.package_name,
                event.prefix,
            ),
        })
    }

    /// Drop a chunk whose content could not be decoded.
    pub fn reject(&self, chunk_type: &str, offset: i64, reason: impl fmt::Display) -> Result<()> {
        tracing::warn!(
            chunk_type = %chunk_type,
            offset = offset,
            "dropping chunk with undecodable content: {}",
            reason
        );
        if self.strict_errors {
            self.outbox
                .post_error(format!("chunk {} at offset {}: {}", chunk_type, offset, reason))?;
        }
        Ok(())
    }
}

/// Adapter for the binary callback role. Arguments pass through untouched.
#[derive(Debug, Clone)]
pub struct BinaryAdapter {
    outbox: Outbox,
}

impl BinaryAdapter {
    pub fn new(outbox: Outbox) -> Self {
        Self { outbox }
    }

    pub fn call(&self, args: Vec<BinaryArg>) -> Result<()> {
        tracing::debug!(argc = args.len(), "callbackBinary");
        self.outbox.post(Outbound::CallbackBinary { args })
    }
}

/// The two adapters bound for one processing call.
#[derive(Debug, Clone)]
pub struct CallbackAdapters {
    chunk: ChunkAdapter,
    binary: BinaryAdapter,
}

impl CallbackAdapters {
    pub fn new(outbox: Outbox, strict_errors: bool) -> Self {
        Self {
            chunk: ChunkAdapter::new(outbox.clone(), strict_errors),
            binary: BinaryAdapter::new(outbox),
        }
    }

    pub fn chunk(&self, event: ChunkEvent) -> Result<()> {
        self.chunk.call(event)
    }

    /// Report a chunk whose content bytes never made it to text.
    pub fn reject_chunk(
        &self,
        chunk_type: &str,
        offset: i64,
        reason: impl fmt::Display,
    ) -> Result<()> {
        self.chunk.reject(chunk_type, offset, reason)
    }

    pub fn binary(&self, args: Vec<BinaryArg>) -> Result<()> {
        self.binary.call(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn event(chunk_type: &str, content: &str) -> ChunkEvent {
        ChunkEvent {
            chunk_type: chunk_type.to_string(),
            offset: 44,
            uncompressed_size: 10,
            file_path: "movie.dir".to_string(),
            content: content.to_string(),
            package_name: "pkg".to_string(),
            prefix: "p".to_string(),
        }
    }

    #[test]
    fn test_chunk_forwards_positionally() {
        let (outbox, mut rx) = Outbox::channel();
        let adapters = CallbackAdapters::new(outbox, false);

        adapters
            .chunk(event("CASt", r#"{"Reader":{},"Chunk":{},"Size":10}"#))
            .unwrap();

        let Outbound::CallbackChunk { args } = rx.try_recv().unwrap() else {
            panic!("expected callbackChunk");
        };
        assert_eq!(args.0, "CASt");
        assert_eq!(args.1, 44);
        assert_eq!(args.2, 10);
        assert_eq!(args.3, "movie.dir");
        assert_eq!(args.5, "pkg");
        assert_eq!(args.6, "p");
        let content: Value = serde_json::from_str(args.content()).unwrap();
        assert_eq!(content, json!({ "Size": 10 }));
    }

    #[test]
    fn test_decode_failure_is_silent_by_default() {
        let (outbox, mut rx) = Outbox::channel();
        let adapters = CallbackAdapters::new(outbox, false);

        adapters.chunk(event("incomplete_STXT", "")).unwrap();
        adapters.chunk(event("KEY*", r#"{"Entries":[]}"#)).unwrap();

        let first = rx.try_recv().unwrap();
        assert!(matches!(
            first,
            Outbound::CallbackChunk { ref args } if args.chunk_type() == "KEY*"
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_decode_failure_strict_posts_error() {
        let (outbox, mut rx) = Outbox::channel();
        let adapters = CallbackAdapters::new(outbox, true);

        adapters.chunk(event("incomplete_BITD", "not json")).unwrap();

        match rx.try_recv().unwrap() {
            Outbound::Error { message } => assert!(message.contains("incomplete_BITD")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reject_chunk_follows_error_policy() {
        let (outbox, mut rx) = Outbox::channel();
        CallbackAdapters::new(outbox, false)
            .reject_chunk("BAD ", 8, "invalid utf-8")
            .unwrap();
        assert!(rx.try_recv().is_err());

        let (outbox, mut rx) = Outbox::channel();
        CallbackAdapters::new(outbox, true)
            .reject_chunk("BAD ", 8, "invalid utf-8")
            .unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Error {
                message: "chunk BAD  at offset 8: invalid utf-8".to_string()
            }
        );
    }

    #[test]
    fn test_binary_is_verbatim() {
        let (outbox, mut rx) = Outbox::channel();
        let adapters = CallbackAdapters::new(outbox, false);
        let args = vec![
            BinaryArg::Text("{\"Reader\":1}".to_string()),
            BinaryArg::Int(-7),
            BinaryArg::Bytes(vec![0, 255, 3]),
        ];

        adapters.binary(args.clone()).unwrap();

        assert_eq!(rx.try_recv().unwrap(), Outbound::CallbackBinary { args });
    }

    #[test]
    fn test_order_preserved() {
        let (outbox, mut rx) = Outbox::channel();
        let adapters = CallbackAdapters::new(outbox, false);

        for i in 0..5 {
            adapters
                .chunk(event(&format!("C{}", i), r#"{"Size":1}"#))
                .unwrap();
        }

        for i in 0..5 {
            match rx.try_recv().unwrap() {
                Outbound::CallbackChunk { args } => assert_eq!(args.0, format!("C{}", i)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_closed_channel_is_error() {
        let (outbox, rx) = Outbox::channel();
        drop(rx);
        let adapters = CallbackAdapters::new(outbox, false);
        assert!(matches!(
            adapters.binary(vec![]),
            Err(BridgeError::Channel(_))
        ));
    }
}
