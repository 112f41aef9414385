//! Worker event loop.
//!
//! A worker owns one computation module for its whole lifetime:
//! - the loader runs once in the background and opens the readiness gate on
//!   success; on failure the gate stays closed for good
//! - inbound messages are handed to the [`Dispatcher`] one at a time, in
//!   arrival order, whether or not the module is ready
//! - outbound messages flow back on a single FIFO channel
//!
//! Closing the inbound side ends the loop; in-flight processing calls are
//! allowed to finish before the outbound channel closes.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::adapter::Outbox;
use crate::config::WorkerConfig;
use crate::dispatch::Dispatcher;
use crate::error::{BridgeError, Result};
use crate::module::SharedModule;
use crate::protocol::{InboundMessage, Outbound};
use crate::readiness::Readiness;

/// Entry point for starting workers.
pub struct Worker;

impl Worker {
    /// Start the loader and the event loop. Must be called within a tokio runtime.
    pub fn spawn<F>(config: WorkerConfig, load: F) -> WorkerHandle
    where
        F: Future<Output = Result<SharedModule>> + Send + 'static,
    {
        let readiness: Arc<Readiness<SharedModule>> = Arc::new(Readiness::new());
        let (outbox, outbound) = Outbox::channel();
        let (sender, mut inbound) = mpsc::unbounded_channel::<InboundMessage>();

        let gate = Arc::clone(&readiness);
        let startup = tokio::spawn(async move {
            let module = load.await.inspect_err(|e| {
                tracing::error!("computation module failed to start: {}", e);
            })?;
            if gate.set(module).is_err() {
                return Err(BridgeError::ModuleLoad("module already loaded".to_string()));
            }
            tracing::info!("computation module ready");
            Ok(())
        });

        let mut dispatcher = Dispatcher::new(&config, Arc::clone(&readiness), outbox);
        let event_loop = tokio::spawn(async move {
            while let Some(msg) = inbound.recv().await {
                if let Err(e) = dispatcher.handle(msg) {
                    tracing::warn!("stopping event loop: {}", e);
                    break;
                }
            }
            dispatcher.drain().await;
            tracing::debug!("worker event loop finished");
        });

        WorkerHandle {
            sender: Some(sender),
            outbound,
            readiness,
            startup: Some(startup),
            startup_outcome: None,
            event_loop,
        }
    }
}

/// Host-side handle to a running worker.
pub struct WorkerHandle {
    sender: Option<mpsc::UnboundedSender<InboundMessage>>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    readiness: Arc<Readiness<SharedModule>>,
    startup: Option<JoinHandle<Result<()>>>,
    startup_outcome: Option<std::result::Result<(), String>>,
    event_loop: JoinHandle<()>,
}

impl WorkerHandle {
    /// Post a message to the worker.
    pub fn send(&self, msg: InboundMessage) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| BridgeError::Channel("worker input closed".to_string()))?;
        sender
            .send(msg)
            .map_err(|_| BridgeError::Channel("worker event loop stopped".to_string()))
    }

    /// A cloneable sender for feeding the worker from another task.
    pub fn sender(&self) -> Option<mpsc::UnboundedSender<InboundMessage>> {
        self.sender.clone()
    }

    /// Close this handle's input. The loop ends once every sender is gone.
    pub fn close(&mut self) {
        self.sender = None;
    }

    /// Next outbound message; `None` once the worker has shut down.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Whether the computation module has finished loading.
    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    /// Wait for the loader to finish and report how it went.
    pub async fn startup(&mut self) -> Result<()> {
        if let Some(handle) = self.startup.take() {
            let outcome = match handle.await {
                Ok(res) => res.map_err(|e| e.to_string()),
                Err(e) => Err(format!("loader task failed: {}", e)),
            };
            self.startup_outcome = Some(outcome);
        }
        match &self.startup_outcome {
            Some(Err(message)) => Err(BridgeError::ModuleLoad(message.clone())),
            _ => Ok(()),
        }
    }

    /// Close the input and collect every remaining outbound message.
    pub async fn finish(mut self) -> Vec<Outbound> {
        self.close();
        let mut out = Vec::new();
        while let Some(msg) = self.outbound.recv().await {
            out.push(msg);
        }
        if let Err(e) = self.event_loop.await {
            tracing::error!("worker event loop failed: {}", e);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{CallbackAdapters, ChunkEvent};
    use crate::module::{share, ComputationModule};
    use crate::protocol::ChunkArgs;
    use tokio::sync::oneshot;

    struct ChunkPerFile;

    impl ComputationModule for ChunkPerFile {
        fn process_file(
            &mut self,
            file_name: &str,
            bytes: &[u8],
            callbacks: &CallbackAdapters,
        ) -> Result<()> {
            callbacks.chunk(ChunkEvent {
                chunk_type: "+chunkmap".to_string(),
                offset: 0,
                uncompressed_size: bytes.len() as i64,
                file_path: file_name.to_string(),
                content: r#"{"Chunk":{"self":true},"Entries":2}"#.to_string(),
                package_name: String::new(),
                prefix: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_requests_before_ready_get_error() {
        let (release, gate) = oneshot::channel::<()>();
        let mut worker = Worker::spawn(WorkerConfig::default(), async move {
            let _ = gate.await;
            Ok(share(ChunkPerFile))
        });

        worker
            .send(InboundMessage::process_file("a.bin", vec![0x50, 0x4B]))
            .unwrap();
        assert_eq!(
            worker.recv().await,
            Some(Outbound::Error {
                message: "WASM is not initialized yet.".to_string()
            })
        );
        assert!(!worker.is_ready());

        release.send(()).unwrap();
        worker.startup().await.unwrap();
        assert!(worker.is_ready());

        worker
            .send(InboundMessage::process_file("a.bin", vec![0x50, 0x4B]))
            .unwrap();
        let out = worker.finish().await;
        assert_eq!(out.len(), 1);
        match &out[0] {
            Outbound::CallbackChunk { args } => {
                assert_eq!(args.chunk_type(), "+chunkmap");
                assert_eq!(args.2, 2);
                let content: serde_json::Value = serde_json::from_str(args.content()).unwrap();
                assert_eq!(content, serde_json::json!({ "Entries": 2 }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_startup_failure_keeps_gate_closed() {
        let mut worker = Worker::spawn(WorkerConfig::default().module_label("Parser"), async {
            Err(BridgeError::ModuleLoad("main.wasm: not found".to_string()))
        });

        assert!(matches!(worker.startup().await, Err(BridgeError::ModuleLoad(_))));
        // reported again on a second call
        assert!(worker.startup().await.is_err());

        worker
            .send(InboundMessage::process_file("a.bin", vec![1]))
            .unwrap();
        worker
            .send(InboundMessage::process_file("b.bin", vec![2]))
            .unwrap();

        let out = worker.finish().await;
        let expected = Outbound::Error {
            message: "Parser is not initialized yet.".to_string(),
        };
        assert_eq!(out, vec![expected.clone(), expected]);
    }

    #[tokio::test]
    async fn test_finish_waits_for_in_flight_work() {
        let mut worker = Worker::spawn(WorkerConfig::default(), async { Ok(share(ChunkPerFile)) });
        worker.startup().await.unwrap();

        for name in ["one.dir", "two.dir", "three.dir"] {
            worker
                .send(InboundMessage::process_file(name, vec![0; 4]))
                .unwrap();
        }

        let out = worker.finish().await;
        let mut paths: Vec<String> = out
            .into_iter()
            .map(|msg| match msg {
                Outbound::CallbackChunk {
                    args: ChunkArgs(_, _, _, path, _, _, _),
                } => path,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["one.dir", "three.dir", "two.dir"]);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let mut worker = Worker::spawn(WorkerConfig::default(), async { Ok(share(ChunkPerFile)) });
        worker.close();
        assert!(matches!(
            worker.send(InboundMessage::process_file("a.bin", vec![])),
            Err(BridgeError::Channel(_))
        ));
    }
}
