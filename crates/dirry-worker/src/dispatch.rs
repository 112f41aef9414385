//! Request dispatch.
//!
//! Every inbound message is checked against the readiness gate first. Until the
//! computation module has loaded, each request is answered with a single
//! not-initialized error and dropped. Once ready, `processFile` requests are
//! handed to the module on a blocking task and `handle` returns at once; all
//! results reach the host through the callback adapters.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::adapter::{CallbackAdapters, Outbox};
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::module::SharedModule;
use crate::protocol::{InboundMessage, ProcessFile, Request};
use crate::readiness::Readiness;

/// Routes inbound messages to the computation module.
pub struct Dispatcher {
    readiness: Arc<Readiness<SharedModule>>,
    outbox: Outbox,
    not_ready_message: String,
    strict_errors: bool,
    in_flight: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(
        config: &WorkerConfig,
        readiness: Arc<Readiness<SharedModule>>,
        outbox: Outbox,
    ) -> Self {
        Self {
            readiness,
            outbox,
            not_ready_message: config.not_ready_message(),
            strict_errors: config.strict_errors,
            in_flight: JoinSet::new(),
        }
    }

    /// Handle one inbound message.
    ///
    /// Must be called from within a tokio runtime. Fails only when the host
    /// receiver is gone.
    pub fn handle(&mut self, msg: InboundMessage) -> Result<()> {
        while self.in_flight.try_join_next().is_some() {}

        let Some(module) = self.readiness.get() else {
            tracing::debug!(action = %msg.action, "request before module ready");
            return self.outbox.post_error(self.not_ready_message.clone());
        };
        let module = Arc::clone(module);

        let action = msg.action.clone();
        let request = match Request::from_inbound(msg) {
            Ok(Some(request)) => request,
            Ok(None) => {
                tracing::warn!(action = %action, "ignoring unrecognized action");
                if self.strict_errors {
                    self.outbox
                        .post_error(format!("unrecognized action: {}", action))?;
                }
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(action = %action, "rejecting request: {}", e);
                if self.strict_errors {
                    self.outbox.post_error(e.to_string())?;
                }
                return Ok(());
            }
        };

        match request {
            Request::ProcessFile(payload) => self.spawn_process(module, payload),
        }
        Ok(())
    }

    fn spawn_process(&mut self, module: SharedModule, payload: ProcessFile) {
        let callbacks = CallbackAdapters::new(self.outbox.clone(), self.strict_errors);

        tracing::info!(
            file = %payload.file_name,
            bytes = payload.byte_array.len(),
            "processFile"
        );

        self.in_flight.spawn_blocking(move || {
            let mut module = match module.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let result = module.process_file(&payload.file_name, &payload.byte_array, &callbacks);
            if let Err(e) = result {
                tracing::error!(file = %payload.file_name, "processing failed: {}", e);
            }
        });
    }

    /// Number of processing calls not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait for every in-flight processing call to finish.
    pub async fn drain(&mut self) {
        while let Some(res) = self.in_flight.join_next().await {
            if let Err(e) = res {
                tracing::error!("processing task failed: {}", e);
            }
        }
    }
}
