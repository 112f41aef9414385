//! The computation module seam.

use std::sync::{Arc, Mutex};

use crate::adapter::CallbackAdapters;
use crate::error::Result;

/// A loaded computation module able to process one file at a time.
///
/// Implementations report results only through `callbacks`, zero or more
/// times per call, in the order they are produced.
pub trait ComputationModule: Send {
    fn process_file(
        &mut self,
        file_name: &str,
        bytes: &[u8],
        callbacks: &CallbackAdapters,
    ) -> Result<()>;
}

/// Module handle shared between the readiness gate and processing tasks.
pub type SharedModule = Arc<Mutex<Box<dyn ComputationModule>>>;

/// Wrap a module for sharing.
pub fn share<M: ComputationModule + 'static>(module: M) -> SharedModule {
    let boxed: Box<dyn ComputationModule> = Box::new(module);
    Arc::new(Mutex::new(boxed))
}
