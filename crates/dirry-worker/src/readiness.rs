//! Process-wide readiness gate.

use std::sync::OnceLock;

/// One-shot readiness cell.
///
/// Starts not ready; `set` performs the only transition and stores the value
/// requests are served with. There is no way back to not ready.
#[derive(Debug)]
pub struct Readiness<T> {
    cell: OnceLock<T>,
}

impl<T> Readiness<T> {
    /// Create a gate in the not-ready state.
    pub fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Mark ready. A second call is rejected and hands the value back.
    pub fn set(&self, value: T) -> std::result::Result<(), T> {
        self.cell.set(value)
    }

    /// Whether the gate has opened.
    pub fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The stored value, once ready.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }
}

impl<T> Default for Readiness<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_not_ready() {
        let gate: Readiness<u32> = Readiness::new();
        assert!(!gate.is_ready());
        assert!(gate.get().is_none());
    }

    #[test]
    fn test_single_transition() {
        let gate = Readiness::new();
        assert!(gate.set(1).is_ok());
        assert!(gate.is_ready());
        assert_eq!(gate.set(2), Err(2));
        assert_eq!(gate.get(), Some(&1));
    }
}
