//! Liveness gate around component-supplied callbacks

use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;

/// Shared liveness flag of one component
///
/// Every call into component code (setters, getters, method bodies,
/// behavior hooks) runs while holding an [`Entered`] guard. Shutting down
/// takes the write side, so it returns only after in-flight callbacks have
/// finished; later calls fail to enter.
///
/// Guards are taken recursively, so a callback may call back into its own
/// component. A callback must not remove its own component: shutting down
/// would wait on the guard the callback holds.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    alive: Arc<RwLock<bool>>,
}

/// Proof that the component stays alive while held
pub struct Entered<'a> {
    _guard: RwLockReadGuard<'a, bool>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(RwLock::new(true)),
        }
    }

    /// Enter the component, `None` once it is shutting down
    pub fn enter(&self) -> Option<Entered<'_>> {
        let guard = self.alive.read_recursive();
        if *guard {
            Some(Entered { _guard: guard })
        } else {
            None
        }
    }

    pub fn is_alive(&self) -> bool {
        *self.alive.read_recursive()
    }

    /// Wait for in-flight callbacks, then refuse new ones
    pub(crate) fn shut_down(&self) {
        *self.alive.write() = false;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_enter_after_shutdown_fails() {
        let gate = Lifecycle::new();
        assert!(gate.enter().is_some());
        gate.shut_down();
        assert!(gate.enter().is_none());
        assert!(!gate.is_alive());
    }

    #[test]
    fn test_recursive_enter() {
        let gate = Lifecycle::new();
        let _outer = gate.enter().unwrap();
        assert!(gate.enter().is_some());
    }

    #[test]
    fn test_shutdown_waits_for_inflight_callback() {
        let gate = Lifecycle::new();
        let finished = Arc::new(AtomicBool::new(false));
        let (tx, rx) = std::sync::mpsc::channel();

        let worker = {
            let gate = gate.clone();
            let finished = finished.clone();
            thread::spawn(move || {
                let _entered = gate.enter().unwrap();
                tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
                finished.store(true, Ordering::SeqCst);
            })
        };

        rx.recv().unwrap();
        gate.shut_down();
        assert!(finished.load(Ordering::SeqCst));
        worker.join().unwrap();
    }
}
