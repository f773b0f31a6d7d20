//! One-shot readiness handshake between the bridge and the embedded server.
//!
//! The server side resolves a `ReadySender` exactly once (ready or failed);
//! the bridge side waits on the matching `Readiness` with a bound. Both sides
//! share one mutex, so a timeout and a late "ready" cannot both win: once the
//! bridge gives up the signal is marked abandoned and `ready()` returns
//! `false`, telling the server to release what it bound and exit.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::error::StartError;

#[derive(Debug)]
enum Signal {
    Pending,
    Ready,
    Failed(String),
    Abandoned,
}

#[derive(Debug)]
struct Shared {
    signal: Mutex<Signal>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Signal> {
        self.signal.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Server half: resolve once
#[derive(Debug)]
pub struct ReadySender {
    shared: Arc<Shared>,
}

/// Bridge half: wait once
#[derive(Debug)]
pub struct Readiness {
    shared: Arc<Shared>,
}

/// Create a connected sender/waiter pair.
pub fn channel() -> (ReadySender, Readiness) {
    let shared = Arc::new(Shared {
        signal: Mutex::new(Signal::Pending),
        changed: Condvar::new(),
    });
    (
        ReadySender {
            shared: shared.clone(),
        },
        Readiness { shared },
    )
}

impl ReadySender {
    fn resolve(&self, next: Signal) -> bool {
        let mut signal = self.shared.lock();
        if !matches!(*signal, Signal::Pending) {
            return false;
        }
        *signal = next;
        self.shared.changed.notify_all();
        true
    }

    /// Report that the server is accepting connections.
    ///
    /// Returns `false` if the bridge already stopped waiting; the caller must
    /// then shut down instead of serving.
    pub fn ready(self) -> bool {
        self.resolve(Signal::Ready)
    }

    /// Report a startup failure.
    pub fn fail(self, reason: impl Into<String>) -> bool {
        self.resolve(Signal::Failed(reason.into()))
    }
}

impl Drop for ReadySender {
    fn drop(&mut self) {
        self.resolve(Signal::Failed(
            "embedded server exited without signalling readiness".to_string(),
        ));
    }
}

impl Readiness {
    /// Block until the server resolves the signal or `timeout` elapses.
    pub fn wait(self, timeout: Duration) -> Result<(), StartError> {
        let guard = self.shared.lock();
        let (mut signal, _) = self
            .shared
            .changed
            .wait_timeout_while(guard, timeout, |s| matches!(s, Signal::Pending))
            .unwrap_or_else(PoisonError::into_inner);

        match &*signal {
            Signal::Ready => Ok(()),
            Signal::Failed(reason) => Err(StartError::SubsystemInit(reason.clone())),
            Signal::Pending | Signal::Abandoned => {
                *signal = Signal::Abandoned;
                Err(StartError::Timeout(timeout))
            }
        }
    }
}

impl Drop for Readiness {
    fn drop(&mut self) {
        let mut signal = self.shared.lock();
        if matches!(*signal, Signal::Pending) {
            *signal = Signal::Abandoned;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_ready_before_wait() {
        let (tx, rx) = channel();
        assert!(tx.ready());
        assert_eq!(rx.wait(Duration::from_millis(10)), Ok(()));
    }

    #[test]
    fn test_ready_from_other_thread() {
        let (tx, rx) = channel();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.ready()
        });
        assert_eq!(rx.wait(Duration::from_secs(5)), Ok(()));
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_fail_carries_reason() {
        let (tx, rx) = channel();
        assert!(tx.fail("Address already in use"));
        assert_eq!(
            rx.wait(Duration::from_millis(10)),
            Err(StartError::SubsystemInit("Address already in use".into()))
        );
    }

    #[test]
    fn test_dropped_sender_is_failure() {
        let (tx, rx) = channel();
        drop(tx);
        let err = rx.wait(Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, StartError::SubsystemInit(_)));
    }

    #[test]
    fn test_timeout_abandons_signal() {
        let (tx, rx) = channel();
        let err = rx.wait(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err, StartError::Timeout(Duration::from_millis(20)));
        // Late readiness is refused
        assert!(!tx.ready());
    }

    #[test]
    fn test_dropped_waiter_abandons_signal() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(!tx.ready());
    }
}
