//! Bootstrap bridge: the guarded start path for the embedded server.
//!
//! State machine:
//!
//! ```text
//! NotStarted --start(valid)--> Starting --ready--> Running
//!                              Starting --error/timeout--> Failed
//! Failed --start(valid)--> Starting            (fresh attempt)
//! NotStarted | Failed --start(empty key)--> Failed
//! Running --start(any)--> Running              (no re-initialization)
//! ```
//!
//! The first caller that finds the handle idle performs the attempt. Callers
//! arriving while it is in flight wait on that attempt and get its outcome,
//! so the subsystem is initialized at most once per attempt and never while
//! another attempt is pending or the server is running.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::error::StartError;
use super::subsystem::ServerSubsystem;
use crate::credentials::CredentialPair;

/// Observable state of the server handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Starting,
    Running,
    Failed,
}

/// One in-flight start attempt, shared with every caller that joins it
#[derive(Debug, Default)]
struct Attempt {
    outcome: Mutex<Option<Result<(), StartError>>>,
    resolved: Condvar,
}

impl Attempt {
    fn resolve(&self, outcome: Result<(), StartError>) {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(outcome);
        self.resolved.notify_all();
    }

    fn wait(&self) -> Result<(), StartError> {
        let slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = self
            .resolved
            .wait_while(slot, |outcome| outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            Some(outcome) => outcome.clone(),
            None => Err(StartError::SubsystemInit(
                "start attempt resolved without an outcome".to_string(),
            )),
        }
    }
}

#[derive(Debug)]
enum Phase {
    NotStarted,
    Starting(Arc<Attempt>),
    Running,
    Failed(StartError),
}

/// Process-wide handle on the embedded server.
pub struct Bridge {
    subsystem: Arc<dyn ServerSubsystem>,
    startup_timeout: Duration,
    phase: Mutex<Phase>,
}

impl Bridge {
    /// Create a bridge around a subsystem.
    ///
    /// `startup_timeout` bounds a whole start attempt: `initialize` plus the
    /// wait for readiness.
    pub fn new(subsystem: impl ServerSubsystem + 'static, startup_timeout: Duration) -> Self {
        Self {
            subsystem: Arc::new(subsystem),
            startup_timeout,
            phase: Mutex::new(Phase::NotStarted),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ServerState {
        match &*self.lock() {
            Phase::NotStarted => ServerState::NotStarted,
            Phase::Starting(_) => ServerState::Starting,
            Phase::Running => ServerState::Running,
            Phase::Failed(_) => ServerState::Failed,
        }
    }

    /// Classification of the most recent failure, while the handle is FAILED.
    pub fn last_error(&self) -> Option<StartError> {
        match &*self.lock() {
            Phase::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Start the embedded server and report whether it is usable.
    pub fn start(&self, credentials: CredentialPair) -> bool {
        self.try_start(credentials).is_ok()
    }

    /// Start the embedded server, keeping the failure classification.
    pub fn try_start(&self, credentials: CredentialPair) -> Result<(), StartError> {
        let attempt = {
            let mut phase = self.lock();
            match &*phase {
                Phase::Running => {
                    debug!("Embedded server already running");
                    return Ok(());
                }
                Phase::Starting(attempt) => {
                    let attempt = attempt.clone();
                    drop(phase);
                    debug!("Start already in progress, waiting for its outcome");
                    return attempt.wait();
                }
                Phase::NotStarted | Phase::Failed(_) => {}
            }

            if let Some(provider) = credentials.first_missing() {
                let err = StartError::InvalidCredentials(provider);
                warn!(kind = err.kind().as_str(), "❌ {}", err);
                *phase = Phase::Failed(err.clone());
                return Err(err);
            }

            let attempt = Arc::new(Attempt::default());
            *phase = Phase::Starting(attempt.clone());
            attempt
        };

        info!("🚀 Starting embedded server...");
        let started = Instant::now();
        let outcome = self.run_attempt(credentials);

        {
            let mut phase = self.lock();
            *phase = match &outcome {
                Ok(()) => Phase::Running,
                Err(err) => Phase::Failed(err.clone()),
            };
        }
        attempt.resolve(outcome.clone());

        match &outcome {
            Ok(()) => info!("✅ Embedded server ready in {:?}", started.elapsed()),
            Err(err) => warn!(kind = err.kind().as_str(), "❌ {}", err),
        }
        outcome
    }

    /// One attempt, bounded end to end by `startup_timeout`.
    ///
    /// `initialize` runs on a helper thread so a hung subsystem cannot hold
    /// the caller (and every joiner) past the deadline. A result that arrives
    /// after the deadline is dropped, which abandons its readiness signal.
    fn run_attempt(&self, credentials: CredentialPair) -> Result<(), StartError> {
        let deadline = Instant::now() + self.startup_timeout;
        let (tx, rx) = mpsc::channel();
        let subsystem = self.subsystem.clone();

        thread::Builder::new()
            .name("solus-init".to_string())
            .spawn(move || {
                let initialized =
                    panic::catch_unwind(AssertUnwindSafe(|| subsystem.initialize(credentials)));
                if tx.send(initialized).is_err() {
                    warn!("Embedded server initialization finished after the startup deadline");
                }
            })
            .map_err(|e| {
                StartError::SubsystemInit(format!("failed to spawn initialization thread: {}", e))
            })?;

        let readiness = match rx.recv_timeout(self.startup_timeout) {
            Ok(Ok(Ok(readiness))) => readiness,
            Ok(Ok(Err(e))) => return Err(StartError::SubsystemInit(format!("{:#}", e))),
            Ok(Err(payload)) => {
                return Err(StartError::SubsystemInit(format!(
                    "initialization panicked: {}",
                    panic_message(payload.as_ref())
                )))
            }
            Err(RecvTimeoutError::Timeout) => {
                return Err(StartError::Timeout(self.startup_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(StartError::SubsystemInit(
                    "initialization thread exited without a result".to_string(),
                ))
            }
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        readiness.wait(remaining).map_err(|err| match err {
            StartError::Timeout(_) => StartError::Timeout(self.startup_timeout),
            other => other,
        })
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state())
            .field("startup_timeout", &self.startup_timeout)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
