//! Startup of the embedded server.
//!
//! - `Bridge` guards the start path (validation, single in-flight attempt,
//!   bounded readiness wait) and owns the process-wide server state.
//! - `ServerSubsystem` is the narrow interface to whatever actually serves
//!   requests; `readiness` is the one-shot handshake it reports through.
//!
//! Every failure inside `Bridge::start` is classified as a `StartError` and
//! projected to `false`; nothing here aborts the process.

mod bridge;
mod error;
pub mod readiness;
mod subsystem;

pub use bridge::{Bridge, ServerState};
pub use error::{BootstrapError, FailureKind, StartError};
pub use readiness::{ReadySender, Readiness};
pub use subsystem::ServerSubsystem;
