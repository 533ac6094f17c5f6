#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The Event Loop, Helper Router, Job Table consumer, Build Queuer and
//! Worker Session (components C1, C4, C6, C7) — the coordinator half of the
//! distributed build system this workspace models.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod helper;
pub mod queuer;
pub mod session;

#[cfg(test)]
mod proptests;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, WireSink};
pub use error::CoordinatorError;
pub use event::{Envelope, Event, Recipient, Topic};
pub use helper::{HelperRequest, HelperResponse, HelperTransport, HelperTransportError, HttpHelperTransport};
#[cfg(any(test, feature = "test-support"))]
pub use helper::FakeHelperTransport;
#[cfg(any(test, feature = "test-support"))]
pub use coordinator::RecordingWireSink;
pub use queuer::BuildQueuer;
pub use session::{JobView, SessionOutput, SessionState, WorkerSession};
