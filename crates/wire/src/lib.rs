#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Message Framer (C3): the typed worker wire protocol and the
//! length-prefixed JSON codec that carries it over any byte stream.

pub mod error;
pub mod framer;
pub mod message;

pub use error::ProtocolError;
pub use framer::{Framer, FramerEvent};
pub use message::{CoordinatorMessage, WorkerMessage};
