//! Launch a worker process and exchange values with it.
//!
//! This is the "just works" layer. A launcher calls [`Channel::connect`]
//! with a medium path; the worker calls [`WorkerEndpoint::bind`] with the
//! path it was given (`--file <medium>`) and accepts one connection. Either
//! side then sends [`Value`]s and receives them through its handler until
//! one side closes.

pub mod channel;
pub mod config;
pub mod error;
pub mod locator;
pub mod medium;
pub mod message;
pub mod sender;
pub mod worker;

pub use channel::Channel;
pub use config::{
    parse_port_override, ChannelConfig, WorkerCommand, DEFAULT_POLL_INTERVAL,
    DEFAULT_PORT_READ_ATTEMPTS, PORT_ENV,
};
pub use error::{ChannelError, FailureRecord, Result};
pub use forkwire_frame::Value;
pub use locator::{wait_for_port, Locator, WorkerStatus};
pub use medium::Medium;
pub use message::{WorkerMessage, TYPE_FIELD};
pub use sender::{ChannelState, Handler};
pub use worker::WorkerEndpoint;
