//! Local byte-stream transports for forkwire.
//!
//! Provides a unified stream over the two ways a launcher and its worker
//! process can talk:
//! - TCP on the loopback interface (every platform)
//! - A memory-mapped ring file (Unix)
//!
//! This is the lowest layer of forkwire. Everything else builds on top of
//! the [`IpcStream`] type provided here.

pub mod error;
#[cfg(unix)]
pub mod ring;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
#[cfg(unix)]
pub use ring::{RingSide, RingStream};
pub use tcp::LoopbackListener;
pub use traits::IpcStream;
