//! Launch a helper process and exchange typed values with it.
//!
//! forkwire forks a worker, hands it a rendezvous path, and gives both
//! sides an ordered, non-blocking value channel that either side can close
//! with a goodbye frame.
//!
//! # Crate Structure
//!
//! - [`transport`]: Local byte streams (TCP loopback, mmap ring)
//! - [`frame`]: Length-prefixed value framing
//! - [`channel`]: Rendezvous, connection lifecycle and the `Channel` API (behind `channel` feature)

/// Re-export transport types.
pub mod transport {
    pub use forkwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use forkwire_frame::*;
}

/// Re-export channel types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod channel {
    pub use forkwire_channel::*;
}

#[cfg(feature = "channel")]
pub use forkwire_channel::{Channel, ChannelConfig, WorkerEndpoint};
pub use forkwire_frame::Value;
