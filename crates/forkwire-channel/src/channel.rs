use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use forkwire_frame::{is_goodbye, FrameConfig, Value};
use forkwire_transport::{IpcStream, LoopbackListener};
use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, FailureRecord, Result};
use crate::locator::{Locator, WorkerStatus};
use crate::medium::Medium;
use crate::sender::{install_ready, start_connecting, ChannelState, Shared};

/// A two-party value channel to a worker process.
///
/// Sending never blocks and never fails; problems surface through
/// [`did_fail`](Self::did_fail), [`failure`](Self::failure) and
/// [`is_closed`](Self::is_closed). Dropping the channel closes it.
pub struct Channel {
    shared: Arc<Shared>,
    worker_id: Option<u32>,
}

impl Channel {
    /// Open a channel over `medium`, launching the configured worker.
    ///
    /// Returns immediately in the `Connecting` state; the rendezvous runs
    /// on a background thread. With `port_override` set the worker is not
    /// launched and the channel connects directly, starting `Ready`.
    ///
    /// `handler` sees every inbound value exactly once, in arrival order,
    /// on a dedicated thread. The final value from a closing peer is `null`.
    pub fn connect<H>(medium: impl AsRef<Path>, handler: H, config: &ChannelConfig) -> Result<Self>
    where
        H: FnMut(Value) + Send + 'static,
    {
        if let Some(port) = config.port_override {
            debug!(port, "using port override; not launching a worker");
            let stream = LoopbackListener::connect(port)?;
            return Self::from_stream_with_config(stream, handler, config.frame.clone());
        }

        let command = config.worker.as_ref().ok_or(ChannelError::NoWorkerCommand)?;
        let medium = Medium::new(medium)?;
        let locator = Locator::launch(medium, command, config)?;
        let worker_id = Some(locator.worker_id());

        let shared = Shared::new(Box::new(handler), config.frame.clone());
        start_connecting(&shared, locator)?;

        Ok(Self { shared, worker_id })
    }

    /// Wrap an already-connected stream. The channel starts `Ready`.
    pub fn from_stream<H>(stream: IpcStream, handler: H) -> Result<Self>
    where
        H: FnMut(Value) + Send + 'static,
    {
        Self::from_stream_with_config(stream, handler, FrameConfig::default())
    }

    pub fn from_stream_with_config<H>(
        stream: IpcStream,
        handler: H,
        frame_config: FrameConfig,
    ) -> Result<Self>
    where
        H: FnMut(Value) + Send + 'static,
    {
        let shared = Shared::new(Box::new(handler), frame_config);
        install_ready(&shared, stream)?;
        Ok(Self {
            shared,
            worker_id: None,
        })
    }

    /// Queue a value for the peer.
    ///
    /// A no-op once the channel is closed or failed. `null` is reserved for
    /// the goodbye frame and is dropped.
    pub fn send(&self, value: Value) {
        if is_goodbye(&value) {
            warn!("dropping null value: null is reserved for the goodbye frame");
            return;
        }
        self.shared.enqueue(value);
    }

    /// Close the channel. Idempotent.
    ///
    /// Values already queued are still written, followed by the goodbye
    /// frame. The writer finishes asynchronously; see
    /// [`wait_flushed`](Self::wait_flushed).
    pub fn close(&self) {
        self.shared.close();
    }

    /// True once the connection attempt has permanently failed.
    pub fn did_fail(&self) -> bool {
        self.state() == ChannelState::Failed
    }

    /// True once closed locally, by the peer's goodbye, or at end of stream.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Failures captured so far, if any.
    pub fn failure(&self) -> Option<FailureRecord> {
        self.shared.failure()
    }

    /// Process id of the launched worker, when this side launched one.
    pub fn worker_id(&self) -> Option<u32> {
        self.worker_id
    }

    /// Liveness of the launched worker; `None` when this side launched none.
    ///
    /// Becomes `Exited` once the worker has terminated and been reaped.
    pub fn worker_status(&self) -> Option<WorkerStatus> {
        self.shared.worker_status()
    }

    /// Name of the live transport once `Ready`.
    pub fn transport(&self) -> Option<&'static str> {
        self.shared.transport()
    }

    /// Block until the writer has stopped or the channel failed.
    ///
    /// After [`close`](Self::close) this means the goodbye frame was
    /// written (or the connection was already gone). Returns `false` on
    /// timeout.
    pub fn wait_flushed(&self, timeout: Duration) -> bool {
        self.shared.wait_writer_done(timeout)
    }

    /// Block until both directions have stopped: the goodbye was written
    /// and the peer's goodbye (or end of stream) was read. Returns `true`
    /// at once for a failed channel.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        self.shared.wait_all_done(timeout)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .field("worker_id", &self.worker_id)
            .finish()
    }
}
