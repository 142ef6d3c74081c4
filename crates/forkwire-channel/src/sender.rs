//! Connection lifecycle: Connecting, Ready, Failed.
//!
//! A channel starts in `Connecting` (or goes straight to `Ready` when it is
//! handed a live stream). `Ready` owns three threads: a writer draining the
//! outbound queue, a reader decoding inbound frames, and a handler thread
//! that runs the application callback in arrival order. Both `Ready` and
//! `Failed` are terminal.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use forkwire_frame::{
    is_goodbye, split_stream, FrameConfig, FrameError, FrameReader, FrameWriter, Value, GOODBYE,
};
use forkwire_transport::IpcStream;
use tracing::{debug, error, warn};

use crate::error::{ChannelError, FailureRecord, Result};
use crate::locator::{Locator, WorkerStatus};

/// Application callback for inbound values.
pub type Handler = Box<dyn FnMut(Value) + Send + 'static>;

/// Observable lifecycle state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Ready,
    Failed,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub(crate) enum Sender {
    Connecting,
    Ready(ReadySender),
    Failed,
}

impl Sender {
    fn state(&self) -> ChannelState {
        match self {
            Self::Connecting => ChannelState::Connecting,
            Self::Ready(_) => ChannelState::Ready,
            Self::Failed => ChannelState::Failed,
        }
    }
}

/// A live connection with its writer, reader and handler threads running.
pub(crate) struct ReadySender {
    transport: &'static str,
}

impl ReadySender {
    fn start(shared: &Arc<Shared>, stream: IpcStream) -> Result<Self> {
        let transport = stream.transport_name();
        let (reader, writer) = split_stream(stream, shared.frame_config.clone())?;

        // Values queued while connecting are already waiting in this receiver.
        let outbound = lock(&shared.outbound_rx)
            .take()
            .unwrap_or_else(|| mpsc::channel().1);
        let handler = lock(&shared.handler)
            .take()
            .unwrap_or_else(|| Box::new(|_: Value| {}));

        let (dispatch_tx, dispatch_rx) = mpsc::channel();
        spawn("forkwire-handler", move || run_handler(handler, dispatch_rx))?;

        let writer_shared = Arc::clone(shared);
        spawn("forkwire-writer", move || {
            run_writer(writer_shared, outbound, writer)
        })?;

        let reader_shared = Arc::clone(shared);
        spawn("forkwire-reader", move || {
            run_reader(reader_shared, reader, dispatch_tx)
        })?;

        debug!(transport, "connection ready");
        Ok(Self { transport })
    }
}

/// State shared between a channel and its background threads.
pub(crate) struct Shared {
    outbound_tx: Mutex<Option<mpsc::Sender<Value>>>,
    outbound_rx: Mutex<Option<Receiver<Value>>>,
    handler: Mutex<Option<Handler>>,
    sender: Mutex<Sender>,
    closed: AtomicBool,
    failure: Mutex<Option<FailureRecord>>,
    worker: Mutex<Option<WorkerStatus>>,
    finished: Mutex<Finished>,
    finished_cv: Condvar,
    frame_config: FrameConfig,
}

#[derive(Debug, Default, Clone, Copy)]
struct Finished {
    writer: bool,
    reader: bool,
}

impl Shared {
    pub(crate) fn new(handler: Handler, frame_config: FrameConfig) -> Arc<Self> {
        let (tx, rx) = mpsc::channel();
        Arc::new(Self {
            outbound_tx: Mutex::new(Some(tx)),
            outbound_rx: Mutex::new(Some(rx)),
            handler: Mutex::new(Some(handler)),
            sender: Mutex::new(Sender::Connecting),
            closed: AtomicBool::new(false),
            failure: Mutex::new(None),
            worker: Mutex::new(None),
            finished: Mutex::new(Finished::default()),
            finished_cv: Condvar::new(),
            frame_config,
        })
    }

    /// Enqueue a value, or drop it if the queue has been released.
    pub(crate) fn enqueue(&self, value: Value) {
        match lock(&self.outbound_tx).as_ref() {
            Some(tx) => {
                if tx.send(value).is_err() {
                    debug!("writer has stopped; dropping outbound value");
                }
            }
            None => debug!("channel closed or failed; dropping outbound value"),
        }
    }

    /// Mark closed and release the outbound queue so the writer says goodbye.
    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("channel closed");
        }
        lock(&self.outbound_tx).take();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn state(&self) -> ChannelState {
        lock(&self.sender).state()
    }

    pub(crate) fn transport(&self) -> Option<&'static str> {
        match &*lock(&self.sender) {
            Sender::Ready(ready) => Some(ready.transport),
            _ => None,
        }
    }

    pub(crate) fn failure(&self) -> Option<FailureRecord> {
        lock(&self.failure).clone()
    }

    pub(crate) fn worker_status(&self) -> Option<WorkerStatus> {
        *lock(&self.worker)
    }

    /// Move to `Failed`: record why, drop the queue and the handler.
    pub(crate) fn fail(&self, err: ChannelError) {
        warn!(error = %err, "channel failed");
        self.push_failure(err);
        *lock(&self.sender) = Sender::Failed;
        lock(&self.outbound_tx).take();
        lock(&self.outbound_rx).take();
        lock(&self.handler).take();
        self.mark_finished(|done| {
            done.writer = true;
            done.reader = true;
        });
    }

    /// Record a connection error unless the channel was already closed.
    fn record_io_failure(&self, err: ChannelError) {
        if self.is_closed() {
            debug!(error = %err, "ignoring I/O error after close");
            return;
        }
        warn!(error = %err, "connection error");
        self.push_failure(err);
    }

    fn push_failure(&self, err: ChannelError) {
        let mut failure = lock(&self.failure);
        match failure.as_mut() {
            Some(record) => record.suppress(err),
            None => *failure = Some(FailureRecord::new(err)),
        }
    }

    fn mark_finished(&self, update: impl FnOnce(&mut Finished)) {
        let mut done = lock(&self.finished);
        update(&mut *done);
        drop(done);
        self.finished_cv.notify_all();
    }

    /// Block until the writer has stopped or the channel failed.
    pub(crate) fn wait_writer_done(&self, timeout: Duration) -> bool {
        self.wait_finished_where(timeout, |done| done.writer)
    }

    /// Block until both the writer and the reader have stopped, or the
    /// channel failed.
    pub(crate) fn wait_all_done(&self, timeout: Duration) -> bool {
        self.wait_finished_where(timeout, |done| done.writer && done.reader)
    }

    fn wait_finished_where(&self, timeout: Duration, ready: impl Fn(&Finished) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = lock(&self.finished);
        while !ready(&*done) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            done = self
                .finished_cv
                .wait_timeout(done, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/// Install a `Ready` sender over `stream`.
pub(crate) fn install_ready(shared: &Arc<Shared>, stream: IpcStream) -> Result<()> {
    let mut sender = lock(&shared.sender);
    let ready = ReadySender::start(shared, stream)?;
    *sender = Sender::Ready(ready);
    Ok(())
}

/// Start the `Connecting` poller: wait for the worker, then go `Ready`.
///
/// The same thread then owns the worker process and reaps it when it exits.
pub(crate) fn start_connecting(shared: &Arc<Shared>, mut locator: Locator) -> Result<()> {
    *lock(&shared.worker) = Some(WorkerStatus::Running);
    let shared = Arc::clone(shared);
    spawn("forkwire-launcher", move || {
        let result = locator
            .connect()
            .and_then(|stream| install_ready(&shared, stream));
        if let Err(err) = result {
            shared.fail(err);
        }

        match locator.wait() {
            Ok(status) => *lock(&shared.worker) = Some(status),
            Err(err) => warn!(error = %err, "failed to reap worker"),
        }
    })
}

fn run_writer(shared: Arc<Shared>, outbound: Receiver<Value>, mut writer: FrameWriter<IpcStream>) {
    match write_until_released(&outbound, &mut writer) {
        Ok(()) => debug!("writer sent goodbye"),
        Err(err) => shared.record_io_failure(err),
    }
    shared.mark_finished(|done| done.writer = true);
}

fn write_until_released(
    outbound: &Receiver<Value>,
    writer: &mut FrameWriter<IpcStream>,
) -> Result<()> {
    // Ends once every queue handle is gone, after draining what was queued.
    for value in outbound.iter() {
        writer.send_value(&value)?;
    }
    writer.send_value(&GOODBYE)?;
    writer.get_ref().shutdown_write()?;
    Ok(())
}

fn run_reader(shared: Arc<Shared>, reader: FrameReader<IpcStream>, dispatch: mpsc::Sender<Value>) {
    read_until_closed(&shared, reader, dispatch);
    shared.mark_finished(|done| done.reader = true);
}

fn read_until_closed(
    shared: &Shared,
    mut reader: FrameReader<IpcStream>,
    dispatch: mpsc::Sender<Value>,
) {
    loop {
        match reader.read_value() {
            Ok(value) => {
                let goodbye = is_goodbye(&value);
                if dispatch.send(value).is_err() {
                    debug!("handler thread has stopped");
                }
                if goodbye {
                    debug!("peer said goodbye");
                    shared.close();
                    return;
                }
            }
            Err(FrameError::ConnectionClosed) => {
                debug!("peer ended the stream");
                shared.close();
                return;
            }
            Err(err) => {
                shared.record_io_failure(err.into());
                return;
            }
        }
    }
}

fn run_handler(mut handler: Handler, inbound: Receiver<Value>) {
    for value in inbound.iter() {
        if panic::catch_unwind(AssertUnwindSafe(|| handler(value))).is_err() {
            error!("message handler panicked; continuing with the next message");
        }
    }
}

fn spawn<F>(name: &'static str, body: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map(drop)
        .map_err(|source| ChannelError::Thread { name, source })
}

/// Lock, recovering the guard from a poisoned mutex. Every protected value
/// stays consistent across a panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
