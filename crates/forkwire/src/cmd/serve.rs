use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use forkwire_channel::{Medium, WorkerEndpoint, WorkerMessage};
use forkwire_frame::is_goodbye;
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{channel_error, CliError, CliResult, INTERNAL, INTERRUPTED, SUCCESS};
use crate::output::{print_value, OutputFormat};

const POLL: Duration = Duration::from_millis(100);

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let flush_timeout = parse_duration(&args.flush_timeout)?;
    let endpoint =
        WorkerEndpoint::bind(&args.file).map_err(|err| channel_error("bind failed", &err))?;

    let interrupt = Arc::new(Interrupt::new(endpoint.medium().clone()));
    install_ctrlc_handler(interrupt.clone())?;

    let (tx, rx) = mpsc::channel();
    let channel = endpoint
        .accept(move |value| {
            let _ = tx.send(value);
        })
        .map_err(|err| channel_error("accept failed", &err))?;
    interrupt.accepted.store(true, Ordering::SeqCst);

    let mut received = 0usize;
    while interrupt.running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL) {
            Ok(value) if is_goodbye(&value) => {
                debug!("goodbye received");
                break;
            }
            Ok(value) => {
                if let Ok(WorkerMessage::ProgressUpdate { state, percent }) =
                    WorkerMessage::from_value(&value)
                {
                    info!(%state, percent, "progress update");
                }
                print_value(&value, format);
                received = received.saturating_add(1);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            // The reader stopped without a goodbye.
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    channel.close();
    if !channel.wait_flushed(flush_timeout) {
        warn!(timeout = ?flush_timeout, "goodbye frame not flushed before timeout");
    }
    if let Some(failure) = channel.failure() {
        return Err(channel_error("channel failed", &failure.first));
    }

    debug!(received, "worker done");
    Ok(SUCCESS)
}

/// Ctrl-C state shared with the signal handler.
///
/// While `accept` is still blocked nothing else will clean up the rendezvous
/// files, so the handler removes them and the process exits on the spot.
/// After the launcher connects the serve loop winds down on its own.
struct Interrupt {
    medium: Medium,
    running: AtomicBool,
    accepted: AtomicBool,
}

impl Interrupt {
    fn new(medium: Medium) -> Self {
        Self {
            medium,
            running: AtomicBool::new(true),
            accepted: AtomicBool::new(false),
        }
    }

    /// Returns true when the caller must exit immediately.
    fn trigger(&self) -> bool {
        self.running.store(false, Ordering::SeqCst);
        if self.accepted.load(Ordering::SeqCst) {
            return false;
        }
        self.medium.clear();
        true
    }
}

fn install_ctrlc_handler(interrupt: Arc<Interrupt>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        if interrupt.trigger() {
            warn!("interrupted before the launcher connected");
            std::process::exit(INTERRUPTED);
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
