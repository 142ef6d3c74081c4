//! Standalone progress worker. A launcher starts it with `--file <medium>`.
//!
//! Build it, then let the CLI launch it:
//!   cargo build --example progress-worker
//!   cargo run --features cli -- launch /tmp/forkwire-progress \
//!     --worker target/debug/examples/progress-worker \
//!     --progress indexing:30 --progress indexing:100

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use forkwire::channel::WorkerMessage;
use forkwire::frame::is_goodbye;
use forkwire::WorkerEndpoint;

fn medium_from_args() -> Option<PathBuf> {
    let mut args = std::env::args_os().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--file" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let medium = medium_from_args().ok_or("usage: progress-worker --file <medium>")?;

    let endpoint = WorkerEndpoint::bind(&medium)?;
    eprintln!("[worker] published port {}", endpoint.port());

    let (tx, rx) = mpsc::channel();
    let channel = endpoint.accept(move |value| {
        let _ = tx.send(value);
    })?;

    for value in rx {
        if is_goodbye(&value) {
            break;
        }
        match WorkerMessage::from_value(&value) {
            Ok(WorkerMessage::ProgressUpdate { state, percent }) => {
                eprintln!("[worker] {state}: {percent}%");
            }
            Err(_) => eprintln!("[worker] ignoring {value}"),
        }
    }

    channel.close();
    channel.wait_flushed(Duration::from_secs(5));
    if let Some(failure) = channel.failure() {
        return Err(failure.to_string().into());
    }
    Ok(())
}
