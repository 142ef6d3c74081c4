//! Talk to a worker from a tokio runtime using the framed value codec.
//!
//! The worker runs on a plain thread in this process; the launcher side
//! reads the published port and drives the connection with `Framed`.
//!
//! Run with:
//!   cargo run --example async-launcher --features async

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use forkwire::channel::{Medium, WorkerMessage};
use forkwire::frame::{is_goodbye, ValueCodec, GOODBYE};
use forkwire::{Value, WorkerEndpoint};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn run_worker(endpoint: WorkerEndpoint) -> Result<usize, BoxError> {
    let (tx, rx) = mpsc::channel();
    let channel = endpoint.accept(move |value| {
        let _ = tx.send(value);
    })?;

    let mut seen = 0;
    for value in rx {
        if is_goodbye(&value) {
            break;
        }
        eprintln!("[worker] received {value}");
        seen += 1;
    }
    channel.close();
    channel.wait_flushed(Duration::from_secs(5));
    Ok(seen)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let dir = std::env::temp_dir().join(format!("forkwire-async-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let medium_path = dir.join("medium");

    let endpoint = WorkerEndpoint::bind(&medium_path)?;
    let worker = thread::spawn(move || run_worker(endpoint));

    let port = Medium::new(&medium_path)?.read_port()?;
    let stream = TcpStream::connect(("127.0.0.1", port)).await?;
    let mut framed = Framed::new(stream, ValueCodec::new());

    let progress = WorkerMessage::progress("warming-up", 10).to_value()?;
    for value in [json!({"job": "resize"}), progress, GOODBYE] {
        framed.send(value).await?;
    }

    while let Some(value) = framed.next().await {
        let value: Value = value?;
        if is_goodbye(&value) {
            eprintln!("[launcher] worker said goodbye");
            break;
        }
        eprintln!("[launcher] reply {value}");
    }

    let seen = worker
        .join()
        .map_err(|_| "worker thread panicked")??;
    eprintln!("[launcher] worker handled {seen} values");

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}
