use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

/// Errors that can occur while establishing or running a channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] forkwire_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] forkwire_frame::FrameError),

    /// JSON conversion error for typed messages.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Plain I/O error (process status, filesystem).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The medium already has a published port file.
    #[error("medium already in use: {}", path.display())]
    MediumInUse { path: PathBuf },

    /// The worker process could not be started.
    #[error("failed to spawn worker {program:?}: {source}")]
    Spawn {
        program: OsString,
        source: std::io::Error,
    },

    /// The worker exited before it published its port.
    #[error("worker exited before becoming ready ({})", exit_label(.code))]
    WorkerExited { code: Option<i32> },

    /// The port file could not be opened or read.
    #[error("failed to read port file {}: {source}", path.display())]
    PortFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The port file ended before all four bytes were read.
    #[error("port file {} ended after {read} of 4 bytes", path.display())]
    PortTruncated { path: PathBuf, read: usize },

    /// The port file decoded to something that is not a TCP port.
    #[error("port file holds {raw}, which is not a usable TCP port")]
    InvalidPort { raw: u32 },

    /// Neither a worker command nor a port override was configured.
    #[error("no worker command configured and no port override set")]
    NoWorkerCommand,

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A background thread could not be started.
    #[error("failed to start {name} thread: {source}")]
    Thread {
        name: &'static str,
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// The failures a channel has captured.
///
/// The first failure wins; anything reported afterwards is kept as
/// suppressed context rather than dropped.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub first: Arc<ChannelError>,
    pub suppressed: Vec<Arc<ChannelError>>,
}

impl FailureRecord {
    pub(crate) fn new(first: ChannelError) -> Self {
        Self {
            first: Arc::new(first),
            suppressed: Vec::new(),
        }
    }

    pub(crate) fn suppress(&mut self, err: ChannelError) {
        self.suppressed.push(Arc::new(err));
    }

    /// Total number of captured failures.
    pub fn len(&self) -> usize {
        1 + self.suppressed.len()
    }

    /// Always false: a record exists only once something failed.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl std::fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.first)?;
        if !self.suppressed.is_empty() {
            write!(f, " (+{} suppressed)", self.suppressed.len())?;
        }
        Ok(())
    }
}
