use std::net::SocketAddr;
use std::path::PathBuf;

/// Errors that can occur in forkwire transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the loopback listener.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to connect to a loopback port.
    #[error("failed to connect to loopback port {port}: {source}")]
    Connect { port: u16, source: std::io::Error },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to open or map a ring file.
    #[error("failed to map ring file {path}: {source}")]
    Map {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The ring file does not have the expected size.
    #[error("ring file {path} has size {len} (expected {expected})")]
    RingSize {
        path: PathBuf,
        len: u64,
        expected: u64,
    },

    /// A ring index kept failing its checksum after every retry.
    #[error("ring index at offset {offset} is corrupt: {bytes:02x?}")]
    Corrupted { offset: usize, bytes: [u8; 4] },
}

impl From<TransportError> for std::io::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(io) | TransportError::Accept(io) => io,
            TransportError::Corrupted { .. } => {
                std::io::Error::new(std::io::ErrorKind::InvalidData, err)
            }
            other => std::io::Error::other(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
