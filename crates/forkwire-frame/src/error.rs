/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The payload could not be encoded to or decoded from a value.
    #[error("value codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The stream ended cleanly on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended part-way through a frame.
    #[error("connection closed mid-frame ({buffered} bytes buffered)")]
    IncompleteFrame { buffered: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
