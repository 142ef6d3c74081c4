use std::fmt;
use std::io;

use forkwire_channel::ChannelError;
use forkwire_frame::FrameError;
use forkwire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const RUN_FAILED: i32 = 2;
pub const MEDIUM_IN_USE: i32 = 3;
pub const TRANSPORT_ERROR: i32 = 4;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;
pub const INTERRUPTED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: &io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::InvalidData => DATA_INVALID,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: &TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::Corrupted { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: &FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::Codec(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed | FrameError::IncompleteFrame { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
    }
}

pub fn channel_error(context: &str, err: &ChannelError) -> CliError {
    match err {
        ChannelError::Transport(err) => transport_error(context, err),
        ChannelError::Frame(err) => frame_error(context, err),
        ChannelError::Io(source) => io_error(context, source),
        ChannelError::MediumInUse { .. } => {
            CliError::new(MEDIUM_IN_USE, format!("{context}: {err}"))
        }
        ChannelError::Spawn { .. } | ChannelError::WorkerExited { .. } => {
            CliError::new(RUN_FAILED, format!("{context}: {err}"))
        }
        ChannelError::Json(_)
        | ChannelError::PortTruncated { .. }
        | ChannelError::InvalidPort { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        ChannelError::PortFile { source, .. } => io_error(context, source),
        ChannelError::NoWorkerCommand | ChannelError::Config(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        ChannelError::Thread { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_errors_map_to_exit_codes() {
        let in_use = ChannelError::MediumInUse {
            path: "/tmp/m.port".into(),
        };
        assert_eq!(channel_error("bind", &in_use).code, MEDIUM_IN_USE);

        let exited = ChannelError::WorkerExited { code: Some(1) };
        assert_eq!(channel_error("launch", &exited).code, RUN_FAILED);

        let config = ChannelError::Config("bad port".into());
        assert_eq!(channel_error("config", &config).code, USAGE);

        let refused = ChannelError::Transport(TransportError::Connect {
            port: 1,
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        });
        assert_eq!(channel_error("connect", &refused).code, TRANSPORT_ERROR);
    }

    #[test]
    fn frame_errors_map_to_exit_codes() {
        let incomplete = FrameError::IncompleteFrame { buffered: 3 };
        assert_eq!(frame_error("read", &incomplete).code, TRANSPORT_ERROR);

        let too_large = FrameError::PayloadTooLarge { size: 10, max: 1 };
        assert_eq!(frame_error("read", &too_large).code, DATA_INVALID);
    }

    #[test]
    fn message_keeps_context() {
        let err = io_error("read port", &io::Error::from(io::ErrorKind::TimedOut));
        assert_eq!(err.code, TIMEOUT);
        assert!(err.to_string().starts_with("read port: "));
    }
}
