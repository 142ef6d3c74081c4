use std::env::VarError;
use std::ffi::{OsStr, OsString};
use std::time::Duration;

use forkwire_frame::FrameConfig;

use crate::error::{ChannelError, Result};

/// Environment variable carrying a pre-known worker port.
///
/// When set, [`Channel::connect`](crate::Channel::connect) skips the launch
/// and rendezvous and connects straight to this loopback port.
pub const PORT_ENV: &str = "FORKWIRE_PORT";

/// Default interval between readiness checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default number of extra polls allowed for a half-written port file.
pub const DEFAULT_PORT_READ_ATTEMPTS: u32 = 100;

/// The program a launcher runs as its worker.
///
/// `--file <medium>` is appended after `args` at launch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }
}

/// Channel behavior configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Worker to launch. Required unless `port_override` is set.
    pub worker: Option<WorkerCommand>,
    /// Connect directly to this loopback port instead of launching.
    pub port_override: Option<u16>,
    /// Sleep between readiness checks while the worker starts.
    pub poll_interval: Duration,
    /// Extra polls tolerated when `.ready` exists but `.port` is short.
    pub port_read_attempts: u32,
    /// Frame limits for the established connection.
    pub frame: FrameConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            worker: None,
            port_override: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            port_read_attempts: DEFAULT_PORT_READ_ATTEMPTS,
            frame: FrameConfig::default(),
        }
    }
}

impl ChannelConfig {
    /// Defaults plus the port override from [`PORT_ENV`], if set.
    pub fn from_env() -> Result<Self> {
        let port_override = match std::env::var(PORT_ENV) {
            Ok(raw) => Some(parse_port_override(&raw)?),
            Err(VarError::NotPresent) => None,
            Err(VarError::NotUnicode(_)) => {
                return Err(ChannelError::Config(format!("{PORT_ENV} is not valid UTF-8")))
            }
        };
        Ok(Self {
            port_override,
            ..Self::default()
        })
    }

    pub fn with_worker(mut self, worker: WorkerCommand) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn with_port_override(mut self, port: u16) -> Self {
        self.port_override = Some(port);
        self
    }
}

/// Parse a decimal port override. Zero is rejected.
pub fn parse_port_override(raw: &str) -> Result<u16> {
    match raw.trim().parse::<u16>() {
        Ok(0) => Err(ChannelError::Config(format!("{PORT_ENV} must not be 0"))),
        Ok(port) => Ok(port),
        Err(err) => Err(ChannelError::Config(format!(
            "{PORT_ENV}={raw:?} is not a port number: {err}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ChannelConfig::default();
        assert!(config.worker.is_none());
        assert!(config.port_override.is_none());
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.port_read_attempts, 100);
    }

    #[test]
    fn worker_command_builder() {
        let command = WorkerCommand::new("forkwire")
            .arg("serve")
            .args(["--log-level", "debug"]);

        assert_eq!(command.program(), OsStr::new("forkwire"));
        assert_eq!(command.args, vec!["serve", "--log-level", "debug"]);
    }

    #[test]
    fn port_override_parsing() {
        assert_eq!(parse_port_override("8080").unwrap(), 8080);
        assert_eq!(parse_port_override(" 9000\n").unwrap(), 9000);
        assert!(matches!(
            parse_port_override("0"),
            Err(ChannelError::Config(_))
        ));
        assert!(matches!(
            parse_port_override("70000"),
            Err(ChannelError::Config(_))
        ));
        assert!(matches!(
            parse_port_override("http"),
            Err(ChannelError::Config(_))
        ));
    }

    #[test]
    fn builder_sets_override() {
        let config = ChannelConfig::default()
            .with_worker(WorkerCommand::new("w"))
            .with_port_override(4242);
        assert_eq!(config.port_override, Some(4242));
        assert!(config.worker.is_some());
    }
}
