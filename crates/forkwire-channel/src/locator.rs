use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use forkwire_transport::{IpcStream, LoopbackListener};
use tracing::{debug, info};

use crate::config::{ChannelConfig, WorkerCommand};
use crate::error::{ChannelError, Result};
use crate::medium::Medium;

/// Liveness of the process expected to publish a medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Running,
    Exited(Option<i32>),
}

/// Launcher side of the rendezvous: a spawned worker and the medium it
/// will publish.
#[derive(Debug)]
pub struct Locator {
    medium: Medium,
    child: Child,
    poll_interval: Duration,
    port_read_attempts: u32,
}

impl Locator {
    /// Clear stale rendezvous files and spawn the worker.
    ///
    /// The worker is started as `<program> <args..> --file <medium>` with a
    /// null stdin and inherited stdout/stderr.
    pub fn launch(medium: Medium, command: &WorkerCommand, config: &ChannelConfig) -> Result<Self> {
        medium.clear();

        let child = Command::new(&command.program)
            .args(&command.args)
            .arg("--file")
            .arg(medium.path())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| ChannelError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        info!(
            pid = child.id(),
            medium = %medium.path().display(),
            "launched worker"
        );

        Ok(Self {
            medium,
            child,
            poll_interval: config.poll_interval,
            port_read_attempts: config.port_read_attempts,
        })
    }

    /// OS process id of the launched worker.
    pub fn worker_id(&self) -> u32 {
        self.child.id()
    }

    pub fn medium(&self) -> &Medium {
        &self.medium
    }

    /// Poll until the worker publishes its port or exits (blocking).
    pub fn wait_for_port(&mut self) -> Result<u16> {
        let child = &mut self.child;
        wait_for_port(
            &self.medium,
            || match child.try_wait()? {
                None => Ok(WorkerStatus::Running),
                Some(status) => Ok(WorkerStatus::Exited(status.code())),
            },
            self.poll_interval,
            self.port_read_attempts,
        )
    }

    /// Wait for the port, then connect to it.
    pub fn connect(&mut self) -> Result<IpcStream> {
        let port = self.wait_for_port()?;
        Ok(LoopbackListener::connect(port)?)
    }

    /// Block until the worker exits and reap it.
    pub fn wait(mut self) -> Result<WorkerStatus> {
        let status = self.child.wait()?;
        debug!(pid = self.child.id(), code = ?status.code(), "worker reaped");
        Ok(WorkerStatus::Exited(status.code()))
    }
}

/// Poll `medium` for readiness at `poll_interval` while `status` reports the
/// worker alive.
///
/// A ready medium whose port file is still short is re-polled up to
/// `port_read_attempts` times, as long as the worker keeps running.
pub fn wait_for_port<F>(
    medium: &Medium,
    mut status: F,
    poll_interval: Duration,
    port_read_attempts: u32,
) -> Result<u16>
where
    F: FnMut() -> std::io::Result<WorkerStatus>,
{
    let mut short_reads = 0u32;
    loop {
        if medium.is_ready() {
            match medium.read_port() {
                Ok(port) => {
                    debug!(port, short_reads, "worker is ready");
                    return Ok(port);
                }
                Err(ChannelError::PortTruncated { read, .. }) if short_reads < port_read_attempts => {
                    if let WorkerStatus::Exited(code) = status()? {
                        debug!(read, "worker exited with a short port file");
                        return Err(ChannelError::WorkerExited { code });
                    }
                    short_reads += 1;
                    debug!(read, short_reads, "port file not fully written yet");
                }
                Err(err) => return Err(err),
            }
        } else if let WorkerStatus::Exited(code) = status()? {
            return Err(ChannelError::WorkerExited { code });
        }

        thread::sleep(poll_interval);
    }
}
