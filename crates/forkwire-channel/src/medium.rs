//! Rendezvous files shared by a launcher and its worker.
//!
//! A medium is a filesystem path naming one session. The worker publishes
//! its loopback port in `<medium>.port` (4 bytes, big-endian) and then
//! creates the empty `<medium>.ready` marker.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ChannelError, Result};

pub const PORT_SUFFIX: &str = ".port";
pub const READY_SUFFIX: &str = ".ready";

/// Size of the encoded port in the port file.
pub const PORT_FILE_LEN: usize = 4;

/// One session's rendezvous paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Medium {
    path: PathBuf,
    port_path: PathBuf,
    ready_path: PathBuf,
}

impl Medium {
    /// Resolve `path` to an absolute medium path.
    ///
    /// The path itself is never created; only the derived files are.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = std::path::absolute(path.as_ref())?;
        Ok(Self {
            port_path: with_suffix(&path, PORT_SUFFIX),
            ready_path: with_suffix(&path, READY_SUFFIX),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn port_path(&self) -> &Path {
        &self.port_path
    }

    pub fn ready_path(&self) -> &Path {
        &self.ready_path
    }

    /// True once the worker has created the ready marker.
    pub fn is_ready(&self) -> bool {
        self.ready_path.is_file()
    }

    /// True if a port file already exists for this medium.
    pub fn is_published(&self) -> bool {
        self.port_path.exists()
    }

    /// Remove stale rendezvous files (best-effort).
    pub fn clear(&self) {
        for path in [&self.port_path, &self.ready_path] {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed rendezvous file"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => debug!(path = %path.display(), error = %err, "could not remove rendezvous file"),
            }
        }
    }

    /// Write the port file, then the ready marker.
    pub fn publish(&self, port: u16) -> Result<()> {
        fs::write(&self.port_path, encode_port(port)).map_err(|source| ChannelError::PortFile {
            path: self.port_path.clone(),
            source,
        })?;
        fs::write(&self.ready_path, b"").map_err(|source| ChannelError::PortFile {
            path: self.ready_path.clone(),
            source,
        })?;
        debug!(port, medium = %self.path.display(), "published rendezvous files");
        Ok(())
    }

    /// Read exactly four bytes from the port file and decode them.
    ///
    /// Short reads are accumulated; end-of-file before four bytes yields
    /// [`ChannelError::PortTruncated`].
    pub fn read_port(&self) -> Result<u16> {
        let port_file_err = |source| ChannelError::PortFile {
            path: self.port_path.clone(),
            source,
        };
        let mut file = File::open(&self.port_path).map_err(port_file_err)?;

        let mut bytes = [0u8; PORT_FILE_LEN];
        let mut filled = 0usize;
        while filled < PORT_FILE_LEN {
            match file.read(&mut bytes[filled..]) {
                Ok(0) => {
                    return Err(ChannelError::PortTruncated {
                        path: self.port_path.clone(),
                        read: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(port_file_err(err)),
            }
        }

        decode_port(bytes)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Encode a port the way the port file stores it.
pub fn encode_port(port: u16) -> [u8; PORT_FILE_LEN] {
    u32::from(port).to_be_bytes()
}

/// Decode port file bytes, rejecting values outside `1..=65535`.
pub fn decode_port(bytes: [u8; PORT_FILE_LEN]) -> Result<u16> {
    let raw = u32::from_be_bytes(bytes);
    match u16::try_from(raw) {
        Ok(0) | Err(_) => Err(ChannelError::InvalidPort { raw }),
        Ok(port) => Ok(port),
    }
}
