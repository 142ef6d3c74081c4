use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

use crate::error::Result;
#[cfg(unix)]
use crate::ring::RingStream;

/// A connected forkwire stream. Implements Read + Write.
///
/// This is the Transport Connection handed to a channel. It is either a TCP
/// loopback socket or, on Unix, one side of a memory-mapped ring file.
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Ring(RingStream),
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            IpcStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            IpcStreamInner::Ring(stream) => stream.read(buf),
        }
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            IpcStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            IpcStreamInner::Ring(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            IpcStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            IpcStreamInner::Ring(stream) => stream.flush(),
        }
    }
}

impl From<TcpStream> for IpcStream {
    fn from(stream: TcpStream) -> Self {
        Self {
            inner: IpcStreamInner::Tcp(stream),
        }
    }
}

#[cfg(unix)]
impl From<RingStream> for IpcStream {
    fn from(stream: RingStream) -> Self {
        Self {
            inner: IpcStreamInner::Ring(stream),
        }
    }
}

impl IpcStream {
    /// Try to clone this stream so reads and writes can run on separate threads.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            IpcStreamInner::Tcp(stream) => Ok(Self::from(stream.try_clone()?)),
            #[cfg(unix)]
            IpcStreamInner::Ring(stream) => Ok(Self::from(stream.clone())),
        }
    }

    /// Signal that no more bytes will be written.
    ///
    /// The ring transport has no half-close; this is a no-op there.
    pub fn shutdown_write(&self) -> Result<()> {
        match &self.inner {
            IpcStreamInner::Tcp(stream) => match stream.shutdown(Shutdown::Write) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(err) => Err(err.into()),
            },
            #[cfg(unix)]
            IpcStreamInner::Ring(_) => Ok(()),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            IpcStreamInner::Tcp(_) => "tcp-loopback",
            #[cfg(unix)]
            IpcStreamInner::Ring(_) => "mmap-ring",
        }
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            IpcStreamInner::Tcp(stream) => f
                .debug_struct("IpcStream")
                .field("type", &"tcp")
                .field("peer", &stream.peer_addr().ok())
                .finish(),
            #[cfg(unix)]
            IpcStreamInner::Ring(stream) => f
                .debug_struct("IpcStream")
                .field("type", &"ring")
                .field("side", &stream.side())
                .finish(),
        }
    }
}
