use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::IpcStream;

/// TCP loopback transport.
///
/// The worker binds an ephemeral port on `127.0.0.1` and publishes it through
/// the rendezvous files; the launcher connects to that port. Nothing listens
/// on a non-loopback interface.
pub struct LoopbackListener {
    listener: TcpListener,
    port: u16,
}

impl LoopbackListener {
    /// Bind to an OS-assigned port on the loopback interface.
    pub fn bind() -> Result<Self> {
        Self::bind_port(0)
    }

    /// Bind to an explicit loopback port (`0` lets the OS choose).
    pub fn bind_port(port: u16) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let port = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?
            .port();

        info!(port, "listening on loopback");

        Ok(Self { listener, port })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<IpcStream> {
        let (stream, addr) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%addr, "accepted connection");
        Ok(IpcStream::from(stream))
    }

    /// Connect to a listening loopback port (blocking).
    pub fn connect(port: u16) -> Result<IpcStream> {
        let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port))
            .map_err(|source| TransportError::Connect { port, source })?;
        stream.set_nodelay(true)?;
        debug!(port, "connected to loopback port");
        Ok(IpcStream::from(stream))
    }

    /// The port this listener is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }
}
