use std::path::Path;

use forkwire_frame::{FrameConfig, Value};
use forkwire_transport::LoopbackListener;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::error::{ChannelError, Result};
use crate::medium::Medium;

/// Worker side of the rendezvous.
///
/// Binds a loopback listener, publishes its port through the medium and
/// accepts the launcher's connection. The rendezvous files are removed when
/// the endpoint is dropped.
pub struct WorkerEndpoint {
    medium: Medium,
    listener: LoopbackListener,
    frame_config: FrameConfig,
}

impl WorkerEndpoint {
    /// Bind and publish. Fails with [`ChannelError::MediumInUse`] if the
    /// medium already has a port file.
    pub fn bind(medium: impl AsRef<Path>) -> Result<Self> {
        let medium = Medium::new(medium)?;
        if medium.is_published() {
            return Err(ChannelError::MediumInUse {
                path: medium.port_path().to_path_buf(),
            });
        }

        let listener = LoopbackListener::bind()?;
        if let Err(err) = medium.publish(listener.port()) {
            medium.clear();
            return Err(err);
        }
        info!(
            port = listener.port(),
            medium = %medium.path().display(),
            "worker endpoint published"
        );

        Ok(Self {
            medium,
            listener,
            frame_config: FrameConfig::default(),
        })
    }

    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    pub fn port(&self) -> u16 {
        self.listener.port()
    }

    pub fn medium(&self) -> &Medium {
        &self.medium
    }

    /// Accept the launcher's connection (blocking). The channel starts `Ready`.
    pub fn accept<H>(&self, handler: H) -> Result<Channel>
    where
        H: FnMut(Value) + Send + 'static,
    {
        let stream = self.listener.accept()?;
        debug!("launcher connected");
        Channel::from_stream_with_config(stream, handler, self.frame_config.clone())
    }
}

impl Drop for WorkerEndpoint {
    fn drop(&mut self) {
        self.medium.clear();
    }
}
