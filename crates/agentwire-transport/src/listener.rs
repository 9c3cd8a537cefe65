use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::stream::IpcStream;
use crate::tcp::TcpSocket;

#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// A bound listener for any supported [`Endpoint`] kind.
pub enum IpcListener {
    Tcp(TcpSocket),
    #[cfg(unix)]
    Unix(UnixDomainSocket),
}

impl IpcListener {
    /// Bind a listener on `endpoint`.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => Ok(Self::Tcp(TcpSocket::bind(addr).await?)),
            #[cfg(unix)]
            Endpoint::Unix(path) => Ok(Self::Unix(UnixDomainSocket::bind(path).await?)),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(crate::error::TransportError::Unsupported(endpoint.to_string())),
        }
    }

    /// Wait for the next inbound connection.
    pub async fn accept(&self) -> Result<IpcStream> {
        match self {
            Self::Tcp(socket) => socket.accept().await,
            #[cfg(unix)]
            Self::Unix(socket) => socket.accept().await,
        }
    }

    /// The endpoint actually bound. For TCP this resolves an ephemeral port.
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Tcp(socket) => Endpoint::Tcp(socket.local_addr().to_string()),
            #[cfg(unix)]
            Self::Unix(socket) => Endpoint::Unix(socket.path().to_path_buf()),
        }
    }
}

impl std::fmt::Debug for IpcListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcListener")
            .field("endpoint", &self.endpoint().to_string())
            .finish()
    }
}

/// Open a client stream to `endpoint`.
pub async fn connect(endpoint: &Endpoint) -> Result<IpcStream> {
    debug!(%endpoint, "connecting");
    match endpoint {
        Endpoint::Tcp(addr) => TcpSocket::connect(addr).await,
        #[cfg(unix)]
        Endpoint::Unix(path) => UnixDomainSocket::connect(path).await,
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(crate::error::TransportError::Unsupported(endpoint.to_string())),
    }
}
