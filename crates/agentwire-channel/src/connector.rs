use std::sync::Arc;

use agentwire_frame::CodecRegistry;
use agentwire_transport::Endpoint;
use tracing::info;

use crate::config::ChannelConfig;
use crate::engine::Channel;
use crate::error::Result;

/// Connect to an agent and start a channel over the connection.
pub async fn connect(endpoint: &Endpoint, registry: Arc<CodecRegistry>) -> Result<Channel> {
    connect_with_config(endpoint, registry, ChannelConfig::default()).await
}

/// Connect with explicit channel configuration.
pub async fn connect_with_config(
    endpoint: &Endpoint,
    registry: Arc<CodecRegistry>,
    config: ChannelConfig,
) -> Result<Channel> {
    let stream = agentwire_transport::connect(endpoint).await?;
    let channel = Channel::with_config(stream, registry, config);
    channel.start()?;
    info!(channel = channel.id(), %endpoint, "connected");
    Ok(channel)
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;

    use agentwire_transport::TransportError;

    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::error::ChannelError;
    use crate::server::Server;

    fn make_sock_path(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/agentwire-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("agent.sock")
    }

    #[tokio::test]
    async fn connect_over_unix_socket() {
        let sock_path = make_sock_path("connect");
        let endpoint = Endpoint::Unix(sock_path.clone());
        let registry = Arc::new(CodecRegistry::new());
        let server = Server::bind(&endpoint, registry.clone(), Dispatcher::new())
            .await
            .expect("server should bind");

        let client = connect(&endpoint, registry)
            .await
            .expect("client should connect");
        let accepted = server.accept().await.expect("server should accept");
        assert!(client.is_open());
        assert!(accepted.is_open());
        assert_ne!(client.id(), accepted.id());

        if let Some(parent) = sock_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[tokio::test]
    async fn connect_to_missing_socket_fails() {
        let sock_path = make_sock_path("missing");
        let err = connect(&Endpoint::Unix(sock_path.clone()), Arc::new(CodecRegistry::new()))
            .await
            .expect_err("connect should fail");
        assert!(matches!(
            err,
            ChannelError::Transport(TransportError::Connect { .. })
        ));

        if let Some(parent) = sock_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }
}
