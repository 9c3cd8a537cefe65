use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agentwire_frame::CodecRegistry;
use agentwire_transport::{Endpoint, IpcListener};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ChannelConfig;
use crate::dispatch::Dispatcher;
use crate::engine::Channel;
use crate::error::Result;
use crate::set::{BroadcastSource, ChannelSet};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Accepts connections and runs a started, dispatching channel for each.
pub struct Server {
    listener: IpcListener,
    registry: Arc<CodecRegistry>,
    dispatcher: Arc<Dispatcher>,
    config: ChannelConfig,
    channels: ChannelSet,
    stop: CancellationToken,
}

impl Server {
    /// Bind to `endpoint`. Every accepted channel decodes with `registry` and
    /// answers requests through `dispatcher`.
    pub async fn bind(
        endpoint: &Endpoint,
        registry: Arc<CodecRegistry>,
        dispatcher: Dispatcher,
    ) -> Result<Self> {
        let listener = IpcListener::bind(endpoint).await?;
        info!(endpoint = %listener.endpoint(), "server listening");
        Ok(Self {
            listener,
            registry,
            dispatcher: Arc::new(dispatcher),
            config: ChannelConfig::default(),
            channels: ChannelSet::new(),
            stop: CancellationToken::new(),
        })
    }

    /// Override the configuration of accepted channels.
    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Bound endpoint, with an ephemeral TCP port resolved.
    pub fn endpoint(&self) -> Endpoint {
        self.listener.endpoint()
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn broadcast_source(&self) -> BroadcastSource {
        BroadcastSource::new(self.channels.clone())
    }

    /// Run a collaborator that pushes broadcasts until the server stops.
    pub fn register_broadcast_source<F, Fut>(&self, source: F) -> JoinHandle<()>
    where
        F: FnOnce(BroadcastSource) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stop = self.stop.clone();
        let task = source(self.broadcast_source());
        tokio::spawn(async move {
            tokio::select! {
                _ = stop.cancelled() => {}
                _ = task => {}
            }
        })
    }

    /// Accept one connection and start its channel.
    pub async fn accept(&self) -> Result<Channel> {
        let stream = self.listener.accept().await?;
        let peer = stream.peer_label();

        let channel = Channel::with_config(stream, self.registry.clone(), self.config.clone());
        self.dispatcher.install(&channel);
        channel.start()?;
        self.channels.prune();
        self.channels.insert(channel.clone());

        info!(channel = channel.id(), peer = %peer, "accepted connection");
        Ok(channel)
    }

    /// Accept connections until [`stop`](Self::stop) is called.
    ///
    /// Accept failures are logged and retried. Open channels are closed when
    /// the loop ends.
    pub async fn run(&self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                accepted = self.accept() => {
                    if let Err(err) = accepted {
                        warn!(error = %err, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }

        self.channels.close_all();
        info!("server stopped");
        Ok(())
    }

    /// Stop [`run`](Self::run) and every broadcast source.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Token cancelled by [`stop`](Self::stop).
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("endpoint", &self.listener.endpoint())
            .field("channels", &self.channels.len())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use agentwire_frame::{
        Broadcast, DataInput, DataOutput, Message, MessageKind, Reply, Request,
    };

    use super::*;
    use crate::connector::connect;
    use crate::dispatch::HandlerError;

    #[derive(Debug)]
    struct Hello;

    impl Message for Hello {
        const KIND: MessageKind = MessageKind::Request;

        fn encode(&self, _out: &mut DataOutput<'_>) -> agentwire_frame::Result<()> {
            Ok(())
        }

        fn decode(_input: &mut DataInput<'_>) -> agentwire_frame::Result<Self> {
            Ok(Self)
        }
    }

    impl Request for Hello {
        type Reply = Welcome;
    }

    #[derive(Debug, PartialEq)]
    struct Welcome(i64);

    impl Message for Welcome {
        const KIND: MessageKind = MessageKind::Reply;

        fn encode(&self, out: &mut DataOutput<'_>) -> agentwire_frame::Result<()> {
            out.write_i64(self.0);
            Ok(())
        }

        fn decode(input: &mut DataInput<'_>) -> agentwire_frame::Result<Self> {
            Ok(Self(input.read_i64()?))
        }
    }

    impl Reply for Welcome {}

    #[derive(Debug, PartialEq)]
    struct Beat;

    impl Message for Beat {
        const KIND: MessageKind = MessageKind::Broadcast;

        fn encode(&self, _out: &mut DataOutput<'_>) -> agentwire_frame::Result<()> {
            Ok(())
        }

        fn decode(_input: &mut DataInput<'_>) -> agentwire_frame::Result<Self> {
            Ok(Self)
        }
    }

    impl Broadcast for Beat {}

    fn registry() -> Arc<CodecRegistry> {
        let mut registry = CodecRegistry::new();
        registry.register::<Hello>(20).unwrap();
        registry.register::<Welcome>(21).unwrap();
        registry.register::<Beat>(22).unwrap();
        Arc::new(registry)
    }

    fn dispatcher() -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_handler::<Hello, _>(|_| Ok::<_, HandlerError>(Welcome(7)));
        dispatcher
    }

    #[tokio::test]
    async fn accepted_channels_answer_requests() {
        let registry = registry();
        let server = Arc::new(
            Server::bind(&Endpoint::localhost(0), registry.clone(), dispatcher())
                .await
                .unwrap(),
        );
        let endpoint = server.endpoint();

        let runner = server.clone();
        let run = tokio::spawn(async move { runner.run().await });

        let first = connect(&endpoint, registry.clone()).await.unwrap();
        let second = connect(&endpoint, registry).await.unwrap();
        assert_eq!(*first.call(Hello).await.unwrap(), Welcome(7));
        assert_eq!(*second.call(Hello).await.unwrap(), Welcome(7));
        assert_eq!(server.channels().len(), 2);

        server.stop();
        run.await.unwrap().unwrap();
        tokio::time::timeout(Duration::from_secs(5), first.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn broadcast_source_reaches_clients() {
        let registry = registry();
        let server = Server::bind(&Endpoint::localhost(0), registry.clone(), dispatcher())
            .await
            .unwrap();
        let endpoint = server.endpoint();

        let client = connect(&endpoint, registry).await.unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        client.set_broadcast_listener(move |message| {
            let _ = tx.send(message);
        });
        server.accept().await.unwrap();

        let source = server.register_broadcast_source(|source| async move {
            assert_eq!(source.push(Beat), 1);
        });
        source.await.unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(message.is::<Beat>());
    }
}
