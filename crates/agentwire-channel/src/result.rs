//! Completion handles returned by [`Channel::write`](crate::Channel::write)
//! and [`Channel::request`](crate::Channel::request).

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use agentwire_frame::{AnyMessage, Failure, Reply};
use tokio::sync::oneshot;

use crate::engine::Channel;
use crate::error::{ChannelError, Result};

/// Resolves once the frame has been handed to the transport.
///
/// Resolves to the encoded payload length, or [`ChannelError::Closed`] if the
/// channel closed before the frame went out.
#[derive(Debug)]
pub struct WriteResult {
    frame_id: i32,
    done: oneshot::Receiver<Result<usize>>,
}

impl WriteResult {
    pub(crate) fn new(frame_id: i32, done: oneshot::Receiver<Result<usize>>) -> Self {
        Self { frame_id, done }
    }

    /// Frame id the message was written under.
    pub fn frame_id(&self) -> i32 {
        self.frame_id
    }
}

impl Future for WriteResult {
    type Output = Result<usize>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.done).poll(cx) {
            Poll::Ready(Ok(written)) => Poll::Ready(written),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ChannelError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Pairs a request's write with the reply correlated to its frame id.
///
/// Resolves to the typed reply. A [`Failure`] from the peer resolves to
/// [`ChannelError::Remote`]; any other type to
/// [`ChannelError::UnexpectedReply`]. Dropping an unresolved handle removes
/// its response listener, so a late reply is discarded.
pub struct ReplyResult<R> {
    channel: Channel,
    frame_id: i32,
    write: Option<WriteResult>,
    reply: oneshot::Receiver<Arc<dyn AnyMessage>>,
    settled: bool,
    _reply: PhantomData<fn() -> R>,
}

impl<R: Reply> ReplyResult<R> {
    pub(crate) fn new(
        channel: Channel,
        write: WriteResult,
        reply: oneshot::Receiver<Arc<dyn AnyMessage>>,
    ) -> Self {
        Self {
            channel,
            frame_id: write.frame_id(),
            write: Some(write),
            reply,
            settled: false,
            _reply: PhantomData,
        }
    }

    /// Frame id of the request, and of the reply it waits for.
    pub fn frame_id(&self) -> i32 {
        self.frame_id
    }
}

impl<R: Reply> Future for ReplyResult<R> {
    type Output = Result<Arc<R>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if let Some(write) = this.write.as_mut() {
            match Pin::new(write).poll(cx) {
                Poll::Ready(Ok(_)) => this.write = None,
                Poll::Ready(Err(err)) => {
                    this.write = None;
                    this.settled = true;
                    this.channel.remove_response_listener(this.frame_id);
                    return Poll::Ready(Err(err));
                }
                Poll::Pending => {}
            }
        }

        match Pin::new(&mut this.reply).poll(cx) {
            Poll::Ready(Ok(message)) => {
                this.settled = true;
                Poll::Ready(typed_reply::<R>(message))
            }
            Poll::Ready(Err(_)) => {
                this.settled = true;
                Poll::Ready(Err(ChannelError::Closed))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<R> Drop for ReplyResult<R> {
    fn drop(&mut self) {
        if !self.settled {
            self.channel.remove_response_listener(self.frame_id);
        }
    }
}

impl<R> std::fmt::Debug for ReplyResult<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyResult")
            .field("frame_id", &self.frame_id)
            .field("expects", &std::any::type_name::<R>())
            .field("written", &self.write.is_none())
            .finish()
    }
}

fn typed_reply<R: Reply>(message: Arc<dyn AnyMessage>) -> Result<Arc<R>> {
    let actual = message.type_name();
    if let Some(reply) = message.clone().downcast_arc::<R>() {
        return Ok(reply);
    }
    match message.downcast_ref::<Failure>() {
        Some(failure) => Err(ChannelError::Remote {
            type_id: failure.request_type,
            message: failure.message.clone(),
        }),
        None => Err(ChannelError::UnexpectedReply {
            expected: std::any::type_name::<R>(),
            actual,
        }),
    }
}

#[cfg(test)]
mod tests {
    use agentwire_frame::{DataInput, DataOutput, Message, MessageKind};

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Ack;

    impl Message for Ack {
        const KIND: MessageKind = MessageKind::Reply;

        fn encode(&self, _out: &mut DataOutput<'_>) -> agentwire_frame::Result<()> {
            Ok(())
        }

        fn decode(_input: &mut DataInput<'_>) -> agentwire_frame::Result<Self> {
            Ok(Self)
        }
    }

    impl Reply for Ack {}

    #[derive(Debug)]
    struct Other;

    impl Message for Other {
        const KIND: MessageKind = MessageKind::Reply;

        fn encode(&self, _out: &mut DataOutput<'_>) -> agentwire_frame::Result<()> {
            Ok(())
        }

        fn decode(_input: &mut DataInput<'_>) -> agentwire_frame::Result<Self> {
            Ok(Self)
        }
    }

    impl Reply for Other {}

    #[test]
    fn typed_reply_matches_expected_type() {
        let reply = typed_reply::<Ack>(Arc::new(Ack)).unwrap();
        assert_eq!(*reply, Ack);
    }

    #[test]
    fn failure_becomes_remote_error() {
        let failure = Failure {
            request_type: 42,
            message: "boom".into(),
        };
        let err = typed_reply::<Ack>(Arc::new(failure)).unwrap_err();
        match err {
            ChannelError::Remote { type_id, message } => {
                assert_eq!(type_id, 42);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn wrong_type_is_unexpected_reply() {
        let err = typed_reply::<Ack>(Arc::new(Other)).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::UnexpectedReply { expected, actual }
                if expected.ends_with("Ack") && actual.ends_with("Other")
        ));
    }

    #[tokio::test]
    async fn dropped_sender_resolves_write_as_closed() {
        let (tx, rx) = oneshot::channel();
        let write = WriteResult::new(3, rx);
        assert_eq!(write.frame_id(), 3);
        drop(tx);
        assert!(matches!(write.await, Err(ChannelError::Closed)));
    }
}
