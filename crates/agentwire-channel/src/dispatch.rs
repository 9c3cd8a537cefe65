//! Capability handlers: turn decoded requests into replies.
//!
//! A [`Dispatcher`] is installed as a channel's all-traffic listener. Each
//! inbound request is matched to the handler registered for its type, and
//! the result is written back on the request's frame id. Handler errors and
//! panics become an in-band [`Failure`] reply; they never close the channel.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use agentwire_frame::{AnyMessage, Failure, MessageKind, Request};
use tracing::{debug, warn};

use crate::engine::Channel;

/// Error a capability handler reports instead of a reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

type Handler =
    Box<dyn Fn(&dyn AnyMessage) -> Result<Arc<dyn AnyMessage>, HandlerError> + Send + Sync>;

struct Registration {
    name: &'static str,
    handler: Handler,
}

/// Routes requests to capability handlers by request type.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<TypeId, Registration>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to request type `R`. A later registration for the same
    /// type replaces the earlier one.
    pub fn register_handler<R, F>(&mut self, handler: F) -> &mut Self
    where
        R: Request,
        F: Fn(&R) -> Result<R::Reply, HandlerError> + Send + Sync + 'static,
    {
        let erased: Handler = Box::new(move |message: &dyn AnyMessage| {
            let request = message
                .downcast_ref::<R>()
                .ok_or_else(|| HandlerError::new("request type mismatch"))?;
            let reply = handler(request)?;
            Ok(Arc::new(reply) as Arc<dyn AnyMessage>)
        });

        let name = std::any::type_name::<R>();
        if self
            .handlers
            .insert(TypeId::of::<R>(), Registration { name, handler: erased })
            .is_some()
        {
            debug!(request = name, "handler replaced");
        }
        self
    }

    /// Whether a handler is registered for `R`.
    pub fn handles<R: Request>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<R>())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Names of the request types with a handler, sorted.
    pub fn request_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.values().map(|r| r.name).collect();
        names.sort_unstable();
        names
    }

    /// Produce the reply for one request.
    ///
    /// `request_type` is the wire type id of `request`; it is echoed in a
    /// [`Failure`] when no handler exists or the handler fails or panics.
    pub fn answer(&self, request_type: i16, request: &dyn AnyMessage) -> Arc<dyn AnyMessage> {
        let failure = |message: String| -> Arc<dyn AnyMessage> {
            Arc::new(Failure {
                request_type,
                message,
            })
        };

        let Some(registration) = self.handlers.get(&request.as_any().type_id()) else {
            warn!(request = request.type_name(), "no handler registered");
            return failure(format!("no handler for {}", request.type_name()));
        };

        match catch_unwind(AssertUnwindSafe(|| (registration.handler)(request))) {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                warn!(request = registration.name, error = %err, "handler failed");
                failure(err.message)
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(request = registration.name, reason, "handler panicked");
                failure(format!("handler panicked: {reason}"))
            }
        }
    }

    /// Answer every request arriving on `channel`.
    ///
    /// Replaces the channel's all-traffic listener. Inbound replies are left
    /// to their response listeners.
    pub fn install(self: &Arc<Self>, channel: &Channel) {
        let dispatcher = Arc::clone(self);
        channel.set_all_traffic_listener(move |channel, frame_id, message| {
            dispatcher.on_traffic(channel, frame_id, message);
        });
    }

    fn on_traffic(&self, channel: &Channel, frame_id: i32, message: Arc<dyn AnyMessage>) {
        if message.kind() != MessageKind::Request {
            return;
        }

        let request_type = match channel.registry().lookup_for(&*message) {
            Ok(entry) => entry.type_id(),
            Err(err) => {
                warn!(frame_id, error = %err, "request type not in registry");
                return;
            }
        };

        let reply = self.answer(request_type, &*message);
        if let Err(err) = channel.reply_arc(frame_id, reply) {
            debug!(frame_id, error = %err, "reply not sent");
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.request_names())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use agentwire_frame::{DataInput, DataOutput, Message, Reply};

    use super::*;

    #[derive(Debug)]
    struct Double(i32);

    impl Message for Double {
        const KIND: MessageKind = MessageKind::Request;

        fn encode(&self, out: &mut DataOutput<'_>) -> agentwire_frame::Result<()> {
            out.write_i32(self.0);
            Ok(())
        }

        fn decode(input: &mut DataInput<'_>) -> agentwire_frame::Result<Self> {
            Ok(Self(input.read_i32()?))
        }
    }

    impl Request for Double {
        type Reply = Doubled;
    }

    #[derive(Debug, PartialEq)]
    struct Doubled(i32);

    impl Message for Doubled {
        const KIND: MessageKind = MessageKind::Reply;

        fn encode(&self, out: &mut DataOutput<'_>) -> agentwire_frame::Result<()> {
            out.write_i32(self.0);
            Ok(())
        }

        fn decode(input: &mut DataInput<'_>) -> agentwire_frame::Result<Self> {
            Ok(Self(input.read_i32()?))
        }
    }

    impl Reply for Doubled {}

    fn failure_of(reply: &Arc<dyn AnyMessage>) -> &Failure {
        reply.downcast_ref::<Failure>().expect("failure reply")
    }

    #[test]
    fn handler_result_is_the_reply() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_handler::<Double, _>(|req| Ok(Doubled(req.0 * 2)));
        assert!(dispatcher.handles::<Double>());

        let reply = dispatcher.answer(5, &Double(21));
        assert_eq!(reply.downcast_ref::<Doubled>(), Some(&Doubled(42)));
    }

    #[test]
    fn handler_error_becomes_failure() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_handler::<Double, _>(|_| Err("overflow".into()));

        let reply = dispatcher.answer(5, &Double(1));
        let failure = failure_of(&reply);
        assert_eq!(failure.request_type, 5);
        assert_eq!(failure.message, "overflow");
    }

    #[test]
    fn handler_panic_becomes_failure() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_handler::<Double, _>(|req| {
            if req.0 < 0 {
                panic!("negative input");
            }
            Ok(Doubled(req.0))
        });

        let reply = dispatcher.answer(5, &Double(-1));
        assert!(failure_of(&reply).message.contains("negative input"));

        let reply = dispatcher.answer(5, &Double(3));
        assert_eq!(reply.downcast_ref::<Doubled>(), Some(&Doubled(3)));
    }

    #[test]
    fn missing_handler_becomes_failure() {
        let dispatcher = Dispatcher::new();
        let reply = dispatcher.answer(9, &Double(1));
        let failure = failure_of(&reply);
        assert_eq!(failure.request_type, 9);
        assert!(failure.message.starts_with("no handler for"));
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register_handler::<Double, _>(|_| Ok(Doubled(0)))
            .register_handler::<Double, _>(|_| Ok(Doubled(1)));
        assert_eq!(dispatcher.len(), 1);

        let reply = dispatcher.answer(5, &Double(0));
        assert_eq!(reply.downcast_ref::<Doubled>(), Some(&Doubled(1)));
    }
}
