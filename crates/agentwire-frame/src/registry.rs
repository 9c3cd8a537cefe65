use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::data::{DataInput, DataOutput};
use crate::error::{FrameError, Result};
use crate::message::{AnyMessage, Failure, Message, MessageKind, FAILURE_TYPE_ID};

type DecodeFn = Box<dyn Fn(&mut DataInput<'_>) -> Result<Arc<dyn AnyMessage>> + Send + Sync>;
type EncodeFn = Box<dyn Fn(&dyn AnyMessage, &mut DataOutput<'_>) -> Result<()> + Send + Sync>;

/// The paired codec registered for one message type.
pub struct CodecEntry {
    type_id: i16,
    type_name: &'static str,
    kind: MessageKind,
    decode: DecodeFn,
    encode: EncodeFn,
}

impl CodecEntry {
    /// Wire type id.
    pub fn type_id(&self) -> i16 {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Decode one complete payload. Unconsumed bytes are an error.
    pub fn decode(&self, payload: &[u8]) -> Result<Arc<dyn AnyMessage>> {
        let mut input = DataInput::new(payload);
        let message = (self.decode)(&mut input)?;
        input.finish()?;
        Ok(message)
    }

    /// Encode `message`, which must be of this entry's type.
    pub fn encode(&self, message: &dyn AnyMessage, out: &mut DataOutput<'_>) -> Result<()> {
        (self.encode)(message, out)
    }
}

impl fmt::Debug for CodecEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecEntry")
            .field("type_id", &self.type_id)
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Bidirectional map between message types, wire type ids and codecs.
///
/// Built once at startup, then shared (usually as `Arc<CodecRegistry>`) by
/// every channel. Registration needs `&mut self`, so once shared the table
/// is closed. [`Failure`] is always present under [`FAILURE_TYPE_ID`].
pub struct CodecRegistry {
    by_id: HashMap<i16, Arc<CodecEntry>>,
    by_type: HashMap<TypeId, Arc<CodecEntry>>,
}

impl CodecRegistry {
    /// Create a registry holding only the built-in [`Failure`] reply.
    pub fn new() -> Self {
        let mut registry = Self {
            by_id: HashMap::new(),
            by_type: HashMap::new(),
        };
        registry.insert_entry::<Failure>(
            FAILURE_TYPE_ID,
            Box::new(Failure::decode),
            Box::new(Failure::encode),
        );
        registry
    }

    /// Register `M` under `type_id` using its [`Message`] codec.
    pub fn register<M: Message>(&mut self, type_id: i16) -> Result<()> {
        self.register_with::<M, _, _>(type_id, M::decode, M::encode)
    }

    /// Register `M` under `type_id` with explicit codec functions.
    ///
    /// Fails if either the id or the type is already registered.
    pub fn register_with<M, D, E>(&mut self, type_id: i16, decode: D, encode: E) -> Result<()>
    where
        M: Message,
        D: Fn(&mut DataInput<'_>) -> Result<M> + Send + Sync + 'static,
        E: Fn(&M, &mut DataOutput<'_>) -> Result<()> + Send + Sync + 'static,
    {
        if let Some(existing) = self.by_id.get(&type_id) {
            return Err(FrameError::DuplicateTypeId {
                type_id,
                existing: existing.type_name,
            });
        }
        if self.by_type.contains_key(&TypeId::of::<M>()) {
            return Err(FrameError::DuplicateType(std::any::type_name::<M>()));
        }
        self.insert_entry::<M>(type_id, Box::new(decode), Box::new(encode));
        tracing::trace!(type_id, type_name = std::any::type_name::<M>(), "registered codec");
        Ok(())
    }

    fn insert_entry<M: Message>(
        &mut self,
        type_id: i16,
        decode: Box<dyn Fn(&mut DataInput<'_>) -> Result<M> + Send + Sync>,
        encode: Box<dyn Fn(&M, &mut DataOutput<'_>) -> Result<()> + Send + Sync>,
    ) {
        let type_name = std::any::type_name::<M>();
        let entry = Arc::new(CodecEntry {
            type_id,
            type_name,
            kind: M::KIND,
            decode: Box::new(move |input: &mut DataInput<'_>| {
                Ok(Arc::new(decode(input)?) as Arc<dyn AnyMessage>)
            }),
            encode: Box::new(move |message: &dyn AnyMessage, out: &mut DataOutput<'_>| {
                let typed = message
                    .downcast_ref::<M>()
                    .ok_or(FrameError::TypeMismatch {
                        expected: type_name,
                        actual: message.type_name(),
                    })?;
                encode(typed, out)
            }),
        });
        self.by_id.insert(type_id, Arc::clone(&entry));
        self.by_type.insert(TypeId::of::<M>(), entry);
    }

    /// Codec for a wire type id.
    ///
    /// An unknown id means the stream is out of sync, so this is an error
    /// rather than an `Option`.
    pub fn lookup_by_id(&self, type_id: i16) -> Result<&CodecEntry> {
        self.by_id
            .get(&type_id)
            .map(Arc::as_ref)
            .ok_or(FrameError::UnknownTypeId(type_id))
    }

    /// Codec for message type `M`.
    pub fn lookup_by_type<M: Message>(&self) -> Result<&CodecEntry> {
        self.by_type
            .get(&TypeId::of::<M>())
            .map(Arc::as_ref)
            .ok_or(FrameError::UnknownType(std::any::type_name::<M>()))
    }

    /// Codec for the concrete type behind `message`.
    pub fn lookup_for(&self, message: &dyn AnyMessage) -> Result<&CodecEntry> {
        self.by_type
            .get(&message.as_any().type_id())
            .map(Arc::as_ref)
            .ok_or(FrameError::UnknownType(message.type_name()))
    }

    /// Type id registered for `M`.
    pub fn type_id_of<M: Message>(&self) -> Result<i16> {
        self.lookup_by_type::<M>().map(CodecEntry::type_id)
    }

    /// Number of registered types, [`Failure`] included.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All entries, ordered by type id.
    pub fn entries(&self) -> Vec<&CodecEntry> {
        let mut entries: Vec<&CodecEntry> = self.by_id.values().map(Arc::as_ref).collect();
        entries.sort_by_key(|entry| entry.type_id);
        entries
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[derive(Debug, Clone, PartialEq)]
    struct Note(String);

    impl Message for Note {
        const KIND: MessageKind = MessageKind::Broadcast;

        fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
            out.write_str(&self.0)
        }

        fn decode(input: &mut DataInput<'_>) -> Result<Self> {
            Ok(Self(input.read_str()?))
        }
    }

    #[derive(Debug)]
    struct Other;

    impl Message for Other {
        const KIND: MessageKind = MessageKind::Request;

        fn encode(&self, _out: &mut DataOutput<'_>) -> Result<()> {
            Ok(())
        }

        fn decode(_input: &mut DataInput<'_>) -> Result<Self> {
            Ok(Self)
        }
    }

    #[test]
    fn failure_is_always_registered() {
        let registry = CodecRegistry::new();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.type_id_of::<Failure>().unwrap(), FAILURE_TYPE_ID);
        assert_eq!(
            registry.lookup_by_id(FAILURE_TYPE_ID).unwrap().kind(),
            MessageKind::Reply
        );
    }

    #[test]
    fn lookups_agree_after_register() {
        let mut registry = CodecRegistry::new();
        registry.register::<Note>(300).unwrap();

        let by_id = registry.lookup_by_id(300).unwrap();
        let by_type = registry.lookup_by_type::<Note>().unwrap();
        assert_eq!(by_id.type_id(), by_type.type_id());
        assert_eq!(by_id.kind(), MessageKind::Broadcast);
        assert_eq!(registry.lookup_for(&Note("x".into())).unwrap().type_id(), 300);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut registry = CodecRegistry::new();
        registry.register::<Note>(300).unwrap();
        let err = registry.register::<Other>(300).unwrap_err();
        assert!(matches!(err, FrameError::DuplicateTypeId { type_id: 300, .. }));
        assert!(registry.lookup_by_type::<Other>().is_err());
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let mut registry = CodecRegistry::new();
        registry.register::<Note>(300).unwrap();
        let err = registry.register::<Note>(301).unwrap_err();
        assert!(matches!(err, FrameError::DuplicateType(_)));
        assert!(registry.lookup_by_id(301).is_err());
    }

    #[test]
    fn failure_id_cannot_be_reused() {
        let mut registry = CodecRegistry::new();
        let err = registry.register::<Note>(FAILURE_TYPE_ID).unwrap_err();
        assert!(matches!(err, FrameError::DuplicateTypeId { .. }));
    }

    #[test]
    fn unknown_lookups_fail_loudly() {
        let registry = CodecRegistry::new();
        assert!(matches!(
            registry.lookup_by_id(999),
            Err(FrameError::UnknownTypeId(999))
        ));
        assert!(matches!(
            registry.lookup_by_type::<Note>(),
            Err(FrameError::UnknownType(_))
        ));
        assert!(matches!(
            registry.lookup_for(&Other),
            Err(FrameError::UnknownType(_))
        ));
    }

    #[test]
    fn custom_codec_functions_are_used() {
        let mut registry = CodecRegistry::new();
        registry
            .register_with::<Note, _, _>(
                310,
                |input| Ok(Note(input.read_str()?.to_uppercase())),
                |note, out| out.write_str(&note.0),
            )
            .unwrap();

        let entry = registry.lookup_by_id(310).unwrap();
        let mut arena = Arena::default();
        entry
            .encode(&Note("quiet".into()), &mut DataOutput::new(&mut arena))
            .unwrap();
        let decoded = entry.decode(arena.as_slice()).unwrap();
        assert_eq!(decoded.downcast_ref::<Note>(), Some(&Note("QUIET".into())));
    }

    #[test]
    fn encode_rejects_wrong_type() {
        let mut registry = CodecRegistry::new();
        registry.register::<Note>(300).unwrap();
        let entry = registry.lookup_by_id(300).unwrap();

        let mut arena = Arena::default();
        let err = entry
            .encode(&Other, &mut DataOutput::new(&mut arena))
            .unwrap_err();
        assert!(matches!(err, FrameError::TypeMismatch { .. }));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let registry = CodecRegistry::new();
        let mut payload = Vec::new();
        payload.extend_from_slice(&7i16.to_be_bytes());
        payload.extend_from_slice(&0i32.to_be_bytes());
        payload.push(0xFF);

        let err = registry
            .lookup_by_id(FAILURE_TYPE_ID)
            .unwrap()
            .decode(&payload)
            .unwrap_err();
        assert!(matches!(err, FrameError::TrailingBytes(1)));
    }
}
