//! The agentwire message catalog.
//!
//! Every request, reply and broadcast an agent and its controller exchange,
//! with stable wire type ids. [`catalog_registry`] builds a
//! [`CodecRegistry`](agentwire_frame::CodecRegistry) holding all of them.

pub mod broadcast;
pub mod data;
pub mod ids;
pub mod reply;
pub mod request;

use agentwire_frame::{CodecRegistry, Result};

pub use broadcast::{ClassUpdated, LoaderDiscovered};
pub use data::{ClassData, ClassLoaderInfo, MemberInfo, StackFrame, Structure, ThreadData};
pub use ids::{BOOTSTRAP_LOADER_ID, SYSTEM_LOADER_ID};
pub use reply::{
    ClassLoaders, ClassReply, FieldSetAck, FieldValue, LoaderClasses, Pong, Properties,
    RedefineAck, SetPropertyAck, Threads, STATUS_SUCCESS, UNKNOWN_VALUE,
};
pub use request::{
    GetClass, GetClassLoaders, GetField, GetLoaderClasses, GetProperties, GetThreads, Ping,
    Redefine, SetField, SetProperty,
};

/// Register every catalog type into `registry` under its stable id.
pub fn register_catalog(registry: &mut CodecRegistry) -> Result<()> {
    registry.register::<Ping>(ids::PING)?;
    registry.register::<Pong>(ids::PONG)?;

    registry.register::<GetProperties>(ids::GET_PROPERTIES)?;
    registry.register::<Properties>(ids::PROPERTIES)?;
    registry.register::<SetProperty>(ids::SET_PROPERTY)?;
    registry.register::<SetPropertyAck>(ids::SET_PROPERTY_ACK)?;

    registry.register::<GetClassLoaders>(ids::GET_CLASS_LOADERS)?;
    registry.register::<ClassLoaders>(ids::CLASS_LOADERS)?;
    registry.register::<GetLoaderClasses>(ids::GET_LOADER_CLASSES)?;
    registry.register::<LoaderClasses>(ids::LOADER_CLASSES)?;
    registry.register::<GetClass>(ids::GET_CLASS)?;
    registry.register::<ClassReply>(ids::CLASS_REPLY)?;
    registry.register::<Redefine>(ids::REDEFINE)?;
    registry.register::<RedefineAck>(ids::REDEFINE_ACK)?;

    registry.register::<GetField>(ids::GET_FIELD)?;
    registry.register::<FieldValue>(ids::FIELD_VALUE)?;
    registry.register::<SetField>(ids::SET_FIELD)?;
    registry.register::<FieldSetAck>(ids::FIELD_SET_ACK)?;

    registry.register::<GetThreads>(ids::GET_THREADS)?;
    registry.register::<Threads>(ids::THREADS)?;

    registry.register::<LoaderDiscovered>(ids::LOADER_DISCOVERED)?;
    registry.register::<ClassUpdated>(ids::CLASS_UPDATED)?;
    Ok(())
}

/// A fresh registry holding the full catalog (plus the built-in failure reply).
pub fn catalog_registry() -> Result<CodecRegistry> {
    let mut registry = CodecRegistry::new();
    register_catalog(&mut registry)?;
    Ok(registry)
}
