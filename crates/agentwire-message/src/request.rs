//! Requests a controller sends to an agent.

use agentwire_frame::{DataInput, DataOutput, Message, MessageKind, Request, Result};
use serde::{Deserialize, Serialize};

use crate::data::{MemberInfo, Structure};
use crate::reply::{
    ClassLoaders, ClassReply, FieldSetAck, FieldValue, LoaderClasses, Pong, Properties,
    RedefineAck, SetPropertyAck, Threads,
};

/// Declares a request with an empty payload.
macro_rules! empty_request {
    ($(#[$meta:meta])* $name:ident => $reply:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name;

        impl Message for $name {
            const KIND: MessageKind = MessageKind::Request;

            fn encode(&self, _out: &mut DataOutput<'_>) -> Result<()> {
                Ok(())
            }

            fn decode(_input: &mut DataInput<'_>) -> Result<Self> {
                Ok(Self)
            }
        }

        impl Request for $name {
            type Reply = $reply;
        }
    };
}

empty_request!(
    /// Liveness check.
    Ping => Pong
);
empty_request!(
    /// Fetch the agent's runtime properties.
    GetProperties => Properties
);
empty_request!(
    /// List known class groupings.
    GetClassLoaders => ClassLoaders
);
empty_request!(
    /// List the agent's execution threads with their stack traces.
    GetThreads => Threads
);

/// Set one runtime property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetProperty {
    pub key: String,
    pub value: String,
}

impl Message for SetProperty {
    const KIND: MessageKind = MessageKind::Request;

    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        out.write_str(&self.key)?;
        out.write_str(&self.value)
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            key: input.read_str()?,
            value: input.read_str()?,
        })
    }
}

impl Request for SetProperty {
    type Reply = SetPropertyAck;
}

/// List the names of classes held by one loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetLoaderClasses {
    pub loader_id: i32,
}

impl Message for GetLoaderClasses {
    const KIND: MessageKind = MessageKind::Request;

    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        out.write_i32(self.loader_id);
        Ok(())
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            loader_id: input.read_i32()?,
        })
    }
}

impl Request for GetLoaderClasses {
    type Reply = LoaderClasses;
}

/// Fetch the code of one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetClass {
    pub loader_id: i32,
    pub name: String,
}

impl Message for GetClass {
    const KIND: MessageKind = MessageKind::Request;

    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        out.write_i32(self.loader_id);
        out.write_str(&self.name)
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            loader_id: input.read_i32()?,
            name: input.read_str()?,
        })
    }
}

impl Request for GetClass {
    type Reply = ClassReply;
}

/// Replace the code of one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redefine {
    pub loader_id: i32,
    pub name: String,
    #[serde(skip)]
    pub code: Vec<u8>,
}

impl Message for Redefine {
    const KIND: MessageKind = MessageKind::Request;

    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        out.write_i32(self.loader_id);
        out.write_str(&self.name)?;
        out.write_bytes(&self.code)
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            loader_id: input.read_i32()?,
            name: input.read_str()?,
            code: input.read_bytes()?,
        })
    }
}

impl Request for Redefine {
    type Reply = RedefineAck;
}

/// Read a static field's value as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetField {
    pub member: MemberInfo,
}

impl Message for GetField {
    const KIND: MessageKind = MessageKind::Request;

    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        self.member.encode(out)
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            member: MemberInfo::decode(input)?,
        })
    }
}

impl Request for GetField {
    type Reply = FieldValue;
}

/// Assign a static field from its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetField {
    pub member: MemberInfo,
    pub value: String,
}

impl Message for SetField {
    const KIND: MessageKind = MessageKind::Request;

    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        self.member.encode(out)?;
        out.write_str(&self.value)
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            member: MemberInfo::decode(input)?,
            value: input.read_str()?,
        })
    }
}

impl Request for SetField {
    type Reply = FieldSetAck;
}
