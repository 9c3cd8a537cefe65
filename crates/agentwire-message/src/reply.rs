//! Replies an agent sends back on a request's frame id.

use std::collections::BTreeMap;

use agentwire_frame::{DataInput, DataOutput, Message, MessageKind, Reply, Result};
use serde::{Deserialize, Serialize};

use crate::data::{ClassData, ClassLoaderInfo, MemberInfo, Structure, ThreadData};

/// Status text of a successful acknowledgement.
pub const STATUS_SUCCESS: &str = ".";

/// Field value text used when the agent could not read a value.
pub const UNKNOWN_VALUE: &str = "?";

macro_rules! empty_reply {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name;

        impl Message for $name {
            const KIND: MessageKind = MessageKind::Reply;

            fn encode(&self, _out: &mut DataOutput<'_>) -> Result<()> {
                Ok(())
            }

            fn decode(_input: &mut DataInput<'_>) -> Result<Self> {
                Ok(Self)
            }
        }

        impl Reply for $name {}
    };
}

/// Status-string acknowledgement: [`STATUS_SUCCESS`] or an error description.
macro_rules! status_reply {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub status: String,
        }

        impl $name {
            pub fn success() -> Self {
                Self {
                    status: STATUS_SUCCESS.to_string(),
                }
            }

            pub fn failed(reason: impl Into<String>) -> Self {
                Self {
                    status: reason.into(),
                }
            }

            pub fn is_success(&self) -> bool {
                self.status == STATUS_SUCCESS
            }
        }

        impl Message for $name {
            const KIND: MessageKind = MessageKind::Reply;

            fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
                out.write_str(&self.status)
            }

            fn decode(input: &mut DataInput<'_>) -> Result<Self> {
                Ok(Self {
                    status: input.read_str()?,
                })
            }
        }

        impl Reply for $name {}
    };
}

empty_reply!(
    /// Answer to [`Ping`](crate::Ping).
    Pong
);
empty_reply!(SetPropertyAck);

status_reply!(
    /// Outcome of a [`Redefine`](crate::Redefine).
    RedefineAck
);
status_reply!(
    /// Outcome of a [`SetField`](crate::SetField).
    FieldSetAck
);

/// The agent's runtime properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    pub entries: BTreeMap<String, String>,
}

impl Message for Properties {
    const KIND: MessageKind = MessageKind::Reply;

    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        out.write_collection(&self.entries, |out, (key, value)| {
            out.write_str(key)?;
            out.write_str(value)
        })
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        let pairs = input.read_collection(|input| Ok((input.read_str()?, input.read_str()?)))?;
        Ok(Self {
            entries: pairs.into_iter().collect(),
        })
    }
}

impl Reply for Properties {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLoaders {
    pub loaders: Vec<ClassLoaderInfo>,
}

impl Message for ClassLoaders {
    const KIND: MessageKind = MessageKind::Reply;

    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        ClassLoaderInfo::encode_list(&self.loaders, out)
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            loaders: ClassLoaderInfo::decode_list(input)?,
        })
    }
}

impl Reply for ClassLoaders {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderClasses {
    pub loader_id: i32,
    pub classes: Vec<String>,
}

impl Message for LoaderClasses {
    const KIND: MessageKind = MessageKind::Reply;

    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        out.write_i32(self.loader_id);
        out.write_collection(&self.classes, |out, name| out.write_str(name))
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            loader_id: input.read_i32()?,
            classes: input.read_collection(DataInput::read_str)?,
        })
    }
}

impl Reply for LoaderClasses {}

/// Code of one class, or `None` when the agent has no code for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassReply {
    pub data: Option<ClassData>,
}

impl Message for ClassReply {
    const KIND: MessageKind = MessageKind::Reply;

    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        match self.data.as_ref().filter(|data| data.has_code()) {
            Some(data) => {
                out.write_bool(true);
                data.encode(out)
            }
            None => {
                out.write_bool(false);
                Ok(())
            }
        }
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        let data = if input.read_bool()? {
            Some(ClassData::decode(input)?)
        } else {
            None
        };
        Ok(Self { data })
    }
}

impl Reply for ClassReply {}

/// Textual value of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub member: MemberInfo,
    pub value: String,
}

impl FieldValue {
    pub fn unknown(member: MemberInfo) -> Self {
        Self {
            member,
            value: UNKNOWN_VALUE.to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.value == UNKNOWN_VALUE
    }
}

impl Message for FieldValue {
    const KIND: MessageKind = MessageKind::Reply;

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

impl Reply for FieldValue {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threads {
    pub threads: Vec<ThreadData>,
}

impl Message for Threads {
    const KIND: MessageKind = MessageKind::Reply;

    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        ThreadData::encode_list(&self.threads, out)
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            threads: ThreadData::decode_list(input)?,
        })
    }
}

impl Reply for Threads {}
