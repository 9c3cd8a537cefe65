//! Unsolicited pushes from an agent.

use agentwire_frame::{Broadcast, DataInput, DataOutput, Message, MessageKind, Result};
use serde::{Deserialize, Serialize};

use crate::data::{ClassData, ClassLoaderInfo, Structure};

/// A new class grouping appeared in the remote process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderDiscovered {
    pub loader: ClassLoaderInfo,
}

impl Message for LoaderDiscovered {
    const KIND: MessageKind = MessageKind::Broadcast;

    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        self.loader.encode(out)
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            loader: ClassLoaderInfo::decode(input)?,
        })
    }
}

impl Broadcast for LoaderDiscovered {}

/// A class was defined or its code replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassUpdated {
    pub data: ClassData,
}

impl Message for ClassUpdated {
    const KIND: MessageKind = MessageKind::Broadcast;

    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        self.data.encode(out)
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            data: ClassData::decode(input)?,
        })
    }
}

impl Broadcast for ClassUpdated {}
