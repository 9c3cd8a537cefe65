//! Structures nested inside catalog messages.

use agentwire_frame::{DataInput, DataOutput, Result};
use serde::{Deserialize, Serialize};

/// A value that is encoded inline as part of a larger payload.
pub trait Structure: Sized {
    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()>;
    fn decode(input: &mut DataInput<'_>) -> Result<Self>;

    /// Encode a count-prefixed list of `Self`.
    fn encode_list(items: &[Self], out: &mut DataOutput<'_>) -> Result<()> {
        out.write_collection(items, |out, item| item.encode(out))
    }

    fn decode_list(input: &mut DataInput<'_>) -> Result<Vec<Self>> {
        input.read_collection(Self::decode)
    }
}

/// An opaque, stable identifier for one class grouping (a loader) in the
/// remote runtime, plus a display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassLoaderInfo {
    pub id: i32,
    pub name: String,
}

impl Structure for ClassLoaderInfo {
    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        out.write_i32(self.id);
        out.write_str(&self.name)
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            id: input.read_i32()?,
            name: input.read_str()?,
        })
    }
}

/// A unit of code as held by one loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassData {
    pub name: String,
    pub loader_id: i32,
    /// Raw code bytes. Empty when the agent could not obtain them.
    #[serde(skip)]
    pub code: Vec<u8>,
}

impl ClassData {
    pub fn has_code(&self) -> bool {
        !self.code.is_empty()
    }
}

impl Structure for ClassData {
    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        out.write_str(&self.name)?;
        out.write_i32(self.loader_id);
        out.write_bytes(&self.code)
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            name: input.read_str()?,
            loader_id: input.read_i32()?,
            code: input.read_bytes()?,
        })
    }
}

/// Identifies a field: declaring type, name and type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberInfo {
    pub owner: String,
    pub name: String,
    pub desc: String,
}

impl Structure for MemberInfo {
    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        out.write_str(&self.owner)?;
        out.write_str(&self.name)?;
        out.write_str(&self.desc)
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            owner: input.read_str()?,
            name: input.read_str()?,
            desc: input.read_str()?,
        })
    }
}

/// One entry of a thread's stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub class: String,
    pub method: String,
    /// Source file, empty when unknown.
    pub file: String,
    pub line: i32,
}

impl Structure for StackFrame {
    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        out.write_str(&self.class)?;
        out.write_str(&self.method)?;
        out.write_str(&self.file)?;
        out.write_i32(self.line);
        Ok(())
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            class: input.read_str()?,
            method: input.read_str()?,
            file: input.read_str()?,
            line: input.read_i32()?,
        })
    }
}

/// A snapshot of one execution thread in the remote process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadData {
    pub id: i64,
    pub name: String,
    pub state: String,
    pub trace: Vec<StackFrame>,
}

impl Structure for ThreadData {
    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        out.write_i64(self.id);
        out.write_str(&self.name)?;
        out.write_str(&self.state)?;
        StackFrame::encode_list(&self.trace, out)
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            id: input.read_i64()?,
            name: input.read_str()?,
            state: input.read_str()?,
            trace: StackFrame::decode_list(input)?,
        })
    }
}
