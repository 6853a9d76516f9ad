//! The sequential stream of self-describing units that makes up the portable form.
//!
//! A stream starts with a header frame naming its schema, followed by exactly
//! one frame per declared field, in declaration order. Both ends walk the same
//! `FieldSpec` list, so a field read or written out of place is caught here.

mod body;
mod proto;

use std::{
    fmt,
    io::{self, Read, Write},
};

use serde::{Deserialize, Serialize};

use crate::{
    ConvertError, ProtocolError, Result,
    codec::{PortableMatrix, PortableTensor},
    keyed::{KeyMap, TwoKeyMap},
};

pub use body::UnitBody;
use body::{Decoded, Encoded};

const STREAM_VERSION: u32 = 1;

/// The container kind a unit holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    TwoKeyMatrices,
    TwoKeyTensors,
    Matrices,
    Opaque,
}

impl UnitKind {
    fn header(self) -> u32 {
        match self {
            Self::TwoKeyMatrices => proto::TWO_KEY_MATRICES_H,
            Self::TwoKeyTensors => proto::TWO_KEY_TENSORS_H,
            Self::Matrices => proto::MATRICES_H,
            Self::Opaque => proto::OPAQUE_H,
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TwoKeyMatrices => "two-key matrix map",
            Self::TwoKeyTensors => "two-key tensor map",
            Self::Matrices => "matrix map",
            Self::Opaque => "opaque",
        };
        f.write_str(name)
    }
}

/// A named position in a schema's field list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: UnitKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: UnitKind) -> Self {
        Self { name, kind }
    }
}

/// A value that can travel as a single unit.
pub trait UnitValue: UnitBody {
    /// The container kind this value is written as.
    const KIND: UnitKind;
}

impl UnitValue for TwoKeyMap<PortableMatrix> {
    const KIND: UnitKind = UnitKind::TwoKeyMatrices;
}

impl UnitValue for TwoKeyMap<PortableTensor> {
    const KIND: UnitKind = UnitKind::TwoKeyTensors;
}

impl UnitValue for KeyMap<PortableMatrix> {
    const KIND: UnitKind = UnitKind::Matrices;
}

#[derive(Debug, Serialize, Deserialize)]
struct StreamHeader {
    version: u32,
    schema: String,
}

/// Writes the units of a single schema, in declaration order.
pub struct UnitWriter<W: Write> {
    sink: W,
    fields: &'static [FieldSpec],
    next: usize,
    buf: Vec<u8>,
    frame_limit: u64,
}

impl<W: Write> UnitWriter<W> {
    /// Creates a new `UnitWriter` and writes the stream header.
    ///
    /// # Arguments
    /// * `sink` - The underlying writer.
    /// * `schema` - The name of the schema being written.
    /// * `fields` - The schema's declared field list.
    pub fn new(mut sink: W, schema: &str, fields: &'static [FieldSpec]) -> Result<Self> {
        let header = StreamHeader {
            version: STREAM_VERSION,
            schema: schema.to_string(),
        };

        // SAFETY: `StreamHeader` is derived and holds no non string-key map.
        let body = serde_json::to_vec(&header).unwrap();
        proto::write_frame(&mut sink, proto::STREAM_H, &body, proto::MAX_FRAME_LEN)
            .map_err(io_error)?;

        Ok(Self {
            sink,
            fields,
            next: 0,
            buf: Vec::new(),
            frame_limit: proto::MAX_FRAME_LEN,
        })
    }

    /// Writes `value` as the unit for `field`.
    ///
    /// # Errors
    /// A `ProtocolError` if `field` is not the next declared field, its kind does
    /// not match `T` or its body is larger than a reader accepts.
    pub fn write<T: UnitValue>(&mut self, field: FieldSpec, value: &T) -> Result<()> {
        expect_next(self.fields, self.next, field, T::KIND)?;

        self.buf.clear();
        Encoded(value)
            .serialize(&mut serde_json::Serializer::new(&mut self.buf))
            .map_err(|source| ProtocolError::Malformed {
                field: field.name,
                source,
            })?;

        proto::write_frame(&mut self.sink, T::KIND.header(), &self.buf, self.frame_limit)
            .map_err(io_error)?;
        self.next += 1;
        Ok(())
    }

    /// Checks every declared field was written and flushes the sink.
    ///
    /// # Returns
    /// The underlying writer.
    pub fn finish(mut self) -> Result<W> {
        if self.next != self.fields.len() {
            return Err(ProtocolError::Incomplete {
                consumed: self.next,
                declared: self.fields.len(),
            }
            .into());
        }

        self.sink.flush()?;
        Ok(self.sink)
    }
}

/// Reads the units of a single schema, in declaration order.
pub struct UnitReader<R: Read> {
    src: R,
    fields: &'static [FieldSpec],
    next: usize,
    buf: Vec<u8>,
}

impl<R: Read> UnitReader<R> {
    /// Creates a new `UnitReader`, reading and checking the stream header.
    ///
    /// # Errors
    /// A `ProtocolError` if the header is missing, of an unknown version or
    /// names another schema.
    pub fn open(mut src: R, schema: &'static str, fields: &'static [FieldSpec]) -> Result<Self> {
        let mut buf = Vec::new();

        let kind = proto::read_frame(&mut src, &mut buf)
            .map_err(|e| header_error(e, "cannot read the stream header"))?
            .ok_or_else(|| ProtocolError::BadHeader("empty stream".into()))?;

        if kind != proto::STREAM_H {
            let msg = format!("first frame has kind header {kind}");
            return Err(ProtocolError::BadHeader(msg).into());
        }

        let header: StreamHeader = serde_json::from_slice(&buf)
            .map_err(|e| ProtocolError::BadHeader(e.to_string()))?;

        if header.version != STREAM_VERSION {
            let msg = format!("unsupported version {}", header.version);
            return Err(ProtocolError::BadHeader(msg).into());
        }
        if header.schema != schema {
            return Err(ProtocolError::SchemaMismatch {
                expected: schema,
                got: header.schema,
            }
            .into());
        }

        Ok(Self {
            src,
            fields,
            next: 0,
            buf,
        })
    }

    /// Reads the unit for `field`.
    ///
    /// # Errors
    /// A `ProtocolError` if `field` is not the next declared field, the stream
    /// ends early, the unit is of another kind or its body cannot be decoded.
    pub fn read<T: UnitValue>(&mut self, field: FieldSpec) -> Result<T> {
        expect_next(self.fields, self.next, field, T::KIND)?;

        let kind = proto::read_frame(&mut self.src, &mut self.buf)
            .map_err(|e| frame_error(e, field.name))?
            .ok_or(ProtocolError::MissingUnit { field: field.name })?;

        if kind != T::KIND.header() {
            return Err(ProtocolError::UnexpectedKind {
                field: field.name,
                expected: T::KIND,
                got: kind,
            }
            .into());
        }

        let Decoded(value) = serde_json::from_slice::<Decoded<T>>(&self.buf).map_err(|source| {
            ProtocolError::Malformed {
                field: field.name,
                source,
            }
        })?;

        self.next += 1;
        Ok(value)
    }

    /// Checks every declared field was read and nothing follows the last one.
    pub fn finish(mut self) -> Result<()> {
        if self.next != self.fields.len() {
            return Err(ProtocolError::Incomplete {
                consumed: self.next,
                declared: self.fields.len(),
            }
            .into());
        }

        if proto::has_more(&mut self.src)? {
            return Err(ProtocolError::TrailingData.into());
        }

        Ok(())
    }
}

fn expect_next(
    fields: &[FieldSpec],
    next: usize,
    field: FieldSpec,
    kind: UnitKind,
) -> std::result::Result<(), ProtocolError> {
    match fields.get(next) {
        Some(declared) if declared.name != field.name => Err(ProtocolError::OutOfOrder {
            expected: Some(declared.name),
            got: field.name,
        }),
        Some(declared) if declared.kind != kind => Err(ProtocolError::UnexpectedKind {
            field: field.name,
            expected: declared.kind,
            got: kind.header(),
        }),
        Some(_) => Ok(()),
        None => Err(ProtocolError::OutOfOrder {
            expected: None,
            got: field.name,
        }),
    }
}

/// Recovers a `ProtocolError` raised by the framing layer, if any.
fn into_protocol(e: io::Error) -> std::result::Result<ProtocolError, io::Error> {
    if e.get_ref().is_some_and(|inner| inner.is::<ProtocolError>()) {
        // SAFETY: Checked to hold a `ProtocolError` just above.
        let inner = e.into_inner().unwrap();
        return Ok(*inner.downcast::<ProtocolError>().unwrap());
    }

    Err(e)
}

fn io_error(e: io::Error) -> ConvertError {
    match into_protocol(e) {
        Ok(protocol) => protocol.into(),
        Err(e) => e.into(),
    }
}

fn frame_error(e: io::Error, field: &'static str) -> ConvertError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        return ProtocolError::Truncated { field }.into();
    }

    io_error(e)
}

fn header_error(e: io::Error, msg: &str) -> ConvertError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        return ProtocolError::BadHeader(msg.into()).into();
    }

    io_error(e)
}
