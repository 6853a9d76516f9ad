//! The fixed field lists of the supported model schemas.
//!
//! Every schema declares its ordered `FIELDS` and writes/reads them in
//! lock-step through the unit stream. The field list is part of the format.

pub mod parser;
pub mod sentiment;

use std::io::{Read, Write};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    Result,
    stream::{FieldSpec, UnitBody, UnitKind, UnitReader, UnitValue, UnitWriter},
};

pub use parser::{DvModel, Parser, ParserModel, ParserSchema, Reranker};
pub use sentiment::{SentimentModel, SentimentSchema};

/// A value carried through the conversion untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Opaque(serde_json::Value);

impl Opaque {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl UnitBody for Opaque {
    fn encode<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.serialize(s)
    }

    fn decode<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        Self::deserialize(d)
    }
}

impl UnitValue for Opaque {
    const KIND: UnitKind = UnitKind::Opaque;
}

/// The field protocol of a single model kind.
pub trait Schema {
    /// The name written into the stream header.
    const NAME: &'static str;

    /// The ordered field list, written and read in this exact order.
    const FIELDS: &'static [FieldSpec];

    /// What the write sequence consumes.
    type Source;

    /// What the read sequence rebuilds.
    type Model;

    /// Writes every field of `source` into `out`, in declaration order.
    fn write_fields<W: Write>(source: &Self::Source, out: &mut UnitWriter<W>) -> Result<()>;

    /// Reads every field from `units`, in declaration order, and rebuilds the model.
    fn read_fields<R: Read>(units: &mut UnitReader<R>) -> Result<Self::Model>;
}

/// Writes the full portable stream of `source` into `sink`.
///
/// # Returns
/// The underlying writer, flushed.
pub fn write<S: Schema, W: Write>(source: &S::Source, sink: W) -> Result<W> {
    let mut out = UnitWriter::new(sink, S::NAME, S::FIELDS)?;
    S::write_fields(source, &mut out)?;
    let sink = out.finish()?;

    log::info!("wrote {} fields of a {} model", S::FIELDS.len(), S::NAME);
    Ok(sink)
}

/// Reads a full portable stream from `src` and rebuilds its model.
///
/// # Errors
/// Any `ProtocolError` or `ShapeError` aborts the read; no partial model is returned.
pub fn read<S: Schema, R: Read>(src: R) -> Result<S::Model> {
    let mut units = UnitReader::open(src, S::NAME, S::FIELDS)?;
    let model = S::read_fields(&mut units)?;
    units.finish()?;

    log::info!("read {} fields of a {} model", S::FIELDS.len(), S::NAME);
    Ok(model)
}
