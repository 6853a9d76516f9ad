use std::{error::Error, fmt, io};

use crate::stream::UnitKind;

/// The crate's result type.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// A portable matrix or tensor violates the rectangularity invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// The outer sequence is empty.
    NoRows,
    /// The first row is empty.
    NoColumns,
    /// A row's length differs from the first row's.
    UnevenColumns {
        row: usize,
        got: usize,
        expected: usize,
    },
    /// A portable tensor without a single slice.
    NoSlices,
    /// A tensor slice failed to convert.
    Slice {
        index: usize,
        source: Box<ShapeError>,
    },
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRows => write!(f, "input array with 0 rows"),
            Self::NoColumns => write!(f, "input array with 0 columns"),
            Self::UnevenColumns { row, got, expected } => write!(
                f,
                "input array with uneven columns: row {row} has {got}, expected {expected}"
            ),
            Self::NoSlices => write!(f, "input tensor with 0 slices"),
            Self::Slice { index, source } => write!(f, "slice {index}: {source}"),
        }
    }
}

impl Error for ShapeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Slice { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// The unit stream does not follow the declared field list of its schema.
#[derive(Debug)]
pub enum ProtocolError {
    /// The stream does not start with a valid header frame.
    BadHeader(String),
    /// The stream was written for another schema.
    SchemaMismatch {
        expected: &'static str,
        got: String,
    },
    /// The stream ended before every declared field was read.
    MissingUnit { field: &'static str },
    /// The stream ended in the middle of a field's frame.
    Truncated { field: &'static str },
    /// A unit of the wrong container kind sits at this field's position.
    UnexpectedKind {
        field: &'static str,
        expected: UnitKind,
        got: u32,
    },
    /// A field was read or written out of its declared position.
    OutOfOrder {
        expected: Option<&'static str>,
        got: &'static str,
    },
    /// Not every declared field was consumed.
    Incomplete { consumed: usize, declared: usize },
    /// More data follows the last declared field.
    TrailingData,
    /// A frame body is larger than the accepted limit.
    FrameTooLarge { len: u64, limit: u64 },
    /// A unit body could not be decoded.
    Malformed {
        field: &'static str,
        source: serde_json::Error,
    },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadHeader(msg) => write!(f, "bad stream header: {msg}"),
            Self::SchemaMismatch { expected, got } => {
                write!(f, "stream holds a {got} model, expected {expected}")
            }
            Self::MissingUnit { field } => write!(f, "stream ended before field {field}"),
            Self::Truncated { field } => write!(f, "stream ended inside field {field}"),
            Self::UnexpectedKind {
                field,
                expected,
                got,
            } => write!(
                f,
                "field {field}: expected a {expected} unit, got kind header {got}"
            ),
            Self::OutOfOrder {
                expected: Some(expected),
                got,
            } => write!(f, "field {got} used where {expected} is declared"),
            Self::OutOfOrder {
                expected: None,
                got,
            } => write!(f, "field {got} used after the last declared field"),
            Self::Incomplete { consumed, declared } => {
                write!(f, "only {consumed} of {declared} declared fields were used")
            }
            Self::TrailingData => write!(f, "unexpected data after the last field"),
            Self::FrameTooLarge { len, limit } => {
                write!(f, "frame body of {len} bytes exceeds the {limit} bytes limit")
            }
            Self::Malformed { field, source } => write!(f, "field {field}: {source}"),
        }
    }
}

impl Error for ProtocolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// All errors that abort a conversion.
#[derive(Debug)]
pub enum ConvertError {
    /// Portable data violates a matrix invariant.
    Shape(ShapeError),
    /// The unit stream does not match the schema.
    Protocol(ProtocolError),
    /// Invalid selection, caught before any file is opened.
    Config(String),
    /// The native store rejected a file.
    Native(String),
    /// An underlying I/O error.
    Io(io::Error),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(e) => write!(f, "shape error: {e}"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::Config(msg) => write!(f, "invalid config: {msg}"),
            Self::Native(msg) => write!(f, "native store error: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for ConvertError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Shape(e) => Some(e),
            Self::Protocol(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for ConvertError {
    fn from(e: ShapeError) -> Self {
        Self::Shape(e)
    }
}

impl From<ProtocolError> for ConvertError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<io::Error> for ConvertError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
