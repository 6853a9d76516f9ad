//! Conversion of trained model parameters between their native form and a
//! portable form made only of nested numeric sequences, string-keyed maps and
//! opaque pass-through values.
//!
//! A conversion is either `old` (native to portable) or `new` (portable to
//! native), for a `sentiment` model or a `dvparser` model with its reranker.

pub mod codec;
pub mod config;
pub mod driver;
mod error;
pub mod keyed;
pub mod native;
pub mod schema;
pub mod stream;

pub use config::{ConvertConfig, ModelKind, Stage};
pub use driver::{Outcome, convert};
pub use error::{ConvertError, ProtocolError, Result, ShapeError};
pub use native::{NativeStore, SafetensorsStore};
