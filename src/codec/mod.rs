//! Conversions between native matrices/tensors and their nested-sequence form.

pub mod matrix;
pub mod tensor;

pub use matrix::{Matrix, PortableMatrix};
pub use tensor::{PortableTensor, Tensor};
