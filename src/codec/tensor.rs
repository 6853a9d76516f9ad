use super::matrix::{self, Matrix, PortableMatrix};
use crate::ShapeError;

/// The nested-sequence form of a `Tensor`, one portable matrix per slice.
pub type PortableTensor = Vec<PortableMatrix>;

/// An ordered, non-empty stack of matrices.
///
/// Slices are validated independently and may differ in shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor(Vec<Matrix>);

impl Tensor {
    /// Creates a new `Tensor` out of its slices.
    ///
    /// # Errors
    /// Returns `ShapeError::NoSlices` if `slices` is empty.
    pub fn new(slices: Vec<Matrix>) -> Result<Self, ShapeError> {
        if slices.is_empty() {
            return Err(ShapeError::NoSlices);
        }

        Ok(Self(slices))
    }

    pub fn num_slices(&self) -> usize {
        self.0.len()
    }

    pub fn slice(&self, index: usize) -> Option<&Matrix> {
        self.0.get(index)
    }

    pub fn slices(&self) -> &[Matrix] {
        &self.0
    }
}

/// Converts every slice of `tensor` into its portable form, in order.
pub fn to_portable(tensor: &Tensor) -> PortableTensor {
    tensor.0.iter().map(matrix::to_portable).collect()
}

/// Rebuilds a tensor from its portable form.
///
/// # Errors
/// Returns the first failing slice's `ShapeError`, tagged with its index.
pub fn from_portable(portable: &PortableTensor) -> Result<Tensor, ShapeError> {
    let slices = portable
        .iter()
        .enumerate()
        .map(|(index, slice)| {
            matrix::from_portable(slice).map_err(|e| ShapeError::Slice {
                index,
                source: Box::new(e),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Tensor::new(slices)
}
