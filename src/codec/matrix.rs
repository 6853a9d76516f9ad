use ndarray::Array2;

use crate::ShapeError;

/// The nested-sequence form of a `Matrix`, one inner sequence per row.
pub type PortableMatrix = Vec<Vec<f64>>;

/// A dense, non-empty, rectangular grid of numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix(Array2<f64>);

impl Matrix {
    /// Returns the number of rows.
    pub fn nrows(&self) -> usize {
        self.0.nrows()
    }

    /// Returns the number of columns.
    pub fn ncols(&self) -> usize {
        self.0.ncols()
    }

    /// Returns the value at `(row, col)` if it is in bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.0.get((row, col)).copied()
    }

    /// Iterates over every value in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().copied()
    }
}

impl TryFrom<Array2<f64>> for Matrix {
    type Error = ShapeError;

    fn try_from(array: Array2<f64>) -> Result<Self, Self::Error> {
        if array.nrows() == 0 {
            return Err(ShapeError::NoRows);
        }
        if array.ncols() == 0 {
            return Err(ShapeError::NoColumns);
        }

        Ok(Self(array))
    }
}

/// Converts a matrix into its portable form.
///
/// # Arguments
/// * `matrix` - The matrix to convert.
///
/// # Returns
/// One inner sequence per row, values in column order.
pub fn to_portable(matrix: &Matrix) -> PortableMatrix {
    matrix.0.outer_iter().map(|row| row.to_vec()).collect()
}

/// Rebuilds a matrix from its portable form.
///
/// # Arguments
/// * `portable` - Rows of values.
///
/// # Errors
/// Returns a `ShapeError` if there are no rows, the first row is empty or any
/// row's length differs from the first's.
pub fn from_portable(portable: &PortableMatrix) -> Result<Matrix, ShapeError> {
    let Some(first) = portable.first() else {
        return Err(ShapeError::NoRows);
    };

    let cols = first.len();
    if cols == 0 {
        return Err(ShapeError::NoColumns);
    }

    if let Some((row, uneven)) = portable
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, row)| row.len() != cols)
    {
        return Err(ShapeError::UnevenColumns {
            row,
            got: uneven.len(),
            expected: cols,
        });
    }

    let array = Array2::from_shape_fn((portable.len(), cols), |(i, j)| portable[i][j]);
    Ok(Matrix(array))
}
