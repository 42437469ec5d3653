//! Linear operators on vectors of per-vertex values.

use nalgebra as na;
use nalgebra_sparse as nas;

use itertools::izip;

//
// traits
//

/// A linear map from vertex values to vertex values.
pub trait Operator {
    /// Apply this operator to a vector of values.
    fn apply(&self, input: &na::DVector<f64>) -> na::DVector<f64>;
    /// Convert this operator into a CSR matrix.
    fn into_csr(self) -> nas::CsrMatrix<f64>;
}

//
// concrete operators
//

/// A diagonal matrix operator, such as the lumped mass matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct DiagonalOperator {
    // a diagonal vector is a more efficient form of storage than a CSR matrix.
    // this is converted to a matrix when one is needed
    diagonal: na::DVector<f64>,
}

impl DiagonalOperator {
    #[inline]
    pub fn diagonal(&self) -> &na::DVector<f64> {
        &self.diagonal
    }
}

impl Operator for DiagonalOperator {
    fn apply(&self, input: &na::DVector<f64>) -> na::DVector<f64> {
        na::DVector::from_iterator(
            input.len(),
            izip!(self.diagonal.iter(), input.iter()).map(|(&diag_val, &in_val)| diag_val * in_val),
        )
    }

    fn into_csr(self) -> nas::CsrMatrix<f64> {
        // nalgebra doesn't have a method to construct CSR directly from a diagonal.
        // construct an identity matrix to get the right sparsity pattern
        // and then replace the entries
        let mut csr = nas::CsrMatrix::identity(self.diagonal.len());
        for (&diag, mat_diag) in self.diagonal.iter().zip(csr.values_mut()) {
            *mat_diag = diag;
        }
        csr
    }
}

impl From<na::DVector<f64>> for DiagonalOperator {
    fn from(diagonal: na::DVector<f64>) -> Self {
        Self { diagonal }
    }
}

/// A general sparse matrix operator,
/// e.g. an assembled system matrix or Jacobian.
#[derive(Clone, Debug, PartialEq)]
pub struct MatrixOperator {
    mat: nas::CsrMatrix<f64>,
}

impl MatrixOperator {
    /// Access the underlying matrix.
    #[inline]
    pub fn matrix(&self) -> &nas::CsrMatrix<f64> {
        &self.mat
    }
}

impl Operator for MatrixOperator {
    fn apply(&self, input: &na::DVector<f64>) -> na::DVector<f64> {
        &self.mat * input
    }

    fn into_csr(self) -> nas::CsrMatrix<f64> {
        self.mat
    }
}

impl From<nas::CsrMatrix<f64>> for MatrixOperator {
    fn from(mat: nas::CsrMatrix<f64>) -> Self {
        Self { mat }
    }
}

impl From<DiagonalOperator> for MatrixOperator {
    fn from(s: DiagonalOperator) -> Self {
        Self { mat: s.into_csr() }
    }
}

//
// helper functions
//

/// Takes a square CSR matrix and replaces some of its rows
/// with rows that only have a value on the diagonal.
/// `None` leaves the row as is.
///
/// Used to impose Dirichlet conditions on assembled systems.
pub(crate) fn replace_csr_rows(
    mat: nas::CsrMatrix<f64>,
    replacements: &[Option<f64>],
) -> nas::CsrMatrix<f64> {
    let num_rows = mat.nrows();
    let num_cols = mat.ncols();
    let (row_offsets, col_indices, values) = mat.disassemble();

    let mut new_offsets = Vec::with_capacity(row_offsets.len());
    let mut new_cols = Vec::with_capacity(col_indices.len());
    let mut new_values = Vec::with_capacity(values.len());
    new_offsets.push(0);
    for row_idx in 0..num_rows {
        match replacements.get(row_idx).copied().flatten() {
            Some(diag) => {
                new_cols.push(row_idx);
                new_values.push(diag);
            }
            None => {
                let old_row_range = row_offsets[row_idx]..row_offsets[row_idx + 1];
                new_cols.extend_from_slice(&col_indices[old_row_range.clone()]);
                new_values.extend_from_slice(&values[old_row_range]);
            }
        }
        new_offsets.push(new_cols.len());
    }

    nas::CsrMatrix::try_from_csr_data(num_rows, num_cols, new_offsets, new_cols, new_values)
        .expect("Row replacement produced an invalid matrix. This is a bug in finvol")
}

//
// tests
//
