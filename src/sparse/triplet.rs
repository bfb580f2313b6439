use faer::{Col, ColRef, Mat, MatRef};

use crate::E;
use crate::error::SparseMatrixError;

/// Coordinate-list sparse matrix.
///
/// Entries are stored `(row, column, value)`, 0-indexed internally; the
/// public structure-setting API accepts 1-indexed rows/columns, matching the
/// NLP callback convention (spec §6). `is_symmetric` matrices store only the
/// lower triangle (`row >= column`); consumers that need the full matrix
/// must expand it symmetrically themselves.
#[derive(Debug, Clone)]
pub struct Triplet {
    nrows: usize,
    ncols: usize,
    is_symmetric: bool,
    is_allocated: bool,
    entries: Vec<(usize, usize, E)>,
}

impl Triplet {
    /// Creates an empty, unallocated triplet matrix of the given shape.
    pub fn new(nrows: usize, ncols: usize, is_symmetric: bool) -> Self {
        Self {
            nrows,
            ncols,
            is_symmetric,
            is_allocated: false,
            entries: Vec::new(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn is_symmetric(&self) -> bool {
        self.is_symmetric
    }

    pub fn is_allocated(&self) -> bool {
        self.is_allocated
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Internal 0-indexed `(row, column, value)` view, in the order the
    /// structure was declared. This order is the one a [`super::hb::HarwellBoeing`]
    /// permutation refers back to.
    pub fn entries(&self) -> &[(usize, usize, E)] {
        &self.entries
    }

    /// Declares the sparsity pattern. `rows`/`cols` are 1-indexed. May be
    /// called exactly once.
    pub fn set_structure(&mut self, rows: &[usize], cols: &[usize]) -> Result<(), SparseMatrixError> {
        if self.is_allocated {
            return Err(SparseMatrixError::AlreadyInitialized);
        }
        if rows.len() != cols.len() {
            return Err(SparseMatrixError::DimensionMismatch);
        }

        let mut entries = Vec::with_capacity(rows.len());
        for (&r1, &c1) in rows.iter().zip(cols) {
            if r1 == 0 || c1 == 0 || r1 > self.nrows || c1 > self.ncols {
                return Err(SparseMatrixError::InvalidMatrixIndex);
            }
            let (r, c) = (r1 - 1, c1 - 1);
            if self.is_symmetric && r < c {
                return Err(SparseMatrixError::InvalidMatrixIndex);
            }
            entries.push((r, c, E::from(0.)));
        }

        let mut seen: Vec<(usize, usize)> = entries.iter().map(|&(r, c, _)| (r, c)).collect();
        seen.sort_unstable();
        if seen.windows(2).any(|w| w[0] == w[1]) {
            return Err(SparseMatrixError::DuplicateEntry);
        }

        self.entries = entries;
        self.is_allocated = true;
        Ok(())
    }

    /// Refreshes numeric values in structure order. May be called repeatedly
    /// once the structure is fixed.
    pub fn set_values(&mut self, values: &[E]) -> Result<(), SparseMatrixError> {
        if !self.is_allocated {
            return Err(SparseMatrixError::NotInitialized);
        }
        if values.len() != self.entries.len() {
            return Err(SparseMatrixError::DimensionMismatch);
        }
        for (entry, &v) in self.entries.iter_mut().zip(values) {
            entry.2 = v;
        }
        Ok(())
    }

    /// `r += alpha * M * p`.
    pub fn multiply(&self, p: ColRef<E>, r: &mut Col<E>, alpha: E) -> Result<(), SparseMatrixError> {
        if p.nrows() != self.ncols || r.nrows() != self.nrows {
            return Err(SparseMatrixError::DimensionMismatch);
        }
        for &(i, j, v) in &self.entries {
            r[i] += alpha * v * p[j];
            if self.is_symmetric && i != j {
                r[j] += alpha * v * p[i];
            }
        }
        Ok(())
    }

    /// `r += alpha * M^T * p`.
    pub fn multiply_transpose(&self, p: ColRef<E>, r: &mut Col<E>, alpha: E) -> Result<(), SparseMatrixError> {
        if self.is_symmetric {
            return self.multiply(p, r, alpha);
        }
        if p.nrows() != self.nrows || r.nrows() != self.ncols {
            return Err(SparseMatrixError::DimensionMismatch);
        }
        for &(i, j, v) in &self.entries {
            r[j] += alpha * v * p[i];
        }
        Ok(())
    }

    /// Expands to a dense buffer, mirroring symmetric entries.
    pub fn to_dense(&self) -> Mat<E> {
        let mut m = Mat::<E>::zeros(self.nrows, self.ncols);
        for &(i, j, v) in &self.entries {
            m[(i, j)] += v;
            if self.is_symmetric && i != j {
                m[(j, i)] += v;
            }
        }
        m
    }

    /// Builds a triplet matrix from a dense buffer, auto-detecting symmetry
    /// for square input by comparing `M_ij` to `M_ji` for all `i<j`.
    pub fn from_dense(dense: MatRef<E>) -> Self {
        let nrows = dense.nrows();
        let ncols = dense.ncols();

        let is_symmetric = nrows == ncols
            && (0..ncols).all(|j| {
                (0..j).all(|i| (dense[(i, j)] - dense[(j, i)]).abs() < E::from(1e-12))
            });

        let mut entries = Vec::new();
        for j in 0..ncols {
            for i in 0..nrows {
                if is_symmetric && i < j {
                    continue;
                }
                let v = dense[(i, j)];
                if v != E::from(0.) {
                    entries.push((i, j, v));
                }
            }
        }

        Self {
            nrows,
            ncols,
            is_symmetric,
            is_allocated: true,
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense3() -> Mat<E> {
        Mat::from_fn(3, 3, |i, j| (i as E) * 3. + j as E - 4.)
    }

    #[test]
    fn roundtrip_dense_asymmetric() {
        let dense = dense3();
        let t = Triplet::from_dense(dense.as_ref());
        assert!(!t.is_symmetric());
        assert_eq!(t.to_dense(), dense);
    }

    #[test]
    fn roundtrip_dense_symmetric_lower_only() {
        let mut dense = Mat::<E>::zeros(3, 3);
        for i in 0..3 {
            for j in 0..3 {
                dense[(i, j)] = 1. + (i.min(j) as E);
            }
        }
        let t = Triplet::from_dense(dense.as_ref());
        assert!(t.is_symmetric());
        assert!(t.entries().iter().all(|&(i, j, _)| i >= j));
        assert_eq!(t.to_dense(), dense);
    }

    #[test]
    fn multiply_matches_dense_matvec() {
        let dense = dense3();
        let t = Triplet::from_dense(dense.as_ref());
        let p = Col::<E>::from_fn(3, |i| (i + 1) as E);
        let mut r = Col::<E>::zeros(3);
        t.multiply(p.as_ref(), &mut r, 1.0).unwrap();
        let expected = &dense * &p;
        assert!((r - expected).norm_l2() < 1e-12);
    }

    #[test]
    fn multiply_transpose_matches_dense() {
        let dense = Mat::<E>::from_fn(2, 3, |i, j| (i as E) - 2. * (j as E));
        let t = Triplet::from_dense(dense.as_ref());
        let p = Col::<E>::from_fn(2, |i| (i + 1) as E);
        let mut r = Col::<E>::zeros(3);
        t.multiply_transpose(p.as_ref(), &mut r, 1.0).unwrap();
        let expected = dense.transpose() * &p;
        assert!((r - expected).norm_l2() < 1e-12);
    }

    #[test]
    fn symmetric_multiply_matches_expanded_full_matrix() {
        let mut full = Mat::<E>::zeros(3, 3);
        for i in 0..3 {
            for j in 0..3 {
                full[(i, j)] = 1. + (i.min(j) as E);
            }
        }
        let t = Triplet::from_dense(full.as_ref());
        let p = Col::<E>::from_fn(3, |i| (i as E) - 1.);
        let mut r = Col::<E>::zeros(3);
        t.multiply(p.as_ref(), &mut r, 1.0).unwrap();
        let expected = &full * &p;
        assert!((r - expected).norm_l2() < 1e-12);
    }

    #[test]
    fn set_structure_twice_fails() {
        let mut t = Triplet::new(2, 2, false);
        t.set_structure(&[1], &[1]).unwrap();
        assert_eq!(
            t.set_structure(&[1], &[1]),
            Err(SparseMatrixError::AlreadyInitialized)
        );
    }

    #[test]
    fn set_values_before_structure_fails() {
        let mut t = Triplet::new(2, 2, false);
        assert_eq!(
            t.set_values(&[1.0]),
            Err(SparseMatrixError::NotInitialized)
        );
    }

    #[test]
    fn out_of_range_index_fails() {
        let mut t = Triplet::new(2, 2, false);
        assert_eq!(
            t.set_structure(&[3], &[1]),
            Err(SparseMatrixError::InvalidMatrixIndex)
        );
    }

    #[test]
    fn duplicate_entry_fails() {
        let mut t = Triplet::new(2, 2, false);
        assert_eq!(
            t.set_structure(&[1, 1], &[1, 1]),
            Err(SparseMatrixError::DuplicateEntry)
        );
    }
}
