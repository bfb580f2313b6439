use faer::{Col, ColRef};

use crate::E;
use crate::error::SparseMatrixError;
use crate::sparse::triplet::Triplet;

/// Storage orientation of a [`HarwellBoeing`] matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HbLayout {
    /// Compressed-row: entries sorted by row then column.
    Csr,
    /// Compressed-column: entries sorted by column then row.
    Csc,
}

/// A quadruple describing an identity block to splice into a
/// [`HarwellBoeing`] structure at build time: `multiplicator * I_dimension`
/// placed with its top-left corner at `(row_offset, col_offset)`.
///
/// For the canonical elastic QP Jacobian `[J | +I | -I]`, two such blocks
/// are placed at `row_offset = 0`, `col_offset = n` and `col_offset = n + m`,
/// each of `dimension = m`, with multiplicators `+1` and `-1`.
#[derive(Debug, Clone, Copy)]
pub struct IdentityBlock {
    pub row_offset: usize,
    pub col_offset: usize,
    pub dimension: usize,
    pub multiplicator: E,
}

/// Compressed-row or compressed-column sparse matrix built from a
/// [`Triplet`] plus optional spliced-in identity blocks.
///
/// Carries a triplet-order permutation `perm`: `perm[k]` is the position in
/// `idx`/`values` occupied by the `k`-th entry of the source triplet (in the
/// order the triplet declared its structure). Refreshing values after the
/// structure is fixed is therefore `O(nnz)` with unit stride over the
/// triplet's own value array — no re-sort is ever needed. Identity-block
/// entries are written once at structure time, never refreshed, and have no
/// corresponding `perm` entry. A symmetric source triplet keeps its
/// lower-triangle-only storage convention here too; callers that need the
/// full matrix expand it the same way [`Triplet::to_dense`] does.
pub struct HarwellBoeing {
    layout: HbLayout,
    nrows: usize,
    ncols: usize,
    is_symmetric: bool,
    /// Length `dim + 1` (`dim = nrows` for CSR, `ncols` for CSC).
    ptr: Vec<usize>,
    /// Length `nnz`: column indices (CSR) or row indices (CSC).
    idx: Vec<usize>,
    values: Vec<E>,
    /// `perm[k]` = position of the `k`-th triplet entry in `idx`/`values`.
    perm: Vec<usize>,
    n_triplet: usize,
    is_allocated: bool,
}

impl HarwellBoeing {
    /// Creates an empty, unallocated matrix of the given shape and layout.
    pub fn new(layout: HbLayout, nrows: usize, ncols: usize) -> Self {
        Self {
            layout,
            nrows,
            ncols,
            is_symmetric: false,
            ptr: Vec::new(),
            idx: Vec::new(),
            values: Vec::new(),
            perm: Vec::new(),
            n_triplet: 0,
            is_allocated: false,
        }
    }

    pub fn layout(&self) -> HbLayout {
        self.layout
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn is_allocated(&self) -> bool {
        self.is_allocated
    }

    /// Fixes the sparsity pattern from `triplet` plus any spliced-in
    /// `identities`, and computes the triplet-order permutation. May be
    /// called exactly once.
    pub fn set_structure(
        &mut self,
        triplet: &Triplet,
        identities: &[IdentityBlock],
    ) -> Result<(), SparseMatrixError> {
        if self.is_allocated {
            return Err(SparseMatrixError::AlreadyInitialized);
        }

        self.is_symmetric = triplet.is_symmetric();
        self.n_triplet = triplet.nnz();

        // (primary key, secondary key, row, col, value, source triplet index)
        let mut combined: Vec<(usize, usize, usize, usize, E, Option<usize>)> = Vec::new();

        for (k, &(row, col, val)) in triplet.entries().iter().enumerate() {
            if row >= self.nrows || col >= self.ncols {
                return Err(SparseMatrixError::InvalidMatrixIndex);
            }
            let (primary, secondary) = self.keys(row, col);
            combined.push((primary, secondary, row, col, val, Some(k)));
        }

        for block in identities {
            if block.dimension == 0 {
                continue;
            }
            let max_row = block.row_offset + block.dimension;
            let max_col = block.col_offset + block.dimension;
            if max_row > self.nrows || max_col > self.ncols {
                return Err(SparseMatrixError::InvalidMatrixIndex);
            }
            for k in 0..block.dimension {
                let row = block.row_offset + k;
                let col = block.col_offset + k;
                let (primary, secondary) = self.keys(row, col);
                combined.push((primary, secondary, row, col, block.multiplicator, None));
            }
        }

        combined.sort_by_key(|&(p, s, ..)| (p, s));

        if combined
            .windows(2)
            .any(|w| (w[0].2, w[0].3) == (w[1].2, w[1].3))
        {
            return Err(SparseMatrixError::DuplicateEntry);
        }

        let dim = self.primary_dim();
        let mut ptr = vec![0usize; dim + 1];
        let mut idx = Vec::with_capacity(combined.len());
        let mut values = Vec::with_capacity(combined.len());
        let mut perm = vec![0usize; self.n_triplet];

        for &(primary, _secondary, row, col, value, triplet_index) in &combined {
            ptr[primary + 1] += 1;
            idx.push(self.secondary_index(row, col));
            values.push(value);
            if let Some(k) = triplet_index {
                perm[k] = idx.len() - 1;
            }
        }
        for i in 0..dim {
            ptr[i + 1] += ptr[i];
        }

        self.ptr = ptr;
        self.idx = idx;
        self.values = values;
        self.perm = perm;
        self.is_allocated = true;
        Ok(())
    }

    /// Refreshes numeric values from `triplet` in `O(nnz)` via the
    /// triplet-order permutation. Requires the same entry count the
    /// structure was built from.
    pub fn set_values(&mut self, triplet: &Triplet) -> Result<(), SparseMatrixError> {
        if !self.is_allocated {
            return Err(SparseMatrixError::NotInitialized);
        }
        if triplet.nnz() != self.n_triplet {
            return Err(SparseMatrixError::DimensionMismatch);
        }
        for (k, &(.., v)) in triplet.entries().iter().enumerate() {
            self.values[self.perm[k]] = v;
        }
        Ok(())
    }

    /// Reconstructs a [`Triplet`] with the same nonzero set and values.
    pub fn to_triplet(&self) -> Triplet {
        let mut rows_1idx = Vec::with_capacity(self.nnz());
        let mut cols_1idx = Vec::with_capacity(self.nnz());
        let mut vals = Vec::with_capacity(self.nnz());

        let dim = self.primary_dim();
        for primary in 0..dim {
            for k in self.ptr[primary]..self.ptr[primary + 1] {
                let secondary = self.idx[k];
                let (row, col) = match self.layout {
                    HbLayout::Csr => (primary, secondary),
                    HbLayout::Csc => (secondary, primary),
                };
                rows_1idx.push(row + 1);
                cols_1idx.push(col + 1);
                vals.push(self.values[k]);
            }
        }

        let mut t = Triplet::new(self.nrows, self.ncols, self.is_symmetric);
        t.set_structure(&rows_1idx, &cols_1idx)
            .expect("HB structure is always internally consistent");
        t.set_values(&vals).expect("value count matches structure count");
        t
    }

    /// `r += alpha * M * p`. For a symmetric matrix (lower-triangle storage)
    /// this reflects the implicit upper triangle, matching [`Triplet::multiply`].
    pub fn multiply(&self, p: ColRef<E>, r: &mut Col<E>, alpha: E) -> Result<(), SparseMatrixError> {
        if p.nrows() != self.ncols || r.nrows() != self.nrows {
            return Err(SparseMatrixError::DimensionMismatch);
        }
        match self.layout {
            HbLayout::Csr => {
                for row in 0..self.nrows {
                    let mut acc = E::from(0.);
                    for k in self.ptr[row]..self.ptr[row + 1] {
                        let col = self.idx[k];
                        acc += self.values[k] * p[col];
                        if self.is_symmetric && row != col {
                            r[col] += alpha * self.values[k] * p[row];
                        }
                    }
                    r[row] += alpha * acc;
                }
            }
            HbLayout::Csc => {
                for col in 0..self.ncols {
                    let pj = p[col];
                    for k in self.ptr[col]..self.ptr[col + 1] {
                        let row = self.idx[k];
                        r[row] += alpha * self.values[k] * pj;
                        if self.is_symmetric && row != col {
                            r[col] += alpha * self.values[k] * p[row];
                        }
                    }
                }
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
        match self.layout {
            HbLayout::Csr => {
                for row in 0..self.nrows {
                    let pi = p[row];
                    for k in self.ptr[row]..self.ptr[row + 1] {
                        r[self.idx[k]] += alpha * self.values[k] * pi;
                    }
                }
            }
            HbLayout::Csc => {
                for col in 0..self.ncols {
                    let mut acc = E::from(0.);
                    for k in self.ptr[col]..self.ptr[col + 1] {
                        acc += self.values[k] * p[self.idx[k]];
                    }
                    r[col] += alpha * acc;
                }
            }
        }
        Ok(())
    }

    fn primary_dim(&self) -> usize {
        match self.layout {
            HbLayout::Csr => self.nrows,
            HbLayout::Csc => self.ncols,
        }
    }

    fn secondary_index(&self, row: usize, col: usize) -> usize {
        match self.layout {
            HbLayout::Csr => col,
            HbLayout::Csc => row,
        }
    }

    /// Returns `(primary, secondary)` sort keys for `(row, col)` under this
    /// layout: row-major for CSR, column-major for CSC.
    fn keys(&self, row: usize, col: usize) -> (usize, usize) {
        match self.layout {
            HbLayout::Csr => (row, col),
            HbLayout::Csc => (col, row),
        }
    }
}

#[cfg(test)]
mod tests {
    use faer::Mat;

    use super::*;

    fn sample_triplet() -> Triplet {
        // [ 4 0 1 ]
        // [ 0 3 2 ]
        let mut t = Triplet::new(2, 3, false);
        t.set_structure(&[1, 2, 1, 2], &[1, 2, 3, 3]).unwrap();
        t.set_values(&[4.0, 3.0, 1.0, 2.0]).unwrap();
        t
    }

    #[test]
    fn csr_roundtrip_same_nonzero_set() {
        let t = sample_triplet();
        let mut hb = HarwellBoeing::new(HbLayout::Csr, 2, 3);
        hb.set_structure(&t, &[]).unwrap();
        let back = hb.to_triplet();
        let mut expected: Vec<_> = t.entries().to_vec();
        let mut got: Vec<_> = back.entries().to_vec();
        expected.sort_by_key(|&(r, c, _)| (r, c));
        got.sort_by_key(|&(r, c, _)| (r, c));
        assert_eq!(expected, got);
    }

    #[test]
    fn csc_roundtrip_same_nonzero_set() {
        let t = sample_triplet();
        let mut hb = HarwellBoeing::new(HbLayout::Csc, 2, 3);
        hb.set_structure(&t, &[]).unwrap();
        let back = hb.to_triplet();
        let mut expected: Vec<_> = t.entries().to_vec();
        let mut got: Vec<_> = back.entries().to_vec();
        expected.sort_by_key(|&(r, c, _)| (r, c));
        got.sort_by_key(|&(r, c, _)| (r, c));
        assert_eq!(expected, got);
    }

    #[test]
    fn value_refresh_is_permutation_driven() {
        let mut t = sample_triplet();
        let mut hb = HarwellBoeing::new(HbLayout::Csr, 2, 3);
        hb.set_structure(&t, &[]).unwrap();

        t.set_values(&[40.0, 30.0, 10.0, 20.0]).unwrap();
        hb.set_values(&t).unwrap();

        let dense = hb.to_triplet().to_dense();
        assert_eq!(dense, t.to_dense());
    }

    #[test]
    fn identity_block_splicing_elastic_jacobian() {
        // J = [ 1 2 ] (1x2), elastic Jacobian = [J | I | -I] (1x4)
        let mut j = Triplet::new(1, 2, false);
        j.set_structure(&[1, 1], &[1, 2]).unwrap();
        j.set_values(&[1.0, 2.0]).unwrap();

        let identities = [
            IdentityBlock { row_offset: 0, col_offset: 2, dimension: 1, multiplicator: 1.0 },
            IdentityBlock { row_offset: 0, col_offset: 3, dimension: 1, multiplicator: -1.0 },
        ];

        let mut hb = HarwellBoeing::new(HbLayout::Csr, 1, 4);
        hb.set_structure(&j, &identities).unwrap();

        let dense = hb.to_triplet().to_dense();
        let expected = Mat::<E>::from_fn(1, 4, |_, c| match c {
            0 => 1.0,
            1 => 2.0,
            2 => 1.0,
            3 => -1.0,
            _ => unreachable!(),
        });
        assert_eq!(dense, expected);
    }

    #[test]
    fn multiply_matches_dense_matvec() {
        let t = sample_triplet();
        let mut hb = HarwellBoeing::new(HbLayout::Csc, 2, 3);
        hb.set_structure(&t, &[]).unwrap();

        let p = Col::<E>::from_fn(3, |i| (i + 1) as E);
        let mut r = Col::<E>::zeros(2);
        hb.multiply(p.as_ref(), &mut r, 1.0).unwrap();

        let expected = &t.to_dense() * &p;
        assert!((r - expected).norm_l2() < 1e-12);
    }
}
