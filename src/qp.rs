//! The elastic QP subproblem and its builder (spec §4.2).
//!
//! At every SQP iterate the driver needs
//!
//! ```text
//! minimize_{p,u,v}   1/2 p^T H_k p + grad_f_k^T p + rho * sum(u + v)
//! subject to         c_L - c_k <= J_k p + u - v <= c_U - c_k
//!                    max(x_L - x_k, -Delta) <= p <= min(x_U - x_k, Delta)
//!                    0 <= u, v  (sentinel upper bound, spec §3)
//! ```
//!
//! staged as one QP of `n_qp = n + 2m` variables against a [`QpBackend`], with
//! the block-diagonal Hessian `[H_k 0; 0 0]` and the spliced Jacobian
//! `[J_k I -I]` built once and refreshed by value thereafter.

use faer::Col;

use crate::backend::{QpBackend, Statistics};
use crate::error::QpBuilderError;
use crate::sparse::{HarwellBoeing, HbLayout, IdentityBlock, Triplet};
use crate::types::{ActiveType, UpdateFlags, BOUND_INFINITY};
use crate::E;

/// The QP's solution, read back after a successful solve.
pub struct QpSolution {
    pub p: Col<E>,
    pub u: Col<E>,
    pub v: Col<E>,
    pub q: E,
    pub lambda_c: Col<E>,
    pub lambda_b: Col<E>,
    pub bound_working_set: Vec<ActiveType>,
    pub constraint_working_set: Vec<ActiveType>,
}

/// Assembles and re-solves the elastic QP subproblem against a back end `B`.
pub struct ElasticQpBuilder<B: QpBackend> {
    n: usize,
    m: usize,
    n_qp: usize,
    rho: E,
    backend: B,
    h_triplet: Triplet,
    a_triplet: Triplet,
    h_hb: HarwellBoeing,
    a_hb: HarwellBoeing,
    g: Col<E>,
    lb: Col<E>,
    ub: Col<E>,
    lb_a: Col<E>,
    ub_a: Col<E>,
    pending: UpdateFlags,
    solved_once: bool,
}

impl<B: QpBackend> ElasticQpBuilder<B> {
    /// `jacobian_structure`/`hessian_structure` are the NLP's fixed 1-indexed
    /// `(rows, cols)` pairs (spec §6); the Hessian is lower-triangle only.
    pub fn new(
        n: usize,
        m: usize,
        jacobian_structure: (Vec<usize>, Vec<usize>),
        hessian_structure: (Vec<usize>, Vec<usize>),
        qp_iter_max: usize,
        lp_iter_max: usize,
        active_set_tol: E,
    ) -> Result<Self, QpBuilderError> {
        let n_qp = n + 2 * m;

        let mut h_triplet = Triplet::new(n_qp, n_qp, true);
        h_triplet.set_structure(&hessian_structure.0, &hessian_structure.1)?;

        let mut a_triplet = Triplet::new(m, n_qp, false);
        a_triplet.set_structure(&jacobian_structure.0, &jacobian_structure.1)?;

        let mut h_hb = HarwellBoeing::new(HbLayout::Csc, n_qp, n_qp);
        h_hb.set_structure(&h_triplet, &[])?;

        let identities = [
            IdentityBlock {
                row_offset: 0,
                col_offset: n,
                dimension: m,
                multiplicator: 1.0,
            },
            IdentityBlock {
                row_offset: 0,
                col_offset: n + m,
                dimension: m,
                multiplicator: -1.0,
            },
        ];
        let mut a_hb = HarwellBoeing::new(HbLayout::Csc, m, n_qp);
        a_hb.set_structure(&a_triplet, &identities)?;

        let mut backend = B::new(n_qp, m);
        backend.configure_limits(qp_iter_max, lp_iter_max, active_set_tol);
        backend
            .set_structure(&h_hb, &a_hb)
            .map_err(|_| QpBuilderError::NotInitialized)?;

        let mut ub = Col::<E>::zeros(n_qp);
        for i in n..n_qp {
            ub[i] = BOUND_INFINITY;
        }
        let lb = Col::<E>::zeros(n_qp);
        backend.set_bounds(&lb, &ub);

        Ok(Self {
            n,
            m,
            n_qp,
            rho: 1.0,
            backend,
            h_triplet,
            a_triplet,
            h_hb,
            a_hb,
            g: Col::zeros(n_qp),
            lb,
            ub,
            lb_a: Col::zeros(m),
            ub_a: Col::zeros(m),
            pending: UpdateFlags::none(),
            solved_once: false,
        })
    }

    pub fn n_qp(&self) -> usize {
        self.n_qp
    }

    /// Refreshes `H_k` (the NLP's Hessian values, already scaled by the
    /// caller's `sigma`) and marks it for push to the back end.
    pub fn stage_hessian(&mut self, values: &[E]) -> Result<(), QpBuilderError> {
        self.h_triplet.set_values(values)?;
        self.pending.h = true;
        Ok(())
    }

    /// Refreshes `J_k`.
    pub fn stage_jacobian(&mut self, values: &[E]) -> Result<(), QpBuilderError> {
        self.a_triplet.set_values(values)?;
        self.pending.a = true;
        Ok(())
    }

    pub fn stage_gradient(&mut self, grad_f: &Col<E>) -> Result<(), QpBuilderError> {
        if grad_f.nrows() != self.n {
            return Err(QpBuilderError::Sparse(crate::error::SparseMatrixError::DimensionMismatch));
        }
        for i in 0..self.n {
            self.g[i] = grad_f[i];
        }
        self.pending.g = true;
        Ok(())
    }

    /// Updates the penalty parameter's contribution to the linear term
    /// (spec §4.4's `rho * sum(u + v)`).
    pub fn stage_penalty(&mut self, rho: E) {
        self.rho = rho;
        for i in self.n..self.n_qp {
            self.g[i] = rho;
        }
        self.pending.g = true;
        self.pending.penalty = true;
    }

    /// `lb_p = max(x_L - x_k, -Delta)`, `ub_p = min(x_U - x_k, Delta)`
    /// (spec §4.2). Implies [`UpdateFlags::delta`] even when only `Delta`
    /// moved (the bounds⇒delta invariant, spec §3).
    pub fn stage_bounds(&mut self, x: &Col<E>, x_l: &Col<E>, x_u: &Col<E>, delta: E) -> Result<(), QpBuilderError> {
        if x.nrows() != self.n || x_l.nrows() != self.n || x_u.nrows() != self.n {
            return Err(QpBuilderError::Sparse(crate::error::SparseMatrixError::DimensionMismatch));
        }
        for i in 0..self.n {
            self.lb[i] = (x_l[i] - x[i]).max(-delta);
            self.ub[i] = (x_u[i] - x[i]).min(delta);
        }
        self.pending.flag_bounds();
        Ok(())
    }

    /// Only `Delta` moved; `x`, `x_L`, `x_U` unchanged since the last call
    /// to [`ElasticQpBuilder::stage_bounds`]. Avoids re-deriving the bound
    /// translation from scratch (spec §4.2's trust-region-only update path).
    pub fn stage_delta_only(&mut self, x: &Col<E>, x_l: &Col<E>, x_u: &Col<E>, delta: E) -> Result<(), QpBuilderError> {
        self.stage_bounds(x, x_l, x_u, delta)?;
        self.pending.bounds = false;
        self.pending.delta = true;
        Ok(())
    }

    pub fn stage_constraint_bounds(&mut self, c: &Col<E>, c_l: &Col<E>, c_u: &Col<E>) -> Result<(), QpBuilderError> {
        if c.nrows() != self.m {
            return Err(QpBuilderError::Sparse(crate::error::SparseMatrixError::DimensionMismatch));
        }
        for i in 0..self.m {
            self.lb_a[i] = c_l[i] - c[i];
            self.ub_a[i] = c_u[i] - c[i];
        }
        self.pending.bounds = true;
        Ok(())
    }

    /// Pushes every pending staged quantity to the back end and solves.
    /// Returns [`QpBuilderError::QpUnchanged`] if nothing was staged since
    /// the previous successful solve.
    pub fn solve(&mut self, stats: &mut Statistics) -> Result<QpSolution, QpBuilderError> {
        if self.solved_once && !self.pending.any() {
            return Err(QpBuilderError::QpUnchanged);
        }

        let matrix_changed = self.pending.a || self.pending.h;
        let hot_start = self.solved_once && !matrix_changed;

        if self.pending.h {
            self.h_hb.set_values(&self.h_triplet)?;
            self.backend
                .set_h_values(&self.h_hb)
                .map_err(|_| QpBuilderError::NotInitialized)?;
        }
        if self.pending.a {
            self.a_hb.set_values(&self.a_triplet)?;
            self.backend
                .set_a_values(&self.a_hb)
                .map_err(|_| QpBuilderError::NotInitialized)?;
        }
        if self.pending.g {
            self.backend.set_g(&self.g);
        }
        if self.pending.bounds || self.pending.delta {
            self.backend.set_bounds(&self.lb, &self.ub);
            self.backend.set_constraint_bounds(&self.lb_a, &self.ub_a);
        }

        let status = self
            .backend
            .optimize_qp(hot_start, stats)
            .map_err(|_| QpBuilderError::NotInitialized)?;

        self.solved_once = true;
        self.pending = UpdateFlags::none();

        self.extract_solution(status)
    }

    /// Solves the same staged data with the Hessian treated as zero, used by
    /// the driver's penalty-parameter update (spec §4.4). Pushes the staged
    /// `A` before solving (the back end itself zeroes `H` for the duration
    /// of the LP) so the penalty update's infeasibility estimate is always
    /// computed against the current Jacobian linearization rather than
    /// whatever `A` the last full [`ElasticQpBuilder::solve`] left behind.
    pub fn solve_lp(&mut self, stats: &mut Statistics) -> Result<QpSolution, QpBuilderError> {
        if self.pending.a {
            self.a_hb.set_values(&self.a_triplet)?;
            self.backend
                .set_a_values(&self.a_hb)
                .map_err(|_| QpBuilderError::NotInitialized)?;
        }
        if self.pending.g {
            self.backend.set_g(&self.g);
        }
        if self.pending.bounds || self.pending.delta {
            self.backend.set_bounds(&self.lb, &self.ub);
            self.backend.set_constraint_bounds(&self.lb_a, &self.ub_a);
        }
        let status = self
            .backend
            .optimize_lp(self.solved_once, stats)
            .map_err(|_| QpBuilderError::NotInitialized)?;
        self.extract_solution(status)
    }

    /// Writes the currently staged `A`/`H` to `path` in the persisted-state
    /// format (spec §6): four header lines (`n_qp`, `m`, `nnz_A`, `nnz_H`)
    /// followed by `A`'s row/column/value streams and then `H`'s, one
    /// number per line, gated by the caller on `FeatureOptions::debug_dump`.
    /// Grounded on `original_source`'s practice of persisting a failing QP's
    /// raw data so it can be replayed standalone (`test/unsolved_QPs/*.cpp`).
    pub fn dump_to_file(&self, path: &std::path::Path) -> std::io::Result<()> {
        use std::io::Write;
        let mut f = std::fs::File::create(path)?;
        writeln!(f, "{}", self.n_qp)?;
        writeln!(f, "{}", self.m)?;
        writeln!(f, "{}", self.a_triplet.nnz())?;
        writeln!(f, "{}", self.h_triplet.nnz())?;
        for &(row, _, _) in self.a_triplet.entries() {
            writeln!(f, "{row}")?;
        }
        for &(_, col, _) in self.a_triplet.entries() {
            writeln!(f, "{col}")?;
        }
        for &(_, _, value) in self.a_triplet.entries() {
            writeln!(f, "{value}")?;
        }
        for &(row, _, _) in self.h_triplet.entries() {
            writeln!(f, "{row}")?;
        }
        for &(_, col, _) in self.h_triplet.entries() {
            writeln!(f, "{col}")?;
        }
        for &(_, _, value) in self.h_triplet.entries() {
            writeln!(f, "{value}")?;
        }
        Ok(())
    }

    fn extract_solution(&self, status: crate::backend::BackendStatus) -> Result<QpSolution, QpBuilderError> {
        use crate::backend::BackendStatus::*;
        if status != Optimal {
            return Err(QpBuilderError::NotOptimal(status));
        }
        let z = self.backend.primal();
        let p = Col::<E>::from_fn(self.n, |i| z[i]);
        let u = Col::<E>::from_fn(self.m, |i| z[self.n + i]);
        let v = Col::<E>::from_fn(self.m, |i| z[self.n + self.m + i]);
        let (var_ws, con_ws) = self.backend.working_set();
        let bound_working_set = var_ws[0..self.n].to_vec();
        let y_b = self.backend.bound_multipliers();
        let lambda_b = Col::<E>::from_fn(self.n, |i| y_b[i]);

        Ok(QpSolution {
            p,
            u,
            v,
            q: self.backend.objective(),
            lambda_c: self.backend.constraint_multipliers().clone(),
            lambda_b,
            bound_working_set,
            constraint_working_set: con_ws.to_vec(),
        })
    }
}
