//! [`DenseActiveSetBackend`]: the one concrete [`QpBackend`] this crate
//! ships. It is a small, dense primal active-set QP solver (Nocedal &
//! Wright, *Numerical Optimization*, Algorithm 16.3) operating on the
//! elastic QP's bound-and-constraint box directly, rather than a vendored
//! wrapper around an external engine (spec §1's qpOASES/QORE/Gurobi/CPLEX
//! are out-of-scope collaborators).
//!
//! Variable bounds and the general constraint rows `A z in [lb_A, ub_A]` are
//! unified into a single stack of `n + m` candidate working-set rows, the
//! same trick qpOASES uses internally. Every row the elastic-QP builder ever
//! hands this back end is finite (trust-region-bounded `p`, sentinel-bounded
//! `u`/`v`), so the feasible region is always compact: starting from any
//! feasible point, the method never needs a phase-1 feasibility solve.

use faer::{Col, Mat};

use crate::error::QpBackendError;
use crate::sparse::HarwellBoeing;
use crate::types::ActiveType;
use crate::E;

use super::{BackendStatus, QpBackend, Statistics};

/// Tikhonov regularization added to the Hessian block of the direction-
/// finding KKT system, so the saddle-point matrix stays nonsingular even
/// when the active working set spans a Hessian null direction (the LP case,
/// `H = 0`, included).
const REG_EPS: E = 1e-10;

/// A step whose ratio-test bound exceeds this is treated as running into
/// the sentinel "infinite" bound rather than a real constraint, i.e. the
/// direction is unbounded within the back end's own box.
const UNBOUNDED_RATIO: E = 1e15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowStatus {
    Inactive,
    AtLower,
    AtUpper,
}

pub struct DenseActiveSetBackend {
    n: usize,
    m: usize,
    h_dense: Mat<E>,
    a_dense: Mat<E>,
    g: Col<E>,
    lb: Col<E>,
    ub: Col<E>,
    lb_a: Col<E>,
    ub_a: Col<E>,
    z: Col<E>,
    row_status: Vec<RowStatus>,
    y_var: Col<E>,
    y_con: Col<E>,
    objective: E,
    var_labels: Vec<ActiveType>,
    con_labels: Vec<ActiveType>,
    qp_iter_max: usize,
    lp_iter_max: usize,
    active_set_tol: E,
}

impl DenseActiveSetBackend {
    /// All `n + m` candidate rows stacked `[I; A]`, as dense values.
    fn row(&self, row: usize, j: usize) -> E {
        if row < self.n {
            if row == j {
                1.0
            } else {
                0.0
            }
        } else {
            self.a_dense[(row - self.n, j)]
        }
    }

    fn row_bounds(&self, row: usize) -> (E, E) {
        if row < self.n {
            (self.lb[row], self.ub[row])
        } else {
            (self.lb_a[row - self.n], self.ub_a[row - self.n])
        }
    }

    fn row_value(&self, row: usize) -> E {
        if row < self.n {
            self.z[row]
        } else {
            let mut acc = 0.0;
            for j in 0..self.n {
                acc += self.a_dense[(row - self.n, j)] * self.z[j];
            }
            acc
        }
    }

    /// Clips `z0` into the variable box, then snaps each general constraint
    /// row active at whichever bound the unconstrained point already
    /// violates. The elastic-QP builder always supplies data for which this
    /// lands on a feasible point (spec §4.2's always-feasible construction).
    fn feasible_start(&mut self) {
        for j in 0..self.n {
            self.z[j] = self.z[j].clamp(self.lb[j], self.ub[j]);
        }
        for row in self.n..self.n + self.m {
            let value = self.row_value(row);
            let (lo, hi) = self.row_bounds(row);
            self.row_status[row] = if value <= lo {
                RowStatus::AtLower
            } else if value >= hi {
                RowStatus::AtUpper
            } else {
                RowStatus::Inactive
            };
        }
        for j in 0..self.n {
            self.row_status[j] = if (self.z[j] - self.lb[j]).abs() < 1e-12 {
                RowStatus::AtLower
            } else if (self.z[j] - self.ub[j]).abs() < 1e-12 {
                RowStatus::AtUpper
            } else {
                RowStatus::Inactive
            };
        }
    }

    fn active_rows(&self) -> Vec<usize> {
        (0..self.n + self.m)
            .filter(|&r| self.row_status[r] != RowStatus::Inactive)
            .collect()
    }

    /// Solves the KKT saddle-point system `[H+eps, -Aw^T; Aw, 0] [d; y] =
    /// [-grad; 0]`, where each active row is expressed in `>= bound` form
    /// (upper-active rows negated), via dense Gauss elimination with
    /// partial pivoting.
    fn compute_direction(&self, active: &[usize]) -> Option<(Col<E>, Vec<E>)> {
        let n = self.n;
        let k = active.len();
        let dim = n + k;

        let mut grad = Col::<E>::zeros(n);
        for i in 0..n {
            let mut acc = self.g[i];
            for j in 0..n {
                acc += self.h_dense[(i, j)] * self.z[j];
            }
            grad[i] = acc;
        }

        let mut sys = Mat::<E>::zeros(dim, dim);
        let mut rhs = vec![0.0; dim];
        for i in 0..n {
            for j in 0..n {
                sys[(i, j)] = self.h_dense[(i, j)];
            }
            sys[(i, i)] += REG_EPS;
            rhs[i] = -grad[i];
        }
        for (r, &row) in active.iter().enumerate() {
            let sign = if self.row_status[row] == RowStatus::AtUpper {
                -1.0
            } else {
                1.0
            };
            for j in 0..n {
                let a_rj = sign * self.row(row, j);
                sys[(n + r, j)] = a_rj;
                sys[(j, n + r)] = -a_rj;
            }
        }

        let sol = solve_dense(&sys, &rhs)?;
        let d = Col::<E>::from_fn(n, |i| sol[i]);
        let y = (0..k).map(|r| sol[n + r]).collect();
        Some((d, y))
    }

    /// Largest `alpha in [0, 1]` before `d` drives an inactive row to a
    /// bound; `None` means no row blocks within [`UNBOUNDED_RATIO`].
    fn ratio_test(&self, d: &Col<E>, active: &[usize]) -> (E, Option<usize>) {
        let mut alpha = 1.0;
        let mut blocking = None;
        for row in 0..self.n + self.m {
            if active.contains(&row) {
                continue;
            }
            let mut a_dot_d = 0.0;
            for j in 0..self.n {
                a_dot_d += self.row(row, j) * d[j];
            }
            if a_dot_d.abs() < 1e-13 {
                continue;
            }
            let value = self.row_value(row);
            let (lo, hi) = self.row_bounds(row);
            let bound_step = if a_dot_d > 0.0 {
                (hi - value) / a_dot_d
            } else {
                (lo - value) / a_dot_d
            };
            if bound_step < alpha - 1e-13 {
                alpha = bound_step.max(0.0);
                blocking = Some(row);
            }
        }
        if alpha >= UNBOUNDED_RATIO {
            (alpha, None)
        } else {
            (alpha, blocking)
        }
    }

    fn run(&mut self, max_iter: usize, stats_counter: &mut usize) -> BackendStatus {
        self.feasible_start();

        for _ in 0..max_iter {
            *stats_counter += 1;
            let active = self.active_rows();
            let Some((d, y)) = self.compute_direction(&active) else {
                return BackendStatus::InternalError;
            };

            let d_norm = (0..self.n).fold(0.0_f64, |acc, j| acc.max(d[j].abs()));
            if d_norm < 1e-10 {
                if let Some((worst_idx, worst_y)) = y
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                {
                    if *worst_y < -1e-8 {
                        self.row_status[active[worst_idx]] = RowStatus::Inactive;
                        continue;
                    }
                }
                self.record_multipliers(&active, &y);
                let (vars, cons) = self.working_set_labels();
                self.var_labels = vars;
                self.con_labels = cons;
                return BackendStatus::Optimal;
            }

            let (alpha, blocking) = self.ratio_test(&d, &active);
            if blocking.is_none() && alpha >= UNBOUNDED_RATIO {
                return BackendStatus::Unbounded;
            }
            for j in 0..self.n {
                self.z[j] += alpha * d[j];
            }
            if let Some(row) = blocking {
                let value = self.row_value(row);
                let (lo, hi) = self.row_bounds(row);
                self.row_status[row] = if (value - lo).abs() <= (value - hi).abs() {
                    RowStatus::AtLower
                } else {
                    RowStatus::AtUpper
                };
            }
        }
        BackendStatus::ExceedMaxIter
    }

    fn record_multipliers(&mut self, active: &[usize], y: &[E]) {
        self.y_var = Col::zeros(self.n);
        self.y_con = Col::zeros(self.m);
        for (&row, &yr) in active.iter().zip(y) {
            let signed = if self.row_status[row] == RowStatus::AtUpper {
                -yr
            } else {
                yr
            };
            if row < self.n {
                self.y_var[row] = signed;
            } else {
                self.y_con[row - self.n] = signed;
            }
        }
        self.objective = {
            let mut quad = 0.0;
            for i in 0..self.n {
                for j in 0..self.n {
                    quad += 0.5 * self.z[i] * self.h_dense[(i, j)] * self.z[j];
                }
            }
            let mut lin = 0.0;
            for i in 0..self.n {
                lin += self.g[i] * self.z[i];
            }
            quad + lin
        };
    }

    /// Normalizes each row's `RowStatus` into the 4-valued [`ActiveType`]
    /// via [`ActiveType::from_sign_and_value`], the cross-solver
    /// convention: `RowStatus` becomes a `{-1,0,+1}` sign code and the
    /// bound-proximity test itself (including the both-side case) is left
    /// entirely to that shared function, keyed on `active_set_tol`.
    fn working_set_labels(&self) -> (Vec<ActiveType>, Vec<ActiveType>) {
        let to_active = |s: RowStatus, value: E, lb: E, ub: E| {
            let sign = match s {
                RowStatus::Inactive => 0,
                RowStatus::AtLower => -1,
                RowStatus::AtUpper => 1,
            };
            ActiveType::from_sign_and_value(sign, value, lb, ub, self.active_set_tol)
        };
        let vars = (0..self.n)
            .map(|j| to_active(self.row_status[j], self.z[j], self.lb[j], self.ub[j]))
            .collect();
        let cons = (0..self.m)
            .map(|i| {
                to_active(
                    self.row_status[self.n + i],
                    self.row_value(self.n + i),
                    self.lb_a[i],
                    self.ub_a[i],
                )
            })
            .collect();
        (vars, cons)
    }
}

/// Solves `a x = b` by Gauss elimination with partial pivoting. `a` is
/// consumed by value (copied in by the caller already owning it) so the
/// elimination can work in place.
fn solve_dense(a: &Mat<E>, b: &[E]) -> Option<Vec<E>> {
    let dim = b.len();
    let mut a = a.clone();
    let mut x = b.to_vec();

    for col in 0..dim {
        let mut pivot_row = col;
        let mut pivot_val = a[(col, col)].abs();
        for row in (col + 1)..dim {
            if a[(row, col)].abs() > pivot_val {
                pivot_val = a[(row, col)].abs();
                pivot_row = row;
            }
        }
        if pivot_val < 1e-14 {
            return None;
        }
        if pivot_row != col {
            for c in 0..dim {
                let tmp = a[(col, c)];
                a[(col, c)] = a[(pivot_row, c)];
                a[(pivot_row, c)] = tmp;
            }
            x.swap(col, pivot_row);
        }
        let pivot = a[(col, col)];
        for row in (col + 1)..dim {
            let factor = a[(row, col)] / pivot;
            if factor == 0.0 {
                continue;
            }
            for c in col..dim {
                a[(row, c)] -= factor * a[(col, c)];
            }
            x[row] -= factor * x[col];
        }
    }

    for col in (0..dim).rev() {
        let mut acc = x[col];
        for c in (col + 1)..dim {
            acc -= a[(col, c)] * x[c];
        }
        x[col] = acc / a[(col, col)];
    }
    Some(x)
}

impl QpBackend for DenseActiveSetBackend {
    fn new(n: usize, m: usize) -> Self {
        Self {
            n,
            m,
            h_dense: Mat::zeros(n, n),
            a_dense: Mat::zeros(m, n),
            g: Col::zeros(n),
            lb: Col::zeros(n),
            ub: Col::zeros(n),
            lb_a: Col::zeros(m),
            ub_a: Col::zeros(m),
            z: Col::zeros(n),
            row_status: vec![RowStatus::Inactive; n + m],
            y_var: Col::zeros(n),
            y_con: Col::zeros(m),
            objective: 0.0,
            var_labels: vec![ActiveType::Inactive; n],
            con_labels: vec![ActiveType::Inactive; m],
            qp_iter_max: 1000,
            lp_iter_max: 100,
            active_set_tol: 1e-5,
        }
    }

    fn configure_limits(&mut self, qp_iter_max: usize, lp_iter_max: usize, active_set_tol: E) {
        self.qp_iter_max = qp_iter_max;
        self.lp_iter_max = lp_iter_max;
        self.active_set_tol = active_set_tol;
    }

    fn set_structure(&mut self, h: &HarwellBoeing, a: &HarwellBoeing) -> Result<(), QpBackendError> {
        self.h_dense = h.to_triplet().to_dense();
        self.a_dense = a.to_triplet().to_dense();
        Ok(())
    }

    fn set_h_values(&mut self, h: &HarwellBoeing) -> Result<(), QpBackendError> {
        self.h_dense = h.to_triplet().to_dense();
        Ok(())
    }

    fn set_a_values(&mut self, a: &HarwellBoeing) -> Result<(), QpBackendError> {
        self.a_dense = a.to_triplet().to_dense();
        Ok(())
    }

    fn set_g(&mut self, g: &Col<E>) {
        self.g = g.clone();
    }

    fn set_bounds(&mut self, lb: &Col<E>, ub: &Col<E>) {
        self.lb = lb.clone();
        self.ub = ub.clone();
    }

    fn set_constraint_bounds(&mut self, lb_a: &Col<E>, ub_a: &Col<E>) {
        self.lb_a = lb_a.clone();
        self.ub_a = ub_a.clone();
    }

    fn optimize_qp(&mut self, hot_start: bool, stats: &mut Statistics) -> Result<BackendStatus, QpBackendError> {
        if !hot_start {
            self.row_status = vec![RowStatus::Inactive; self.n + self.m];
            self.z = Col::zeros(self.n);
        }
        let mut n_iter = 0usize;
        let status = self.run(self.qp_iter_max, &mut n_iter);
        stats.qp_iterations += n_iter;
        stats.n_qp_solves += 1;
        Ok(status)
    }

    fn optimize_lp(&mut self, hot_start: bool, stats: &mut Statistics) -> Result<BackendStatus, QpBackendError> {
        let saved_h = std::mem::replace(&mut self.h_dense, Mat::zeros(self.n, self.n));
        if !hot_start {
            self.row_status = vec![RowStatus::Inactive; self.n + self.m];
            self.z = Col::zeros(self.n);
        }
        let mut n_iter = 0usize;
        let status = self.run(self.lp_iter_max, &mut n_iter);
        self.h_dense = saved_h;
        stats.lp_iterations += n_iter;
        stats.n_lp_solves += 1;
        Ok(status)
    }

    fn primal(&self) -> &Col<E> {
        &self.z
    }

    fn constraint_multipliers(&self) -> &Col<E> {
        &self.y_con
    }

    fn bound_multipliers(&self) -> &Col<E> {
        &self.y_var
    }

    fn objective(&self) -> E {
        self.objective
    }

    fn working_set(&self) -> (&[ActiveType], &[ActiveType]) {
        (&self.var_labels, &self.con_labels)
    }
}
