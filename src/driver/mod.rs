//! The SL1QP trust-region SQP driver (spec §4.4): the outer loop that turns
//! repeated elastic-QP solves into a converging sequence of iterates.
//!
//! Structurally mirrors the teacher's own generic solver-loop skeleton
//! (`callback.init` once, iterate until a terminal status, `callback.call`
//! each iteration, check `terminator.terminate` each iteration) generalized
//! from its NLP-interior-point specifics to the penalty-ℓ1 SQP method.

use faer::Col;

use crate::backend::{QpBackend, Statistics};
use crate::callback::{Callback, NoOpCallback};
use crate::error::DriverError;
use crate::kkt::check_optimality;
use crate::nlp::{Bounds, Nlp, SolutionReport};
use crate::options::SqpOptions;
use crate::qp::{ElasticQpBuilder, QpSolution};
use crate::sparse::Triplet;
use crate::terminators::{MultipleTerminators, Terminator};
use crate::types::ActiveType;
use crate::{SolverOptions, E, ExitFlag};

/// The driver's view of the current point: primal iterate, its evaluated
/// data, and the trust-region/penalty state that persists across iterations
/// (spec §3's Iterate data model).
pub struct Iterate {
    pub x: Col<E>,
    pub f: E,
    pub grad_f: Col<E>,
    pub c: Col<E>,
    pub jacobian: Triplet,
    pub lambda_c: Col<E>,
    pub lambda_b: Col<E>,
    pub bound_working_set: Vec<ActiveType>,
    pub constraint_working_set: Vec<ActiveType>,
    pub delta: E,
    pub rho: E,
    pub eta: E,
    pub q: E,
    pub nit: usize,
}

impl Iterate {
    fn new(n: usize, m: usize, x: Col<E>, lambda: Col<E>, z: Col<E>) -> Self {
        Self {
            x,
            f: 0.0,
            grad_f: Col::zeros(n),
            c: Col::zeros(m),
            jacobian: Triplet::new(m, n, false),
            lambda_c: lambda,
            lambda_b: z,
            bound_working_set: vec![ActiveType::Inactive; n],
            constraint_working_set: vec![ActiveType::Inactive; m],
            delta: 0.0,
            rho: 0.0,
            eta: 0.0,
            q: 0.0,
            nit: 0,
        }
    }
}

/// `sum(max(c_L - c, 0) + max(c - c_U, 0))`, the ℓ1 constraint-infeasibility
/// measure the penalty term controls (spec §1, §4.4).
fn infeasibility(c: &Col<E>, bounds: &Bounds) -> E {
    let mut eta = 0.0;
    for i in 0..c.nrows() {
        eta += (bounds.c_l[i] - c[i]).max(0.0) + (c[i] - bounds.c_u[i]).max(0.0);
    }
    eta
}

/// Consecutive accepted steps that ride the (saturated) trust-region
/// boundary with no active bound or constraint before the driver concludes
/// the NLP itself is unbounded rather than merely slow to converge.
const UNBOUNDED_STREAK_LIMIT: usize = 3;

pub struct SqpDriver<B: QpBackend> {
    qp: ElasticQpBuilder<B>,
    options: SqpOptions,
    stats: Statistics,
    bounds: Bounds,
    callback: Box<dyn Callback>,
    terminator: Box<dyn Terminator>,
    unbounded_streak: usize,
}

impl<B: QpBackend> SqpDriver<B> {
    pub fn new(nlp: &dyn Nlp, options: &SolverOptions) -> Result<Self, DriverError> {
        let sizes = nlp.sizes();
        let bounds = nlp.bounds();
        let sqp_options = SqpOptions::new(options);
        let qp = ElasticQpBuilder::<B>::new(
            sizes.n,
            sizes.m,
            nlp.jacobian_structure(),
            nlp.hessian_structure(),
            sqp_options.limits.qp_iter_max(),
            sqp_options.limits.lp_iter_max(),
            sqp_options.tolerance.active_set_tol(),
        )
        .map_err(|_| DriverError::InvalidNlp)?;
        Ok(Self {
            qp,
            options: sqp_options,
            stats: Statistics::default(),
            bounds,
            callback: Box::new(NoOpCallback {}),
            terminator: Box::new(MultipleTerminators::new(Vec::new())),
            unbounded_streak: 0,
        })
    }

    pub fn with_callback(mut self, callback: Box<dyn Callback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_terminator(mut self, terminator: Box<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn statistics(&self) -> Statistics {
        self.stats
    }

    /// Evaluates the NLP at `it.x` and stages the fresh data into the QP
    /// builder. `first_call` additionally fixes the Jacobian's sparsity
    /// pattern (spec §3's fixed-structure invariant).
    fn evaluate(&mut self, nlp: &mut dyn Nlp, it: &mut Iterate, first_call: bool) -> bool {
        let Some(f) = nlp.objective(&it.x) else { return false };
        let Some(grad_f) = nlp.objective_gradient(&it.x) else { return false };
        let Some(c) = nlp.constraints(&it.x) else { return false };
        let Some(jac_vals) = nlp.jacobian_values(&it.x) else { return false };
        let Some(hess_vals) = nlp.hessian_values(&it.x, &it.lambda_c, 1.0) else { return false };

        if first_call {
            let (jr, jc) = nlp.jacobian_structure();
            if it.jacobian.set_structure(&jr, &jc).is_err() {
                return false;
            }
        }
        if it.jacobian.set_values(&jac_vals).is_err() {
            return false;
        }

        it.f = f;
        it.grad_f = grad_f;
        it.c = c;
        it.eta = infeasibility(&it.c, &self.bounds);

        if self.qp.stage_gradient(&it.grad_f).is_err() {
            return false;
        }
        if self.qp.stage_hessian(&hess_vals).is_err() {
            return false;
        }
        if self.qp.stage_jacobian(&jac_vals).is_err() {
            return false;
        }
        if self
            .qp
            .stage_bounds(&it.x, &self.bounds.x_l, &self.bounds.x_u, it.delta)
            .is_err()
        {
            return false;
        }
        if self
            .qp
            .stage_constraint_bounds(&it.c, &self.bounds.c_l, &self.bounds.c_u)
            .is_err()
        {
            return false;
        }
        true
    }

    /// Penalty-parameter update (spec §4.4): escalates `rho` while the
    /// back end's LP-relaxed (Hessian-free) predicted infeasibility
    /// reduction falls short of `eps1 * eta`, stopping early once further
    /// escalation buys less than `eps2` fractional improvement.
    fn update_penalty(&mut self, it: &mut Iterate) -> Result<(), DriverError> {
        if !self.options.penalty.enable_penalty_update() {
            return Ok(());
        }
        let mut trial_rho = it.rho;
        let mut last_infeasibility = E::INFINITY;
        for _ in 0..self.options.penalty.iter_max_rho() {
            self.qp.stage_penalty(trial_rho);
            let Ok(sol) = self.qp.solve_lp(&mut self.stats) else {
                break;
            };
            let predicted: E = (0..sol.u.nrows()).map(|i| sol.u[i] + sol.v[i]).sum();
            if predicted <= self.options.penalty.eps1() * it.eta {
                break;
            }
            if last_infeasibility - predicted < self.options.penalty.eps2() * last_infeasibility {
                break;
            }
            last_infeasibility = predicted;
            if trial_rho >= self.options.penalty.rho_max() {
                break;
            }
            trial_rho = (trial_rho * self.options.penalty.gamma_rho()).min(self.options.penalty.rho_max());
        }
        if self.options.penalty.enable_penalty_reduction() && trial_rho == it.rho {
            // See DESIGN.md open question 1: reduction is gated behind this
            // feature flag and left at a no-op here since it is disabled by
            // default.
        }
        it.rho = trial_rho;
        self.qp.stage_penalty(it.rho);
        Ok(())
    }

    pub fn solve(&mut self, nlp: &mut dyn Nlp) -> ExitFlag {
        let sizes = nlp.sizes();
        let sp = nlp.starting_point();
        let mut it = Iterate::new(sizes.n, sizes.m, sp.x, sp.lambda, sp.z);
        it.delta = self.options.trust_region.delta_0();
        it.rho = self.options.penalty.rho_0();

        // A box with lb > ub is infeasible independent of any QP solve;
        // catching it here avoids handing the back end an empty variable
        // box (spec §8 scenario 4).
        if (0..sizes.n).any(|i| self.bounds.x_l[i] > self.bounds.x_u[i])
            || (0..sizes.m).any(|i| self.bounds.c_l[i] > self.bounds.c_u[i])
        {
            return ExitFlag::QpInfeasible;
        }

        if !self.evaluate(nlp, &mut it, true) {
            return ExitFlag::InvalidNlp;
        }

        self.terminator.initialize();
        self.callback.init(&it);

        let exit_flag = self.run_loop(nlp, &mut it);

        nlp.finalize_solution(SolutionReport {
            status: exit_flag,
            x: &it.x,
            z: &it.lambda_b,
            bound_working_set: &it.bound_working_set,
            c: &it.c,
            lambda: &it.lambda_c,
            constraint_working_set: &it.constraint_working_set,
            f: it.f,
        });
        exit_flag
    }

    fn run_loop(&mut self, nlp: &mut dyn Nlp, it: &mut Iterate) -> ExitFlag {
        for iter in 0..self.options.limits.iter_max() {
            it.nit = iter;

            if let Err(DriverError::InvalidNlp) = self.update_penalty(it) {
                return ExitFlag::InvalidNlp;
            }

            let mut sol = match self.qp.solve(&mut self.stats) {
                Ok(sol) => sol,
                Err(crate::error::QpBuilderError::QpUnchanged) => {
                    // Nothing changed since the previous solve; current
                    // iterate already satisfies the QP it would re-solve.
                    return ExitFlag::Optimal;
                }
                Err(crate::error::QpBuilderError::NotOptimal(status)) => {
                    return match status {
                        crate::backend::BackendStatus::Infeasible => ExitFlag::QpInfeasible,
                        crate::backend::BackendStatus::Unbounded => ExitFlag::QpUnbounded,
                        crate::backend::BackendStatus::ExceedMaxIter => ExitFlag::QpExceedMaxIter,
                        _ => ExitFlag::QpNotOptimal,
                    };
                }
                Err(_) => return ExitFlag::QpInternalError,
            };

            let pred = it.rho * it.eta - sol.q;
            if pred <= 0.0 {
                if self.options.features.debug_dump() {
                    let _ = self.qp.dump_to_file(std::path::Path::new("qp_dump.txt"));
                }
                return ExitFlag::PenaltyTooLarge;
            }

            let delta_for_step = it.delta;
            let mut p_inf_norm = (0..sol.p.nrows()).fold(0.0_f64, |acc, i| acc.max(sol.p[i].abs()));

            let mut x_trial = it.x.clone();
            for i in 0..sol.p.nrows() {
                x_trial[i] += sol.p[i];
            }
            let Some(f_trial) = nlp.objective(&x_trial) else {
                return ExitFlag::InvalidNlp;
            };
            let Some(c_trial) = nlp.constraints(&x_trial) else {
                return ExitFlag::InvalidNlp;
            };
            let mut eta_trial = infeasibility(&c_trial, &self.bounds);

            let mut ared = (it.f + it.rho * it.eta) - (f_trial + it.rho * eta_trial);
            let mut ratio = ared / pred;

            if ratio < self.options.trust_region.eta_s() && self.options.features.second_order_correction() {
                if let Some((x_soc, f_soc, eta_soc, sol_soc)) = self.try_soc(nlp, it, &c_trial) {
                    let ared_soc = (it.f + it.rho * it.eta) - (f_soc + it.rho * eta_soc);
                    let ratio_soc = ared_soc / pred;
                    if ratio_soc > ratio {
                        x_trial = x_soc;
                        eta_trial = eta_soc;
                        ared = ared_soc;
                        ratio = ratio_soc;
                        p_inf_norm = (0..sol_soc.p.nrows()).fold(0.0_f64, |acc, i| acc.max(sol_soc.p[i].abs()));
                        sol = sol_soc;
                    }
                }
            }

            let tr = &self.options.trust_region;
            if ratio < tr.eta_c() {
                it.delta = (it.delta * tr.gamma_c()).max(tr.delta_min());
            } else if ratio > tr.eta_e() {
                it.delta = (it.delta * tr.gamma_e()).min(tr.delta_max());
            }

            if ratio >= tr.eta_s() {
                let rides_boundary = (p_inf_norm - delta_for_step).abs() <= 1e-6 * delta_for_step.max(1.0);
                let trust_region_saturated = it.delta >= tr.delta_max() * (1.0 - 1e-9);
                let no_active_constraint = sol.constraint_working_set.iter().all(|a| *a == ActiveType::Inactive);
                if rides_boundary && trust_region_saturated && no_active_constraint && ared > 0.0 {
                    self.unbounded_streak += 1;
                    if self.unbounded_streak >= UNBOUNDED_STREAK_LIMIT {
                        return ExitFlag::QpUnbounded;
                    }
                } else {
                    self.unbounded_streak = 0;
                }

                it.x = x_trial;
                it.lambda_c = sol.lambda_c;
                it.lambda_b = sol.lambda_b;
                it.bound_working_set = sol.bound_working_set;
                it.constraint_working_set = sol.constraint_working_set;
                it.q = sol.q;

                if !self.evaluate(nlp, it, false) {
                    return ExitFlag::InvalidNlp;
                }

                let status = match check_optimality(
                    &it.x,
                    &self.bounds.x_l,
                    &self.bounds.x_u,
                    &it.c,
                    &self.bounds.c_l,
                    &self.bounds.c_u,
                    &it.grad_f,
                    &it.jacobian,
                    &it.lambda_c,
                    &it.lambda_b,
                    &it.bound_working_set,
                    &it.constraint_working_set,
                ) {
                    Ok(status) => status,
                    Err(DriverError::InvalidWorkingSet) => return ExitFlag::QpInternalError,
                    Err(_) => return ExitFlag::InvalidNlp,
                };
                let tol = &self.options.tolerance;
                if status.is_optimal(tol.tau_prim(), tol.tau_dual(), tol.tau_comp(), tol.tau_stat()) {
                    return ExitFlag::Optimal;
                }
            } else {
                self.unbounded_streak = 0;
                // Rejected step: re-stage the unchanged gradient/Jacobian at
                // the (unmoved) iterate, only the trust region shrank.
                if self
                    .qp
                    .stage_bounds(&it.x, &self.bounds.x_l, &self.bounds.x_u, it.delta)
                    .is_err()
                {
                    return ExitFlag::InvalidNlp;
                }
            }

            if it.delta < self.options.trust_region.delta_min() {
                return ExitFlag::TrustRegionTooSmall;
            }
            if it.rho >= self.options.penalty.rho_max() && pred <= 1e-10 {
                return ExitFlag::PenaltyTooLarge;
            }
            if let Some(status) = self.terminator.terminate() {
                return status;
            }
            self.callback.call(it);
        }
        ExitFlag::ExceedMaxIter
    }

    /// One second-order-correction QP solve: re-centers the constraint
    /// bounds on the trial point's constraint values while keeping `J_k`,
    /// `H_k` fixed, to recover feasibility curvature the linearization at
    /// `x_k` missed (spec §4.4).
    fn try_soc(&mut self, nlp: &mut dyn Nlp, it: &Iterate, c_trial: &Col<E>) -> Option<(Col<E>, E, E, QpSolution)> {
        self.qp
            .stage_constraint_bounds(c_trial, &self.bounds.c_l, &self.bounds.c_u)
            .ok()?;
        let sol = self.qp.solve(&mut self.stats).ok()?;
        self.qp
            .stage_constraint_bounds(&it.c, &self.bounds.c_l, &self.bounds.c_u)
            .ok()?;

        let mut x_soc = it.x.clone();
        for i in 0..sol.p.nrows() {
            x_soc[i] += sol.p[i];
        }
        let f_soc = nlp.objective(&x_soc)?;
        let c_soc = nlp.constraints(&x_soc)?;
        let eta_soc = infeasibility(&c_soc, &self.bounds);
        Some((x_soc, f_soc, eta_soc, sol))
    }
}
