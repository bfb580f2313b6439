//! The SQP driver's configuration surface (spec §6).
//!
//! Each component groups a slice of the options bag generated by
//! [`macros::build_options`] into a typed, documented struct, the way the
//! teacher groups `mu_min`/`mu_max` into `AdaptiveMuUpdateOptions` or
//! `learning_rate` into `ConstantStepSizeOptions`.

use macros::{explicit_options, use_option};

use crate::{E, I, SolverOptions};

/// Which QP back-end the driver stages problems against. Only
/// [`QpSolverKind::Reference`] is implemented in this crate; the others name
/// external collaborators (spec §1) this crate's facade is shaped to accept
/// but does not itself vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpSolverKind {
    Reference,
    QpOases,
    Qore,
    Gurobi,
    Cplex,
}

#[explicit_options(name = SolverOptions)]
#[use_option(name = "delta_0", type_ = E, default = "1.0", description = "Initial trust-region radius")]
#[use_option(name = "delta_max", type_ = E, default = "1e4", description = "Maximum trust-region radius")]
#[use_option(name = "delta_min", type_ = E, default = "1e-8", description = "Minimum trust-region radius; falling below it is terminal")]
#[use_option(name = "eta_c", type_ = E, default = "0.25", description = "Ratio-test threshold below which the trust region shrinks")]
#[use_option(name = "eta_s", type_ = E, default = "1e-8", description = "Ratio-test threshold above which a trial step is accepted")]
#[use_option(name = "eta_e", type_ = E, default = "0.75", description = "Ratio-test threshold above which the trust region may expand")]
#[use_option(name = "gamma_c", type_ = E, default = "0.5", description = "Trust-region contraction factor")]
#[use_option(name = "gamma_e", type_ = E, default = "2.0", description = "Trust-region expansion factor")]
pub struct TrustRegionOptions {}

impl TrustRegionOptions {
    pub fn new(options: &SolverOptions) -> Self {
        Self {
            options: options.into(),
        }
    }

    pub fn delta_0(&self) -> E {
        self.options.delta_0
    }
    pub fn delta_max(&self) -> E {
        self.options.delta_max
    }
    pub fn delta_min(&self) -> E {
        self.options.delta_min
    }
    pub fn eta_c(&self) -> E {
        self.options.eta_c
    }
    pub fn eta_s(&self) -> E {
        self.options.eta_s
    }
    pub fn eta_e(&self) -> E {
        self.options.eta_e
    }
    pub fn gamma_c(&self) -> E {
        self.options.gamma_c
    }
    pub fn gamma_e(&self) -> E {
        self.options.gamma_e
    }
}

#[explicit_options(name = SolverOptions)]
#[use_option(name = "rho_0", type_ = E, default = "1.0", description = "Initial penalty parameter")]
#[use_option(name = "rho_max", type_ = E, default = "1e6", description = "Maximum penalty parameter")]
#[use_option(name = "gamma_rho", type_ = E, default = "10.0", description = "Multiplicative factor applied to rho during penalty updates")]
#[use_option(name = "eps1", type_ = E, default = "0.3", description = "Minimum fraction of the feasibility gap the penalty update must close")]
#[use_option(name = "eps2", type_ = E, default = "1e-6", description = "Minimum fraction of model improvement required to accept a new rho")]
#[use_option(name = "iter_max_rho", type_ = I, default = "10", description = "Maximum number of rho multiplications within one outer iteration")]
#[use_option(name = "enable_penalty_update", type_ = bool, default = "true", description = "Whether the penalty-parameter update sub-loop runs at all")]
#[use_option(name = "enable_penalty_reduction", type_ = bool, default = "false", description = "Whether rho may be halved when the iterate is strongly feasible; default disabled, see DESIGN.md open question 1")]
pub struct PenaltyOptions {}

impl PenaltyOptions {
    pub fn new(options: &SolverOptions) -> Self {
        Self {
            options: options.into(),
        }
    }

    pub fn rho_0(&self) -> E {
        self.options.rho_0
    }
    pub fn rho_max(&self) -> E {
        self.options.rho_max
    }
    pub fn gamma_rho(&self) -> E {
        self.options.gamma_rho
    }
    pub fn eps1(&self) -> E {
        self.options.eps1
    }
    pub fn eps2(&self) -> E {
        self.options.eps2
    }
    pub fn iter_max_rho(&self) -> I {
        self.options.iter_max_rho
    }
    pub fn enable_penalty_update(&self) -> bool {
        self.options.enable_penalty_update
    }
    pub fn enable_penalty_reduction(&self) -> bool {
        self.options.enable_penalty_reduction
    }
}

#[explicit_options(name = SolverOptions)]
#[use_option(name = "tau_prim", type_ = E, default = "1e-5", description = "Primal feasibility tolerance")]
#[use_option(name = "tau_dual", type_ = E, default = "1e-6", description = "Dual feasibility tolerance")]
#[use_option(name = "tau_comp", type_ = E, default = "1e-6", description = "Complementarity tolerance")]
#[use_option(name = "tau_stat", type_ = E, default = "1e-5", description = "Stationarity tolerance")]
#[use_option(name = "active_set_tol", type_ = E, default = "1e-5", description = "Proximity-to-bound tolerance used for working-set classification")]
pub struct ToleranceOptions {}

impl ToleranceOptions {
    pub fn new(options: &SolverOptions) -> Self {
        Self {
            options: options.into(),
        }
    }

    pub fn tau_prim(&self) -> E {
        self.options.tau_prim
    }
    pub fn tau_dual(&self) -> E {
        self.options.tau_dual
    }
    pub fn tau_comp(&self) -> E {
        self.options.tau_comp
    }
    pub fn tau_stat(&self) -> E {
        self.options.tau_stat
    }
    pub fn active_set_tol(&self) -> E {
        self.options.active_set_tol
    }
}

#[explicit_options(name = SolverOptions)]
#[use_option(name = "iter_max", type_ = I, default = "200", description = "Maximum outer SQP iterations")]
#[use_option(name = "qp_iter_max", type_ = I, default = "1000", description = "Maximum inner QP solver iterations")]
#[use_option(name = "lp_iter_max", type_ = I, default = "100", description = "Maximum inner LP solver iterations during the penalty update")]
pub struct LimitOptions {}

impl LimitOptions {
    pub fn new(options: &SolverOptions) -> Self {
        Self {
            options: options.into(),
        }
    }

    pub fn iter_max(&self) -> I {
        self.options.iter_max
    }
    pub fn qp_iter_max(&self) -> I {
        self.options.qp_iter_max
    }
    pub fn lp_iter_max(&self) -> I {
        self.options.lp_iter_max
    }
}

#[explicit_options(name = SolverOptions)]
#[use_option(name = "second_order_correction", type_ = bool, default = "true", description = "Whether a rejected trial point triggers a second-order-correction QP")]
#[use_option(name = "debug_dump", type_ = bool, default = "false", description = "Whether a failing QP's data is dumped to disk (spec §6 persisted-state format)")]
pub struct FeatureOptions {}

impl FeatureOptions {
    pub fn new(options: &SolverOptions) -> Self {
        Self {
            options: options.into(),
        }
    }

    pub fn second_order_correction(&self) -> bool {
        self.options.second_order_correction
    }
    pub fn debug_dump(&self) -> bool {
        self.options.debug_dump
    }
}

#[explicit_options(name = SolverOptions)]
#[use_option(name = "print_level", type_ = u8, default = "0", description = "Verbosity of per-iteration output, 0..4")]
pub struct OutputOptions {}

impl OutputOptions {
    pub fn new(options: &SolverOptions) -> Self {
        Self {
            options: options.into(),
        }
    }

    pub fn print_level(&self) -> u8 {
        self.options.print_level
    }
}

/// The driver's full, typed view of the options bag. Constructed once per
/// [`crate::driver::SqpDriver`], mirroring the way the teacher's solver
/// structs each hold one `#[explicit_options]` component rather than the
/// whole untyped registry.
pub struct SqpOptions {
    pub trust_region: TrustRegionOptions,
    pub penalty: PenaltyOptions,
    pub tolerance: ToleranceOptions,
    pub limits: LimitOptions,
    pub features: FeatureOptions,
    pub output: OutputOptions,
    pub qp_solver: QpSolverKind,
}

impl SqpOptions {
    pub fn new(options: &SolverOptions) -> Self {
        Self {
            trust_region: TrustRegionOptions::new(options),
            penalty: PenaltyOptions::new(options),
            tolerance: ToleranceOptions::new(options),
            limits: LimitOptions::new(options),
            features: FeatureOptions::new(options),
            output: OutputOptions::new(options),
            qp_solver: QpSolverKind::Reference,
        }
    }
}
