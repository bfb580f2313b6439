use std::any::Any;

use dyn_clone::DynClone;
use macros::build_options;

pub mod backend;
pub mod callback;
pub mod driver;
pub mod error;
pub mod kkt;
pub mod nlp;
pub mod options;
pub mod qp;
pub mod sparse;
pub mod terminators;
pub mod types;

#[cfg(test)]
pub mod tests;

/// Floating-point element type used throughout the solver.
pub type E = f64;
/// Index type used for sparse structure and sizes.
pub type I = usize;

pub trait OptionTrait: Any + Sync + Send + DynClone {}
impl OptionTrait for &'static str {}
impl OptionTrait for String {}
impl OptionTrait for bool {}
impl OptionTrait for usize {}
impl OptionTrait for u8 {}
impl OptionTrait for u16 {}
impl OptionTrait for u32 {}
impl OptionTrait for u64 {}
impl OptionTrait for i8 {}
impl OptionTrait for i16 {}
impl OptionTrait for i32 {}
impl OptionTrait for i64 {}
impl OptionTrait for f32 {}
impl OptionTrait for f64 {}

impl Clone for Box<dyn OptionTrait> {
    fn clone(&self) -> Self {
        dyn_clone::clone_box(&**self)
    }
}

build_options!(name = SolverOptions, registry_name = OPTION_REGISTRY);

/// Unified terminal status for a driver run (spec §4.3, §6, §7).
///
/// Combines the QP back-end status taxonomy with the outer-loop's own
/// terminal conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitFlag {
    /// KKT conditions satisfied within tolerance.
    Optimal,
    /// The NLP reported an invalid problem (an evaluator returned false).
    InvalidNlp,
    /// Outer iteration cap reached without convergence.
    ExceedMaxIter,
    /// Trust-region radius collapsed below `delta_min`.
    TrustRegionTooSmall,
    /// Penalty parameter reached `rho_max` with no acceptable step.
    PenaltyTooLarge,
    /// Wall-clock limit exceeded.
    ExceedMaxWallclockTime,
    /// CPU-time limit exceeded.
    ExceedMaxCpuTime,
    /// The run was interrupted (e.g. SIGINT).
    Interrupted,

    /// Subproblem status taxonomy (spec §4.3), surfaced when a QP/LP solve
    /// fails and the driver stops immediately.
    QpInfeasible,
    QpUnbounded,
    QpExceedMaxIter,
    QpNotOptimal,
    QpInternalError,
}
