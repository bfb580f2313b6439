//! A small struct-of-function-pointers [`Nlp`] fixture used by the scenario
//! tests, grounded on the teacher's `nlp::NonlinearProgram` shape
//! (`src/nlp/mod.rs`) rather than a closure/trait-object problem, since every
//! scenario below is a fixed, known-in-advance function.

use std::cell::RefCell;

use faer::Col;

use crate::nlp::{Bounds, Nlp, NlpSizes, SolutionReport, StartingPoint};
use crate::{E, ExitFlag};

/// What [`Nlp::finalize_solution`] handed back, captured for the test to
/// inspect after `SqpDriver::solve` returns only the bare [`ExitFlag`].
pub struct Captured {
    pub status: ExitFlag,
    pub x: Col<E>,
    pub f: E,
}

pub struct DemoNlp {
    pub captured: RefCell<Option<Captured>>,
    pub name: &'static str,
    pub n: usize,
    pub m: usize,
    pub f: fn(&Col<E>) -> E,
    pub df: fn(&Col<E>) -> Col<E>,
    pub c: fn(&Col<E>) -> Col<E>,
    pub jac_structure: (Vec<usize>, Vec<usize>),
    pub jac: fn(&Col<E>) -> Vec<E>,
    pub hess_structure: (Vec<usize>, Vec<usize>),
    pub hess: fn(&Col<E>, &Col<E>, E) -> Vec<E>,
    pub x_l: Col<E>,
    pub x_u: Col<E>,
    pub c_l: Col<E>,
    pub c_u: Col<E>,
    pub x0: Col<E>,
}

impl Nlp for DemoNlp {
    fn sizes(&self) -> NlpSizes {
        NlpSizes {
            n: self.n,
            m: self.m,
            nnz_jacobian: self.jac_structure.0.len(),
            nnz_hessian: self.hess_structure.0.len(),
            name: self.name.to_string(),
        }
    }

    fn bounds(&self) -> Bounds {
        Bounds {
            x_l: self.x_l.clone(),
            x_u: self.x_u.clone(),
            c_l: self.c_l.clone(),
            c_u: self.c_u.clone(),
        }
    }

    fn starting_point(&self) -> StartingPoint {
        StartingPoint {
            x: self.x0.clone(),
            z: Col::zeros(self.n),
            lambda: Col::zeros(self.m),
        }
    }

    fn objective(&self, x: &Col<E>) -> Option<E> {
        Some((self.f)(x))
    }

    fn objective_gradient(&self, x: &Col<E>) -> Option<Col<E>> {
        Some((self.df)(x))
    }

    fn constraints(&self, x: &Col<E>) -> Option<Col<E>> {
        Some((self.c)(x))
    }

    fn jacobian_structure(&self) -> (Vec<usize>, Vec<usize>) {
        self.jac_structure.clone()
    }

    fn jacobian_values(&self, x: &Col<E>) -> Option<Vec<E>> {
        Some((self.jac)(x))
    }

    fn hessian_structure(&self) -> (Vec<usize>, Vec<usize>) {
        self.hess_structure.clone()
    }

    fn hessian_values(&self, x: &Col<E>, lambda: &Col<E>, sigma: E) -> Option<Vec<E>> {
        Some((self.hess)(x, lambda, sigma))
    }

    fn finalize_solution(&mut self, report: SolutionReport) {
        *self.captured.borrow_mut() = Some(Captured {
            status: report.status,
            x: report.x.clone(),
            f: report.f,
        });
    }
}
