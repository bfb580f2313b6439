//! A thin demonstration binary: builds the HS34 test problem, solves it with
//! the in-tree dense active-set back end, and prints the outcome. Grounded
//! on `src/tests/maros_mezaros.rs`'s problem-setup idiom and the options
//! table `macros::build_options!` documents for each component struct.

use faer::Col;

use sl1qp::backend::DenseActiveSetBackend;
use sl1qp::callback::ConvergenceOutput;
use sl1qp::driver::SqpDriver;
use sl1qp::nlp::{Bounds, Nlp, NlpSizes, SolutionReport, StartingPoint};
use sl1qp::types::BOUND_INFINITY;
use sl1qp::{SolverOptions, E};

/// Hock-Schittkowski problem 34:
///
/// ```text
/// minimize   -x1
/// subject to  x2 - exp(x1) >= 0
///             x3 - exp(x2) >= 0
///             0 <= x1, x2 <= 100, 0 <= x3 <= 10
/// ```
struct Hs34;

impl Nlp for Hs34 {
    fn sizes(&self) -> NlpSizes {
        NlpSizes {
            n: 3,
            m: 2,
            nnz_jacobian: 4,
            nnz_hessian: 2,
            name: "hs34".to_string(),
        }
    }

    fn bounds(&self) -> Bounds {
        Bounds {
            x_l: Col::zeros(3),
            x_u: Col::from_fn(3, |i| if i == 2 { 10.0 } else { 100.0 }),
            c_l: Col::from_fn(2, |_| 0.0),
            c_u: Col::from_fn(2, |_| BOUND_INFINITY),
        }
    }

    fn starting_point(&self) -> StartingPoint {
        StartingPoint {
            x: Col::from_fn(3, |i| [0.0, 1.05, 2.9][i]),
            z: Col::zeros(3),
            lambda: Col::zeros(2),
        }
    }

    fn objective(&self, x: &Col<E>) -> Option<E> {
        Some(-x[0])
    }

    fn objective_gradient(&self, _x: &Col<E>) -> Option<Col<E>> {
        Some(Col::from_fn(3, |i| if i == 0 { -1.0 } else { 0.0 }))
    }

    fn constraints(&self, x: &Col<E>) -> Option<Col<E>> {
        Some(Col::from_fn(2, |i| if i == 0 { x[1] - x[0].exp() } else { x[2] - x[1].exp() }))
    }

    fn jacobian_structure(&self) -> (Vec<usize>, Vec<usize>) {
        (vec![1, 1, 2, 2], vec![1, 2, 2, 3])
    }

    fn jacobian_values(&self, x: &Col<E>) -> Option<Vec<E>> {
        Some(vec![-x[0].exp(), 1.0, -x[1].exp(), 1.0])
    }

    fn hessian_structure(&self) -> (Vec<usize>, Vec<usize>) {
        (vec![1, 2], vec![1, 2])
    }

    fn hessian_values(&self, x: &Col<E>, lambda: &Col<E>, _sigma: E) -> Option<Vec<E>> {
        Some(vec![lambda[0] * x[0].exp(), lambda[1] * x[1].exp()])
    }

    fn finalize_solution(&mut self, report: SolutionReport) {
        println!("exit flag: {:?}", report.status);
        println!("f*        = {:.6}", report.f);
        println!(
            "x*        = [{:.6}, {:.6}, {:.6}]",
            report.x[0], report.x[1], report.x[2]
        );
    }
}

fn main() {
    let mut options = SolverOptions::new();
    options
        .set_option("print_level", 1u8)
        .expect("print_level is a registered u8 option");

    let mut problem = Hs34;
    let callback = Box::new(ConvergenceOutput::new(&options));
    let mut driver = SqpDriver::<DenseActiveSetBackend>::new(&problem, &options)
        .expect("HS34's fixed Jacobian/Hessian structure is internally consistent")
        .with_callback(callback);

    driver.solve(&mut problem);
}
