use crate::driver::Iterate;
use crate::SolverOptions;

/// Hook invoked once per outer SQP iteration for logging or monitoring.
pub trait Callback {
    /// Creates a new callback from solver options.
    fn new(options: &SolverOptions) -> Self
    where
        Self: Sized;

    fn init(&mut self, _iterate: &Iterate) {}

    /// Called at the end of each iteration with the current iterate.
    fn call(&mut self, iterate: &Iterate);
}

/// A callback that does nothing. Use when no per-iteration output is needed.
pub struct NoOpCallback {}

impl Callback for NoOpCallback {
    fn new(_options: &SolverOptions) -> Self {
        Self {}
    }

    fn call(&mut self, _iterate: &Iterate) {}
}

/// Prints the KKT violation measures to stdout each iteration (spec §6's
/// `print_level` controls its verbosity).
pub struct ConvergenceOutput {
    print_level: u8,
}

impl Callback for ConvergenceOutput {
    fn new(options: &SolverOptions) -> Self {
        Self {
            print_level: options.get_option::<u8>("print_level").unwrap_or_default(),
        }
    }

    fn init(&mut self, _iterate: &Iterate) {
        if self.print_level > 0 {
            println!("iter |     f      |   delta    |    rho     | |KKT viol.|");
        }
    }

    fn call(&mut self, iterate: &Iterate) {
        if self.print_level == 0 {
            return;
        }
        println!(
            "{:4} | {:<10.3e} | {:<10.3e} | {:<10.3e} |",
            iterate.nit, iterate.f, iterate.delta, iterate.rho,
        );
    }
}
