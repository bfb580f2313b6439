//! Facade crate re-exporting the proc-macros used by the solver's options
//! surface (`#[explicit_options]`, `#[use_option]`, `build_options!`).

pub use options::*;
