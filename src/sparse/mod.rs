//! Triplet and Harwell-Boeing sparse matrix kernel.
//!
//! Two cooperating representations: [`Triplet`] for assembly (coordinate
//! list, auto-detects symmetry from a dense buffer) and [`HarwellBoeing`]
//! for the compressed row/column layout a QP backend consumes, carrying a
//! triplet-order permutation so value refreshes never re-sort.

pub mod hb;
pub mod triplet;

pub use hb::{HarwellBoeing, HbLayout, IdentityBlock};
pub use triplet::Triplet;
