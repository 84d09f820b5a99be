//! Closed-world reachability analysis (tree shaking).
//!
//! Computes the minimal live subset of a program from its directive roots and
//! prunes everything else, producing the conservative call and field-access
//! edge sets the rewrite passes consume, plus the removal report handed to the
//! external log collaborator.

mod analyzer;
mod liveset;

pub use analyzer::shake;
pub use liveset::{LiveSet, RemovalReport, ShakeOutcome};
