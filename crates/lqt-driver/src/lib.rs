//! Checks every declaration of a program, one at a time. A declaration that cannot be analyzed is
//! reported as skipped and the remaining declarations are still checked.
pub mod checker;
mod order;

pub use checker::{DeclReport, Driver, Outcome, Skip, SkipReason};
