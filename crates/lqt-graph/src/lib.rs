//! The liquid-type graph: one symbolic node per analyzed expression or declaration, each carrying
//! a predicate over a fresh variable, linked into a dependency DAG. Versioning instantiates
//! subgraphs so that a function summary can be used at several call sites without capture.
mod annot;
mod builder;
pub mod hir;
pub mod liquid;
mod session;
pub mod versioning;

use std::fmt;

pub use liquid::{LiquidGraph, LiquidKind, LiquidType, NodeId, Source};
pub use session::AnalysisSession;
pub use versioning::{Version, VersionedId, VersionedLiquidType, versioned_name};

/// Why a declaration could not be turned into a graph. Either way the declaration is skipped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LowerError {
    /// A construct without a lowering rule.
    Unsupported(String),
    /// The front end could not tell the type or target of something.
    MissingResolution(String),
}

pub type LowerResult<T = NodeId> = Result<T, LowerError>;

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LowerError::Unsupported(what) => write!(f, "unsupported: {what}"),
            LowerError::MissingResolution(what) => write!(f, "cannot resolve {what}"),
        }
    }
}

impl std::error::Error for LowerError {}
