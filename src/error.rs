//! Error taxonomy for the engine.
//!
//! Every fallible operation in the crate returns a `Result` carrying one of
//! these kinds, never a bare `bool` or out-parameter. Only the realization
//! driver (the outermost loop, see [`crate::scheduler`]) is allowed to turn a
//! fatal kind into a process exit.

use thiserror::Error;

use crate::geometry::Axis;

/// Errors raised by the geometry kernel (component A).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("unsupported shape pair for intersect_boundary: {0} / {1}")]
    UnsupportedIntersection(&'static str, &'static str),
    #[error("adjacency is undefined for shape pair: {0} / {1}")]
    UnsupportedAdjacency(&'static str, &'static str),
    #[error("cylinder operation requires matching axis, got {0:?} and {1:?}")]
    MismatchedAxis(Axis, Axis),
    #[error("degenerate direction vector produced a division by zero along axis {0:?}")]
    NumericalDegenerate(Axis),
}

/// Errors raised while building the region/subvolume graph (component B).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryInvalid {
    #[error("region '{0}' declares parent '{1}' which does not surround it")]
    ParentDoesNotSurround(String, String),
    #[error("regions '{0}' and '{1}' overlap in volume")]
    OverlappingRegions(String, String),
    #[error("mesoscopic subvolume in region '{0}' borders surface region '{1}' with incompatible surface type")]
    IncompatibleSurfaceBoundary(String, String),
    #[error("region '{0}' has invalid subvolume extents (nx={1}, ny={2}, nz={3})")]
    InvalidExtents(String, i64, i64, i64),
    #[error("region label '{0}' is not unique")]
    DuplicateLabel(String),
    #[error("region '{0}' references unknown parent label '{1}'")]
    UnknownParent(String, String),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Errors raised while compiling reactions for a region (component C).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReactionIncompatible {
    #[error("reactant type {0} in region '{1}' has more than one exclusive first-order reaction")]
    ExclusivityViolation(usize, String),
    #[error("0-order reaction {0} is not Normal-surface but occurs in surface region '{1}'")]
    NonNormalOrderZeroOnSurface(usize, String),
    #[error("2-order reaction {0} is not Normal-surface but occurs in surface region '{1}'")]
    NonNormalOrderTwoOnSurface(usize, String),
    #[error("reaction {0} has an unsupported combination of reactant/product multiplicities")]
    UnsupportedOrder(usize),
    #[error("reaction {0}'s surface kind is incompatible with region '{1}'s surface composition")]
    SurfaceKindMismatch(usize, String),
}

/// Configuration problems that only warrant a warning, not a fatal error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationWarning {
    #[error("field '{0}' missing in section '{1}', defaulting to {2}")]
    MissingField(String, String, String),
}

/// Configuration problems fatal to parsing (external-collaborator concern;
/// the core only needs to be able to *report* these, not produce them).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationMalformed {
    #[error("field '{0}' in section '{1}' is malformed: {2}")]
    InvalidField(String, String, String),
}

/// The top-level error type returned by every public entry point above the
/// per-layer errors. Mirrors the way `splashsurf_lib::ReconstructionError`
/// wraps its lower-level `GridConstructionError`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("configuration malformed: {0}")]
    Configuration(#[from] ConfigurationMalformed),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("geometry invalid: {0}")]
    Builder(#[from] GeometryInvalid),
    #[error("reaction incompatible: {0}")]
    Reaction(#[from] ReactionIncompatible),
    #[error("unsupported shape pair: {0}")]
    UnsupportedShapePair(String),
}

impl EngineError {
    /// Names the offending entity and phase, as spec.md §7 requires every
    /// fatal message to do.
    pub fn with_context(self, phase: &str, entity: &str) -> String {
        format!("[{phase}] {entity}: {self}")
    }
}
