//! Error taxonomy.
//!
//! `Contradiction` deliberately doesn't live here: it's normal DFS control
//! flow local to the current search branch, never surfaced to a host. What's
//! in this module is only what's surfaced upward.

use thiserror::Error;

/// Errors a host can observe from the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A handler's `initialize` detected a statically impossible constraint
    /// (sum out of reachable range, visibility count longer than the line,
    /// mismatched `SameValues` set sizes, ...). The builder reports this
    /// without ever entering search.
    #[error("constraint is unsatisfiable: {0}")]
    InvalidConstraint(String),

    /// A caller tried to mutate [`crate::exclusions::CellExclusions`] after
    /// one of its getters had already been called and sealed it. Programmer
    /// error: never swallowed.
    #[error("cell exclusions mutated after sealing")]
    Sealed,

    /// The host's cancellation flag was observed at a decision node. Trail
    /// and grid state are left undefined; the engine instance must be
    /// rebuilt before reuse.
    #[error("search cancelled")]
    Cancelled,

    /// A wall-clock deadline elapsed. Represented distinctly from
    /// [`Error::Cancelled`] for host-facing diagnostics, but internally
    /// it's the same cancellation flag, just set by a timer instead of the
    /// host directly.
    #[error("search timed out")]
    Timeout,
}

/// A cell-exclusions mutation attempted after sealing.
///
/// Kept as a distinct unit type (rather than folding straight into
/// [`Error`]) so [`crate::exclusions::CellExclusions`]'s mutator methods can
/// return it directly without dragging in the rest of the error enum; the
/// conversion to [`Error::Sealed`] happens at the boundary where it's
/// surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealedError;

impl From<SealedError> for Error {
    fn from(_: SealedError) -> Self {
        Error::Sealed
    }
}

impl std::fmt::Display for SealedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cell exclusions mutated after sealing")
    }
}

impl std::error::Error for SealedError {}
