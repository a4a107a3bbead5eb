//! Structural self-checks for the per-rank containers.
//!
//! Checks are always available through [`DebugInvariants::validate_invariants`];
//! the asserting form only fires in debug builds or with the
//! `check-invariants` feature, so protocol code can call it after every phase
//! without paying for it in release runs.

use crate::mesh_error::MeshShardError;

/// A container whose internal tables must agree with each other.
pub trait DebugInvariants {
    /// First violated invariant, if any.
    fn validate_invariants(&self) -> Result<(), MeshShardError>;

    /// Panic on a violated invariant when checking is enabled.
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "shard after protocol phase");
    }
}

/// Evaluate a `Result<(), MeshShardError>` check and panic with `context` on
/// failure, only when invariant checking is compiled in.
#[macro_export]
macro_rules! debug_invariants {
    ($check:expr, $context:expr) => {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        {
            if let Err(err) = $check {
                panic!("invariant violated ({}): {}", $context, err);
            }
        }
    };
}
