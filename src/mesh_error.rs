//! MeshShardError: unified error type for mesh-shard public APIs
//!
//! Every fallible operation in the crate returns this type. Errors raised while a
//! distributed protocol is running are wrapped in [`MeshShardError::Phase`] by the
//! top-level drivers so the diagnostic names the phase and the offending rank.

use crate::partitioning::error::PartitionError;
use crate::topology::cell_type::ElementType;
use crate::topology::entity::EntityKind;
use std::fmt;
use thiserror::Error;

/// Protocol phase in which a fatal error surfaced.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Phase {
    Partition,
    Serialize,
    Send,
    Receive,
    Stitch,
    Overlap,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Partition => "partition",
            Phase::Serialize => "serialize",
            Phase::Send => "send",
            Phase::Receive => "receive",
            Phase::Stitch => "stitch",
            Phase::Overlap => "overlap",
        };
        f.write_str(name)
    }
}

/// Unified error type for mesh-shard operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshShardError {
    /// Invalid partition request or partitioner failure.
    #[error("partitioning error: {0}")]
    Partitioning(#[from] PartitionError),
    /// A received record references a global vertex id never sent on that channel.
    #[error("record references global vertex {global} which was never transmitted")]
    UnknownVertexReference { global: u64 },
    /// Underlying send/receive/barrier failed or the peer went away.
    #[error("transport failure talking to rank {peer}: {reason}")]
    TransportFailure { peer: usize, reason: String },
    /// A payload could not be decoded.
    #[error("malformed wire payload: {0}")]
    Wire(String),
    /// Sender and receiver disagree on the wire layout.
    #[error("wire version mismatch: expected {expected}, got {got}")]
    WireVersion { expected: u16, got: u16 },
    /// A local index is outside the table for its entity kind.
    #[error("{kind} index {index} out of range (len {len})")]
    LocalIndexOutOfRange {
        kind: EntityKind,
        index: usize,
        len: usize,
    },
    /// An element or segment references a vertex that does not exist in the mesh.
    #[error("{kind} {index} references vertex {vertex}, but the mesh has {n_points} points")]
    InvalidElement {
        kind: EntityKind,
        index: usize,
        vertex: usize,
        n_points: usize,
    },
    /// An element type stored under a kind of the wrong dimension.
    #[error("{kind} {index} cannot be a {element:?}")]
    ElementDimension {
        kind: EntityKind,
        index: usize,
        element: ElementType,
    },
    /// An element's vertex or tag list does not match its type.
    #[error("{kind} {index} is a {element:?} with {found} entries, expected {expected}")]
    ElementShape {
        kind: EntityKind,
        index: usize,
        element: ElementType,
        expected: usize,
        found: usize,
    },
    /// A protocol step was invoked in the wrong state or on the wrong rank.
    #[error("invalid protocol state: {0}")]
    InvalidState(String),
    /// A structural invariant of a shard does not hold.
    #[error("invariant violated: {0}")]
    Invariant(String),
    /// A fatal error annotated with the phase and rank it surfaced on.
    #[error("{phase} phase failed on rank {rank}: {source}")]
    Phase {
        phase: Phase,
        rank: usize,
        #[source]
        source: Box<MeshShardError>,
    },
}

impl MeshShardError {
    /// Annotate this error with a phase and rank, keeping an existing annotation.
    pub fn in_phase(self, phase: Phase, rank: usize) -> Self {
        match self {
            already @ MeshShardError::Phase { .. } => already,
            other => MeshShardError::Phase {
                phase,
                rank,
                source: Box::new(other),
            },
        }
    }

    /// Shorthand for a transport failure.
    pub fn transport(peer: usize, reason: impl Into<String>) -> Self {
        MeshShardError::TransportFailure {
            peer,
            reason: reason.into(),
        }
    }

    /// The phase this error was annotated with, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            MeshShardError::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Strip the phase annotation.
    pub fn root_cause(&self) -> &MeshShardError {
        match self {
            MeshShardError::Phase { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_annotation_names_phase_and_rank() {
        let err = MeshShardError::UnknownVertexReference { global: 17 }.in_phase(Phase::Receive, 3);
        let msg = err.to_string();
        assert!(msg.starts_with("receive phase failed on rank 3"), "{msg}");
        assert_eq!(err.phase(), Some(Phase::Receive));
        assert_eq!(
            err.root_cause(),
            &MeshShardError::UnknownVertexReference { global: 17 }
        );
    }

    #[test]
    fn annotation_is_not_nested() {
        let err = MeshShardError::transport(2, "peer hung up")
            .in_phase(Phase::Send, 0)
            .in_phase(Phase::Stitch, 0);
        assert_eq!(err.phase(), Some(Phase::Send));
    }
}
