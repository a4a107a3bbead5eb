//! Entity kinds tracked by the index map and exchange markers.

use std::fmt;

/// The six entity namespaces of a shard. Each kind has its own dense, 0-based
/// local index space per rank.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, serde::Serialize, serde::Deserialize)]
pub enum EntityKind {
    Vertex,
    Edge,
    Face,
    VolumeElement,
    SurfaceElement,
    BoundarySegment,
}

impl EntityKind {
    pub const COUNT: usize = 6;

    pub const ALL: [EntityKind; Self::COUNT] = [
        EntityKind::Vertex,
        EntityKind::Edge,
        EntityKind::Face,
        EntityKind::VolumeElement,
        EntityKind::SurfaceElement,
        EntityKind::BoundarySegment,
    ];

    /// Slot of this kind in per-kind arrays.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Wire code; inverse of [`EntityKind::from_code`].
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Kinds whose global ids are the coordinator's mesh indices rather than
    /// being assigned by the numbering round.
    pub fn has_origin_id(self) -> bool {
        !matches!(self, EntityKind::Edge | EntityKind::Face)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Vertex => "vertex",
            EntityKind::Edge => "edge",
            EntityKind::Face => "face",
            EntityKind::VolumeElement => "volume element",
            EntityKind::SurfaceElement => "surface element",
            EntityKind::BoundarySegment => "boundary segment",
        };
        f.write_str(name)
    }
}
