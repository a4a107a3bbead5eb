//! Index Map Table: per entity kind, local index ↔ (global index, remote copies).
//!
//! One [`IndexEntry`] per local entity. `global_id` stays `None` until the
//! coarse-grid stitcher assigns it; `remote` is a small association list of
//! `(rank, remote_local_id)` links with at most one link per rank.
//!
//! Tables grow with the shard and never shrink: [`IndexMapTable::resize`]
//! keeps entries below the new bound and default-initialises the rest.

use crate::mesh_error::MeshShardError;
use crate::topology::entity::EntityKind;
use std::collections::BTreeSet;

/// Metadata that identifies a remote copy of a local entity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct RemoteLink {
    pub rank: usize,
    pub local_id: usize,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IndexEntry {
    pub global_id: Option<usize>,
    remote: Vec<RemoteLink>,
}

impl IndexEntry {
    /// Links sorted by rank.
    pub fn remotes(&self) -> &[RemoteLink] {
        &self.remote
    }

    pub fn remote(&self, rank: usize) -> Option<usize> {
        self.remote
            .binary_search_by_key(&rank, |l| l.rank)
            .ok()
            .map(|i| self.remote[i].local_id)
    }

    /// Insert or overwrite the link for `rank`.
    pub fn set_remote(&mut self, rank: usize, local_id: usize) {
        match self.remote.binary_search_by_key(&rank, |l| l.rank) {
            Ok(i) => self.remote[i].local_id = local_id,
            Err(i) => self.remote.insert(i, RemoteLink { rank, local_id }),
        }
    }

    pub fn remove_remote(&mut self, rank: usize) -> Option<usize> {
        let i = self.remote.binary_search_by_key(&rank, |l| l.rank).ok()?;
        Some(self.remote.remove(i).local_id)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IndexMapTable {
    tables: [Vec<IndexEntry>; EntityKind::COUNT],
}

impl IndexMapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.tables[kind.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(Vec::is_empty)
    }

    /// Grow the table for `kind` to `n` entries. Never shrinks.
    pub fn resize(&mut self, kind: EntityKind, n: usize) {
        let table = &mut self.tables[kind.index()];
        if n > table.len() {
            table.reserve_exact(n - table.len());
            table.resize_with(n, IndexEntry::default);
        }
    }

    /// Drop every entry of `kind` and size the table to `n` empty entries.
    pub fn reset(&mut self, kind: EntityKind, n: usize) {
        let table = &mut self.tables[kind.index()];
        table.clear();
        table.resize_with(n, IndexEntry::default);
    }

    pub fn set_nv(&mut self, n: usize) {
        self.resize(EntityKind::Vertex, n);
    }

    pub fn set_nedge(&mut self, n: usize) {
        self.resize(EntityKind::Edge, n);
    }

    pub fn set_nface(&mut self, n: usize) {
        self.resize(EntityKind::Face, n);
    }

    pub fn set_ne(&mut self, n: usize) {
        self.resize(EntityKind::VolumeElement, n);
    }

    pub fn set_nse(&mut self, n: usize) {
        self.resize(EntityKind::SurfaceElement, n);
    }

    pub fn set_nseg(&mut self, n: usize) {
        self.resize(EntityKind::BoundarySegment, n);
    }

    pub fn entry(&self, kind: EntityKind, local: usize) -> Option<&IndexEntry> {
        self.tables[kind.index()].get(local)
    }

    fn entry_mut(&mut self, kind: EntityKind, local: usize) -> Result<&mut IndexEntry, MeshShardError> {
        let table = &mut self.tables[kind.index()];
        let len = table.len();
        table
            .get_mut(local)
            .ok_or(MeshShardError::LocalIndexOutOfRange {
                kind,
                index: local,
                len,
            })
    }

    pub fn global(&self, kind: EntityKind, local: usize) -> Option<usize> {
        self.entry(kind, local).and_then(|e| e.global_id)
    }

    pub fn set_global(
        &mut self,
        kind: EntityKind,
        local: usize,
        global: usize,
    ) -> Result<(), MeshShardError> {
        self.entry_mut(kind, local)?.global_id = Some(global);
        Ok(())
    }

    pub fn remote(&self, kind: EntityKind, local: usize, rank: usize) -> Option<usize> {
        self.entry(kind, local).and_then(|e| e.remote(rank))
    }

    /// Record that `local` is `remote_id` on `rank`, replacing any earlier link to `rank`.
    pub fn set_remote(
        &mut self,
        kind: EntityKind,
        local: usize,
        rank: usize,
        remote_id: usize,
    ) -> Result<(), MeshShardError> {
        self.entry_mut(kind, local)?.set_remote(rank, remote_id);
        Ok(())
    }

    pub fn remotes(&self, kind: EntityKind, local: usize) -> &[RemoteLink] {
        self.entry(kind, local).map_or(&[], IndexEntry::remotes)
    }

    /// Ranks other than `exclude` holding a copy of `local`.
    pub fn dist_procs(
        &self,
        kind: EntityKind,
        local: usize,
        exclude: usize,
    ) -> impl Iterator<Item = usize> + '_ {
        self.remotes(kind, local)
            .iter()
            .map(|l| l.rank)
            .filter(move |&r| r != exclude)
    }

    /// `(local, remote_local)` pairs of every entity of `kind` linked to `rank`.
    pub fn shared_with(
        &self,
        kind: EntityKind,
        rank: usize,
    ) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.tables[kind.index()]
            .iter()
            .enumerate()
            .filter_map(move |(i, e)| e.remote(rank).map(|r| (i, r)))
    }

    /// Every rank linked from any entity of `kind`.
    pub fn neighbor_ranks(&self, kind: EntityKind) -> BTreeSet<usize> {
        self.tables[kind.index()]
            .iter()
            .flat_map(|e| e.remote.iter().map(|l| l.rank))
            .collect()
    }

    /// Keep only the links of `kind` matching `keep`.
    pub fn retain_remotes(&mut self, kind: EntityKind, mut keep: impl FnMut(&RemoteLink) -> bool) {
        for entry in &mut self.tables[kind.index()] {
            entry.remote.retain(|l| keep(l));
        }
    }

    /// Forget every global id of `kind`; remote links stay.
    pub fn clear_globals(&mut self, kind: EntityKind) {
        for entry in &mut self.tables[kind.index()] {
            entry.global_id = None;
        }
    }

    /// Reverse lookup from global id to local index for `kind`.
    pub fn global_to_local(&self, kind: EntityKind) -> crate::overlap::perf::FastMap<usize, usize> {
        self.tables[kind.index()]
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.global_id.map(|g| (g, i)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_remote_overwrites_existing_rank() {
        let mut t = IndexMapTable::new();
        t.set_nv(3);
        t.set_remote(EntityKind::Vertex, 1, 2, 10).unwrap();
        t.set_remote(EntityKind::Vertex, 1, 4, 40).unwrap();
        t.set_remote(EntityKind::Vertex, 1, 2, 11).unwrap();
        assert_eq!(
            t.remotes(EntityKind::Vertex, 1),
            &[
                RemoteLink { rank: 2, local_id: 11 },
                RemoteLink { rank: 4, local_id: 40 }
            ]
        );
        assert_eq!(t.dist_procs(EntityKind::Vertex, 1, 4).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn resize_preserves_and_never_shrinks() {
        let mut t = IndexMapTable::new();
        t.set_nface(2);
        t.set_global(EntityKind::Face, 1, 99).unwrap();
        t.set_nface(5);
        assert_eq!(t.global(EntityKind::Face, 1), Some(99));
        assert_eq!(t.global(EntityKind::Face, 4), None);
        t.set_nface(1);
        assert_eq!(t.len(EntityKind::Face), 5);
        t.reset(EntityKind::Face, 1);
        assert_eq!(t.len(EntityKind::Face), 1);
        assert_eq!(t.global(EntityKind::Face, 0), None);
    }

    #[test]
    fn out_of_range_is_an_error() {
        let mut t = IndexMapTable::new();
        t.set_ne(1);
        let err = t.set_global(EntityKind::VolumeElement, 3, 0).unwrap_err();
        assert_eq!(
            err,
            MeshShardError::LocalIndexOutOfRange {
                kind: EntityKind::VolumeElement,
                index: 3,
                len: 1
            }
        );
    }

    #[test]
    fn shared_with_and_neighbors() {
        let mut t = IndexMapTable::new();
        t.set_nedge(4);
        t.set_remote(EntityKind::Edge, 0, 1, 7).unwrap();
        t.set_remote(EntityKind::Edge, 3, 1, 2).unwrap();
        t.set_remote(EntityKind::Edge, 3, 5, 9).unwrap();
        assert_eq!(
            t.shared_with(EntityKind::Edge, 1).collect::<Vec<_>>(),
            vec![(0, 7), (3, 2)]
        );
        assert_eq!(
            t.neighbor_ranks(EntityKind::Edge).into_iter().collect::<Vec<_>>(),
            vec![1, 5]
        );
        t.retain_remotes(EntityKind::Edge, |l| l.rank != 1);
        assert_eq!(t.shared_with(EntityKind::Edge, 1).count(), 0);
    }
}
