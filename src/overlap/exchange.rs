//! Exchange Marker Set: per entity kind, one bitset per rank marking the local
//! entities that are also present on that rank, plus a ghost bitset marking
//! entities that are mirrored copies of another rank's primary entities.

use crate::topology::entity::EntityKind;
use fixedbitset as fb;

#[derive(Clone, Debug)]
pub struct ExchangeMarkerSet {
    world_size: usize,
    /// `exchange[kind][rank]`
    exchange: [Vec<fb::FixedBitSet>; EntityKind::COUNT],
    ghost: [fb::FixedBitSet; EntityKind::COUNT],
}

impl ExchangeMarkerSet {
    pub fn new(world_size: usize) -> Self {
        Self {
            world_size,
            exchange: std::array::from_fn(|_| vec![fb::FixedBitSet::new(); world_size]),
            ghost: std::array::from_fn(|_| fb::FixedBitSet::new()),
        }
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Number of local entities of `kind` the markers are sized for.
    pub fn len(&self, kind: EntityKind) -> usize {
        self.ghost[kind.index()].len()
    }

    /// Grow every bitset of `kind` to `n` bits. Never shrinks.
    pub fn resize(&mut self, kind: EntityKind, n: usize) {
        for bits in &mut self.exchange[kind.index()] {
            bits.grow(n);
        }
        self.ghost[kind.index()].grow(n);
    }

    /// Clear all exchange bits of `kind`, keeping sizes and ghost flags.
    pub fn clear_exchange(&mut self, kind: EntityKind) {
        for bits in &mut self.exchange[kind.index()] {
            bits.clear();
        }
    }

    pub fn set_exchange(&mut self, kind: EntityKind, rank: usize, local: usize, on: bool) {
        if let Some(bits) = self.exchange[kind.index()].get_mut(rank) {
            if local >= bits.len() {
                bits.grow(local + 1);
            }
            bits.set(local, on);
        }
    }

    pub fn is_exchange(&self, kind: EntityKind, rank: usize, local: usize) -> bool {
        self.exchange[kind.index()]
            .get(rank)
            .is_some_and(|bits| bits.contains(local))
    }

    pub fn set_ghost(&mut self, kind: EntityKind, local: usize, on: bool) {
        let bits = &mut self.ghost[kind.index()];
        if local >= bits.len() {
            bits.grow(local + 1);
        }
        bits.set(local, on);
    }

    pub fn is_ghost(&self, kind: EntityKind, local: usize) -> bool {
        self.ghost[kind.index()].contains(local)
    }

    /// Ranks on which `local` is marked present.
    pub fn exchange_ranks(&self, kind: EntityKind, local: usize) -> impl Iterator<Item = usize> + '_ {
        self.exchange[kind.index()]
            .iter()
            .enumerate()
            .filter(move |(_, bits)| bits.contains(local))
            .map(|(r, _)| r)
    }

    /// Local entities of `kind` marked present on `rank`.
    pub fn exchanged_with(&self, kind: EntityKind, rank: usize) -> impl Iterator<Item = usize> + '_ {
        self.exchange[kind.index()]
            .get(rank)
            .into_iter()
            .flat_map(|bits| bits.ones())
    }

    pub fn ghosts(&self, kind: EntityKind) -> impl Iterator<Item = usize> + '_ {
        self.ghost[kind.index()].ones()
    }

    pub fn is_shared(&self, kind: EntityKind, local: usize) -> bool {
        self.exchange_ranks(kind, local).next().is_some()
    }
}
