//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees). Delivery is
//! FIFO per `(source, destination, tag)` channel. All handles are **waitable**;
//! protocol code calls `.wait()` before it trusts that a buffer is ready.

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::{Arc, Barrier};

/// Rank of the coordinating process.
pub const COORDINATOR: usize = 0;

/// Process identity handed to every protocol component.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RankContext {
    pub self_rank: usize,
    pub world_size: usize,
}

impl RankContext {
    pub fn new(self_rank: usize, world_size: usize) -> Self {
        Self {
            self_rank,
            world_size,
        }
    }

    pub fn is_coordinator(&self) -> bool {
        self.self_rank == COORDINATOR
    }

    /// Ranks that receive a shard from the coordinator.
    pub fn workers(&self) -> std::ops::Range<usize> {
        1..self.world_size.max(1)
    }

    pub fn n_workers(&self) -> usize {
        self.world_size.saturating_sub(1)
    }
}

/// Typed message tag; protocol phases reserve disjoint tags.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Derived tag `base + n`, wrapping.
    #[inline]
    pub const fn offset(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n))
    }
}

/// Non-blocking point-to-point communication plus a collective barrier.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of up to `buf.len()` bytes; the bytes are returned by `wait`.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    fn barrier(&self);

    /// True for the compile-time serial communicator.
    fn is_no_comm(&self) -> bool {
        false
    }

    fn context(&self) -> RankContext {
        RankContext::new(self.rank(), self.size())
    }
}

/// Anything that can be waited on.
///
/// Receive handles yield the received bytes. Send handles yield `None` once
/// the outgoing buffer may be reused.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Compile-time no-op comm for pure serial runs: a world of one rank.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
    fn barrier(&self) {}
    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- LocalComm: one rank per thread inside a single process ---

type Key = (usize, usize, u16); // (src, dst, tag)

struct LocalWorld {
    mailbox: DashMap<Key, VecDeque<Bytes>>,
    lock: Mutex<()>,
    arrived: Condvar,
    barrier: Barrier,
}

impl LocalWorld {
    fn try_pop(&self, key: &Key) -> Option<Bytes> {
        self.mailbox.get_mut(key).and_then(|mut q| q.pop_front())
    }
}

/// In-process communicator; create a whole world with [`LocalComm::world`] and
/// move one handle into each rank's thread.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    world: Arc<LocalWorld>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl LocalComm {
    /// One communicator per rank of an `n`-rank world.
    pub fn world(n: usize) -> Vec<LocalComm> {
        let world = Arc::new(LocalWorld {
            mailbox: DashMap::new(),
            lock: Mutex::new(()),
            arrived: Condvar::new(),
            barrier: Barrier::new(n.max(1)),
        });
        (0..n)
            .map(|rank| LocalComm {
                rank,
                size: n,
                world: Arc::clone(&world),
            })
            .collect()
    }
}

/// Pending receive on a [`LocalComm`]; blocks in `wait` until the message arrives.
pub struct LocalHandle {
    world: Arc<LocalWorld>,
    key: Key,
    len: usize,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let mut guard = self.world.lock.lock();
        loop {
            if let Some(bytes) = self.world.try_pop(&self.key) {
                let n = bytes.len().min(self.len);
                return Some(bytes[..n].to_vec());
            }
            self.world.arrived.wait(&mut guard);
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        self.world
            .mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        let _guard = self.world.lock.lock();
        self.world.arrived.notify_all();
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            world: Arc::clone(&self.world),
            key: (peer, self.rank, tag),
            len: buf.len(),
        }
    }

    fn barrier(&self) {
        self.world.barrier.wait();
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// MPI world communicator. Operations complete eagerly: `isend` returns
    /// once the standard-mode send has completed and `irecv` once the message
    /// has been received, so the protocols only ever wait on finished handles.
    pub struct MpiComm {
        _universe: Universe,
        pub world: SimpleCommunicator,
        pub rank: usize,
        pub size: usize,
    }

    impl MpiComm {
        /// Initialise MPI; `None` when MPI was already initialised.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                _universe: universe,
                world,
                rank,
                size,
            })
        }
    }

    pub struct MpiHandle(Option<Vec<u8>>);

    impl Wait for MpiHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.0
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiHandle {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
            MpiHandle(None)
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiHandle {
            let (data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(tag as i32);
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            MpiHandle(Some(data[..n].to_vec()))
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_roundtrip_two_ranks() {
        let comms = LocalComm::world(2);
        let mut recv_buf = [0u8; 4];
        let recv_handle = comms[1].irecv(0, 7, &mut recv_buf);
        comms[0].isend(1, 7, &[1, 2, 3, 4]).wait();
        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn local_fifo_per_channel() {
        let comms = LocalComm::world(2);
        for i in 0..10u8 {
            comms[0].isend(1, 3, &[i]);
        }
        let got: Vec<u8> = (0..10)
            .map(|_| comms[1].irecv(0, 3, &mut [0u8; 1]).wait().unwrap()[0])
            .collect();
        assert_eq!(got, (0u8..10).collect::<Vec<_>>());
    }

    #[test]
    fn receive_blocks_until_send_from_other_thread() {
        let mut comms = LocalComm::world(2);
        let c1 = comms.pop().unwrap();
        let c0 = comms.pop().unwrap();
        let h = std::thread::spawn(move || c1.irecv(0, 9, &mut [0u8; 2]).wait());
        std::thread::sleep(std::time::Duration::from_millis(10));
        c0.isend(1, 9, &[5, 6]);
        assert_eq!(h.join().unwrap(), Some(vec![5, 6]));
    }

    #[test]
    fn barrier_releases_all_ranks() {
        let comms = LocalComm::world(3);
        std::thread::scope(|s| {
            for c in &comms {
                s.spawn(move || c.barrier());
            }
        });
    }

    #[test]
    fn context_lists_workers() {
        let ctx = RankContext::new(0, 4);
        assert!(ctx.is_coordinator());
        assert_eq!(ctx.workers().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(NoComm.context().n_workers(), 0);
    }
}
