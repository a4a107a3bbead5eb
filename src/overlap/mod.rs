//! Cross-rank bookkeeping for a shard: which local entities exist elsewhere,
//! under which remote local ids, and which local copies are ghosts.

pub mod exchange;
pub mod index_map;
pub mod perf;

pub use exchange::ExchangeMarkerSet;
pub use index_map::{IndexEntry, IndexMapTable, RemoteLink};
