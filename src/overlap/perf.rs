//! Hash containers used on hot lookup paths (global-id tables, descriptor matching).
//!
//! Iteration order of these aliases is never relied upon: every path that emits
//! data onto the wire or assigns ids sorts first.

#[cfg(feature = "fast-hash")]
pub type FastMap<K, V> = ahash::AHashMap<K, V>;

#[cfg(not(feature = "fast-hash"))]
pub type FastMap<K, V> = hashbrown::HashMap<K, V>;

#[cfg(feature = "fast-hash")]
pub type FastSet<T> = ahash::AHashSet<T>;

#[cfg(not(feature = "fast-hash"))]
pub type FastSet<T> = hashbrown::HashSet<T>;
