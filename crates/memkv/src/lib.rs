//! # MemKv - key-value store inside one byte pool
//!
//! Everything the store needs lives in a single caller-supplied, fixed-size
//! buffer: a header, a trie of fixed-size nodes indexing the keys, and a
//! buddy-allocated value region. Nothing inside the pool is a pointer; every
//! reference is an offset or block id relative to the pool start, so the same
//! bytes can be written to a file, mapped elsewhere and reopened.
//!
//! ## Architecture
//!
//! ```text
//! key bytes
//!   |
//!   v  Alphabet::encode        (byte -> index < N, else SymbolOutOfRange)
//! ┌───────────────────────────────────────────────┐
//! │                    MEMKV                      │
//! │                                               │
//! │ write.rs → walk trie, allocate missing nodes  │
//! │              (blockalloc, key region)         │
//! │            → place value                      │
//! │              (boxalloc, value region)         │
//! │                                               │
//! │ read.rs  → walk trie → terminal? → value      │
//! │          → depth-first enumeration            │
//! │                                               │
//! │ compaction.rs → reclaim valueless subtrees    │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                              |
//! |----------------|------------------------------------------------------|
//! | [`lib.rs`]     | `MemKv` struct, `init`/`open`, accessors, `stats`    |
//! | [`layout`]     | header codec, region partitioning, initialization    |
//! | [`node`]       | trie node word and child-slot codec                  |
//! | [`write`]      | `set()`, `del()`                                     |
//! | [`read`]       | `get()`, `keys()`, `keys_encoded()`                  |
//! | [`compaction`] | `compact()`                                          |
//!
//! ## Example
//!
//! ```rust
//! use alphabet::SymbolTable;
//! use config::PoolConfig;
//! use memkv::MemKv;
//!
//! let pool = vec![0u8; 64 * 1024];
//! let mut kv = MemKv::init(pool, SymbolTable::compact(), &PoolConfig::default()).unwrap();
//! kv.set(b"user:1", b"alice").unwrap();
//! assert_eq!(kv.get(b"user:1").unwrap(), Some(&b"alice"[..]));
//! ```
//!
//! ## Concurrency
//!
//! There is no locking inside. `MemKv` is `Send` whenever its buffer and
//! alphabet are, so wrap it in a `Mutex` to share it between threads. Node
//! allocator state is re-read from the pool on every call, never cached.
mod compaction;
mod error;
pub mod layout;
mod node;
mod read;
mod write;

pub use alphabet::{Alphabet, Raw, SymbolTable};
pub use boxalloc::BoxStats;
pub use config::PoolConfig;
pub use error::{MemKvError, Resource, Result};
pub use layout::{Header, HEADER_BYTES};
pub use node::node_size;

use alphabet::{encode_key, AlphabetError};
use boxalloc::BoxAllocator;
use tracing::info;

/// A key-value store over the pool `B`, with keys mapped through `A`.
pub struct MemKv<B, A = Raw> {
    pub(crate) pool: B,
    pub(crate) alphabet: A,
    /// Region layout read at open. Only `blocks` changes afterwards, and that
    /// is always reloaded from the pool.
    pub(crate) header: Header,
    /// Enumeration skips keys reaching this length.
    pub(crate) max_key_depth: usize,
}

/// Allocator usage for the human-readable pool dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub node_size: usize,
    pub node_capacity: u32,
    /// Node ids handed out so far, including freed ones.
    pub nodes_allocated: u32,
    /// Ids sitting on the free list.
    pub nodes_free: u32,
    /// Bytes of the value region the box allocator manages.
    pub value_capacity: u64,
    pub values: BoxStats,
}

impl<B, A> std::fmt::Debug for MemKv<B, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemKv")
            .field("pool_size", &self.header.pool_size)
            .field("alphabet_size", &self.header.alphabet_size)
            .field("key_offset", &self.header.key_offset)
            .field("boxmeta_offset", &self.header.boxmeta_offset)
            .field("value_offset", &self.header.value_offset)
            .field("max_key_depth", &self.max_key_depth)
            .finish()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>, A: Alphabet> MemKv<B, A> {
    /// Formats `pool` as an empty store and attaches to it.
    ///
    /// Fails with `AlreadyInitialized` if the pool already carries the magic
    /// marker; use [`open`](MemKv::open) for that.
    pub fn init(mut pool: B, alphabet: A, config: &PoolConfig) -> Result<Self> {
        layout::initialize(pool.as_mut(), alphabet.size(), config)?;
        let mut kv = Self::open(pool, alphabet)?;
        kv.max_key_depth = config.max_key_depth;
        Ok(kv)
    }
}

impl<B: AsRef<[u8]>, A: Alphabet> MemKv<B, A> {
    /// Attaches to an initialized pool, wherever it is mapped.
    ///
    /// Read-only buffers work too; only the mutating methods need `AsMut`.
    pub fn open(pool: B, alphabet: A) -> Result<Self> {
        let header = Header::read_from(pool.as_ref())?;
        if header.alphabet_size != alphabet.size() {
            return Err(MemKvError::AlphabetMismatch {
                pool: header.alphabet_size,
                alphabet: alphabet.size(),
            });
        }
        let regions = header.regions(pool.as_ref());
        let boxes = BoxAllocator::open(regions.boxmeta)?;
        if boxes.capacity() > header.value_region_size() {
            return Err(MemKvError::Corrupt(format!(
                "value allocator manages {} bytes but the region has {}",
                boxes.capacity(),
                header.value_region_size()
            )));
        }
        info!(
            pool_size = header.pool_size,
            alphabet_size = header.alphabet_size,
            nodes = header.blocks.high_water(),
            "opened pool"
        );
        Ok(Self {
            pool,
            alphabet,
            header,
            max_key_depth: config::DEFAULT_MAX_KEY_DEPTH,
        })
    }

    /// The header as read at open, with node allocator state refreshed.
    pub fn header(&self) -> Result<Header> {
        let regions = self.header.regions(self.pool.as_ref());
        Ok(Header {
            blocks: layout::load_blocks(regions.head)?,
            ..self.header
        })
    }

    /// Walks both allocators and reports their usage.
    pub fn stats(&self) -> Result<PoolStats> {
        let regions = self.header.regions(self.pool.as_ref());
        let blocks = layout::load_blocks(regions.head)?;
        let boxes = BoxAllocator::open(regions.boxmeta)?;
        Ok(PoolStats {
            node_size: blocks.item_size() as usize,
            node_capacity: blocks.capacity(),
            nodes_allocated: blocks.high_water(),
            nodes_free: blocks.free_count(regions.keys),
            value_capacity: boxes.capacity(),
            values: boxes.stats(),
        })
    }

    #[must_use]
    pub fn alphabet(&self) -> &A {
        &self.alphabet
    }

    #[must_use]
    pub fn max_key_depth(&self) -> usize {
        self.max_key_depth
    }

    /// Changes the enumeration depth limit. Zero is treated as one.
    pub fn set_max_key_depth(&mut self, depth: usize) {
        self.max_key_depth = depth.max(1);
    }

    /// Releases the backing buffer.
    pub fn into_inner(self) -> B {
        self.pool
    }

    /// Maps `key` to symbol indices, each checked against the pool's alphabet
    /// size before it is ever used as a child slot.
    pub(crate) fn encode(&self, key: &[u8]) -> Result<Vec<u8>> {
        let alphabet_size = self.header.alphabet_size;
        let out_of_range = |byte: u8, position: usize| MemKvError::SymbolOutOfRange {
            byte,
            position,
            alphabet_size,
        };
        let encoded = encode_key(&self.alphabet, key).map_err(|e| match e {
            AlphabetError::InvalidSymbol { byte, position } => out_of_range(byte, position),
            other => MemKvError::InvalidArgument(other.to_string()),
        })?;
        if let Some(position) = encoded.iter().position(|&i| i as u16 >= alphabet_size) {
            return Err(out_of_range(key[position], position));
        }
        Ok(encoded)
    }
}

pub(crate) fn ensure_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(MemKvError::InvalidArgument("key is empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
