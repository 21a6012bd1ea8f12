//! Pool header and region partitioning.
//!
//! ```text
//! 0        40       56                                                  pool_size
//! +--------+--------+----------------+----------------+------------------+
//! | fixed  | block  |  key region    | box metadata   |  value region    |
//! | header | meta   |  (trie nodes)  | (buddy tags)   |  (value bytes)   |
//! +--------+--------+----------------+----------------+------------------+
//!                   ^key_offset      ^boxmeta_offset  ^value_offset
//! ```
//!
//! All offsets are relative to the start of the pool so the same bytes work
//! at any base address.

use blockalloc::{BlockMeta, BLOCK_META_BYTES};
use boxalloc::{BoxAllocator, BoxError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use config::PoolConfig;
use std::io::Write;
use tracing::{debug, info};

use crate::node;
use crate::{MemKvError, Resource, Result};

/// Marker written at offset 0 once a pool is fully initialized.
pub const MAGIC: &[u8; 6] = b"memkv\0";

const FIXED_HEADER_BYTES: usize = 6 + 2 + 8 * 4;

/// Bytes reserved at the start of every pool.
pub const HEADER_BYTES: usize = FIXED_HEADER_BYTES + BLOCK_META_BYTES;

/// Decoded pool header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub alphabet_size: u16,
    pub pool_size: u64,
    pub key_offset: u64,
    pub boxmeta_offset: u64,
    pub value_offset: u64,
    /// Trie node allocator state as of the last read.
    pub blocks: BlockMeta,
}

/// Sizes of the three regions after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub key_size: u64,
    pub boxmeta_size: u64,
    pub value_size: u64,
}

/// Rounds `size` down to a multiple of `8 * 16^k`, the largest such unit
/// not exceeding `size`. Sizes below 8 round to zero.
#[must_use]
pub fn align_value_share(size: u64) -> u64 {
    if size < 8 {
        return 0;
    }
    let mut unit = 8u64;
    while unit <= size / 16 {
        unit *= 16;
    }
    size / unit * unit
}

/// Splits `available` bytes between the three regions by weight.
///
/// Key and box-metadata shares are rounded down to 8 bytes. The value region
/// takes every remaining byte and runs to the end of the pool; its aligned
/// share from [`align_value_share`] is only logged, along with how much the
/// fold-back added on top of it.
pub fn partition(available: u64, config: &PoolConfig) -> Result<Partition> {
    let total = config.total_weight();
    if total == 0 {
        return Err(MemKvError::InvalidArgument(
            "all region weights are zero".into(),
        ));
    }
    let share = |weight: u32| (available as u128 * weight as u128 / total as u128) as u64;

    let key_size = share(config.key_weight) / 8 * 8;
    let boxmeta_size = share(config.boxmeta_weight) / 8 * 8;
    let value_size = available - key_size - boxmeta_size;
    debug!(
        key_size,
        boxmeta_size,
        value_size,
        folded = value_size - align_value_share(share(config.value_weight)),
        "partitioned pool"
    );
    Ok(Partition {
        key_size,
        boxmeta_size,
        value_size,
    })
}

/// True when the pool starts with the magic marker.
#[must_use]
pub fn is_initialized(pool: &[u8]) -> bool {
    pool.len() >= MAGIC.len() && &pool[..MAGIC.len()] == MAGIC
}

/// Formats `pool` as an empty store for an alphabet of `alphabet_size`
/// symbols.
pub fn initialize(pool: &mut [u8], alphabet_size: u16, config: &PoolConfig) -> Result<Header> {
    if pool.is_empty() {
        return Err(MemKvError::InvalidArgument("pool is empty".into()));
    }
    if alphabet_size == 0 || alphabet_size > 256 {
        return Err(MemKvError::InvalidArgument(format!(
            "alphabet size {} outside 1..=256",
            alphabet_size
        )));
    }
    if config.total_weight() == 0 {
        return Err(MemKvError::InvalidArgument(
            "all region weights are zero".into(),
        ));
    }
    if pool.len() <= HEADER_BYTES {
        return Err(MemKvError::OutOfMemory(Resource::Header));
    }
    if is_initialized(pool) {
        return Err(MemKvError::AlreadyInitialized);
    }

    let pool_size = pool.len() as u64;
    let part = partition(pool_size - HEADER_BYTES as u64, config)?;
    let key_offset = HEADER_BYTES as u64;
    let boxmeta_offset = key_offset + part.key_size;
    let value_offset = boxmeta_offset + part.boxmeta_size;

    let mut blocks = BlockMeta::init(part.key_size, node::node_size(alphabet_size) as u32)?;
    let mut header = Header {
        alphabet_size,
        pool_size,
        key_offset,
        boxmeta_offset,
        value_offset,
        blocks,
    };

    let regions = header.regions_mut(pool);
    let root = blocks
        .alloc(regions.keys)?
        .ok_or(MemKvError::OutOfMemory(Resource::Nodes))?;
    node::init(regions.keys, blocks.offset_of(root), alphabet_size);
    let boxes = BoxAllocator::init(regions.boxmeta, part.value_size).map_err(|e| match e {
        BoxError::MetaTooSmall { .. } => MemKvError::OutOfMemory(Resource::Values),
        other => other.into(),
    })?;
    header.blocks = blocks;

    // Everything but the magic first; the magic makes the pool valid.
    let mut raw = [0u8; HEADER_BYTES];
    header.write_to(&mut &mut raw[..])?;
    regions.head[MAGIC.len()..HEADER_BYTES].copy_from_slice(&raw[MAGIC.len()..]);
    regions.head[..MAGIC.len()].copy_from_slice(MAGIC);

    info!(
        pool_size,
        alphabet_size,
        node_capacity = blocks.capacity(),
        value_capacity = boxes.capacity(),
        "initialized pool"
    );
    Ok(header)
}

impl Header {
    /// Serializes the full header, magic included.
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(MAGIC)?;
        w.write_u16::<LittleEndian>(self.alphabet_size)?;
        w.write_u64::<LittleEndian>(self.pool_size)?;
        w.write_u64::<LittleEndian>(self.key_offset)?;
        w.write_u64::<LittleEndian>(self.boxmeta_offset)?;
        w.write_u64::<LittleEndian>(self.value_offset)?;
        self.blocks.write_to(w)
    }

    /// Parses and validates the header at the start of `pool`.
    pub fn read_from(pool: &[u8]) -> Result<Self> {
        if pool.len() < HEADER_BYTES || !is_initialized(pool) {
            return Err(MemKvError::NotInitialized);
        }
        let mut r = &pool[MAGIC.len()..HEADER_BYTES];
        let header = Header {
            alphabet_size: r.read_u16::<LittleEndian>()?,
            pool_size: r.read_u64::<LittleEndian>()?,
            key_offset: r.read_u64::<LittleEndian>()?,
            boxmeta_offset: r.read_u64::<LittleEndian>()?,
            value_offset: r.read_u64::<LittleEndian>()?,
            blocks: BlockMeta::read_from(&mut r)?,
        };
        header.validate(pool.len() as u64)?;
        Ok(header)
    }

    fn validate(&self, pool_len: u64) -> Result<()> {
        let corrupt = |what: String| Err(MemKvError::Corrupt(what));
        if self.alphabet_size == 0 || self.alphabet_size > 256 {
            return corrupt(format!("alphabet size {}", self.alphabet_size));
        }
        if self.pool_size > pool_len {
            return corrupt(format!(
                "header claims {} bytes but the pool has {}",
                self.pool_size, pool_len
            ));
        }
        let ordered = HEADER_BYTES as u64 <= self.key_offset
            && self.key_offset <= self.boxmeta_offset
            && self.boxmeta_offset <= self.value_offset
            && self.value_offset <= self.pool_size;
        if !ordered {
            return corrupt(format!(
                "region offsets {}/{}/{} out of order for a {}-byte pool",
                self.key_offset, self.boxmeta_offset, self.value_offset, self.pool_size
            ));
        }
        let b = &self.blocks;
        if b.item_size() as usize != node::node_size(self.alphabet_size) {
            return corrupt(format!(
                "node size {} does not match alphabet size {}",
                b.item_size(),
                self.alphabet_size
            ));
        }
        let key_region = self.boxmeta_offset - self.key_offset;
        if b.capacity() as u64 * b.item_size() as u64 > key_region
            || b.high_water() > b.capacity()
            || b.high_water() == 0
        {
            return corrupt(format!(
                "node allocator ({} of {} used) does not fit the key region",
                b.high_water(),
                b.capacity()
            ));
        }
        if let Some(head) = b.free_head() {
            if head >= b.high_water() {
                return corrupt(format!(
                    "node free list starts at {} beyond high-water mark {}",
                    head,
                    b.high_water()
                ));
            }
        }
        Ok(())
    }

    pub fn key_region_size(&self) -> u64 {
        self.boxmeta_offset - self.key_offset
    }

    pub fn boxmeta_region_size(&self) -> u64 {
        self.value_offset - self.boxmeta_offset
    }

    pub fn value_region_size(&self) -> u64 {
        self.pool_size - self.value_offset
    }

    pub(crate) fn regions<'p>(&self, pool: &'p [u8]) -> Regions<'p> {
        let pool = &pool[..self.pool_size as usize];
        let (head, rest) = pool.split_at(self.key_offset as usize);
        let (keys, rest) = rest.split_at(self.key_region_size() as usize);
        let (boxmeta, values) = rest.split_at(self.boxmeta_region_size() as usize);
        Regions {
            head,
            keys,
            boxmeta,
            values,
        }
    }

    pub(crate) fn regions_mut<'p>(&self, pool: &'p mut [u8]) -> RegionsMut<'p> {
        let pool = &mut pool[..self.pool_size as usize];
        let (head, rest) = pool.split_at_mut(self.key_offset as usize);
        let (keys, rest) = rest.split_at_mut(self.key_region_size() as usize);
        let (boxmeta, values) = rest.split_at_mut(self.boxmeta_region_size() as usize);
        RegionsMut {
            head,
            keys,
            boxmeta,
            values,
        }
    }
}

/// Borrowed views of the four pool areas.
pub(crate) struct Regions<'p> {
    pub head: &'p [u8],
    pub keys: &'p [u8],
    pub boxmeta: &'p [u8],
    pub values: &'p [u8],
}

pub(crate) struct RegionsMut<'p> {
    pub head: &'p mut [u8],
    pub keys: &'p mut [u8],
    pub boxmeta: &'p mut [u8],
    pub values: &'p mut [u8],
}

/// Current node allocator state. Reloaded on every operation so several
/// handles over one shared mapping see each other's allocations.
pub(crate) fn load_blocks(head: &[u8]) -> Result<BlockMeta> {
    Ok(BlockMeta::read_from(&mut &head[FIXED_HEADER_BYTES..HEADER_BYTES])?)
}

pub(crate) fn store_blocks(head: &mut [u8], blocks: &BlockMeta) -> Result<()> {
    blocks.write_to(&mut &mut head[FIXED_HEADER_BYTES..HEADER_BYTES])?;
    Ok(())
}
