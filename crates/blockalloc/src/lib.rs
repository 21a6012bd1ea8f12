//! # Block Allocator
//!
//! Hands out fixed-size slots ("blocks") from a caller-supplied byte region and
//! identifies each one by a small integer id. The memkv trie stores its nodes
//! in blocks and links them together by id, never by address, so the region
//! can be re-mapped anywhere.
//!
//! All allocator state fits in a 16-byte [`BlockMeta`] record that the caller
//! persists wherever it likes (memkv keeps it in the pool header). The region
//! itself only holds block payloads, plus a 4-byte link in the first bytes of
//! every block sitting on the free list.
//!
//! ## Metadata layout
//!
//! ```text
//! [item_size: u32 LE][capacity: u32 LE][next: u32 LE][free_head: i32 LE]
//! ```
//!
//! `next` is the high-water mark: ids `0..next` have been handed out at least
//! once. `free_head` is `-1` when no block has been returned.
//!
//! ## Example
//!
//! ```rust
//! use blockalloc::BlockMeta;
//!
//! let mut region = vec![0u8; 256];
//! let mut meta = BlockMeta::init(region.len() as u64, 32).unwrap();
//! let id = meta.alloc(&mut region).unwrap().unwrap();
//! assert_eq!(meta.offset_of(id), 0);
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;
use thiserror::Error;

/// Serialized size of [`BlockMeta`] in bytes.
pub const BLOCK_META_BYTES: usize = 4 + 4 + 4 + 4;

/// Free-list terminator.
const NIL: i32 = -1;

/// Errors reported by the block allocator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    /// `item_size` was zero, or smaller than the free-list link.
    #[error("invalid block size {0} (must be >= 4)")]
    InvalidItemSize(u32),

    /// The id was never handed out, or is already on the free list.
    #[error("block {0} is not allocated")]
    NotAllocated(u32),

    /// Metadata bytes could not be decoded.
    #[error("io error: {0}")]
    Io(String),
}

impl From<io::Error> for BlockError {
    fn from(e: io::Error) -> Self {
        BlockError::Io(e.to_string())
    }
}

/// Bootstrap metadata for one block region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMeta {
    item_size: u32,
    capacity: u32,
    next: u32,
    free_head: i32,
}

impl BlockMeta {
    /// Prepares metadata for a region of `region_size` bytes split into
    /// `item_size`-byte blocks.
    ///
    /// The capacity is capped at `i32::MAX` so every id fits a signed 32-bit
    /// child slot. A region too small for a single block is accepted; every
    /// `alloc` on it simply reports exhaustion.
    pub fn init(region_size: u64, item_size: u32) -> Result<Self, BlockError> {
        if item_size < 4 {
            return Err(BlockError::InvalidItemSize(item_size));
        }
        let capacity = (region_size / item_size as u64).min(i32::MAX as u64) as u32;
        Ok(Self {
            item_size,
            capacity,
            next: 0,
            free_head: NIL,
        })
    }

    /// Allocates one block, preferring previously freed ids.
    ///
    /// Returns `Ok(None)` when the region is exhausted, and `NotAllocated`
    /// when the free list points past the high-water mark. The block
    /// contents are left as they are; callers initialize them.
    pub fn alloc(&mut self, region: &mut [u8]) -> Result<Option<u32>, BlockError> {
        if self.free_head != NIL {
            let id = self.free_head as u32;
            if self.free_head < 0 || id >= self.next {
                return Err(BlockError::NotAllocated(id));
            }
            let off = self.offset_of(id);
            let mut link = &region[off..off + 4];
            self.free_head = link.read_i32::<LittleEndian>()?;
            return Ok(Some(id));
        }
        if self.next >= self.capacity {
            return Ok(None);
        }
        let id = self.next;
        self.next += 1;
        Ok(Some(id))
    }

    /// Returns block `id` to the free list.
    ///
    /// Only ids below the high-water mark can be freed. Double frees are not
    /// detected beyond that check; the trie only frees blocks it has unlinked.
    pub fn free(&mut self, region: &mut [u8], id: u32) -> Result<(), BlockError> {
        if id >= self.next {
            return Err(BlockError::NotAllocated(id));
        }
        let off = self.offset_of(id);
        let mut link = &mut region[off..off + 4];
        link.write_i32::<LittleEndian>(self.free_head)?;
        self.free_head = id as i32;
        Ok(())
    }

    /// Byte offset of block `id` within the region.
    #[must_use]
    pub fn offset_of(&self, id: u32) -> usize {
        id as usize * self.item_size as usize
    }

    /// Fixed size of every block.
    #[must_use]
    pub fn item_size(&self) -> u32 {
        self.item_size
    }

    /// Maximum number of blocks the region can hold.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// First id on the free list, if any.
    #[must_use]
    pub fn free_head(&self) -> Option<u32> {
        (self.free_head != NIL).then_some(self.free_head as u32)
    }

    /// Number of ids handed out at least once.
    #[must_use]
    pub fn high_water(&self) -> u32 {
        self.next
    }

    /// Number of blocks currently on the free list. Walks the list.
    pub fn free_count(&self, region: &[u8]) -> u32 {
        let mut count = 0;
        let mut cur = self.free_head;
        while cur != NIL && count < self.next {
            let off = self.offset_of(cur as u32);
            let mut link = &region[off..off + 4];
            cur = match link.read_i32::<LittleEndian>() {
                Ok(v) => v,
                Err(_) => break,
            };
            count += 1;
        }
        count
    }

    /// Writes the metadata record to `w`.
    pub fn write_to<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.item_size)?;
        w.write_u32::<LittleEndian>(self.capacity)?;
        w.write_u32::<LittleEndian>(self.next)?;
        w.write_i32::<LittleEndian>(self.free_head)?;
        Ok(())
    }

    /// Reads a metadata record written by [`write_to`](BlockMeta::write_to).
    pub fn read_from<R: io::Read>(r: &mut R) -> Result<Self, BlockError> {
        let item_size = r.read_u32::<LittleEndian>()?;
        let capacity = r.read_u32::<LittleEndian>()?;
        let next = r.read_u32::<LittleEndian>()?;
        let free_head = r.read_i32::<LittleEndian>()?;
        if item_size < 4 {
            return Err(BlockError::InvalidItemSize(item_size));
        }
        Ok(Self {
            item_size,
            capacity,
            next,
            free_head,
        })
    }
}
