//! # Box Allocator
//!
//! A binary buddy allocator for variable-size value storage.
//!
//! The allocator is split across two regions that the caller owns:
//!
//! - the **metadata region**, which this crate reads and writes, and
//! - the **data region**, which it never touches. Offsets returned by
//!   [`BoxAllocator::alloc`] are relative to the start of the data region, and
//!   the caller copies value bytes there itself.
//!
//! Keeping every bookkeeping bit out of the data region means a freed block's
//! bytes stay intact until the space is handed out again, and values stay raw
//! (no length prefix): the exact length of each live allocation is tracked in
//! the metadata and reported by [`BoxAllocator::len_of`].
//!
//! ## Metadata layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ magic (u32 "BOX1") | granules (u32) | data_size (u64)    │
//! │ free_heads[32] (u32 each, 0x0FFF_FFFF = nil)             │
//! ├──────────────────────────────────────────────────────────┤
//! │ tag[0] (u64) | tag[1] | ... | tag[granules - 1]          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The data region is managed in 16-byte granules, one tag per granule.
//! Only the first granule of a block carries a tag:
//!
//! ```text
//! bit 63      head flag (granule starts a block)
//! bit 62      allocated flag
//! bits 56..61 order (block spans 2^order granules)
//! bits 0..55  allocated: exact byte length
//!             free: next (bits 28..55) | prev (bits 0..27) in the order's list
//! ```
//!
//! All integers are little-endian.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Allocation unit in bytes. Every block is a power-of-two number of granules.
pub const GRANULE: u64 = 16;

/// Number of free lists (block orders).
pub const MAX_ORDERS: usize = 32;

/// Size of the fixed metadata header that precedes the tag array.
pub const BOX_HEADER_BYTES: usize = 4 + 4 + 8 + MAX_ORDERS * 4;

/// Bytes of metadata needed per granule.
pub const TAG_BYTES: usize = 8;

/// Magic number identifying initialized metadata (ASCII "BOX1").
const BOX_MAGIC: u32 = 0x3158_4F42;

const NIL: u32 = 0x0FFF_FFFF;
/// Largest granule count whose indices never collide with `NIL`.
const MAX_GRANULES: u64 = NIL as u64;

const HEAD: u64 = 1 << 63;
const ALLOCATED: u64 = 1 << 62;
const ORDER_SHIFT: u32 = 56;
const ORDER_MASK: u64 = 0x3F;
const PAYLOAD_MASK: u64 = (1 << 56) - 1;
const LINK_SHIFT: u32 = 28;
const LINK_MASK: u64 = (1 << 28) - 1;

const GRANULES_AT: usize = 4;
const DATA_SIZE_AT: usize = 8;
const HEADS_AT: usize = 16;

/// Errors reported by the box allocator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoxError {
    /// The metadata region cannot even hold the fixed header.
    #[error("metadata region too small: {have} bytes, need at least {need}")]
    MetaTooSmall { have: usize, need: usize },

    /// No free block is large enough.
    #[error("out of value space: cannot fit {requested} bytes")]
    Exhausted { requested: u64 },

    /// The offset does not start a live allocation (never allocated, or freed).
    #[error("offset {0} does not start a live allocation")]
    InvalidOffset(u64),

    /// The metadata region does not describe a valid allocator.
    #[error("corrupt allocator metadata: {0}")]
    Corrupt(String),
}

/// Usage summary produced by walking every block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoxStats {
    /// Bytes held by live blocks (rounded up to block size).
    pub used_bytes: u64,
    /// Bytes sitting in free blocks.
    pub free_bytes: u64,
    /// Exact bytes requested by live allocations.
    pub payload_bytes: u64,
    /// Number of live allocations.
    pub live: u64,
}

/// A buddy allocator whose entire state lives in the metadata buffer `M`.
///
/// Read-only queries need `M: AsRef<[u8]>`; allocation and freeing also need
/// `AsMut<[u8]>`. Both `&[u8]` and `&mut [u8]` work, so the allocator can be
/// viewed over a slice of a larger pool without copying.
#[derive(Debug)]
pub struct BoxAllocator<M> {
    meta: M,
    granules: u32,
}

impl<M: AsRef<[u8]>> BoxAllocator<M> {
    /// Attaches to metadata previously written by [`init`](BoxAllocator::init).
    pub fn open(meta: M) -> Result<Self, BoxError> {
        let bytes = meta.as_ref();
        if bytes.len() < BOX_HEADER_BYTES {
            return Err(BoxError::MetaTooSmall {
                have: bytes.len(),
                need: BOX_HEADER_BYTES,
            });
        }
        if LittleEndian::read_u32(&bytes[0..4]) != BOX_MAGIC {
            return Err(BoxError::Corrupt("bad magic".into()));
        }
        let granules = LittleEndian::read_u32(&bytes[GRANULES_AT..GRANULES_AT + 4]);
        let tracked = ((bytes.len() - BOX_HEADER_BYTES) / TAG_BYTES) as u64;
        if granules as u64 > tracked || granules as u64 >= MAX_GRANULES {
            return Err(BoxError::Corrupt(format!(
                "{} granules recorded but only {} tracked",
                granules, tracked
            )));
        }
        Ok(Self { meta, granules })
    }

    /// Bytes of the data region this allocator hands out.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.granules as u64 * GRANULE
    }

    /// Data region size recorded at init (may exceed [`capacity`](Self::capacity)
    /// when the metadata region could not track all of it).
    #[must_use]
    pub fn data_size(&self) -> u64 {
        let bytes = self.meta.as_ref();
        LittleEndian::read_u64(&bytes[DATA_SIZE_AT..DATA_SIZE_AT + 8])
    }

    /// Exact length of the live allocation starting at `offset`.
    #[must_use]
    pub fn len_of(&self, offset: u64) -> Option<u64> {
        let g = self.granule_of(offset).ok()?;
        let tag = self.tag(g);
        if tag & HEAD == 0 || tag & ALLOCATED == 0 {
            return None;
        }
        Some(tag & PAYLOAD_MASK)
    }

    /// Walks all blocks and summarizes usage.
    pub fn stats(&self) -> BoxStats {
        let mut stats = BoxStats::default();
        let mut g = 0u64;
        while g < self.granules as u64 {
            let tag = self.tag(g as u32);
            if tag & HEAD == 0 {
                // Not a block start; only possible with corrupt tags.
                g += 1;
                continue;
            }
            let span = 1u64 << order_of(tag);
            if tag & ALLOCATED != 0 {
                stats.used_bytes += span * GRANULE;
                stats.payload_bytes += tag & PAYLOAD_MASK;
                stats.live += 1;
            } else {
                stats.free_bytes += span * GRANULE;
            }
            g += span;
        }
        stats
    }

    fn granule_of(&self, offset: u64) -> Result<u32, BoxError> {
        if offset % GRANULE != 0 || offset / GRANULE >= self.granules as u64 {
            return Err(BoxError::InvalidOffset(offset));
        }
        Ok((offset / GRANULE) as u32)
    }

    fn tag(&self, g: u32) -> u64 {
        let at = BOX_HEADER_BYTES + g as usize * TAG_BYTES;
        LittleEndian::read_u64(&self.meta.as_ref()[at..at + TAG_BYTES])
    }

    fn free_head(&self, order: u32) -> u32 {
        let at = HEADS_AT + order as usize * 4;
        LittleEndian::read_u32(&self.meta.as_ref()[at..at + 4])
    }
}

impl<M: AsRef<[u8]> + AsMut<[u8]>> BoxAllocator<M> {
    /// Formats `meta` to manage a data region of `data_size` bytes.
    ///
    /// The managed size is rounded down to whole granules and capped by how
    /// many tags fit in `meta`. The range is carved greedily into the largest
    /// aligned power-of-two blocks, so sizes that are not a power of two still
    /// have every granule available.
    pub fn init(mut meta: M, data_size: u64) -> Result<Self, BoxError> {
        let have = meta.as_ref().len();
        if have < BOX_HEADER_BYTES {
            return Err(BoxError::MetaTooSmall {
                have,
                need: BOX_HEADER_BYTES,
            });
        }
        let tracked = ((have - BOX_HEADER_BYTES) / TAG_BYTES) as u64;
        let granules = (data_size / GRANULE).min(tracked).min(MAX_GRANULES - 1) as u32;

        {
            let bytes = meta.as_mut();
            LittleEndian::write_u32(&mut bytes[0..4], BOX_MAGIC);
            LittleEndian::write_u32(&mut bytes[GRANULES_AT..GRANULES_AT + 4], granules);
            LittleEndian::write_u64(&mut bytes[DATA_SIZE_AT..DATA_SIZE_AT + 8], data_size);
            for order in 0..MAX_ORDERS {
                let at = HEADS_AT + order * 4;
                LittleEndian::write_u32(&mut bytes[at..at + 4], NIL);
            }
            let tags_end = BOX_HEADER_BYTES + granules as usize * TAG_BYTES;
            bytes[BOX_HEADER_BYTES..tags_end].fill(0);
        }

        let mut alloc = Self { meta, granules };
        let mut g = 0u64;
        while g < granules as u64 {
            let remaining = granules as u64 - g;
            let mut order = (63 - remaining.leading_zeros()).min(MAX_ORDERS as u32 - 1);
            while g % (1u64 << order) != 0 {
                order -= 1;
            }
            alloc.push_free(g as u32, order);
            g += 1u64 << order;
        }
        Ok(alloc)
    }

    /// Allocates a block able to hold `size` bytes and records `size` as its
    /// exact length. Zero-length requests still take one granule so the
    /// returned offset is unique.
    pub fn alloc(&mut self, size: u64) -> Result<u64, BoxError> {
        if size > PAYLOAD_MASK {
            return Err(BoxError::Exhausted { requested: size });
        }
        let need = size.div_ceil(GRANULE).max(1);
        let order = need.next_power_of_two().trailing_zeros();
        if order as usize >= MAX_ORDERS {
            return Err(BoxError::Exhausted { requested: size });
        }

        let mut found = None;
        for o in order..MAX_ORDERS as u32 {
            if self.free_head(o) != NIL {
                found = Some(o);
                break;
            }
        }
        let mut o = found.ok_or(BoxError::Exhausted { requested: size })?;

        let g = self.free_head(o);
        self.remove_free(g, o);
        while o > order {
            o -= 1;
            self.push_free(g + (1u32 << o), o);
        }
        self.set_tag(g, HEAD | ALLOCATED | ((order as u64) << ORDER_SHIFT) | size);
        Ok(g as u64 * GRANULE)
    }

    /// Releases the allocation at `offset`, merging it with free buddies.
    pub fn free(&mut self, offset: u64) -> Result<(), BoxError> {
        let mut g = self.granule_of(offset)?;
        let tag = self.tag(g);
        if tag & HEAD == 0 || tag & ALLOCATED == 0 {
            return Err(BoxError::InvalidOffset(offset));
        }
        let mut order = order_of(tag);
        self.set_tag(g, 0);

        while (order as usize) + 1 < MAX_ORDERS {
            let span = 1u32 << order;
            let buddy = g ^ span;
            if buddy as u64 + span as u64 > self.granules as u64 {
                break;
            }
            let bt = self.tag(buddy);
            if bt & HEAD == 0 || bt & ALLOCATED != 0 || order_of(bt) != order {
                break;
            }
            self.remove_free(buddy, order);
            self.set_tag(buddy, 0);
            g = g.min(buddy);
            order += 1;
        }
        self.push_free(g, order);
        Ok(())
    }

    fn set_tag(&mut self, g: u32, tag: u64) {
        let at = BOX_HEADER_BYTES + g as usize * TAG_BYTES;
        LittleEndian::write_u64(&mut self.meta.as_mut()[at..at + TAG_BYTES], tag);
    }

    fn set_free_head(&mut self, order: u32, g: u32) {
        let at = HEADS_AT + order as usize * 4;
        LittleEndian::write_u32(&mut self.meta.as_mut()[at..at + 4], g);
    }

    fn set_links(&mut self, g: u32, next: u32, prev: u32) {
        let keep = self.tag(g) & (HEAD | ALLOCATED | (ORDER_MASK << ORDER_SHIFT));
        self.set_tag(
            g,
            keep | ((next as u64 & LINK_MASK) << LINK_SHIFT) | (prev as u64 & LINK_MASK),
        );
    }

    fn push_free(&mut self, g: u32, order: u32) {
        let head = self.free_head(order);
        self.set_tag(g, HEAD | ((order as u64) << ORDER_SHIFT));
        self.set_links(g, head, NIL);
        if head != NIL {
            let head_next = next_of(self.tag(head));
            self.set_links(head, head_next, g);
        }
        self.set_free_head(order, g);
    }

    fn remove_free(&mut self, g: u32, order: u32) {
        let tag = self.tag(g);
        let next = next_of(tag);
        let prev = prev_of(tag);
        if prev != NIL {
            let prev_prev = prev_of(self.tag(prev));
            self.set_links(prev, next, prev_prev);
        } else {
            self.set_free_head(order, next);
        }
        if next != NIL {
            let next_next = next_of(self.tag(next));
            self.set_links(next, next_next, prev);
        }
    }
}

fn order_of(tag: u64) -> u32 {
    ((tag >> ORDER_SHIFT) & ORDER_MASK) as u32
}

fn next_of(tag: u64) -> u32 {
    ((tag >> LINK_SHIFT) & LINK_MASK) as u32
}

fn prev_of(tag: u64) -> u32 {
    (tag & LINK_MASK) as u32
}

#[cfg(test)]
mod tests;
