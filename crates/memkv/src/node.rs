//! Trie node record codec.
//!
//! ```text
//! [word: u64 LE][child[0]: i32 LE] ... [child[N-1]: i32 LE]
//!
//! word bit 63     terminal flag
//! word bits 0..62 value location (box allocator offset), 0 when not terminal
//! child           block id, or -1 when absent
//! ```

use blockalloc::BlockMeta;
use byteorder::{ByteOrder, LittleEndian};

use crate::{MemKvError, Result};

const TERMINAL: u64 = 1 << 63;
const LOCATION_MASK: u64 = !TERMINAL;
const ABSENT: i32 = -1;
const WORD_BYTES: usize = 8;
const CHILD_BYTES: usize = 4;

/// Size in bytes of one node for an alphabet of `alphabet_size` symbols.
#[must_use]
pub fn node_size(alphabet_size: u16) -> usize {
    WORD_BYTES + CHILD_BYTES * alphabet_size as usize
}

/// Unpacked node header word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct NodeWord {
    pub terminal: bool,
    pub location: u64,
}

impl NodeWord {
    pub const EMPTY: NodeWord = NodeWord {
        terminal: false,
        location: 0,
    };

    pub fn terminal(location: u64) -> Self {
        Self {
            terminal: true,
            location,
        }
    }

    fn pack(self) -> u64 {
        let flag = if self.terminal { TERMINAL } else { 0 };
        flag | (self.location & LOCATION_MASK)
    }

    fn unpack(raw: u64) -> Self {
        Self {
            terminal: raw & TERMINAL != 0,
            location: raw & LOCATION_MASK,
        }
    }
}

/// Byte offset of node `id` inside the key region.
pub(crate) fn base_of(blocks: &BlockMeta, id: u32) -> Result<usize> {
    if id >= blocks.high_water() {
        return Err(MemKvError::Corrupt(format!(
            "node {} is beyond the {} allocated nodes",
            id,
            blocks.high_water()
        )));
    }
    Ok(blocks.offset_of(id))
}

/// Writes an empty node: not terminal, every child absent.
pub(crate) fn init(keys: &mut [u8], base: usize, alphabet_size: u16) {
    set_word(keys, base, NodeWord::EMPTY);
    let children = &mut keys[base + WORD_BYTES..base + node_size(alphabet_size)];
    for slot in children.chunks_exact_mut(CHILD_BYTES) {
        LittleEndian::write_i32(slot, ABSENT);
    }
}

pub(crate) fn word(keys: &[u8], base: usize) -> NodeWord {
    NodeWord::unpack(LittleEndian::read_u64(&keys[base..base + WORD_BYTES]))
}

pub(crate) fn set_word(keys: &mut [u8], base: usize, word: NodeWord) {
    LittleEndian::write_u64(&mut keys[base..base + WORD_BYTES], word.pack());
}

/// Child block id for symbol `index`. The caller has already checked
/// `index` against the alphabet size.
pub(crate) fn child(keys: &[u8], base: usize, index: u8) -> Option<u32> {
    let at = base + WORD_BYTES + index as usize * CHILD_BYTES;
    let raw = LittleEndian::read_i32(&keys[at..at + CHILD_BYTES]);
    (raw >= 0).then_some(raw as u32)
}

pub(crate) fn set_child(keys: &mut [u8], base: usize, index: u8, child: Option<u32>) {
    let at = base + WORD_BYTES + index as usize * CHILD_BYTES;
    let raw = child.map_or(ABSENT, |id| id as i32);
    LittleEndian::write_i32(&mut keys[at..at + CHILD_BYTES], raw);
}
