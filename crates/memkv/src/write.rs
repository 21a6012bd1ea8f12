/// Write path: `set()` and `del()`.
use alphabet::Alphabet;
use boxalloc::{BoxAllocator, BoxError};
use tracing::{debug, warn};

use crate::layout;
use crate::node::{self, NodeWord};
use crate::{ensure_key, MemKv, MemKvError, Resource, Result};

impl<B: AsRef<[u8]> + AsMut<[u8]>, A: Alphabet> MemKv<B, A> {
    /// Inserts or overwrites `key`.
    ///
    /// Missing trie nodes along the path are allocated as needed. Nodes
    /// allocated before a failure stay in the trie without a value; they are
    /// harmless and [`compact`](MemKv::compact) reclaims them.
    ///
    /// On overwrite the old value is released before the new one is placed.
    /// If the value region cannot fit the new value the old one is put back,
    /// the key keeps its previous value and `OutOfMemory` is returned.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        ensure_key(key)?;
        let path = self.encode(key)?;
        let header = self.header;
        let r = header.regions_mut(self.pool.as_mut());

        let mut blocks = layout::load_blocks(r.head)?;
        let mut base = node::base_of(&blocks, 0)?;
        for (depth, &index) in path.iter().enumerate() {
            let id = match node::child(r.keys, base, index) {
                Some(id) => id,
                None => {
                    let Some(id) = blocks.alloc(r.keys)? else {
                        warn!(depth, key_len = path.len(), "trie node region exhausted");
                        return Err(MemKvError::OutOfMemory(Resource::Nodes));
                    };
                    node::init(r.keys, blocks.offset_of(id), header.alphabet_size);
                    node::set_child(r.keys, base, index, Some(id));
                    layout::store_blocks(r.head, &blocks)?;
                    debug!(id, depth, "allocated trie node");
                    id
                }
            };
            base = node::base_of(&blocks, id)?;
        }

        let mut boxes = BoxAllocator::open(&mut *r.boxmeta)?;
        let word = node::word(r.keys, base);
        let location = if word.terminal {
            let old_len = boxes.len_of(word.location).ok_or_else(|| {
                MemKvError::Corrupt(format!("no live value at {}", word.location))
            })?;
            boxes.free(word.location)?;
            match boxes.alloc(value.len() as u64) {
                Ok(location) => location,
                Err(BoxError::Exhausted { .. }) => {
                    // The freed bytes are untouched; take the space back.
                    let back = boxes.alloc(old_len)?;
                    if back != word.location {
                        let from = word.location as usize;
                        r.values
                            .copy_within(from..from + old_len as usize, back as usize);
                        node::set_word(r.keys, base, NodeWord::terminal(back));
                    }
                    warn!(
                        requested = value.len(),
                        kept = old_len,
                        "value region exhausted, previous value kept"
                    );
                    return Err(MemKvError::OutOfMemory(Resource::Values));
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            boxes.alloc(value.len() as u64).map_err(|e| {
                warn!(requested = value.len(), "value region exhausted");
                MemKvError::from(e)
            })?
        };

        let start = location as usize;
        r.values[start..start + value.len()].copy_from_slice(value);
        node::set_word(r.keys, base, NodeWord::terminal(location));
        debug!(location, len = value.len(), "stored value");
        Ok(())
    }

    /// Removes `key` and releases its value.
    ///
    /// The path nodes stay in the trie; only [`compact`](MemKv::compact)
    /// frees nodes.
    pub fn del(&mut self, key: &[u8]) -> Result<()> {
        ensure_key(key)?;
        let path = self.encode(key)?;
        let Some(id) = self.find(&path)? else {
            debug!("delete: key not found");
            return Err(MemKvError::KeyNotFound);
        };

        let header = self.header;
        let r = header.regions_mut(self.pool.as_mut());
        let blocks = layout::load_blocks(r.head)?;
        let base = node::base_of(&blocks, id)?;
        let word = node::word(r.keys, base);
        if !word.terminal {
            debug!("delete: key has no value");
            return Err(MemKvError::KeyNotFound);
        }
        BoxAllocator::open(&mut *r.boxmeta)?.free(word.location)?;
        node::set_word(r.keys, base, NodeWord::EMPTY);
        debug!(location = word.location, "deleted value");
        Ok(())
    }
}
