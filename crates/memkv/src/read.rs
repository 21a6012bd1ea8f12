/// Read path: `get()`, `keys()`, `keys_encoded()`.
use alphabet::{decode_key, Alphabet};
use boxalloc::BoxAllocator;
use tracing::{debug, warn};

use crate::layout;
use crate::node;
use crate::{ensure_key, MemKv, MemKvError, Result};

impl<B: AsRef<[u8]>, A: Alphabet> MemKv<B, A> {
    /// Looks up `key`.
    ///
    /// Returns `Ok(None)` when the key was never set or has been deleted. The
    /// returned slice borrows the pool and has exactly the stored length.
    pub fn get(&self, key: &[u8]) -> Result<Option<&[u8]>> {
        ensure_key(key)?;
        let path = self.encode(key)?;
        let Some(id) = self.find(&path)? else {
            debug!("get: key not found");
            return Ok(None);
        };

        let r = self.header.regions(self.pool.as_ref());
        let blocks = layout::load_blocks(r.head)?;
        let word = node::word(r.keys, node::base_of(&blocks, id)?);
        if !word.terminal {
            debug!("get: key has no value");
            return Ok(None);
        }
        let len = BoxAllocator::open(r.boxmeta)?
            .len_of(word.location)
            .ok_or_else(|| MemKvError::Corrupt(format!("no live value at {}", word.location)))?;
        let start = word.location as usize;
        let end = start + len as usize;
        if end > r.values.len() {
            return Err(MemKvError::Corrupt(format!(
                "value {}..{} outside the value region",
                start, end
            )));
        }
        Ok(Some(&r.values[start..end]))
    }

    /// Calls `visit` with every key starting with `prefix`, decoded back
    /// through the alphabet, in ascending symbol-index order. Returns the
    /// number of keys visited.
    ///
    /// An empty prefix enumerates the whole store. A prefix that was never
    /// inserted visits nothing.
    pub fn keys<F>(&self, prefix: &[u8], mut visit: F) -> Result<usize>
    where
        F: FnMut(&[u8]),
    {
        self.keys_encoded(prefix, |encoded| visit(&decode_key(&self.alphabet, encoded)))
    }

    /// Same as [`keys`](MemKv::keys) but reports raw symbol indices.
    ///
    /// Subtrees whose keys would reach the depth limit are skipped and
    /// logged; a prefix that already reaches it is rejected.
    pub fn keys_encoded<F>(&self, prefix: &[u8], mut visit: F) -> Result<usize>
    where
        F: FnMut(&[u8]),
    {
        let limit = self.max_key_depth;
        if prefix.len() >= limit {
            return Err(MemKvError::PrefixTooLong {
                len: prefix.len(),
                limit,
            });
        }
        let mut key = self.encode(prefix)?;
        let Some(start) = self.find(&key)? else {
            debug!(prefix_len = prefix.len(), "keys: prefix not found");
            return Ok(0);
        };

        let r = self.header.regions(self.pool.as_ref());
        let blocks = layout::load_blocks(r.head)?;
        let alphabet_size = self.header.alphabet_size;

        // (node, depth, symbol that led to it)
        let mut stack = vec![(start, key.len(), None)];
        let mut visited = 0usize;
        let mut skipped = 0usize;
        while let Some((id, depth, symbol)) = stack.pop() {
            if let Some(symbol) = symbol {
                key.truncate(depth - 1);
                key.push(symbol);
            }
            let base = node::base_of(&blocks, id)?;
            if node::word(r.keys, base).terminal {
                visit(&key);
                visited += 1;
            }
            // Reverse push so the smallest index pops first.
            for index in (0..alphabet_size).rev() {
                let index = index as u8;
                if let Some(child) = node::child(r.keys, base, index) {
                    if depth + 1 >= limit {
                        skipped += 1;
                        continue;
                    }
                    stack.push((child, depth + 1, Some(index)));
                }
            }
        }
        if skipped > 0 {
            warn!(skipped, limit, "keys: skipped subtrees at the key depth limit");
        }
        debug!(visited, "keys: enumeration finished");
        Ok(visited)
    }

    /// Follows `path` from the root. `None` when some node on the way is
    /// missing.
    pub(crate) fn find(&self, path: &[u8]) -> Result<Option<u32>> {
        let r = self.header.regions(self.pool.as_ref());
        let blocks = layout::load_blocks(r.head)?;
        let mut id = 0u32;
        for &index in path {
            let base = node::base_of(&blocks, id)?;
            match node::child(r.keys, base, index) {
                Some(child) => id = child,
                None => return Ok(None),
            }
        }
        node::base_of(&blocks, id)?;
        Ok(Some(id))
    }
}
