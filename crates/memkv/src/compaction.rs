/// Maintenance: `compact()` reclaims trie nodes left behind by deletes.
use alphabet::Alphabet;
use tracing::info;

use crate::layout;
use crate::node;
use crate::{MemKv, MemKvError, Result};

impl<B: AsRef<[u8]> + AsMut<[u8]>, A: Alphabet> MemKv<B, A> {
    /// Unlinks every subtree that holds no value and returns its nodes to the
    /// node allocator. Returns how many nodes were freed.
    ///
    /// Deleting a key only clears its terminal flag, so long-lived stores
    /// with churn accumulate dead branches. The root is never freed.
    pub fn compact(&mut self) -> Result<usize> {
        let header = self.header;
        let r = header.regions_mut(self.pool.as_mut());
        let mut blocks = layout::load_blocks(r.head)?;
        node::base_of(&blocks, 0)?;

        // Preorder list of (child, parent, symbol): every node appears before
        // its descendants, so walking it backwards settles children first.
        let mut edges: Vec<(u32, u32, u8)> = Vec::new();
        let mut live = vec![false; blocks.high_water() as usize];
        let mut seen = vec![false; blocks.high_water() as usize];
        let mut stack = vec![0u32];
        seen[0] = true;
        while let Some(id) = stack.pop() {
            let base = node::base_of(&blocks, id)?;
            live[id as usize] = node::word(r.keys, base).terminal;
            for index in 0..header.alphabet_size {
                let index = index as u8;
                let Some(child) = node::child(r.keys, base, index) else {
                    continue;
                };
                node::base_of(&blocks, child)?;
                if std::mem::replace(&mut seen[child as usize], true) {
                    return Err(MemKvError::Corrupt(format!(
                        "node {} is linked from more than one parent",
                        child
                    )));
                }
                edges.push((child, id, index));
                stack.push(child);
            }
        }

        let mut freed = 0usize;
        for &(child, parent, index) in edges.iter().rev() {
            if live[child as usize] {
                live[parent as usize] = true;
                continue;
            }
            let parent_base = blocks.offset_of(parent);
            node::set_child(r.keys, parent_base, index, None);
            blocks.free(r.keys, child)?;
            freed += 1;
        }
        layout::store_blocks(r.head, &blocks)?;
        info!(freed, reachable = edges.len() + 1, "compacted trie");
        Ok(freed)
    }
}
