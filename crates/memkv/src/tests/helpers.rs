use crate::*;

pub const POOL_SIZE: usize = 64 * 1024;

/// A zeroed 64 KiB pool with the compact alphabet and default weights.
pub fn compact_store() -> MemKv<Vec<u8>, SymbolTable> {
    MemKv::init(vec![0u8; POOL_SIZE], SymbolTable::compact(), &PoolConfig::default()).unwrap()
}

/// A zeroed pool of `size` bytes where key bytes are used as-is.
pub fn raw_store(size: usize, config: &PoolConfig) -> MemKv<Vec<u8>, Raw> {
    MemKv::init(vec![0u8; size], Raw::full(), config).unwrap()
}

pub fn collect_keys<B: AsRef<[u8]>, A: Alphabet>(kv: &MemKv<B, A>, prefix: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let n = kv.keys(prefix, |k| out.push(k.to_vec())).unwrap();
    assert_eq!(n, out.len());
    out
}

pub fn keys_of(list: &[&str]) -> Vec<Vec<u8>> {
    list.iter().map(|k| k.as_bytes().to_vec()).collect()
}

impl<A: Alphabet> MemKv<Vec<u8>, A> {
    /// Snapshot of the raw pool bytes.
    pub fn clone_pool(&self) -> Vec<u8> {
        self.pool.clone()
    }
}
