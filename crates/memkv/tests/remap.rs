use anyhow::Result;
use memkv::{MemKv, MemKvError, PoolConfig, SymbolTable};
use memmap2::{Mmap, MmapMut};
use std::fs::OpenOptions;
use tempfile::tempdir;

const POOL_SIZE: u64 = 256 * 1024;

fn sample() -> Vec<(String, Vec<u8>)> {
    (0..200)
        .map(|i| (format!("item/{:03}", i), format!("value-{}", i * 7).into_bytes()))
        .collect()
}

#[test]
fn file_pool_survives_remap() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("pool.mkv");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;
    file.set_len(POOL_SIZE)?;

    {
        let map = unsafe { MmapMut::map_mut(&file)? };
        let mut kv = MemKv::init(map, SymbolTable::compact(), &PoolConfig::default())?;
        for (k, v) in sample() {
            kv.set(k.as_bytes(), &v)?;
        }
        kv.del(b"item/100")?;
        kv.into_inner().flush()?;
    }

    // A fresh mapping almost certainly lands at another address.
    let map = unsafe { MmapMut::map_mut(&file)? };
    let mut kv = MemKv::open(map, SymbolTable::compact())?;
    for (k, v) in sample() {
        let got = kv.get(k.as_bytes())?;
        if k == "item/100" {
            assert_eq!(got, None);
        } else {
            assert_eq!(got, Some(&v[..]), "{}", k);
        }
    }
    let mut listed = 0;
    kv.keys(b"item/1", |_| listed += 1)?;
    assert_eq!(listed, 99);

    kv.set(b"item/100", b"back")?;
    assert_eq!(kv.get(b"item/100")?, Some(&b"back"[..]));
    Ok(())
}

#[test]
fn read_only_mapping_serves_reads() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("ro.mkv");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;
    file.set_len(POOL_SIZE)?;
    {
        let map = unsafe { MmapMut::map_mut(&file)? };
        let mut kv = MemKv::init(map, SymbolTable::compact(), &PoolConfig::default())?;
        kv.set(b"frozen", b"yes")?;
        kv.into_inner().flush()?;
    }

    let map = unsafe { Mmap::map(&file)? };
    let kv = MemKv::open(map, SymbolTable::compact())?;
    assert_eq!(kv.get(b"frozen")?, Some(&b"yes"[..]));
    Ok(())
}

#[test]
fn copied_pool_is_independent() -> Result<()> {
    let mut kv = MemKv::init(
        vec![0u8; POOL_SIZE as usize],
        SymbolTable::compact(),
        &PoolConfig::default(),
    )?;
    for (k, v) in sample() {
        kv.set(k.as_bytes(), &v)?;
    }
    let original = kv.into_inner();

    let copy: Box<[u8]> = original.clone().into_boxed_slice();
    let mut moved = MemKv::open(copy, SymbolTable::compact())?;
    for (k, v) in sample() {
        assert_eq!(moved.get(k.as_bytes())?, Some(&v[..]));
    }
    moved.set(b"item/000", b"changed")?;

    let kv = MemKv::open(original, SymbolTable::compact())?;
    assert_eq!(kv.get(b"item/000")?, Some(&b"value-0"[..]));
    assert_eq!(moved.get(b"item/000")?, Some(&b"changed"[..]));
    Ok(())
}

#[test]
fn reopening_with_init_is_refused() -> Result<()> {
    let pool = MemKv::init(vec![0u8; 8192], SymbolTable::compact(), &PoolConfig::default())?
        .into_inner();
    let err = MemKv::init(pool, SymbolTable::compact(), &PoolConfig::default()).unwrap_err();
    assert_eq!(err, MemKvError::AlreadyInitialized);
    Ok(())
}
