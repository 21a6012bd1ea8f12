//! # CLI - memkv pool tool
//!
//! Runs one command against a pool file and exits. The file is memory-mapped,
//! so every change lands directly in the pool; other processes mapping the
//! same file (for example under `/dev/shm`) see it immediately.
//!
//! ## Commands
//!
//! ```text
//! memkv <pool_path> init <size>[K|M|G] [a:b:c]   create a new pool file
//! memkv <pool_path> set  <key> <value> [type]    store a value
//! memkv <pool_path> get  <key> [type]            print a value
//! memkv <pool_path> del  <key>                   delete a key
//! memkv <pool_path> keys [prefix]                list keys
//! memkv <pool_path> info                         header and allocator usage
//! memkv <pool_path> compact                      reclaim unused trie nodes
//!
//! type: -s (default) -i64 -i32 -u64 -u32 -u8 -b
//! ```
//!
//! Numbers are stored little-endian at their fixed width; strings are stored
//! without a terminator; `-b` stores one byte, 1 for `true`/`1`.
//!
//! ## Configuration
//!
//! ```text
//! MEMKV_ALPHABET       key alphabet, "compact" or "bytes"   (default: "compact")
//! MEMKV_RATIOS         region weights for init             (default: "3:1:2")
//! MEMKV_MAX_KEY_DEPTH  longest key listed by `keys`        (default: 1024)
//! RUST_LOG             log filter, logs go to stderr       (default: "warn")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ memkv /dev/shm/kv init 4M
//! initialized pool '/dev/shm/kv' size=4194304 ratios=3:1:2 alphabet=compact(47)
//! $ memkv /dev/shm/kv set user:1 alice
//! OK
//! $ memkv /dev/shm/kv set hits 42 -u32
//! OK
//! $ memkv /dev/shm/kv get hits -u32
//! 42
//! $ memkv /dev/shm/kv keys user
//! user:1
//! (1 keys)
//! ```

use alphabet::{Alphabet, Raw, SymbolTable};
use anyhow::{anyhow, bail, Context, Result};
use config::{parse_ratios, parse_size, PoolConfig};
use memkv::{MemKv, MemKvError};
use memmap2::MmapMut;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
usage: memkv <pool_path> <cmd> [args]
  init <size>[K|M|G] [a:b:c]   create a new pool file (ratios default 3:1:2)
  set  <key> <value> [type]    store a value
  get  <key> [type]            print a value
  del  <key>                   delete a key
  keys [prefix]                list keys, optionally under a prefix
  info                         header and allocator usage
  compact                      reclaim trie nodes left by deletes
type: -s -i64 -i32 -u64 -u32 -u8 -b";

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// How `set` encodes its argument and `get` renders the stored bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueType {
    Str,
    I64,
    I32,
    U64,
    U32,
    U8,
    Bool,
}

impl ValueType {
    fn from_flag(flag: Option<&str>) -> Result<Self> {
        Ok(match flag {
            None | Some("-s") => ValueType::Str,
            Some("-i64") => ValueType::I64,
            Some("-i32") => ValueType::I32,
            Some("-u64") => ValueType::U64,
            Some("-u32") => ValueType::U32,
            Some("-u8") => ValueType::U8,
            Some("-b") => ValueType::Bool,
            Some(other) => bail!("unknown type flag: {}", other),
        })
    }

    fn encode(self, text: &str) -> Result<Vec<u8>> {
        let bad = || anyhow!("{:?} is not a valid {:?} value", text, self);
        Ok(match self {
            ValueType::Str => text.as_bytes().to_vec(),
            ValueType::I64 => parse_signed(text).ok_or_else(bad)?.to_le_bytes().to_vec(),
            ValueType::I32 => i32::try_from(parse_signed(text).ok_or_else(bad)?)
                .map_err(|_| bad())?
                .to_le_bytes()
                .to_vec(),
            ValueType::U64 => parse_unsigned(text).ok_or_else(bad)?.to_le_bytes().to_vec(),
            ValueType::U32 => u32::try_from(parse_unsigned(text).ok_or_else(bad)?)
                .map_err(|_| bad())?
                .to_le_bytes()
                .to_vec(),
            ValueType::U8 => vec![u8::try_from(parse_unsigned(text).ok_or_else(bad)?)
                .map_err(|_| bad())?],
            ValueType::Bool => vec![u8::from(text == "true" || text == "1")],
        })
    }

    fn render(self, bytes: &[u8]) -> Result<String> {
        fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
            bytes
                .try_into()
                .map_err(|_| anyhow!("stored value is {} bytes, expected {}", bytes.len(), N))
        }
        Ok(match self {
            ValueType::Str => String::from_utf8_lossy(bytes).into_owned(),
            ValueType::I64 => i64::from_le_bytes(fixed(bytes)?).to_string(),
            ValueType::I32 => i32::from_le_bytes(fixed(bytes)?).to_string(),
            ValueType::U64 => u64::from_le_bytes(fixed(bytes)?).to_string(),
            ValueType::U32 => u32::from_le_bytes(fixed(bytes)?).to_string(),
            ValueType::U8 => u8::from_le_bytes(fixed(bytes)?).to_string(),
            ValueType::Bool => (fixed::<1>(bytes)?[0] != 0).to_string(),
        })
    }
}

/// Decimal or `0x` hexadecimal.
fn parse_unsigned(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn parse_signed(s: &str) -> Option<i64> {
    match s.strip_prefix('-') {
        Some(rest) => {
            let magnitude = parse_unsigned(rest)?;
            0i64.checked_sub_unsigned(magnitude)
        }
        None => i64::try_from(parse_unsigned(s)?).ok(),
    }
}

/// Key alphabet chosen by `MEMKV_ALPHABET`.
fn alphabet_from_env() -> Result<(Box<dyn Alphabet>, &'static str)> {
    match env_or("MEMKV_ALPHABET", "compact").as_str() {
        "compact" => Ok((Box::new(SymbolTable::compact()), "compact")),
        "bytes" => Ok((Box::new(Raw::full()), "bytes")),
        other => bail!("MEMKV_ALPHABET must be \"compact\" or \"bytes\", got {:?}", other),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn create_pool(path: &Path, size_arg: &str, ratios_arg: Option<&str>) -> Result<()> {
    let size = parse_size(size_arg)?;
    let mut cfg = PoolConfig::from_env()?;
    if let Some(ratios) = ratios_arg {
        let (k, b, v) = parse_ratios(ratios)?;
        cfg = PoolConfig {
            key_weight: k,
            boxmeta_weight: b,
            value_weight: v,
            ..cfg
        };
    }
    let (alphabet, name) = alphabet_from_env()?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let formatted = (|| -> Result<()> {
        file.set_len(size)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        let kv = MemKv::init(map, alphabet.as_ref(), &cfg)?;
        kv.into_inner().flush()?;
        Ok(())
    })();
    if let Err(e) = formatted {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e.context(format!("initializing {}", path.display())));
    }

    println!(
        "initialized pool '{}' size={} ratios={}:{}:{} alphabet={}({})",
        path.display(),
        size,
        cfg.key_weight,
        cfg.boxmeta_weight,
        cfg.value_weight,
        name,
        alphabet.size()
    );
    Ok(())
}

fn map_pool(path: &Path) -> Result<(File, MmapMut)> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let len = file.metadata()?.len();
    if len == 0 {
        bail!("pool file {} is empty", path.display());
    }
    let map = unsafe { MmapMut::map_mut(&file)? };
    debug!(path = %path.display(), len, "mapped pool");
    Ok((file, map))
}

fn print_info<B: AsRef<[u8]>, A: Alphabet>(kv: &MemKv<B, A>, file_len: u64) -> Result<()> {
    const WIDTH: usize = 50;
    let h = kv.header()?;
    let s = kv.stats()?;
    println!("{}", "-".repeat(WIDTH));
    println!("memkv pool:");
    println!(" {:<22} : {}", "alphabet_size", h.alphabet_size);
    println!(" {:<22} : {}", "pool_size", h.pool_size);
    if h.pool_size != file_len {
        println!(
            " [WARNING] pool_size ({}) does not match file size ({})",
            h.pool_size, file_len
        );
    }
    println!(" {:<22} : {}", "key_offset", h.key_offset);
    println!(" {:<22} : {}", "boxmeta_offset", h.boxmeta_offset);
    println!(" {:<22} : {}", "value_offset", h.value_offset);
    println!(" {:<22} : {}", "node_size", s.node_size);
    println!(
        " {:<22} : {} / {} ({} free-listed)",
        "nodes", s.nodes_allocated, s.node_capacity, s.nodes_free
    );
    println!(
        " {:<22} : {} used, {} free of {}",
        "value_bytes", s.values.used_bytes, s.values.free_bytes, s.value_capacity
    );
    println!(" {:<22} : {}", "live_values", s.values.live);
    println!("{}", "-".repeat(WIDTH));
    Ok(())
}

fn run(args: &[String]) -> Result<()> {
    let (path, cmd, rest) = match args {
        [path, cmd, rest @ ..] => (Path::new(path), cmd.as_str(), rest),
        _ => bail!("{}", USAGE),
    };
    let arg = |i: usize| rest.get(i).map(String::as_str);

    if cmd == "init" {
        let size = arg(0).ok_or_else(|| anyhow!("init requires a size\n{}", USAGE))?;
        return create_pool(path, size, arg(1));
    }

    let (alphabet, _) = alphabet_from_env()?;
    let cfg = PoolConfig::from_env()?;
    let (file, map) = map_pool(path)?;
    let mut kv = MemKv::open(map, alphabet.as_ref())?;
    kv.set_max_key_depth(cfg.max_key_depth);

    match cmd {
        "set" => {
            let (Some(key), Some(value)) = (arg(0), arg(1)) else {
                bail!("set requires a key and a value\n{}", USAGE);
            };
            let bytes = ValueType::from_flag(arg(2))?.encode(value)?;
            kv.set(key.as_bytes(), &bytes)?;
            println!("OK");
        }
        "get" => {
            let key = arg(0).ok_or_else(|| anyhow!("get requires a key\n{}", USAGE))?;
            let ty = ValueType::from_flag(arg(1))?;
            match kv.get(key.as_bytes())? {
                Some(bytes) => println!("{}", ty.render(bytes)?),
                None => bail!("not found: {}", key),
            }
        }
        "del" => {
            let key = arg(0).ok_or_else(|| anyhow!("del requires a key\n{}", USAGE))?;
            match kv.del(key.as_bytes()) {
                Ok(()) => println!("OK"),
                Err(MemKvError::KeyNotFound) => bail!("not found: {}", key),
                Err(e) => return Err(e.into()),
            }
        }
        "keys" => {
            let prefix = arg(0).unwrap_or("");
            let n = kv.keys(prefix.as_bytes(), |k| {
                println!("{}", String::from_utf8_lossy(k));
            })?;
            println!("({} keys)", n);
        }
        "info" => print_info(&kv, file.metadata()?.len())?,
        "compact" => {
            let freed = kv.compact()?;
            println!("OK (freed {} nodes)", freed);
        }
        other => bail!("unknown command: {}\n{}", other, USAGE),
    }

    kv.into_inner().flush()?;
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let args: Vec<String> = std::env::args().skip(1).collect();
    run(&args)
}
