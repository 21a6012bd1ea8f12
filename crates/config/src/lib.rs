//! # Config
//!
//! Pool configuration shared by the `memkv` library and its command-line
//! front end.
//!
//! ```text
//! MEMKV_RATIOS         key:boxmeta:value region weights  (default: "3:1:2")
//! MEMKV_MAX_KEY_DEPTH  enumeration key-length limit      (default: 1024)
//! ```

use thiserror::Error;

/// Default region weights `key:boxmeta:value`.
pub const DEFAULT_WEIGHTS: (u32, u32, u32) = (3, 1, 2);

/// Default enumeration depth limit (longest reconstructible key + 1).
pub const DEFAULT_MAX_KEY_DEPTH: usize = 1024;

/// Errors from parsing configuration strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid size {0:?} (expected <n>[K|M|G])")]
    InvalidSize(String),

    #[error("invalid ratios {0:?} (expected a:b:c with at least one non-zero)")]
    InvalidRatios(String),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

/// How a pool is partitioned and how deep enumeration may go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Relative weight of the trie node region.
    pub key_weight: u32,
    /// Relative weight of the value allocator's metadata region.
    pub boxmeta_weight: u32,
    /// Relative weight of the value region.
    pub value_weight: u32,
    /// Keys reaching this length are skipped during enumeration, and longer
    /// prefixes are rejected.
    pub max_key_depth: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let (key_weight, boxmeta_weight, value_weight) = DEFAULT_WEIGHTS;
        Self {
            key_weight,
            boxmeta_weight,
            value_weight,
            max_key_depth: DEFAULT_MAX_KEY_DEPTH,
        }
    }
}

impl PoolConfig {
    /// Builds a config with the given weights and the default depth limit.
    pub fn with_weights(key_weight: u32, boxmeta_weight: u32, value_weight: u32) -> Self {
        Self {
            key_weight,
            boxmeta_weight,
            value_weight,
            ..Self::default()
        }
    }

    /// Reads `MEMKV_RATIOS` and `MEMKV_MAX_KEY_DEPTH`, falling back to defaults
    /// for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](PoolConfig::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(ratios) = lookup("MEMKV_RATIOS") {
            let (k, b, v) = parse_ratios(&ratios)?;
            cfg.key_weight = k;
            cfg.boxmeta_weight = b;
            cfg.value_weight = v;
        }
        if let Some(depth) = lookup("MEMKV_MAX_KEY_DEPTH") {
            cfg.max_key_depth = depth
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|d| *d > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "MEMKV_MAX_KEY_DEPTH".into(),
                    value: depth.clone(),
                })?;
        }
        Ok(cfg)
    }

    /// Sum of the three weights, widened so it cannot overflow.
    #[must_use]
    pub fn total_weight(&self) -> u64 {
        self.key_weight as u64 + self.boxmeta_weight as u64 + self.value_weight as u64
    }
}

/// Parses a byte count with an optional `K`, `M` or `G` suffix (powers of
/// 1024). Zero is rejected.
pub fn parse_size(s: &str) -> Result<u64, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::InvalidSize(s.to_string());
    let (digits, shift) = match s.chars().last() {
        Some('K' | 'k') => (&s[..s.len() - 1], 10),
        Some('M' | 'm') => (&s[..s.len() - 1], 20),
        Some('G' | 'g') => (&s[..s.len() - 1], 30),
        _ => (s, 0),
    };
    let base: u64 = digits.parse().map_err(|_| invalid())?;
    let size = base.checked_mul(1u64 << shift).ok_or_else(|| invalid())?;
    if size == 0 {
        return Err(invalid());
    }
    Ok(size)
}

/// Parses `a:b:c` region weights. At least one must be non-zero.
pub fn parse_ratios(s: &str) -> Result<(u32, u32, u32), ConfigError> {
    let invalid = || ConfigError::InvalidRatios(s.to_string());
    let parts: Vec<u32> = s
        .trim()
        .split(':')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;
    match parts.as_slice() {
        [a, b, c] if *a as u64 + *b as u64 + *c as u64 > 0 => Ok((*a, *b, *c)),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests;
