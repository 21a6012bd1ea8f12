//! # Alphabet
//!
//! Maps key bytes onto a dense index range `[0, N)` so a trie can branch on
//! `N` symbols instead of 256. A smaller `N` shrinks every trie node in
//! exchange for restricting which bytes a key may contain.
//!
//! Encoding applies to keys only. Decoding exists for presenting enumerated
//! keys back to a user and never fails: unknown indices become
//! [`PLACEHOLDER`].
//!
//! ## Example
//!
//! ```rust
//! use alphabet::{decode_key, encode_key, SymbolTable};
//!
//! let table = SymbolTable::compact();
//! let encoded = encode_key(&table, b"user:42").unwrap();
//! assert!(encoded.iter().all(|&i| (i as u16) < 47));
//! assert_eq!(decode_key(&table, &encoded), b"user:42");
//! ```

use thiserror::Error;

/// Byte substituted for indices an alphabet does not recognize.
pub const PLACEHOLDER: u8 = b'?';

/// Symbols of the compact key alphabet: lowercase letters, digits, space and
/// common separators.
pub const COMPACT_SYMBOLS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789 @#_-/[]:,.";

/// Errors reported while building or applying an alphabet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlphabetError {
    /// A symbol table needs at least one symbol.
    #[error("alphabet is empty")]
    Empty,

    /// More than 256 symbols cannot be indexed by a byte.
    #[error("alphabet has {0} symbols (max 256)")]
    TooLarge(usize),

    /// The same byte appears twice in a symbol table.
    #[error("duplicate symbol {0:#04x}")]
    Duplicate(u8),

    /// A key byte has no index in the alphabet.
    #[error("byte {byte:#04x} at position {position} is not in the alphabet")]
    InvalidSymbol { byte: u8, position: usize },
}

/// A mapping between key bytes and dense symbol indices.
pub trait Alphabet {
    /// Number of symbols, `1..=256`.
    fn size(&self) -> u16;

    /// Index of `byte`, or `None` if the byte is not part of the alphabet.
    fn encode(&self, byte: u8) -> Option<u8>;

    /// Byte for `index`, or `None` if the index is out of range.
    fn decode(&self, index: u8) -> Option<u8>;
}

impl<A: Alphabet + ?Sized> Alphabet for &A {
    fn size(&self) -> u16 {
        (**self).size()
    }

    fn encode(&self, byte: u8) -> Option<u8> {
        (**self).encode(byte)
    }

    fn decode(&self, index: u8) -> Option<u8> {
        (**self).decode(index)
    }
}

/// Uses key bytes directly as indices. Bytes `>= size` are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Raw {
    size: u16,
}

impl Raw {
    /// An identity alphabet over the first `size` byte values.
    ///
    /// `size` is clamped to `1..=256`.
    pub fn new(size: u16) -> Self {
        Self {
            size: size.clamp(1, 256),
        }
    }

    /// The full 256-symbol identity alphabet.
    pub fn full() -> Self {
        Self { size: 256 }
    }
}

impl Default for Raw {
    fn default() -> Self {
        Self::full()
    }
}

impl Alphabet for Raw {
    fn size(&self) -> u16 {
        self.size
    }

    fn encode(&self, byte: u8) -> Option<u8> {
        ((byte as u16) < self.size).then_some(byte)
    }

    fn decode(&self, index: u8) -> Option<u8> {
        ((index as u16) < self.size).then_some(index)
    }
}

/// A dense alphabet built from an ordered list of symbols: the `i`-th symbol
/// encodes to index `i`.
#[derive(Clone, PartialEq, Eq)]
pub struct SymbolTable {
    /// `forward[byte]` is the index + 1, or 0 when the byte is not a symbol.
    forward: [u16; 256],
    symbols: Vec<u8>,
}

impl SymbolTable {
    /// Builds a table from `symbols`, rejecting empty lists, lists longer than
    /// 256, and duplicates.
    pub fn new(symbols: &[u8]) -> Result<Self, AlphabetError> {
        if symbols.is_empty() {
            return Err(AlphabetError::Empty);
        }
        if symbols.len() > 256 {
            return Err(AlphabetError::TooLarge(symbols.len()));
        }
        let mut forward = [0u16; 256];
        for (i, &b) in symbols.iter().enumerate() {
            if forward[b as usize] != 0 {
                return Err(AlphabetError::Duplicate(b));
            }
            forward[b as usize] = i as u16 + 1;
        }
        Ok(Self {
            forward,
            symbols: symbols.to_vec(),
        })
    }

    /// The 47-symbol table over [`COMPACT_SYMBOLS`].
    pub fn compact() -> Self {
        let mut forward = [0u16; 256];
        for (i, &b) in COMPACT_SYMBOLS.iter().enumerate() {
            forward[b as usize] = i as u16 + 1;
        }
        Self {
            forward,
            symbols: COMPACT_SYMBOLS.to_vec(),
        }
    }

    /// The symbols in index order.
    #[must_use]
    pub fn symbols(&self) -> &[u8] {
        &self.symbols
    }
}

impl Alphabet for SymbolTable {
    fn size(&self) -> u16 {
        self.symbols.len() as u16
    }

    fn encode(&self, byte: u8) -> Option<u8> {
        match self.forward[byte as usize] {
            0 => None,
            i => Some((i - 1) as u8),
        }
    }

    fn decode(&self, index: u8) -> Option<u8> {
        self.symbols.get(index as usize).copied()
    }
}

impl std::fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTable")
            .field("size", &self.symbols.len())
            .field("symbols", &String::from_utf8_lossy(&self.symbols))
            .finish()
    }
}

/// Encodes every byte of `key`, failing on the first byte outside the
/// alphabet.
pub fn encode_key<A: Alphabet + ?Sized>(alphabet: &A, key: &[u8]) -> Result<Vec<u8>, AlphabetError> {
    key.iter()
        .enumerate()
        .map(|(position, &byte)| {
            alphabet
                .encode(byte)
                .ok_or(AlphabetError::InvalidSymbol { byte, position })
        })
        .collect()
}

/// Decodes indices back to bytes, substituting [`PLACEHOLDER`] for unknown
/// indices.
pub fn decode_key<A: Alphabet + ?Sized>(alphabet: &A, indices: &[u8]) -> Vec<u8> {
    indices
        .iter()
        .map(|&i| alphabet.decode(i).unwrap_or(PLACEHOLDER))
        .collect()
}

#[cfg(test)]
mod tests;
