use super::*;

// -------------------- Raw --------------------

#[test]
fn raw_full_is_identity() {
    let raw = Raw::full();
    assert_eq!(raw.size(), 256);
    for b in 0..=255u8 {
        assert_eq!(raw.encode(b), Some(b));
        assert_eq!(raw.decode(b), Some(b));
    }
}

#[test]
fn raw_rejects_bytes_at_or_above_size() {
    let raw = Raw::new(37);
    assert_eq!(raw.encode(36), Some(36));
    assert_eq!(raw.encode(37), None);
    assert_eq!(raw.encode(200), None);
    assert_eq!(raw.decode(40), None);
}

#[test]
fn raw_size_is_clamped() {
    assert_eq!(Raw::new(0).size(), 1);
    assert_eq!(Raw::new(1000).size(), 256);
}

// -------------------- SymbolTable --------------------

#[test]
fn compact_table_has_47_symbols() {
    let t = SymbolTable::compact();
    assert_eq!(t.size(), 47);
    assert_eq!(t.encode(b'a'), Some(0));
    assert_eq!(t.encode(b'z'), Some(25));
    assert_eq!(t.encode(b'0'), Some(26));
    assert_eq!(t.encode(b' '), Some(36));
    assert_eq!(t.encode(b'.'), Some(46));
    assert_eq!(t.encode(b'A'), None);
    assert_eq!(t.encode(0xFF), None);
}

#[test]
fn compact_matches_table_built_from_symbols() {
    assert_eq!(SymbolTable::compact(), SymbolTable::new(COMPACT_SYMBOLS).unwrap());
}

#[test]
fn table_round_trips_every_symbol() {
    let t = SymbolTable::compact();
    for (i, &b) in COMPACT_SYMBOLS.iter().enumerate() {
        assert_eq!(t.encode(b), Some(i as u8));
        assert_eq!(t.decode(i as u8), Some(b));
    }
}

#[test]
fn table_construction_errors() {
    assert_eq!(SymbolTable::new(b"").unwrap_err(), AlphabetError::Empty);
    assert_eq!(
        SymbolTable::new(b"abca").unwrap_err(),
        AlphabetError::Duplicate(b'a')
    );
    let too_many = vec![0u8; 257];
    assert_eq!(
        SymbolTable::new(&too_many).unwrap_err(),
        AlphabetError::TooLarge(257)
    );
}

#[test]
fn full_byte_table_is_allowed() {
    let all: Vec<u8> = (0..=255u8).rev().collect();
    let t = SymbolTable::new(&all).unwrap();
    assert_eq!(t.size(), 256);
    assert_eq!(t.encode(255), Some(0));
    assert_eq!(t.encode(0), Some(255));
}

// -------------------- Key helpers --------------------

#[test]
fn encode_key_reports_first_invalid_byte() {
    let t = SymbolTable::compact();
    assert_eq!(
        encode_key(&t, b"ok-Key").unwrap_err(),
        AlphabetError::InvalidSymbol {
            byte: b'K',
            position: 3
        }
    );
}

#[test]
fn decode_key_uses_placeholder() {
    let t = SymbolTable::compact();
    assert_eq!(decode_key(&t, &[0, 1, 47, 200]), b"ab??");
}

#[test]
fn helpers_accept_trait_objects() {
    let t: Box<dyn Alphabet> = Box::new(SymbolTable::compact());
    let enc = encode_key(t.as_ref(), b"k1").unwrap();
    assert_eq!(decode_key(t.as_ref(), &enc), b"k1");
}
