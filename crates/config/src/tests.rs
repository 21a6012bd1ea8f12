use super::*;
use std::collections::HashMap;

#[test]
fn defaults_match_front_end() {
    let cfg = PoolConfig::default();
    assert_eq!(
        (cfg.key_weight, cfg.boxmeta_weight, cfg.value_weight),
        (3, 1, 2)
    );
    assert_eq!(cfg.max_key_depth, 1024);
    assert_eq!(cfg.total_weight(), 6);
}

#[test]
fn parse_size_suffixes() {
    assert_eq!(parse_size("4096").unwrap(), 4096);
    assert_eq!(parse_size("4K").unwrap(), 4096);
    assert_eq!(parse_size("2m").unwrap(), 2 << 20);
    assert_eq!(parse_size("1G").unwrap(), 1 << 30);
}

#[test]
fn parse_size_rejects_garbage() {
    for bad in ["", "0", "K", "12X", "1.5M", "-4K", "99999999999999999999G"] {
        assert!(parse_size(bad).is_err(), "{:?} should be rejected", bad);
    }
}

#[test]
fn parse_ratios_accepts_three_parts() {
    assert_eq!(parse_ratios("3:1:2").unwrap(), (3, 1, 2));
    assert_eq!(parse_ratios(" 1 : 0 : 1 ").unwrap(), (1, 0, 1));
}

#[test]
fn parse_ratios_rejects_bad_input() {
    for bad in ["", "1:2", "1:2:3:4", "a:b:c", "0:0:0"] {
        assert!(parse_ratios(bad).is_err(), "{:?} should be rejected", bad);
    }
}

#[test]
fn from_lookup_overrides_defaults() {
    let env: HashMap<&str, &str> = [("MEMKV_RATIOS", "1:1:2"), ("MEMKV_MAX_KEY_DEPTH", "64")]
        .into_iter()
        .collect();
    let cfg = PoolConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
    assert_eq!(cfg, PoolConfig { max_key_depth: 64, ..PoolConfig::with_weights(1, 1, 2) });
}

#[test]
fn from_lookup_rejects_zero_depth() {
    let err = PoolConfig::from_lookup(|k| (k == "MEMKV_MAX_KEY_DEPTH").then(|| "0".to_string()))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}

#[test]
fn from_lookup_with_nothing_set_is_default() {
    assert_eq!(PoolConfig::from_lookup(|_| None).unwrap(), PoolConfig::default());
}
