use super::*;

fn meta_for(granules: usize) -> Vec<u8> {
    vec![0u8; BOX_HEADER_BYTES + granules * TAG_BYTES]
}

// -------------------- Init / capacity --------------------

#[test]
fn init_rejects_tiny_metadata() {
    let mut meta = vec![0u8; BOX_HEADER_BYTES - 1];
    let err = BoxAllocator::init(&mut meta[..], 1024).unwrap_err();
    assert_eq!(
        err,
        BoxError::MetaTooSmall {
            have: BOX_HEADER_BYTES - 1,
            need: BOX_HEADER_BYTES
        }
    );
}

#[test]
fn capacity_is_capped_by_metadata() {
    let mut meta = meta_for(4);
    let b = BoxAllocator::init(&mut meta[..], 1024).unwrap();
    assert_eq!(b.capacity(), 4 * GRANULE);
    assert_eq!(b.data_size(), 1024);
}

#[test]
fn capacity_rounds_down_to_granules() {
    let mut meta = meta_for(64);
    let b = BoxAllocator::init(&mut meta[..], 100).unwrap();
    assert_eq!(b.capacity(), 96);
}

#[test]
fn fresh_allocator_is_all_free() {
    let mut meta = meta_for(16);
    let b = BoxAllocator::init(&mut meta[..], 16 * GRANULE).unwrap();
    let stats = b.stats();
    assert_eq!(stats.free_bytes, 256);
    assert_eq!(stats.used_bytes, 0);
    assert_eq!(stats.live, 0);
}

// -------------------- Alloc --------------------

#[test]
fn alloc_splits_and_tracks_exact_length() {
    let mut meta = meta_for(16);
    let mut b = BoxAllocator::init(&mut meta[..], 256).unwrap();

    assert_eq!(b.alloc(5).unwrap(), 0);
    assert_eq!(b.alloc(5).unwrap(), 16);
    assert_eq!(b.alloc(40).unwrap(), 64);

    assert_eq!(b.len_of(0), Some(5));
    assert_eq!(b.len_of(16), Some(5));
    assert_eq!(b.len_of(64), Some(40));
    assert_eq!(b.len_of(32), None);
}

#[test]
fn zero_length_alloc_takes_a_granule() {
    let mut meta = meta_for(4);
    let mut b = BoxAllocator::init(&mut meta[..], 64).unwrap();
    let a = b.alloc(0).unwrap();
    let c = b.alloc(0).unwrap();
    assert_ne!(a, c);
    assert_eq!(b.len_of(a), Some(0));
    assert_eq!(b.stats().used_bytes, 2 * GRANULE);
}

#[test]
fn exhaustion_is_reported() {
    let mut meta = meta_for(16);
    let mut b = BoxAllocator::init(&mut meta[..], 256).unwrap();
    assert_eq!(b.alloc(256).unwrap(), 0);
    assert_eq!(
        b.alloc(1).unwrap_err(),
        BoxError::Exhausted { requested: 1 }
    );
}

#[test]
fn oversized_request_is_exhausted() {
    let mut meta = meta_for(16);
    let mut b = BoxAllocator::init(&mut meta[..], 256).unwrap();
    assert!(matches!(b.alloc(257), Err(BoxError::Exhausted { .. })));
    assert!(matches!(b.alloc(u64::MAX), Err(BoxError::Exhausted { .. })));
}

#[test]
fn non_power_of_two_region_uses_every_granule() {
    let mut meta = meta_for(6);
    let mut b = BoxAllocator::init(&mut meta[..], 6 * GRANULE).unwrap();

    assert_eq!(b.alloc(64).unwrap(), 0);
    assert_eq!(b.alloc(32).unwrap(), 64);
    assert!(b.alloc(1).is_err());

    b.free(0).unwrap();
    b.free(64).unwrap();
    assert_eq!(b.stats().free_bytes, 96);
}

// -------------------- Free / coalescing --------------------

#[test]
fn freeing_everything_coalesces_back_to_one_block() {
    let mut meta = meta_for(16);
    let mut b = BoxAllocator::init(&mut meta[..], 256).unwrap();

    let offsets: Vec<u64> = (0..16).map(|_| b.alloc(16).unwrap()).collect();
    assert!(b.alloc(1).is_err());

    // evens first, then odds, so merges happen late
    for off in offsets.iter().step_by(2) {
        b.free(*off).unwrap();
    }
    for off in offsets.iter().skip(1).step_by(2) {
        b.free(*off).unwrap();
    }

    assert_eq!(b.alloc(256).unwrap(), 0);
}

#[test]
fn double_free_is_rejected() {
    let mut meta = meta_for(16);
    let mut b = BoxAllocator::init(&mut meta[..], 256).unwrap();
    let off = b.alloc(10).unwrap();
    b.free(off).unwrap();
    assert_eq!(b.free(off).unwrap_err(), BoxError::InvalidOffset(off));
}

#[test]
fn misaligned_and_out_of_range_frees_are_rejected() {
    let mut meta = meta_for(16);
    let mut b = BoxAllocator::init(&mut meta[..], 256).unwrap();
    b.alloc(10).unwrap();
    assert_eq!(b.free(3).unwrap_err(), BoxError::InvalidOffset(3));
    assert_eq!(b.free(4096).unwrap_err(), BoxError::InvalidOffset(4096));
}

#[test]
fn repeated_alloc_free_never_exhausts() {
    let mut meta = meta_for(16);
    let mut b = BoxAllocator::init(&mut meta[..], 256).unwrap();
    let keep = b.alloc(100).unwrap();
    for _ in 0..10_000 {
        let off = b.alloc(100).unwrap();
        b.free(off).unwrap();
    }
    assert_eq!(b.len_of(keep), Some(100));
    assert_eq!(b.stats().live, 1);
}

#[test]
fn stats_track_live_payload() {
    let mut meta = meta_for(16);
    let mut b = BoxAllocator::init(&mut meta[..], 256).unwrap();
    b.alloc(5).unwrap();
    b.alloc(33).unwrap();
    let stats = b.stats();
    assert_eq!(stats.live, 2);
    assert_eq!(stats.payload_bytes, 38);
    assert_eq!(stats.used_bytes, 16 + 64);
    assert_eq!(stats.used_bytes + stats.free_bytes, 256);
}

// -------------------- Open --------------------

#[test]
fn open_reattaches_to_existing_metadata() {
    let mut meta = meta_for(16);
    let off = {
        let mut b = BoxAllocator::init(&mut meta[..], 256).unwrap();
        b.alloc(7).unwrap()
    };

    let copy = meta.clone();
    let b = BoxAllocator::open(&copy[..]).unwrap();
    assert_eq!(b.capacity(), 256);
    assert_eq!(b.len_of(off), Some(7));
}

#[test]
fn open_rejects_unformatted_metadata() {
    let meta = meta_for(16);
    assert!(matches!(
        BoxAllocator::open(&meta[..]),
        Err(BoxError::Corrupt(_))
    ));
}
