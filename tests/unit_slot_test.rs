use bytes::Bytes;
use zircondb::core::cluster::slot::{NUM_SLOTS, SlotRange, get_slot};

#[test]
fn test_slot_is_always_in_range() {
    for key in [&b"foo"[..], b"", b"a", b"user:1000:profile", b"{x}"] {
        let slot = get_slot(&Bytes::copy_from_slice(key));
        assert!((slot as usize) < NUM_SLOTS);
    }
}

#[test]
fn test_slot_is_deterministic() {
    let key = Bytes::from_static(b"some-key");
    assert_eq!(get_slot(&key), get_slot(&key));
}

#[test]
fn test_hash_tag_groups_keys_into_same_slot() {
    let a = Bytes::from_static(b"user:{1000}:name");
    let b = Bytes::from_static(b"user:{1000}:email");
    let tag = Bytes::from_static(b"1000");
    assert_eq!(get_slot(&a), get_slot(&b));
    assert_eq!(get_slot(&a), get_slot(&tag));
}

#[test]
fn test_empty_hash_tag_hashes_whole_key() {
    let braces = Bytes::from_static(b"user:{}:name");
    let other = Bytes::from_static(b"user:{}:email");
    // With an empty tag the whole key is hashed, so these differ (they would
    // collide if "" were used as the tag for both).
    assert_ne!(get_slot(&braces), get_slot(&other));
}

#[test]
fn test_unclosed_brace_hashes_whole_key() {
    let a = Bytes::from_static(b"user:{1000");
    let b = Bytes::from_static(b"user:{1000:x");
    assert_ne!(get_slot(&a), get_slot(&b));
}

#[test]
fn test_slot_range_iterates_inclusively() {
    let range = SlotRange::new(10, 12);
    let slots: Vec<u16> = range.iter().collect();
    assert_eq!(slots, vec![10, 11, 12]);
}
