use bytes::Bytes;
use proptest::prelude::*;
use zircondb::core::cluster::slot::{NUM_SLOTS, get_slot};

proptest! {
    /// Every possible key maps into the fixed slot space.
    #[test]
    fn slot_never_exceeds_slot_count(key in proptest::collection::vec(any::<u8>(), 0..128)) {
        let slot = get_slot(&Bytes::from(key));
        prop_assert!((slot as usize) < NUM_SLOTS);
    }

    /// Keys sharing a non-empty hash tag always land in the same slot.
    #[test]
    fn hash_tagged_keys_collide(
        tag in proptest::collection::vec(any::<u8>(), 1..16),
        prefix in proptest::collection::vec(any::<u8>(), 0..16),
        suffix in proptest::collection::vec(any::<u8>(), 0..16),
    ) {
        // Braces inside the generated parts would change tag extraction.
        prop_assume!(!tag.contains(&b'{') && !tag.contains(&b'}'));
        prop_assume!(!prefix.contains(&b'{') && !prefix.contains(&b'}'));

        let mut a = prefix.clone();
        a.push(b'{');
        a.extend_from_slice(&tag);
        a.push(b'}');
        a.extend_from_slice(&suffix);

        let mut b = b"other:".to_vec();
        b.push(b'{');
        b.extend_from_slice(&tag);
        b.push(b'}');

        prop_assert_eq!(get_slot(&Bytes::from(a)), get_slot(&Bytes::from(b)));
    }
}
