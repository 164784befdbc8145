//! Property-based tests for record copies and eviction ordering.

use dcache::{eviction_order, BlobPayload, CacheIndex, CacheRecord, DependentFile, PayloadHandle};
use dcache_common::Timestamp;
use proptest::prelude::*;

/// Strategy for records with arbitrary access times and sizes.
fn record_strategy() -> impl Strategy<Value = CacheRecord> {
    ("[a-z]{1,8}", 0i64..1_000, 0u64..10_000, any::<bool>()).prop_map(
        |(stem, accessed, size, with_payload)| {
            let mut record = CacheRecord::new(format!("src/{stem}.egg"), format!("{stem}.bam"));
            record.add_dependent_file(DependentFile::new(
                format!("src/{stem}.egg"),
                Timestamp::from_secs(1),
                1,
            ));
            record.mark_recorded(Timestamp::from_secs(2), size);
            record.touch(Timestamp::from_secs(accessed));
            if with_payload {
                record
                    .set_payload(PayloadHandle::owned(BlobPayload::new(vec![0u8; 4])))
                    .unwrap();
            }
            record
        },
    )
}

proptest! {
    #[test]
    fn copies_never_carry_payload(record in record_strategy()) {
        let copy = record.clone();
        prop_assert!(!copy.has_payload());
        prop_assert_eq!(&copy, &record);
        prop_assert_eq!(copy.record_access_time(), record.record_access_time());
    }

    #[test]
    fn eviction_order_is_sorted_by_access_time(
        records in prop::collection::vec(record_strategy(), 0..40)
    ) {
        let ordered = eviction_order(&records);
        prop_assert_eq!(ordered.len(), records.len());
        for pair in ordered.windows(2) {
            prop_assert!(pair[0].record_access_time() <= pair[1].record_access_time());
        }
    }

    #[test]
    fn index_total_size_matches_records(
        records in prop::collection::vec(record_strategy(), 0..40)
    ) {
        let mut index = CacheIndex::new();
        for record in &records {
            index.upsert(record.cache_filename(), record);
        }
        let expected: u64 = index.iter().map(|(_, r)| r.record_size()).sum();
        prop_assert_eq!(index.total_size(), expected);

        while let Some(name) = index.oldest().map(str::to_string) {
            let oldest = index.get(&name).unwrap().record_access_time();
            prop_assert!(index.iter().all(|(_, r)| r.record_access_time() >= oldest));
            index.remove(&name);
        }
        prop_assert_eq!(index.total_size(), 0);
    }
}
