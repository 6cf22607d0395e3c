#[cfg(test)]
mod tests {
    use crate::batch::tests::helpers::{init_tracing, multi_version_batch};
    use crate::batch::{BatchError, BatchGetResult, BatchOptions, IndexedBatch};

    fn overwrite_batch_allowing_duplicates() -> IndexedBatch {
        init_tracing();
        IndexedBatch::new(BatchOptions {
            overwrite_key: true,
            allow_duplicate_merge: true,
            ..BatchOptions::default()
        })
    }

    /// Operands come back in application order, oldest first.
    #[test]
    fn operands_accumulate_in_order() {
        let mut batch = multi_version_batch();
        batch.merge(b"k", b"first").unwrap();
        batch.merge(b"k", b"second").unwrap();
        batch.merge(b"k", b"third").unwrap();

        assert_eq!(
            batch.get_from_batch(b"k").unwrap(),
            BatchGetResult::MergeInProgress {
                operands: vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()],
            },
        );
    }

    /// A put newer than every operand settles the lookup by itself.
    #[test]
    fn put_after_merges_wins() {
        let mut batch = multi_version_batch();
        batch.merge(b"k", b"+1").unwrap();
        batch.merge(b"k", b"+2").unwrap();
        batch.put(b"k", b"10").unwrap();

        assert_eq!(
            batch.get_from_batch(b"k").unwrap(),
            BatchGetResult::Found(b"10".to_vec()),
        );
    }

    /// The newest-first scan short-circuits at the first put even when
    /// newer merge operands were collected on the way down.
    #[test]
    fn put_under_merges_short_circuits() {
        let mut batch = multi_version_batch();
        batch.put(b"k", b"10").unwrap();
        batch.merge(b"k", b"+1").unwrap();

        assert_eq!(
            batch.get_from_batch(b"k").unwrap(),
            BatchGetResult::Found(b"10".to_vec()),
        );
    }

    /// A tombstone newer than the operands deletes the key outright.
    #[test]
    fn delete_after_merges_wins() {
        let mut batch = multi_version_batch();
        batch.merge(b"k", b"+1").unwrap();
        batch.delete(b"k").unwrap();

        assert_eq!(batch.get_from_batch(b"k").unwrap(), BatchGetResult::Deleted);
    }

    #[test]
    fn duplicate_merge_is_rejected_in_overwrite_mode() {
        let mut batch = IndexedBatch::new(BatchOptions {
            overwrite_key: true,
            ..BatchOptions::default()
        });
        batch.merge(b"k", b"a").unwrap();

        let result = batch.merge(b"k", b"b");
        assert!(matches!(result, Err(BatchError::Unsupported(_))));
    }

    #[test]
    fn duplicate_merge_passes_when_explicitly_allowed() {
        let mut batch = overwrite_batch_allowing_duplicates();
        batch.merge(b"k", b"a").unwrap();
        batch.merge(b"k", b"b").unwrap();

        // The in-place overwrite kept only the newest operand.
        assert_eq!(
            batch.get_from_batch(b"k").unwrap(),
            BatchGetResult::MergeInProgress {
                operands: vec![b"b".to_vec()],
            },
        );
    }

    /// A merge on a fresh key needs no duplicate permission, even in
    /// overwrite mode.
    #[test]
    fn first_merge_per_key_is_always_accepted() {
        let mut batch = IndexedBatch::new(BatchOptions {
            overwrite_key: true,
            ..BatchOptions::default()
        });
        batch.merge(b"a", b"1").unwrap();
        batch.merge(b"b", b"2").unwrap();

        assert_eq!(
            batch.get_from_batch(b"a").unwrap(),
            BatchGetResult::MergeInProgress {
                operands: vec![b"1".to_vec()],
            },
        );
    }

    /// Merge onto an existing put in overwrite mode is also a duplicate
    /// for the purpose of the rejection rule.
    #[test]
    fn merge_over_put_counts_as_duplicate() {
        let mut batch = IndexedBatch::new(BatchOptions {
            overwrite_key: true,
            ..BatchOptions::default()
        });
        batch.put(b"k", b"base").unwrap();

        let result = batch.merge(b"k", b"+1");
        assert!(matches!(result, Err(BatchError::Unsupported(_))));
    }
}
