mod common;

use common::{count, store, store_with, FileRecord};
use rowcast_core::{DbError, ProgressFn, PublishPolicy, QueryDescriptor, StoreConfig};

fn sizes(store: &rowcast_core::Store) -> Vec<f64> {
    store
        .cast_query(
            &QueryDescriptor::new("files").order_by("name"),
            FileRecord::default,
        )
        .unwrap()
        .into_iter()
        .map(|file| file.size)
        .collect()
}

#[test]
fn publish_inserts_then_updates_under_both_policies() {
    for policy in [PublishPolicy::UpdateThenInsert, PublishPolicy::ProbeFirst] {
        let (store, recorder) = store_with(StoreConfig::in_memory().publish_policy(policy));
        let mut file = FileRecord {
            size: 1.0,
            ..FileRecord::named("draft.md")
        };

        assert_eq!(store.publish(&mut file, None).unwrap(), 1);
        file.size = 2.0;
        assert_eq!(store.publish(&mut file, None).unwrap(), 1);

        assert_eq!(count(&store, "files"), 1, "policy {policy:?}");
        assert_eq!(sizes(&store), vec![2.0]);

        let records = recorder.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].inserted && !records[0].updated);
        assert!(records[1].updated && !records[1].inserted);
    }
}

#[test]
fn publishing_identical_state_twice_keeps_one_row() {
    let (store, recorder) = store();
    let mut file = FileRecord::with_id(5, "same.txt");

    store.publish(&mut file, None).unwrap();
    recorder.clear();
    let written = store.publish(&mut file, None).unwrap();

    assert_eq!(written, 1);
    assert_eq!(count(&store, "files"), 1);
    let records = recorder.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].updated);
    assert_eq!(records[0].affected_row_count, 1);
}

#[test]
fn publish_all_partitions_existing_and_new_entities() {
    let (store, recorder) = store();
    let mut existing = vec![FileRecord::with_id(1, "old-1"), FileRecord::with_id(2, "old-2")];
    store.insert_all(&mut existing, None, None).unwrap();
    recorder.clear();

    let mut batch = vec![
        FileRecord {
            size: 10.0,
            ..FileRecord::with_id(1, "old-1")
        },
        FileRecord {
            size: 30.0,
            ..FileRecord::with_id(3, "new-3")
        },
        FileRecord {
            size: 20.0,
            ..FileRecord::with_id(2, "old-2")
        },
    ];
    let outcome = store.publish_all(&mut batch, None, None).unwrap();

    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.processed, 3);
    assert_eq!(outcome.affected_rows, 3);
    assert_eq!(count(&store, "files"), 3);
    assert_eq!(sizes(&store), vec![30.0, 10.0, 20.0]);

    let records = recorder.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].inserted);
    assert!(records[0].updated);
    assert_eq!(records[0].affected_row_count, 3);
}

#[test]
fn cancelled_publish_all_keeps_updates_and_the_inserts_already_written() {
    let (store, recorder) = store();
    let mut existing = vec![FileRecord::with_id(1, "old-1"), FileRecord::with_id(2, "old-2")];
    store.insert_all(&mut existing, None, None).unwrap();
    recorder.clear();

    let mut batch = vec![
        FileRecord::with_id(3, "new-3"),
        FileRecord {
            size: 10.0,
            ..FileRecord::with_id(1, "old-1")
        },
        FileRecord::with_id(4, "new-4"),
        FileRecord::with_id(2, "old-2"),
        FileRecord::with_id(5, "new-5"),
    ];
    let mut seen = Vec::new();
    let mut reporter = ProgressFn::new(|total, current| {
        seen.push((total, current));
        current < 3
    });

    let outcome = store
        .publish_all(&mut batch, None, Some(&mut reporter))
        .unwrap();
    drop(reporter);

    assert_eq!(seen, vec![(5, 1), (5, 2), (5, 3)]);
    assert!(outcome.cancelled);
    assert_eq!(outcome.total, 5);
    assert_eq!(outcome.processed, 3);
    assert_eq!(outcome.affected_rows, 3);
    assert_eq!(count(&store, "files"), 3);
    let stored_ids: Vec<i64> = store
        .cast_query(&QueryDescriptor::new("files").order_by("id"), FileRecord::default)
        .unwrap()
        .into_iter()
        .filter_map(|file| file.id)
        .collect();
    assert_eq!(stored_ids, vec![1, 2, 3]);
    assert_eq!(sizes(&store), vec![0.0, 10.0, 0.0]);

    let records = recorder.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].inserted);
    assert!(records[0].updated);
    assert_eq!(records[0].affected_row_count, 3);
}

#[test]
fn publish_all_with_duplicate_new_identities_fails_atomically() {
    let (store, recorder) = store();
    let mut batch = vec![
        FileRecord::with_id(9, "first"),
        FileRecord::with_id(9, "second"),
    ];

    let err = store.publish_all(&mut batch, None, None).unwrap_err();

    assert!(matches!(err, DbError::Batch { operation: "publish_all", .. }));
    assert!(err.is_write_conflict());
    assert_eq!(count(&store, "files"), 0);
    assert!(recorder.records().is_empty());
}

#[test]
fn update_then_insert_surfaces_conflicts_on_other_unique_keys() {
    let (store, _) = store_with(
        StoreConfig::in_memory().publish_policy(PublishPolicy::UpdateThenInsert),
    );
    store.insert(&mut FileRecord::with_id(1, "taken"), None).unwrap();

    let mut clash = FileRecord::with_id(2, "taken");
    let err = store.publish(&mut clash, None).unwrap_err();

    assert!(matches!(err, DbError::WriteConflict { ref table, .. } if table == "files"));
    assert_eq!(count(&store, "files"), 1);
}
