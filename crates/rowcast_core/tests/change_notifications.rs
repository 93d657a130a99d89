mod common;

use common::{count, store, FileRecord, Recorder, SCHEMA};
use rowcast_core::{ChangeBus, ChangeKind, QueryDescriptor, RowSnapshot, Store};
use std::sync::Arc;
use std::thread;

#[test]
fn zero_row_writes_leave_nothing_to_flush() {
    let (store, recorder) = store();

    store.changes().record("files", ChangeKind::Insert, 0).unwrap();
    store.changes().record("files", ChangeKind::Remove, -1).unwrap();
    assert!(store.changes().pending().unwrap().is_empty());
    assert!(store.flush().unwrap().is_empty());

    let removed = store
        .remove_rows(&QueryDescriptor::new("files").filter("name = ?", ["nothing"]))
        .unwrap();
    assert_eq!(removed, 0);
    assert!(recorder.records().is_empty());
}

#[test]
fn manual_records_merge_per_table_until_flushed() {
    let (store, recorder) = store();
    let changes = store.changes();

    changes.record("files", ChangeKind::Update, 2).unwrap();
    changes.record("tags", ChangeKind::Insert, 1).unwrap();
    changes.record("files", ChangeKind::Insert, 1).unwrap();
    assert!(recorder.records().is_empty());

    let flushed = store.flush().unwrap();
    assert_eq!(flushed.len(), 2);
    assert_eq!(flushed[0].table, "files");
    assert!(flushed[0].updated && flushed[0].inserted && !flushed[0].removed);
    assert_eq!(flushed[0].affected_row_count, 3);
    assert_eq!(flushed[1].table, "tags");
    assert_eq!(recorder.records(), flushed);

    assert!(store.flush().unwrap().is_empty());
    assert_eq!(recorder.records().len(), 2);
}

#[test]
fn raw_row_writes_feed_the_aggregator() {
    let (store, recorder) = store();

    let rowid = store
        .insert_row(
            "files",
            &RowSnapshot::new()
                .with("name", "raw.bin".to_string())
                .with("size", 3.5),
        )
        .unwrap();
    assert!(rowid.is_some());

    let updated = store
        .update_rows(
            &QueryDescriptor::new("files").filter("name = ?", ["raw.bin"]),
            &RowSnapshot::new().with("size", 7.0),
        )
        .unwrap();
    assert_eq!(updated, 1);

    let untouched = store
        .update_rows(&QueryDescriptor::new("files"), &RowSnapshot::new())
        .unwrap();
    assert_eq!(untouched, 0);

    let removed = store.remove_rows(&QueryDescriptor::new("files")).unwrap();
    assert_eq!(removed, 1);

    let kinds: Vec<(bool, bool, bool)> = recorder
        .records()
        .iter()
        .map(|record| (record.inserted, record.updated, record.removed))
        .collect();
    assert_eq!(
        kinds,
        vec![(true, false, false), (false, true, false), (false, false, true)]
    );
}

#[test]
fn concurrent_batches_account_for_every_row() {
    let (store, recorder) = store();
    let store = Arc::new(store);

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut files: Vec<FileRecord> = (0..25)
                    .map(|n| FileRecord::named(&format!("w{worker}-{n}")))
                    .collect();
                store.insert_all(&mut files, None, None).unwrap()
            })
        })
        .collect();
    for worker in workers {
        let outcome = worker.join().unwrap();
        assert_eq!(outcome.affected_rows, 25);
    }

    assert_eq!(count(&store, "files"), 100);
    let total: u64 = recorder
        .records()
        .iter()
        .map(|record| record.affected_row_count)
        .sum();
    assert_eq!(total, 100);
    assert!(store.changes().pending().unwrap().is_empty());
}

#[test]
fn stores_sharing_a_bus_notify_the_same_listeners() {
    let bus = ChangeBus::shared();
    let recorder = Recorder::attach(&bus);
    let first = Store::open_in_memory(Arc::clone(&bus)).unwrap();
    let second = Store::open_in_memory(Arc::clone(&bus)).unwrap();
    first.execute_batch(SCHEMA).unwrap();
    second.execute_batch(SCHEMA).unwrap();

    first.insert(&mut FileRecord::named("one"), None).unwrap();
    second.insert(&mut FileRecord::named("two"), None).unwrap();

    assert_eq!(bus.listener_count(), 1);
    assert_eq!(recorder.records().len(), 2);
    assert_eq!(count(&first, "files"), 1);
    assert_eq!(count(&second, "files"), 1);
}
