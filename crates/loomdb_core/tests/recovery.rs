//! Recovery: snapshot loading, log replay, and the consistency checks
//! that refuse to open a store they cannot trust.

mod common;

use common::people_schema;
use loomdb_codec::{
    serialize_snapshot, serialize_transaction, CommandCall, EntitySnapshot, InstanceSnapshot,
    Snapshot, TransactionRecord,
};
use loomdb_core::{CoreError, Store, StoreConfig, TransactionBatch, Value};
use loomdb_storage::{
    InMemoryLog, InMemorySnapshotStore, SnapshotStore, StorageError, StorageResult, TransactionLog,
};
use std::collections::BTreeMap;
use std::time::Duration;

fn config() -> StoreConfig {
    StoreConfig::new("test")
}

fn open(log: &InMemoryLog, snapshots: &InMemorySnapshotStore, config: StoreConfig) -> Result<Store, CoreError> {
    Store::open(
        people_schema(),
        config,
        Box::new(log.handle()),
        Box::new(snapshots.handle()),
    )
}

fn run_one(store: &Store, call: CommandCall) -> Result<Value, CoreError> {
    let futures = store
        .submit(TransactionBatch::new("test").call(call))
        .unwrap();
    futures.into_iter().next().unwrap().wait()
}

fn create_person(store: &Store, name: &str) -> Result<Value, CoreError> {
    run_one(store, CommandCall::new("create_person").param("name", name))
}

fn person_names(store: &Store) -> Vec<String> {
    store.read(|txn| {
        txn.select("Person")
            .unwrap()
            .all()
            .iter()
            .map(|p| match txn.attribute(p, "name").unwrap() {
                Value::Text(s) => s,
                other => panic!("unexpected name value {other}"),
            })
            .collect()
    })
}

#[test]
fn replay_from_log_alone() {
    let log = InMemoryLog::new();
    let snapshots = InMemorySnapshotStore::new();
    {
        let store = open(&log, &snapshots, config()).unwrap();
        create_person(&store, "john").unwrap();
        create_person(&store, "jane").unwrap();
        run_one(&store, CommandCall::new("delete_person").param("name", "john")).unwrap();
        store.close().unwrap();
    }

    let store = open(&log, &snapshots, config()).unwrap();
    assert_eq!(store.last_committed().as_u64(), 3);
    assert_eq!(person_names(&store), vec!["jane".to_string()]);

    // The writer resumes numbering and ids continue past the replayed
    // history.
    assert_eq!(create_person(&store, "jim").unwrap(), Value::Integer(2));
    assert_eq!(store.last_committed().as_u64(), 4);
}

#[test]
fn snapshot_plus_log_tail() {
    let log = InMemoryLog::new();
    let snapshots = InMemorySnapshotStore::new();
    {
        let store = open(&log, &snapshots, config()).unwrap();
        create_person(&store, "john").unwrap();
        run_one(
            &store,
            CommandCall::new("create_car")
                .param("plate", "X-1")
                .param("owner", "john"),
        )
        .unwrap();
        store.snapshot().unwrap();
        // Tail past the snapshot.
        create_person(&store, "jane").unwrap();
        run_one(&store, CommandCall::new("set_owner").param("plate", "X-1").param("owner", "jane"))
            .unwrap();
        store.close().unwrap();
    }

    let store = open(&log, &snapshots, config()).unwrap();
    assert_eq!(store.last_committed().as_u64(), 4);
    store.read(|txn| {
        let jane = txn.find("Person", "name").equals_to("jane").unwrap();
        let owned = txn.reciprocal(&jane, "owned_cars").unwrap();
        assert_eq!(owned.len(), 1);
        let john = txn.find("Person", "name").equals_to("john").unwrap();
        assert!(txn.reciprocal(&john, "owned_cars").unwrap().is_empty());
    });
}

#[test]
fn recovered_state_matches_live_state() {
    let log = InMemoryLog::new();
    let snapshots = InMemorySnapshotStore::new();
    let live_names;
    let live_last;
    {
        let store = open(&log, &snapshots, config()).unwrap();
        for name in ["a", "b", "c", "d"] {
            create_person(&store, name).unwrap();
        }
        store.snapshot().unwrap();
        run_one(&store, CommandCall::new("delete_person").param("name", "b")).unwrap();
        run_one(
            &store,
            CommandCall::new("rename_person")
                .param("name", "c")
                .param("new_name", "carol"),
        )
        .unwrap();
        live_names = person_names(&store);
        live_last = store.last_committed();
        store.close().unwrap();
    }

    let store = open(&log, &snapshots, config()).unwrap();
    assert_eq!(person_names(&store), live_names);
    assert_eq!(store.last_committed(), live_last);
}

#[test]
fn readonly_mode_survives_restart() {
    let log = InMemoryLog::new();
    let snapshots = InMemorySnapshotStore::new();
    {
        let store = open(&log, &snapshots, config()).unwrap();
        create_person(&store, "john").unwrap();
        run_one(&store, CommandCall::new("__readonly").param("enabled", true)).unwrap();
        store.close().unwrap();
    }

    let store = open(&log, &snapshots, config()).unwrap();
    assert!(store.readonly());
    let err = create_person(&store, "jane").unwrap_err();
    assert!(matches!(err, CoreError::ReadOnly));
}

#[test]
fn older_model_version_cannot_open_newer_snapshot() {
    let log = InMemoryLog::new();
    let snapshots = InMemorySnapshotStore::new();
    {
        let store = open(&log, &snapshots, config().model_version(2)).unwrap();
        create_person(&store, "john").unwrap();
        store.snapshot().unwrap();
        store.close().unwrap();
    }

    let err = open(&log, &snapshots, config().model_version(1)).unwrap_err();
    assert!(matches!(err, CoreError::Unrecoverable { .. }));

    // The same or a newer version opens fine.
    open(&log, &snapshots, config().model_version(2)).unwrap();
    open(&log, &snapshots, config().model_version(3)).unwrap();
}

#[test]
fn older_model_version_cannot_replay_newer_log() {
    let log = InMemoryLog::new();
    let snapshots = InMemorySnapshotStore::new();
    {
        let store = open(&log, &snapshots, config().model_version(2)).unwrap();
        create_person(&store, "john").unwrap();
        store.close().unwrap();
    }

    let err = open(&log, &snapshots, config().model_version(1)).unwrap_err();
    assert!(matches!(err, CoreError::Unrecoverable { .. }));
}

#[test]
fn snapshot_with_inconsistent_next_id_is_unrecoverable() {
    let log = InMemoryLog::new();
    let mut snapshots = InMemorySnapshotStore::new();

    // An instance at or past its table's next id can collide with future
    // allocations; such a snapshot must not load.
    let crafted = Snapshot {
        transaction_id: 1,
        model_version: Some(1),
        readonly: false,
        entities: vec![EntitySnapshot {
            name: "Person".to_string(),
            next_id: 3,
            instances: vec![InstanceSnapshot {
                id: 3,
                attributes: BTreeMap::from([("name".to_string(), Value::from("john"))]),
                relations: BTreeMap::new(),
            }],
        }],
    };
    snapshots
        .write(1, &serialize_snapshot(&crafted).unwrap())
        .unwrap();

    let err = open(&log, &snapshots, config()).unwrap_err();
    assert!(matches!(err, CoreError::Unrecoverable { .. }));
}

#[test]
fn snapshot_with_unknown_entity_is_unrecoverable() {
    let log = InMemoryLog::new();
    let mut snapshots = InMemorySnapshotStore::new();

    let crafted = Snapshot {
        transaction_id: 1,
        model_version: Some(1),
        readonly: false,
        entities: vec![EntitySnapshot {
            name: "Spaceship".to_string(),
            next_id: 0,
            instances: Vec::new(),
        }],
    };
    snapshots
        .write(1, &serialize_snapshot(&crafted).unwrap())
        .unwrap();

    let err = open(&log, &snapshots, config()).unwrap_err();
    assert!(matches!(err, CoreError::Unrecoverable { .. }));
}

#[test]
fn replay_of_unknown_command_is_unrecoverable() {
    let mut log = InMemoryLog::new();
    let snapshots = InMemorySnapshotStore::new();

    let record = TransactionRecord {
        id: 1,
        sync_id: "test".to_string(),
        model_version: 1,
        commands: vec![CommandCall::new("levitate")],
    };
    log.append(1, &serialize_transaction(&record).unwrap())
        .unwrap();

    let err = open(&log, &snapshots, config()).unwrap_err();
    assert!(matches!(err, CoreError::Unrecoverable { .. }));
}

#[test]
fn failed_append_stops_the_writer() {
    // A failed append may still have left a durable frame behind, so the
    // writer must not keep going and re-use the transaction id.
    struct FailingLog {
        inner: InMemoryLog,
        appends_left: usize,
    }

    impl TransactionLog for FailingLog {
        fn append(&mut self, id: u64, bytes: &[u8]) -> StorageResult<()> {
            if self.appends_left == 0 {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "device failure",
                )));
            }
            self.appends_left -= 1;
            self.inner.append(id, bytes)
        }

        fn seek(&mut self, after: u64) -> StorageResult<()> {
            self.inner.seek(after)
        }

        fn poll_next(&mut self, timeout: Duration) -> StorageResult<Option<(u64, Vec<u8>)>> {
            self.inner.poll_next(timeout)
        }

        fn last_id(&self) -> StorageResult<Option<u64>> {
            self.inner.last_id()
        }
    }

    let log = InMemoryLog::new();
    let snapshots = InMemorySnapshotStore::new();
    let store = Store::open(
        people_schema(),
        config(),
        Box::new(FailingLog {
            inner: log.handle(),
            appends_left: 1,
        }),
        Box::new(snapshots.handle()),
    )
    .unwrap();

    create_person(&store, "john").unwrap();
    let err = create_person(&store, "jane").unwrap_err();
    assert!(matches!(err, CoreError::Storage(_)));

    // The writer is gone; later submissions settle as closed, either at
    // the gate or through their futures.
    let followup = TransactionBatch::new("test")
        .call(CommandCall::new("create_person").param("name", "jim"));
    match store.submit(followup) {
        Err(err) => assert!(matches!(err, CoreError::Closed)),
        Ok(futures) => {
            for future in futures {
                assert!(matches!(future.wait(), Err(CoreError::Closed)));
            }
        }
    }

    // Reads keep serving the last committed state.
    assert_eq!(store.last_committed().as_u64(), 1);
    assert_eq!(person_names(&store), vec!["john".to_string()]);
    drop(store);

    // The surviving log holds no duplicate ids and reopens cleanly.
    let store = open(&log, &snapshots, config()).unwrap();
    assert_eq!(store.last_committed().as_u64(), 1);
    assert_eq!(person_names(&store), vec!["john".to_string()]);
}

#[test]
fn file_backed_store_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = Store::open_dir(people_schema(), config(), dir.path()).unwrap();
        create_person(&store, "john").unwrap();
        run_one(
            &store,
            CommandCall::new("create_car")
                .param("plate", "X-1")
                .param("owner", "john"),
        )
        .unwrap();
        store.snapshot().unwrap();
        create_person(&store, "jane").unwrap();
        store.close().unwrap();
    }

    let store = Store::open_dir(people_schema(), config(), dir.path()).unwrap();
    assert_eq!(store.last_committed().as_u64(), 3);
    store.read(|txn| {
        assert_eq!(txn.select("Person").unwrap().count(), 2);
        let john = txn.find("Person", "name").equals_to("john").unwrap();
        assert_eq!(txn.reciprocal(&john, "owned_cars").unwrap().len(), 1);
    });
}

#[test]
fn directory_lock_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let _store = Store::open_dir(people_schema(), config(), dir.path()).unwrap();

    let err = Store::open_dir(people_schema(), config(), dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::Storage(_)));
}
