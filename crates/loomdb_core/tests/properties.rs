//! Property tests over the public store API.

mod common;

use common::people_schema;
use loomdb_codec::CommandCall;
use loomdb_core::{Store, StoreConfig, TransactionBatch, Value};
use loomdb_storage::{InMemoryLog, InMemorySnapshotStore};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn run_one(store: &Store, call: CommandCall) -> Result<Value, loomdb_core::CoreError> {
    let futures = store
        .submit(TransactionBatch::new("prop").call(call))
        .unwrap();
    futures.into_iter().next().unwrap().wait()
}

fn live_names(store: &Store) -> BTreeSet<String> {
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

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Creating distinct names then deleting a subset always leaves
    /// exactly the survivors, ids stay strictly increasing, and a
    /// restarted store reproduces the same live set.
    #[test]
    fn recovery_reproduces_live_state(
        names in prop::collection::btree_set("[a-z]{1,8}", 1..12),
        mask in prop::collection::vec(any::<bool>(), 12),
    ) {
        let log = InMemoryLog::new();
        let snapshots = InMemorySnapshotStore::new();
        let store = Store::open(
            people_schema(),
            StoreConfig::new("prop"),
            Box::new(log.handle()),
            Box::new(snapshots.handle()),
        ).unwrap();

        let names: Vec<String> = names.into_iter().collect();
        let mut expected_id = 0i64;
        for name in &names {
            let id = run_one(&store, CommandCall::new("create_person").param("name", name.as_str())).unwrap();
            prop_assert_eq!(id, Value::Integer(expected_id));
            expected_id += 1;
        }

        let mut survivors: BTreeSet<String> = names.iter().cloned().collect();
        for (name, delete) in names.iter().zip(&mask) {
            if *delete {
                run_one(&store, CommandCall::new("delete_person").param("name", name.as_str())).unwrap();
                survivors.remove(name);
            }
        }

        prop_assert_eq!(live_names(&store), survivors.clone());
        let last = store.last_committed();
        store.close().unwrap();
        drop(store);

        let reopened = Store::open(
            people_schema(),
            StoreConfig::new("prop"),
            Box::new(log.handle()),
            Box::new(snapshots.handle()),
        ).unwrap();
        prop_assert_eq!(live_names(&reopened), survivors);
        prop_assert_eq!(reopened.last_committed(), last);
    }

    /// A duplicate name never commits, regardless of how the attempts
    /// interleave with successful creations.
    #[test]
    fn unique_names_stay_unique(
        names in prop::collection::vec("[a-z]{1,4}", 1..20),
    ) {
        let store = Store::open_in_memory(people_schema(), StoreConfig::new("prop")).unwrap();

        let mut seen = BTreeSet::new();
        for name in &names {
            let result = run_one(&store, CommandCall::new("create_person").param("name", name.as_str()));
            if seen.insert(name.clone()) {
                prop_assert!(result.is_ok());
            } else {
                prop_assert!(result.is_err());
            }
        }

        prop_assert_eq!(live_names(&store), seen);
    }
}
