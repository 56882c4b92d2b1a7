use forge_migrate::{Migrate, MigrationChain, SchemaVersion};
use forge_table::{rewrite, Fields, ObjectTable, Opaque, Record};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn marker(version: String) -> impl Fn(&mut ObjectTable) -> anyhow::Result<()> {
    move |table| {
        rewrite::append_record(
            table,
            Record::Opaque(Opaque {
                tag: Some(version.clone()),
                fields: Fields::new(),
            }),
        );
        Ok(())
    }
}

fn build(versions: &BTreeSet<(u8, u8)>) -> (MigrationChain, Vec<SchemaVersion>) {
    let mut chain = MigrationChain::new();
    let mut declared = Vec::new();
    for (minor, patch) in versions {
        let v = format!("1.{minor}.{patch}");
        chain = chain.step(&v, marker(v.clone())).unwrap();
        declared.push(v.parse().unwrap());
    }
    (chain, declared)
}

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(f)
}

proptest! {
    #[test]
    fn prop_gating_and_monotonicity(
        versions in proptest::collection::btree_set((0u8..6, 0u8..12), 0..10),
        recorded in proptest::option::of((0u8..6, 0u8..12)),
    ) {
        let (chain, declared) = build(&versions);
        let recorded: Option<SchemaVersion> =
            recorded.map(|(m, p)| format!("1.{m}.{p}").parse().unwrap());
        let current: SchemaVersion = "2.0".parse().unwrap();

        let mut table = ObjectTable::new();
        let report = block_on(chain.run(&mut table, recorded.as_ref(), &current)).unwrap();

        let expected: Vec<SchemaVersion> = match &recorded {
            None => Vec::new(),
            Some(r) => declared.iter().filter(|v| *v > r).cloned().collect(),
        };
        prop_assert_eq!(&report.applied, &expected);
        prop_assert_eq!(table.len(), expected.len());
        prop_assert_eq!(report.stamp.is_some(), !expected.is_empty());

        // Running again from whatever version is now on record does nothing
        let next = report.stamp.clone().or(recorded);
        let before = table.clone();
        let again = block_on(chain.run(&mut table, next.as_ref(), &current)).unwrap();
        prop_assert!(!again.migrated());
        prop_assert_eq!(table, before);
    }
}

struct Async;

#[async_trait::async_trait]
impl Migrate for Async {
    async fn migrate(&self, table: &mut ObjectTable) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        marker("async".to_string())(table)
    }
}

#[tokio::test]
async fn async_and_sync_steps_interleave_in_order() {
    let chain = MigrationChain::new()
        .step("1.0.1", marker("sync-1".into()))
        .unwrap()
        .step_async("1.0.2", Async)
        .unwrap()
        .step("1.0.3", marker("sync-3".into()))
        .unwrap();
    let mut table = ObjectTable::new();
    let report = chain
        .run(&mut table, Some(&"1.0".parse().unwrap()), &"1.0.3".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(report.applied.len(), 3);
    let tags: Vec<_> = table.records().iter().map(Record::tag).collect();
    assert_eq!(tags, vec!["sync-1", "async", "sync-3"]);
}

#[test]
fn pending_matches_run() {
    let (chain, _) = build(&[(0, 1), (0, 5), (1, 0)].into_iter().collect());
    let recorded: SchemaVersion = "1.0.1".parse().unwrap();
    let pending: Vec<String> = chain
        .pending(Some(&recorded))
        .into_iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(pending, vec!["1.0.5", "1.1.0"]);
}
