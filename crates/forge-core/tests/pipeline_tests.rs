use forge_core::{
    AssetMeta, AssetStore, FsStore, ImportError, ImportOutcome, MemoryStore, Pipeline,
    PipelineConfig, DOCUMENT_VERSION,
};
use forge_migrate::SchemaVersion;
use forge_prefab::{instantiate, SequentialFileIds};
use forge_scheduler::TaskState;
use forge_table::{AssetId, ContentHash, NodeRef, ObjectTable, Value};
use forge_test_utils::{child_named, prefab_asset, prefab_with_slot, simple_prefab, TableBuilder};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn id(s: &str) -> AssetId {
    AssetId::new(s)
}

fn version(s: &str) -> SchemaVersion {
    s.parse().unwrap()
}

/// Scene with one instance per `(uuid, base)`, each moved off its base position
fn level(instances: &[(&str, &ObjectTable)]) -> ObjectTable {
    let mut scene = TableBuilder::scene("Level");
    let parent = scene.root();
    for (i, (uuid, base)) in instances.iter().enumerate() {
        let root = instantiate(scene.table_mut(), parent, base, &prefab_asset(uuid)).unwrap();
        #[allow(clippy::cast_precision_loss)]
        scene.set_prop(root, "_lpos", Value::vec3(i as f64 + 1.0, 0.0, 0.0));
    }
    scene.build()
}

fn pipeline(store: &MemoryStore) -> Pipeline {
    Pipeline::new(Arc::new(store.clone()), PipelineConfig::default())
        .unwrap()
        .with_file_ids(Arc::new(SequentialFileIds::new("t-")))
}

fn first_instance(table: &ObjectTable) -> NodeRef {
    let root = table.root_node().unwrap();
    table.resolve(root).unwrap().children[0]
}

#[tokio::test]
async fn scene_waits_for_its_prefab_and_stores_overrides() {
    let hero = simple_prefab("Hero");
    let store = MemoryStore::new();
    store.insert_source("hero", hero.encode().unwrap());
    store.insert_source("level", level(&[("hero", &hero)]).encode().unwrap());
    let pipeline = pipeline(&store);

    let results = pipeline.import_all([id("level"), id("hero")]).await;
    assert_eq!(results[0].0, id("level"));
    let summary = results[0].1.as_ref().unwrap().summary().unwrap().clone();
    assert_eq!(summary.importer, "scene");
    assert_eq!(summary.dependencies, vec![id("hero")]);
    assert!(summary.migrated.is_empty());
    assert!(!summary.committed);
    let reconcile = summary.reconcile.unwrap();
    assert_eq!((reconcile.roots, reconcile.disconnected), (1, 0));
    assert!(results[1].1.is_ok());

    let artifact = ObjectTable::decode(&store.artifact(&id("level")).unwrap()).unwrap();
    let inst = first_instance(&artifact);
    let info = artifact
        .resolve(artifact.resolve(inst).unwrap().prefab.unwrap())
        .unwrap();
    let pi = artifact.resolve(info.instance.unwrap()).unwrap();
    assert_eq!(pi.property_overrides.len(), 1);

    let meta = store.meta(&id("level")).unwrap();
    assert_eq!(meta.version, Some(version(DOCUMENT_VERSION)));
    assert_eq!(meta.dependencies, vec![id("hero")]);
    assert!(!meta.invalid);
    assert!(pipeline.cache().contains(&id("hero")));
    assert_eq!(pipeline.swap().open_count(), 0);
}

#[tokio::test]
async fn missing_dependencies_are_imported_on_demand() {
    let hero = simple_prefab("Hero");
    let store = MemoryStore::new();
    store.insert_source("hero", hero.encode().unwrap());
    store.insert_source("level", level(&[("hero", &hero)]).encode().unwrap());
    let pipeline = pipeline(&store);

    let outcome = pipeline.import(id("level")).await.unwrap();
    assert_eq!(outcome.summary().unwrap().reconcile.as_ref().unwrap().disconnected, 0);
    assert!(pipeline.cache().contains(&id("hero")));
    assert_eq!(store.meta(&id("hero")).unwrap().importer, "prefab");
}

#[tokio::test]
async fn unchanged_assets_are_skipped() {
    let hero = simple_prefab("Hero");
    let store = MemoryStore::new();
    store.insert_source("hero", hero.encode().unwrap());
    store.insert_source("level", level(&[("hero", &hero)]).encode().unwrap());

    let first = pipeline(&store);
    for (_, result) in first.import_all([id("hero"), id("level")]).await {
        assert!(matches!(result.unwrap(), ImportOutcome::Imported(_)));
    }
    for (_, result) in first.import_all([id("hero"), id("level")]).await {
        assert_eq!(result.unwrap(), ImportOutcome::UpToDate);
    }

    // A fresh pipeline restores base prefabs from their artifacts
    let second = pipeline(&store);
    assert_eq!(second.import(id("hero")).await.unwrap(), ImportOutcome::UpToDate);
    assert!(second.cache().contains(&id("hero")));

    // Editing the source triggers a re-import
    store.insert_source("hero", simple_prefab("Hero2").encode().unwrap());
    assert!(matches!(
        second.import(id("hero")).await.unwrap(),
        ImportOutcome::Imported(_)
    ));
}

#[tokio::test]
async fn old_sources_are_migrated_and_committed() {
    let mut legacy = TableBuilder::prefab("Legacy");
    let root = legacy.root();
    legacy.set_prop(root, "_position", Value::vec3(1.0, 2.0, 3.0));
    let store = MemoryStore::new();
    store.insert_source("legacy", legacy.build().encode().unwrap());
    store
        .write_meta(&id("legacy"), &AssetMeta::new("prefab").with_version(version("1.0.0")))
        .await
        .unwrap();

    let outcome = pipeline(&store).import(id("legacy")).await.unwrap();
    let summary = outcome.summary().unwrap();
    assert_eq!(summary.migrated, vec![version("1.0.1"), version("1.0.3")]);
    assert!(summary.committed);

    let source = store.source(&id("legacy")).unwrap();
    let table = ObjectTable::decode(&source).unwrap();
    let node = table.resolve(table.root_node().unwrap()).unwrap();
    assert_eq!(node.props.get("_lpos"), Some(&Value::vec3(1.0, 2.0, 3.0)));
    assert!(!node.props.contains_key("_position"));

    let meta = store.meta(&id("legacy")).unwrap();
    assert_eq!(meta.version, Some(version(DOCUMENT_VERSION)));
    assert_eq!(meta.source_hash, Some(ContentHash::compute(&source)));
}

#[tokio::test]
async fn sources_with_nothing_pending_keep_their_recorded_version() {
    let store = MemoryStore::new();
    store.insert_source("hero", simple_prefab("Hero").encode().unwrap());
    store
        .write_meta(&id("hero"), &AssetMeta::new("prefab").with_version(version("1.0.3")))
        .await
        .unwrap();

    let pipeline = pipeline(&store);
    let outcome = pipeline.import(id("hero")).await.unwrap();
    let summary = outcome.summary().unwrap();
    assert!(summary.migrated.is_empty());
    assert!(!summary.committed);
    assert_eq!(summary.version, version("1.0.3"));
    assert_eq!(store.meta(&id("hero")).unwrap().version, Some(version("1.0.3")));

    assert_eq!(pipeline.import(id("hero")).await.unwrap(), ImportOutcome::UpToDate);
}

#[tokio::test]
async fn failed_migration_marks_the_asset_invalid() {
    let mut broken = TableBuilder::prefab("Broken");
    let root = broken.root();
    broken.set_prop(root, "_trs", Value::Array(vec![Value::int(1)]));
    let source = broken.build().encode().unwrap();
    let store = MemoryStore::new();
    store.insert_source("broken", source.clone());
    store
        .write_meta(&id("broken"), &AssetMeta::new("prefab").with_version(version("1.0.2")))
        .await
        .unwrap();

    let err = pipeline(&store).import(id("broken")).await.unwrap_err();
    assert!(matches!(err, ImportError::Migration { .. }));
    assert!(err.is_asset_fatal());

    let meta = store.meta(&id("broken")).unwrap();
    assert!(meta.invalid);
    assert!(meta.error.unwrap().contains("1.0.3"));
    assert_eq!(meta.version, Some(version("1.0.2")));
    assert_eq!(store.source(&id("broken")).unwrap(), source);
    assert!(store.artifact(&id("broken")).is_none());
}

#[tokio::test]
async fn deleted_base_disconnects_only_its_instances() {
    let hero = simple_prefab("Hero");
    let ghost = simple_prefab("Ghost");
    let store = MemoryStore::new();
    store.insert_source("hero", hero.encode().unwrap());
    store.insert_source(
        "level",
        level(&[("hero", &hero), ("ghost", &ghost)]).encode().unwrap(),
    );

    let outcome = pipeline(&store).import(id("level")).await.unwrap();
    let reconcile = outcome.summary().unwrap().reconcile.clone().unwrap();
    assert_eq!((reconcile.roots, reconcile.disconnected), (2, 1));
    assert!(reconcile.forced.is_empty());
}

#[tokio::test]
async fn dependency_cycles_degrade_to_disconnection() {
    let mut a = prefab_with_slot("A");
    let slot = child_named(a.table(), a.root(), "slot").unwrap();
    instantiate(a.table_mut(), slot, &simple_prefab("B"), &prefab_asset("b")).unwrap();
    let mut b = prefab_with_slot("B");
    let slot = child_named(b.table(), b.root(), "slot").unwrap();
    instantiate(b.table_mut(), slot, &simple_prefab("A"), &prefab_asset("a")).unwrap();

    let store = MemoryStore::new();
    store.insert_source("a", a.build().encode().unwrap());
    store.insert_source("b", b.build().encode().unwrap());
    let pipeline = pipeline(&store);

    let mut forced = Vec::new();
    for (asset, result) in pipeline.import_all([id("a"), id("b")]).await {
        let reconcile = result.unwrap().summary().unwrap().reconcile.clone().unwrap();
        if !reconcile.forced.is_empty() {
            assert_eq!(reconcile.disconnected, 1);
            forced.push((asset, reconcile.forced));
        }
    }
    assert_eq!(forced.len(), 1, "exactly one side breaks the cycle: {forced:?}");
    let (asset, deps) = &forced[0];
    let other = if *asset == id("a") { id("b") } else { id("a") };
    assert_eq!(deps, &vec![other]);
}

#[tokio::test]
async fn cancelling_a_waiting_import_writes_nothing() {
    let hero = simple_prefab("Hero");
    let store = MemoryStore::new();
    store.insert_source("hero", hero.encode().unwrap());
    let source = level(&[("hero", &hero)]).encode().unwrap();
    store.insert_source("level", source.clone());
    let pipeline = pipeline(&store);

    let (release, blocked) = tokio::sync::oneshot::channel::<()>();
    let blocker = pipeline.scheduler().enqueue(id("hero"), |_| async move {
        blocked.await?;
        Ok::<_, anyhow::Error>(())
    });

    let mut handle = pipeline.enqueue(id("level"));
    assert_eq!(handle.reached(TaskState::Waiting).await, TaskState::Waiting);
    assert_eq!(pipeline.swap().open_count(), 1);
    assert_eq!(pipeline.cancel(&id("level")), 1);

    let err = ImportError::from(handle.join().await.unwrap_err());
    assert!(err.is_cancelled(), "{err:?}");
    assert_eq!(pipeline.swap().open_count(), 0);
    assert!(store.meta(&id("level")).is_none());
    assert!(store.artifact(&id("level")).is_none());
    assert_eq!(store.source(&id("level")).unwrap(), source);

    release.send(()).unwrap();
    blocker.join().await.unwrap();
    assert!(store.meta(&id("hero")).is_none());
}

#[tokio::test]
async fn non_documents_are_rejected() {
    let store = MemoryStore::new();
    store.insert_source("odd", r#"[{"__type__":"cc.Texture2D"}]"#);
    let pipeline = pipeline(&store);
    let err = pipeline.import(id("odd")).await.unwrap_err();
    assert!(matches!(err, ImportError::Table { .. }));
    assert!(store.meta(&id("odd")).is_none());
    assert_eq!(pipeline.swap().open_count(), 0);
}

#[tokio::test]
async fn fs_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::from_toml_str("library_dir = \"lib\"").unwrap();
    let hero = simple_prefab("Hero");
    tokio::fs::write(dir.path().join("hero.json"), hero.encode().unwrap())
        .await
        .unwrap();
    tokio::fs::write(
        dir.path().join("level.json"),
        level(&[("hero", &hero)]).encode().unwrap(),
    )
    .await
    .unwrap();

    let store = Arc::new(FsStore::new(dir.path(), &config.library_dir));
    let ids = store.list().await.unwrap();
    assert_eq!(ids, vec![id("hero"), id("level")]);

    let pipeline = Pipeline::new(store.clone(), config).unwrap();
    for (asset, result) in pipeline.import_all(ids).await {
        assert!(result.is_ok(), "{asset}: {result:?}");
    }
    assert!(dir.path().join("lib/level.json").exists());
    let meta = store.read_meta(&id("level")).await.unwrap().unwrap();
    assert_eq!(meta.importer, "scene");
    assert_eq!(meta.dependencies, vec![id("hero")]);

    // Library files are not mistaken for sources
    assert_eq!(store.list().await.unwrap().len(), 2);
}
