//! Forge prefab reconciliation
//!
//! Keeps prefab instances embedded in scenes and prefabs consistent with the
//! base prefabs they instantiate. Each pass rewrites the document's override
//! records so they describe exactly how the live instance differs from its
//! base, or disconnects the instance when it can no longer be expressed as
//! overrides.
//!
//! # Core Concepts
//!
//! - [`Reconciler`]: the engine, configured with a [`BasePrefabResolver`],
//!   a [`FileIdGenerator`] and [`ReconcileOptions`]
//! - [`PrefabCache`]: the explicit cache of imported base prefabs
//! - [`CompatibilityRule`]: pluggable checks that force disconnection
//! - [`resolve_target_overrides`]: re-link cross-instance references on load
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_prefab::{PrefabCache, Reconciler, UuidFileIds};
//!
//! let cache = PrefabCache::new();
//! cache.insert(prefab_id, prefab_table);
//! let report = Reconciler::new(&cache, &UuidFileIds).reconcile_document(&mut scene)?;
//! for root in report.disconnected() {
//!     eprintln!("{} lost its prefab link", root.root);
//! }
//! ```

mod compat;
mod crossref;
mod diff;
mod disconnect;
mod engine;
mod error;
mod ids;
mod instantiate;
mod locate;
mod resolver;

pub use compat::{
    default_rules, match_structure, CompatibilityRule, DisconnectReason, Pairing,
    SkinnedSocketsRule,
};
pub use crossref::{
    field_at, plan_target_overrides, resolve_target_overrides, Membership, TargetOverridePlan,
};
pub use diff::{
    canonical, compare_base_props, compare_component_props, equivalent, BASE_PROPS,
    IGNORED_COMPONENT_FIELDS,
};
pub use disconnect::{restore_to_normal, MARKER_FIELD};
pub use engine::{
    dependencies, DocumentReport, ReconcileOptions, Reconciler, RootReport, RootStatus,
};
pub use error::{ReconcileError, ReconcileResult};
pub use ids::{FileIdGenerator, SequentialFileIds, UuidFileIds};
pub use instantiate::instantiate;
pub use locate::{component_path, node_path, occurrence_root, PathIndex};
pub use resolver::{BasePrefabResolver, PrefabCache};
