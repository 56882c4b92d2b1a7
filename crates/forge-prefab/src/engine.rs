//! Document reconciliation
//!
//! One pass over a document:
//!
//! 1. re-link fields nulled by existing target overrides
//! 2. find the outermost instance roots and match each against its base,
//!    then do the same for instances mounted inside connected ones
//! 3. plan overrides per root and target overrides document-wide, demoting
//!    any root whose plan fails and re-planning until stable
//! 4. apply the plan through a [`Rewriter`], disconnecting demoted roots
//! 5. compact and verify
//!
//! Existing override records are reused whenever their key still applies, so
//! reconciling an already reconciled document changes nothing.

use crate::compat::{default_rules, match_structure, CompatibilityRule, DisconnectReason, Pairing};
use crate::crossref::{
    covered_fields, plan_target_overrides, resolve_target_overrides, set_field, Membership,
    TargetOverridePlan,
};
use crate::diff::{compare_base_props, compare_component_props};
use crate::disconnect::restore_to_normal;
use crate::error::{ReconcileError, ReconcileResult};
use crate::ids::FileIdGenerator;
use crate::locate::{component_path, node_path, prefab_info, PathIndex};
use crate::resolver::BasePrefabResolver;
use forge_table::{
    rewrite, tags, AssetId, AssetLink, AssetRef, ComponentRef, Fields, InstanceKind, InstanceRef,
    LocalIdPath, MountedChildrenInfo, MountedChildrenKind, MountedComponentsInfo,
    MountedComponentsKind, NodeRef, ObjectTable, PrefabInfo, PrefabInfoKind, PrefabInstance,
    PropertyOverrideInfo, PropertyOverrideKind, Remap, Rewriter, Slot, SlotRef, TargetInfo,
    TargetInfoKind, TargetInfoRef, TargetOverrideInfo, TargetOverrideKind, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reconciliation switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    /// Compact the table after the pass
    pub compact: bool,
    /// Verify reference integrity after the pass
    pub verify: bool,
    /// Component type left on disconnected roots; `None` leaves no marker
    pub prefab_link_marker: Option<String>,
    /// Prefabs whose instances are disconnected unconditionally
    pub force_disconnect: BTreeSet<AssetId>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            compact: true,
            verify: true,
            prefab_link_marker: Some(tags::PREFAB_LINK.to_string()),
            force_disconnect: BTreeSet::new(),
        }
    }
}

impl ReconcileOptions {
    /// Set compaction
    #[must_use]
    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Set verification
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Set the disconnection marker type
    #[must_use]
    pub fn with_marker(mut self, marker: Option<String>) -> Self {
        self.prefab_link_marker = marker;
        self
    }

    /// Disconnect every instance of `asset`
    #[must_use]
    pub fn force_disconnect(mut self, asset: AssetId) -> Self {
        self.force_disconnect.insert(asset);
        self
    }
}

/// Outcome for one instance root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootStatus {
    /// Reconciled; overrides are up to date
    Connected,
    /// Auto-synced mirror; stores no overrides
    Mirror,
    /// Converted to plain nodes
    Disconnected(DisconnectReason),
}

/// Per-root summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootReport {
    /// Instance root (slot before compaction; map through [`DocumentReport::remap`])
    pub root: NodeRef,
    /// Prefab the root instantiates
    pub asset: Option<AssetId>,
    /// What happened
    pub status: RootStatus,
    /// Property overrides stored
    pub property_overrides: usize,
    /// Mounted child groups stored
    pub mounted_children: usize,
    /// Mounted component groups stored
    pub mounted_components: usize,
    /// Removed base components recorded
    pub removed_components: usize,
}

impl RootReport {
    fn new(root: NodeRef, asset: Option<AssetId>, status: RootStatus) -> Self {
        Self {
            root,
            asset,
            status,
            property_overrides: 0,
            mounted_children: 0,
            mounted_components: 0,
            removed_components: 0,
        }
    }

    /// Was the root disconnected?
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        matches!(self.status, RootStatus::Disconnected(_))
    }
}

/// Summary of one document pass
#[derive(Debug, Clone, Default)]
pub struct DocumentReport {
    /// Every processed instance root, in document order
    pub roots: Vec<RootReport>,
    /// Target overrides stored on the document root
    pub target_overrides: usize,
    /// Records appended by the pass
    pub appended: usize,
    /// Slot remap, if the table was compacted
    pub remap: Option<Remap>,
}

impl DocumentReport {
    /// Report for `root` (pre-compaction slot)
    #[must_use]
    pub fn root(&self, root: NodeRef) -> Option<&RootReport> {
        self.roots.iter().find(|r| r.root == root)
    }

    /// Roots that were disconnected
    pub fn disconnected(&self) -> impl Iterator<Item = &RootReport> {
        self.roots.iter().filter(|r| r.is_disconnected())
    }

    /// Current slot of a pre-pass node
    #[must_use]
    pub fn current(&self, node: NodeRef) -> Option<NodeRef> {
        match &self.remap {
            Some(remap) => remap.get_typed(node),
            None => Some(node),
        }
    }
}

/// Prefab dependencies a document needs resolved before reconciliation
///
/// Every prefab an instance root anywhere in the document instantiates,
/// sorted. Instances mounted inside other instances are only found once
/// their outer base is known, so all of them are listed up front.
///
/// # Errors
/// Returns error if the document has no root node
pub fn dependencies(table: &ObjectTable) -> ReconcileResult<Vec<AssetId>> {
    let doc_root = table.root_node()?;
    let deps: BTreeSet<AssetId> = table
        .subtree(doc_root)
        .into_iter()
        .filter(|node| *node != doc_root)
        .filter_map(|node| {
            let info = prefab_info(table, node)?;
            if info.root != Some(node) {
                return None;
            }
            info.asset.as_ref()?.external().map(|a| a.uuid.clone())
        })
        .collect();
    Ok(deps.into_iter().collect())
}

#[derive(Debug, Clone)]
struct Candidate {
    root: NodeRef,
    asset: Option<AssetRef>,
    sync: bool,
    /// Candidate whose instance this one is mounted in
    parent: Option<usize>,
}

/// Outermost instance roots at or below `from`, in pre-order
fn discover(table: &ObjectTable, from: &[NodeRef], parent: Option<usize>) -> Vec<Candidate> {
    let mut found = Vec::new();
    let mut stack: Vec<NodeRef> = from.iter().rev().copied().collect();
    let mut seen = BTreeSet::new();
    while let Some(node) = stack.pop() {
        if !seen.insert(node) {
            continue;
        }
        let Ok(n) = table.resolve(node) else {
            continue;
        };
        if let Some(info) = prefab_info(table, node) {
            let own = matches!(info.asset, Some(AssetLink::Own(_)));
            if info.root == Some(node) && !own {
                found.push(Candidate {
                    root: node,
                    asset: info.asset.as_ref().and_then(|a| a.external()).cloned(),
                    sync: info.sync,
                    parent,
                });
                continue;
            }
        }
        stack.extend(n.children.iter().rev().copied());
    }
    found
}

/// Is candidate `i` the candidate at `scope` or mounted somewhere inside it?
fn within(candidates: &[Candidate], mut i: usize, scope: usize) -> bool {
    loop {
        if i == scope {
            return true;
        }
        match candidates[i].parent {
            Some(parent) => i = parent,
            None => return false,
        }
    }
}

#[derive(Debug)]
enum RootState {
    Connected {
        base: Arc<ObjectTable>,
        base_root: NodeRef,
        pairing: Pairing,
    },
    Mirror,
    Disconnected(DisconnectReason),
    /// Outside a single-root pass; left linked and unchanged
    Untouched,
}

impl RootState {
    fn is_linked(&self) -> bool {
        !matches!(self, Self::Disconnected(_))
    }
}

#[derive(Debug, Clone)]
struct OverridePlan {
    target: LocalIdPath,
    property_path: Vec<String>,
    value: Value,
}

#[derive(Debug, Clone, Default)]
struct InstancePlan {
    property_overrides: Vec<OverridePlan>,
    mounted_children: Vec<(LocalIdPath, Vec<NodeRef>)>,
    mounted_components: Vec<(LocalIdPath, Vec<ComponentRef>)>,
    removed_components: Vec<LocalIdPath>,
}

impl InstancePlan {
    fn is_empty(&self) -> bool {
        self.property_overrides.is_empty()
            && self.mounted_children.is_empty()
            && self.mounted_components.is_empty()
            && self.removed_components.is_empty()
    }
}

/// Reconciles prefab instances against their base prefabs
#[derive(Debug)]
pub struct Reconciler<'a> {
    resolver: &'a dyn BasePrefabResolver,
    ids: &'a dyn FileIdGenerator,
    rules: Vec<Arc<dyn CompatibilityRule>>,
    options: ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    /// Engine with the default rules and options
    #[must_use]
    pub fn new(resolver: &'a dyn BasePrefabResolver, ids: &'a dyn FileIdGenerator) -> Self {
        Self {
            resolver,
            ids,
            rules: default_rules(),
            options: ReconcileOptions::default(),
        }
    }

    /// Replace the options
    #[must_use]
    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// Add a compatibility rule
    #[must_use]
    pub fn with_rule(mut self, rule: Arc<dyn CompatibilityRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Replace the compatibility rules
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<Arc<dyn CompatibilityRule>>) -> Self {
        self.rules = rules;
        self
    }

    /// Current options
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Reconcile every instance in the document
    ///
    /// # Errors
    /// Returns error if the document has no root, or applying the plan
    /// leaves the table inconsistent. Problems with individual instances
    /// disconnect them instead.
    pub fn reconcile_document(&self, table: &mut ObjectTable) -> ReconcileResult<DocumentReport> {
        self.run(table, None)
    }

    /// Reconcile the single instance rooted at `root`
    ///
    /// Instances mounted inside it are reconciled too. Other instances are
    /// left as they are; target overrides are still recomputed for the whole
    /// document.
    ///
    /// # Errors
    /// Returns [`ReconcileError::NotAnInstanceRoot`] if `root` is neither an
    /// outermost instance root nor one mounted in a connected instance, or
    /// any document-level error
    pub fn reconcile(&self, table: &mut ObjectTable, root: NodeRef) -> ReconcileResult<RootReport> {
        let report = self.run(table, Some(root))?;
        report
            .roots
            .into_iter()
            .find(|r| r.root == root)
            .ok_or(ReconcileError::NotAnInstanceRoot(root.erase()))
    }

    fn run(&self, table: &mut ObjectTable, only: Option<NodeRef>) -> ReconcileResult<DocumentReport> {
        let doc_root = table.root_node()?;
        let restored = resolve_target_overrides(table)?;
        let before = table.len();

        let top: Vec<NodeRef> = table.resolve(doc_root)?.children.clone();
        let mut candidates = discover(table, &top, None);
        let mut states: Vec<RootState> = Vec::with_capacity(candidates.len());
        // Instances mounted under a connected root are candidates of their own
        while states.len() < candidates.len() {
            let i = states.len();
            let state = self.classify(table, &candidates[i]);
            if let RootState::Connected { pairing, .. } = &state {
                let mounted: Vec<NodeRef> = pairing
                    .mounted_children
                    .iter()
                    .flat_map(|(_, nodes)| nodes.iter().copied())
                    .collect();
                candidates.extend(discover(table, &mounted, Some(i)));
            }
            states.push(state);
        }
        if let Some(only) = only {
            let scope = candidates
                .iter()
                .position(|c| c.root == only)
                .ok_or(ReconcileError::NotAnInstanceRoot(only.erase()))?;
            for (i, state) in states.iter_mut().enumerate() {
                if !within(&candidates, i, scope) {
                    *state = RootState::Untouched;
                }
            }
        }

        let (target_plans, mut plans) = loop {
            let linked: Vec<NodeRef> = candidates
                .iter()
                .zip(&states)
                .filter(|(_, s)| s.is_linked())
                .map(|(c, _)| c.root)
                .collect();
            let membership = Membership::build(table, &linked);
            let target_plans = plan_target_overrides(table, doc_root, &membership);
            let covered = covered_fields(&target_plans);

            let mut plans = HashMap::new();
            let mut demoted = false;
            for (i, (candidate, state)) in candidates.iter().zip(states.iter_mut()).enumerate() {
                let outcome = match &*state {
                    RootState::Connected {
                        base,
                        base_root,
                        pairing,
                    } => plan_instance(table, base, *base_root, pairing, &covered),
                    _ => continue,
                };
                match outcome {
                    Ok(plan) => {
                        plans.insert(i, plan);
                    }
                    Err(err) => {
                        warn!(root = %candidate.root, error = %err, "instance plan failed, disconnecting");
                        *state = RootState::Disconnected(DisconnectReason::PlanFailed(err.to_string()));
                        demoted = true;
                    }
                }
            }
            if !demoted {
                break (target_plans, plans);
            }
        };

        let is_prefab = table.document()?.is_prefab();
        let marker = self.options.prefab_link_marker.as_deref();
        let boundaries: BTreeSet<NodeRef> = candidates.iter().map(|c| c.root).collect();
        let mut rw = Rewriter::new(table);
        let mut roots = Vec::new();
        for (i, (candidate, state)) in candidates.iter().zip(&states).enumerate() {
            let asset = candidate.asset.as_ref().map(|a| a.uuid.clone());
            let report = match state {
                RootState::Untouched => continue,
                RootState::Disconnected(reason) => {
                    warn!(root = %candidate.root, asset = ?asset, %reason, "disconnecting prefab instance");
                    restore_to_normal(&mut rw, candidate.root, marker, &boundaries)?;
                    RootReport::new(candidate.root, asset, RootStatus::Disconnected(reason.clone()))
                }
                RootState::Mirror => {
                    if let Some(link) = rw.table().resolve(candidate.root)?.prefab {
                        rw.edit(link, |info| info.instance = None)?;
                    }
                    RootReport::new(candidate.root, asset, RootStatus::Mirror)
                }
                RootState::Connected { .. } => {
                    let plan = plans.remove(&i).unwrap_or_default();
                    self.apply_instance(&mut rw, candidate.root, doc_root, &plan)?;
                    debug!(
                        root = %candidate.root,
                        asset = ?asset,
                        overrides = plan.property_overrides.len(),
                        "reconciled prefab instance"
                    );
                    RootReport {
                        property_overrides: plan.property_overrides.len(),
                        mounted_children: plan.mounted_children.len(),
                        mounted_components: plan.mounted_components.len(),
                        removed_components: plan.removed_components.len(),
                        ..RootReport::new(candidate.root, asset, RootStatus::Connected)
                    }
                }
            };
            roots.push(report);
        }

        let nested: Vec<NodeRef> = candidates
            .iter()
            .zip(&states)
            .filter(|(_, s)| s.is_linked())
            .map(|(c, _)| c.root)
            .collect();
        self.apply_document_root(&mut rw, doc_root, is_prefab, &nested, &target_plans)?;
        rw.finish()?;

        let appended = table.len() - before;
        let remap = if self.options.compact {
            Some(rewrite::compact(table)?)
        } else {
            None
        };
        if self.options.verify {
            rewrite::verify(table).map_err(ReconcileError::Verify)?;
        }
        info!(
            roots = roots.len(),
            disconnected = roots.iter().filter(|r| r.is_disconnected()).count(),
            target_overrides = target_plans.len(),
            restored,
            appended,
            "reconciled document"
        );
        Ok(DocumentReport {
            roots,
            target_overrides: target_plans.len(),
            appended,
            remap,
        })
    }

    fn classify(&self, table: &ObjectTable, candidate: &Candidate) -> RootState {
        let Some(asset) = &candidate.asset else {
            return RootState::Disconnected(DisconnectReason::MissingAsset);
        };
        if self.options.force_disconnect.contains(&asset.uuid) {
            return RootState::Disconnected(DisconnectReason::DependencyCycle(asset.uuid.clone()));
        }
        let Some(base) = self.resolver.resolve_base_prefab(&asset.uuid) else {
            warn!(root = %candidate.root, asset = %asset.uuid, "base prefab unavailable");
            return RootState::Disconnected(DisconnectReason::UnresolvedBase(asset.uuid.clone()));
        };
        if candidate.sync {
            return RootState::Mirror;
        }
        let Ok(base_root) = base.root_node() else {
            return RootState::Disconnected(DisconnectReason::MissingBaseRoot(asset.uuid.clone()));
        };
        match match_structure(table, candidate.root, &base, base_root, &self.rules) {
            Ok(pairing) => RootState::Connected {
                base,
                base_root,
                pairing,
            },
            Err(reason) => RootState::Disconnected(reason),
        }
    }

    fn apply_instance(
        &self,
        rw: &mut Rewriter<'_>,
        root: NodeRef,
        doc_root: NodeRef,
        plan: &InstancePlan,
    ) -> ReconcileResult<()> {
        let link = rw
            .table()
            .resolve(root)?
            .prefab
            .ok_or(ReconcileError::NotAnInstanceRoot(root.erase()))?;
        let instance = match rw.table().resolve(link)?.instance {
            Some(instance) => instance,
            None if plan.is_empty() => return Ok(()),
            None => {
                let instance = rw.append::<InstanceKind>(PrefabInstance {
                    file_id: self.ids.next_file_id(),
                    prefab_root_node: Some(doc_root),
                    ..PrefabInstance::default()
                });
                rw.link_one(link, instance, |info| &mut info.instance)?;
                instance
            }
        };
        upsert_property_overrides(rw, instance, &plan.property_overrides)?;
        upsert_mounted_children(rw, instance, &plan.mounted_children)?;
        upsert_mounted_components(rw, instance, &plan.mounted_components)?;
        upsert_removed_components(rw, instance, &plan.removed_components)?;
        Ok(())
    }

    fn apply_document_root(
        &self,
        rw: &mut Rewriter<'_>,
        doc_root: NodeRef,
        is_prefab: bool,
        nested: &[NodeRef],
        target_plans: &[TargetOverridePlan],
    ) -> ReconcileResult<()> {
        let link = match rw.table().resolve(doc_root)?.prefab {
            Some(link) => link,
            None if nested.is_empty() && target_plans.is_empty() => return Ok(()),
            None => {
                let mut info = PrefabInfo::new(
                    doc_root,
                    AssetLink::Own(SlotRef::DOCUMENT),
                    self.ids.next_file_id(),
                );
                if !is_prefab {
                    info.asset = None;
                }
                let link = rw.append::<PrefabInfoKind>(info);
                rw.link_one(doc_root, link, |n| &mut n.prefab)?;
                link
            }
        };

        if rw.table().resolve(link)?.nested_instance_roots != nested {
            rw.edit(link, |info| info.nested_instance_roots = nested.to_vec())?;
        }

        let current = rw.table().resolve(link)?.target_overrides.clone();
        let mut existing: HashMap<(SlotRef, Option<LocalIdPath>, Vec<String>), Slot<TargetOverrideKind>> =
            HashMap::new();
        for to_ref in &current {
            let Ok(to) = rw.table().resolve(*to_ref) else {
                continue;
            };
            let Some(source) = to.source else {
                continue;
            };
            let source_info = match to.source_info {
                Some(info) => Some(rw.table().resolve(info)?.local_id.clone()),
                None => None,
            };
            existing
                .entry((source, source_info, to.property_path.clone()))
                .or_insert(*to_ref);
        }

        let mut kept = BTreeSet::new();
        let mut fresh = Vec::new();
        for plan in target_plans {
            let key = (plan.source, plan.source_info.clone(), plan.property_path.clone());
            match existing.remove(&key) {
                Some(to_ref) => {
                    let info = rw.table().resolve(to_ref)?.target_info;
                    let target_info =
                        reuse_target_info(rw, info, &plan.target_info)?;
                    let target = plan.target;
                    let unchanged = {
                        let to = rw.table().resolve(to_ref)?;
                        to.target == Some(target) && to.target_info == Some(target_info)
                    };
                    if !unchanged {
                        rw.edit(to_ref, |to| {
                            to.target = Some(target);
                            to.target_info = Some(target_info);
                        })?;
                    }
                    kept.insert(to_ref);
                }
                None => {
                    let source_info = plan
                        .source_info
                        .clone()
                        .map(|path| rw.append::<TargetInfoKind>(TargetInfo::new(path)));
                    let target_info = rw.append::<TargetInfoKind>(TargetInfo::new(plan.target_info.clone()));
                    fresh.push(rw.append::<TargetOverrideKind>(TargetOverrideInfo {
                        source: Some(plan.source),
                        source_info,
                        property_path: plan.property_path.clone(),
                        target: Some(plan.target),
                        target_info: Some(target_info),
                        extra: Fields::new(),
                    }));
                }
            }
        }
        for (key, to_ref) in &existing {
            warn!(slot = %to_ref, source = %key.0, property = ?key.2, "dropping stale target override");
        }

        let list = ordered(&current, &kept, fresh);
        if list != current {
            rw.edit(link, |info| info.target_overrides = list)?;
        }

        for plan in target_plans {
            let path = plan.property_path.clone();
            rw.edit(plan.component, |c| set_field(&mut c.fields, &path, Value::Null))?;
        }
        Ok(())
    }
}

/// Kept entries in their original order, then the new ones
fn ordered<K>(current: &[Slot<K>], kept: &BTreeSet<Slot<K>>, fresh: Vec<Slot<K>>) -> Vec<Slot<K>> {
    let mut list: Vec<Slot<K>> = Vec::with_capacity(kept.len() + fresh.len());
    for slot in current {
        if kept.contains(slot) && !list.contains(slot) {
            list.push(*slot);
        }
    }
    list.extend(fresh);
    list
}

/// Keep `existing` if it already holds `path`, otherwise point it at `path`
fn reuse_target_info(
    rw: &mut Rewriter<'_>,
    existing: Option<TargetInfoRef>,
    path: &LocalIdPath,
) -> ReconcileResult<TargetInfoRef> {
    match existing {
        Some(info) => {
            if &rw.table().resolve(info)?.local_id != path {
                let path = path.clone();
                rw.edit(info, |t| t.local_id = path)?;
            }
            Ok(info)
        }
        None => Ok(rw.append::<TargetInfoKind>(TargetInfo::new(path.clone()))),
    }
}

fn target_path(rw: &Rewriter<'_>, info: Option<TargetInfoRef>) -> Option<LocalIdPath> {
    rw.table()
        .resolve(info?)
        .ok()
        .map(|t| t.local_id.clone())
}

fn upsert_property_overrides(
    rw: &mut Rewriter<'_>,
    instance: InstanceRef,
    desired: &[OverridePlan],
) -> ReconcileResult<()> {
    let current = rw.table().resolve(instance)?.property_overrides.clone();
    let mut existing = HashMap::new();
    for po_ref in &current {
        let Ok(po) = rw.table().resolve(*po_ref) else {
            continue;
        };
        if let Some(path) = target_path(rw, po.target_info) {
            existing
                .entry((path, po.property_path.clone()))
                .or_insert(*po_ref);
        }
    }

    let mut kept = BTreeSet::new();
    let mut fresh = Vec::new();
    for o in desired {
        match existing.remove(&(o.target.clone(), o.property_path.clone())) {
            Some(po_ref) => {
                if rw.table().resolve(po_ref)?.value != o.value {
                    let value = o.value.clone();
                    rw.edit(po_ref, |po| po.value = value)?;
                }
                kept.insert(po_ref);
            }
            None => {
                let info = rw.append::<TargetInfoKind>(TargetInfo::new(o.target.clone()));
                fresh.push(rw.append::<PropertyOverrideKind>(PropertyOverrideInfo {
                    target_info: Some(info),
                    property_path: o.property_path.clone(),
                    value: o.value.clone(),
                    extra: Fields::new(),
                }));
            }
        }
    }
    if !existing.is_empty() {
        debug!(%instance, dropped = existing.len(), "dropping overrides that no longer differ");
    }
    let list = ordered(&current, &kept, fresh);
    if list != current {
        rw.edit(instance, |i| i.property_overrides = list)?;
    }
    Ok(())
}

/// Existing entries in `current` first (filtered to `desired`), then new ones, no repeats
fn merge_slots<K>(current: &[Slot<K>], desired: &[Slot<K>]) -> Vec<Slot<K>> {
    let mut out: Vec<Slot<K>> = Vec::with_capacity(desired.len());
    for slot in current.iter().chain(desired) {
        if desired.contains(slot) && !out.contains(slot) {
            out.push(*slot);
        }
    }
    out
}

fn upsert_mounted_children(
    rw: &mut Rewriter<'_>,
    instance: InstanceRef,
    desired: &[(LocalIdPath, Vec<NodeRef>)],
) -> ReconcileResult<()> {
    let current = rw.table().resolve(instance)?.mounted_children.clone();
    let mut existing = HashMap::new();
    for m_ref in &current {
        let Ok(m) = rw.table().resolve(*m_ref) else {
            continue;
        };
        if let Some(path) = target_path(rw, m.target_info) {
            existing.entry(path).or_insert(*m_ref);
        }
    }

    let mut kept = BTreeSet::new();
    let mut fresh = Vec::new();
    for (path, nodes) in desired {
        match existing.remove(path) {
            Some(m_ref) => {
                let merged = merge_slots(&rw.table().resolve(m_ref)?.nodes, nodes);
                if rw.table().resolve(m_ref)?.nodes != merged {
                    rw.edit(m_ref, |m| m.nodes = merged)?;
                }
                kept.insert(m_ref);
            }
            None => {
                let info = rw.append::<TargetInfoKind>(TargetInfo::new(path.clone()));
                fresh.push(rw.append::<MountedChildrenKind>(MountedChildrenInfo {
                    target_info: Some(info),
                    nodes: merge_slots(&[], nodes),
                    extra: Fields::new(),
                }));
            }
        }
    }
    let list = ordered(&current, &kept, fresh);
    if list != current {
        rw.edit(instance, |i| i.mounted_children = list)?;
    }
    Ok(())
}

fn upsert_mounted_components(
    rw: &mut Rewriter<'_>,
    instance: InstanceRef,
    desired: &[(LocalIdPath, Vec<ComponentRef>)],
) -> ReconcileResult<()> {
    let current = rw.table().resolve(instance)?.mounted_components.clone();
    let mut existing = HashMap::new();
    for m_ref in &current {
        let Ok(m) = rw.table().resolve(*m_ref) else {
            continue;
        };
        if let Some(path) = target_path(rw, m.target_info) {
            existing.entry(path).or_insert(*m_ref);
        }
    }

    let mut kept = BTreeSet::new();
    let mut fresh = Vec::new();
    for (path, components) in desired {
        match existing.remove(path) {
            Some(m_ref) => {
                let merged = merge_slots(&rw.table().resolve(m_ref)?.components, components);
                if rw.table().resolve(m_ref)?.components != merged {
                    rw.edit(m_ref, |m| m.components = merged)?;
                }
                kept.insert(m_ref);
            }
            None => {
                let info = rw.append::<TargetInfoKind>(TargetInfo::new(path.clone()));
                fresh.push(rw.append::<MountedComponentsKind>(MountedComponentsInfo {
                    target_info: Some(info),
                    components: merge_slots(&[], components),
                    extra: Fields::new(),
                }));
            }
        }
    }
    let list = ordered(&current, &kept, fresh);
    if list != current {
        rw.edit(instance, |i| i.mounted_components = list)?;
    }
    Ok(())
}

fn upsert_removed_components(
    rw: &mut Rewriter<'_>,
    instance: InstanceRef,
    desired: &[LocalIdPath],
) -> ReconcileResult<()> {
    let current = rw.table().resolve(instance)?.removed_components.clone();
    let mut existing = HashMap::new();
    for info in &current {
        if let Some(path) = target_path(rw, Some(*info)) {
            existing.entry(path).or_insert(*info);
        }
    }
    let mut kept = BTreeSet::new();
    let mut fresh = Vec::new();
    for path in desired {
        match existing.remove(path) {
            Some(info) => {
                kept.insert(info);
            }
            None => fresh.push(rw.append::<TargetInfoKind>(TargetInfo::new(path.clone()))),
        }
    }
    let list = ordered(&current, &kept, fresh);
    if list != current {
        rw.edit(instance, |i| i.removed_components = list)?;
    }
    Ok(())
}

/// Compute the overrides one compatible instance needs
fn plan_instance(
    table: &ObjectTable,
    base: &ObjectTable,
    base_root: NodeRef,
    pairing: &Pairing,
    covered: &HashMap<ComponentRef, Vec<(String, Option<usize>)>>,
) -> ReconcileResult<InstancePlan> {
    let base_index = PathIndex::build(base, base_root);
    let mut live_index = PathIndex::default();
    let mut node_paths = Vec::with_capacity(pairing.nodes.len());
    for (live, b) in &pairing.nodes {
        let path = node_path(base, base_root, *b)?;
        live_index.insert(live.erase(), path.clone());
        node_paths.push(path);
    }
    let mut comp_paths = Vec::with_capacity(pairing.components.len());
    for (live, b) in &pairing.components {
        let path = component_path(base, base_root, *b)?;
        live_index.insert(live.erase(), path.clone());
        comp_paths.push(path);
    }

    let mut plan = InstancePlan::default();
    for ((live, b), path) in pairing.nodes.iter().zip(&node_paths) {
        for (key, value) in compare_base_props(table.resolve(*live)?, base.resolve(*b)?, &live_index, &base_index) {
            plan.property_overrides.push(OverridePlan {
                target: path.clone(),
                property_path: vec![key],
                value,
            });
        }
    }
    for ((live, b), path) in pairing.components.iter().zip(&comp_paths) {
        let skip = covered.get(live).map_or(&[][..], Vec::as_slice);
        for (property_path, value) in compare_component_props(
            table.resolve(*live)?,
            base.resolve(*b)?,
            skip,
            &live_index,
            &base_index,
        ) {
            plan.property_overrides.push(OverridePlan {
                target: path.clone(),
                property_path,
                value,
            });
        }
    }
    for (attach, nodes) in &pairing.mounted_children {
        plan.mounted_children
            .push((node_path(base, base_root, *attach)?, nodes.clone()));
    }
    for (owner, components) in &pairing.mounted_components {
        plan.mounted_components
            .push((node_path(base, base_root, *owner)?, components.clone()));
    }
    for removed in &pairing.removed_components {
        plan.removed_components
            .push(component_path(base, base_root, *removed)?);
    }
    Ok(plan)
}
