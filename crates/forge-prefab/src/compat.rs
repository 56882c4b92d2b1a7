//! Structural compatibility
//!
//! Before anything is diffed, a live instance is matched against its base
//! prefab: node tags, child counts and component types must line up. The
//! result is a [`Pairing`] of live and base elements, or the reason the
//! instance has to be disconnected.

use crate::locate::prefab_info;
use forge_table::{AssetId, Component, ComponentRef, Node, NodeRef, ObjectTable, SlotRef, Value};
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

/// Why an instance was disconnected from its prefab
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The instance root names no prefab asset
    MissingAsset,
    /// The base prefab could not be resolved
    UnresolvedBase(AssetId),
    /// The base prefab document has no root node
    MissingBaseRoot(AssetId),
    /// A paired node has a different type
    TagMismatch {
        /// Live node
        node: SlotRef,
        /// Base node type
        expected: String,
        /// Live node type
        found: String,
    },
    /// A live node has fewer children than its base
    MissingChildren {
        /// Live node
        node: SlotRef,
        /// Base child count
        expected: usize,
        /// Live child count
        found: usize,
    },
    /// A nested instance points at a different prefab than the base
    AssetMismatch {
        /// Live node
        node: SlotRef,
        /// Prefab the base nests here
        expected: AssetId,
        /// Prefab the live node links to
        found: Option<AssetId>,
    },
    /// Components paired by file id have different types
    ComponentMismatch {
        /// Live component
        component: SlotRef,
        /// Base component type
        expected: String,
        /// Live component type
        found: String,
    },
    /// A compatibility rule refused the instance
    Rule {
        /// Rule name
        rule: String,
        /// Offending live component
        component: SlotRef,
        /// Rule-specific detail
        detail: String,
    },
    /// The prefab is part of a dependency cycle
    DependencyCycle(AssetId),
    /// Planning the instance failed
    PlanFailed(String),
    /// The live subtree is malformed
    Malformed(String),
}

impl Display for DisconnectReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAsset => f.write_str("instance root names no prefab"),
            Self::UnresolvedBase(id) => write!(f, "base prefab {id} is unavailable"),
            Self::MissingBaseRoot(id) => write!(f, "base prefab {id} has no root node"),
            Self::TagMismatch {
                node,
                expected,
                found,
            } => write!(f, "{node} is {found}, base has {expected}"),
            Self::MissingChildren {
                node,
                expected,
                found,
            } => write!(f, "{node} has {found} children, base has {expected}"),
            Self::AssetMismatch {
                node,
                expected,
                found,
            } => match found {
                Some(found) => write!(f, "{node} instantiates {found}, base nests {expected}"),
                None => write!(f, "{node} lost its link to nested prefab {expected}"),
            },
            Self::ComponentMismatch {
                component,
                expected,
                found,
            } => write!(f, "{component} is {found}, base has {expected}"),
            Self::Rule {
                rule,
                component,
                detail,
            } => write!(f, "rule {rule} refused {component}: {detail}"),
            Self::DependencyCycle(id) => write!(f, "prefab {id} is part of a dependency cycle"),
            Self::PlanFailed(msg) => write!(f, "planning failed: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed instance: {msg}"),
        }
    }
}

/// A check that can force disconnection of an otherwise matching instance
pub trait CompatibilityRule: Send + Sync + Debug {
    /// Name used in logs and reports
    fn name(&self) -> &str;

    /// Inspect a paired component; `Some(detail)` refuses the instance
    fn check(&self, live: &Component, base: &Component) -> Option<String>;
}

/// Skinned animations with socket bindings cannot be kept as instances
#[derive(Debug, Clone, Copy, Default)]
pub struct SkinnedSocketsRule;

impl SkinnedSocketsRule {
    /// Component type the rule applies to
    pub const COMPONENT: &'static str = "cc.SkeletalAnimation";

    fn sockets(component: &Component) -> usize {
        match component.fields.get("_sockets") {
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        }
    }
}

impl CompatibilityRule for SkinnedSocketsRule {
    fn name(&self) -> &str {
        "skinned-sockets"
    }

    fn check(&self, live: &Component, base: &Component) -> Option<String> {
        if live.tag != Self::COMPONENT {
            return None;
        }
        let sockets = Self::sockets(live).max(Self::sockets(base));
        (sockets > 0).then(|| format!("{sockets} socket binding(s)"))
    }
}

/// The rule set used unless configured otherwise
#[must_use]
pub fn default_rules() -> Vec<Arc<dyn CompatibilityRule>> {
    vec![Arc::new(SkinnedSocketsRule)]
}

/// Live/base correspondence of one compatible instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pairing {
    /// `(live, base)` node pairs, root first, pre-order
    pub nodes: Vec<(NodeRef, NodeRef)>,
    /// `(live, base)` component pairs
    pub components: Vec<(ComponentRef, ComponentRef)>,
    /// Live children past the base child count, by base attachment node
    pub mounted_children: Vec<(NodeRef, Vec<NodeRef>)>,
    /// Live components without a base counterpart, by base owner node
    pub mounted_components: Vec<(NodeRef, Vec<ComponentRef>)>,
    /// Base components missing from the live instance
    pub removed_components: Vec<ComponentRef>,
}

/// Prefab nested at `node`, if `node` is a nested occurrence root
fn nested_asset(table: &ObjectTable, node: NodeRef) -> Option<AssetId> {
    let info = prefab_info(table, node)?;
    if info.root != Some(node) {
        return None;
    }
    info.asset
        .as_ref()
        .and_then(|a| a.external())
        .map(|a| a.uuid.clone())
}

fn malformed(err: impl Display) -> DisconnectReason {
    DisconnectReason::Malformed(err.to_string())
}

/// Match the live instance at `root` against the base prefab rooted at `base_root`
///
/// # Errors
/// Returns the first incompatibility found
pub fn match_structure(
    live: &ObjectTable,
    root: NodeRef,
    base: &ObjectTable,
    base_root: NodeRef,
    rules: &[Arc<dyn CompatibilityRule>],
) -> Result<Pairing, DisconnectReason> {
    let mut pairing = Pairing::default();
    let mut stack = vec![(root, base_root)];
    while let Some((l, b)) = stack.pop() {
        let ln = live.resolve(l).map_err(malformed)?;
        let bn = base.resolve(b).map_err(malformed)?;
        if ln.tag != bn.tag {
            return Err(DisconnectReason::TagMismatch {
                node: l.erase(),
                expected: bn.tag.clone(),
                found: ln.tag.clone(),
            });
        }
        if b != base_root {
            if let Some(expected) = nested_asset(base, b) {
                let found = nested_asset(live, l);
                if found.as_ref() != Some(&expected) {
                    return Err(DisconnectReason::AssetMismatch {
                        node: l.erase(),
                        expected,
                        found,
                    });
                }
            }
        }
        if ln.children.len() < bn.children.len() {
            return Err(DisconnectReason::MissingChildren {
                node: l.erase(),
                expected: bn.children.len(),
                found: ln.children.len(),
            });
        }

        pairing.nodes.push((l, b));
        pair_components(live, ln, base, bn, b, rules, &mut pairing)?;

        let mounted = &ln.children[bn.children.len()..];
        if !mounted.is_empty() {
            pairing.mounted_children.push((b, mounted.to_vec()));
        }
        for (lc, bc) in ln.children.iter().zip(&bn.children).rev() {
            stack.push((*lc, *bc));
        }
    }
    Ok(pairing)
}

fn comp_file_id(table: &ObjectTable, comp: ComponentRef) -> Option<&str> {
    let link = table.resolve(comp).ok()?.prefab?;
    let id = table.resolve(link).ok()?.file_id.as_str();
    (!id.is_empty()).then_some(id)
}

fn comp_tag(table: &ObjectTable, comp: ComponentRef) -> Result<&str, DisconnectReason> {
    table
        .resolve(comp)
        .map(|c| c.tag.as_str())
        .map_err(malformed)
}

/// Pair components by file id, then by index for same-typed leftovers
fn pair_components(
    live: &ObjectTable,
    ln: &Node,
    base: &ObjectTable,
    bn: &Node,
    base_owner: NodeRef,
    rules: &[Arc<dyn CompatibilityRule>],
    pairing: &mut Pairing,
) -> Result<(), DisconnectReason> {
    let base_ids: Vec<Option<&str>> = bn
        .components
        .iter()
        .map(|c| comp_file_id(base, *c))
        .collect();
    let mut taken = vec![false; bn.components.len()];
    let mut partner: Vec<Option<usize>> = vec![None; ln.components.len()];

    for (li, lc) in ln.components.iter().enumerate() {
        let Some(id) = comp_file_id(live, *lc) else {
            continue;
        };
        if let Some(bi) = (0..base_ids.len()).find(|bi| !taken[*bi] && base_ids[*bi] == Some(id)) {
            taken[bi] = true;
            partner[li] = Some(bi);
        }
    }
    for (li, lc) in ln.components.iter().enumerate() {
        if partner[li].is_some() || li >= bn.components.len() || taken[li] {
            continue;
        }
        if comp_tag(live, *lc)? == comp_tag(base, bn.components[li])? {
            taken[li] = true;
            partner[li] = Some(li);
        }
    }

    let mut mounted = Vec::new();
    for (li, lc) in ln.components.iter().enumerate() {
        let Some(bi) = partner[li] else {
            mounted.push(*lc);
            continue;
        };
        let bc = bn.components[bi];
        let live_comp = live.resolve(*lc).map_err(malformed)?;
        let base_comp = base.resolve(bc).map_err(malformed)?;
        if live_comp.tag != base_comp.tag {
            return Err(DisconnectReason::ComponentMismatch {
                component: lc.erase(),
                expected: base_comp.tag.clone(),
                found: live_comp.tag.clone(),
            });
        }
        for rule in rules {
            if let Some(detail) = rule.check(live_comp, base_comp) {
                return Err(DisconnectReason::Rule {
                    rule: rule.name().to_string(),
                    component: lc.erase(),
                    detail,
                });
            }
        }
        pairing.components.push((*lc, bc));
    }
    if !mounted.is_empty() {
        pairing.mounted_components.push((base_owner, mounted));
    }
    pairing.removed_components.extend(
        bn.components
            .iter()
            .zip(&taken)
            .filter(|(_, t)| !**t)
            .map(|(c, _)| *c),
    );
    Ok(())
}
