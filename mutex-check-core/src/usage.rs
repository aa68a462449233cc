#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use mutex_check_ir::{NodeId, ProgramModel};

use crate::guard::{GuardMap, Location};
use crate::variant::Variant;

/// Protected location -> call-graph nodes whose body references it.
pub type UsageMap = BTreeMap<Location, BTreeSet<NodeId>>;

/// Visit every node once and record which protected locations it touches.
/// Initializers and bodiless nodes are skipped. Nodes that also lock the
/// guard are recorded too; the local checker filters them.
pub fn collect_usages<V: Variant + ?Sized>(variant: &V, model: &ProgramModel, guards: &GuardMap) -> UsageMap {
    let mut usages = UsageMap::new();
    if guards.is_empty() {
        return usages;
    }
    for node in model.nodes() {
        let func = model.function(node);
        if func.init || func.body.is_empty() {
            continue;
        }
        for instr in &func.body {
            for location in guards.locations() {
                if variant.is_usage(instr, location) {
                    usages.entry(location).or_default().insert(node);
                }
            }
        }
    }
    tracing::debug!(
        variant = %variant.kind(),
        locations = usages.len(),
        "usage sites collected"
    );
    usages
}
