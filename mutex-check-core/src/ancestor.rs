#![forbid(unsafe_code)]

//! Backward walk over caller edges proving that a guard is held on every
//! call chain reaching a function with unprotected usages.

use std::collections::HashSet;

use mutex_check_ir::{NodeId, ProgramModel};

use crate::guard::Location;
use crate::variant::Variant;

/// Nodes from the function with the usage back toward a root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallPath {
    pub nodes: Vec<NodeId>,
    /// The walk came back to a node already on the path.
    pub looped: bool,
}

impl CallPath {
    /// `F --> Caller --> main`, with ` [LOOP]` appended for cycles.
    pub fn render(&self, model: &ProgramModel) -> String {
        let mut out = self
            .nodes
            .iter()
            .map(|n| model.function(*n).name.as_str())
            .collect::<Vec<_>>()
            .join(" --> ");
        if self.looped {
            out.push_str(" [LOOP]");
        }
        out
    }
}

struct Frame {
    node: NodeId,
    path: Vec<NodeId>,
}

/// Walk callers of `start` depth-first and return the first chain on which
/// `guard` is not provably held, or `None` when every chain is protected.
///
/// A chain fails when it leaves the location's package, reaches a
/// goroutine entry point, reaches a node without callers, or cycles.
pub fn find_unprotected_path<V: Variant + ?Sized>(
    variant: &V,
    model: &ProgramModel,
    location: Location,
    guard: Location,
    start: NodeId,
) -> Option<CallPath> {
    let home = location.package(model);
    let graph = model.graph();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack = vec![Frame {
        node: start,
        path: Vec::new(),
    }];

    while let Some(Frame { node, mut path }) = stack.pop() {
        let looped = path.contains(&node);
        if !visited.insert(node) && !looped {
            continue;
        }
        path.push(node);

        if path.len() > 1 && variant.references_guard(&model.function(node).body, guard) {
            let callee = path[path.len() - 2];
            if variant.call_site_locked(model, node, callee, guard) {
                continue;
            }
        }

        let func = model.function(node);
        let escaped = func.package != home;
        let spawned = graph.is_spawn_origin(node);
        let callers = graph.callers(node);
        if escaped || spawned || callers.is_empty() || looped {
            tracing::trace!(
                node = %func.name,
                escaped,
                spawned,
                looped,
                "unprotected chain"
            );
            return Some(CallPath { nodes: path, looped });
        }

        for caller in callers.iter().rev() {
            stack.push(Frame {
                node: *caller,
                path: path.clone(),
            });
        }
    }
    None
}
