#![forbid(unsafe_code)]

use std::fmt;

use mutex_check_ir::{CallSite, InstrKind, Instruction, NodeId, Position, ProgramModel, value_roots};
use serde::Deserialize;

use crate::annotation::{Resolution, ResolveContext};
use crate::guard::Location;

/// Which kind of protected location a [`Variant`] handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    #[serde(alias = "global_variable")]
    Globals,
    #[serde(alias = "struct_field")]
    Fields,
}

impl VariantKind {
    pub const ALL: [VariantKind; 2] = [VariantKind::Globals, VariantKind::Fields];

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantKind::Globals => "globals",
            VariantKind::Fields => "fields",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardOpKind {
    /// `Lock` / `RLock`
    Acquire,
    /// `Unlock` / `RUnlock`
    Release,
    /// `defer Unlock()` / `defer RUnlock()`
    DeferredRelease,
    /// Any other reference to the guard.
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuardOp {
    pub pos: Position,
    pub kind: GuardOpKind,
}

pub(crate) fn classify_call(call: &CallSite) -> GuardOpKind {
    match call.external_name() {
        Some("Lock" | "RLock") => GuardOpKind::Acquire,
        Some("Unlock" | "RUnlock") => GuardOpKind::Release,
        _ => GuardOpKind::Other,
    }
}

pub(crate) fn classify_defer(call: &CallSite) -> GuardOpKind {
    match call.external_name() {
        Some("Unlock" | "RUnlock") => GuardOpKind::DeferredRelease,
        _ => GuardOpKind::Other,
    }
}

/// Capabilities the pipeline needs from a location kind. The pipeline
/// itself holds no variant-specific logic.
pub trait Variant: Sync {
    fn kind(&self) -> VariantKind;

    /// Scan declarations for guards and bind their annotated locations.
    fn resolve_guards(&self, ctx: &ResolveContext<'_>, out: &mut Resolution);

    /// `instr` reads, writes or takes the address of `location`.
    fn is_usage(&self, instr: &Instruction, location: Location) -> bool;

    /// How `instr` touches `guard`, if at all.
    fn guard_op(&self, instr: &Instruction, guard: Location) -> Option<GuardOpKind>;

    /// Guard operations of `body` in program order. Instructions without a
    /// position are skipped.
    fn guard_ops(&self, body: &[Instruction], guard: Location) -> Vec<GuardOp> {
        body.iter()
            .filter(|i| i.pos.is_valid())
            .filter_map(|i| self.guard_op(i, guard).map(|kind| GuardOp { pos: i.pos, kind }))
            .collect()
    }

    /// Whether an ancestor's body mentions the guard at all.
    fn references_guard(&self, body: &[Instruction], guard: Location) -> bool {
        body.iter().any(|i| self.guard_op(i, guard).is_some())
    }

    /// Whether the calls from `ancestor` into `callee` happen with `guard`
    /// held. Variants that accept mere co-occurrence keep the default.
    fn call_site_locked(&self, _model: &ProgramModel, _ancestor: NodeId, _callee: NodeId, _guard: Location) -> bool {
        true
    }

    /// `instr` hands the location or its guard back to the caller, directly
    /// or through a value loaded from it inside `body`.
    fn is_return_escape(&self, body: &[Instruction], instr: &Instruction, location: Location, guard: Location) -> bool {
        let InstrKind::Return { results } = &instr.kind else {
            return false;
        };
        let (loc, grd) = (location.as_operand(), guard.as_operand());
        results
            .iter()
            .flat_map(|op| value_roots(body, *op))
            .any(|root| root == loc || root == grd)
    }
}
