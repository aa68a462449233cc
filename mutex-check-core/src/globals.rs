#![forbid(unsafe_code)]

use mutex_check_ir::{Decl, GlobalId, InstrKind, Instruction, PackageId, ProgramModel, TypeExpr};

use crate::annotation::{Resolution, ResolveContext, bind_annotation};
use crate::guard::{Guard, Location};
use crate::variant::{GuardOpKind, Variant, VariantKind, classify_call, classify_defer};

/// Package-level variables guarded by a package-level lock:
///
/// ```go
/// var mu sync.Mutex // count, total
/// var count int
/// ```
///
/// Any ancestor that touches the lock is trusted to hold it across the call.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalVariables;

impl Variant for GlobalVariables {
    fn kind(&self) -> VariantKind {
        VariantKind::Globals
    }

    fn resolve_guards(&self, ctx: &ResolveContext<'_>, out: &mut Resolution) {
        for (_, file) in ctx.model.files() {
            if !ctx.model.is_analyzed(file.package) {
                continue;
            }
            for decl in &file.decls {
                let Decl::Var(var) = decl else {
                    continue;
                };
                let Some(kind) = var.ty.as_ref().and_then(TypeExpr::guard_kind) else {
                    continue;
                };
                let guard = Guard {
                    location: Location::Global(var.global),
                    kind,
                    pos: var.pos,
                };
                bind_annotation(
                    ctx,
                    &guard,
                    |name| package_var(ctx.model, file.package, name).map(Location::Global),
                    out,
                );
            }
        }
    }

    fn is_usage(&self, instr: &Instruction, location: Location) -> bool {
        match location {
            Location::Global(g) => instr.references_global(g),
            Location::Field(_) => false,
        }
    }

    fn guard_op(&self, instr: &Instruction, guard: Location) -> Option<GuardOpKind> {
        let Location::Global(g) = guard else {
            return None;
        };
        if !instr.references_global(g) {
            return None;
        }
        Some(match &instr.kind {
            InstrKind::Call(call) => classify_call(call),
            InstrKind::Defer(call) => classify_defer(call),
            _ => GuardOpKind::Other,
        })
    }
}

/// Package-level variable `name` declared anywhere in `package`.
fn package_var(model: &ProgramModel, package: PackageId, name: &str) -> Option<GlobalId> {
    model
        .files()
        .filter(|(_, f)| f.package == package)
        .flat_map(|(_, f)| f.decls.iter())
        .find_map(|d| match d {
            Decl::Var(v) if v.name == name => Some(v.global),
            _ => None,
        })
}
