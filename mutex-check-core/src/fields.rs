#![forbid(unsafe_code)]

use mutex_check_ir::{CallSite, Decl, FieldRef, InstrKind, Instruction, NodeId, Operand, ProgramModel, StructDecl};

use crate::annotation::{Resolution, ResolveContext, bind_annotation};
use crate::guard::{Guard, Location};
use crate::interval::LockIntervals;
use crate::variant::{GuardOpKind, Variant, VariantKind, classify_call, classify_defer};

/// Struct fields guarded by a sibling lock field:
///
/// ```go
/// type Cache struct {
///     mu    sync.RWMutex // items
///     items map[string]int
/// }
/// ```
///
/// An ancestor only protects the chain if its call into the next function
/// happens inside its own lock interval.
#[derive(Clone, Copy, Debug, Default)]
pub struct StructFields;

impl Variant for StructFields {
    fn kind(&self) -> VariantKind {
        VariantKind::Fields
    }

    fn resolve_guards(&self, ctx: &ResolveContext<'_>, out: &mut Resolution) {
        for (_, file) in ctx.model.files() {
            if !ctx.model.is_analyzed(file.package) {
                continue;
            }
            for decl in &file.decls {
                let Decl::Struct(st) = decl else {
                    continue;
                };
                for fd in &st.fields {
                    let Some(kind) = fd.ty.guard_kind() else {
                        continue;
                    };
                    // `mu1, mu2 sync.Mutex // x` shares one comment: it is read
                    // once and bound to the first name.
                    let guard = Guard {
                        location: Location::Field(FieldRef {
                            owner: st.id,
                            index: fd.first_index,
                        }),
                        kind,
                        pos: fd.pos,
                    };
                    bind_annotation(ctx, &guard, |name| sibling_field(st, name).map(Location::Field), out);
                }
            }
        }
    }

    fn is_usage(&self, instr: &Instruction, location: Location) -> bool {
        match (location, &instr.kind) {
            (Location::Field(target), InstrKind::FieldAddr { field, .. }) => *field == target,
            _ => false,
        }
    }

    fn guard_op(&self, instr: &Instruction, guard: Location) -> Option<GuardOpKind> {
        let Location::Field(target) = guard else {
            return None;
        };
        let on_guard = |call: &CallSite| call.receiver() == Some(&Operand::FieldAddr(target));
        match &instr.kind {
            InstrKind::Call(call) if on_guard(call) => Some(classify_call(call)),
            InstrKind::Defer(call) if on_guard(call) => Some(classify_defer(call)),
            InstrKind::FieldAddr { field, .. } if *field == target => Some(GuardOpKind::Other),
            _ => None,
        }
    }

    fn call_site_locked(&self, model: &ProgramModel, ancestor: NodeId, callee: NodeId, guard: Location) -> bool {
        let body = &model.function(ancestor).body;
        let intervals = LockIntervals::from_ops(&self.guard_ops(body, guard));
        body.iter()
            .filter(|i| i.pos.is_valid())
            .filter(|i| i.call_site().and_then(|c| c.static_callee()) == Some(callee))
            .all(|i| intervals.covers(i.pos))
    }
}

/// Field of `st` addressed by `name`: a declared name or the type name of an
/// embedded field.
fn sibling_field(st: &StructDecl, name: &str) -> Option<FieldRef> {
    st.fields.iter().find_map(|fd| {
        fd.index_of(name).map(|index| FieldRef { owner: st.id, index })
    })
}
