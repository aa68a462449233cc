#![forbid(unsafe_code)]

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub u32);

/// A call-graph node; one per function with or without a body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Semantic identity of a struct field: the owning struct type plus the
/// field's index in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub owner: StructId,
    pub index: u32,
}

/// Source position. `line == 0` means the instruction has no position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub file: FileId,
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl Position {
    pub fn new(file: FileId, line: u32) -> Self {
        Self {
            file,
            line,
            column: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.line != 0
    }

    /// Column-free form used as a lookup key.
    pub fn line_key(&self) -> (FileId, u32) {
        (self.file, self.line)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    /// `sync.Mutex`
    Exclusive,
    /// `sync.RWMutex`
    ReadWrite,
}

/// Declared type as written in source, only as detailed as guard detection
/// and embedded-field naming need.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeExpr {
    Named {
        #[serde(default)]
        package: Option<String>,
        name: String,
    },
    Pointer(Box<TypeExpr>),
    Other(String),
}

impl TypeExpr {
    pub fn named(name: &str) -> Self {
        TypeExpr::Named {
            package: None,
            name: name.to_string(),
        }
    }

    pub fn qualified(package: &str, name: &str) -> Self {
        TypeExpr::Named {
            package: Some(package.to_string()),
            name: name.to_string(),
        }
    }

    pub fn pointer(inner: TypeExpr) -> Self {
        TypeExpr::Pointer(Box::new(inner))
    }

    /// `sync.Mutex` / `sync.RWMutex`, optionally behind pointers.
    pub fn guard_kind(&self) -> Option<GuardKind> {
        match self {
            TypeExpr::Pointer(inner) => inner.guard_kind(),
            TypeExpr::Named {
                package: Some(pkg),
                name,
            } if pkg == "sync" => match name.as_str() {
                "Mutex" => Some(GuardKind::Exclusive),
                "RWMutex" => Some(GuardKind::ReadWrite),
                _ => None,
            },
            _ => None,
        }
    }

    /// Name an embedded field of this type is addressed by: `T`, `*T`,
    /// `pkg.T` and `*pkg.T` all yield `T`.
    pub fn embedded_name(&self) -> Option<&str> {
        match self {
            TypeExpr::Pointer(inner) => inner.embedded_name(),
            TypeExpr::Named { name, .. } => Some(name),
            TypeExpr::Other(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Global(GlobalId),
    /// Address of a struct field, i.e. the result of a field-address
    /// instruction.
    FieldAddr(FieldRef),
    Function(NodeId),
    Value(u32),
    Const,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Callee {
    /// A function that is part of the analyzed call graph.
    Function(NodeId),
    /// A function or method outside the program, by its short name
    /// (e.g. `Lock`).
    External(String),
    /// Interface or closure dispatch.
    Dynamic,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub callee: Callee,
    /// Method call: `args[0]` is the receiver.
    #[serde(default)]
    pub method: bool,
    #[serde(default)]
    pub args: Vec<Operand>,
}

impl CallSite {
    pub fn external_name(&self) -> Option<&str> {
        match &self.callee {
            Callee::External(name) => Some(name),
            _ => None,
        }
    }

    pub fn receiver(&self) -> Option<&Operand> {
        if self.method { self.args.first() } else { None }
    }

    pub fn static_callee(&self) -> Option<NodeId> {
        match self.callee {
            Callee::Function(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InstrKind {
    FieldAddr { base: Operand, field: FieldRef },
    Call(CallSite),
    Defer(CallSite),
    Go(CallSite),
    /// Results are operands as the front end wrote them; a returned load
    /// is a `value` whose defining `alias`/`field_addr` leads back to the
    /// location (see [`value_roots`]).
    Return {
        #[serde(default)]
        results: Vec<Operand>,
    },
    /// A value that reads through or reinterprets `source` without
    /// computing anything new: dereference, slice, conversion, type
    /// assertion.
    Alias { source: Operand },
    /// Loads, stores, arithmetic and everything else, reduced to operands.
    Other {
        #[serde(default)]
        operands: Vec<Operand>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub pos: Position,
    /// SSA value this instruction defines, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub def: Option<u32>,
    #[serde(flatten)]
    pub kind: InstrKind,
}

impl Instruction {
    pub fn operands(&self) -> Vec<&Operand> {
        match &self.kind {
            InstrKind::FieldAddr { base, .. } => vec![base],
            InstrKind::Call(call) | InstrKind::Defer(call) | InstrKind::Go(call) => {
                call.args.iter().collect()
            }
            InstrKind::Return { results } => results.iter().collect(),
            InstrKind::Alias { source } => vec![source],
            InstrKind::Other { operands } => operands.iter().collect(),
        }
    }

    pub fn references_global(&self, global: GlobalId) -> bool {
        self.operands()
            .into_iter()
            .any(|op| *op == Operand::Global(global))
    }

    pub fn call_site(&self) -> Option<&CallSite> {
        match &self.kind {
            InstrKind::Call(call) => Some(call),
            _ => None,
        }
    }
}

/// Operands `op` is derived from inside `body`, following `value` operands
/// back through `alias` and `field_addr` definitions. A field address
/// yields both the field and the roots of its base. Non-value operands are
/// their own root; values without a definition (parameters, call results)
/// have none.
pub fn value_roots(body: &[Instruction], op: Operand) -> Vec<Operand> {
    let mut roots = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![op];
    while let Some(op) = stack.pop() {
        let Operand::Value(v) = op else {
            if !roots.contains(&op) {
                roots.push(op);
            }
            continue;
        };
        if !seen.insert(v) {
            continue;
        }
        for instr in body.iter().filter(|i| i.def == Some(v)) {
            match &instr.kind {
                InstrKind::FieldAddr { base, field } => {
                    stack.push(Operand::FieldAddr(*field));
                    stack.push(*base);
                }
                InstrKind::Alias { source } => stack.push(*source),
                _ => {}
            }
        }
    }
    roots
}
