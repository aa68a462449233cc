#![forbid(unsafe_code)]

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::ir::*;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Package {
    /// Import path, e.g. `example.com/app/cache`.
    pub path: String,
    /// Front-end errors (syntax, type checking). Any entry makes the whole
    /// snapshot unusable.
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub package: PackageId,
    #[serde(default)]
    pub decls: Vec<Decl>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "decl", rename_all = "snake_case")]
pub enum Decl {
    /// A package-level `var`. One entry per declared name.
    Var(VarDecl),
    /// A named struct type declaration.
    Struct(StructDecl),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub global: GlobalId,
    #[serde(default)]
    pub ty: Option<TypeExpr>,
    pub pos: Position,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub id: StructId,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

/// One line of a struct body: `a, b int` or an embedded `*sync.Mutex`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDecl {
    /// Empty for embedded fields.
    #[serde(default)]
    pub names: Vec<String>,
    pub ty: TypeExpr,
    pub pos: Position,
    /// Index of the first field this declaration introduces.
    pub first_index: u32,
}

impl FieldDecl {
    pub fn is_embedded(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of the field addressed by `name` within this declaration.
    pub fn index_of(&self, name: &str) -> Option<u32> {
        if self.is_embedded() {
            return (self.ty.embedded_name() == Some(name)).then_some(self.first_index);
        }
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.first_index + i as u32)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Global {
    pub name: String,
    pub package: PackageId,
    pub pos: Position,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StructType {
    pub name: String,
    pub package: PackageId,
    #[serde(default)]
    pub fields: Vec<FieldInfo>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub pos: Position,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Function {
    /// Fully qualified display name, e.g. `example.com/app.F` or
    /// `(*example.com/app.Cache).Get`.
    pub name: String,
    pub package: PackageId,
    /// Package initializer (`init`); never analyzed.
    #[serde(default)]
    pub init: bool,
    /// Instruction stream in block order. Empty for external functions.
    #[serde(default)]
    pub body: Vec<Instruction>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub caller: NodeId,
    pub callee: NodeId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Comment {
    pub pos: Position,
    pub text: String,
}

/// Serialized form produced by the front end.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub build_flags: Vec<String>,
    #[serde(default)]
    pub packages: Vec<Package>,
    #[serde(default)]
    pub files: Vec<SourceFile>,
    #[serde(default)]
    pub globals: Vec<Global>,
    #[serde(default)]
    pub structs: Vec<StructType>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// Caller/callee adjacency for every node, indexed by `NodeId`.
#[derive(Clone, Debug, Default)]
pub struct CallGraph {
    callers: Vec<Vec<NodeId>>,
    callees: Vec<Vec<NodeId>>,
    spawned: Vec<bool>,
}

impl CallGraph {
    fn build(node_count: usize, edges: &[Edge], functions: &[Function]) -> Self {
        let mut callers = vec![Vec::new(); node_count];
        let mut callees = vec![Vec::new(); node_count];
        for e in edges {
            push_unique(&mut callers[e.callee.index()], e.caller);
            push_unique(&mut callees[e.caller.index()], e.callee);
        }

        let mut spawned = vec![false; node_count];
        for f in functions {
            for instr in &f.body {
                if let InstrKind::Go(call) = &instr.kind {
                    if let Some(target) = call.static_callee() {
                        spawned[target.index()] = true;
                    }
                }
            }
        }

        Self {
            callers,
            callees,
            spawned,
        }
    }

    pub fn callers(&self, node: NodeId) -> &[NodeId] {
        &self.callers[node.index()]
    }

    pub fn callees(&self, node: NodeId) -> &[NodeId] {
        &self.callees[node.index()]
    }

    /// The node is the target of some `go` statement.
    pub fn is_spawn_origin(&self, node: NodeId) -> bool {
        self.spawned[node.index()]
    }
}

fn push_unique(list: &mut Vec<NodeId>, id: NodeId) {
    if !list.contains(&id) {
        list.push(id);
    }
}

/// Validated, immutable program model for one analysis run.
#[derive(Clone, Debug)]
pub struct ProgramModel {
    snapshot: Snapshot,
    graph: CallGraph,
    analyzed: Vec<bool>,
}

impl ProgramModel {
    /// Validate a snapshot and index its call graph. Every package is
    /// considered part of the analyzed module.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, ModelError> {
        for pkg in &snapshot.packages {
            if let Some(first) = pkg.errors.first() {
                return Err(ModelError::Package {
                    package: pkg.path.clone(),
                    message: first.clone(),
                });
            }
        }
        validate(&snapshot)?;

        let graph = CallGraph::build(snapshot.functions.len(), &snapshot.edges, &snapshot.functions);
        let analyzed = vec![true; snapshot.packages.len()];
        Ok(Self {
            snapshot,
            graph,
            analyzed,
        })
    }

    /// Restrict annotation scanning to packages whose import path starts
    /// with `prefix`.
    pub fn restrict_to_module(&mut self, prefix: &str) {
        for (flag, pkg) in self.analyzed.iter_mut().zip(&self.snapshot.packages) {
            *flag = pkg.path.starts_with(prefix);
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn graph(&self) -> &CallGraph {
        &self.graph
    }

    pub fn is_analyzed(&self, pkg: PackageId) -> bool {
        self.analyzed[pkg.0 as usize]
    }

    pub fn package(&self, id: PackageId) -> &Package {
        &self.snapshot.packages[id.0 as usize]
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.snapshot.files[id.0 as usize]
    }

    pub fn files(&self) -> impl Iterator<Item = (FileId, &SourceFile)> {
        self.snapshot
            .files
            .iter()
            .enumerate()
            .map(|(i, f)| (FileId(i as u32), f))
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.snapshot.globals[id.0 as usize]
    }

    pub fn struct_type(&self, id: StructId) -> &StructType {
        &self.snapshot.structs[id.0 as usize]
    }

    pub fn field(&self, field: FieldRef) -> &FieldInfo {
        &self.struct_type(field.owner).fields[field.index as usize]
    }

    pub fn function(&self, id: NodeId) -> &Function {
        &self.snapshot.functions[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.snapshot.functions.len() as u32).map(NodeId)
    }

    pub fn comments(&self) -> &[Comment] {
        &self.snapshot.comments
    }

    /// `file:line` as printed in diagnostics.
    pub fn display_position(&self, pos: Position) -> String {
        format!("{}:{}", self.file(pos.file).path, pos.line)
    }
}

fn validate(s: &Snapshot) -> Result<(), ModelError> {
    let packages = s.packages.len() as u32;
    let files = s.files.len() as u32;
    let globals = s.globals.len() as u32;
    let nodes = s.functions.len() as u32;

    let check_pos = |pos: &Position, what: &str| -> Result<(), ModelError> {
        if pos.file.0 >= files {
            return Err(dangling(format!("{what} refers to missing file {}", pos.file.0)));
        }
        Ok(())
    };
    let check_field = |f: &FieldRef, what: &str| -> Result<(), ModelError> {
        let Some(st) = s.structs.get(f.owner.0 as usize) else {
            return Err(dangling(format!("{what} refers to missing struct {}", f.owner.0)));
        };
        if f.index as usize >= st.fields.len() {
            return Err(dangling(format!(
                "{what} refers to missing field {} of {}",
                f.index, st.name
            )));
        }
        Ok(())
    };
    let check_operand = |op: &Operand, what: &str| -> Result<(), ModelError> {
        match op {
            Operand::Global(g) if g.0 >= globals => {
                Err(dangling(format!("{what} refers to missing global {}", g.0)))
            }
            Operand::Function(n) if n.0 >= nodes => {
                Err(dangling(format!("{what} refers to missing function {}", n.0)))
            }
            Operand::FieldAddr(f) => check_field(f, what),
            _ => Ok(()),
        }
    };

    for f in &s.files {
        if f.package.0 >= packages {
            return Err(dangling(format!("file {} has no package", f.path)));
        }
        for d in &f.decls {
            match d {
                Decl::Var(v) => {
                    if v.global.0 >= globals {
                        return Err(dangling(format!("var {} has no global", v.name)));
                    }
                    check_pos(&v.pos, &v.name)?;
                }
                Decl::Struct(st) => {
                    let Some(ty) = s.structs.get(st.id.0 as usize) else {
                        return Err(dangling(format!("struct {} has no type", st.name)));
                    };
                    for fd in &st.fields {
                        check_pos(&fd.pos, &st.name)?;
                        let count = fd.names.len().max(1) as u32;
                        let in_range = fd
                            .first_index
                            .checked_add(count)
                            .is_some_and(|end| end as usize <= ty.fields.len());
                        if !in_range {
                            return Err(dangling(format!("struct {} field index out of range", st.name)));
                        }
                    }
                }
            }
        }
    }
    for g in &s.globals {
        if g.package.0 >= packages {
            return Err(dangling(format!("global {} has no package", g.name)));
        }
        check_pos(&g.pos, &g.name)?;
    }
    for st in &s.structs {
        if st.package.0 >= packages {
            return Err(dangling(format!("struct {} has no package", st.name)));
        }
        for f in &st.fields {
            check_pos(&f.pos, &st.name)?;
        }
    }
    for f in &s.functions {
        if f.package.0 >= packages {
            return Err(dangling(format!("function {} has no package", f.name)));
        }
        for instr in &f.body {
            check_pos(&instr.pos, &f.name)?;
            for op in instr.operands() {
                check_operand(op, &f.name)?;
            }
            match &instr.kind {
                InstrKind::FieldAddr { field, .. } => check_field(field, &f.name)?,
                InstrKind::Call(c) | InstrKind::Defer(c) | InstrKind::Go(c) => {
                    if let Callee::Function(n) = c.callee {
                        if n.0 >= nodes {
                            return Err(dangling(format!("{} calls missing function {}", f.name, n.0)));
                        }
                    }
                }
                _ => {}
            }
        }
    }
    for e in &s.edges {
        if e.caller.0 >= nodes || e.callee.0 >= nodes {
            return Err(dangling(format!(
                "edge {} -> {} refers to a missing function",
                e.caller.0, e.callee.0
            )));
        }
    }
    for c in &s.comments {
        check_pos(&c.pos, "comment")?;
    }

    let mut seen = HashSet::new();
    for p in &s.packages {
        if !seen.insert(p.path.as_str()) {
            return Err(dangling(format!("package {} listed twice", p.path)));
        }
    }
    Ok(())
}

fn dangling(message: String) -> ModelError {
    ModelError::Inconsistent { message }
}
