#![forbid(unsafe_code)]

use crate::error::ModelError;
use crate::ir::*;
use crate::model::*;

/// One struct body line for [`ProgramBuilder::struct_type`].
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub names: Vec<String>,
    pub ty: TypeExpr,
    pub line: u32,
}

impl FieldSpec {
    pub fn named(name: &str, ty: TypeExpr, line: u32) -> Self {
        Self {
            names: vec![name.to_string()],
            ty,
            line,
        }
    }

    pub fn embedded(ty: TypeExpr, line: u32) -> Self {
        Self {
            names: Vec::new(),
            ty,
            line,
        }
    }
}

/// In-memory construction of a [`ProgramModel`], validated exactly like a
/// loaded snapshot.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    snapshot: Snapshot,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn package(&mut self, path: &str) -> PackageId {
        self.snapshot.packages.push(Package {
            path: path.to_string(),
            errors: Vec::new(),
        });
        PackageId(self.snapshot.packages.len() as u32 - 1)
    }

    pub fn file(&mut self, package: PackageId, path: &str) -> FileId {
        self.snapshot.files.push(SourceFile {
            path: path.to_string(),
            package,
            decls: Vec::new(),
        });
        FileId(self.snapshot.files.len() as u32 - 1)
    }

    pub fn comment(&mut self, file: FileId, line: u32, text: &str) -> &mut Self {
        self.snapshot.comments.push(Comment {
            pos: Position::new(file, line),
            text: text.to_string(),
        });
        self
    }

    /// Package-level `var name ty` declared in `file` at `line`.
    pub fn global(&mut self, file: FileId, name: &str, ty: Option<TypeExpr>, line: u32) -> GlobalId {
        let package = self.snapshot.files[file.0 as usize].package;
        let pos = Position::new(file, line);
        let id = GlobalId(self.snapshot.globals.len() as u32);
        self.snapshot.globals.push(Global {
            name: name.to_string(),
            package,
            pos,
        });
        self.snapshot.files[file.0 as usize].decls.push(Decl::Var(VarDecl {
            name: name.to_string(),
            global: id,
            ty,
            pos,
        }));
        id
    }

    pub fn struct_type(&mut self, file: FileId, name: &str, fields: Vec<FieldSpec>) -> StructId {
        let package = self.snapshot.files[file.0 as usize].package;
        let id = StructId(self.snapshot.structs.len() as u32);
        let mut infos = Vec::new();
        let mut decls = Vec::new();
        for spec in fields {
            let pos = Position::new(file, spec.line);
            let first_index = infos.len() as u32;
            if spec.names.is_empty() {
                let embedded = spec.ty.embedded_name().unwrap_or("_").to_string();
                infos.push(FieldInfo { name: embedded, pos });
            } else {
                for n in &spec.names {
                    infos.push(FieldInfo {
                        name: n.clone(),
                        pos,
                    });
                }
            }
            decls.push(FieldDecl {
                names: spec.names,
                ty: spec.ty,
                pos,
                first_index,
            });
        }
        self.snapshot.structs.push(StructType {
            name: name.to_string(),
            package,
            fields: infos,
        });
        self.snapshot.files[file.0 as usize].decls.push(Decl::Struct(StructDecl {
            name: name.to_string(),
            id,
            fields: decls,
        }));
        id
    }

    /// Field of `owner` named `name`.
    ///
    /// # Panics
    /// When the struct has no such field.
    pub fn field(&self, owner: StructId, name: &str) -> FieldRef {
        let index = self.snapshot.structs[owner.0 as usize]
            .fields
            .iter()
            .position(|f| f.name == name)
            .unwrap_or_else(|| panic!("no field {name}"));
        FieldRef {
            owner,
            index: index as u32,
        }
    }

    pub fn function(&mut self, package: PackageId, name: &str) -> NodeId {
        self.snapshot.functions.push(Function {
            name: name.to_string(),
            package,
            init: false,
            body: Vec::new(),
        });
        NodeId(self.snapshot.functions.len() as u32 - 1)
    }

    pub fn init_function(&mut self, package: PackageId, name: &str) -> NodeId {
        let id = self.function(package, name);
        self.snapshot.functions[id.index()].init = true;
        id
    }

    pub fn instr(&mut self, node: NodeId, file: FileId, line: u32, kind: InstrKind) -> &mut Self {
        self.snapshot.functions[node.index()].body.push(Instruction {
            pos: Position::new(file, line),
            def: None,
            kind,
        });
        self
    }

    /// Instruction that defines SSA value `def`.
    pub fn def(&mut self, node: NodeId, file: FileId, line: u32, def: u32, kind: InstrKind) -> &mut Self {
        self.instr(node, file, line, kind);
        if let Some(last) = self.snapshot.functions[node.index()].body.last_mut() {
            last.def = Some(def);
        }
        self
    }

    /// `t<def> = *source` and friends.
    pub fn load(&mut self, node: NodeId, file: FileId, line: u32, def: u32, source: Operand) -> &mut Self {
        self.def(node, file, line, def, InstrKind::Alias { source })
    }

    pub fn edge(&mut self, caller: NodeId, callee: NodeId) -> &mut Self {
        self.snapshot.edges.push(Edge { caller, callee });
        self
    }

    /// Static call plus its call-graph edge.
    pub fn call(&mut self, caller: NodeId, file: FileId, line: u32, callee: NodeId) -> &mut Self {
        self.instr(
            caller,
            file,
            line,
            InstrKind::Call(CallSite {
                callee: Callee::Function(callee),
                method: false,
                args: Vec::new(),
            }),
        );
        self.edge(caller, callee)
    }

    /// `go callee()` plus its call-graph edge.
    pub fn spawn(&mut self, caller: NodeId, file: FileId, line: u32, callee: NodeId) -> &mut Self {
        self.instr(
            caller,
            file,
            line,
            InstrKind::Go(CallSite {
                callee: Callee::Function(callee),
                method: false,
                args: Vec::new(),
            }),
        );
        self.edge(caller, callee)
    }

    /// `recv.name()` on an out-of-program method such as `Lock`.
    pub fn method(&mut self, node: NodeId, file: FileId, line: u32, name: &str, recv: Operand) -> &mut Self {
        self.instr(node, file, line, InstrKind::Call(external_method(name, recv)))
    }

    /// `defer recv.name()`.
    pub fn defer_method(&mut self, node: NodeId, file: FileId, line: u32, name: &str, recv: Operand) -> &mut Self {
        self.instr(node, file, line, InstrKind::Defer(external_method(name, recv)))
    }

    /// Load or store touching `op`.
    pub fn access(&mut self, node: NodeId, file: FileId, line: u32, op: Operand) -> &mut Self {
        self.instr(node, file, line, InstrKind::Other { operands: vec![op] })
    }

    pub fn field_addr(&mut self, node: NodeId, file: FileId, line: u32, base: Operand, field: FieldRef) -> &mut Self {
        self.instr(node, file, line, InstrKind::FieldAddr { base, field })
    }

    pub fn ret(&mut self, node: NodeId, file: FileId, line: u32, results: Vec<Operand>) -> &mut Self {
        self.instr(node, file, line, InstrKind::Return { results })
    }

    pub fn into_snapshot(self) -> Snapshot {
        self.snapshot
    }

    pub fn finish(self) -> Result<ProgramModel, ModelError> {
        ProgramModel::from_snapshot(self.snapshot)
    }
}

fn external_method(name: &str, recv: Operand) -> CallSite {
    CallSite {
        callee: Callee::External(name.to_string()),
        method: true,
        args: vec![recv],
    }
}
