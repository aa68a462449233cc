#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use mutex_check_ir::{FieldRef, GlobalId, GuardKind, Operand, PackageId, Position, ProgramModel};

/// Identity of a shared location: a package-level variable or a struct field.
/// Guards are addressed the same way as the locations they protect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Location {
    Global(GlobalId),
    Field(FieldRef),
}

impl Location {
    pub fn package(&self, model: &ProgramModel) -> PackageId {
        match self {
            Location::Global(g) => model.global(*g).package,
            Location::Field(f) => model.struct_type(f.owner).package,
        }
    }

    /// `X` for globals, `Cache.items` for fields.
    pub fn name(&self, model: &ProgramModel) -> String {
        match self {
            Location::Global(g) => model.global(*g).name.clone(),
            Location::Field(f) => format!("{}.{}", model.struct_type(f.owner).name, model.field(*f).name),
        }
    }

    /// Processing order key: `<package path>_<name>`.
    pub fn sort_key(&self, model: &ProgramModel) -> String {
        format!("{}_{}", model.package(self.package(model)).path, self.name(model))
    }

    /// The operand under which the location shows up in instructions.
    pub fn as_operand(&self) -> Operand {
        match self {
            Location::Global(g) => Operand::Global(*g),
            Location::Field(f) => Operand::FieldAddr(*f),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Guard {
    pub location: Location,
    pub kind: GuardKind,
    /// Declaration of the guard.
    pub pos: Position,
}

/// Protected location -> guard. Entries are only ever added.
#[derive(Clone, Debug, Default)]
pub struct GuardMap {
    entries: BTreeMap<Location, Guard>,
}

impl GuardMap {
    /// Record `guard` for `location`. A location keeps the first guard that
    /// claimed it; later claims return `false`.
    pub fn insert(&mut self, location: Location, guard: Guard) -> bool {
        if self.entries.contains_key(&location) {
            return false;
        }
        self.entries.insert(location, guard);
        true
    }

    pub fn get(&self, location: Location) -> Option<&Guard> {
        self.entries.get(&location)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Location, &Guard)> {
        self.entries.iter().map(|(l, g)| (*l, g))
    }

    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
