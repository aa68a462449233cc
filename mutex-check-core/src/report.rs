#![forbid(unsafe_code)]

use std::collections::HashMap;

use mutex_check_ir::{NodeId, Position, ProgramModel};

use crate::ancestor::CallPath;
use crate::annotation::ResolutionWarning;
use crate::guard::Location;
use crate::variant::VariantKind;

pub const PREFIX: &str = "[mutex check]";
pub const UNLOCKED_MESSAGE: &str = "no call to lock/unlock";
pub const RETURN_ESCAPE_MESSAGE: &str = "returns the guarded variable; restructure as a callback/visitor instead";

/// An unprotected chain together with every usage position that led to it.
#[derive(Clone, Debug)]
pub struct Violation {
    pub variant: VariantKind,
    pub location: Location,
    pub path: CallPath,
    /// Rendered path; with `variant`, the deduplication key.
    pub signature: String,
    /// Discovery order; the first one is cited in the diagnostic line.
    pub positions: Vec<Position>,
}

impl Violation {
    pub fn primary_position(&self) -> Option<Position> {
        self.positions.iter().copied().find(Position::is_valid)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReturnEscape {
    pub location: Location,
    pub node: NodeId,
    pub pos: Position,
}

#[derive(Clone, Debug, Default)]
pub struct Report {
    pub warnings: Vec<ResolutionWarning>,
    violations: Vec<Violation>,
    by_signature: HashMap<(VariantKind, String), usize>,
    escapes: Vec<ReturnEscape>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a failing chain. A chain whose signature the same variant already
    /// reported only contributes its positions.
    pub fn record_violation(
        &mut self,
        model: &ProgramModel,
        variant: VariantKind,
        location: Location,
        path: CallPath,
        positions: Vec<Position>,
    ) {
        let signature = path.render(model);
        self.insert(Violation {
            variant,
            location,
            path,
            signature,
            positions,
        });
    }

    fn insert(&mut self, violation: Violation) {
        let key = (violation.variant, violation.signature.clone());
        match self.by_signature.get(&key) {
            Some(&idx) => {
                let existing = &mut self.violations[idx].positions;
                for pos in violation.positions {
                    if !existing.contains(&pos) {
                        existing.push(pos);
                    }
                }
            }
            None => {
                self.by_signature.insert(key, self.violations.len());
                self.violations.push(violation);
            }
        }
    }

    pub fn record_escape(&mut self, escape: ReturnEscape) {
        self.escapes.push(escape);
    }

    /// Fold another report in. Paths are only deduplicated within a variant.
    pub fn merge(&mut self, other: Report) {
        self.warnings.extend(other.warnings);
        for v in other.violations {
            self.insert(v);
        }
        self.escapes.extend(other.escapes);
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn escapes(&self) -> &[ReturnEscape] {
        &self.escapes
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.escapes.is_empty()
    }

    pub fn warning_lines(&self, model: &ProgramModel) -> Vec<String> {
        self.warnings.iter().map(|w| w.render(model)).collect()
    }

    /// Unlocked-access lines, then return-escape lines; each class sorted
    /// and deduplicated.
    pub fn finding_lines(&self, model: &ProgramModel) -> Vec<String> {
        let mut unlocked: Vec<String> = self
            .violations
            .iter()
            .filter_map(|v| v.primary_position())
            .map(|pos| finding_line(model, pos, UNLOCKED_MESSAGE))
            .collect();
        unlocked.sort();
        unlocked.dedup();

        let mut escapes: Vec<String> = self
            .escapes
            .iter()
            .filter(|e| e.pos.is_valid())
            .map(|e| finding_line(model, e.pos, RETURN_ESCAPE_MESSAGE))
            .collect();
        escapes.sort();
        escapes.dedup();

        unlocked.extend(escapes);
        unlocked
    }
}

pub fn finding_line(model: &ProgramModel, pos: Position, message: &str) -> String {
    format!("{PREFIX} {} {message}", model.display_position(pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mutex_check_ir::{GlobalId, ProgramBuilder, TypeExpr};

    fn model() -> (ProgramModel, NodeId, NodeId) {
        let mut b = ProgramBuilder::new();
        let pkg = b.package("example.com/app");
        let file = b.file(pkg, "app/a.go");
        b.global(file, "x", Some(TypeExpr::named("int")), 1);
        let f = b.function(pkg, "app.F");
        let caller = b.function(pkg, "app.Caller");
        (b.finish().expect("model"), f, caller)
    }

    #[test]
    fn identical_paths_collapse_into_one_line() {
        let (model, f, caller) = model();
        let loc = Location::Global(GlobalId(0));
        let at = |line| Position::new(mutex_check_ir::FileId(0), line);
        let path = CallPath {
            nodes: vec![f, caller],
            looped: false,
        };

        let mut report = Report::new();
        report.record_violation(&model, VariantKind::Globals, loc, path.clone(), vec![at(7)]);
        report.record_violation(&model, VariantKind::Globals, loc, path, vec![at(9), at(7)]);

        assert_eq!(report.violations().len(), 1);
        assert_eq!(report.violations()[0].positions, vec![at(7), at(9)]);
        assert_eq!(
            report.finding_lines(&model),
            vec!["[mutex check] app/a.go:7 no call to lock/unlock".to_string()]
        );
    }

    #[test]
    fn unlocked_lines_precede_escape_lines() {
        let (model, f, caller) = model();
        let loc = Location::Global(GlobalId(0));
        let at = |line| Position::new(mutex_check_ir::FileId(0), line);

        let mut report = Report::new();
        report.record_escape(ReturnEscape {
            location: loc,
            node: f,
            pos: at(2),
        });
        report.record_escape(ReturnEscape {
            location: loc,
            node: f,
            pos: at(2),
        });
        report.record_violation(
            &model,
            VariantKind::Globals,
            loc,
            CallPath {
                nodes: vec![caller],
                looped: false,
            },
            vec![at(30)],
        );

        let lines = report.finding_lines(&model);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(UNLOCKED_MESSAGE));
        assert!(lines[1].ends_with(RETURN_ESCAPE_MESSAGE));
    }

    #[test]
    fn same_path_from_two_variants_is_kept_twice() {
        let (model, f, caller) = model();
        let at = |line| Position::new(mutex_check_ir::FileId(0), line);
        let path = CallPath {
            nodes: vec![f, caller],
            looped: false,
        };

        let mut globals = Report::new();
        globals.record_violation(&model, VariantKind::Globals, Location::Global(GlobalId(0)), path.clone(), vec![at(10)]);
        let mut fields = Report::new();
        fields.record_violation(&model, VariantKind::Fields, Location::Global(GlobalId(0)), path, vec![at(12)]);

        globals.merge(fields);
        assert_eq!(globals.violations().len(), 2);
        assert_eq!(
            globals.finding_lines(&model),
            vec![
                "[mutex check] app/a.go:10 no call to lock/unlock".to_string(),
                "[mutex check] app/a.go:12 no call to lock/unlock".to_string(),
            ]
        );
    }
}
