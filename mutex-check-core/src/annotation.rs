#![forbid(unsafe_code)]

use mutex_check_ir::{CommentIndex, Position, ProgramModel};

use crate::guard::{Guard, GuardMap, Location};
use crate::report::PREFIX;

/// Token that, together with `nolint`, disables checking of a guard.
pub const ANALYZER_NAME: &str = "mutex_check";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Annotation {
    Missing,
    OptOut,
    Names(Vec<String>),
}

/// Parse the comment trailing a guard declaration.
///
/// Comment markers are stripped and all whitespace removed before the text
/// is split on commas, so `// a, b` and `/* a,b */` name the same locations.
pub fn parse_annotation(raw: &str) -> Annotation {
    let text: String = raw
        .lines()
        .map(strip_markers)
        .flat_map(str::chars)
        .filter(|c| !c.is_whitespace())
        .collect();

    if text.is_empty() {
        return Annotation::Missing;
    }
    if text.contains("nolint") && text.contains(ANALYZER_NAME) {
        return Annotation::OptOut;
    }
    let names: Vec<String> = text
        .split(',')
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        Annotation::Missing
    } else {
        Annotation::Names(names)
    }
}

fn strip_markers(line: &str) -> &str {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("//") {
        return rest;
    }
    if let Some(rest) = line.strip_prefix("/*") {
        return rest.strip_suffix("*/").unwrap_or(rest);
    }
    line.strip_suffix("*/").unwrap_or(line)
}

/// Non-fatal problem found while resolving annotations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolutionWarning {
    MissingAnnotation { pos: Position },
    UnresolvedName { pos: Position, name: String },
}

impl ResolutionWarning {
    pub fn position(&self) -> Position {
        match self {
            ResolutionWarning::MissingAnnotation { pos } | ResolutionWarning::UnresolvedName { pos, .. } => *pos,
        }
    }

    pub fn render(&self, model: &ProgramModel) -> String {
        let at = model.display_position(self.position());
        match self {
            ResolutionWarning::MissingAnnotation { .. } => {
                format!("{PREFIX} {at} guard has no annotation naming the locations it protects")
            }
            ResolutionWarning::UnresolvedName { name, .. } => {
                format!("{PREFIX} {at} annotation names undeclared identifier {name}")
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Resolution {
    pub guards: GuardMap,
    pub warnings: Vec<ResolutionWarning>,
}

/// Per-run inputs of the annotation resolver.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    pub model: &'a ProgramModel,
    pub comments: &'a CommentIndex,
}

/// Read the annotation of `guard` and bind every name `lookup` resolves.
/// Stops at the first unresolved name; earlier bindings stay.
pub(crate) fn bind_annotation(
    ctx: &ResolveContext<'_>,
    guard: &Guard,
    mut lookup: impl FnMut(&str) -> Option<Location>,
    out: &mut Resolution,
) {
    let at = || ctx.model.display_position(guard.pos);
    match parse_annotation(ctx.comments.comments_at(guard.pos)) {
        Annotation::Missing => {
            tracing::warn!(guard = %at(), "guard has no annotation");
            out.warnings.push(ResolutionWarning::MissingAnnotation { pos: guard.pos });
        }
        Annotation::OptOut => {
            tracing::debug!(guard = %at(), "guard opted out");
        }
        Annotation::Names(names) => {
            for name in names {
                let Some(location) = lookup(&name) else {
                    tracing::warn!(guard = %at(), %name, "annotation names undeclared identifier");
                    out.warnings.push(ResolutionWarning::UnresolvedName {
                        pos: guard.pos,
                        name,
                    });
                    break;
                };
                tracing::debug!(
                    guard = %at(),
                    kind = ?guard.kind,
                    location = %location.name(ctx.model),
                    "location bound"
                );
                if !out.guards.insert(location, guard.clone()) {
                    tracing::warn!(
                        guard = %at(),
                        location = %location.name(ctx.model),
                        "location already has a guard; keeping the first"
                    );
                }
            }
        }
    }
}
