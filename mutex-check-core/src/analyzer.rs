#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use mutex_check_ir::{CommentIndex, NodeId, Position, ProgramModel};
use rayon::prelude::*;

use crate::ancestor::{CallPath, find_unprotected_path};
use crate::annotation::{Resolution, ResolveContext};
use crate::fields::StructFields;
use crate::globals::GlobalVariables;
use crate::guard::{Guard, Location};
use crate::interval::unprotected_usages;
use crate::report::{Report, ReturnEscape};
use crate::usage::collect_usages;
use crate::variant::{Variant, VariantKind};

#[derive(Clone, Debug)]
pub struct AnalyzerOptions {
    /// Verify protected locations on the rayon pool.
    pub parallel: bool,
    /// Location kinds to check, in order.
    pub variants: Vec<VariantKind>,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            variants: VariantKind::ALL.to_vec(),
        }
    }
}

/// Findings for one protected location, before deduplication.
#[derive(Debug, Default)]
struct LocationResult {
    failures: Vec<(CallPath, Vec<Position>)>,
    escapes: Vec<ReturnEscape>,
}

/// The verification pipeline for one location kind:
/// resolve annotations, collect usages, check local lock intervals, walk
/// ancestors of the functions that are not locally protected.
pub struct Analyzer<'m, V: Variant> {
    model: &'m ProgramModel,
    comments: &'m CommentIndex,
    variant: V,
    parallel: bool,
}

impl<'m, V: Variant> Analyzer<'m, V> {
    pub fn new(model: &'m ProgramModel, comments: &'m CommentIndex, variant: V) -> Self {
        Self {
            model,
            comments,
            variant,
            parallel: true,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn resolve(&self) -> Resolution {
        let ctx = ResolveContext {
            model: self.model,
            comments: self.comments,
        };
        let mut out = Resolution::default();
        self.variant.resolve_guards(&ctx, &mut out);
        tracing::debug!(
            variant = %self.variant.kind(),
            guarded = out.guards.len(),
            warnings = out.warnings.len(),
            "annotations resolved"
        );
        out
    }

    pub fn run(&self) -> Report {
        let _span = tracing::debug_span!("analyze", variant = %self.variant.kind()).entered();

        let resolution = self.resolve();
        let usages = collect_usages(&self.variant, self.model, &resolution.guards);

        let no_usages = BTreeSet::new();
        let mut work: Vec<(String, Location, &Guard, &BTreeSet<NodeId>)> = resolution
            .guards
            .iter()
            .map(|(loc, guard)| {
                let nodes = usages.get(&loc).unwrap_or(&no_usages);
                (loc.sort_key(self.model), loc, guard, nodes)
            })
            .collect();
        work.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let results: Vec<(Location, LocationResult)> = if self.parallel {
            work.par_iter()
                .map(|(_, loc, guard, nodes)| (*loc, self.verify_location(*loc, guard, nodes)))
                .collect()
        } else {
            work.iter()
                .map(|(_, loc, guard, nodes)| (*loc, self.verify_location(*loc, guard, nodes)))
                .collect()
        };

        let kind = self.variant.kind();
        let mut report = Report::new();
        report.warnings = resolution.warnings;
        for (loc, result) in results {
            for (path, positions) in result.failures {
                report.record_violation(self.model, kind, loc, path, positions);
            }
            for escape in result.escapes {
                report.record_escape(escape);
            }
        }
        report
    }

    fn verify_location(&self, location: Location, guard: &Guard, nodes: &BTreeSet<NodeId>) -> LocationResult {
        let mut result = LocationResult::default();
        for &node in nodes {
            let body = &self.model.function(node).body;
            let unprotected = unprotected_usages(&self.variant, body, guard.location, location);
            if unprotected.is_empty() {
                continue;
            }
            if let Some(path) = find_unprotected_path(&self.variant, self.model, location, guard.location, node) {
                result.failures.push((path, unprotected));
            }
        }
        result.escapes = self.return_escapes(location, guard.location);
        tracing::trace!(
            location = %location.name(self.model),
            failures = result.failures.len(),
            escapes = result.escapes.len(),
            "location verified"
        );
        result
    }

    /// Returns of `location` or `guard` anywhere in the program, whether or
    /// not the returning function otherwise uses the location.
    fn return_escapes(&self, location: Location, guard: Location) -> Vec<ReturnEscape> {
        let mut escapes = Vec::new();
        for node in self.model.nodes() {
            let func = self.model.function(node);
            if func.init {
                continue;
            }
            escapes.extend(
                func.body
                    .iter()
                    .filter(|i| i.pos.is_valid())
                    .filter(|i| self.variant.is_return_escape(&func.body, i, location, guard))
                    .map(|i| ReturnEscape {
                        location,
                        node,
                        pos: i.pos,
                    }),
            );
        }
        escapes
    }
}

/// Run every selected location kind over `model` and merge the reports.
pub fn check_program(model: &ProgramModel, options: &AnalyzerOptions) -> Report {
    let comments = CommentIndex::new(model);
    let mut report = Report::new();
    for kind in &options.variants {
        let partial = match kind {
            VariantKind::Globals => Analyzer::new(model, &comments, GlobalVariables)
                .parallel(options.parallel)
                .run(),
            VariantKind::Fields => Analyzer::new(model, &comments, StructFields)
                .parallel(options.parallel)
                .run(),
        };
        report.merge(partial);
    }
    report
}
