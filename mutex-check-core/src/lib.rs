#![forbid(unsafe_code)]

mod analyzer;
mod annotation;
mod fields;
mod globals;
mod guard;
mod variant;

pub mod ancestor;
pub mod interval;
pub mod report;
pub mod usage;

pub use analyzer::{Analyzer, AnalyzerOptions, check_program};
pub use ancestor::{CallPath, find_unprotected_path};
pub use annotation::{ANALYZER_NAME, Annotation, Resolution, ResolutionWarning, ResolveContext, parse_annotation};
pub use fields::StructFields;
pub use globals::GlobalVariables;
pub use guard::{Guard, GuardMap, Location};
pub use interval::{LockInterval, LockIntervals, unprotected_usages};
pub use report::{Report, ReturnEscape, Violation};
pub use usage::{UsageMap, collect_usages};
pub use variant::{GuardOp, GuardOpKind, Variant, VariantKind};
