#![allow(dead_code)]

use mutex_check_core::{AnalyzerOptions, Report, check_program};
use mutex_check_ir::{FileId, GlobalId, PackageId, ProgramBuilder, ProgramModel, TypeExpr};

pub const PKG: &str = "example.com/app";
pub const FILE: &str = "app/state.go";

/// `var G sync.Mutex // <annotation>` on line 3 and `var X int` on line 4.
pub struct GlobalFixture {
    pub b: ProgramBuilder,
    pub pkg: PackageId,
    pub file: FileId,
    pub guard: GlobalId,
    pub x: GlobalId,
}

pub fn global_fixture(annotation: &str) -> GlobalFixture {
    let mut b = ProgramBuilder::new();
    let pkg = b.package(PKG);
    let file = b.file(pkg, FILE);
    let guard = b.global(file, "G", Some(TypeExpr::qualified("sync", "Mutex")), 3);
    if !annotation.is_empty() {
        b.comment(file, 3, annotation);
    }
    let x = b.global(file, "X", Some(TypeExpr::named("int")), 4);
    GlobalFixture {
        b,
        pkg,
        file,
        guard,
        x,
    }
}

pub fn analyze(model: &ProgramModel) -> Report {
    check_program(
        model,
        &AnalyzerOptions {
            parallel: false,
            ..AnalyzerOptions::default()
        },
    )
}

pub fn lines(model: &ProgramModel) -> Vec<String> {
    analyze(model).finding_lines(model)
}
