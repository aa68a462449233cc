mod common;

use common::*;
use mutex_check_core::{AnalyzerOptions, ResolutionWarning, check_program};
use mutex_check_ir::{InstrKind, Operand, TypeExpr};

const UNLOCKED_X: &str = "[mutex check] app/state.go:10 no call to lock/unlock";

#[test]
fn unlocked_write_reached_from_unlocked_caller_is_reported() {
    let mut fx = global_fixture("// X");
    let f = fx.b.function(fx.pkg, "example.com/app.F");
    let caller = fx.b.function(fx.pkg, "example.com/app.Caller");
    fx.b.access(f, fx.file, 10, Operand::Global(fx.x));
    fx.b.call(caller, fx.file, 20, f);
    let model = fx.b.finish().expect("model");

    let report = analyze(&model);
    assert_eq!(report.finding_lines(&model), vec![UNLOCKED_X.to_string()]);
    assert_eq!(report.violations().len(), 1);
    assert_eq!(
        report.violations()[0].signature,
        "example.com/app.F --> example.com/app.Caller"
    );
    assert!(report.warnings.is_empty());
}

#[test]
fn caller_holding_the_guard_protects_the_call() {
    let mut fx = global_fixture("// X");
    let f = fx.b.function(fx.pkg, "example.com/app.F");
    let caller = fx.b.function(fx.pkg, "example.com/app.Caller");
    fx.b.access(f, fx.file, 10, Operand::Global(fx.x));
    fx.b.method(caller, fx.file, 19, "Lock", Operand::Global(fx.guard));
    fx.b.call(caller, fx.file, 20, f);
    fx.b.method(caller, fx.file, 21, "Unlock", Operand::Global(fx.guard));
    let model = fx.b.finish().expect("model");

    assert!(lines(&model).is_empty());
}

#[test]
fn goroutine_entry_is_never_protected_by_the_spawner() {
    let mut fx = global_fixture("// X");
    let f = fx.b.function(fx.pkg, "example.com/app.F");
    let caller = fx.b.function(fx.pkg, "example.com/app.Caller");
    fx.b.access(f, fx.file, 10, Operand::Global(fx.x));
    fx.b.method(caller, fx.file, 19, "Lock", Operand::Global(fx.guard));
    fx.b.spawn(caller, fx.file, 20, f);
    fx.b.method(caller, fx.file, 21, "Unlock", Operand::Global(fx.guard));
    let model = fx.b.finish().expect("model");

    let report = analyze(&model);
    assert_eq!(report.finding_lines(&model), vec![UNLOCKED_X.to_string()]);
    assert_eq!(report.violations()[0].path.nodes.last(), Some(&f));
    assert_eq!(report.violations()[0].signature, "example.com/app.F");
}

#[test]
fn access_between_lock_and_unlock_is_protected() {
    let mut fx = global_fixture("// X");
    let f = fx.b.function(fx.pkg, "example.com/app.F");
    fx.b.method(f, fx.file, 9, "Lock", Operand::Global(fx.guard));
    fx.b.access(f, fx.file, 10, Operand::Global(fx.x));
    fx.b.method(f, fx.file, 11, "Unlock", Operand::Global(fx.guard));
    let model = fx.b.finish().expect("model");

    assert!(lines(&model).is_empty());
}

#[test]
fn deferred_unlock_protects_everything_after_lock() {
    let mut fx = global_fixture("// X");
    let f = fx.b.function(fx.pkg, "example.com/app.F");
    fx.b.method(f, fx.file, 9, "RLock", Operand::Global(fx.guard));
    fx.b.defer_method(f, fx.file, 10, "RUnlock", Operand::Global(fx.guard));
    fx.b.access(f, fx.file, 15, Operand::Global(fx.x));
    fx.b.access(f, fx.file, 40, Operand::Global(fx.x));
    let model = fx.b.finish().expect("model");

    assert!(lines(&model).is_empty());
}

#[test]
fn access_after_unlock_is_reported() {
    let mut fx = global_fixture("// X");
    let f = fx.b.function(fx.pkg, "example.com/app.F");
    fx.b.method(f, fx.file, 7, "Lock", Operand::Global(fx.guard));
    fx.b.method(f, fx.file, 8, "Unlock", Operand::Global(fx.guard));
    fx.b.access(f, fx.file, 10, Operand::Global(fx.x));
    let model = fx.b.finish().expect("model");

    assert_eq!(lines(&model), vec![UNLOCKED_X.to_string()]);
}

#[test]
fn same_chain_from_two_accesses_yields_one_line() {
    let mut fx = global_fixture("// X");
    let f = fx.b.function(fx.pkg, "example.com/app.F");
    let caller = fx.b.function(fx.pkg, "example.com/app.Caller");
    fx.b.access(f, fx.file, 10, Operand::Global(fx.x));
    fx.b.access(f, fx.file, 12, Operand::Global(fx.x));
    fx.b.call(caller, fx.file, 20, f);
    let model = fx.b.finish().expect("model");

    let report = analyze(&model);
    assert_eq!(report.finding_lines(&model), vec![UNLOCKED_X.to_string()]);
    assert_eq!(report.violations()[0].positions.len(), 2);
}

#[test]
fn missing_annotation_warns_without_hiding_other_findings() {
    let mut fx = global_fixture("");
    fx.b.global(fx.file, "H", Some(TypeExpr::qualified("sync", "RWMutex")), 6);
    fx.b.comment(fx.file, 6, "// Y");
    let y = fx.b.global(fx.file, "Y", Some(TypeExpr::named("int")), 7);
    let f = fx.b.function(fx.pkg, "example.com/app.F");
    fx.b.access(f, fx.file, 10, Operand::Global(fx.x));
    fx.b.access(f, fx.file, 11, Operand::Global(y));
    let model = fx.b.finish().expect("model");

    let report = analyze(&model);
    assert_eq!(
        report.warning_lines(&model),
        vec!["[mutex check] app/state.go:3 guard has no annotation naming the locations it protects".to_string()]
    );
    assert_eq!(
        report.finding_lines(&model),
        vec!["[mutex check] app/state.go:11 no call to lock/unlock".to_string()]
    );
}

#[test]
fn unresolved_name_keeps_earlier_names_and_drops_later_ones() {
    let mut fx = global_fixture("// X, Nope, Z");
    let z = fx.b.global(fx.file, "Z", Some(TypeExpr::named("int")), 5);
    let f = fx.b.function(fx.pkg, "example.com/app.F");
    fx.b.access(f, fx.file, 10, Operand::Global(fx.x));
    fx.b.access(f, fx.file, 11, Operand::Global(z));
    let model = fx.b.finish().expect("model");

    let report = analyze(&model);
    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(
        &report.warnings[0],
        ResolutionWarning::UnresolvedName { name, .. } if name == "Nope"
    ));
    assert_eq!(report.finding_lines(&model), vec![UNLOCKED_X.to_string()]);
}

#[test]
fn opted_out_guard_is_ignored_silently() {
    let mut fx = global_fixture("// nolint:mutex_check");
    let f = fx.b.function(fx.pkg, "example.com/app.F");
    fx.b.access(f, fx.file, 10, Operand::Global(fx.x));
    let model = fx.b.finish().expect("model");

    let report = analyze(&model);
    assert!(report.is_clean());
    assert!(report.warnings.is_empty());
}

#[test]
fn returning_the_location_is_flagged_even_when_locked() {
    let mut fx = global_fixture("// X");
    let f = fx.b.function(fx.pkg, "example.com/app.Snapshot");
    fx.b.method(f, fx.file, 9, "Lock", Operand::Global(fx.guard));
    fx.b.defer_method(f, fx.file, 10, "Unlock", Operand::Global(fx.guard));
    fx.b.ret(f, fx.file, 12, vec![Operand::Global(fx.x)]);
    let model = fx.b.finish().expect("model");

    assert_eq!(
        lines(&model),
        vec![
            "[mutex check] app/state.go:12 returns the guarded variable; restructure as a callback/visitor instead"
                .to_string()
        ]
    );
}

#[test]
fn returning_the_guard_is_flagged() {
    let mut fx = global_fixture("// X");
    let f = fx.b.function(fx.pkg, "example.com/app.Lockless");
    fx.b.method(f, fx.file, 9, "Lock", Operand::Global(fx.guard));
    fx.b.access(f, fx.file, 10, Operand::Global(fx.x));
    fx.b.method(f, fx.file, 11, "Unlock", Operand::Global(fx.guard));
    fx.b.ret(f, fx.file, 13, vec![Operand::Global(fx.guard)]);
    let model = fx.b.finish().expect("model");

    let report = analyze(&model);
    assert!(report.violations().is_empty());
    assert_eq!(report.escapes().len(), 1);
    assert_eq!(report.escapes()[0].pos.line, 13);
}

#[test]
fn function_that_only_returns_the_guard_is_flagged() {
    let mut fx = global_fixture("// X");
    let f = fx.b.function(fx.pkg, "example.com/app.Mu");
    fx.b.ret(f, fx.file, 12, vec![Operand::Global(fx.guard)]);
    let model = fx.b.finish().expect("model");

    assert_eq!(
        lines(&model),
        vec![
            "[mutex check] app/state.go:12 returns the guarded variable; restructure as a callback/visitor instead"
                .to_string()
        ]
    );
}

#[test]
fn returning_a_loaded_copy_of_the_location_is_flagged() {
    let mut fx = global_fixture("// X");
    let f = fx.b.function(fx.pkg, "example.com/app.Current");
    fx.b.method(f, fx.file, 9, "Lock", Operand::Global(fx.guard));
    fx.b.defer_method(f, fx.file, 10, "Unlock", Operand::Global(fx.guard));
    fx.b.load(f, fx.file, 11, 0, Operand::Global(fx.x));
    fx.b.ret(f, fx.file, 12, vec![Operand::Value(0)]);
    let model = fx.b.finish().expect("model");

    let report = analyze(&model);
    assert!(report.violations().is_empty());
    assert_eq!(report.escapes().len(), 1);
    assert_eq!(report.escapes()[0].pos.line, 12);
}

#[test]
fn returning_a_value_computed_from_the_location_is_not_flagged() {
    let mut fx = global_fixture("// X");
    let f = fx.b.function(fx.pkg, "example.com/app.Next");
    fx.b.method(f, fx.file, 9, "Lock", Operand::Global(fx.guard));
    fx.b.defer_method(f, fx.file, 10, "Unlock", Operand::Global(fx.guard));
    fx.b.load(f, fx.file, 11, 0, Operand::Global(fx.x));
    fx.b.def(
        f,
        fx.file,
        11,
        1,
        InstrKind::Other {
            operands: vec![Operand::Value(0), Operand::Const],
        },
    );
    fx.b.ret(f, fx.file, 12, vec![Operand::Value(1)]);
    let model = fx.b.finish().expect("model");

    assert!(analyze(&model).is_clean());
}

#[test]
fn initializers_are_not_analyzed() {
    let mut fx = global_fixture("// X");
    let init = fx.b.init_function(fx.pkg, "example.com/app.init");
    fx.b.access(init, fx.file, 10, Operand::Global(fx.x));
    let model = fx.b.finish().expect("model");

    assert!(lines(&model).is_empty());
}

#[test]
fn guards_outside_the_root_module_are_not_scanned() {
    let mut fx = global_fixture("// X");
    let f = fx.b.function(fx.pkg, "example.com/app.F");
    fx.b.access(f, fx.file, 10, Operand::Global(fx.x));
    let mut model = fx.b.finish().expect("model");
    model.restrict_to_module("example.com/other");

    assert!(analyze(&model).is_clean());
}

#[test]
fn parallel_and_sequential_runs_agree() {
    let mut fx = global_fixture("// X");
    let funcs: Vec<_> = (0..8)
        .map(|i| fx.b.function(fx.pkg, &format!("example.com/app.F{i}")))
        .collect();
    for (i, f) in funcs.iter().enumerate() {
        fx.b.access(*f, fx.file, 10 + i as u32, Operand::Global(fx.x));
    }
    let model = fx.b.finish().expect("model");

    let sequential = check_program(
        &model,
        &AnalyzerOptions {
            parallel: false,
            ..AnalyzerOptions::default()
        },
    );
    let parallel = check_program(&model, &AnalyzerOptions::default());
    assert_eq!(sequential.finding_lines(&model), parallel.finding_lines(&model));
    assert_eq!(sequential.finding_lines(&model).len(), 8);
}
