//! Diagnostic collector behavior: deterministic ordering, recoverability,
//! idempotence, and the strict compile entry point.

mod common;
use common::{B, analyze, check_messages};

use ceres::diagnostics::{AnalysisPass, CompileError};
use ceres::facts::TypeFacts;

#[test]
fn diagnostics_order_by_source_position_across_passes() {
    // The Final violation sits earlier in the module than the readonly
    // violation; reconciliation orders by position, not by pass.
    let mut b = B::new();
    let fin_ann = b.final_ann("int");
    let one = b.int(1);
    let fin_decl = b.ann_assign("x", fin_ann, Some(one));
    let two = b.int(2);
    let reassign = b.assign("x", two);
    let empty = b.list(vec![]);
    let ro_ann = b.readonly_ann("int");
    let ro_decl = b.ann_assign("l", ro_ann, Some(empty));
    let inc = b.int(1);
    let aug = b.aug_assign("l", inc);
    let f = b.func("f", vec![], vec![ro_decl, aug]);
    let module = b.module("foo", vec![fin_decl, reassign, f]);

    let analysis = analyze(&module);
    check_messages(
        &analysis,
        &[
            "Cannot assign to a Final variable",
            "Cannot modify readonly reference 'l' via aug assign",
        ],
    );
}

#[test]
fn readonly_sorts_before_final_at_equal_position() {
    // One aug-assign violates both analyses at the same span: the readonly
    // diagnostic must come first.
    let mut b = B::new();
    let fin_ann = b.final_ann("int");
    let one = b.int(1);
    let fin_decl = b.ann_assign("x", fin_ann, Some(one));
    let empty = b.list(vec![]);
    let wrapped = b.readonly(empty);
    let narrowing = b.assign("x", wrapped);
    let inc = b.int(1);
    let aug = b.aug_assign("x", inc);
    let module = b.module("foo", vec![fin_decl, narrowing, aug]);

    let analysis = analyze(&module);
    // The narrowing assignment violates Final first; the aug-assign then
    // violates both analyses at the same span, readonly first.
    check_messages(
        &analysis,
        &[
            "Cannot assign to a Final variable",
            "Cannot modify readonly reference 'x' via aug assign",
            "Cannot assign to a Final variable",
        ],
    );
    let diags: Vec<_> = analysis.diagnostics.iter().collect();
    assert_eq!(diags[1].span, diags[2].span);
    assert_eq!(diags[1].pass, AnalysisPass::Readonly);
    assert_eq!(diags[2].pass, AnalysisPass::Final);
}

#[test]
fn analysis_recovers_and_reports_every_violation() {
    let mut b = B::new();
    let fin_ann = b.final_ann("int");
    let one = b.int(1);
    let decl = b.ann_assign("x", fin_ann, Some(one));
    let two = b.int(2);
    let first = b.assign("x", two);
    let three = b.int(3);
    let second = b.assign("x", three);
    let four = b.int(4);
    let third = b.aug_assign("x", four);
    let module = b.module("foo", vec![decl, first, second, third]);

    let analysis = analyze(&module);
    assert_eq!(analysis.diagnostics.matching("Cannot assign to a Final variable").len(), 3);
}

#[test]
fn running_the_analysis_twice_is_idempotent() {
    let mut b = B::new();
    let fin_ann = b.final_ann("int");
    let one = b.int(1);
    let decl = b.ann_assign("x", fin_ann, Some(one));
    let two = b.int(2);
    let reassign = b.assign("x", two);
    let module = b.module("foo", vec![decl, reassign]);

    let first = analyze(&module);
    let second = analyze(&module);
    let first_msgs: Vec<String> =
        first.diagnostics.messages().iter().map(|m| m.to_string()).collect();
    let second_msgs: Vec<String> =
        second.diagnostics.messages().iter().map(|m| m.to_string()).collect();
    assert_eq!(first_msgs, second_msgs);
    assert_eq!(first.diagnostics.len(), second.diagnostics.len());
}

#[test]
fn compile_module_rejects_units_with_diagnostics() {
    let mut b = B::new();
    let fin_ann = b.final_ann("int");
    let one = b.int(1);
    let decl = b.ann_assign("x", fin_ann, Some(one));
    let two = b.int(2);
    let reassign = b.assign("x", two);
    let module = b.module("foo", vec![decl, reassign]);

    let err = ceres::compile_module(&module, &TypeFacts::new()).unwrap_err();
    match err {
        CompileError::QualifierErrors { count, first } => {
            assert_eq!(count, 1);
            assert!(first.contains("Cannot assign to a Final variable"));
        }
        other => panic!("expected QualifierErrors, got {other:?}"),
    }
}

#[test]
fn compile_module_passes_clean_units_through() {
    let mut b = B::new();
    let fin_ann = b.final_ann("int");
    let one = b.int(21);
    let decl = b.ann_assign("X", fin_ann, Some(one));
    let x_read = b.name("X");
    let three = b.int(3);
    let sum = b.bin(x_read, ceres::ast::BinOp::Add, three);
    let y = b.assign("y", sum);
    let module = b.module("foo", vec![decl, y]);

    let analysis = ceres::compile_module(&module, &TypeFacts::new()).unwrap();
    assert_eq!(analysis.final_constant_names(), vec!["X"]);
    assert!(!analysis.selections.is_empty());
}

#[test]
fn malformed_ast_is_fatal() {
    // nonlocal reaching no binding anywhere is a frontend contract
    // violation, not a diagnostic.
    let mut b = B::new();
    let nl = b.nonlocal_stmt(&["ghost"]);
    let zero = b.int(0);
    let rebind = b.assign("ghost", zero);
    let inner = b.func("inner", vec![], vec![nl, rebind]);
    let outer = b.func("outer", vec![], vec![inner]);
    let module = b.module("foo", vec![outer]);

    let err = ceres::analyze_module(&module, &TypeFacts::new()).unwrap_err();
    assert!(matches!(err, CompileError::MalformedAst { .. }));
}
