use super::*;
use pretty_assertions::assert_eq;
use rill_ir::StringInterner;

fn parse_ok(source: &str) -> Parsed {
    let interner = StringInterner::new();
    let parsed = parse_source(source, &interner);
    assert!(
        !parsed.has_errors(),
        "unexpected parse errors for {source:?}: {:?}",
        parsed.diagnostics
    );
    parsed
}

fn top_kind(parsed: &Parsed, idx: usize) -> &ExprKind {
    &parsed.arena.get(parsed.top[idx]).kind
}

#[test]
fn test_parse_declarations() {
    let parsed = parse_ok("x := 1; y := 2; x + y");
    assert_eq!(parsed.top.len(), 3);
    assert!(matches!(top_kind(&parsed, 0), ExprKind::Declare { .. }));
    assert!(matches!(top_kind(&parsed, 1), ExprKind::Declare { .. }));
    assert!(matches!(
        top_kind(&parsed, 2),
        ExprKind::Binary {
            op: BinaryOp::Add,
            ..
        }
    ));
}

#[test]
fn test_newlines_separate_statements() {
    let parsed = parse_ok("x := 1\ny := 2\nx + y");
    assert_eq!(parsed.top.len(), 3);
}

#[test]
fn test_application_binds_tighter_than_mul() {
    // `n * self(n - 1)` must parse as n * (self (n - 1)).
    let parsed = parse_ok("n * self(n - 1)");
    let ExprKind::Binary {
        op: BinaryOp::Mul,
        rhs,
        ..
    } = top_kind(&parsed, 0)
    else {
        panic!("expected multiplication at top");
    };
    assert!(matches!(
        parsed.arena.get(*rhs).kind,
        ExprKind::Apply { .. }
    ));
}

#[test]
fn test_lambda_curries() {
    let parsed = parse_ok("fn a b -> a");
    let ExprKind::Fn { body, top, .. } = top_kind(&parsed, 0) else {
        panic!("expected lambda");
    };
    assert!(top);
    let ExprKind::Fn { top: inner_top, .. } = parsed.arena.get(*body).kind else {
        panic!("expected curried inner lambda");
    };
    assert!(!inner_top);
}

#[test]
fn test_lambda_tuple_param() {
    let parsed = parse_ok("fn (k, v) -> v");
    let ExprKind::Fn { param, .. } = top_kind(&parsed, 0) else {
        panic!("expected lambda");
    };
    assert!(matches!(parsed.arena.get(*param).kind, ExprKind::Tuple(_)));
}

#[test]
fn test_if_then_else() {
    let parsed = parse_ok("if n < 2 then 1 else n");
    let ExprKind::If { else_branch, .. } = top_kind(&parsed, 0) else {
        panic!("expected if");
    };
    assert!(else_branch.is_valid());
}

#[test]
fn test_if_without_else() {
    let parsed = parse_ok("if c then 1\nx");
    assert_eq!(parsed.top.len(), 2);
    let ExprKind::If { else_branch, .. } = top_kind(&parsed, 0) else {
        panic!("expected if");
    };
    assert!(!else_branch.is_valid());
}

#[test]
fn test_send_receive_forms() {
    let parsed = parse_ok("async ch <- 42; <- ch");
    let ExprKind::Async(body) = top_kind(&parsed, 0) else {
        panic!("expected async");
    };
    assert!(matches!(parsed.arena.get(*body).kind, ExprKind::Send { .. }));
    assert!(matches!(top_kind(&parsed, 1), ExprKind::Receive(_)));
}

#[test]
fn test_try_variants() {
    let parsed = parse_ok("ch <-? 1; ?<- ch");
    assert!(matches!(top_kind(&parsed, 0), ExprKind::TrySend { .. }));
    assert!(matches!(top_kind(&parsed, 1), ExprKind::TryReceive(_)));
}

#[test]
fn test_record_vs_block_braces() {
    let record = parse_ok("{a: 1, b: 2}");
    assert!(matches!(top_kind(&record, 0), ExprKind::Tuple(_)));

    let block = parse_ok("{ f 7; 99 }");
    assert!(matches!(top_kind(&block, 0), ExprKind::Block(_)));
}

#[test]
fn test_tuple_with_spread() {
    let parsed = parse_ok("(1, 2, ...[3, 4], 5)");
    let ExprKind::Tuple(range) = top_kind(&parsed, 0) else {
        panic!("expected tuple");
    };
    let elements = parsed.arena.list(*range);
    assert_eq!(elements.len(), 4);
    assert!(matches!(
        parsed.arena.get(elements[2]).kind,
        ExprKind::Spread(_)
    ));
}

#[test]
fn test_record_with_spread() {
    let parsed = parse_ok("{a: 1, b: 2, ...{c: 3}}");
    let ExprKind::Tuple(range) = top_kind(&parsed, 0) else {
        panic!("expected record tuple");
    };
    let elements = parsed.arena.list(*range);
    assert_eq!(elements.len(), 3);
    assert!(matches!(
        parsed.arena.get(elements[0]).kind,
        ExprKind::Labeled { .. }
    ));
    assert!(matches!(
        parsed.arena.get(elements[2]).kind,
        ExprKind::Spread(_)
    ));
}

#[test]
fn test_grouping_vs_one_tuple() {
    let grouping = parse_ok("(1)");
    assert!(matches!(top_kind(&grouping, 0), ExprKind::Parens(_)));

    let one_tuple = parse_ok("(1,)");
    assert!(matches!(top_kind(&one_tuple, 0), ExprKind::Tuple(_)));
}

#[test]
fn test_empty_parens_is_empty_list() {
    let parsed = parse_ok("()");
    let ExprKind::Parens(child) = top_kind(&parsed, 0) else {
        panic!("expected parens");
    };
    assert!(!child.is_valid());
}

#[test]
fn test_dynamic_lookup_vs_list() {
    let lookup = parse_ok("[\"x\"]");
    assert!(matches!(top_kind(&lookup, 0), ExprKind::Brackets(_)));

    let list = parse_ok("[1, 2, 3]");
    assert!(matches!(top_kind(&list, 0), ExprKind::Tuple(_)));
}

#[test]
fn test_index_vs_list_argument() {
    // Flush bracket indexes; spaced bracket is an application argument.
    let indexed = parse_ok("a[0]");
    assert!(matches!(top_kind(&indexed, 0), ExprKind::Index { .. }));

    let applied = parse_ok("f [1, 2]");
    assert!(matches!(top_kind(&applied, 0), ExprKind::Apply { .. }));
}

#[test]
fn test_field_access_is_atom_index() {
    let parsed = parse_ok("xs.map k");
    let ExprKind::Apply { func, .. } = top_kind(&parsed, 0) else {
        panic!("expected application");
    };
    let ExprKind::Index { index, .. } = parsed.arena.get(*func).kind else {
        panic!("expected index for field access");
    };
    assert!(matches!(parsed.arena.get(index).kind, ExprKind::Atom(_)));
}

#[test]
fn test_inject_with_handler_record() {
    let parsed = parse_ok("inject { throw: fn (k, v) -> v } do { throw 7; 99 }");
    let ExprKind::Inject { handlers, body } = top_kind(&parsed, 0) else {
        panic!("expected inject");
    };
    assert!(matches!(
        parsed.arena.get(*handlers).kind,
        ExprKind::Tuple(_)
    ));
    assert!(matches!(parsed.arena.get(*body).kind, ExprKind::Block(_)));
}

#[test]
fn test_match_arms() {
    let parsed = parse_ok("match x { 1 -> :one, _ -> :other }");
    let ExprKind::Match { arms, .. } = top_kind(&parsed, 0) else {
        panic!("expected match");
    };
    assert_eq!(parsed.arena.list(*arms).len(), 2);
}

#[test]
fn test_atom_literals() {
    let parsed = parse_ok("(:ok, v)");
    let ExprKind::Tuple(range) = top_kind(&parsed, 0) else {
        panic!("expected tuple");
    };
    let elements = parsed.arena.list(*range);
    assert!(matches!(parsed.arena.get(elements[0]).kind, ExprKind::Atom(_)));
}

#[test]
fn test_label_form() {
    let parsed = parse_ok("label outer loop { outer.break 1 }");
    let ExprKind::CodeLabel { body, .. } = top_kind(&parsed, 0) else {
        panic!("expected label");
    };
    assert!(matches!(parsed.arena.get(*body).kind, ExprKind::Loop { .. }));
}

#[test]
fn test_mask_without() {
    let parsed = parse_ok("mask [:log] do body; without [:log] do body");
    assert!(matches!(top_kind(&parsed, 0), ExprKind::Mask { .. }));
    assert!(matches!(top_kind(&parsed, 1), ExprKind::Without { .. }));
}

#[test]
fn test_parallel() {
    let parsed = parse_ok("parallel (a, b, c)");
    let ExprKind::Parallel(range) = top_kind(&parsed, 0) else {
        panic!("expected parallel");
    };
    assert_eq!(parsed.arena.list(*range).len(), 3);
}

#[test]
fn test_for_and_while() {
    let parsed = parse_ok("for x in xs do x; while c do b");
    assert!(matches!(top_kind(&parsed, 0), ExprKind::For { .. }));
    assert!(matches!(top_kind(&parsed, 1), ExprKind::While { .. }));
}

#[test]
fn test_pattern_forms() {
    let parsed = parse_ok("mut x := 1; (a, ...rest) := xs; ^y @ z := w");
    assert!(matches!(top_kind(&parsed, 0), ExprKind::Declare { .. }));
    let ExprKind::Declare { pattern, .. } = top_kind(&parsed, 0) else {
        panic!();
    };
    assert!(matches!(parsed.arena.get(*pattern).kind, ExprKind::MutPat(_)));

    let ExprKind::Declare { pattern, .. } = top_kind(&parsed, 2) else {
        panic!();
    };
    assert!(matches!(parsed.arena.get(*pattern).kind, ExprKind::Bind { .. }));
}

#[test]
fn test_export_forms() {
    let parsed = parse_ok("export x := 1; export 42");
    let ExprKind::Export { pattern, .. } = top_kind(&parsed, 0) else {
        panic!("expected export");
    };
    assert!(pattern.is_valid());
    let ExprKind::Export { pattern, .. } = top_kind(&parsed, 1) else {
        panic!("expected export");
    };
    assert!(!pattern.is_valid());
}

#[test]
fn test_import() {
    let parsed = parse_ok("m := import \"lib/math\"");
    let ExprKind::Declare { value, .. } = top_kind(&parsed, 0) else {
        panic!("expected declare");
    };
    assert!(matches!(parsed.arena.get(*value).kind, ExprKind::Import(_)));
}

#[test]
fn test_unbalanced_bracket_reports() {
    let interner = StringInterner::new();
    let parsed = parse_source("(1, 2", &interner);
    assert!(parsed.has_errors());
    assert!(parsed
        .diagnostics
        .iter()
        .any(|d| d.code == ErrorCode::E0004 || d.code == ErrorCode::E0001));
}

#[test]
fn test_short_circuit_ops() {
    let parsed = parse_ok("a and b or c");
    assert!(matches!(top_kind(&parsed, 0), ExprKind::Or { .. }));
}

#[test]
fn test_power_right_assoc() {
    let parsed = parse_ok("2 ^ 3 ^ 2");
    let ExprKind::Binary {
        op: BinaryOp::Pow,
        lhs,
        ..
    } = top_kind(&parsed, 0)
    else {
        panic!("expected power");
    };
    // Right-associative: lhs is the literal 2, rhs the nested power.
    assert!(matches!(parsed.arena.get(*lhs).kind, ExprKind::Number(_)));
}

#[test]
fn test_deep_equality_ops() {
    let parsed = parse_ok("a === b; a !== b");
    assert!(matches!(
        top_kind(&parsed, 0),
        ExprKind::Binary {
            op: BinaryOp::DeepEq,
            ..
        }
    ));
}

#[test]
fn test_is_in_condition() {
    let parsed = parse_ok("if e is (a, b) then a else 0");
    let ExprKind::If { cond, .. } = top_kind(&parsed, 0) else {
        panic!("expected if");
    };
    assert!(matches!(parsed.arena.get(*cond).kind, ExprKind::Is { .. }));
}
