use crate::{Interpreter, Value};
use pretty_assertions::assert_eq;
use rill_diagnostic::ErrorCode;

fn eval(source: &str) -> Value {
    let interp = Interpreter::new();
    interp
        .evaluate_script_string(source)
        .unwrap_or_else(|diags| panic!("evaluation failed for {source:?}: {diags:?}"))
}

fn eval_rendered(source: &str) -> String {
    let interp = Interpreter::new();
    let value = interp
        .evaluate_script_string(source)
        .unwrap_or_else(|diags| panic!("evaluation failed for {source:?}: {diags:?}"));
    interp.render(&value)
}

fn eval_error(source: &str) -> ErrorCode {
    let interp = Interpreter::new();
    match interp.evaluate_script_string(source) {
        Ok(v) => panic!("expected an error for {source:?}, got {:?}", interp.render(&v)),
        Err(diags) => diags.first().map(|d| d.code).unwrap_or(ErrorCode::E3001),
    }
}

fn num(source: &str) -> f64 {
    match eval(source) {
        Value::Number(n) => n,
        other => panic!("expected a number for {source:?}, got {other:?}"),
    }
}

// Arithmetic and bindings

#[test]
fn test_declarations_and_addition() {
    assert_eq!(num("x := 1; y := 2; x + y"), 3.0);
}

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(num("1 + 2 * 3"), 7.0);
    assert_eq!(num("2 ^ 3 ^ 2"), 512.0);
    assert_eq!(num("10 % 3"), 1.0);
    assert_eq!(num("-(2 + 3)"), -5.0);
}

#[test]
fn test_string_concat() {
    assert_eq!(eval_rendered("\"foo\" + \"bar\""), "\"foobar\"");
}

#[test]
fn test_equality_operators() {
    assert_eq!(eval("1 == 1"), Value::Bool(true));
    assert_eq!(eval("(1, 2) == (1, 2)"), Value::Bool(false));
    assert_eq!(eval("(1, 2) === (1, 2)"), Value::Bool(true));
    assert_eq!(eval("xs := (1, 2); xs == xs"), Value::Bool(true));
    assert_eq!(eval("not true"), Value::Bool(false));
}

#[test]
fn test_repeated_evaluation_is_deterministic() {
    let source = "fact := fn n -> if n < 2 then 1 else n * self(n - 1); fact 5";
    for _ in 0..3 {
        assert_eq!(num(source), 120.0);
    }
}

// Functions

#[test]
fn test_factorial_via_self() {
    assert_eq!(
        num("fact := fn n -> if n < 2 then 1 else n * self(n - 1); fact 5"),
        120.0
    );
}

#[test]
fn test_curried_functions() {
    assert_eq!(num("add := fn a b -> a + b; add 2 3"), 5.0);
    assert_eq!(num("add := fn a b -> a + b; inc := add 1; inc 41"), 42.0);
}

#[test]
fn test_tuple_parameter() {
    assert_eq!(num("swap := fn (a, b) -> (b, a); first := fn (a, b) -> a; first(swap (1, 2))"), 2.0);
}

#[test]
fn test_return_exits_function() {
    assert_eq!(num("f := fn x -> { return 7; 99 }; f 0"), 7.0);
}

#[test]
fn test_not_callable_error() {
    assert_eq!(eval_error("x := 1; x 2"), ErrorCode::E2008);
}

// Scope

#[test]
fn test_block_scope_hygiene() {
    assert_eq!(eval_error("{ a := 1; a }; a"), ErrorCode::E2001);
    assert_eq!(num("x := 1; { x := 2; x }"), 2.0);
    assert_eq!(num("x := 1; { x := 2; null }; x"), 1.0);
}

#[test]
fn test_immutable_assignment_fails() {
    assert_eq!(eval_error("x := 1; x = 2"), ErrorCode::E2003);
}

#[test]
fn test_mut_allows_assignment() {
    assert_eq!(num("mut x := 1; x = 2; x"), 2.0);
}

#[test]
fn test_undeclared_assignment_suggests() {
    let interp = Interpreter::new();
    let diags = interp
        .evaluate_script_string("length_total := 1; lenght_total = 2")
        .err()
        .unwrap_or_default();
    assert_eq!(diags[0].code, ErrorCode::E2002);
    assert!(diags[0].notes.iter().any(|n| n.contains("length_total")));
}

#[test]
fn test_dynamic_name_lookup() {
    assert_eq!(num("x := 41; [\"x\"] + 1"), 42.0);
}

// Control flow

#[test]
fn test_if_else() {
    assert_eq!(num("if true then 1 else 2"), 1.0);
    assert_eq!(num("if false then 1 else 2"), 2.0);
    assert_eq!(eval("if false then 1"), Value::Null);
}

#[test]
fn test_if_is_binds_in_true_branch() {
    assert_eq!(num("v := (1, 2); if v is (a, b) then a + b else 0"), 3.0);
}

#[test]
fn test_is_expression() {
    assert_eq!(eval("(1, 2) is (a, b)"), Value::Bool(true));
    assert_eq!(eval("1 is (a, b)"), Value::Bool(false));
}

#[test]
fn test_short_circuit_and_or() {
    // The probe raises an effect; short-circuiting must never evaluate it.
    assert_eq!(
        eval("inject { probe: fn (k, v) -> :raised } do { false and probe 1 }"),
        Value::Bool(false)
    );
    assert_eq!(
        eval("inject { probe: fn (k, v) -> :raised } do { true or probe 1 }"),
        Value::Bool(true)
    );
    assert_eq!(
        eval_rendered("inject { probe: fn (k, v) -> :raised } do { true and probe 1 }"),
        ":raised"
    );
}

#[test]
fn test_match_arms() {
    assert_eq!(
        eval_rendered("match 2 { 1 -> :one, 2 -> :two, _ -> :other }"),
        ":two"
    );
    assert_eq!(
        eval_rendered("match (1, 2) { (a, b) -> a + b, _ -> 0 }"),
        "3"
    );
    assert_eq!(eval_error("match 5 { 1 -> :one }"), ErrorCode::E3001);
}

#[test]
fn test_loop_break() {
    assert_eq!(num("loop { break 5 }"), 5.0);
}

#[test]
fn test_while_loop() {
    assert_eq!(num("mut i := 0; while i < 3 do { i += 1 }; i"), 3.0);
}

#[test]
fn test_for_collects_body_values() {
    assert_eq!(eval_rendered("for x in (1, 2, 3) do x * 2"), "[2, 4, 6]");
}

#[test]
fn test_for_break_stops_iteration() {
    assert_eq!(
        eval_rendered("for x in (1, 2, 3, 4) do { if x == 3 then break 0; x }"),
        "[1, 2]"
    );
}

#[test]
fn test_label_break() {
    assert_eq!(num("label outer loop { outer.break 7 }"), 7.0);
}

#[test]
fn test_label_targets_outer_loop() {
    let source = "
        mut total := 0
        label outer for x in (1, 2, 3) do {
            if x == 2 then outer.break 0
            total += x
        }
        total
    ";
    assert_eq!(num(source), 1.0);
}

// Tuples, records, indexing

#[test]
fn test_tuple_spread() {
    assert_eq!(eval_rendered("(1, 2, ...[3, 4], 5)"), "[1, 2, 3, 4, 5]");
}

#[test]
fn test_record_spread() {
    assert_eq!(
        eval_rendered("{a: 1, b: 2, ...{c: 3}}"),
        "{a: 1, b: 2, c: 3}"
    );
}

#[test]
fn test_record_later_key_wins() {
    assert_eq!(eval_rendered("{a: 1, ...{a: 5, b: 2}}"), "{a: 5, b: 2}");
}

#[test]
fn test_lone_spread_propagates() {
    assert_eq!(eval_rendered("xs := (1, 2); (...xs)"), "[1, 2]");
}

#[test]
fn test_index_reads() {
    assert_eq!(num("xs := (10, 20, 30); xs[1]"), 20.0);
    assert_eq!(num("r := {a: 7}; r.a"), 7.0);
    assert_eq!(num("r := {a: 7}; r[:a]"), 7.0);
    assert_eq!(eval_rendered("\"abc\"[1]"), "\"b\"");
}

#[test]
fn test_index_errors() {
    assert_eq!(eval_error("xs := (1, 2); xs[5]"), ErrorCode::E1006);
    assert_eq!(eval_error("1[0]"), ErrorCode::E1007);
}

#[test]
fn test_absent_record_key_is_null() {
    assert_eq!(eval("r := {a: 1}; r.b"), Value::Null);
}

#[test]
fn test_index_assignment() {
    assert_eq!(eval_rendered("xs := (1, 2, 3); xs[1] = 9; xs"), "[1, 9, 3]");
    assert_eq!(eval_rendered("r := {a: 1}; r[:b] = 2; r"), "{a: 1, b: 2}");
}

#[test]
fn test_length_and_methods() {
    assert_eq!(num("xs := (1, 2, 3); xs.length"), 3.0);
    assert_eq!(num("\"hello\".length"), 5.0);
    assert_eq!(eval_rendered("(1, 2, 3).map (fn x -> x + 1)"), "[2, 3, 4]");
    assert_eq!(eval_rendered("(1, 2, 3, 4).filter (fn x -> x % 2 == 0)"), "[2, 4]");
    assert_eq!(num("(1, 2, 3).fold 0 (fn acc x -> acc + x)"), 6.0);
    assert_eq!(eval_rendered("\"a,b,c\".split \",\""), "[\"a\", \"b\", \"c\"]");
}

// Patterns

#[test]
fn test_tuple_pattern_with_spread() {
    assert_eq!(
        eval_rendered("(a, b, ...rest) := (1, 2, 3, 4); (a, b, rest)"),
        "[1, 2, [3, 4]]"
    );
}

#[test]
fn test_tuple_pattern_right_anchored_suffix() {
    assert_eq!(
        eval_rendered("(first, ...mid, last) := (1, 2, 3, 4, 5); (first, mid, last)"),
        "[1, [2, 3, 4], 5]"
    );
}

#[test]
fn test_record_pattern() {
    assert_eq!(
        eval_rendered("{a: x, ...r} := {a: 1, b: 2, c: 3}; (x, r)"),
        "[1, {b: 2, c: 3}]"
    );
}

#[test]
fn test_record_pattern_default() {
    assert_eq!(num("{a: x, b: y = 9} := {a: 1}; x + y"), 10.0);
}

#[test]
fn test_like_relaxes_missing_fields() {
    assert_eq!(
        eval("v := {a: 1}; v is like {a: x, b: y}"),
        Value::Bool(true)
    );
    assert_eq!(eval("v := {a: 1}; v is {a: x, b: y}"), Value::Bool(false));
}

#[test]
fn test_pin_pattern() {
    assert_eq!(
        eval_rendered("x := 1; match 1 { ^x -> :yes, _ -> :no }"),
        ":yes"
    );
    assert_eq!(
        eval_rendered("x := 1; match 2 { ^x -> :yes, _ -> :no }"),
        ":no"
    );
}

#[test]
fn test_bind_pattern() {
    assert_eq!(
        eval_rendered("whole @ (a, b) := (1, 2); (whole, a, b)"),
        "[[1, 2], 1, 2]"
    );
}

#[test]
fn test_not_pattern() {
    assert_eq!(eval_rendered("match 5 { not 3 -> :not_three }"), ":not_three");
}

#[test]
fn test_atom_pattern() {
    assert_eq!(
        eval_rendered("match :ok { :ok -> :matched, _ -> :no }"),
        ":matched"
    );
}

#[test]
fn test_pattern_round_trip() {
    // Matching a value and rebuilding it from the bound names reproduces it.
    assert_eq!(
        eval_rendered("v := (1, \"x\", (2, 3)); (a, b, c) := v; (a, b, c) === v"),
        "true"
    );
}

#[test]
fn test_compound_increment() {
    assert_eq!(num("mut x := 1; x += 2; x"), 3.0);
    assert_eq!(eval_rendered("mut s := \"a\"; s += \"b\"; s"), "\"ab\"");
    assert_eq!(
        eval_rendered("(mut a, mut b) := (1, 2); (a, b) += (10, 20); (a, b)"),
        "[11, 22]"
    );
    assert_eq!(eval_error("mut x := true; x += 1"), ErrorCode::E2004);
}

// Effects and handlers

#[test]
fn test_handler_ignoring_continuation() {
    assert_eq!(
        num("inject { throw: fn (k, v) -> v } do { throw 7; 99 }"),
        7.0
    );
}

#[test]
fn test_multi_shot_resume() {
    assert_eq!(
        eval_rendered("inject { amb: fn (k, xs) -> xs.map k } do { x := amb [1, 2, 3]; x * 10 }"),
        "[10, 20, 30]"
    );
}

#[test]
fn test_multi_shot_worlds_are_independent() {
    // Mutations in the k-th resumption must be invisible to the (k+1)-th.
    assert_eq!(
        eval_rendered(
            "inject { amb: fn (k, xs) -> xs.map k } do { mut c := 0; x := amb [1, 2, 3]; c += x; c }"
        ),
        "[1, 2, 3]"
    );
}

#[test]
fn test_single_shot_resume() {
    assert_eq!(
        num("inject { ask: fn (k, v) -> k (v + 1) } do { ask 41 }"),
        42.0
    );
}

#[test]
fn test_deep_handler_reenters_frame() {
    // The second raise happens while resuming the first; a deep handler
    // still intercepts it.
    assert_eq!(
        num("inject { tick: fn (k, v) -> k (v + 1) } do { a := tick 0; b := tick a; b }"),
        2.0
    );
}

#[test]
fn test_handler_locality() {
    // The inner inject lacks the tag, so the outer one handles it.
    assert_eq!(
        num("inject { t: fn (k, v) -> v } do { inject { other: fn (k, v) -> 0 } do { t 7 } }"),
        7.0
    );
}

#[test]
fn test_inner_handler_wins() {
    assert_eq!(
        num("inject { t: fn (k, v) -> 1 } do { inject { t: fn (k, v) -> 2 } do { t 0 } }"),
        2.0
    );
}

#[test]
fn test_return_handler_applies_to_completion() {
    assert_eq!(
        num("inject { return: fn v -> v + 1 } do { 41 }"),
        42.0
    );
}

#[test]
fn test_identity_handler_is_transparent() {
    // A handler that resumes unchanged is observationally absent.
    assert_eq!(
        num("inject { t: fn (k, v) -> k v } do { x := 1; y := 2; x + y }"),
        3.0
    );
}

#[test]
fn test_mask_skips_inner_handler() {
    let source = "
        inject { t: fn (k, v) -> :outer } do {
            inject { t: fn (k, v) -> :inner } do {
                mask [:t] do { t 0 }
            }
        }
    ";
    assert_eq!(eval_rendered(source), ":outer");
}

#[test]
fn test_without_fails_on_escape() {
    assert_eq!(
        eval_error("inject { t: fn (k, v) -> v } do { without [:t] do { t 1 } }"),
        ErrorCode::E3003
    );
}

#[test]
fn test_without_passes_clean_body() {
    assert_eq!(num("inject { t: fn (k, v) -> v } do { without [:t] do 5 }"), 5.0);
}

#[test]
fn test_unhandled_effect_errors() {
    assert_eq!(eval_error("break 1"), ErrorCode::E3002);
}

#[test]
fn test_try_unwraps_ok() {
    assert_eq!(num("f := fn x -> { y := try x; y + 1 }; f (ok 41)"), 42.0);
}

#[test]
fn test_try_returns_error() {
    assert_eq!(
        eval_rendered("f := fn x -> { y := try x; y + 1 }; f (err \"nope\")"),
        "[:error, \"nope\"]"
    );
}

#[test]
fn test_try_passes_plain_values() {
    assert_eq!(num("f := fn x -> { y := try x; y + 1 }; f 41"), 42.0);
}

#[test]
fn test_result_prototype() {
    assert_eq!(eval("(ok 1).is_ok"), Value::Bool(true));
    assert_eq!(eval("(err 1).is_error"), Value::Bool(true));
    assert_eq!(eval_rendered("(ok 2).map (fn x -> x * 2)"), "[:ok, 4]");
    assert_eq!(num("(err :bad).unwrap_or 9"), 9.0);
}

#[test]
fn test_handler_wrapped_function() {
    // `handler f` earmarks a callable; inject unwraps it transparently.
    assert_eq!(
        num("h := handler (fn (k, v) -> v); inject { t: h } do { t 7 }"),
        7.0
    );
}

#[test]
fn test_prototyped_value_method_lookup() {
    let source = "
        greeter := { greet: fn self_ -> fn name -> self_ + name }
        p := prototype \"hello \" greeter
        (p.greet) \"world\"
    ";
    assert_eq!(eval_rendered(source), "\"hello world\"");
}

#[test]
fn test_prototyped_falls_back_to_inner() {
    assert_eq!(num("p := prototype (1, 2, 3) (); p[1]"), 2.0);
}

// Channels and tasks

#[test]
fn test_async_send_receive() {
    assert_eq!(num("ch := channel(\"t\"); async ch <- 42; <- ch"), 42.0);
}

#[test]
fn test_channel_fifo_order() {
    assert_eq!(
        eval_rendered("ch := channel(\"f\"); async { ch <- 1; ch <- 2 }; (<- ch, <- ch)"),
        "[1, 2]"
    );
}

#[test]
fn test_try_send_receive_statuses() {
    assert_eq!(
        eval_rendered("ch := channel(\"c\"); ch <- 1; (?<- ch, ?<- ch)"),
        "[[:ok, 1], :none]"
    );
    assert_eq!(
        eval_rendered("ch := channel(\"c\"); close ch; ?<- ch"),
        ":closed"
    );
    assert_eq!(
        eval_rendered("ch := channel(\"c\"); (ch <-? 1, { close ch; ch <-? 2 })"),
        "[:ok, :closed]"
    );
}

#[test]
fn test_send_to_closed_channel_errors() {
    assert_eq!(eval_error("ch := channel(\"c\"); close ch; ch <- 1"), ErrorCode::E1010);
}

#[test]
fn test_close_rejects_pending_receiver() {
    let source = "
        ch := channel(\"c\")
        t := async { <- ch }
        closer := async close ch
        await t
    ";
    assert_eq!(eval_error(source), ErrorCode::E1010);
}

#[test]
fn test_await_task_value() {
    assert_eq!(num("t := async 1 + 1; await t"), 2.0);
}

#[test]
fn test_parallel_returns_handles_in_order() {
    assert_eq!(
        eval_rendered("ts := parallel (1 + 1, 2 + 2); (await ts[0], await ts[1])"),
        "[2, 4]"
    );
}

#[test]
fn test_channel_race_addition() {
    let source = "
        a := channel(\"a\")
        b := channel(\"b\")
        both := a + b
        async a <- :left
        <- both
    ";
    assert_eq!(eval_rendered(source), ":left");
}

#[test]
fn test_cancel_task() {
    let source = "
        ch := channel(\"c\")
        t := async { <- ch }
        canceller := async cancel t
        await t
    ";
    assert_eq!(eval_rendered(source), ":cancelled");
}

#[test]
fn test_cancel_cascades_to_children() {
    let source = "
        ch := channel(\"c\")
        parent := async { child := async { <- ch }; await child }
        canceller := async cancel parent
        await parent
    ";
    assert_eq!(eval_rendered(source), ":cancelled");
}

#[test]
fn test_deadlock_detected() {
    assert_eq!(eval_error("ch := channel(\"c\"); <- ch"), ErrorCode::E3004);
}

#[test]
fn test_interleaving_between_tasks() {
    // Both workers make progress; neither starves the other.
    let source = "
        ch := channel(\"c\")
        a := async { ch <- 1; ch <- 2 }
        (<- ch, <- ch)
    ";
    assert_eq!(eval_rendered(source), "[1, 2]");
}

// Modules

#[test]
fn test_module_exports_in_order() {
    let interp = Interpreter::new();
    let module = interp
        .evaluate_module_string("export a := 1; export b := 2; c := 3", "m")
        .unwrap_or_else(|d| panic!("{d:?}"));
    assert_eq!(interp.render(&module), "{a: 1, b: 2}");
}

#[test]
fn test_module_default_export() {
    let interp = Interpreter::new();
    let module = interp
        .evaluate_module_string("export x := 1; export 42", "m")
        .unwrap_or_else(|d| panic!("{d:?}"));
    assert_eq!(interp.render(&module), "{x: 1, default: 42}");
}

#[test]
fn test_duplicate_default_export_fails() {
    let interp = Interpreter::new();
    let diags = interp
        .evaluate_module_string("export 1; export 2", "m")
        .err()
        .unwrap_or_default();
    assert_eq!(diags[0].code, ErrorCode::E2006);
}

#[test]
fn test_export_outside_module_fails() {
    assert_eq!(eval_error("export x := 1"), ErrorCode::E3001);
}

#[test]
fn test_import_uses_loader() {
    use crate::modules::{LoadedModule, ModuleLoader};

    struct SevenLoader;
    impl ModuleLoader for SevenLoader {
        fn load(&mut self, name: &str, _from: &str) -> Result<LoadedModule, String> {
            match name {
                "seven" => Ok(LoadedModule::Script(Value::Number(7.0))),
                other => Err(format!("unknown module {other}")),
            }
        }
    }

    let interp = Interpreter::builder().loader(SevenLoader).build();
    let value = interp
        .evaluate_script_string("m := import \"seven\"; m + 1")
        .unwrap_or_else(|d| panic!("{d:?}"));
    assert_eq!(value, Value::Number(8.0));
}

#[test]
fn test_import_failure_reports() {
    assert_eq!(eval_error("import \"missing\""), ErrorCode::E2007);
}
