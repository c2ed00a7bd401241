//! End-to-end scenarios driven through the parser from source text.

use rill_eval::{Interpreter, Value};

fn eval(source: &str) -> (Interpreter, Value) {
    let interp = Interpreter::new();
    let value = interp
        .evaluate_script_string(source)
        .unwrap_or_else(|diags| panic!("evaluation failed for {source:?}: {diags:?}"));
    (interp, value)
}

fn rendered(source: &str) -> String {
    let (interp, value) = eval(source);
    interp.render(&value)
}

#[test]
fn scenario_addition() {
    assert_eq!(rendered("x := 1; y := 2; x + y"), "3");
}

#[test]
fn scenario_factorial() {
    assert_eq!(
        rendered("fact := fn n -> if n < 2 then 1 else n * self(n - 1); fact 5"),
        "120"
    );
}

#[test]
fn scenario_channel_round_trip() {
    assert_eq!(rendered("ch := channel(\"t\"); async ch <- 42; <- ch"), "42");
}

#[test]
fn scenario_handler_ignores_continuation() {
    assert_eq!(
        rendered("inject { throw: fn (k, v) -> v } do { throw 7; 99 }"),
        "7"
    );
}

#[test]
fn scenario_multi_shot_resume() {
    assert_eq!(
        rendered("inject { amb: fn (k, xs) -> xs.map k } do { x := amb [1,2,3]; x * 10 }"),
        "[10, 20, 30]"
    );
}

#[test]
fn scenario_spread_builders() {
    assert_eq!(rendered("(1,2,...[3,4],5)"), "[1, 2, 3, 4, 5]");
    assert_eq!(rendered("{a: 1, b: 2, ...{c: 3}}"), "{a: 1, b: 2, c: 3}");
}

#[test]
fn scenario_deterministic_single_task() {
    let source = "xs := (1, 2, 3); xs.fold 0 (fn acc x -> acc + x * 10)";
    let first = rendered(source);
    for _ in 0..5 {
        assert_eq!(rendered(source), first);
    }
}

#[test]
fn scenario_compiled_script_reuse() {
    let interp = Interpreter::new();
    let script = interp
        .compile_script_string("1 + 2")
        .unwrap_or_else(|d| panic!("{d:?}"));
    for _ in 0..3 {
        let value = interp.run_script(&script).unwrap_or_else(|e| panic!("{e:?}"));
        assert_eq!(value, Value::Number(3.0));
    }
}
