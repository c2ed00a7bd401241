use crate::{Interpreter, Value};
use pretty_assertions::assert_eq;

fn eval(source: &str) -> Value {
    let interp = Interpreter::new();
    interp
        .evaluate_script_string(source)
        .unwrap_or_else(|diags| panic!("evaluation failed for {source:?}: {diags:?}"))
}

#[test]
fn test_self_binds_on_outermost_only() {
    // `self` in a curried chain refers to the whole chain.
    let source = "f := fn a b -> if b == 0 then a else self (a + b) 0; f 1 2";
    assert_eq!(eval(source), Value::Number(3.0));
}

#[test]
fn test_call_forks_definition_environment() {
    // The closure sees its definition site, not the call site.
    let source = "x := 1; f := fn _ -> x; { x := 99; f 0 }";
    assert_eq!(eval(source), Value::Number(1.0));
}

#[test]
fn test_parameter_bindings_are_readonly() {
    let interp = Interpreter::new();
    let result = interp.evaluate_script_string("f := fn x -> { x = 2; x }; f 1");
    assert!(result.is_err());
}

#[test]
fn test_mut_parameter_allows_assignment() {
    assert_eq!(eval("f := fn mut x -> { x = x + 1; x }; f 41"), Value::Number(42.0));
}

#[test]
fn test_block_argument_is_thunked() {
    // The block argument runs when the callee invokes it, in caller scope.
    let source = "x := 10; call := fn thunk -> thunk (); call { x + 1 }";
    assert_eq!(eval(source), Value::Number(11.0));
}

#[test]
fn test_deep_recursion_does_not_overflow() {
    let source = "count := fn n -> if n == 0 then 0 else self(n - 1); count 20000";
    assert_eq!(eval(source), Value::Number(0.0));
}
