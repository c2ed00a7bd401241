//! Function application.
//!
//! A call forks the definition-site environment, binds `self` on the
//! outermost function of a curried chain, matches the argument against the
//! parameter pattern, and evaluates the body under the `return` / `fn-try`
//! handler frame that makes `return` and `try` work.

use std::rc::Rc;

use super::{bind_scope, NativeFn, Vm};
use crate::effect::{apply_frame, eval_then, Handlers};
use crate::error::{self, EvalResult};
use crate::stack::ensure_sufficient_stack;
use crate::value::{Heap, Value};

/// Invoke any callable value with one argument.
pub fn call_value(vm: &mut Vm, callee: &Value, arg: Value) -> EvalResult {
    match callee {
        Value::Native(native) => native.call(vm, arg),
        Value::Handler(inner) => call_value(vm, &inner.clone(), arg),
        Value::Fn(closure) => {
            let closure = closure.clone();
            let callee = callee.clone();
            // Cooperative yield at function entry; the continuation is the
            // call itself.
            let gate = vm.maybe_yield();
            eval_then(vm, gate, move |vm, _| {
                call_closure(vm, &closure, callee.clone(), arg.clone())
            })
        }
        other => Err(error::not_callable(other)),
    }
}

/// Invoke a user closure.
pub fn call_closure(
    vm: &mut Vm,
    closure: &Heap<super::Closure>,
    callee: Value,
    arg: Value,
) -> EvalResult {
    ensure_sufficient_stack(|| {
        let call_env = closure.env.fork();
        if closure.top {
            let self_name = vm.interner.intern("self");
            let _ = call_env.add_readonly(self_name, callee);
        }

        let m = (closure.param)(vm, &arg)?;
        if !m.matched {
            return Err(error::invalid_pattern(
                "the argument does not fit the parameter pattern",
            ));
        }
        bind_scope(&call_env, &m);

        let frame = function_frame(vm);
        let boundary = closure.env.clone();

        let saved = std::mem::replace(&mut vm.env, call_env);
        let out = (closure.body)(vm);
        vm.env = saved;

        apply_frame(vm, frame, boundary, out?)
    })
}

/// The handler frame installed around every function body:
/// - `return` aborts the body with its payload;
/// - `fn-try` resumes with its payload (the unwrapped `ok` value).
fn function_frame(vm: &Vm) -> Rc<Handlers> {
    let ret = Value::native(NativeFn::new("return-handler", |_, arg| {
        Ok(handler_payload(&arg))
    }));
    let fn_try = Value::native(NativeFn::new("fn-try-handler", |vm, arg| {
        let (kont, payload) = handler_parts(&arg);
        call_value(vm, &kont, payload)
    }));
    Rc::new(
        Handlers::new()
            .with_entry(vm.wk.ret, ret)
            .with_entry(vm.wk.fn_try, fn_try),
    )
}

/// Handlers receive `(continuation, payload)`; pull out the payload.
pub fn handler_payload(arg: &Value) -> Value {
    match arg {
        Value::List(items) => items.borrow().get(1).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Split a handler argument into continuation and payload.
pub fn handler_parts(arg: &Value) -> (Value, Value) {
    match arg {
        Value::List(items) => {
            let items = items.borrow();
            (
                items.first().cloned().unwrap_or(Value::Null),
                items.get(1).cloned().unwrap_or(Value::Null),
            )
        }
        _ => (Value::Null, Value::Null),
    }
}

#[cfg(test)]
mod tests;
