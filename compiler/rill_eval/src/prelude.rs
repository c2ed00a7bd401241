//! The prelude: the fixed readonly root environment.
//!
//! Provides the `break`/`continue`/`return` effect raisers, the `self`
//! placeholder, channel and task primitives, result constructors, and a
//! handful of conversions. Everything here is readonly; scripts shadow
//! rather than mutate.

use crate::atoms::WellKnown;
use crate::effect::make_raiser;
use crate::env::Env;
use crate::error::{self, EvalResult};
use crate::exec::{NativeFn, Vm};
use crate::sched::ChannelState;
use crate::value::{format_number, Value};
use rill_ir::StringInterner;

/// Install the prelude bindings into `env` (the root environment).
pub fn install(env: &Env, interner: &StringInterner, wk: WellKnown) {
    let bind = |name: &str, value: Value| {
        let _ = env.add_readonly(interner.intern(name), value);
    };

    bind("null", Value::Null);
    bind("self", Value::Null);

    // Control placeholders: effect raisers resolved by the nearest block,
    // loop, or function frame.
    bind("break", make_raiser(wk.brk, "break"));
    bind("continue", make_raiser(wk.cont, "continue"));
    bind("return", make_raiser(wk.ret, "return"));

    bind(
        "channel",
        Value::native(NativeFn::new("channel", |_, arg| {
            let name = match &arg {
                Value::Str(s) => s.to_string(),
                _ => "channel".to_string(),
            };
            Ok(Value::channel(ChannelState::new(name)))
        })),
    );

    bind(
        "close",
        Value::native(NativeFn::new("close", |vm, arg| match &arg {
            Value::Channel(handle) => {
                let sched = vm.sched.clone();
                sched.borrow_mut().close(handle);
                Ok(Value::Null)
            }
            other => Err(error::invalid_send_channel(other)),
        })),
    );

    bind(
        "cancel",
        Value::native(NativeFn::new("cancel", |vm, arg| match &arg {
            Value::Task(handle) => {
                let marker = Value::Atom(vm.wk.cancelled);
                let sched = vm.sched.clone();
                sched.borrow_mut().cancel(handle, &marker);
                Ok(Value::Null)
            }
            other => Err(error::evaluation(format!(
                "cancel needs a task, found {}",
                other.type_name()
            ))),
        })),
    );

    bind(
        "ok",
        Value::native(NativeFn::new("ok", |vm, arg| {
            Ok(Value::list(vec![Value::Atom(vm.wk.ok), arg]))
        })),
    );
    bind(
        "err",
        Value::native(NativeFn::new("err", |vm, arg| {
            Ok(Value::list(vec![Value::Atom(vm.wk.error), arg]))
        })),
    );

    bind(
        "handler",
        Value::native(NativeFn::new("handler", |_, arg| {
            if arg.is_callable() {
                Ok(Value::handler(arg))
            } else {
                Err(error::evaluation(format!(
                    "handler needs a function, found {}",
                    arg.type_name()
                )))
            }
        })),
    );

    bind(
        "prototype",
        Value::native(NativeFn::new("prototype", |_, inner| {
            Ok(Value::native(NativeFn::new("prototype", move |_, protos| {
                let protos = match &protos {
                    Value::List(items) => items.borrow().clone(),
                    Value::Record(_) => vec![protos.clone()],
                    other => {
                        return Err(error::evaluation(format!(
                            "prototype needs a record or list of records, found {}",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::prototyped(inner.clone(), protos))
            })))
        })),
    );

    bind(
        "print",
        Value::native(NativeFn::new("print", |vm, arg| {
            println!("{}", display_text(vm, &arg));
            Ok(arg)
        })),
    );

    bind(
        "length",
        Value::native(NativeFn::new("length", |_, arg| length_of(&arg))),
    );

    bind(
        "symbol",
        Value::native(NativeFn::new("symbol", |vm, arg| {
            let name = match &arg {
                Value::Str(s) => vm.interner.intern(s),
                _ => vm.interner.intern("symbol"),
            };
            let atom = vm.atoms.borrow_mut().fresh(name);
            Ok(Value::Atom(atom))
        })),
    );

    bind(
        "number",
        Value::native(NativeFn::new("number", |_, arg| {
            Ok(match &arg {
                Value::Number(_) => arg.clone(),
                Value::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                Value::Bool(b) => Value::Number(f64::from(u8::from(*b))),
                _ => Value::Null,
            })
        })),
    );

    bind(
        "string",
        Value::native(NativeFn::new("string", |vm, arg| {
            Ok(Value::string(display_text(vm, &arg)))
        })),
    );
}

/// Text form used by `print` and `string`: bare strings, rendered
/// everything else.
fn display_text(vm: &Vm, value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        Value::Number(n) => format_number(*n),
        other => other.render(&vm.atoms.borrow(), &vm.interner),
    }
}

fn length_of(value: &Value) -> EvalResult {
    match value {
        Value::List(items) => Ok(Value::Number(items.borrow().len() as f64)),
        Value::Str(s) => Ok(Value::Number(s.chars().count() as f64)),
        Value::Record(entries) => Ok(Value::Number(entries.borrow().len() as f64)),
        other => Err(error::evaluation(format!(
            "cannot take the length of a {}",
            other.type_name()
        ))),
    }
}
