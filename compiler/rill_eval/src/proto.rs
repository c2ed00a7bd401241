//! Prototype method tables for strings, lists, and results.
//!
//! Consulted by `index` when the receiver is not a record. Entries take
//! the receiver and return either a finished value (`xs.length`,
//! `r.is_ok`) or a bound function awaiting its argument (`xs.map k`), so
//! method access composes with the language's curried application.

use rustc_hash::FxHashMap;
use std::rc::Rc;

use crate::atoms::{Atom, AtomTable};
use crate::effect::{eval_then, push_step};
use crate::error::{self, EvalResult};
use crate::exec::{call_value, NativeFn, Vm};
use crate::value::Value;
use rill_ir::StringInterner;

/// The static method tables, loaded once at interpreter startup.
pub struct Prototypes {
    pub length: Atom,
    pub string: FxHashMap<Atom, Value>,
    pub list: FxHashMap<Atom, Value>,
    pub result: FxHashMap<Atom, Value>,
}

/// A method that finishes on binding: `receiver -> value`.
fn method1(
    name: &'static str,
    f: impl Fn(&mut Vm, Value) -> EvalResult + 'static,
) -> Value {
    Value::native(NativeFn::new(name, f))
}

/// A method with one argument: `receiver -> argument -> value`.
fn method2(
    name: &'static str,
    f: impl Fn(&mut Vm, Value, Value) -> EvalResult + Clone + 'static,
) -> Value {
    Value::native(NativeFn::new(name, move |_, receiver| {
        let f = f.clone();
        Ok(Value::native(NativeFn::new(name, move |vm, arg| {
            f(vm, receiver.clone(), arg.clone())
        })))
    }))
}

/// A method with two curried arguments: `receiver -> a -> b -> value`.
fn method3(
    name: &'static str,
    f: impl Fn(&mut Vm, Value, Value, Value) -> EvalResult + Clone + 'static,
) -> Value {
    Value::native(NativeFn::new(name, move |_, receiver| {
        let f = f.clone();
        Ok(Value::native(NativeFn::new(name, move |_, a| {
            let f = f.clone();
            let receiver = receiver.clone();
            let a = a.clone();
            Ok(Value::native(NativeFn::new(name, move |vm, b| {
                f(vm, receiver.clone(), a.clone(), b.clone())
            })))
        })))
    }))
}

impl Prototypes {
    pub fn build(atoms: &mut AtomTable, interner: &StringInterner) -> Self {
        let mut atom = |s: &str| atoms.of_name(interner.intern(s));

        let mut list = FxHashMap::default();
        list.insert(atom("map"), method2("map", list_map));
        list.insert(atom("filter"), method2("filter", list_filter));
        list.insert(atom("fold"), method3("fold", list_fold));
        list.insert(atom("push"), method2("push", list_push));
        list.insert(atom("pop"), method1("pop", list_pop));
        list.insert(atom("slice"), method2("slice", list_slice));
        list.insert(atom("contains"), method2("contains", list_contains));
        list.insert(atom("join"), method2("join", list_join));
        list.insert(atom("first"), method1("first", list_first));
        list.insert(atom("rest"), method1("rest", list_rest));

        let mut string = FxHashMap::default();
        string.insert(atom("slice"), method2("slice", string_slice));
        string.insert(atom("split"), method2("split", string_split));
        string.insert(atom("concat"), method2("concat", string_concat));
        string.insert(atom("contains"), method2("contains", string_contains));
        string.insert(atom("char_at"), method2("char_at", string_char_at));

        let mut result = FxHashMap::default();
        result.insert(atom("map"), method2("map", result_map));
        result.insert(atom("flat_map"), method2("flat_map", result_flat_map));
        result.insert(atom("unwrap_or"), method2("unwrap_or", result_unwrap_or));
        result.insert(
            atom("is_ok"),
            method1("is_ok", move |vm, r| {
                Ok(Value::Bool(result_tag(vm, &r) == Some(vm.wk.ok)))
            }),
        );
        result.insert(
            atom("is_error"),
            method1("is_error", move |vm, r| {
                Ok(Value::Bool(result_tag(vm, &r) == Some(vm.wk.error)))
            }),
        );
        Prototypes {
            length: atom("length"),
            string,
            list,
            result,
        }
    }
}

// List methods

fn items_of(receiver: &Value) -> Result<Rc<Vec<Value>>, crate::error::RuntimeError> {
    match receiver {
        Value::List(items) => Ok(Rc::new(items.borrow().clone())),
        other => Err(error::evaluation(format!(
            "expected a list receiver, found {}",
            other.type_name()
        ))),
    }
}

fn list_map(vm: &mut Vm, receiver: Value, f: Value) -> EvalResult {
    let items = items_of(&receiver)?;
    map_step(vm, items, f, 0, Vec::new())
}

/// Resumable map: an effect raised mid-iteration (a suspension or a
/// multi-shot continuation, as in `xs.map k`) carries the rest of the
/// iteration with it.
fn map_step(vm: &mut Vm, items: Rc<Vec<Value>>, f: Value, from: usize, acc: Vec<Value>) -> EvalResult {
    let mut acc = acc;
    for i in from..items.len() {
        let out = call_value(vm, &f, items[i].clone())?;
        if let Value::Effect(eff) = out {
            let items2 = items.clone();
            let f2 = f.clone();
            let acc2 = acc.clone();
            let next = i + 1;
            push_step(vm, &eff, move |vm, v| {
                let mut acc = acc2.clone();
                acc.push(v);
                map_step(vm, items2.clone(), f2.clone(), next, acc)
            });
            return Ok(Value::Effect(eff));
        }
        acc.push(out);
    }
    Ok(Value::list(acc))
}

fn list_filter(vm: &mut Vm, receiver: Value, f: Value) -> EvalResult {
    let items = items_of(&receiver)?;
    filter_step(vm, items, f, 0, Vec::new())
}

fn filter_step(
    vm: &mut Vm,
    items: Rc<Vec<Value>>,
    f: Value,
    from: usize,
    acc: Vec<Value>,
) -> EvalResult {
    let mut acc = acc;
    for i in from..items.len() {
        let keep = call_value(vm, &f, items[i].clone())?;
        if let Value::Effect(eff) = keep {
            let items2 = items.clone();
            let f2 = f.clone();
            let acc2 = acc.clone();
            let item = items[i].clone();
            let next = i + 1;
            push_step(vm, &eff, move |vm, keep| {
                let mut acc = acc2.clone();
                if keep.is_truthy() {
                    acc.push(item.clone());
                }
                filter_step(vm, items2.clone(), f2.clone(), next, acc)
            });
            return Ok(Value::Effect(eff));
        }
        if keep.is_truthy() {
            acc.push(items[i].clone());
        }
    }
    Ok(Value::list(acc))
}

fn list_fold(vm: &mut Vm, receiver: Value, init: Value, f: Value) -> EvalResult {
    let items = items_of(&receiver)?;
    fold_step(vm, items, f, 0, init)
}

fn fold_step(vm: &mut Vm, items: Rc<Vec<Value>>, f: Value, from: usize, acc: Value) -> EvalResult {
    let mut acc = acc;
    for i in from..items.len() {
        let partial = call_value(vm, &f, acc.clone())?;
        let item = items[i].clone();
        let step = eval_then(vm, partial, move |vm, g| call_value(vm, &g, item.clone()))?;
        if let Value::Effect(eff) = step {
            let items2 = items.clone();
            let f2 = f.clone();
            let next = i + 1;
            push_step(vm, &eff, move |vm, acc| {
                fold_step(vm, items2.clone(), f2.clone(), next, acc)
            });
            return Ok(Value::Effect(eff));
        }
        acc = step;
    }
    Ok(acc)
}

fn list_push(_: &mut Vm, receiver: Value, item: Value) -> EvalResult {
    match &receiver {
        Value::List(items) => {
            items.borrow_mut().push(item);
            Ok(receiver.clone())
        }
        other => Err(error::evaluation(format!(
            "expected a list receiver, found {}",
            other.type_name()
        ))),
    }
}

fn list_pop(_: &mut Vm, receiver: Value) -> EvalResult {
    match &receiver {
        Value::List(items) => Ok(items.borrow_mut().pop().unwrap_or(Value::Null)),
        other => Err(error::evaluation(format!(
            "expected a list receiver, found {}",
            other.type_name()
        ))),
    }
}

fn bounds_of(arg: &Value, len: usize) -> Option<(usize, usize)> {
    let clamp = |n: f64| (n.max(0.0) as usize).min(len);
    match arg {
        Value::Number(start) => Some((clamp(*start), len)),
        Value::List(pair) => {
            let pair = pair.borrow();
            match (pair.first(), pair.get(1)) {
                (Some(Value::Number(start)), Some(Value::Number(end))) => {
                    Some((clamp(*start), clamp(*end)))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn list_slice(_: &mut Vm, receiver: Value, arg: Value) -> EvalResult {
    let Value::List(items) = &receiver else {
        return Err(error::evaluation("expected a list receiver"));
    };
    let items = items.borrow();
    let Some((start, end)) = bounds_of(&arg, items.len()) else {
        return Err(error::evaluation(
            "slice needs a start number or a (start, end) pair",
        ));
    };
    Ok(Value::list(items[start..end.max(start)].to_vec()))
}

fn list_contains(_: &mut Vm, receiver: Value, needle: Value) -> EvalResult {
    let Value::List(items) = &receiver else {
        return Err(error::evaluation("expected a list receiver"));
    };
    Ok(Value::Bool(
        items.borrow().iter().any(|v| v.shallow_eq(&needle)),
    ))
}

fn list_join(_: &mut Vm, receiver: Value, sep: Value) -> EvalResult {
    let Value::List(items) = &receiver else {
        return Err(error::evaluation("expected a list receiver"));
    };
    let Value::Str(sep) = &sep else {
        return Err(error::evaluation("join needs a string separator"));
    };
    let mut parts = Vec::new();
    for item in items.borrow().iter() {
        match item {
            Value::Str(s) => parts.push(s.to_string()),
            other => {
                return Err(error::evaluation(format!(
                    "join needs a list of strings, found {}",
                    other.type_name()
                )))
            }
        }
    }
    Ok(Value::string(parts.join(sep)))
}

fn list_first(_: &mut Vm, receiver: Value) -> EvalResult {
    let Value::List(items) = &receiver else {
        return Err(error::evaluation("expected a list receiver"));
    };
    Ok(items.borrow().first().cloned().unwrap_or(Value::Null))
}

fn list_rest(_: &mut Vm, receiver: Value) -> EvalResult {
    let Value::List(items) = &receiver else {
        return Err(error::evaluation("expected a list receiver"));
    };
    let items = items.borrow();
    Ok(Value::list(items.iter().skip(1).cloned().collect()))
}

// String methods

fn string_of(receiver: &Value) -> Result<String, crate::error::RuntimeError> {
    match receiver {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(error::evaluation(format!(
            "expected a string receiver, found {}",
            other.type_name()
        ))),
    }
}

fn string_slice(_: &mut Vm, receiver: Value, arg: Value) -> EvalResult {
    let s = string_of(&receiver)?;
    let chars: Vec<char> = s.chars().collect();
    let Some((start, end)) = bounds_of(&arg, chars.len()) else {
        return Err(error::evaluation(
            "slice needs a start number or a (start, end) pair",
        ));
    };
    Ok(Value::string(
        chars[start..end.max(start)].iter().collect::<String>(),
    ))
}

fn string_split(_: &mut Vm, receiver: Value, sep: Value) -> EvalResult {
    let s = string_of(&receiver)?;
    let Value::Str(sep) = &sep else {
        return Err(error::evaluation("split needs a string separator"));
    };
    Ok(Value::list(
        s.split(sep.as_str()).map(Value::string).collect(),
    ))
}

fn string_concat(_: &mut Vm, receiver: Value, other: Value) -> EvalResult {
    let s = string_of(&receiver)?;
    let t = string_of(&other)?;
    Ok(Value::string(format!("{s}{t}")))
}

fn string_contains(_: &mut Vm, receiver: Value, needle: Value) -> EvalResult {
    let s = string_of(&receiver)?;
    let Value::Str(needle) = &needle else {
        return Err(error::evaluation("contains needs a string argument"));
    };
    Ok(Value::Bool(s.contains(needle.as_str())))
}

fn string_char_at(_: &mut Vm, receiver: Value, index: Value) -> EvalResult {
    let s = string_of(&receiver)?;
    let Value::Number(n) = index else {
        return Err(error::evaluation("char_at needs a number"));
    };
    let chars: Vec<char> = s.chars().collect();
    if n.fract() != 0.0 || n < 0.0 || (n as usize) >= chars.len() {
        return Err(error::index_out_of_bounds(n, chars.len()));
    }
    Ok(Value::string(chars[n as usize].to_string()))
}

// Result methods over `(:ok, v)` / `(:error, e)` lists

fn result_tag(vm: &Vm, value: &Value) -> Option<Atom> {
    let Value::List(items) = value else {
        return None;
    };
    let items = items.borrow();
    if items.len() != 2 {
        return None;
    }
    items[0]
        .as_atom()
        .filter(|&a| a == vm.wk.ok || a == vm.wk.error)
}

fn result_parts(value: &Value) -> (Value, Value) {
    match value {
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

fn result_map(vm: &mut Vm, receiver: Value, f: Value) -> EvalResult {
    match result_tag(vm, &receiver) {
        Some(tag) if tag == vm.wk.ok => {
            let (_, inner) = result_parts(&receiver);
            let mapped = call_value(vm, &f, inner)?;
            eval_then(vm, mapped, move |vm, mapped| {
                Ok(Value::list(vec![Value::Atom(vm.wk.ok), mapped]))
            })
        }
        Some(_) => Ok(receiver),
        None => Err(error::evaluation("expected an ok/error result receiver")),
    }
}

fn result_flat_map(vm: &mut Vm, receiver: Value, f: Value) -> EvalResult {
    match result_tag(vm, &receiver) {
        Some(tag) if tag == vm.wk.ok => {
            let (_, inner) = result_parts(&receiver);
            call_value(vm, &f, inner)
        }
        Some(_) => Ok(receiver),
        None => Err(error::evaluation("expected an ok/error result receiver")),
    }
}

fn result_unwrap_or(vm: &mut Vm, receiver: Value, default: Value) -> EvalResult {
    match result_tag(vm, &receiver) {
        Some(tag) if tag == vm.wk.ok => Ok(result_parts(&receiver).1),
        Some(_) => Ok(default),
        None => Err(error::evaluation("expected an ok/error result receiver")),
    }
}
