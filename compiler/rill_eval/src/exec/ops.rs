//! Strict operators: arithmetic, comparison, membership, indexing.
//!
//! All operands are already evaluated when these run. Typed fast paths
//! first, then a generic fallback that errors.

use crate::error::{self, EvalResult, RuntimeError};
use crate::exec::Vm;
use crate::value::Value;
use rill_ir::{BinaryOp, UnaryOp};

pub fn apply_binary(vm: &mut Vm, op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalResult {
    match op {
        BinaryOp::Add => add(vm, lhs, rhs),
        BinaryOp::Sub => numeric(op, lhs, rhs, |a, b| a - b),
        BinaryOp::Mul => numeric(op, lhs, rhs, |a, b| a * b),
        BinaryOp::Div => numeric(op, lhs, rhs, |a, b| a / b),
        BinaryOp::Rem => numeric(op, lhs, rhs, |a, b| a % b),
        BinaryOp::Pow => numeric(op, lhs, rhs, f64::powf),

        BinaryOp::Eq => Ok(Value::Bool(lhs.shallow_eq(rhs))),
        BinaryOp::NotEq => Ok(Value::Bool(!lhs.shallow_eq(rhs))),
        BinaryOp::DeepEq => Ok(Value::Bool(lhs.deep_eq(rhs))),
        BinaryOp::DeepNotEq => Ok(Value::Bool(!lhs.deep_eq(rhs))),

        BinaryOp::Lt => compare(op, lhs, rhs, |o| o.is_lt()),
        BinaryOp::LtEq => compare(op, lhs, rhs, |o| o.is_le()),
        BinaryOp::Gt => compare(op, lhs, rhs, |o| o.is_gt()),
        BinaryOp::GtEq => compare(op, lhs, rhs, |o| o.is_ge()),

        BinaryOp::In => contains(lhs, rhs),
    }
}

/// Addition is overloaded: numbers add, strings concatenate, and two
/// channels build a race channel carrying whichever value arrives first.
fn add(vm: &mut Vm, lhs: &Value, rhs: &Value) -> EvalResult {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::Str(a), Value::Str(b)) => Ok(Value::string(format!("{}{}", &**a, &**b))),
        (Value::Channel(a), Value::Channel(b)) => {
            let sched = vm.sched.clone();
            let raced = sched.borrow_mut().race(a, b);
            Ok(raced)
        }
        _ => Err(type_mismatch(BinaryOp::Add, lhs, rhs)),
    }
}

fn numeric(op: BinaryOp, lhs: &Value, rhs: &Value, f: impl Fn(f64, f64) -> f64) -> EvalResult {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(f(*a, *b))),
        _ => Err(type_mismatch(op, lhs, rhs)),
    }
}

fn compare(
    op: BinaryOp,
    lhs: &Value,
    rhs: &Value,
    f: impl Fn(std::cmp::Ordering) -> bool,
) -> EvalResult {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match a.partial_cmp(b) {
            Some(ordering) => Ok(Value::Bool(f(ordering))),
            // NaN comparisons are false across the board.
            None => Ok(Value::Bool(false)),
        },
        (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(f(a.as_str().cmp(b.as_str())))),
        _ => Err(type_mismatch(op, lhs, rhs)),
    }
}

/// `x in xs`: element membership for lists, key membership for records.
fn contains(needle: &Value, haystack: &Value) -> EvalResult {
    match haystack {
        Value::List(items) => Ok(Value::Bool(
            items.borrow().iter().any(|v| v.shallow_eq(needle)),
        )),
        Value::Record(entries) => Ok(Value::Bool(entries.borrow().contains_key(needle))),
        Value::Str(s) => match needle {
            Value::Str(sub) => Ok(Value::Bool(s.contains(sub.as_str()))),
            _ => Err(type_mismatch(BinaryOp::In, needle, haystack)),
        },
        _ => Err(type_mismatch(BinaryOp::In, needle, haystack)),
    }
}

pub fn apply_unary(vm: &mut Vm, op: UnaryOp, operand: Value) -> EvalResult {
    match op {
        UnaryOp::Neg => match operand {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(error::evaluation(format!(
                "cannot negate a {}",
                other.type_name()
            ))),
        },
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::Await => await_value(vm, operand),
    }
}

/// `await t`: the task's value, its error, or the cancellation marker;
/// suspends on a running task. Non-task values pass through.
fn await_value(vm: &mut Vm, operand: Value) -> EvalResult {
    use crate::sched::TaskStatus;
    match &operand {
        Value::Task(handle) => {
            let status = handle.borrow();
            match &status.status {
                TaskStatus::Done(v) => Ok(v.clone()),
                TaskStatus::Failed(e) => Err(e.clone()),
                TaskStatus::Cancelled => Ok(Value::Atom(vm.wk.cancelled)),
                TaskStatus::Running => {
                    drop(status);
                    Ok(crate::effect::raise(vm, vm.wk.awaiting, operand.clone()))
                }
            }
        }
        _ => Ok(operand),
    }
}

/// `target[index]` reads: list by integer, record by any key, prototype
/// tables for everything method-shaped. The `length` key is answered
/// directly for containers and strings.
pub fn index_value(vm: &mut Vm, target: &Value, index: &Value) -> EvalResult {
    let length_atom = vm.protos.length;

    match target {
        Value::Record(entries) => {
            if let Some(found) = entries.borrow().get(index) {
                return Ok(found.clone());
            }
            if index.as_atom() == Some(length_atom) {
                return Ok(Value::Number(entries.borrow().len() as f64));
            }
            // An absent record key reads as null, so `like` patterns and
            // presence checks compose without errors.
            Ok(Value::Null)
        }

        Value::List(items) => {
            match index {
                Value::Number(n) => {
                    let items = items.borrow();
                    if n.fract() != 0.0 || *n < 0.0 || (*n as usize) >= items.len() {
                        return Err(error::index_out_of_bounds(*n, items.len()));
                    }
                    Ok(items[*n as usize].clone())
                }
                Value::Atom(atom) => {
                    if *atom == length_atom {
                        return Ok(Value::Number(items.borrow().len() as f64));
                    }
                    // Result-shaped lists answer to the result prototype
                    // first, then the list prototype.
                    let is_result = {
                        let items = items.borrow();
                        items.len() == 2
                            && items[0]
                                .as_atom()
                                .is_some_and(|a| a == vm.wk.ok || a == vm.wk.error)
                    };
                    let method = if is_result {
                        vm.protos
                            .result
                            .get(atom)
                            .or_else(|| vm.protos.list.get(atom))
                    } else {
                        vm.protos.list.get(atom)
                    };
                    match method.cloned() {
                        Some(method) => super::call_value(vm, &method, target.clone()),
                        None => Err(error::invalid_index(target, index)),
                    }
                }
                _ => Err(error::invalid_index(target, index)),
            }
        }

        Value::Str(s) => match index {
            Value::Number(n) => {
                let chars: Vec<char> = s.chars().collect();
                if n.fract() != 0.0 || *n < 0.0 || (*n as usize) >= chars.len() {
                    return Err(error::index_out_of_bounds(*n, chars.len()));
                }
                Ok(Value::string(chars[*n as usize].to_string()))
            }
            Value::Atom(atom) => {
                if *atom == length_atom {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                match vm.protos.string.get(atom).cloned() {
                    Some(method) => super::call_value(vm, &method, target.clone()),
                    None => Err(error::invalid_index(target, index)),
                }
            }
            _ => Err(error::invalid_index(target, index)),
        },

        Value::Prototyped(p) => {
            for proto in &p.protos {
                if let Value::Record(entries) = proto {
                    if let Some(found) = entries.borrow().get(index).cloned() {
                        return super::call_value(vm, &found, p.inner.clone());
                    }
                }
            }
            index_value(vm, &p.inner.clone(), index)
        }

        other => Err(error::invalid_index_target(other)),
    }
}

fn type_mismatch(op: BinaryOp, lhs: &Value, rhs: &Value) -> RuntimeError {
    error::evaluation(format!(
        "cannot apply `{}` to {} and {}",
        op_symbol(op),
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Pow => "^",
        BinaryOp::Eq => "==",
        BinaryOp::NotEq => "!=",
        BinaryOp::DeepEq => "===",
        BinaryOp::DeepNotEq => "!==",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        BinaryOp::In => "in",
    }
}
