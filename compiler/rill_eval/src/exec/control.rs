//! Control flow: statement sequencing, blocks, loops, labels, match arms,
//! and task fan-out.
//!
//! Blocks are the control-flow workhorse: each one opens a lexical scope
//! and installs `break`/`continue` handlers. The loop forms desugar onto
//! blocks (`loop b` is `block { b; continue() }`), so `break v` yields `v`
//! from the nearest block and `continue` re-enters its body. The common
//! break/continue case is dispatched inline to keep iteration flat; the
//! generic handler pair exists for effects that resume later.

use std::rc::Rc;

use super::{bind_scope, Compiled, NativeFn, Vm};
use crate::effect::{apply_frame, eval_then, push_step, raise, run_steps, Handlers};
use crate::error::{self, EvalResult};
use crate::pattern::CompiledPattern;
use crate::value::Value;
use rill_ir::{Name, Span};

/// Run statements in order; the sequence's value is the last statement's
/// value (null when empty). Resumable: a suspended statement carries the
/// rest of the sequence with it.
pub fn run_seq(vm: &mut Vm, stmts: Rc<Vec<Compiled>>, from: usize, mut last: Value) -> EvalResult {
    for i in from..stmts.len() {
        let value = stmts[i](vm)?;
        match value {
            Value::Effect(eff) => {
                let stmts2 = stmts.clone();
                let next = i + 1;
                push_step(vm, &eff, move |vm, v| {
                    run_seq(vm, stmts2.clone(), next, v)
                });
                return Ok(Value::Effect(eff));
            }
            v => last = v,
        }
    }
    Ok(last)
}

/// Run a block: fresh scope, `break`/`continue` handlers, statement
/// sequencing. The imperative loop handles the direct back-edge without
/// growing the stack; anything else falls through to the handler frame.
pub fn run_block_frame(vm: &mut Vm, stmts: Rc<Vec<Compiled>>) -> EvalResult {
    let wk = vm.wk;
    let boundary = vm.env.clone();
    loop {
        let scope = boundary.fork();
        let saved = std::mem::replace(&mut vm.env, scope);
        let out = run_seq(vm, stmts.clone(), 0, Value::Null);
        vm.env = saved;

        match out? {
            Value::Effect(eff) if eff.tag == wk.brk && eff.masked.get() == 0 => {
                return Ok(eff.payload.clone());
            }
            Value::Effect(eff) if eff.tag == wk.cont && eff.masked.get() == 0 => {
                // Loop back-edge: yield if another task is runnable.
                if vm.sched.borrow().has_ready() {
                    let stmts2 = stmts.clone();
                    let gate = raise(vm, wk.yld, Value::Null);
                    if let Value::Effect(gate_eff) = &gate {
                        push_step(vm, gate_eff, move |vm, _| {
                            run_block_frame(vm, stmts2.clone())
                        });
                    }
                    return Ok(gate);
                }
                continue;
            }
            Value::Effect(eff) => {
                let handlers = block_handlers(stmts.clone(), wk);
                return apply_frame(vm, handlers, boundary, Value::Effect(eff));
            }
            v => return Ok(v),
        }
    }
}

/// The deep break/continue handler pair, used when a block's effect
/// suspends elsewhere and resumes back into the frame.
fn block_handlers(stmts: Rc<Vec<Compiled>>, wk: crate::atoms::WellKnown) -> Rc<Handlers> {
    let break_h = Value::native(NativeFn::new("break-handler", |_, arg| {
        Ok(super::call::handler_payload(&arg))
    }));
    let cont_h = Value::native(NativeFn::new("continue-handler", move |vm, _| {
        let stmts = stmts.clone();
        let gate = vm.maybe_yield();
        eval_then(vm, gate, move |vm, _| run_block_frame(vm, stmts.clone()))
    }));
    Rc::new(
        Handlers::new()
            .with_entry(wk.brk, break_h)
            .with_entry(wk.cont, cont_h),
    )
}

/// Run a labelled body: `label name body`.
///
/// Creates a fresh pair of label symbols, binds `name` to a record with
/// `break`/`continue` raisers targeting exactly this frame, and runs the
/// body with the corresponding handlers installed.
pub fn run_label(vm: &mut Vm, name: Name, body: Compiled, wk: crate::atoms::WellKnown) -> EvalResult {
    let (brk, cnt) = {
        let mut atoms = vm.atoms.borrow_mut();
        (atoms.fresh(name), atoms.fresh(name))
    };

    let mut record = crate::value::Record::default();
    record.insert(
        Value::Atom(wk.brk),
        crate::effect::make_raiser(brk, "label-break"),
    );
    record.insert(
        Value::Atom(wk.cont),
        crate::effect::make_raiser(cnt, "label-continue"),
    );
    let label_value = Value::record(record);

    run_label_frame(vm, name, label_value, body, brk, cnt)
}

fn run_label_frame(
    vm: &mut Vm,
    name: Name,
    label_value: Value,
    body: Compiled,
    brk: crate::atoms::Atom,
    cnt: crate::atoms::Atom,
) -> EvalResult {
    let boundary = vm.env.clone();
    loop {
        let scope = boundary.fork();
        let _ = scope.add_readonly(name, label_value.clone());
        let saved = std::mem::replace(&mut vm.env, scope);
        let out = body(vm);
        vm.env = saved;

        match out? {
            Value::Effect(eff) if eff.tag == brk => return Ok(eff.payload.clone()),
            Value::Effect(eff) if eff.tag == cnt => continue,
            Value::Effect(eff) => {
                let break_h = Value::native(NativeFn::new("label-break-handler", |_, arg| {
                    Ok(super::call::handler_payload(&arg))
                }));
                let body2 = body.clone();
                let label2 = label_value.clone();
                let cont_h = Value::native(NativeFn::new("label-continue-handler", move |vm, _| {
                    run_label_frame(vm, name, label2.clone(), body2.clone(), brk, cnt)
                }));
                let handlers = Rc::new(
                    Handlers::new()
                        .with_entry(brk, break_h)
                        .with_entry(cnt, cont_h),
                );
                return apply_frame(vm, handlers, boundary, Value::Effect(eff));
            }
            v => return Ok(v),
        }
    }
}

/// One `for` loop, iterating a snapshot of the list.
///
/// Each iteration matches the pattern in a fresh scope and runs the body
/// with iteration-local break/continue meaning: `continue` moves on (the
/// iteration contributes null), `break` ends the loop with the values
/// collected so far. Body values accumulate into the loop's result list.
pub fn for_step(
    vm: &mut Vm,
    pattern: CompiledPattern,
    body: Compiled,
    items: Rc<Vec<Value>>,
    from: usize,
    acc: Vec<Value>,
) -> EvalResult {
    let wk = vm.wk;
    let mut acc = acc;
    let mut i = from;
    while i < items.len() {
        let scope = vm.env.fork();
        let m = pattern(vm, &items[i])?;
        if !m.matched {
            return Err(error::invalid_pattern(
                "the loop pattern does not fit an element",
            ));
        }
        bind_scope(&scope, &m);

        let saved = std::mem::replace(&mut vm.env, scope);
        let out = body(vm);
        vm.env = saved;

        match out? {
            Value::Effect(eff) if eff.tag == wk.brk && eff.masked.get() == 0 => {
                return Ok(Value::list(acc));
            }
            Value::Effect(eff) if eff.tag == wk.cont && eff.masked.get() == 0 => {
                acc.push(Value::Null);
                i += 1;
            }
            Value::Effect(eff) => {
                let pattern2 = pattern.clone();
                let body2 = body.clone();
                let items2 = items.clone();
                let acc2 = acc.clone();
                let next = i + 1;
                push_step(vm, &eff, move |vm, v| {
                    let mut acc = acc2.clone();
                    acc.push(v);
                    for_step(vm, pattern2.clone(), body2.clone(), items2.clone(), next, acc)
                });
                return Ok(Value::Effect(eff));
            }
            v => {
                acc.push(v);
                i += 1;
            }
        }

        // Loop back-edge: let other runnable tasks in.
        if i < items.len() && vm.sched.borrow().has_ready() {
            let pattern2 = pattern.clone();
            let body2 = body.clone();
            let items2 = items.clone();
            let acc2 = acc.clone();
            let resume_at = i;
            let gate = raise(vm, wk.yld, Value::Null);
            if let Value::Effect(gate_eff) = &gate {
                push_step(vm, gate_eff, move |vm, _| {
                    for_step(
                        vm,
                        pattern2.clone(),
                        body2.clone(),
                        items2.clone(),
                        resume_at,
                        acc2.clone(),
                    )
                });
            }
            return Ok(gate);
        }
    }
    Ok(Value::list(acc))
}

/// Try match arms in order; unmatched values fall through to the next arm
/// and an exhausted match is an error.
pub fn match_arms(
    vm: &mut Vm,
    arms: &Rc<Vec<(CompiledPattern, Compiled)>>,
    value: &Value,
    span: Span,
) -> EvalResult {
    for (pattern, body) in arms.iter() {
        let m = pattern(vm, value)?;
        if !m.matched {
            continue;
        }
        let scope = vm.env.fork();
        bind_scope(&scope, &m);
        let saved = std::mem::replace(&mut vm.env, scope);
        let out = body(vm);
        vm.env = saved;
        return out;
    }
    Err(error::evaluation("no pattern matched the value").with_span(span))
}

/// Spawn one task per thunk via the `create-task` effect, collecting the
/// handles in argument order.
pub fn spawn_all(
    vm: &mut Vm,
    thunks: Rc<Vec<Value>>,
    from: usize,
    acc: Vec<Value>,
) -> EvalResult {
    if from >= thunks.len() {
        return Ok(Value::list(acc));
    }
    let eff = raise(vm, vm.wk.create_task, thunks[from].clone());
    if let Value::Effect(eff) = &eff {
        let thunks2 = thunks.clone();
        let acc2 = acc;
        let next = from + 1;
        push_step(vm, eff, move |vm, task| {
            let mut acc = acc2.clone();
            acc.push(task);
            spawn_all(vm, thunks2.clone(), next, acc)
        });
    }
    Ok(eff)
}

/// Resume a parked task continuation with a value.
pub fn resume_task(vm: &mut Vm, effect: &crate::value::Heap<crate::effect::EffectData>, input: Value) -> EvalResult {
    let steps: Vec<_> = effect.steps.borrow().iter().cloned().collect();
    run_steps(vm, &steps, input)
}
