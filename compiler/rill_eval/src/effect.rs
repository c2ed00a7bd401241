//! Reified effects, continuation steps, and handler frames.
//!
//! An effect is a value: a tag, a payload, the raise-site environment, and
//! an ordered list of continuation steps. Every operator that composes
//! sub-evaluations threads results through [`eval_then`]; when a
//! sub-result is an effect, the rest of the operator's work is appended as
//! a step and the effect keeps propagating outward, so the effect that
//! reaches a handler carries the entire remaining computation.
//!
//! Handler frames are deep: resuming a continuation re-enters the same
//! frame, and a frame that merely forwards an effect wraps the effect's
//! steps so that resumption re-enters it too. Multi-shot independence
//! comes from the environment copy/replace discipline in
//! [`make_continuation`]: each invocation restores a fresh copy of the
//! raise-site chain below the handler boundary. The swap-back to the
//! handler's world happens only when a resumption completes; a resumption
//! that suspends again leaves its world in place for the scheduler.

use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::atoms::Atom;
use crate::env::Env;
use crate::error::{self, EvalResult};
use crate::exec::{call_value, NativeFn, Vm};
use crate::value::{Heap, Value};

/// One pending piece of computation: `(value) -> value`, closed over the
/// evaluation context it was suspended in.
pub type Step = Rc<dyn Fn(&mut Vm, Value) -> EvalResult>;

/// The reified suspended computation.
pub struct EffectData {
    /// Effect tag.
    pub tag: Atom,
    pub payload: Value,
    /// Environment chain at the raise site.
    pub env: Env,
    /// Remaining computation, innermost first.
    pub steps: RefCell<SmallVec<[Step; 4]>>,
    /// How many matching handler frames should skip this effect
    /// (incremented by `mask`, decremented by each skipping frame).
    pub masked: Cell<u32>,
}

/// Raise an effect at the current environment.
pub fn raise(vm: &Vm, tag: Atom, payload: Value) -> Value {
    Value::effect(EffectData {
        tag,
        payload,
        env: vm.env.clone(),
        steps: RefCell::new(SmallVec::new()),
        masked: Cell::new(0),
    })
}

/// Flat-map over a possibly-effectful result.
///
/// If `value` is a plain value, applies `k` now. If it is an effect,
/// appends `k` (closed over the current environment) to the effect's
/// continuation and re-raises.
pub fn eval_then(
    vm: &mut Vm,
    value: Value,
    k: impl Fn(&mut Vm, Value) -> EvalResult + 'static,
) -> EvalResult {
    match value {
        Value::Effect(eff) => {
            push_step(vm, &eff, k);
            Ok(Value::Effect(eff))
        }
        v => k(vm, v),
    }
}

/// Append a continuation step to an effect, wrapped so that it runs under
/// the environment current at append time.
pub fn push_step(
    vm: &Vm,
    eff: &Heap<EffectData>,
    k: impl Fn(&mut Vm, Value) -> EvalResult + 'static,
) {
    let env = vm.env.clone();
    eff.steps.borrow_mut().push(Rc::new(move |vm, v| {
        let saved = std::mem::replace(&mut vm.env, env.clone());
        let out = k(vm, v);
        vm.env = saved;
        out
    }));
}

/// Run continuation steps in order, feeding `input` through.
///
/// If a step raises a new effect, the remaining steps transfer onto it
/// and it propagates; they will run once that inner effect resumes.
pub fn run_steps(vm: &mut Vm, steps: &[Step], input: Value) -> EvalResult {
    let mut value = input;
    for (i, step) in steps.iter().enumerate() {
        value = step(vm, value)?;
        if let Value::Effect(inner) = &value {
            let mut pending = inner.steps.borrow_mut();
            for later in &steps[i + 1..] {
                pending.push(later.clone());
            }
            drop(pending);
            return Ok(value);
        }
    }
    Ok(value)
}

/// One installed handler record.
pub struct Handlers {
    entries: Vec<(Atom, Value)>,
    /// Applied to the body's normal completion value.
    pub ret: Option<Value>,
}

impl Handlers {
    pub fn new() -> Self {
        Handlers {
            entries: Vec::new(),
            ret: None,
        }
    }

    #[must_use]
    pub fn with_entry(mut self, tag: Atom, callable: Value) -> Self {
        self.entries.push((tag, callable));
        self
    }

    pub fn lookup(&self, tag: Atom) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v)
    }

    /// Tags handled by this record, for raiser binding.
    pub fn tags(&self) -> impl Iterator<Item = Atom> + '_ {
        self.entries.iter().map(|(t, _)| *t)
    }
}

impl Default for Handlers {
    fn default() -> Self {
        Self::new()
    }
}

/// Process a body result against a handler frame.
///
/// - Plain value: apply the `return` handler if present.
/// - Effect with a matching, unmasked tag: invoke the handler with
///   `(continuation, payload)`.
/// - Anything else: forward the effect, wrapped so a later resumption
///   re-enters this frame.
pub fn apply_frame(
    vm: &mut Vm,
    handlers: Rc<Handlers>,
    boundary: Env,
    value: Value,
) -> EvalResult {
    match value {
        Value::Effect(eff) => {
            match handlers.lookup(eff.tag) {
                Some(_) if eff.masked.get() > 0 => {
                    eff.masked.set(eff.masked.get() - 1);
                    Ok(forward_through_frame(handlers, boundary, &eff))
                }
                Some(callable) => {
                    let callable = callable.clone();
                    let kont = make_continuation(&eff, handlers.clone(), boundary);
                    let arg = Value::list(vec![kont, eff.payload.clone()]);
                    call_value(vm, &callable, arg)
                }
                None => Ok(forward_through_frame(handlers, boundary, &eff)),
            }
        }
        v => match handlers.ret.clone() {
            Some(ret) => call_value(vm, &ret, v),
            None => Ok(v),
        },
    }
}

/// Forward an effect this frame does not handle, keeping deep semantics:
/// the effect's pending steps are folded into a single step that, when
/// resumed, runs them and re-enters this frame.
fn forward_through_frame(handlers: Rc<Handlers>, boundary: Env, eff: &Heap<EffectData>) -> Value {
    let pending: Vec<Step> = std::mem::take(&mut *eff.steps.borrow_mut()).into_vec();
    eff.steps.borrow_mut().push(Rc::new(move |vm, v| {
        let out = run_steps(vm, &pending, v)?;
        apply_frame(vm, handlers.clone(), boundary.clone(), out)
    }));
    Value::Effect(eff.clone())
}

/// Build the first-class continuation handed to a handler.
///
/// Calling it restores a fresh copy of the raise-site environment below
/// `boundary`, runs the captured steps with the supplied value, re-enters
/// the same handler frame, and finally swaps the handler's world back in.
/// The frame re-entry is what makes the handler deep; the per-invocation
/// copy is what makes multiple invocations independent.
fn make_continuation(eff: &Heap<EffectData>, handlers: Rc<Handlers>, boundary: Env) -> Value {
    let steps: Vec<Step> = eff.steps.borrow().iter().cloned().collect();
    let raise_env = eff.env.clone();
    let frozen = raise_env.copy_up_to(&boundary);

    Value::native(NativeFn::new("continuation", move |vm, input| {
        let backup = raise_env.copy_up_to(&boundary);
        let fresh = frozen.copy_up_to(&boundary);
        raise_env.replace(&fresh, &boundary);

        let result = run_steps(vm, &steps, input)
            .and_then(|out| apply_frame(vm, handlers.clone(), boundary.clone(), out));

        // A resumption that suspended again owns the world until the
        // scheduler resumes it; only completed resumptions swap back.
        if !matches!(result, Ok(Value::Effect(_))) {
            raise_env.replace(&backup, &boundary);
        }
        result
    }))
}

/// `mask [tags] do body` frame: bump the skip count of matching effects
/// so the next matching handler forwards instead of handling.
pub fn apply_mask_frame(tags: Rc<Vec<Atom>>, value: Value) -> EvalResult {
    match value {
        Value::Effect(eff) => {
            if tags.contains(&eff.tag) {
                eff.masked.set(eff.masked.get() + 1);
            }
            let pending: Vec<Step> = std::mem::take(&mut *eff.steps.borrow_mut()).into_vec();
            let tags2 = tags.clone();
            eff.steps.borrow_mut().push(Rc::new(move |vm, v| {
                let out = run_steps(vm, &pending, v)?;
                apply_mask_frame(tags2.clone(), out)
            }));
            Ok(Value::Effect(eff))
        }
        v => Ok(v),
    }
}

/// `without [tags] do body` frame: a matching effect escaping the body is
/// a hard error.
pub fn apply_without_frame(vm: &Vm, tags: Rc<Vec<Atom>>, value: Value) -> EvalResult {
    match value {
        Value::Effect(eff) => {
            if tags.contains(&eff.tag) {
                let name = vm.atom_text(eff.tag);
                return Err(error::effect_escaped(&name));
            }
            let pending: Vec<Step> = std::mem::take(&mut *eff.steps.borrow_mut()).into_vec();
            let tags2 = tags.clone();
            eff.steps.borrow_mut().push(Rc::new(move |vm, v| {
                let out = run_steps(vm, &pending, v)?;
                apply_without_frame(vm, tags2.clone(), out)
            }));
            Ok(Value::Effect(eff))
        }
        v => Ok(v),
    }
}

/// A native function that raises `tag` with its argument as payload.
pub fn make_raiser(tag: Atom, name: &'static str) -> Value {
    Value::native(NativeFn::new(name, move |vm, payload| {
        Ok(raise(vm, tag, payload))
    }))
}
