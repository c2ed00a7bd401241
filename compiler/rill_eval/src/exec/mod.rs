//! The evaluator: compile and execute phases.
//!
//! Each expression compiles once into a closure (`Compiled`) that runs
//! against a [`Vm`]; identical subtrees are compiled once and reused by
//! the closures built above them. Compile time captures spans, interned
//! text, and atom identities; execute time carries the environment.
//!
//! Every operator that composes sub-evaluations threads results through
//! `effect::eval_then`, so outward-bound effects accumulate the entire
//! remaining computation of the enclosing expression.

mod call;
mod control;
mod ops;

use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

use crate::atoms::{Atom, AtomTable, WellKnown};
use crate::effect::{
    apply_frame, apply_mask_frame, apply_without_frame, eval_then, make_raiser, push_step, raise,
    Handlers,
};
use crate::env::Env;
use crate::error::{self, EvalResult, RuntimeError};
use crate::modules::{LoadedModule, ModuleExports, ModuleLoader};
use crate::pattern::{self, ApplyMode, CompiledPattern, PatternMatch};
use crate::proto::Prototypes;
use crate::sched::Scheduler;
use crate::value::{Record, Value};
use rill_diagnostic::suggest_similar;
use rill_ir::{ExprArena, ExprId, ExprKind, Name, SharedInterner, Span};

pub use call::{call_closure, call_value};
pub use control::{resume_task, run_seq};
pub use ops::index_value;

/// A compiled expression: run it against the current context.
pub type Compiled = Rc<dyn Fn(&mut Vm) -> EvalResult>;

/// A host function. One argument, like every Rill callable.
pub struct NativeFn {
    pub name: &'static str,
    f: Box<dyn Fn(&mut Vm, Value) -> EvalResult>,
}

impl NativeFn {
    pub fn new(name: &'static str, f: impl Fn(&mut Vm, Value) -> EvalResult + 'static) -> Self {
        NativeFn { name, f: Box::new(f) }
    }

    #[inline]
    pub fn call(&self, vm: &mut Vm, arg: Value) -> EvalResult {
        (self.f)(vm, arg)
    }
}

/// A user function: parameter pattern, compiled body, definition
/// environment. `top` marks the outermost of a curried chain, which binds
/// `self` at call time.
pub struct Closure {
    pub param: CompiledPattern,
    pub body: Compiled,
    pub env: Env,
    pub top: bool,
}

/// The execution context threaded through every compiled closure.
pub struct Vm {
    pub env: Env,
    pub interner: SharedInterner,
    pub atoms: Rc<RefCell<AtomTable>>,
    pub wk: WellKnown,
    pub protos: Rc<Prototypes>,
    pub sched: Rc<RefCell<Scheduler>>,
    pub loader: Rc<RefCell<dyn ModuleLoader>>,
    /// The task whose computation is currently running.
    pub current_task: crate::sched::TaskHandle,
    /// Export collector, present while evaluating a module.
    pub exports: Option<Rc<RefCell<ModuleExports>>>,
    /// Identity of the file being evaluated, for import resolution.
    pub module_name: String,
}

impl Vm {
    /// Interned name for an atom.
    pub fn atom_name(&self, atom: Atom) -> Name {
        self.atoms.borrow().name(atom)
    }

    /// Display text of an atom, for diagnostics.
    pub fn atom_text(&self, atom: Atom) -> String {
        self.atoms.borrow().display(atom, &self.interner)
    }

    /// Closest visible name to `text`, for did-you-mean notes.
    pub fn closest_name(&self, text: &str) -> Option<String> {
        let names = self.env.visible_names();
        let candidates: Vec<&str> = names
            .iter()
            .map(|&name| self.interner.lookup(name))
            .collect();
        suggest_similar(text, candidates.iter().copied()).map(str::to_string)
    }

    /// Cooperative yield point: raises a `:yield` effect when another task
    /// is runnable, else evaluates to null. Single-task scripts never
    /// allocate here.
    pub fn maybe_yield(&mut self) -> Value {
        if self.sched.borrow().has_ready() {
            raise(self, self.wk.yld, Value::Null)
        } else {
            Value::Null
        }
    }
}

/// Compiles syntax-tree nodes into executable closures, memoized per node.
pub struct Compiler {
    arena: Rc<ExprArena>,
    interner: SharedInterner,
    atoms: Rc<RefCell<AtomTable>>,
    wk: WellKnown,
    cache: RefCell<FxHashMap<ExprId, Compiled>>,
}

impl Compiler {
    pub fn new(
        arena: Rc<ExprArena>,
        interner: SharedInterner,
        atoms: Rc<RefCell<AtomTable>>,
        wk: WellKnown,
    ) -> Self {
        Compiler {
            arena,
            interner,
            atoms,
            wk,
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    pub fn atom_of(&self, name: Name) -> Atom {
        self.atoms.borrow_mut().of_name(name)
    }

    /// Compile a node, reusing the cached closure for repeated sites.
    pub fn compile(&self, id: ExprId) -> Compiled {
        if let Some(cached) = self.cache.borrow().get(&id) {
            return cached.clone();
        }
        let compiled = self.compile_uncached(id);
        self.cache.borrow_mut().insert(id, compiled.clone());
        compiled
    }

    /// Compile each statement of a script or block.
    pub fn compile_all(&self, ids: &[ExprId]) -> Rc<Vec<Compiled>> {
        Rc::new(ids.iter().map(|&id| self.compile(id)).collect())
    }

    /// Compile a loop body. A brace-block body folds into the loop's own
    /// frame (the braces are the loop's block), so `break`/`continue`
    /// inside it target the loop rather than a nested block.
    fn compile_loop_body(&self, id: ExprId) -> Compiled {
        match self.arena.get(id).kind {
            ExprKind::Block(range) => {
                let stmts = self.compile_all(self.arena.list(range));
                Rc::new(move |vm| {
                    let scope = vm.env.fork();
                    let saved = std::mem::replace(&mut vm.env, scope);
                    let out = control::run_seq(vm, stmts.clone(), 0, Value::Null);
                    vm.env = saved;
                    out
                })
            }
            _ => self.compile(id),
        }
    }

    fn compile_uncached(&self, id: ExprId) -> Compiled {
        let expr = self.arena.get(id);
        let span = expr.span;
        match expr.kind {
            ExprKind::Number(bits) => {
                let value = Value::Number(f64::from_bits(bits));
                Rc::new(move |_| Ok(value.clone()))
            }
            ExprKind::Bool(b) => Rc::new(move |_| Ok(Value::Bool(b))),
            ExprKind::Str(name) => {
                let text = self.interner.lookup(name);
                Rc::new(move |_| Ok(Value::string(text)))
            }
            ExprKind::Atom(name) => {
                let atom = self.atom_of(name);
                Rc::new(move |_| Ok(Value::Atom(atom)))
            }
            ExprKind::Ident(name) => {
                let text = self.interner.lookup(name);
                Rc::new(move |vm| {
                    vm.env
                        .get(name)
                        .ok_or_else(|| error::undeclared_name(text).with_span(span))
                })
            }
            ExprKind::Placeholder => {
                Rc::new(move |_| Err(error::invalid_placeholder().with_span(span)))
            }

            ExprKind::Parens(child) => {
                if child.is_valid() {
                    self.compile(child)
                } else {
                    Rc::new(|_| Ok(Value::unit()))
                }
            }

            ExprKind::Brackets(child) => {
                let key = self.compile(child);
                Rc::new(move |vm| {
                    let key_value = key(vm)?;
                    eval_then(vm, key_value, move |vm, key_value| {
                        let name = match &key_value {
                            Value::Str(s) => vm.interner.intern(s),
                            Value::Atom(a) => vm.atom_name(*a),
                            other => {
                                return Err(error::evaluation(format!(
                                    "dynamic name must be a string or atom, found {}",
                                    other.type_name()
                                ))
                                .with_span(span))
                            }
                        };
                        vm.env.get(name).ok_or_else(|| {
                            error::undeclared_name(vm.interner.lookup(name)).with_span(span)
                        })
                    })
                })
            }

            ExprKind::Tuple(range) => self.compile_tuple(range, span),
            ExprKind::Spread(_) => Rc::new(move |_| {
                Err(error::invalid_spread("spread is only allowed inside a tuple or record")
                    .with_span(span))
            }),
            ExprKind::Labeled { .. } => Rc::new(move |_| {
                Err(error::evaluation("labels are only allowed inside a record").with_span(span))
            }),

            ExprKind::Block(range) => {
                let stmts = self.compile_all(self.arena.list(range));
                Rc::new(move |vm| control::run_block_frame(vm, stmts.clone()))
            }

            ExprKind::Index { target, index } => {
                let target = self.compile(target);
                let index = self.compile(index);
                Rc::new(move |vm| {
                    let t = target(vm)?;
                    let index = index.clone();
                    eval_then(vm, t, move |vm, t| {
                        let i = index(vm)?;
                        let t2 = t.clone();
                        eval_then(vm, i, move |vm, i| {
                            index_value(vm, &t2, &i).map_err(|e| e.with_span(span))
                        })
                    })
                })
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.compile(lhs);
                let rhs = self.compile(rhs);
                Rc::new(move |vm| {
                    let l = lhs(vm)?;
                    let rhs = rhs.clone();
                    eval_then(vm, l, move |vm, l| {
                        let r = rhs(vm)?;
                        let l2 = l.clone();
                        eval_then(vm, r, move |vm, r| {
                            ops::apply_binary(vm, op, &l2, &r).map_err(|e| e.with_span(span))
                        })
                    })
                })
            }

            ExprKind::Unary { op, operand } => {
                let operand = self.compile(operand);
                Rc::new(move |vm| {
                    let v = operand(vm)?;
                    eval_then(vm, v, move |vm, v| {
                        ops::apply_unary(vm, op, v).map_err(|e| e.with_span(span))
                    })
                })
            }

            ExprKind::And { lhs, rhs } => {
                let lhs = self.compile(lhs);
                let rhs = self.compile(rhs);
                Rc::new(move |vm| {
                    let l = lhs(vm)?;
                    let rhs = rhs.clone();
                    eval_then(vm, l, move |vm, l| {
                        if l.is_truthy() {
                            rhs(vm)
                        } else {
                            Ok(l)
                        }
                    })
                })
            }
            ExprKind::Or { lhs, rhs } => {
                let lhs = self.compile(lhs);
                let rhs = self.compile(rhs);
                Rc::new(move |vm| {
                    let l = lhs(vm)?;
                    let rhs = rhs.clone();
                    eval_then(vm, l, move |vm, l| {
                        if l.is_truthy() {
                            Ok(l)
                        } else {
                            rhs(vm)
                        }
                    })
                })
            }

            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.compile_if(cond, then_branch, else_branch),

            ExprKind::Is { value, pattern } => {
                let value = self.compile(value);
                let pattern = pattern::compile_pattern(self, pattern);
                Rc::new(move |vm| {
                    let v = value(vm)?;
                    let pattern = pattern.clone();
                    eval_then(vm, v, move |vm, v| {
                        let m = pattern(vm, &v)?;
                        Ok(Value::Bool(m.matched))
                    })
                })
            }

            ExprKind::Match { subject, arms } => {
                let subject = self.compile(subject);
                let arms: Vec<(CompiledPattern, Compiled)> = self
                    .arena
                    .list(arms)
                    .iter()
                    .filter_map(|&arm| match self.arena.get(arm).kind {
                        ExprKind::MatchArm { pattern, body } => Some((
                            pattern::compile_pattern(self, pattern),
                            self.compile(body),
                        )),
                        _ => None,
                    })
                    .collect();
                let arms = Rc::new(arms);
                Rc::new(move |vm| {
                    let v = subject(vm)?;
                    let arms = arms.clone();
                    eval_then(vm, v, move |vm, v| {
                        control::match_arms(vm, &arms, &v, span)
                    })
                })
            }
            ExprKind::MatchArm { .. } => Rc::new(move |_| {
                Err(error::evaluation("match arm outside of match").with_span(span))
            }),

            ExprKind::Loop { body } => {
                let wk = self.wk;
                let body = self.compile_loop_body(body);
                let back_edge: Compiled =
                    Rc::new(move |vm| Ok(raise(vm, wk.cont, Value::unit())));
                let stmts = Rc::new(vec![body, back_edge]);
                Rc::new(move |vm| control::run_block_frame(vm, stmts.clone()))
            }

            ExprKind::While { cond, body } => {
                let wk = self.wk;
                let cond = self.compile(cond);
                let body = self.compile_loop_body(body);
                // `while c do b` is `loop { if c then b else break() }`.
                let iteration: Compiled = Rc::new(move |vm| {
                    let c = cond(vm)?;
                    let body = body.clone();
                    eval_then(vm, c, move |vm, c| {
                        if c.is_truthy() {
                            body(vm)
                        } else {
                            Ok(raise(vm, wk.brk, Value::unit()))
                        }
                    })
                });
                let back_edge: Compiled =
                    Rc::new(move |vm| Ok(raise(vm, wk.cont, Value::unit())));
                let stmts = Rc::new(vec![iteration, back_edge]);
                Rc::new(move |vm| control::run_block_frame(vm, stmts.clone()))
            }

            ExprKind::For {
                pattern,
                iter,
                body,
            } => {
                let pattern = pattern::compile_pattern(self, pattern);
                let iter = self.compile(iter);
                let body = self.compile_loop_body(body);
                Rc::new(move |vm| {
                    let it = iter(vm)?;
                    let pattern = pattern.clone();
                    let body = body.clone();
                    eval_then(vm, it, move |vm, it| {
                        let items: Rc<Vec<Value>> = match &it {
                            Value::List(items) => Rc::new(items.borrow().clone()),
                            other => {
                                return Err(error::evaluation(format!(
                                    "`for` needs a list to iterate, found {}",
                                    other.type_name()
                                ))
                                .with_span(span))
                            }
                        };
                        control::for_step(vm, pattern.clone(), body.clone(), items, 0, Vec::new())
                    })
                })
            }

            ExprKind::Fn { param, body, top } => {
                let param = pattern::compile_pattern(self, param);
                let body = self.compile(body);
                Rc::new(move |vm| {
                    Ok(Value::closure(Closure {
                        param: param.clone(),
                        body: body.clone(),
                        env: vm.env.clone(),
                        top,
                    }))
                })
            }

            ExprKind::Apply { func, arg } => {
                let func_c = self.compile(func);
                // A block argument becomes a thunk: it runs in caller
                // scope, when the callee decides.
                let arg_c = if matches!(self.arena.get(arg).kind, ExprKind::Block(_)) {
                    let block = self.compile(arg);
                    let thunk: Compiled = Rc::new(move |vm| {
                        let env = vm.env.clone();
                        let block = block.clone();
                        Ok(Value::native(NativeFn::new("thunk", move |vm, _| {
                            let saved = std::mem::replace(&mut vm.env, env.clone());
                            let out = block(vm);
                            vm.env = saved;
                            out
                        })))
                    });
                    thunk
                } else {
                    self.compile(arg)
                };
                Rc::new(move |vm| {
                    let f = func_c(vm)?;
                    let arg_c = arg_c.clone();
                    eval_then(vm, f, move |vm, f| {
                        let a = arg_c(vm)?;
                        let f2 = f.clone();
                        eval_then(vm, a, move |vm, a| {
                            call_value(vm, &f2, a).map_err(|e| e.with_span(span))
                        })
                    })
                })
            }

            ExprKind::TryOp(body) => {
                let body = self.compile(body);
                Rc::new(move |vm| {
                    let v = body(vm)?;
                    eval_then(vm, v, move |vm, v| {
                        let result_kind = match &v {
                            Value::List(items) => {
                                let items = items.borrow();
                                if items.len() == 2 {
                                    items[0].as_atom()
                                } else {
                                    None
                                }
                            }
                            _ => None,
                        };
                        match result_kind {
                            Some(tag) if tag == vm.wk.ok => {
                                let inner = match &v {
                                    Value::List(items) => items.borrow()[1].clone(),
                                    _ => Value::Null,
                                };
                                Ok(raise(vm, vm.wk.fn_try, inner))
                            }
                            Some(tag) if tag == vm.wk.error => {
                                Ok(raise(vm, vm.wk.ret, v.clone()))
                            }
                            _ => Ok(raise(vm, vm.wk.fn_try, v.clone())),
                        }
                    })
                })
            }

            ExprKind::Inject { handlers, body } => {
                let handlers_c = self.compile(handlers);
                let body_c = self.compile(body);
                Rc::new(move |vm| {
                    let h = handlers_c(vm)?;
                    let body_c = body_c.clone();
                    eval_then(vm, h, move |vm, h| {
                        let handlers = Rc::new(handlers_from_value(vm, &h)?);
                        let boundary = vm.env.clone();
                        let scope = boundary.fork();
                        for tag in handlers.tags() {
                            let name = vm.atom_name(tag);
                            let _ = scope.add_readonly(name, make_raiser(tag, "effect"));
                        }
                        let saved = std::mem::replace(&mut vm.env, scope);
                        let out = body_c(vm);
                        vm.env = saved;
                        apply_frame(vm, handlers, boundary, out?)
                    })
                })
            }

            ExprKind::Mask { tags, body } => {
                let tags = self.compile_all(self.arena.list(tags));
                let body = self.compile(body);
                Rc::new(move |vm| {
                    let tags = eval_tags(vm, &tags, span)?;
                    let out = body(vm)?;
                    apply_mask_frame(Rc::new(tags), out)
                })
            }
            ExprKind::Without { tags, body } => {
                let tags = self.compile_all(self.arena.list(tags));
                let body = self.compile(body);
                Rc::new(move |vm| {
                    let tags = eval_tags(vm, &tags, span)?;
                    let out = body(vm)?;
                    apply_without_frame(vm, Rc::new(tags), out)
                })
            }

            ExprKind::CodeLabel { name, body } => {
                let body = self.compile(body);
                let wk = self.wk;
                Rc::new(move |vm| control::run_label(vm, name, body.clone(), wk))
            }

            ExprKind::Async(body) => {
                let body = self.compile(body);
                Rc::new(move |vm| {
                    let thunk = make_task_thunk(vm, body.clone());
                    Ok(raise(vm, vm.wk.create_task, thunk))
                })
            }

            ExprKind::Parallel(range) => {
                let bodies = self.compile_all(self.arena.list(range));
                Rc::new(move |vm| {
                    let thunks: Rc<Vec<Value>> = Rc::new(
                        bodies
                            .iter()
                            .map(|body| make_task_thunk(vm, body.clone()))
                            .collect(),
                    );
                    control::spawn_all(vm, thunks, 0, Vec::new())
                })
            }

            ExprKind::Send { channel, value } => {
                let channel = self.compile(channel);
                let value = self.compile(value);
                Rc::new(move |vm| {
                    let c = channel(vm)?;
                    let value = value.clone();
                    eval_then(vm, c, move |vm, c| {
                        let v = value(vm)?;
                        let c2 = c.clone();
                        eval_then(vm, v, move |vm, v| match &c2 {
                            Value::Channel(handle) => {
                                let sched = vm.sched.clone();
                                sched
                                    .borrow_mut()
                                    .send(handle, v.clone())
                                    .map_err(|e| e.with_span(span))?;
                                Ok(v)
                            }
                            other => Err(error::invalid_send_channel(other).with_span(span)),
                        })
                    })
                })
            }

            ExprKind::Receive(channel) => {
                let channel = self.compile(channel);
                Rc::new(move |vm| {
                    let c = channel(vm)?;
                    eval_then(vm, c, move |vm, c| match &c {
                        Value::Channel(handle) => {
                            use crate::sched::TryReceive;
                            let sched = vm.sched.clone();
                            let probe = sched.borrow_mut().try_receive(handle);
                            match probe {
                                TryReceive::Value(v) => Ok(v),
                                TryReceive::Closed => Err(error::channel_closed(
                                    &handle.borrow().name,
                                )
                                .with_span(span)),
                                TryReceive::Empty => {
                                    Ok(raise(vm, vm.wk.chan_recv, c.clone()))
                                }
                            }
                        }
                        other => Err(error::invalid_receive_channel(other).with_span(span)),
                    })
                })
            }

            ExprKind::TrySend { channel, value } => {
                let channel = self.compile(channel);
                let value = self.compile(value);
                Rc::new(move |vm| {
                    let c = channel(vm)?;
                    let value = value.clone();
                    eval_then(vm, c, move |vm, c| {
                        let v = value(vm)?;
                        let c2 = c.clone();
                        eval_then(vm, v, move |vm, v| match &c2 {
                            Value::Channel(handle) => {
                                if handle.borrow().closed {
                                    return Ok(Value::Atom(vm.wk.closed));
                                }
                                let sched = vm.sched.clone();
                                sched
                                    .borrow_mut()
                                    .send(handle, v)
                                    .map_err(|e| e.with_span(span))?;
                                Ok(Value::Atom(vm.wk.ok))
                            }
                            other => Err(error::invalid_send_channel(other).with_span(span)),
                        })
                    })
                })
            }

            ExprKind::TryReceive(channel) => {
                let channel = self.compile(channel);
                Rc::new(move |vm| {
                    let c = channel(vm)?;
                    eval_then(vm, c, move |vm, c| match &c {
                        Value::Channel(handle) => {
                            use crate::sched::TryReceive;
                            let sched = vm.sched.clone();
                            let probe = sched.borrow_mut().try_receive(handle);
                            Ok(match probe {
                                TryReceive::Value(v) => {
                                    Value::list(vec![Value::Atom(vm.wk.ok), v])
                                }
                                TryReceive::Empty => Value::Atom(vm.wk.none),
                                TryReceive::Closed => Value::Atom(vm.wk.closed),
                            })
                        }
                        other => Err(error::invalid_receive_channel(other).with_span(span)),
                    })
                })
            }

            ExprKind::Declare { pattern, value } => {
                self.compile_binding(pattern, value, ApplyMode::Declare, span)
            }
            ExprKind::Assign { pattern, value } => {
                self.compile_binding(pattern, value, ApplyMode::Assign, span)
            }
            ExprKind::AddAssign { pattern, value } => {
                self.compile_binding(pattern, value, ApplyMode::Increment, span)
            }

            ExprKind::Export { pattern, value } => self.compile_export(pattern, value, span),

            ExprKind::Import(name) => {
                let text = self.interner.lookup(name);
                Rc::new(move |vm| {
                    let loader = vm.loader.clone();
                    let loaded = loader
                        .borrow_mut()
                        .load(text, &vm.module_name)
                        .map_err(|reason| error::import_failed(text, &reason).with_span(span))?;
                    Ok(loaded_module_value(vm, loaded))
                })
            }

            ExprKind::Pin(_)
            | ExprKind::Bind { .. }
            | ExprKind::MutPat(_)
            | ExprKind::LikePat(_)
            | ExprKind::StrictPat(_) => Rc::new(move |_| {
                Err(error::invalid_pattern("pattern form used as a value").with_span(span))
            }),

            ExprKind::Error => {
                Rc::new(move |_| Err(error::evaluation("cannot evaluate a parse error").with_span(span)))
            }
        }
    }

    /// Tuple / record builder with left-to-right, resumable evaluation.
    fn compile_tuple(&self, range: rill_ir::ExprRange, span: Span) -> Compiled {
        enum ElemC {
            Plain(Compiled),
            Spread(Compiled),
            Labeled(Value, Compiled),
        }

        let mut parts = Vec::new();
        for &child in self.arena.list(range) {
            match self.arena.get(child).kind {
                ExprKind::Spread(inner) => parts.push(ElemC::Spread(self.compile(inner))),
                ExprKind::Labeled { key, value } => {
                    let key_value = match self.arena.get(key).kind {
                        ExprKind::Atom(name) => Value::Atom(self.atom_of(name)),
                        ExprKind::Str(name) => Value::string(self.interner.lookup(name)),
                        _ => Value::Null,
                    };
                    parts.push(ElemC::Labeled(key_value, self.compile(value)));
                }
                _ => parts.push(ElemC::Plain(self.compile(child))),
            }
        }

        // A lone spread propagates its payload unchanged.
        if parts.len() == 1 {
            if let ElemC::Spread(inner) = &parts[0] {
                let inner = inner.clone();
                return Rc::new(move |vm| inner(vm));
            }
        }

        #[derive(Clone)]
        enum Acc {
            List(Vec<Value>),
            Record(Record),
        }

        impl Acc {
            fn push_plain(&mut self, v: Value, span: Span) -> Result<(), RuntimeError> {
                match self {
                    Acc::List(items) => {
                        items.push(v);
                        Ok(())
                    }
                    Acc::Record(_) => Err(error::evaluation(
                        "cannot mix positional and labeled elements",
                    )
                    .with_span(span)),
                }
            }

            fn label(&mut self, k: Value, v: Value, span: Span) -> Result<(), RuntimeError> {
                match self {
                    Acc::List(items) if items.is_empty() => {
                        let mut record = Record::default();
                        record.insert(k, v);
                        *self = Acc::Record(record);
                        Ok(())
                    }
                    Acc::List(_) => Err(error::evaluation(
                        "cannot mix positional and labeled elements",
                    )
                    .with_span(span)),
                    Acc::Record(record) => {
                        record.insert(k, v);
                        Ok(())
                    }
                }
            }

            fn splice(&mut self, v: &Value, span: Span) -> Result<(), RuntimeError> {
                match (&mut *self, v) {
                    (Acc::List(items), Value::List(more)) => {
                        items.extend(more.borrow().iter().cloned());
                        Ok(())
                    }
                    (Acc::List(items), Value::Record(more)) if items.is_empty() => {
                        *self = Acc::Record(more.borrow().clone());
                        Ok(())
                    }
                    (Acc::Record(record), Value::Record(more)) => {
                        for (k, v) in more.borrow().iter() {
                            record.insert(k.clone(), v.clone());
                        }
                        Ok(())
                    }
                    (_, other) => Err(error::invalid_spread(&format!(
                        "cannot spread a {} here",
                        other.type_name()
                    ))
                    .with_span(span)),
                }
            }

            fn finish(self) -> Value {
                match self {
                    Acc::List(items) => Value::list(items),
                    Acc::Record(record) => Value::record(record),
                }
            }
        }

        fn step(
            vm: &mut Vm,
            parts: &Rc<Vec<ElemC>>,
            idx: usize,
            mut acc: Acc,
            span: Span,
        ) -> EvalResult {
            let mut i = idx;
            while i < parts.len() {
                let (value, is_spread, label) = match &parts[i] {
                    ElemC::Plain(c) => (c(vm)?, false, None),
                    ElemC::Spread(c) => (c(vm)?, true, None),
                    ElemC::Labeled(k, c) => (c(vm)?, false, Some(k.clone())),
                };
                if let Value::Effect(eff) = value {
                    let parts2 = parts.clone();
                    let acc2 = acc.clone();
                    let next = i + 1;
                    let spread = is_spread;
                    let label2 = label.clone();
                    push_step(vm, &eff, move |vm, v| {
                        let mut acc = acc2.clone();
                        if spread {
                            acc.splice(&v, span)?;
                        } else if let Some(k) = &label2 {
                            acc.label(k.clone(), v, span)?;
                        } else {
                            acc.push_plain(v, span)?;
                        }
                        step(vm, &parts2, next, acc, span)
                    });
                    return Ok(Value::Effect(eff));
                }
                if is_spread {
                    acc.splice(&value, span)?;
                } else if let Some(k) = label {
                    acc.label(k, value, span)?;
                } else {
                    acc.push_plain(value, span)?;
                }
                i += 1;
            }
            Ok(acc.finish())
        }

        let parts = Rc::new(parts);
        Rc::new(move |vm| step(vm, &parts, 0, Acc::List(Vec::new()), span))
    }

    fn compile_if(&self, cond: ExprId, then_branch: ExprId, else_branch: ExprId) -> Compiled {
        let then_c = self.compile(then_branch);
        let else_c = if else_branch.is_valid() {
            Some(self.compile(else_branch))
        } else {
            None
        };

        // `if e is p` binds the match's names in the true branch and the
        // would-have-bound names in the false branch.
        if let ExprKind::Is { value, pattern } = self.arena.get(cond).kind {
            let value_c = self.compile(value);
            let pattern_c = pattern::compile_pattern(self, pattern);
            return Rc::new(move |vm| {
                let v = value_c(vm)?;
                let pattern_c = pattern_c.clone();
                let then_c = then_c.clone();
                let else_c = else_c.clone();
                eval_then(vm, v, move |vm, v| {
                    let m = pattern_c(vm, &v)?;
                    let scope = vm.env.fork();
                    if m.matched {
                        bind_scope(&scope, &m);
                    } else {
                        for (name, value) in &m.not_envs {
                            let _ = scope.add_readonly(*name, value.clone());
                        }
                    }
                    let saved = std::mem::replace(&mut vm.env, scope);
                    let out = if m.matched {
                        then_c(vm)
                    } else if let Some(else_c) = &else_c {
                        else_c(vm)
                    } else {
                        Ok(Value::Null)
                    };
                    vm.env = saved;
                    out
                })
            });
        }

        let cond_c = self.compile(cond);
        Rc::new(move |vm| {
            let c = cond_c(vm)?;
            let then_c = then_c.clone();
            let else_c = else_c.clone();
            eval_then(vm, c, move |vm, c| {
                if c.is_truthy() {
                    then_c(vm)
                } else if let Some(else_c) = &else_c {
                    else_c(vm)
                } else {
                    Ok(Value::Null)
                }
            })
        })
    }

    fn compile_binding(
        &self,
        pattern: ExprId,
        value: ExprId,
        mode: ApplyMode,
        span: Span,
    ) -> Compiled {
        let pattern = pattern::compile_pattern(self, pattern);
        let value = self.compile(value);
        let mode = Rc::new(mode);
        Rc::new(move |vm| {
            let v = value(vm)?;
            let pattern = pattern.clone();
            let mode = mode.clone();
            eval_then(vm, v, move |vm, v| {
                let m = pattern(vm, &v)?;
                if !m.matched {
                    return Err(
                        error::invalid_pattern("the value does not fit this pattern")
                            .with_span(span),
                    );
                }
                pattern::apply_bindings(vm, &m, &mode).map_err(|e| e.with_span(span))?;
                Ok(v)
            })
        })
    }

    fn compile_export(&self, pattern: ExprId, value: ExprId, span: Span) -> Compiled {
        let value_c = self.compile(value);
        let pattern_c = if pattern.is_valid() {
            Some(pattern::compile_pattern(self, pattern))
        } else {
            None
        };
        Rc::new(move |vm| {
            let v = value_c(vm)?;
            let pattern_c = pattern_c.clone();
            eval_then(vm, v, move |vm, v| {
                let Some(exports) = vm.exports.clone() else {
                    return Err(
                        error::evaluation("`export` is only allowed at module top level")
                            .with_span(span),
                    );
                };
                match &pattern_c {
                    None => {
                        let mut exports = exports.borrow_mut();
                        if exports.default.is_some() {
                            return Err(error::duplicate_default_export().with_span(span));
                        }
                        exports.default = Some(v.clone());
                    }
                    Some(pattern) => {
                        let m = pattern(vm, &v)?;
                        if !m.matched {
                            return Err(error::invalid_pattern(
                                "the value does not fit this pattern",
                            )
                            .with_span(span));
                        }
                        pattern::apply_bindings(vm, &m, &ApplyMode::Declare)
                            .map_err(|e| e.with_span(span))?;
                        let mut exports = exports.borrow_mut();
                        for (key, bound) in m.readonly.iter().chain(m.mutable.iter()) {
                            if let pattern::BindKey::Name(name) = key {
                                let atom = vm.atoms.borrow_mut().of_name(*name);
                                exports.entries.insert(atom, bound.clone());
                            }
                        }
                    }
                }
                Ok(v)
            })
        })
    }
}

/// Bind a successful match's names into a fresh scope (match arms, `is`
/// refinement, `for` patterns).
pub fn bind_scope(scope: &Env, m: &PatternMatch) {
    for (key, value) in &m.readonly {
        if let pattern::BindKey::Name(name) = key {
            let _ = scope.add_readonly(*name, value.clone());
        }
    }
    for (key, value) in &m.mutable {
        if let pattern::BindKey::Name(name) = key {
            let _ = scope.add(*name, value.clone());
        }
    }
}

/// Convert an evaluated handler record into a `Handlers` frame.
fn handlers_from_value(vm: &mut Vm, value: &Value) -> Result<Handlers, RuntimeError> {
    let Value::Record(entries) = value else {
        return Err(error::evaluation(format!(
            "`inject` needs a record of handlers, found {}",
            value.type_name()
        )));
    };
    let mut handlers = Handlers::new();
    for (key, callable) in entries.borrow().iter() {
        let tag = match key {
            Value::Atom(atom) => *atom,
            Value::Str(s) => {
                let name = vm.interner.intern(s);
                vm.atoms.borrow_mut().of_name(name)
            }
            other => {
                return Err(error::evaluation(format!(
                    "handler keys must be atoms or strings, found {}",
                    other.type_name()
                )))
            }
        };
        // Reserved scheduler tags cannot be intercepted.
        if vm.wk.is_scheduler_tag(tag) {
            continue;
        }
        let callable = match callable {
            Value::Handler(inner) => (**inner).clone(),
            other => other.clone(),
        };
        if !callable.is_callable() {
            return Err(error::evaluation(format!(
                "handler for `{}` must be a function, found {}",
                vm.atom_text(tag),
                callable.type_name()
            )));
        }
        if tag == vm.wk.ret {
            handlers.ret = Some(callable);
        } else {
            handlers = handlers.with_entry(tag, callable);
        }
    }
    Ok(handlers)
}

/// Evaluate mask/without tag expressions down to atoms.
fn eval_tags(vm: &mut Vm, tags: &[Compiled], span: Span) -> Result<Vec<Atom>, RuntimeError> {
    let mut out = Vec::with_capacity(tags.len());
    for tag in tags {
        match tag(vm)? {
            Value::Atom(atom) => out.push(atom),
            other => {
                return Err(error::evaluation(format!(
                    "effect tags must be atoms, found {}",
                    other.type_name()
                ))
                .with_span(span))
            }
        }
    }
    Ok(out)
}

/// Wrap a compiled body as a task thunk running in a child of the current
/// environment.
fn make_task_thunk(vm: &Vm, body: Compiled) -> Value {
    let env = vm.env.fork();
    Value::native(NativeFn::new("task", move |vm, _| {
        let saved = std::mem::replace(&mut vm.env, env.clone());
        let out = body(vm);
        vm.env = saved;
        out
    }))
}

/// Materialize a loaded module as a value.
fn loaded_module_value(vm: &mut Vm, loaded: LoadedModule) -> Value {
    match loaded {
        LoadedModule::Script(value) => value,
        LoadedModule::Module { record, default } => {
            if let (Value::Record(entries), Some(default)) = (&record, default) {
                entries
                    .borrow_mut()
                    .insert(Value::Atom(vm.wk.default), default);
            }
            record
        }
        LoadedModule::Buffer(bytes) => Value::string(String::from_utf8_lossy(&bytes)),
    }
}

#[cfg(test)]
mod tests;
