//! The interpreter: public API and the cooperative driver loop.
//!
//! A script compiles once (`compile_script_string`) and can be run many
//! times. Running seeds the scheduler with a root task and drives the
//! ready queue until the root completes; the reserved scheduler effects
//! that escape a task's root are resolved here by parking or re-queueing
//! continuations.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use tracing::debug;

use crate::atoms::{AtomTable, WellKnown};
use crate::effect::EffectData;
use crate::env::Env;
use crate::error::{self, RuntimeError};
use crate::exec::{call_value, resume_task, run_seq, Compiled, Compiler, NativeFn, Vm};
use crate::modules::{ModuleExports, ModuleLoader, NullLoader};
use crate::prelude;
use crate::proto::Prototypes;
use crate::sched::{detached_task, Runnable, Scheduler, TaskHandle, TaskStatus, TryReceive};
use crate::value::{Heap, Record, Value};
use rill_diagnostic::Diagnostic;
use rill_ir::SharedInterner;
use rill_parse::{parse_source, Parsed};

/// A compiled, reusable script.
pub struct CompiledScript {
    stmts: Rc<Vec<Compiled>>,
}

/// The Rill interpreter.
///
/// Owns the interner, the atom table, the prototype tables, and the
/// prelude environment; scripts and modules evaluate against forks of it.
pub struct Interpreter {
    interner: SharedInterner,
    atoms: Rc<RefCell<AtomTable>>,
    wk: WellKnown,
    protos: Rc<Prototypes>,
    loader: Rc<RefCell<dyn ModuleLoader>>,
    root_env: Env,
}

/// Builder for [`Interpreter`], mirroring the one knob it has: the module
/// loader.
pub struct InterpreterBuilder {
    loader: Option<Rc<RefCell<dyn ModuleLoader>>>,
}

impl InterpreterBuilder {
    pub fn loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Some(Rc::new(RefCell::new(loader)));
        self
    }

    pub fn build(self) -> Interpreter {
        let interner = SharedInterner::new();
        let mut atoms = AtomTable::new();
        let wk = WellKnown::new(&mut atoms, &interner);
        let protos = Rc::new(Prototypes::build(&mut atoms, &interner));
        let root_env = Env::new();
        prelude::install(&root_env, &interner, wk);
        Interpreter {
            interner,
            atoms: Rc::new(RefCell::new(atoms)),
            wk,
            protos,
            loader: self
                .loader
                .unwrap_or_else(|| Rc::new(RefCell::new(NullLoader))),
            root_env,
        }
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> InterpreterBuilder {
        InterpreterBuilder { loader: None }
    }

    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    /// Render a value the way the CLI prints results.
    pub fn render(&self, value: &Value) -> String {
        value.render(&self.atoms.borrow(), &self.interner)
    }

    /// Parse and compile a script; parse errors abort compilation.
    pub fn compile_script_string(&self, source: &str) -> Result<CompiledScript, Vec<Diagnostic>> {
        let parsed = parse_source(source, &self.interner);
        if parsed.has_errors() {
            return Err(parsed.diagnostics);
        }
        Ok(self.compile_script(parsed))
    }

    /// Compile an already-parsed script.
    pub fn compile_script(&self, parsed: Parsed) -> CompiledScript {
        let compiler = Compiler::new(
            Rc::new(parsed.arena),
            self.interner.clone(),
            self.atoms.clone(),
            self.wk,
        );
        CompiledScript {
            stmts: compiler.compile_all(&parsed.top),
        }
    }

    /// Evaluate a script: the value of its last expression.
    pub fn evaluate_script_string(&self, source: &str) -> Result<Value, Vec<Diagnostic>> {
        let script = self.compile_script_string(source)?;
        self.run_script(&script)
            .map_err(|e| vec![e.to_diagnostic()])
    }

    /// Run a compiled script to completion.
    pub fn run_script(&self, script: &CompiledScript) -> Result<Value, RuntimeError> {
        self.run(script.stmts.clone(), None, "script")
    }

    /// Evaluate a module: a record of its exports, with the default export
    /// stored under the `:default` sentinel key.
    pub fn evaluate_module_string(
        &self,
        source: &str,
        name: &str,
    ) -> Result<Value, Vec<Diagnostic>> {
        let script = self.compile_script_string(source)?;
        let exports = Rc::new(RefCell::new(ModuleExports::default()));
        self.run(script.stmts.clone(), Some(exports.clone()), name)
            .map_err(|e| vec![e.to_diagnostic()])?;

        let exports = exports.borrow();
        let mut record = Record::default();
        for (atom, value) in &exports.entries {
            record.insert(Value::Atom(*atom), value.clone());
        }
        if let Some(default) = &exports.default {
            record.insert(Value::Atom(self.wk.default), default.clone());
        }
        Ok(Value::record(record))
    }

    /// Evaluate a module from a file.
    pub fn evaluate_module_file(&self, path: &Path) -> Result<Value, Vec<Diagnostic>> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            vec![error::import_failed(&path.display().to_string(), &e.to_string())
                .to_diagnostic()]
        })?;
        self.evaluate_module_string(&source, &path.display().to_string())
    }

    /// Evaluate an entry file as a script.
    pub fn evaluate_entry_file(&self, path: &Path) -> Result<Value, Vec<Diagnostic>> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            vec![error::import_failed(&path.display().to_string(), &e.to_string())
                .to_diagnostic()]
        })?;
        let script = self.compile_script_string(&source)?;
        self.run(script.stmts.clone(), None, &path.display().to_string())
            .map_err(|e| vec![e.to_diagnostic()])
    }

    /// The driver: seed the root task and run the ready queue dry.
    fn run(
        &self,
        stmts: Rc<Vec<Compiled>>,
        exports: Option<Rc<RefCell<ModuleExports>>>,
        module_name: &str,
    ) -> Result<Value, RuntimeError> {
        let sched = Rc::new(RefCell::new(Scheduler::new()));
        let root = detached_task();

        let mut vm = Vm {
            env: self.root_env.fork(),
            interner: self.interner.clone(),
            atoms: self.atoms.clone(),
            wk: self.wk,
            protos: self.protos.clone(),
            sched: sched.clone(),
            loader: self.loader.clone(),
            current_task: root.clone(),
            exports,
            module_name: module_name.to_string(),
        };

        let root_env = vm.env.clone();
        let root_thunk = Value::native(NativeFn::new("script", move |vm, _| {
            let saved = std::mem::replace(&mut vm.env, root_env.clone());
            let out = run_seq(vm, stmts.clone(), 0, Value::Null);
            vm.env = saved;
            out
        }));
        sched.borrow_mut().push(Runnable::Start {
            task: root.clone(),
            thunk: root_thunk,
        });

        loop {
            let runnable = sched.borrow_mut().next();
            let Some(runnable) = runnable else {
                // Queue empty: the root either finished or everything is
                // parked.
                return match &root.borrow().status {
                    TaskStatus::Done(v) => Ok(v.clone()),
                    TaskStatus::Failed(e) => Err(e.clone()),
                    TaskStatus::Cancelled => Ok(Value::Atom(self.wk.cancelled)),
                    TaskStatus::Running => Err(error::deadlock(
                        "every task is suspended and no work remains",
                    )),
                };
            };

            let (task, outcome) = match runnable {
                Runnable::Start { task, thunk } => {
                    if !task.borrow().is_running() {
                        continue;
                    }
                    vm.current_task = task.clone();
                    let out = call_value(&mut vm, &thunk, Value::Null);
                    (task, out)
                }
                Runnable::Resume {
                    task,
                    effect,
                    input,
                } => {
                    if !task.borrow().is_running() {
                        continue;
                    }
                    vm.current_task = task.clone();
                    match input {
                        Ok(value) => {
                            let out = resume_task(&mut vm, &effect, value);
                            (task, out)
                        }
                        Err(e) => {
                            sched.borrow_mut().complete(&task, Err(e));
                            continue;
                        }
                    }
                }
            };

            self.settle(&mut vm, &sched, &task, outcome);

            if !root.borrow().is_running() {
                return match &root.borrow().status {
                    TaskStatus::Done(v) => Ok(v.clone()),
                    TaskStatus::Failed(e) => Err(e.clone()),
                    TaskStatus::Cancelled => Ok(Value::Atom(self.wk.cancelled)),
                    TaskStatus::Running => Ok(Value::Null),
                };
            }
        }
    }

    /// Drive one task's outcome until it parks, yields, or completes.
    fn settle(
        &self,
        vm: &mut Vm,
        sched: &Rc<RefCell<Scheduler>>,
        task: &TaskHandle,
        outcome: Result<Value, RuntimeError>,
    ) {
        let wk = self.wk;
        let mut outcome = outcome;
        loop {
            match outcome {
                Ok(Value::Effect(eff)) => {
                    if eff.tag == wk.create_task {
                        let child = sched
                            .borrow_mut()
                            .spawn(eff.payload.clone(), Some(task));
                        debug!("create-task handled at task root");
                        outcome = resume_task(vm, &eff, Value::Task(child));
                    } else if eff.tag == wk.yld {
                        sched.borrow_mut().push(Runnable::Resume {
                            task: task.clone(),
                            effect: eff.clone(),
                            input: Ok(Value::Null),
                        });
                        return;
                    } else if eff.tag == wk.chan_recv {
                        match self.settle_receive(vm, sched, task, &eff) {
                            Some(next) => outcome = next,
                            None => return,
                        }
                    } else if eff.tag == wk.awaiting {
                        match self.settle_await(vm, sched, task, &eff) {
                            Some(next) => outcome = next,
                            None => return,
                        }
                    } else {
                        let tag = vm.atom_text(eff.tag);
                        outcome = Err(error::unhandled_effect(&tag));
                    }
                }
                Ok(value) => {
                    sched.borrow_mut().complete(task, Ok(value));
                    return;
                }
                Err(e) => {
                    sched.borrow_mut().complete(task, Err(e));
                    return;
                }
            }
        }
    }

    /// `:chan-recv` at a task root: deliver a value that arrived in the
    /// meantime, fail on a closed channel, or park the continuation.
    fn settle_receive(
        &self,
        vm: &mut Vm,
        sched: &Rc<RefCell<Scheduler>>,
        task: &TaskHandle,
        eff: &Heap<EffectData>,
    ) -> Option<Result<Value, RuntimeError>> {
        let Value::Channel(handle) = &eff.payload else {
            return Some(Err(error::invalid_receive_channel(&eff.payload)));
        };
        let probe = sched.borrow_mut().try_receive(handle);
        match probe {
            TryReceive::Value(v) => Some(resume_task(vm, eff, v)),
            TryReceive::Closed => Some(Err(error::channel_closed(&handle.borrow().name))),
            TryReceive::Empty => {
                sched
                    .borrow_mut()
                    .park_receiver(handle, task.clone(), eff.clone());
                None
            }
        }
    }

    /// `:await` at a task root: resolve against the target task's status
    /// or park on its completion.
    fn settle_await(
        &self,
        vm: &mut Vm,
        sched: &Rc<RefCell<Scheduler>>,
        task: &TaskHandle,
        eff: &Heap<EffectData>,
    ) -> Option<Result<Value, RuntimeError>> {
        let Value::Task(target) = &eff.payload else {
            return Some(resume_task(vm, eff, eff.payload.clone()));
        };
        let status = {
            let state = target.borrow();
            match &state.status {
                TaskStatus::Done(v) => Some(Ok(v.clone())),
                TaskStatus::Failed(e) => Some(Err(e.clone())),
                TaskStatus::Cancelled => Some(Ok(Value::Atom(self.wk.cancelled))),
                TaskStatus::Running => None,
            }
        };
        match status {
            Some(Ok(v)) => Some(resume_task(vm, eff, v)),
            Some(Err(e)) => Some(Err(e)),
            None => {
                sched
                    .borrow_mut()
                    .park_awaiter(target, task.clone(), eff.clone());
                None
            }
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
