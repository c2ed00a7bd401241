//! Channels, tasks, and the cooperative scheduler.
//!
//! Scheduling is single-threaded. Evaluation suspends by letting one of
//! the reserved scheduler effects (`:create-task`, `:await`, `:chan-recv`,
//! `:yield`) escape to the root of the current task; the driver loop in
//! `interpreter` catches them, parks or re-queues the continuation, and
//! picks the next runnable. Sends never suspend: a queued receiver is
//! resumed directly, otherwise the value is buffered.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::cell::Cell;

use tracing::trace;

use crate::effect::EffectData;
use crate::error::{self, RuntimeError};
use crate::value::{Heap, Value};

/// Handle to a task's shared state.
pub type TaskHandle = Heap<RefCell<TaskState>>;

/// Handle to a channel's shared state.
pub type ChannelHandle = Heap<RefCell<ChannelState>>;

/// What a parked receiver does when a value arrives.
pub enum Waiter {
    /// Resume a suspended task continuation with the value.
    Task {
        task: TaskHandle,
        effect: Heap<EffectData>,
    },
    /// One arm of a channel race: forward the first value to `out`,
    /// then go inert.
    Race {
        out: ChannelHandle,
        done: Rc<Cell<bool>>,
    },
}

/// A named queue of pending values plus suspended receivers.
pub struct ChannelState {
    pub name: String,
    pub queue: VecDeque<Value>,
    pub waiters: VecDeque<Waiter>,
    pub closed: bool,
}

impl ChannelState {
    pub fn new(name: impl Into<String>) -> Self {
        ChannelState {
            name: name.into(),
            queue: VecDeque::new(),
            waiters: VecDeque::new(),
            closed: false,
        }
    }
}

/// Lifecycle of a task.
pub enum TaskStatus {
    Running,
    Done(Value),
    Failed(RuntimeError),
    Cancelled,
}

/// A handle to an asynchronous unit of work.
pub struct TaskState {
    pub status: TaskStatus,
    /// Tasks suspended on `await` of this task.
    pub waiters: Vec<(TaskHandle, Heap<EffectData>)>,
    /// Children registered at creation; cancelling cascades to them.
    pub children: Vec<TaskHandle>,
}

impl TaskState {
    pub fn new() -> Self {
        TaskState {
            status: TaskStatus::Running,
            waiters: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, TaskStatus::Running)
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

/// A fresh running task handle, not yet queued.
pub fn detached_task() -> TaskHandle {
    Heap::new(RefCell::new(TaskState::new()))
}

/// A unit of work in the ready queue.
pub enum Runnable {
    /// Run a task's thunk from the beginning.
    Start { task: TaskHandle, thunk: Value },
    /// Resume a parked continuation with an input (or fail the task).
    Resume {
        task: TaskHandle,
        effect: Heap<EffectData>,
        input: Result<Value, RuntimeError>,
    },
}

/// The cooperative ready queue plus channel plumbing.
pub struct Scheduler {
    ready: VecDeque<Runnable>,
    /// Count of tasks parked on channels or awaits, for deadlock checks.
    parked: usize,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            ready: VecDeque::new(),
            parked: 0,
        }
    }

    /// Create a task and queue its thunk; registers it as a child of
    /// `parent` when given.
    pub fn spawn(&mut self, thunk: Value, parent: Option<&TaskHandle>) -> TaskHandle {
        let handle = detached_task();
        if let Some(parent) = parent {
            parent.borrow_mut().children.push(handle.clone());
        }
        trace!(queued = self.ready.len() + 1, "task spawned");
        self.ready.push_back(Runnable::Start {
            task: handle.clone(),
            thunk,
        });
        handle
    }

    pub fn push(&mut self, runnable: Runnable) {
        self.ready.push_back(runnable);
    }

    pub fn next(&mut self) -> Option<Runnable> {
        self.ready.pop_front()
    }

    /// Is anything else waiting for the processor right now?
    ///
    /// Drives the cooperative yield points: a lone task never yields.
    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub fn note_parked(&mut self) {
        self.parked += 1;
    }

    pub fn note_unparked(&mut self) {
        self.parked = self.parked.saturating_sub(1);
    }

    pub fn parked_count(&self) -> usize {
        self.parked
    }

    /// Send a value: hand it to the first live waiter, else buffer it.
    /// Never suspends. Cancelled waiters are discarded lazily here.
    pub fn send(&mut self, channel: &ChannelHandle, value: Value) -> Result<(), RuntimeError> {
        let mut state = channel.borrow_mut();
        if state.closed {
            return Err(error::channel_closed(&state.name));
        }
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter {
                Waiter::Task { task, effect } => {
                    if !task.borrow().is_running() {
                        self.note_unparked();
                        continue;
                    }
                    trace!(channel = %state.name, "send resumes a parked receiver");
                    self.note_unparked();
                    self.ready.push_back(Runnable::Resume {
                        task,
                        effect,
                        input: Ok(value),
                    });
                    return Ok(());
                }
                Waiter::Race { out, done } => {
                    if done.get() {
                        continue;
                    }
                    done.set(true);
                    drop(state);
                    // Forward into the race output; it cannot be closed
                    // before its inputs resolve.
                    return self.send(&out, value);
                }
            }
        }
        trace!(channel = %state.name, depth = state.queue.len() + 1, "send buffered");
        state.queue.push_back(value);
        Ok(())
    }

    /// Non-suspending receive: a buffered value if there is one.
    pub fn try_receive(&mut self, channel: &ChannelHandle) -> TryReceive {
        let mut state = channel.borrow_mut();
        if let Some(value) = state.queue.pop_front() {
            TryReceive::Value(value)
        } else if state.closed {
            TryReceive::Closed
        } else {
            TryReceive::Empty
        }
    }

    /// Park a task's continuation as a receiver on `channel`.
    pub fn park_receiver(
        &mut self,
        channel: &ChannelHandle,
        task: TaskHandle,
        effect: Heap<EffectData>,
    ) {
        self.note_parked();
        channel
            .borrow_mut()
            .waiters
            .push_back(Waiter::Task { task, effect });
    }

    /// Close a channel: every pending receiver fails with a channel-closed
    /// error.
    pub fn close(&mut self, channel: &ChannelHandle) {
        let mut state = channel.borrow_mut();
        if state.closed {
            return;
        }
        state.closed = true;
        let name = state.name.clone();
        let waiters = std::mem::take(&mut state.waiters);
        drop(state);
        for waiter in waiters {
            if let Waiter::Task { task, effect } = waiter {
                self.note_unparked();
                self.ready.push_back(Runnable::Resume {
                    task,
                    effect,
                    input: Err(error::channel_closed(&name)),
                });
            }
        }
    }

    /// Build the racing channel for `a + b`: whichever input produces a
    /// value first forwards it (exactly once) into the output.
    pub fn race(&mut self, a: &ChannelHandle, b: &ChannelHandle) -> Value {
        let out_value = Value::channel(ChannelState::new(format!(
            "{}+{}",
            a.borrow().name,
            b.borrow().name
        )));
        let Value::Channel(out) = &out_value else {
            return out_value;
        };
        let done = Rc::new(Cell::new(false));

        for input in [a, b] {
            // A value already buffered wins the race immediately.
            let buffered = input.borrow_mut().queue.pop_front();
            if let Some(value) = buffered {
                if !done.get() {
                    done.set(true);
                    let _ = self.send(out, value);
                }
                continue;
            }
            input.borrow_mut().waiters.push_back(Waiter::Race {
                out: out.clone(),
                done: done.clone(),
            });
        }
        out_value
    }

    /// Cancel a task and, transitively, its children. Waiters are resumed
    /// with the cancellation marker value supplied by the caller.
    pub fn cancel(&mut self, task: &TaskHandle, marker: &Value) {
        let mut state = task.borrow_mut();
        if !state.is_running() {
            return;
        }
        state.status = TaskStatus::Cancelled;
        let waiters = std::mem::take(&mut state.waiters);
        let children = std::mem::take(&mut state.children);
        drop(state);
        trace!(waiters = waiters.len(), children = children.len(), "task cancelled");
        for (waiter, effect) in waiters {
            self.note_unparked();
            self.ready.push_back(Runnable::Resume {
                task: waiter,
                effect,
                input: Ok(marker.clone()),
            });
        }
        for child in children {
            self.cancel(&child, marker);
        }
    }

    /// Record a task's completion and wake its waiters.
    pub fn complete(&mut self, task: &TaskHandle, outcome: Result<Value, RuntimeError>) {
        let mut state = task.borrow_mut();
        if !state.is_running() {
            return;
        }
        state.status = match &outcome {
            Ok(v) => TaskStatus::Done(v.clone()),
            Err(e) => TaskStatus::Failed(e.clone()),
        };
        let waiters = std::mem::take(&mut state.waiters);
        drop(state);
        for (waiter, effect) in waiters {
            self.note_unparked();
            self.ready.push_back(Runnable::Resume {
                task: waiter,
                effect,
                input: outcome.clone(),
            });
        }
    }

    /// Park a task's continuation on another task's completion.
    pub fn park_awaiter(&mut self, target: &TaskHandle, task: TaskHandle, effect: Heap<EffectData>) {
        self.note_parked();
        target.borrow_mut().waiters.push((task, effect));
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a non-suspending receive probe.
pub enum TryReceive {
    Value(Value),
    Empty,
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str) -> ChannelHandle {
        match Value::channel(ChannelState::new(name)) {
            Value::Channel(h) => h,
            _ => panic!("factory returned wrong variant"),
        }
    }

    #[test]
    fn test_send_buffers_in_order() {
        let mut sched = Scheduler::new();
        let ch = channel("t");
        sched.send(&ch, Value::Number(1.0)).ok();
        sched.send(&ch, Value::Number(2.0)).ok();
        assert!(matches!(
            sched.try_receive(&ch),
            TryReceive::Value(Value::Number(n)) if n == 1.0
        ));
        assert!(matches!(
            sched.try_receive(&ch),
            TryReceive::Value(Value::Number(n)) if n == 2.0
        ));
        assert!(matches!(sched.try_receive(&ch), TryReceive::Empty));
    }

    #[test]
    fn test_send_to_closed_channel_fails() {
        let mut sched = Scheduler::new();
        let ch = channel("t");
        sched.close(&ch);
        assert!(sched.send(&ch, Value::Number(1.0)).is_err());
        assert!(matches!(sched.try_receive(&ch), TryReceive::Closed));
    }

    #[test]
    fn test_race_prefers_first_buffered_value() {
        let mut sched = Scheduler::new();
        let a = channel("a");
        let b = channel("b");
        sched.send(&a, Value::Number(7.0)).ok();
        let out = sched.race(&a, &b);
        let Value::Channel(out) = out else {
            panic!("race did not build a channel");
        };
        assert!(matches!(
            sched.try_receive(&out),
            TryReceive::Value(Value::Number(n)) if n == 7.0
        ));
    }

    #[test]
    fn test_race_forwards_only_once() {
        let mut sched = Scheduler::new();
        let a = channel("a");
        let b = channel("b");
        let out = sched.race(&a, &b);
        let Value::Channel(out) = out else {
            panic!("race did not build a channel");
        };
        sched.send(&a, Value::Number(1.0)).ok();
        sched.send(&b, Value::Number(2.0)).ok();
        assert!(matches!(
            sched.try_receive(&out),
            TryReceive::Value(Value::Number(n)) if n == 1.0
        ));
        // The second arm lost the race; its value stays buffered there.
        assert!(matches!(sched.try_receive(&out), TryReceive::Empty));
        assert!(matches!(
            sched.try_receive(&b),
            TryReceive::Value(Value::Number(n)) if n == 2.0
        ));
    }
}
