//! Microtask queue and promise reaction jobs (spec §3.5). Grounded on
//! `nova_vm::ecmascript::execution::agent`'s `Job` abstraction: a job is a
//! boxed closure over an `Agent`, queued FIFO and drained by
//! `Agent::run_jobs` between host turns, with uncaught promise rejections
//! tracked separately so the host can report them after the queue empties.

use crate::error::JsError;
use crate::value::Value;
use std::collections::VecDeque;

pub type Job = Box<dyn FnOnce(&mut crate::agent::Agent)>;

#[derive(Default)]
pub struct JobQueue {
    jobs: VecDeque<Job>,
}

impl JobQueue {
    pub fn enqueue(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn pop(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseStatus {
    Pending,
    Fulfilled,
    Rejected,
}

pub struct PromiseState {
    pub status: PromiseStatus,
    pub result: Value,
    pub fulfill_reactions: Vec<Value>,
    pub reject_reactions: Vec<Value>,
    pub handled: bool,
}

impl Default for PromiseState {
    fn default() -> Self {
        PromiseState { status: PromiseStatus::Pending, result: Value::Undefined, fulfill_reactions: Vec::new(), reject_reactions: Vec::new(), handled: false }
    }
}

/// Settles a promise and schedules its queued reaction jobs as microtasks,
/// per spec's `FulfillPromise`/`RejectPromise`. A promise already settled is
/// left untouched (idempotent resolve/reject, matching capability
/// semantics).
pub fn settle_promise(agent: &mut crate::agent::Agent, promise: &crate::object::ObjectRef, status: PromiseStatus, value: Value) {
    let reactions = {
        let mut obj = promise.borrow_mut();
        let crate::object::ObjectKind::Promise(state) = &mut obj.kind else { return };
        let mut state = state.borrow_mut();
        if state.status != PromiseStatus::Pending {
            return;
        }
        state.status = status;
        state.result = value.clone();
        match status {
            PromiseStatus::Fulfilled => std::mem::take(&mut state.fulfill_reactions),
            _ => std::mem::take(&mut state.reject_reactions),
        }
    };
    for reaction in reactions {
        let value = value.clone();
        agent.job_queue.enqueue(Box::new(move |agent| {
            let _ = crate::evaluator::call_function(agent, reaction, Value::Undefined, &[value]);
        }));
    }
    if status == PromiseStatus::Rejected {
        agent.note_rejection(promise.clone());
    }
}

pub fn new_promise(agent: &mut crate::agent::Agent) -> crate::object::ObjectRef {
    let proto = agent.current_realm().intrinsics.promise_prototype.clone();
    let obj = crate::object::ObjectData::new(Some(proto));
    obj.borrow_mut().kind = crate::object::ObjectKind::Promise(std::rc::Rc::new(std::cell::RefCell::new(PromiseState::default())));
    obj
}

/// JsError -> rejected-promise helper used by async-function completion.
pub fn reject_with(agent: &mut crate::agent::Agent, promise: &crate::object::ObjectRef, err: JsError) {
    settle_promise(agent, promise, PromiseStatus::Rejected, err.value);
}
