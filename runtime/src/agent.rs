//! The `Agent`: one embedding's worth of engine state (spec §3.3, §5).
//! Grounded on `nova_vm::ecmascript::execution::agent::Agent` — a realm
//! stack (module evaluation and `eval` can push a fresh one), the
//! microtask queue, the module registry, and `HostHooks` for the handful of
//! embedder-observable operations (module resolution/loading, uncaught
//! rejection reporting) spec §6 exposes.

use crate::environment::EnvironmentRef;
use crate::error::JsError;
use crate::microtask::JobQueue;
use crate::module::{DefaultResolver, ModuleLoader, ModuleRegistry, ModuleResolver};
use crate::object::ObjectRef;
use crate::realm::Realm;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub type JsResult<T> = Result<T, JsError>;

/// Tunable limits, grounded on `Agent::Options` and exposed to the host via
/// `clap` flags in the `cli` crate (spec §10, "Configuration").
#[derive(Debug, Clone)]
pub struct Options {
    /// Upper bound on evaluator recursion depth, guarding the host process
    /// against a stack overflow from runaway or malicious recursive script.
    pub max_call_depth: usize,
    /// Upper bound on total statements executed, used by the test262
    /// runner to bound non-terminating negative-test scripts.
    pub max_steps: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Options { max_call_depth: 2048, max_steps: None }
    }
}

pub struct Agent {
    pub realms: Vec<Realm>,
    pub job_queue: JobQueue,
    pub modules: ModuleRegistry,
    pub options: Options,
    pub call_depth: usize,
    pub steps: u64,
    pub resolver: Box<dyn ModuleResolver>,
    pub loader: Option<Box<dyn ModuleLoader>>,
    pending_rejections: Vec<ObjectRef>,
    /// Per-generator-call sinks that `yield` pushes into, one pushed per
    /// eager generator-body run (see `evaluator::make_generator`). A stack
    /// rather than a single slot so a generator body that itself drives
    /// another generator nests correctly.
    pub generator_stack: Vec<Rc<RefCell<VecDeque<Value>>>>,
    /// `new.target` values, one pushed per `construct` call.
    pub new_target_stack: Vec<Value>,
}

impl Agent {
    pub fn new(options: Options) -> Self {
        Agent {
            realms: vec![Realm::new()],
            job_queue: JobQueue::default(),
            modules: ModuleRegistry::default(),
            options,
            call_depth: 0,
            steps: 0,
            resolver: Box::new(DefaultResolver),
            loader: None,
            pending_rejections: Vec::new(),
            generator_stack: Vec::new(),
            new_target_stack: Vec::new(),
        }
    }

    pub fn current_realm(&self) -> &Realm {
        self.realms.last().expect("at least one realm is always pushed")
    }

    pub fn current_realm_mut(&mut self) -> &mut Realm {
        self.realms.last_mut().expect("at least one realm is always pushed")
    }

    pub fn global_env(&self) -> EnvironmentRef {
        self.current_realm().global_env.clone()
    }

    pub fn note_rejection(&mut self, promise: ObjectRef) {
        self.pending_rejections.push(promise);
    }

    pub fn take_unhandled_rejections(&mut self) -> Vec<ObjectRef> {
        std::mem::take(&mut self.pending_rejections)
    }

    pub fn enter_call(&mut self) -> JsResult<()> {
        if self.call_depth >= self.options.max_call_depth {
            return Err(JsError::new(crate::error::ExceptionType::RangeError, "Maximum call stack size exceeded"));
        }
        self.call_depth += 1;
        Ok(())
    }

    pub fn exit_call(&mut self) {
        self.call_depth -= 1;
    }

    /// Drains the microtask queue, per spec §3.5's "run to completion
    /// between host turns" rule. Called by `host::eval`/`eval_async` after
    /// top-level script evaluation and by the `cli` REPL after each entry.
    pub fn run_jobs(&mut self) {
        while let Some(job) = self.job_queue.pop() {
            job(self);
        }
    }
}
