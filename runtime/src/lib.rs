//! Value model, environment chain, microtask queue, module registry and
//! tree-walking evaluator (spec §§3-7). Grounded on
//! `nova_vm::ecmascript::execution`'s module layout — `agent`/`realm`/
//! `environments` split into their own modules, with the bytecode
//! interpreter replaced here by a direct `js_ast` walk (spec's REDESIGN FLAG
//! trading Nova's compile-to-bytecode pipeline for a simpler evaluator, since
//! this crate has no JIT or snapshot-restore requirement to justify it).

pub mod agent;
pub mod builtins;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod microtask;
pub mod module;
pub mod object;
pub mod realm;
pub mod value;

pub use agent::{Agent, JsResult, Options};
pub use environment::{declare_var, get_binding, has_binding, initialize_binding, set_binding, EnvironmentRef};
pub use error::{EngineError, ExceptionType, JsError};
pub use evaluator::{await_value, call_function, construct, eval_expression, eval_module, eval_program, Completion};
pub use microtask::{new_promise, settle_promise, PromiseStatus};
pub use module::{ModuleLoader, ModuleRegistry, ModuleResolver, ModuleStatus};
pub use object::{Callable, ObjectData, ObjectRef, PropertyDescriptor, PropertyKey};
pub use value::Value;
