//! Embedder-facing façade over `js_runtime` (spec §6.1): the entry points a
//! host embeds against — eval/eval_async/eval_module(_async), module
//! wiring, global bindings, and the `sendMessage` bridge — rather than
//! reaching into the evaluator directly. Grounded on `nova_cli`'s
//! `Instance`/`CliHostHooks` split, simplified to a single-threaded
//! synchronous engine: no macrotask queue or off-thread workers, since
//! spec §5 scopes concurrency out and this engine's `await` already drains
//! the microtask queue inline.

mod message_bus;

pub use message_bus::{HandlerId, MessageBus};

pub use js_runtime::{Agent, EngineError, ExceptionType, JsError, JsResult, ModuleLoader, ModuleResolver, Options, Value};

use js_runtime::{await_value, declare_var, eval_module as run_module, eval_program, get_binding, has_binding, initialize_binding, new_promise, set_binding, settle_promise, Callable, ObjectData, PromiseStatus, PropertyDescriptor, PropertyKey};
use std::cell::RefCell;
use std::rc::Rc;

/// Renders an uncaught error the way a host's error channel or the test262
/// runner's negative-test matcher wants it: the typed exception kind, not
/// whatever `Value::to_display_string` falls back to for an object (which
/// doesn't run user-defined `toString`). Walks the prototype chain for
/// `message` the same way `builtins::install_error_constructor`'s
/// `Error.prototype.toString` does, just without needing `&mut Agent`.
pub fn describe_error(err: &EngineError) -> std::string::String {
    match err {
        EngineError::Parse(e) => format!("SyntaxError: {e}"),
        EngineError::Runtime(e) => {
            let message = match &e.value {
                Value::Object(o) => {
                    let mut current = Some(o.clone());
                    let mut message = None;
                    while let Some(obj) = current {
                        if let Some(desc) = obj.borrow().get_own(&PropertyKey::from_str("message")) {
                            message = desc.value.map(|v| v.to_display_string());
                            break;
                        }
                        current = obj.borrow().prototype.clone();
                    }
                    message.unwrap_or_default()
                }
                other => other.to_display_string(),
            };
            if message.is_empty() { e.kind.name().to_string() } else { format!("{}: {}", e.kind.name(), message) }
        }
    }
}

/// One embedding's engine instance: an `Agent` plus the host-installed
/// `sendMessage`/`sendMessageAsync` globals (spec §6.2).
pub struct Engine {
    pub agent: Agent,
    bus: Rc<RefCell<MessageBus>>,
}

impl Engine {
    pub fn new(options: Options) -> Self {
        let mut engine = Engine { agent: Agent::new(options), bus: Rc::new(RefCell::new(MessageBus::default())) };
        engine.install_message_bridge();
        engine
    }

    fn install_message_bridge(&mut self) {
        let global = self.agent.current_realm().global_object.clone();
        let function_proto = self.agent.current_realm().intrinsics.function_prototype.clone();

        let bus_sync = self.bus.clone();
        let send = ObjectData::new(Some(function_proto.clone()));
        send.borrow_mut().callable = Some(Callable::Native {
            name: "sendMessage".to_string(),
            arity: 1,
            func: Rc::new(move |agent, _this, args| dispatch_sync(agent, &bus_sync, args)),
        });
        global.borrow_mut().set_own("sendMessage".into(), PropertyDescriptor::data(Value::Object(send), true, false, true));

        let bus_async = self.bus.clone();
        let send_async = ObjectData::new(Some(function_proto));
        send_async.borrow_mut().callable = Some(Callable::Native {
            name: "sendMessageAsync".to_string(),
            arity: 1,
            func: Rc::new(move |agent, _this, args| {
                let promise = new_promise(agent);
                match dispatch_async(agent, &bus_async, args) {
                    Ok(v) => settle_promise(agent, &promise, PromiseStatus::Fulfilled, v),
                    Err(e) => settle_promise(agent, &promise, PromiseStatus::Rejected, e.value),
                }
                Ok(Value::Object(promise))
            }),
        });
        global.borrow_mut().set_own("sendMessageAsync".into(), PropertyDescriptor::data(Value::Object(send_async), true, false, true));
    }

    /// `eval(source) → value`, synchronous; throws on parse or runtime error.
    pub fn eval(&mut self, source: &str) -> Result<Value, EngineError> {
        let output = js_parser::Parser::parse_program(source, false)?;
        let ast = Rc::new(output.ast);
        Ok(eval_program(&mut self.agent, &ast, output.program)?)
    }

    /// As `eval`, but awaits a returned JS promise before returning.
    pub fn eval_async(&mut self, source: &str) -> Result<Value, EngineError> {
        let value = self.eval(source)?;
        Ok(await_value(&mut self.agent, value)?)
    }

    /// Parses `source` in module mode (strict, `import`/`export` legal,
    /// top-level `this` is `undefined`) under `specifier`, links its
    /// imports, and evaluates it.
    pub fn eval_module(&mut self, specifier: &str, source: &str) -> Result<Value, EngineError> {
        self.agent.modules.insert_source(specifier, source)?;
        Ok(run_module(&mut self.agent, specifier)?)
    }

    pub fn eval_module_async(&mut self, specifier: &str, source: &str) -> Result<Value, EngineError> {
        let value = self.eval_module(specifier, source)?;
        Ok(await_value(&mut self.agent, value)?)
    }

    /// Inserts an unevaluated module into the registry without running it,
    /// so a later `import` of `specifier` resolves without consulting the
    /// loader.
    pub fn register_module(&mut self, specifier: &str, source: &str) -> Result<(), EngineError> {
        self.agent.modules.insert_source(specifier, source)?;
        Ok(())
    }

    pub fn set_module_loader(&mut self, loader: impl ModuleLoader + 'static) {
        self.agent.loader = Some(Box::new(loader));
    }

    pub fn set_module_resolver(&mut self, resolver: impl ModuleResolver + 'static) {
        self.agent.resolver = Box::new(resolver);
    }

    /// Inserts a var-kind binding into the global environment.
    pub fn register_global(&mut self, name: &str, value: Value) {
        let env = self.agent.global_env();
        declare_var(&env, name);
        initialize_binding(&env, name, value);
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        get_binding(&self.agent.global_env(), name).ok()
    }

    pub fn set_global(&mut self, name: &str, value: Value) -> JsResult<()> {
        set_binding(&self.agent.global_env(), name, value)
    }

    pub fn has_global(&self, name: &str) -> bool {
        has_binding(&self.agent.global_env(), name)
    }

    /// Registers a handler on `channel`, invoked (in registration order)
    /// every time script calls `sendMessage`/`sendMessageAsync` on it.
    pub fn on_message(&mut self, channel: &str, handler: impl Fn(&mut Agent, &[Value]) -> JsResult<Value> + 'static) -> HandlerId {
        self.bus.borrow_mut().register(channel, handler)
    }

    pub fn remove_channel(&mut self, channel: &str) {
        self.bus.borrow_mut().remove_channel(channel);
    }

    pub fn remove_callback(&mut self, channel: &str, handler: HandlerId) {
        self.bus.borrow_mut().remove_callback(channel, handler);
    }

    pub fn clear_message_system(&mut self) {
        self.bus.borrow_mut().clear();
    }
}

fn dispatch_sync(agent: &mut Agent, bus: &Rc<RefCell<MessageBus>>, args: &[Value]) -> JsResult<Value> {
    let channel = args.first().cloned().unwrap_or(Value::Undefined).to_display_string();
    let rest = if args.is_empty() { &[][..] } else { &args[1..] };
    let handlers = bus.borrow().handlers_for(&channel);
    let mut last = Value::Undefined;
    for handler in handlers {
        last = handler(agent, rest)?;
    }
    Ok(last)
}

/// Each handler's return value is awaited before the next handler runs,
/// so a handler returning a pending host promise can't race the next one.
fn dispatch_async(agent: &mut Agent, bus: &Rc<RefCell<MessageBus>>, args: &[Value]) -> JsResult<Value> {
    let channel = args.first().cloned().unwrap_or(Value::Undefined).to_display_string();
    let rest = if args.is_empty() { &[][..] } else { &args[1..] };
    let handlers = bus.borrow().handlers_for(&channel);
    let mut last = Value::Undefined;
    for handler in handlers {
        let result = handler(agent, rest)?;
        last = await_value(agent, result)?;
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_returns_expression_value() {
        let mut engine = Engine::new(Options::default());
        let result = engine.eval("1 + 2").unwrap();
        assert_eq!(result.to_display_string(), "3");
    }

    #[test]
    fn globals_round_trip() {
        let mut engine = Engine::new(Options::default());
        engine.register_global("answer", Value::Number(42.0));
        assert!(engine.has_global("answer"));
        assert_eq!(engine.get_global("answer").unwrap().to_display_string(), "42");
        engine.set_global("answer", Value::Number(7.0)).unwrap();
        assert_eq!(engine.eval("answer").unwrap().to_display_string(), "7");
    }

    #[test]
    fn send_message_invokes_registered_handler() {
        let mut engine = Engine::new(Options::default());
        engine.on_message("ping", |_agent, args| Ok(args.first().cloned().unwrap_or(Value::Undefined)));
        let result = engine.eval(r#"sendMessage("ping", "pong")"#).unwrap();
        assert_eq!(result.to_display_string(), "pong");
    }

    #[test]
    fn remove_channel_drops_all_handlers() {
        let mut engine = Engine::new(Options::default());
        engine.on_message("ping", |_agent, _args| Ok(Value::Number(1.0)));
        engine.remove_channel("ping");
        let result = engine.eval(r#"sendMessage("ping")"#).unwrap();
        assert!(result.is_undefined());
    }

    #[test]
    fn eval_module_exposes_named_exports_to_importer() {
        let mut engine = Engine::new(Options::default());
        engine.register_module("math", "export const double = x => x * 2;").unwrap();
        let result = engine.eval_module("main", "import { double } from 'math'; double(21)").unwrap();
        assert_eq!(result.to_display_string(), "42");
    }
}
