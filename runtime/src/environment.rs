//! Environment records (spec §3.4). Grounded on
//! `nova_vm::ecmascript::execution::environments::declarative_environment`
//! and `global_environment`: a `Binding` carries an `Option<Value>` so an
//! absent value (`None`) represents the temporal dead zone for a
//! `let`/`const`/class binding that has been declared but not yet
//! initialized, exactly as the teacher's `Binding { value: Option<Value>, ..}`
//! does.

use crate::error::{ExceptionType, JsError};
use crate::object::ObjectRef;
use crate::value::Value;
use ahash::AHashMap;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Option<Value>,
    pub mutable: bool,
    pub deletable: bool,
    /// `var`/function bindings may be re-declared; `let`/`const`/class may
    /// not. Checked at declaration time by the evaluator's hoisting pass.
    pub strict: bool,
}

impl Binding {
    fn uninitialized(mutable: bool) -> Self {
        Binding { value: None, mutable, deletable: false, strict: true }
    }

    fn initialized(value: Value, mutable: bool, deletable: bool) -> Self {
        Binding { value: Some(value), mutable, deletable, strict: false }
    }
}

pub enum EnvironmentKind {
    Declarative { bindings: AHashMap<std::string::String, Binding> },
    Function { bindings: AHashMap<std::string::String, Binding>, this_value: RefCell<Option<Value>>, home_object: Option<ObjectRef> },
    Global { bindings: AHashMap<std::string::String, Binding>, global_object: ObjectRef },
    Module { bindings: AHashMap<std::string::String, Binding> },
    /// An object environment record (spec §3.4), created for a `with`
    /// statement's body: unqualified identifiers resolve against
    /// `binding_object`'s properties before falling through to `outer`.
    Object { bindings: AHashMap<std::string::String, Binding>, binding_object: ObjectRef },
}

pub struct Environment {
    pub kind: EnvironmentKind,
    pub outer: Option<EnvironmentRef>,
}

pub type EnvironmentRef = Rc<RefCell<Environment>>;

impl Environment {
    pub fn new_declarative(outer: Option<EnvironmentRef>) -> EnvironmentRef {
        Rc::new(RefCell::new(Environment { kind: EnvironmentKind::Declarative { bindings: AHashMap::new() }, outer }))
    }

    pub fn new_function(outer: Option<EnvironmentRef>, this_value: Option<Value>, home_object: Option<ObjectRef>) -> EnvironmentRef {
        Rc::new(RefCell::new(Environment {
            kind: EnvironmentKind::Function { bindings: AHashMap::new(), this_value: RefCell::new(this_value), home_object },
            outer,
        }))
    }

    pub fn new_global(global_object: ObjectRef) -> EnvironmentRef {
        Rc::new(RefCell::new(Environment { kind: EnvironmentKind::Global { bindings: AHashMap::new(), global_object }, outer: None }))
    }

    pub fn new_object(outer: Option<EnvironmentRef>, binding_object: ObjectRef) -> EnvironmentRef {
        Rc::new(RefCell::new(Environment { kind: EnvironmentKind::Object { bindings: AHashMap::new(), binding_object }, outer }))
    }

    fn bindings(&self) -> &AHashMap<std::string::String, Binding> {
        match &self.kind {
            EnvironmentKind::Declarative { bindings }
            | EnvironmentKind::Function { bindings, .. }
            | EnvironmentKind::Global { bindings, .. }
            | EnvironmentKind::Module { bindings }
            | EnvironmentKind::Object { bindings, .. } => bindings,
        }
    }

    fn bindings_mut(&mut self) -> &mut AHashMap<std::string::String, Binding> {
        match &mut self.kind {
            EnvironmentKind::Declarative { bindings }
            | EnvironmentKind::Function { bindings, .. }
            | EnvironmentKind::Global { bindings, .. }
            | EnvironmentKind::Module { bindings }
            | EnvironmentKind::Object { bindings, .. } => bindings,
        }
    }
}

/// The object an `Object`/`Global` environment record defers unresolved
/// bindings to — `with`'s bound object, or the global object itself.
fn binding_object(kind: &EnvironmentKind) -> Option<&ObjectRef> {
    match kind {
        EnvironmentKind::Global { global_object, .. } => Some(global_object),
        EnvironmentKind::Object { binding_object, .. } => Some(binding_object),
        _ => None,
    }
}

pub fn declare_mutable(env: &EnvironmentRef, name: &str, deletable: bool) {
    env.borrow_mut().bindings_mut().entry(name.to_string()).or_insert_with(|| Binding::uninitialized(true)).deletable = deletable;
}

/// `var`/function hoisting initializes immediately to `undefined` rather
/// than leaving the binding in the temporal dead zone.
pub fn declare_var(env: &EnvironmentRef, name: &str) {
    env.borrow_mut()
        .bindings_mut()
        .entry(name.to_string())
        .or_insert_with(|| Binding::initialized(Value::Undefined, true, false));
}

pub fn declare_immutable(env: &EnvironmentRef, name: &str) {
    env.borrow_mut().bindings_mut().insert(name.to_string(), Binding::uninitialized(false));
}

pub fn initialize_binding(env: &EnvironmentRef, name: &str, value: Value) {
    let mut e = env.borrow_mut();
    if let Some(binding) = e.bindings_mut().get_mut(name) {
        binding.value = Some(value);
    }
}

/// PutValue on a resolved binding (spec's `SetMutableBinding`). Walks the
/// environment chain, raising `ReferenceError` for an unresolved identifier
/// and for assignment to an uninitialized (TDZ) or immutable binding.
pub fn set_binding(env: &EnvironmentRef, name: &str, value: Value) -> Result<(), JsError> {
    let mut current = env.clone();
    loop {
        let found = current.borrow().bindings().contains_key(name);
        if found {
            let mut e = current.borrow_mut();
            let binding = e.bindings_mut().get_mut(name).unwrap();
            if binding.value.is_none() {
                return Err(JsError::new(ExceptionType::ReferenceError, format!("Cannot access '{name}' before initialization")));
            }
            if !binding.mutable {
                return Err(JsError::new(ExceptionType::TypeError, format!("Assignment to constant variable '{name}'.")));
            }
            binding.value = Some(value);
            return Ok(());
        }
        if let Some(obj) = binding_object(&current.borrow().kind) {
            if crate::object::has_property(obj, &name.into()) {
                obj.borrow_mut().set_own(name.into(), crate::object::PropertyDescriptor::data(value, true, true, true));
                return Ok(());
            }
        }
        let outer = current.borrow().outer.clone();
        match outer {
            Some(o) => current = o,
            None => return Err(JsError::new(ExceptionType::ReferenceError, format!("{name} is not defined"))),
        }
    }
}

/// GetBindingValue, walking outward until the name resolves.
pub fn get_binding(env: &EnvironmentRef, name: &str) -> Result<Value, JsError> {
    let mut current = env.clone();
    loop {
        let binding = current.borrow().bindings().get(name).cloned();
        if let Some(binding) = binding {
            return binding.value.ok_or_else(|| JsError::new(ExceptionType::ReferenceError, format!("Cannot access '{name}' before initialization")));
        }
        if let Some(obj) = binding_object(&current.borrow().kind) {
            if let Some(desc) = obj.borrow().get_own(&name.into()) {
                return Ok(desc.value.unwrap_or(Value::Undefined));
            }
        }
        let outer = current.borrow().outer.clone();
        match outer {
            Some(o) => current = o,
            None => return Err(JsError::new(ExceptionType::ReferenceError, format!("{name} is not defined"))),
        }
    }
}

pub fn has_binding(env: &EnvironmentRef, name: &str) -> bool {
    let mut current = env.clone();
    loop {
        if current.borrow().bindings().contains_key(name) {
            return true;
        }
        if let Some(obj) = binding_object(&current.borrow().kind) {
            if crate::object::has_property(obj, &name.into()) {
                return true;
            }
        }
        let outer = current.borrow().outer.clone();
        match outer {
            Some(o) => current = o,
            None => return false,
        }
    }
}

/// Resolves the nearest function environment's `this` binding, skipping
/// over declarative/block environments the way lexical `this` must.
pub fn resolve_this(env: &EnvironmentRef) -> Value {
    let mut current = env.clone();
    loop {
        if let EnvironmentKind::Function { this_value, .. } = &current.borrow().kind {
            if let Some(v) = this_value.borrow().clone() {
                return v;
            }
        }
        if let EnvironmentKind::Global { global_object, .. } = &current.borrow().kind {
            return Value::Object(global_object.clone());
        }
        let outer = current.borrow().outer.clone();
        match outer {
            Some(o) => current = o,
            None => return Value::Undefined,
        }
    }
}

pub fn resolve_home_object(env: &EnvironmentRef) -> Option<ObjectRef> {
    let mut current = env.clone();
    loop {
        if let EnvironmentKind::Function { home_object, .. } = &current.borrow().kind {
            if home_object.is_some() {
                return home_object.clone();
            }
        }
        let outer = current.borrow().outer.clone();
        match outer {
            Some(o) => current = o,
            None => return None,
        }
    }
}
