//! Ordinary object shape (spec §3.3). Grounded on the teacher's abandoned
//! prototype's `common::value::object`, which the pack keeps as the
//! reference for a cyclic-graph-safe property list (a property can hold a
//! value that points back at its own owning object) — the same shape is
//! needed here since `Rc<RefCell<ObjectData>>` lets `obj.self = obj` compile
//! and run without any special-casing.

use crate::value::{SymbolData, Value};
use ahash::AHashMap;
use js_ast::{Ast, Function, NodeRef};
use std::cell::RefCell;
use std::rc::Rc;

pub type ObjectRef = Rc<RefCell<ObjectData>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(Rc<str>),
    Symbol(*const SymbolData),
}

impl PropertyKey {
    pub fn from_str(s: &str) -> PropertyKey {
        PropertyKey::String(Rc::from(s))
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::from_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub value: Option<Value>,
    pub get: Option<Value>,
    pub set: Option<Value>,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    pub fn data(value: Value, writable: bool, enumerable: bool, configurable: bool) -> Self {
        PropertyDescriptor { value: Some(value), get: None, set: None, writable, enumerable, configurable }
    }

    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }
}

/// Either a host-native function (built-ins) or an ECMAScript function
/// closure capturing its defining environment, matching the call protocol
/// spec §4.5 describes.
#[derive(Clone)]
pub enum Callable {
    Native { name: std::string::String, arity: u32, func: Rc<dyn Fn(&mut crate::agent::Agent, Value, &[Value]) -> crate::agent::JsResult<Value>> },
    Ecmascript {
        ast: Rc<Ast>,
        function: Rc<Function>,
        closure: crate::environment::EnvironmentRef,
        home_object: Option<ObjectRef>,
        this_mode: ThisMode,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThisMode {
    Lexical,
    Strict,
    Global,
}

#[derive(Clone, Default)]
pub enum ObjectKind {
    #[default]
    Ordinary,
    Array,
    Error,
    BooleanBox(bool),
    NumberBox(f64),
    StringBox(Rc<str>),
    Arguments,
    Promise(Rc<RefCell<crate::microtask::PromiseState>>),
}

#[derive(Default)]
pub struct ObjectData {
    pub properties: AHashMap<PropertyKey, PropertyDescriptor>,
    pub insertion_order: Vec<PropertyKey>,
    pub prototype: Option<ObjectRef>,
    pub extensible: bool,
    pub kind: ObjectKind,
    pub callable: Option<Callable>,
    pub is_class_constructor: bool,
}

impl ObjectData {
    pub fn new(prototype: Option<ObjectRef>) -> ObjectRef {
        Rc::new(RefCell::new(ObjectData { prototype, extensible: true, ..Default::default() }))
    }

    pub fn is_callable(&self) -> bool {
        self.callable.is_some()
    }

    pub fn display_tag(&self) -> std::string::String {
        match &self.kind {
            ObjectKind::Array => "[array]".to_string(),
            ObjectKind::Error => "[error]".to_string(),
            _ if self.is_callable() => "[function]".to_string(),
            _ => "[object Object]".to_string(),
        }
    }

    /// OrdinaryGet (simplified: no receiver-based accessor rebinding beyond
    /// a single level, sufficient for the evaluator's property-read path).
    pub fn get_own(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        self.properties.get(key).cloned()
    }

    pub fn set_own(&mut self, key: PropertyKey, desc: PropertyDescriptor) {
        if !self.properties.contains_key(&key) {
            self.insertion_order.push(key.clone());
        }
        self.properties.insert(key, desc);
    }

    pub fn delete_own(&mut self, key: &PropertyKey) -> bool {
        self.insertion_order.retain(|k| k != key);
        self.properties.remove(key).is_some()
    }

    pub fn own_keys(&self) -> Vec<PropertyKey> {
        self.insertion_order.clone()
    }
}

/// Walks the prototype chain performing `[[Get]]`.
pub fn ordinary_get(agent: &mut crate::agent::Agent, object: &ObjectRef, key: &PropertyKey, receiver: &Value) -> crate::agent::JsResult<Value> {
    let mut current = object.clone();
    loop {
        let desc = current.borrow().get_own(key);
        if let Some(desc) = desc {
            if let Some(getter) = desc.get {
                return crate::evaluator::call_function(agent, getter, receiver.clone(), &[]);
            }
            return Ok(desc.value.unwrap_or(Value::Undefined));
        }
        let proto = current.borrow().prototype.clone();
        match proto {
            Some(p) => current = p,
            None => return Ok(Value::Undefined),
        }
    }
}

pub fn ordinary_set(agent: &mut crate::agent::Agent, object: &ObjectRef, key: PropertyKey, value: Value) -> crate::agent::JsResult<()> {
    let existing = object.borrow().get_own(&key);
    match existing {
        Some(mut desc) if !desc.is_accessor() => {
            desc.value = Some(value);
            object.borrow_mut().set_own(key, desc);
        }
        Some(desc) if desc.is_accessor() => {
            if let Some(setter) = desc.set.clone() {
                crate::evaluator::call_function(agent, setter, Value::Object(object.clone()), &[value])?;
            }
        }
        _ => {
            object.borrow_mut().set_own(key, PropertyDescriptor::data(value, true, true, true));
        }
    }
    Ok(())
}

pub fn has_property(object: &ObjectRef, key: &PropertyKey) -> bool {
    let mut current = object.clone();
    loop {
        if current.borrow().properties.contains_key(key) {
            return true;
        }
        let proto = current.borrow().prototype.clone();
        match proto {
            Some(p) => current = p,
            None => return false,
        }
    }
}

/// Stable placeholder so `PropertyKey::Symbol` can be hashed/compared by
/// pointer identity without exposing the raw pointer API at call sites.
impl From<&Rc<SymbolData>> for PropertyKey {
    fn from(s: &Rc<SymbolData>) -> Self {
        PropertyKey::Symbol(Rc::as_ptr(s))
    }
}

pub type _FunctionNodeRef = NodeRef;
