//! A minimal standard-library subset (spec §10 Non-goals: not a conformance
//! target, "enough to exercise the evaluator substrate end to end").
//! Grounded on `nova_vm::ecmascript::builtins::{ordinary, array,
//! builtin_function}` for the shape of a native function object: a callable
//! slot plus a `.prototype`/`.constructor` cross-link, not full spec-exact
//! property attributes.

use crate::agent::{Agent, JsResult};
use crate::error::{ExceptionType, JsError};
use crate::object::{Callable, ObjectData, ObjectKind, ObjectRef, PropertyDescriptor};
use crate::realm::Realm;
use crate::value::Value;
use std::rc::Rc;

fn native(name: &str, arity: u32, proto: ObjectRef, f: impl Fn(&mut Agent, Value, &[Value]) -> JsResult<Value> + 'static) -> ObjectRef {
    let obj = ObjectData::new(Some(proto));
    obj.borrow_mut().callable = Some(Callable::Native { name: name.to_string(), arity, func: Rc::new(f) });
    obj.borrow_mut().set_own("name".into(), PropertyDescriptor::data(Value::from_string(name), false, false, true));
    obj.borrow_mut().set_own("length".into(), PropertyDescriptor::data(Value::Number(arity as f64), false, false, true));
    obj
}

fn define_method(target: &ObjectRef, function_proto: ObjectRef, name: &str, arity: u32, f: impl Fn(&mut Agent, Value, &[Value]) -> JsResult<Value> + 'static) {
    let func = native(name, arity, function_proto, f);
    target.borrow_mut().set_own(name.into(), PropertyDescriptor::data(Value::Object(func), true, false, true));
}

pub fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

pub fn populate(realm: &mut Realm) {
    let function_proto = realm.intrinsics.function_prototype.clone();
    let object_proto = realm.intrinsics.object_prototype.clone();
    let array_proto = realm.intrinsics.array_prototype.clone();
    let error_proto = realm.intrinsics.error_prototype.clone();
    let global = realm.global_object.clone();

    // Object.prototype
    define_method(&object_proto, function_proto.clone(), "hasOwnProperty", 1, |_, this, args| {
        let key = arg(args, 0).to_property_key();
        let has = this.as_object().map(|o| o.borrow().get_own(&key).is_some()).unwrap_or(false);
        Ok(Value::Boolean(has))
    });
    define_method(&object_proto, function_proto.clone(), "toString", 0, |_, this, _| Ok(Value::from_string(this.to_display_string())));
    define_method(&object_proto, function_proto.clone(), "isPrototypeOf", 1, |_, this, args| {
        let Some(candidate) = arg(args, 0).as_object().cloned() else { return Ok(Value::Boolean(false)) };
        let Some(target) = this.as_object() else { return Ok(Value::Boolean(false)) };
        let mut proto = candidate.borrow().prototype.clone();
        while let Some(p) = proto {
            if Rc::ptr_eq(&p, target) {
                return Ok(Value::Boolean(true));
            }
            proto = p.borrow().prototype.clone();
        }
        Ok(Value::Boolean(false))
    });

    // Array.prototype — the handful of methods exercised by for-of/spread
    // tests and typical conformance fixtures.
    define_method(&array_proto, function_proto.clone(), "push", 1, |_, this, args| {
        let Some(o) = this.as_object() else { return Err(type_error("push called on non-object")) };
        let len = array_length(o);
        for (i, v) in args.iter().enumerate() {
            o.borrow_mut().set_own((len + i as u32).to_string().as_str().into(), PropertyDescriptor::data(v.clone(), true, true, true));
        }
        let new_len = len + args.len() as u32;
        set_array_length(o, new_len);
        Ok(Value::Number(new_len as f64))
    });
    define_method(&array_proto, function_proto.clone(), "pop", 0, |_, this, _| {
        let Some(o) = this.as_object() else { return Err(type_error("pop called on non-object")) };
        let len = array_length(o);
        if len == 0 {
            return Ok(Value::Undefined);
        }
        let key = (len - 1).to_string();
        let value = o.borrow().get_own(&key.as_str().into()).and_then(|d| d.value).unwrap_or(Value::Undefined);
        o.borrow_mut().delete_own(&key.as_str().into());
        set_array_length(o, len - 1);
        Ok(value)
    });
    define_method(&array_proto, function_proto.clone(), "forEach", 1, |agent, this, args| {
        let Some(o) = this.as_object().cloned() else { return Err(type_error("forEach called on non-object")) };
        let callback = arg(args, 0);
        let len = array_length(&o);
        for i in 0..len {
            let v = o.borrow().get_own(&i.to_string().as_str().into()).and_then(|d| d.value).unwrap_or(Value::Undefined);
            crate::evaluator::call_function(agent, callback.clone(), Value::Undefined, &[v, Value::Number(i as f64), this.clone()])?;
        }
        Ok(Value::Undefined)
    });
    define_method(&array_proto, function_proto.clone(), "join", 1, |_, this, args| {
        let Some(o) = this.as_object() else { return Ok(Value::from_string("")) };
        let sep = match arg(args, 0) {
            Value::Undefined => ",".to_string(),
            v => v.to_display_string(),
        };
        let len = array_length(o);
        let parts: Vec<std::string::String> = (0..len)
            .map(|i| {
                let v = o.borrow().get_own(&i.to_string().as_str().into()).and_then(|d| d.value).unwrap_or(Value::Undefined);
                if v.is_nullish() { std::string::String::new() } else { v.to_display_string() }
            })
            .collect();
        Ok(Value::from_string(parts.join(&sep)))
    });

    // Error.prototype
    error_proto.borrow_mut().set_own("name".into(), PropertyDescriptor::data(Value::from_string("Error"), true, false, true));
    error_proto.borrow_mut().set_own("message".into(), PropertyDescriptor::data(Value::from_string(""), true, false, true));
    define_method(&error_proto, function_proto.clone(), "toString", 0, |_, this, _| {
        let Some(o) = this.as_object() else { return Ok(Value::from_string("Error")) };
        let name = o.borrow().get_own(&"name".into()).and_then(|d| d.value).unwrap_or(Value::from_string("Error")).to_display_string();
        let message = o.borrow().get_own(&"message".into()).and_then(|d| d.value).unwrap_or(Value::from_string("")).to_display_string();
        Ok(Value::from_string(if message.is_empty() { name } else { format!("{name}: {message}") }))
    });

    // console.log — ubiquitous host convenience, not part of the spec but
    // present in every practical embedding; grounded on the `cli`/`host`
    // split giving the engine a place to print without owning stdout.
    let console = ObjectData::new(Some(object_proto.clone()));
    define_method(&console, function_proto.clone(), "log", 0, |_, _, args| {
        let line = args.iter().map(|v| v.to_display_string()).collect::<Vec<_>>().join(" ");
        println!("{line}");
        Ok(Value::Undefined)
    });
    global.borrow_mut().set_own("console".into(), PropertyDescriptor::data(Value::Object(console), true, false, true));

    // `print` — the other half of the same convention; test262's async-test
    // harness (`doneprintHandle.js`) calls it directly rather than `console.log`.
    let print = native("print", 1, function_proto.clone(), |_, _, args| {
        println!("{}", arg(args, 0).to_display_string());
        Ok(Value::Undefined)
    });
    global.borrow_mut().set_own("print".into(), PropertyDescriptor::data(Value::Object(print), true, false, true));

    install_constructor(&global, &function_proto, &object_proto, "Object", 1, |_, _, args| Ok(arg(args, 0)));
    install_constructor(&global, &function_proto, &array_proto, "Array", 0, |agent, _, args| Ok(Value::Object(make_array(agent, args.to_vec()))));
    for name in ["Error", "TypeError", "RangeError", "ReferenceError", "SyntaxError", "EvalError", "URIError"] {
        install_error_constructor(&global, &function_proto, &error_proto, name);
    }
    install_constructor(&global, &function_proto, &realm.intrinsics.promise_prototype.clone(), "Promise", 1, |agent, _, args| {
        let promise = crate::microtask::new_promise(agent);
        let executor = arg(args, 0);
        let p1 = promise.clone();
        let resolve = native("resolve", 1, agent.current_realm().intrinsics.function_prototype.clone(), move |agent, _, args| {
            crate::microtask::settle_promise(agent, &p1, crate::microtask::PromiseStatus::Fulfilled, arg(args, 0));
            Ok(Value::Undefined)
        });
        let p2 = promise.clone();
        let reject = native("reject", 1, agent.current_realm().intrinsics.function_prototype.clone(), move |agent, _, args| {
            crate::microtask::settle_promise(agent, &p2, crate::microtask::PromiseStatus::Rejected, arg(args, 0));
            Ok(Value::Undefined)
        });
        crate::evaluator::call_function(agent, executor, Value::Undefined, &[Value::Object(resolve), Value::Object(reject)])?;
        Ok(Value::Object(promise))
    });

    #[cfg(feature = "math")]
    install_math(&global, &function_proto, &object_proto);
    #[cfg(feature = "json")]
    install_json(&global, &function_proto, &object_proto);
}

/// `Math` (spec §10 Non-goals: not the full namespace, just the handful of
/// methods a tree-walking interpreter's own test fixtures tend to reach for).
#[cfg(feature = "math")]
fn install_math(global: &ObjectRef, function_proto: &ObjectRef, object_proto: &ObjectRef) {
    let math = ObjectData::new(Some(object_proto.clone()));
    math.borrow_mut().set_own("PI".into(), PropertyDescriptor::data(Value::Number(std::f64::consts::PI), false, false, false));
    math.borrow_mut().set_own("E".into(), PropertyDescriptor::data(Value::Number(std::f64::consts::E), false, false, false));

    fn unary(f: impl Fn(f64) -> f64 + 'static) -> impl Fn(&mut Agent, Value, &[Value]) -> JsResult<Value> {
        move |_, _, args| Ok(Value::Number(f(arg(args, 0).to_number_primitive())))
    }

    define_method(&math, function_proto.clone(), "abs", 1, unary(f64::abs));
    define_method(&math, function_proto.clone(), "floor", 1, unary(f64::floor));
    define_method(&math, function_proto.clone(), "ceil", 1, unary(f64::ceil));
    define_method(&math, function_proto.clone(), "round", 1, unary(|n| (n + 0.5).floor()));
    define_method(&math, function_proto.clone(), "trunc", 1, unary(f64::trunc));
    define_method(&math, function_proto.clone(), "sign", 1, unary(f64::signum));
    define_method(&math, function_proto.clone(), "sqrt", 1, unary(f64::sqrt));
    define_method(&math, function_proto.clone(), "max", 2, |_, _, args| {
        Ok(Value::Number(args.iter().map(Value::to_number_primitive).fold(f64::NEG_INFINITY, f64::max)))
    });
    define_method(&math, function_proto.clone(), "min", 2, |_, _, args| {
        Ok(Value::Number(args.iter().map(Value::to_number_primitive).fold(f64::INFINITY, f64::min)))
    });
    define_method(&math, function_proto.clone(), "pow", 2, |_, _, args| Ok(Value::Number(arg(args, 0).to_number_primitive().powf(arg(args, 1).to_number_primitive()))));
    define_method(&math, function_proto.clone(), "random", 0, |_, _, _| Ok(Value::Number(rand::random::<f64>())));

    global.borrow_mut().set_own("Math".into(), PropertyDescriptor::data(Value::Object(math), true, false, true));
}

/// `JSON.stringify`/`JSON.parse` (spec §10 Non-goals: not spec-exact —
/// no `replacer`/`reviver`, no indentation — just enough serialization to
/// round-trip the plain-data values scripts actually pass through it).
#[cfg(feature = "json")]
fn install_json(global: &ObjectRef, function_proto: &ObjectRef, object_proto: &ObjectRef) {
    let json = ObjectData::new(Some(object_proto.clone()));
    define_method(&json, function_proto.clone(), "stringify", 1, |_, _, args| match json_stringify(&arg(args, 0)) {
        Some(s) => Ok(Value::from_string(s)),
        None => Ok(Value::Undefined),
    });
    define_method(&json, function_proto.clone(), "parse", 1, |agent, _, args| {
        let text = arg(args, 0).to_display_string();
        let mut chars = text.chars().peekable();
        let value = json_parse_value(agent, &mut chars).ok_or_else(|| JsError::new(ExceptionType::SyntaxError, "Unexpected token in JSON"))?;
        skip_ws(&mut chars);
        if chars.next().is_some() {
            return Err(JsError::new(ExceptionType::SyntaxError, "Unexpected non-whitespace character after JSON"));
        }
        Ok(value)
    });
    global.borrow_mut().set_own("JSON".into(), PropertyDescriptor::data(Value::Object(json), true, false, true));
}

#[cfg(feature = "json")]
fn json_stringify(value: &Value) -> Option<std::string::String> {
    match value {
        Value::Undefined => None,
        Value::Null => Some("null".to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Number(n) => Some(if n.is_finite() { n.to_string() } else { "null".to_string() }),
        Value::String(s) => Some(json_quote(s)),
        Value::Object(o) => {
            if o.borrow().is_callable() {
                return None;
            }
            if matches!(o.borrow().kind, ObjectKind::Array) {
                let len = array_length(o);
                let items: Vec<std::string::String> = (0..len)
                    .map(|i| {
                        let v = o.borrow().get_own(&i.to_string().as_str().into()).and_then(|d| d.value).unwrap_or(Value::Undefined);
                        json_stringify(&v).unwrap_or_else(|| "null".to_string())
                    })
                    .collect();
                Some(format!("[{}]", items.join(",")))
            } else {
                let fields: Vec<std::string::String> = o
                    .borrow()
                    .own_keys()
                    .into_iter()
                    .filter_map(|key| {
                        let crate::object::PropertyKey::String(name) = &key else { return None };
                        let desc = o.borrow().get_own(&key)?;
                        if !desc.enumerable {
                            return None;
                        }
                        let v = desc.value?;
                        let encoded = json_stringify(&v)?;
                        Some(format!("{}:{}", json_quote(name), encoded))
                    })
                    .collect();
                Some(format!("{{{}}}", fields.join(",")))
            }
        }
        _ => None,
    }
}

#[cfg(feature = "json")]
fn json_quote(s: &str) -> std::string::String {
    let mut out = std::string::String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(feature = "json")]
fn skip_ws(chars: &mut std::iter::Peekable<std::str::Chars>) {
    while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
        chars.next();
    }
}

#[cfg(feature = "json")]
fn json_parse_value(agent: &mut Agent, chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<Value> {
    skip_ws(chars);
    match *chars.peek()? {
        'n' => {
            take_literal(chars, "null")?;
            Some(Value::Null)
        }
        't' => {
            take_literal(chars, "true")?;
            Some(Value::Boolean(true))
        }
        'f' => {
            take_literal(chars, "false")?;
            Some(Value::Boolean(false))
        }
        '"' => json_parse_string(chars).map(Value::from_string),
        '[' => json_parse_array(agent, chars),
        '{' => json_parse_object(agent, chars),
        c if c == '-' || c.is_ascii_digit() => json_parse_number(chars),
        _ => None,
    }
}

#[cfg(feature = "json")]
fn take_literal(chars: &mut std::iter::Peekable<std::str::Chars>, literal: &str) -> Option<()> {
    for expected in literal.chars() {
        if chars.next()? != expected {
            return None;
        }
    }
    Some(())
}

#[cfg(feature = "json")]
fn json_parse_string(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<std::string::String> {
    chars.next()?; // opening quote
    let mut out = std::string::String::new();
    loop {
        match chars.next()? {
            '"' => return Some(out),
            '\\' => match chars.next()? {
                '"' => out.push('"'),
                '\\' => out.push('\\'),
                '/' => out.push('/'),
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'u' => {
                    let hex: std::string::String = (0..4).map(|_| chars.next()).collect::<Option<std::string::String>>()?;
                    let code = u32::from_str_radix(&hex, 16).ok()?;
                    out.push(char::from_u32(code)?);
                }
                _ => return None,
            },
            c => out.push(c),
        }
    }
}

#[cfg(feature = "json")]
fn json_parse_number(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<Value> {
    let mut raw = std::string::String::new();
    if matches!(chars.peek(), Some('-')) {
        raw.push(chars.next()?);
    }
    while matches!(chars.peek(), Some(c) if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) {
        raw.push(chars.next()?);
    }
    raw.parse::<f64>().ok().map(Value::Number)
}

#[cfg(feature = "json")]
fn json_parse_array(agent: &mut Agent, chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<Value> {
    chars.next()?; // '['
    let mut items = Vec::new();
    skip_ws(chars);
    if matches!(chars.peek(), Some(']')) {
        chars.next();
        return Some(Value::Object(make_array(agent, items)));
    }
    loop {
        items.push(json_parse_value(agent, chars)?);
        skip_ws(chars);
        match chars.next()? {
            ',' => continue,
            ']' => break,
            _ => return None,
        }
    }
    Some(Value::Object(make_array(agent, items)))
}

#[cfg(feature = "json")]
fn json_parse_object(agent: &mut Agent, chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<Value> {
    chars.next()?; // '{'
    let proto = agent.current_realm().intrinsics.object_prototype.clone();
    let obj = ObjectData::new(Some(proto));
    skip_ws(chars);
    if matches!(chars.peek(), Some('}')) {
        chars.next();
        return Some(Value::Object(obj));
    }
    loop {
        skip_ws(chars);
        let key = json_parse_string(chars)?;
        skip_ws(chars);
        if chars.next()? != ':' {
            return None;
        }
        let value = json_parse_value(agent, chars)?;
        obj.borrow_mut().set_own(key.as_str().into(), PropertyDescriptor::data(value, true, true, true));
        skip_ws(chars);
        match chars.next()? {
            ',' => continue,
            '}' => break,
            _ => return None,
        }
    }
    Some(Value::Object(obj))
}

fn install_constructor(global: &ObjectRef, function_proto: &ObjectRef, proto: &ObjectRef, name: &str, arity: u32, f: impl Fn(&mut Agent, Value, &[Value]) -> JsResult<Value> + 'static) {
    let ctor = native(name, arity, function_proto.clone(), f);
    ctor.borrow_mut().set_own("prototype".into(), PropertyDescriptor::data(Value::Object(proto.clone()), false, false, false));
    proto.borrow_mut().set_own("constructor".into(), PropertyDescriptor::data(Value::Object(ctor.clone()), true, false, true));
    global.borrow_mut().set_own(name.into(), PropertyDescriptor::data(Value::Object(ctor), true, false, true));
}

fn install_error_constructor(global: &ObjectRef, function_proto: &ObjectRef, error_proto: &ObjectRef, name: &'static str) {
    let proto = if name == "Error" {
        error_proto.clone()
    } else {
        let p = ObjectData::new(Some(error_proto.clone()));
        p.borrow_mut().set_own("name".into(), PropertyDescriptor::data(Value::from_string(name), true, false, true));
        p
    };
    install_constructor(global, function_proto, &proto, name, 1, move |_, _, args| {
        let obj = ObjectData::new(None);
        obj.borrow_mut().kind = ObjectKind::Error;
        if !matches!(arg(args, 0), Value::Undefined) {
            obj.borrow_mut().set_own("message".into(), PropertyDescriptor::data(Value::from_string(arg(args, 0).to_display_string()), true, false, true));
        }
        Ok(Value::Object(obj))
    });
}

pub fn make_array(agent: &mut Agent, elements: Vec<Value>) -> ObjectRef {
    let proto = agent.current_realm().intrinsics.array_prototype.clone();
    let obj = ObjectData::new(Some(proto));
    obj.borrow_mut().kind = ObjectKind::Array;
    for (i, v) in elements.iter().enumerate() {
        obj.borrow_mut().set_own(i.to_string().as_str().into(), PropertyDescriptor::data(v.clone(), true, true, true));
    }
    set_array_length(&obj, elements.len() as u32);
    obj
}

fn array_length(o: &ObjectRef) -> u32 {
    match o.borrow().get_own(&"length".into()).and_then(|d| d.value) {
        Some(Value::Number(n)) => n as u32,
        _ => 0,
    }
}

fn set_array_length(o: &ObjectRef, len: u32) {
    o.borrow_mut().set_own("length".into(), PropertyDescriptor::data(Value::Number(len as f64), true, false, false));
}

pub fn type_error(message: impl Into<std::string::String>) -> JsError {
    JsError::new(ExceptionType::TypeError, message)
}
