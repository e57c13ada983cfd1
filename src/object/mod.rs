//! Runtime values and the prototype object model.
//!
//! Objects are reference counted. A prototype link is a plain `Rc` to an
//! object created earlier, so chains are acyclic by construction and end at
//! the root object.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

pub type ObjRef = Rc<Object>;
pub type FnRef = Rc<Function>;

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(ObjRef),
    Function(FnRef),
}

/// A heap object: an optional prototype and an own property table.
pub struct Object {
    proto: Option<ObjRef>,
    props: RefCell<HashMap<Key, Value>>,
}

/// A function value: the entry offset of its compiled body plus the
/// object that carries its own properties.
pub struct Function {
    pub entry: usize,
    pub name: Option<Rc<str>>,
    object: ObjRef,
}

impl Object {
    fn new(proto: Option<ObjRef>) -> ObjRef {
        Rc::new(Object { proto, props: RefCell::new(HashMap::new()) })
    }

    pub fn own(&self, key: &Value) -> Option<Value> {
        self.props.borrow().get(&Key(key.clone())).cloned()
    }

    pub fn set_own(&self, key: Value, value: Value) {
        self.props.borrow_mut().insert(Key(key), value);
    }

    pub fn own_len(&self) -> usize {
        self.props.borrow().len()
    }

    /// Look `key` up on this object, then along the prototype chain.
    pub fn lookup(&self, key: &Value) -> Option<Value> {
        let mut found = self.own(key);
        let mut link = self.proto.clone();
        while found.is_none() {
            let Some(obj) = link else { break };
            found = obj.own(key);
            link = obj.proto.clone();
        }
        found
    }
}

impl Value {
    /// Bool uses its own value, Null is false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Null => false,
            _ => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The object whose table a property write lands in, if any.
    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Value::Object(o) => Some(o),
            Value::Function(f) => Some(&f.object),
            _ => None,
        }
    }

    /// Textual form for error messages: like `Display`, but strings are quoted.
    pub fn describe(&self) -> String {
        match self {
            Value::Str(s) => format!("{s:?}"),
            other => other.to_string(),
        }
    }
}

/// Structural equality: numbers, booleans and strings by value, objects and
/// functions by identity. Values of different types are never equal.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 2f64.powi(63) {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => write!(f, "{s}"),
            Value::Object(_) => write!(f, "<object>"),
            Value::Function(func) => match &func.name {
                Some(name) => write!(f, "<fn {name}>"),
                None => write!(f, "<fn>"),
            },
        }
    }
}

// Shallow on purpose: objects may refer to themselves through properties.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(o) => write!(f, "Object({:p}, {} props)", Rc::as_ptr(o), o.own_len()),
            Value::Function(func) => write!(f, "Function(@{}, {:?})", func.entry, func.name),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("has_proto", &self.proto.is_some())
            .field("props", &self.own_len())
            .finish()
    }
}

/// A `Value` usable as a hash key: property tables, variable scopes and the
/// constant pool index. Numbers hash by canonical bits (so `0 == -0` and
/// `NaN` finds itself), objects and functions by address.
#[derive(Clone, Debug)]
pub struct Key(pub Value);

impl Key {
    fn canonical_bits(n: f64) -> u64 {
        if n == 0.0 {
            0
        } else if n.is_nan() {
            f64::NAN.to_bits()
        } else {
            n.to_bits()
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Key) -> bool {
        match (&self.0, &other.0) {
            (Value::Number(a), Value::Number(b)) => Key::canonical_bits(*a) == Key::canonical_bits(*b),
            (a, b) => a == b,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => Key::canonical_bits(*n).hash(state),
            Value::Str(s) => s.hash(state),
            Value::Object(o) => std::ptr::hash(Rc::as_ptr(o), state),
            Value::Function(func) => std::ptr::hash(Rc::as_ptr(func), state),
        }
    }
}

/// Factory for every value the compiler and VM create. Owns the built-in
/// prototypes and interns strings.
pub struct Library {
    root: ObjRef,
    boolean: ObjRef,
    number: ObjRef,
    string: ObjRef,
    function: ObjRef,
    strings: RefCell<HashSet<Rc<str>>>,
}

impl Library {
    /// Names the built-in prototypes are bound to in the global scope, in slot order.
    pub const GLOBAL_NAMES: [&'static str; 5] = ["Object", "Boolean", "Number", "String", "Function"];

    pub fn new() -> Self {
        let root = Object::new(None);
        let child = || Object::new(Some(root.clone()));
        Library {
            boolean: child(),
            number: child(),
            string: child(),
            function: child(),
            strings: RefCell::new(HashSet::new()),
            root,
        }
    }

    pub fn null(&self) -> Value {
        Value::Null
    }

    pub fn boolean(&self, b: bool) -> Value {
        Value::Bool(b)
    }

    pub fn number(&self, n: f64) -> Value {
        Value::Number(n)
    }

    /// Equal strings share one allocation.
    pub fn string(&self, s: &str) -> Value {
        let mut strings = self.strings.borrow_mut();
        if let Some(existing) = strings.get(s) {
            return Value::Str(existing.clone());
        }
        let interned: Rc<str> = Rc::from(s);
        strings.insert(interned.clone());
        Value::Str(interned)
    }

    /// A fresh object whose prototype is the root object.
    pub fn object(&self) -> Value {
        Value::Object(Object::new(Some(self.root.clone())))
    }

    /// A fresh object whose prototype is `proto`; `None` unless `proto` is an object or function.
    pub fn beget(&self, proto: &Value) -> Option<Value> {
        proto.as_object().map(|p| Value::Object(Object::new(Some(p.clone()))))
    }

    pub fn function(&self, entry: usize, name: Option<&str>) -> Value {
        let name = name.map(|n| match self.string(n) {
            Value::Str(s) => s,
            _ => Rc::from(n),
        });
        Value::Function(Rc::new(Function {
            entry,
            name,
            object: Object::new(Some(self.function.clone())),
        }))
    }

    pub fn root(&self) -> &ObjRef {
        &self.root
    }

    /// Where a property lookup on `value` starts: its own table for objects
    /// and functions, the matching built-in prototype for primitives.
    pub fn lookup_start(&self, value: &Value) -> Option<ObjRef> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(self.boolean.clone()),
            Value::Number(_) => Some(self.number.clone()),
            Value::Str(_) => Some(self.string.clone()),
            Value::Object(o) => Some(o.clone()),
            Value::Function(f) => Some(f.object.clone()),
        }
    }

    /// Prototype-chain read; Null when no link has the key.
    pub fn get_property(&self, target: &Value, key: &Value) -> Value {
        self.lookup_start(target)
            .and_then(|obj| obj.lookup(key))
            .unwrap_or_else(|| self.null())
    }

    /// Own-table write. Fails for values that have no table of their own.
    pub fn set_property(&self, target: &Value, key: Value, value: Value) -> Result<(), ()> {
        let obj = target.as_object().ok_or(())?;
        obj.set_own(key, value);
        Ok(())
    }

    /// The prelude bindings, in `GLOBAL_NAMES` order.
    pub fn globals(&self) -> Vec<(&'static str, Value)> {
        let protos = [&self.root, &self.boolean, &self.number, &self.string, &self.function];
        Self::GLOBAL_NAMES
            .iter()
            .zip(protos)
            .map(|(name, proto)| (*name, Value::Object(proto.clone())))
            .collect()
    }
}

impl Default for Library {
    fn default() -> Self {
        Library::new()
    }
}
