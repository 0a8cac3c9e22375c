// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Values exported by modules.
//!
//! [`Exports`] is a handle: cloning it aliases the same underlying object, and
//! fields written through any clone are visible through every other clone.
//! This is what lets a module hand out its exports before it has finished
//! populating them (circular requires) and what lets a hot update keep the
//! object identity consumers already hold.

use crate::error::BoxError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Signature of a native function stored in an exports object
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, BoxError> + Send + Sync;

/// A callable value.
#[derive(Clone)]
pub struct Function {
    name: Option<Arc<str>>,
    func: Arc<NativeFn>,
}

impl Function {
    /// Wrap a closure as a named function
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: Some(name.into()),
            func: Arc::new(func),
        }
    }

    /// Wrap a closure as an anonymous function
    pub fn anonymous<F>(func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: None,
            func: Arc::new(func),
        }
    }

    /// Function name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Invoke the function
    pub fn call(&self, args: &[Value]) -> Result<Value, BoxError> {
        (self.func)(args)
    }

    /// Whether both handles point at the same closure
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "[Function: {}]", name),
            None => write!(f, "[Function (anonymous)]"),
        }
    }
}

/// A value stored in an exports object.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// undefined
    #[default]
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// Nested object (shared handle)
    Object(Exports),
    /// Native function
    Function(Function),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            // NaN != NaN
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Value {
    /// Returns true if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true if this value is a function.
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Number payload, if this is a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// String payload, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean payload, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Object handle, if this is an object
    pub fn as_object(&self) -> Option<&Exports> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Function handle, if this is a function
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(func) => Some(func),
            _ => None,
        }
    }

    /// Returns the type of this value as a string.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    fn to_json_guarded(&self, seen: &mut Vec<usize>) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Object(obj) => obj.to_json_guarded(seen),
            Value::Function(func) => serde_json::Value::String(format!("{:?}", func)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Object(obj) => write!(f, "{}", obj.to_json()),
            Value::Function(func) => write!(f, "{:?}", func),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Exports> for Value {
    fn from(obj: Exports) -> Self {
        Value::Object(obj)
    }
}

impl From<Function> for Value {
    fn from(func: Function) -> Self {
        Value::Function(func)
    }
}

/// Shared, mutable exports object.
#[derive(Clone, Default)]
pub struct Exports {
    fields: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl Exports {
    /// Create an empty exports object
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a field; missing fields read as `undefined`
    pub fn get(&self, key: &str) -> Value {
        self.fields.read().get(key).cloned().unwrap_or_default()
    }

    /// Write a field
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.write().insert(key.into(), value.into());
    }

    /// Write a named native function
    pub fn define_fn<F>(&self, name: &str, func: F)
    where
        F: Fn(&[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.set(name, Function::new(name, func));
    }

    /// Call the function stored under `name`.
    ///
    /// The field is looked up at call time, so a handle taken before a hot
    /// update calls the replacement implementation afterwards.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, BoxError> {
        // Release the lock before calling: the function may write fields.
        let func = self.fields.read().get(name).cloned();
        match func {
            Some(Value::Function(func)) => func.call(args),
            Some(other) => Err(format!("'{}' is not a function ({})", name, other.type_of()).into()),
            None => Err(format!("'{}' is not defined", name).into()),
        }
    }

    /// Check if a field exists
    pub fn has(&self, key: &str) -> bool {
        self.fields.read().contains_key(key)
    }

    /// Remove a field
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.fields.write().remove(key)
    }

    /// Field names in sorted order
    pub fn keys(&self) -> Vec<String> {
        self.fields.read().keys().cloned().collect()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.read().len()
    }

    /// Check if the object has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.read().is_empty()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Exports) -> bool {
        Arc::ptr_eq(&self.fields, &other.fields)
    }

    /// Render as JSON. Functions become their debug name and objects that
    /// contain themselves render as `"[Circular]"`.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_guarded(&mut Vec::new())
    }

    fn to_json_guarded(&self, seen: &mut Vec<usize>) -> serde_json::Value {
        let addr = Arc::as_ptr(&self.fields) as usize;
        if seen.contains(&addr) {
            return serde_json::Value::String("[Circular]".to_string());
        }
        seen.push(addr);
        let fields: Vec<(String, Value)> = self
            .fields
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let map = fields
            .into_iter()
            .map(|(k, v)| (k, v.to_json_guarded(seen)))
            .collect();
        seen.pop();
        serde_json::Value::Object(map)
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<String, Value> {
        self.fields.read().clone()
    }

    pub(crate) fn restore(&self, snapshot: BTreeMap<String, Value>) {
        *self.fields.write() = snapshot;
    }
}

impl fmt::Debug for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keys only: objects may reference each other.
        f.debug_struct("Exports").field("keys", &self.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exports_aliasing() {
        let a = Exports::new();
        let b = a.clone();
        b.set("x", 1);
        assert_eq!(a.get("x"), Value::Number(1.0));
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Exports::new()));
    }

    #[test]
    fn test_missing_field_is_undefined() {
        let obj = Exports::new();
        assert!(obj.get("nope").is_undefined());
        assert!(obj.call("nope", &[]).is_err());
    }

    #[test]
    fn test_call_can_write_own_exports() {
        let obj = Exports::new();
        let inner = obj.clone();
        obj.define_fn("touch", move |_| {
            inner.set("touched", true);
            Ok(Value::Undefined)
        });
        obj.call("touch", &[]).unwrap();
        assert_eq!(obj.get("touched"), Value::Boolean(true));
    }

    #[test]
    fn test_to_json_handles_self_reference() {
        let obj = Exports::new();
        obj.set("name", "a");
        obj.set("me", obj.clone());
        let json = obj.to_json();
        assert_eq!(json["name"], "a");
        assert_eq!(json["me"], "[Circular]");
    }

    #[test]
    fn test_snapshot_restore() {
        let obj = Exports::new();
        obj.set("a", 1);
        let snap = obj.snapshot();
        obj.set("a", 2);
        obj.set("b", 3);
        obj.restore(snap);
        assert_eq!(obj.get("a"), Value::Number(1.0));
        assert!(!obj.has("b"));
    }
}
