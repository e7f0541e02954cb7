use std::fmt;
use std::rc::Rc;

use gc::{Gc, GcCell};
use gc_derive::{Trace, Finalize};
use ordered_float::OrderedFloat;

use crate::types::futures::PanFuture;

/// Runtime representation of an arbitrary pan value.
///
/// Futures settle with values, and handlers receive and return them. Arrays, functions and futures
/// are shared: cloning a `Value` never copies their contents.
#[derive(Debug, Clone, PartialEq, Trace, Finalize)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(#[unsafe_ignore_trace] OrderedFloat<f64>),
    String(String),
    Array(Gc<GcCell<Vec<Value>>>),
    Fun(Fun),
    Future(#[unsafe_ignore_trace] PanFuture),
}

impl Value {
    pub fn nil() -> Value {
        Value::Nil
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Gc::new(GcCell::new(items)))
    }

    // A snapshot of the array's current contents, or `None` for non-arrays.
    pub fn to_vec(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.borrow().clone()),
            _ => None,
        }
    }

    pub fn as_future(&self) -> Option<&PanFuture> {
        match self {
            Value::Future(future) => Some(future),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Int(i64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Float(OrderedFloat(f))
    }
}

impl<'a> From<&'a str> for Value {
    fn from(s: &'a str) -> Value {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::String(s)
    }
}

impl From<Fun> for Value {
    fn from(fun: Fun) -> Value {
        Value::Fun(fun)
    }
}

impl From<PanFuture> for Value {
    fn from(future: PanFuture) -> Value {
        Value::Future(future)
    }
}

/// A function value. Calling it either returns a value or throws one (`Err`).
#[derive(Clone, Trace, Finalize)]
pub struct Fun(#[unsafe_ignore_trace] Rc<dyn Fn(&[Value]) -> Result<Value, Value>>);

impl Fun {
    pub fn new<F>(f: F) -> Fun
    where
        F: Fn(&[Value]) -> Result<Value, Value> + 'static,
    {
        Fun(Rc::new(f))
    }

    // A function that only looks at its first argument, `nil` if there is none.
    pub fn unary<F>(f: F) -> Fun
    where
        F: Fn(Value) -> Result<Value, Value> + 'static,
    {
        Fun::new(move |args| f(first_arg(args)))
    }

    // Returns its argument.
    pub fn identity() -> Fun {
        Fun::unary(Ok)
    }

    // Throws its argument.
    pub fn thrower() -> Fun {
        Fun::unary(Err)
    }

    pub fn apply(&self, args: &[Value]) -> Result<Value, Value> {
        (self.0)(args)
    }
}

// Functions have no meaningful structure to compare, so equality is identity.
impl PartialEq for Fun {
    fn eq(&self, other: &Fun) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Fun {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fun({:p})", self.0)
    }
}

pub(crate) fn first_arg(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or(Value::Nil)
}
