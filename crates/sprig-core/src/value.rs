use std::fmt;
use std::rc::Rc;

use crate::binding::Directive;

/// The abstract value a binding holds.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<[Value]>),
    Record(Rc<[(Rc<str>, Value)]>),
    Directive(Rc<dyn Directive>),
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    pub fn record<N: Into<Rc<str>>>(fields: impl IntoIterator<Item = (N, Value)>) -> Self {
        Value::Record(fields.into_iter().map(|(n, v)| (n.into(), v)).collect())
    }

    pub fn directive(directive: impl Directive) -> Self {
        Value::Directive(Rc::new(directive))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_directive(&self) -> Option<&Rc<dyn Directive>> {
        match self {
            Value::Directive(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Field lookup on a record.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.iter().find(|(n, _)| &**n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Text form of a primitive. `None` renders as the empty string;
    /// composites and directives have no text form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::None => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Str(s) => Some(s.to_string()),
            Value::List(_) | Value::Record(_) | Value::Directive(_) => None,
        }
    }

    /// Identity comparison: primitives by value, shared values by pointer.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Record(a), Value::Record(b)) => Rc::ptr_eq(a, b),
            (Value::Directive(a), Value::Directive(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// One level deep: lists and records compare their members with
    /// [`Value::same`].
    pub fn shallow_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.same(y))
            }
            (Value::Record(a), Value::Record(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((na, va), (nb, vb))| na == nb && va.same(vb))
            }
            _ => self.same(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{b:?}"),
            Value::Int(i) => write!(f, "{i:?}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Record(fields) => f
                .debug_map()
                .entries(fields.iter().map(|(n, v)| (n, v)))
                .finish(),
            Value::Directive(d) => write!(f, "<{}>", d.name()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Rc<dyn Directive>> for Value {
    fn from(d: Rc<dyn Directive>) -> Self {
        Value::Directive(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::None)
    }
}

/// Stable identity of a list item across renders.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Index(usize),
    Int(i64),
    Str(Rc<str>),
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(Rc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(Rc::from(s))
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shallow_eq_compares_one_level() {
        let shared = Value::list([Value::from(1)]);
        let a = Value::record([("label", Value::from("a")), ("items", shared.clone())]);
        let b = Value::record([("label", Value::from("a")), ("items", shared)]);
        assert!(!a.same(&b));
        assert!(a.shallow_eq(&b));

        // nested composites compare by pointer, so a fresh inner list differs
        let c = Value::record([
            ("label", Value::from("a")),
            ("items", Value::list([Value::from(1)])),
        ]);
        assert!(!a.shallow_eq(&c));
    }

    #[test]
    fn record_field_order_matters() {
        let a = Value::record([("x", Value::from(1)), ("y", Value::from(2))]);
        let b = Value::record([("y", Value::from(2)), ("x", Value::from(1))]);
        assert!(!a.shallow_eq(&b));
        assert_eq!(a.get("y").and_then(Value::as_int), Some(2));
    }

    #[test]
    fn text_forms() {
        assert_eq!(Value::from(3).to_text().as_deref(), Some("3"));
        assert_eq!(Value::None.to_text().as_deref(), Some(""));
        assert_eq!(Value::list([]).to_text(), None);
    }
}
