//! Attribute values and references between resources
//!
//! A reference is a tagged variant of [`Value`], never an interpolated
//! string. Declarations written as text spell a reference as a string that
//! is exactly `${type.name.field}` (or `${name.field}` when the symbolic
//! name is unique); the graph builder turns those strings into
//! [`Value::Reference`] before anything else looks at them.

use crate::types::NodeId;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

/// Attribute map of a resource, ordered by key for stable diffs
pub type Attributes = BTreeMap<String, Value>;

static WHOLE_EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$\{([A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]+)+)\}$").expect("valid regex")
});

static ANY_EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{[^}]*\}").expect("valid regex"));

/// Reference to an output attribute of another node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub node: NodeId,
    /// Attribute path; dots descend into object values
    pub field: String,
}

impl Reference {
    pub fn new(node: NodeId, field: impl Into<String>) -> Self {
        Self {
            node,
            field: field.into(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}}}", self.node, self.field)
    }
}

/// An attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// Output of another node, known only once that node is applied
    Reference(Reference),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether the value (or anything nested in it) is still a reference
    pub fn has_references(&self) -> bool {
        match self {
            Self::Reference(_) => true,
            Self::List(items) => items.iter().any(Self::has_references),
            Self::Object(map) => map.values().any(Self::has_references),
            _ => false,
        }
    }

    /// Collect every reference nested in this value
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Self::Reference(r) => out.push(r),
            Self::List(items) => items.iter().for_each(|v| v.collect_references(out)),
            Self::Object(map) => map.values().for_each(|v| v.collect_references(out)),
            _ => {}
        }
    }

    /// Follow a dotted path into nested objects
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(self, |current, segment| match current {
            Self::Object(map) => map.get(segment),
            _ => None,
        })
    }

    /// Render a value for human display
    pub fn render(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("{s:?}"),
            Self::List(items) => format!(
                "[{}]",
                items.iter().map(Self::render).collect::<Vec<_>>().join(", ")
            ),
            Self::Object(map) => format!(
                "{{ {} }}",
                map.iter()
                    .map(|(k, v)| format!("{k} = {}", v.render()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::Reference(r) => r.to_string(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Self::Reference(r)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

// References serialize in their textual `${...}` form so plans stay readable.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => items.serialize(serializer),
            Self::Object(map) => map.serialize(serializer),
            Self::Reference(r) => serializer.serialize_str(&r.to_string()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlainValue {
    Null(()),
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

// Deserialized strings stay strings; reference detection happens in the
// graph builder, where the set of declared nodes is known.
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match PlainValue::deserialize(deserializer)? {
            PlainValue::Null(()) => Self::Null,
            PlainValue::Bool(b) => Self::Bool(b),
            PlainValue::Int(i) => Self::Int(i),
            PlainValue::Float(f) => Self::Float(f),
            PlainValue::String(s) => Self::String(s),
            PlainValue::List(items) => Self::List(items),
            PlainValue::Object(map) => Self::Object(map),
        })
    }
}

/// Result of scanning a string for a reference expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression<'a> {
    /// No `${...}` in the string
    Literal,
    /// The whole string is one expression; dotted path segments
    Path(Vec<&'a str>),
    /// `${...}` appears but not as the whole value
    Malformed(&'a str),
}

/// Classify a string attribute value
pub fn parse_expression(s: &str) -> Expression<'_> {
    if let Some(caps) = WHOLE_EXPRESSION.captures(s)
        && let Some(path) = caps.get(1)
    {
        return Expression::Path(path.as_str().split('.').collect());
    }
    match ANY_EXPRESSION.find(s) {
        Some(m) => Expression::Malformed(m.as_str()),
        None => Expression::Literal,
    }
}

/// A reference whose target output is not available
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingOutput(pub Reference);

impl fmt::Display for MissingOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "output '{}' of {} is not available",
            self.0.field, self.0.node
        )
    }
}

/// Replace every reference using `lookup`; any unresolvable reference fails
pub fn substitute<'a, F>(attributes: &Attributes, lookup: &F) -> Result<Attributes, MissingOutput>
where
    F: Fn(&Reference) -> Option<&'a Value>,
{
    attributes
        .iter()
        .map(|(k, v)| substitute_value(v, lookup).map(|v| (k.clone(), v)))
        .collect()
}

fn substitute_value<'a, F>(value: &Value, lookup: &F) -> Result<Value, MissingOutput>
where
    F: Fn(&Reference) -> Option<&'a Value>,
{
    Ok(match value {
        Value::Reference(r) => match lookup(r) {
            Some(resolved) => resolved.clone(),
            None => return Err(MissingOutput(r.clone())),
        },
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|v| substitute_value(v, lookup))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => Value::Object(substitute(map, lookup)?),
        other => other.clone(),
    })
}

/// Replace the references `lookup` can answer and keep the rest in place
///
/// Used at plan time, where outputs of nodes that have not been applied yet
/// are unknown.
pub fn substitute_known<'a, F>(attributes: &Attributes, lookup: &F) -> Attributes
where
    F: Fn(&Reference) -> Option<&'a Value>,
{
    attributes
        .iter()
        .map(|(k, v)| (k.clone(), substitute_known_value(v, lookup)))
        .collect()
}

fn substitute_known_value<'a, F>(value: &Value, lookup: &F) -> Value
where
    F: Fn(&Reference) -> Option<&'a Value>,
{
    match value {
        Value::Reference(r) => lookup(r).cloned().unwrap_or_else(|| value.clone()),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|v| substitute_known_value(v, lookup))
                .collect(),
        ),
        Value::Object(map) => Value::Object(substitute_known(map, lookup)),
        other => other.clone(),
    }
}
