use serde::ser::{Serialize, SerializeSeq, Serializer};

/// Runtime value in the wick language.
///
/// Values are what the VM's stack, globals, locals and constant pool hold.
/// Arrays are plain value sequences: element assignment produces an
/// updated array, other references keep seeing the old one.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit signed integer.
    Int(i64),

    /// 64-bit floating-point number.
    Float(f64),

    /// UTF-8 string value.
    Str(String),

    /// Boolean value.
    Bool(bool),

    /// The null value.
    Null,

    /// Zero-indexed dense array of values.
    Array(Vec<Value>),
}

impl Value {
    /// Null, `false`, numeric zero, the empty string and the empty array
    /// are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Null => "null",
            Value::Array(_) => "array",
        }
    }
}

/// Serializes as the language-level JSON shape (`[10, 99, 30]`, not an
/// enum-tagged object), which is what `print` emits for arrays and what
/// the emitter hashes for array constant keys.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Null => serializer.serialize_unit(),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl std::fmt::Display for Value {
    /// Formats a value the way `print` renders it: bare strings, `null`
    /// for null, JSON for arrays (non-ASCII preserved verbatim).
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::Array(_) => match serde_json::to_string(self) {
                Ok(json) => write!(f, "{}", json),
                Err(_) => write!(f, "[]"),
            },
        }
    }
}
