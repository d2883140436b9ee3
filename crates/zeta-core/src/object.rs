//! Tagged runtime values.
//!
//! Every value the VM touches is one `Object` variant. Functions and
//! closures sit behind `Rc` so that call dispatch clones a handle, not an
//! instruction buffer. The whole family serializes with serde so that the
//! compiled-constant pool can be written into the bytecode artifact;
//! builtins serialize as their registry index.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Raw bytecode: a flat sequence of opcodes and operands.
pub type Instructions = Vec<u8>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Object {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Str(String),
    Null,
    Array(Rc<Vec<Object>>),
    Hash(Rc<HashMap<HashKey, HashPair>>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    /// Index into the builtin registry (see `builtins::REGISTRY`).
    Builtin(u8),
    Error(String),
    /// A value masked at rest; `enc_type` remembers what it decrypts to.
    Encrypted { enc_type: EncType, bytes: Vec<u8> },
}

/// Kind tag carried by an `Encrypted` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncType {
    Integer,
    Float,
    Boolean,
    Str,
}

/// A function lowered to bytecode: its instruction stream plus the local
/// slot count the VM must reserve on entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_params: usize,
}

/// A compiled function paired with the snapshot of its captured free
/// variables. The free vector is immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Object>,
}

/// One hash entry, preserving the original key object next to the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashPair {
    pub key: Object,
    pub value: Object,
}

/// Hashable key derived from an Integer, Boolean, or String value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    Str(String),
}

impl HashKey {
    /// Derive a key from a value, or `None` when the value kind cannot be
    /// used as a hash key.
    pub fn from_object(object: &Object) -> Option<HashKey> {
        match object {
            Object::Integer(value) => Some(HashKey::Integer(*value)),
            Object::Boolean(value) => Some(HashKey::Boolean(*value)),
            Object::Str(value) => Some(HashKey::Str(value.clone())),
            _ => None,
        }
    }
}

// Hash keys serialize as tagged strings so the pair map stays
// representable in the self-describing artifact encoding, whose maps
// require string keys.
impl Serialize for HashKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tagged = match self {
            HashKey::Integer(value) => format!("int:{}", value),
            HashKey::Boolean(value) => format!("bool:{}", value),
            HashKey::Str(value) => format!("str:{}", value),
        };
        serializer.serialize_str(&tagged)
    }
}

impl<'de> Deserialize<'de> for HashKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tagged = String::deserialize(deserializer)?;
        let (tag, rest) = tagged
            .split_once(':')
            .ok_or_else(|| D::Error::custom("untagged hash key"))?;
        match tag {
            "int" => rest
                .parse::<i64>()
                .map(HashKey::Integer)
                .map_err(D::Error::custom),
            "bool" => rest
                .parse::<bool>()
                .map(HashKey::Boolean)
                .map_err(D::Error::custom),
            "str" => Ok(HashKey::Str(rest.to_string())),
            _ => Err(D::Error::custom(format!("unknown hash key tag {:?}", tag))),
        }
    }
}

impl Object {
    /// Uppercase type tag used in diagnostics, e.g. "INTEGER".
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Integer(_) => "INTEGER",
            Object::Float(_) => "FLOAT",
            Object::Boolean(_) => "BOOLEAN",
            Object::Str(_) => "STRING",
            Object::Null => "NULL",
            Object::Array(_) => "ARRAY",
            Object::Hash(_) => "HASH",
            Object::CompiledFunction(_) => "COMPILED_FN",
            Object::Closure(_) => "CLOSURE",
            Object::Builtin(_) => "BUILTIN",
            Object::Error(_) => "ERROR",
            Object::Encrypted { .. } => "ENCRYPTED",
        }
    }

    /// Human-readable rendering, used by `puts`/`putln` and the REPL.
    pub fn inspect(&self) -> String {
        match self {
            Object::Integer(value) => value.to_string(),
            Object::Float(value) => value.to_string(),
            Object::Boolean(value) => value.to_string(),
            Object::Str(value) => value.clone(),
            Object::Null => "null".to_string(),
            Object::Array(elements) => {
                let rendered: Vec<String> = elements.iter().map(|e| e.inspect()).collect();
                format!("[{}]", rendered.join(", "))
            }
            Object::Hash(pairs) => {
                let rendered: Vec<String> = pairs
                    .values()
                    .map(|pair| format!("{}: {}", pair.key.inspect(), pair.value.inspect()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            Object::CompiledFunction(func) => {
                format!("CompiledFunction[{:p}]", Rc::as_ptr(func))
            }
            Object::Closure(closure) => format!("Closure[{:p}]", Rc::as_ptr(closure)),
            Object::Builtin(_) => "builtin function".to_string(),
            Object::Error(message) => format!("ERROR: {}", message),
            Object::Encrypted { enc_type, .. } => format!("encrypted({:?})", enc_type),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_key_equality() {
        assert_eq!(
            HashKey::from_object(&Object::Str("name".into())),
            Some(HashKey::Str("name".into()))
        );
        assert_eq!(
            HashKey::from_object(&Object::Integer(1)),
            Some(HashKey::Integer(1))
        );
        assert_eq!(HashKey::from_object(&Object::Null), None);
        assert_eq!(
            HashKey::from_object(&Object::Array(Rc::new(vec![]))),
            None
        );
    }

    #[test]
    fn test_inspect_forms() {
        let array = Object::Array(Rc::new(vec![
            Object::Integer(1),
            Object::Str("two".into()),
            Object::Boolean(false),
        ]));
        assert_eq!(array.inspect(), "[1, two, false]");
        assert_eq!(Object::Null.inspect(), "null");
        assert_eq!(Object::Error("boom".into()).inspect(), "ERROR: boom");
    }

    #[test]
    fn test_hash_key_serde_round_trip() {
        for key in [
            HashKey::Integer(-7),
            HashKey::Boolean(true),
            HashKey::Str("a:b".into()),
        ] {
            let json = serde_json::to_string(&key).unwrap();
            let back: HashKey = serde_json::from_str(&json).unwrap();
            assert_eq!(back, key);
        }
    }
}
