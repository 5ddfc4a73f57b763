//! Type signatures of built images.
//!
//! A type signature describes the callable interface of a built model
//! (its inputs and output). Its schema belongs to the inspector that
//! produces it, so it is carried here as a structured JSON document.
//!
//! The label encoding is canonical: compact JSON with object keys in
//! lexicographic order at every depth, so identical signatures always
//! serialize to identical bytes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeSignature(Value);

impl TypeSignature {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Decode a signature from the JSON an inspector printed.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes).map(Self)
    }

    /// Encode to the canonical text stored in image labels.
    pub fn to_canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&canonicalize(&self.0))
    }

    /// Decode a label value produced by [`TypeSignature::to_canonical_json`].
    pub fn from_canonical_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text).map(Self)
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
