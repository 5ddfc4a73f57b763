//! Image labels written after a build.
//!
//! Keys are prefixed with a namespace so they never collide with labels set
//! by users or by the container engine.

use std::collections::BTreeMap;

/// Namespace used when none is configured.
pub const DEFAULT_LABEL_NAMESPACE: &str = "run.modelpack.";

/// Key suffix of the label holding the encoded type signature.
pub const TYPE_SIGNATURE_KEY: &str = "type_signature";

/// Labels to attach to an image, ordered by key.
pub type LabelSet = BTreeMap<String, String>;

/// Full key of the type signature label under `namespace`.
pub fn type_signature_key(namespace: &str) -> String {
    format!("{}{}", namespace, TYPE_SIGNATURE_KEY)
}
