//! Validator tree and compiled model spec (§3 "Validator"/"ModelSpec", §4.5).

use std::sync::Arc;

use regex::Regex;
use serde_json::Value as JsonValue;

use crate::error::CoreError;

/// Sum type of field validators. `String`'s `pattern` is stored already
/// compiled — compilation happens once, at construction, never per-call.
#[derive(Clone)]
pub enum Validator {
    Int {
        min: Option<i64>,
        max: Option<i64>,
    },
    Float {
        min: Option<f64>,
        max: Option<f64>,
    },
    String {
        min_len: Option<usize>,
        max_len: Option<usize>,
        pattern: Option<Arc<Regex>>,
    },
    Bool,
    List {
        item: Box<Validator>,
        min: Option<usize>,
        max: Option<usize>,
    },
    Optional(Box<Validator>),
    Union(Vec<Validator>),
    Object(Arc<ModelSpec>),
    Custom(Arc<dyn Fn(&JsonValue) -> Result<(), String> + Send + Sync>),
}

impl Validator {
    pub fn int() -> Self {
        Validator::Int { min: None, max: None }
    }

    pub fn int_range(min: Option<i64>, max: Option<i64>) -> Self {
        Validator::Int { min, max }
    }

    pub fn string() -> Self {
        Validator::String {
            min_len: None,
            max_len: None,
            pattern: None,
        }
    }

    /// Builds a `String` validator, pre-compiling `pattern` if given.
    pub fn string_constrained(
        min_len: Option<usize>,
        max_len: Option<usize>,
        pattern: Option<&str>,
    ) -> Result<Self, CoreError> {
        let pattern = pattern
            .map(|p| Regex::new(p).map_err(|e| CoreError::Internal(e.to_string())))
            .transpose()?
            .map(Arc::new);
        Ok(Validator::String {
            min_len,
            max_len,
            pattern,
        })
    }

    pub fn optional(inner: Validator) -> Self {
        Validator::Optional(Box::new(inner))
    }

    pub fn list(item: Validator, min: Option<usize>, max: Option<usize>) -> Self {
        Validator::List {
            item: Box::new(item),
            min,
            max,
        }
    }
}

/// One field of an object validator (§3 "ModelSpec").
#[derive(Clone)]
pub struct Field {
    pub name: String,
    pub validator: Validator,
    pub required: bool,
    pub default: Option<JsonValue>,
}

impl Field {
    pub fn required(name: impl Into<String>, validator: Validator) -> Self {
        Self {
            name: name.into(),
            validator,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, validator: Validator, default: Option<JsonValue>) -> Self {
        Self {
            name: name.into(),
            validator,
            required: false,
            default,
        }
    }
}

/// An ordered, uncompiled model definition.
pub struct ModelSpec {
    pub fields: Vec<Field>,
}

impl ModelSpec {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Marks the spec immutable by moving it behind an `Arc` inside a
    /// [`CompiledModel`] — there is no remaining mutable handle afterwards,
    /// which is how the "once compiled, immutable" invariant is enforced in
    /// safe Rust.
    pub fn compile(self) -> CompiledModel {
        CompiledModel(Arc::new(self))
    }
}

/// An immutable, compiled model ready for repeated validation calls.
#[derive(Clone)]
pub struct CompiledModel(Arc<ModelSpec>);

impl CompiledModel {
    pub fn fields(&self) -> &[Field] {
        &self.0.fields
    }

    /// Wraps an already-shared spec without cloning its field list — used
    /// for nested `Object` validators, whose spec is shared with the
    /// parent model rather than recompiled per validation call.
    pub(crate) fn from_arc(spec: Arc<ModelSpec>) -> Self {
        CompiledModel(spec)
    }
}

/// Free function mirroring the spec's `compile(model)` operation name.
pub fn compile(spec: ModelSpec) -> CompiledModel {
    spec.compile()
}
