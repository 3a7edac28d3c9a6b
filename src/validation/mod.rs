//! Validation engine: compiled type/shape validators for request bodies and
//! parameters (§4.5).
//!
//! Validating an object is a two-pass operation so a half-built result is
//! never produced: the first pass walks every declared field in
//! declaration order and collects every error; only if that pass is clean
//! does the second pass construct the output object, which contains
//! exactly the declared fields (defaults or `null` filled in for missing
//! optional ones).

pub mod model;

pub use model::{CompiledModel, Field, ModelSpec, Validator, compile};

use serde_json::Value as JsonValue;

use crate::platform::AtomicU64;

/// The category of a validation failure (§7 error taxonomy,
/// `Validation{...}` subtypes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Type,
    Range,
    Length,
    Pattern,
    Required,
    Custom,
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Process-global validation stats (§4.5 "Performance", §9 "Global mutable
/// state") — updated with plain atomics, no per-request heap traffic.
#[derive(Debug, Default)]
pub struct ValidationStats {
    pub count: AtomicU64,
    pub total_ns: AtomicU64,
}

impl ValidationStats {
    pub fn record(&self, elapsed_ns: u64) {
        self.count.fetch_add(1, crate::platform::Ordering::Relaxed);
        self.total_ns
            .fetch_add(elapsed_ns, crate::platform::Ordering::Relaxed);
    }

    pub fn mean_ns(&self) -> f64 {
        let count = self.count.load(crate::platform::Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            self.total_ns.load(crate::platform::Ordering::Relaxed) as f64 / count as f64
        }
    }
}

static STATS: once_cell::sync::Lazy<ValidationStats> =
    once_cell::sync::Lazy::new(ValidationStats::default);

pub fn stats() -> &'static ValidationStats {
    &STATS
}

/// Validates `input` against a compiled model, timing the call into the
/// process-global [`ValidationStats`]. On success returns a new JSON object
/// containing exactly the model's declared fields.
pub fn validate_model(
    model: &CompiledModel,
    input: &JsonValue,
) -> Result<JsonValue, Vec<ValidationError>> {
    let start = crate::platform::now_ns();
    let result = validate_model_inner(model, input);
    stats().record(crate::platform::now_ns().saturating_sub(start));
    result
}

fn validate_model_inner(
    model: &CompiledModel,
    input: &JsonValue,
) -> Result<JsonValue, Vec<ValidationError>> {
    let map = match input.as_object() {
        Some(m) => m,
        None => {
            return Err(vec![ValidationError::new(
                "",
                ErrorKind::Type,
                "expected a JSON object",
            )]);
        }
    };

    let mut errors = Vec::new();
    for field in model.fields() {
        match map.get(&field.name) {
            Some(value) => {
                if let Err(field_errors) = validate_value(&field.validator, value, &field.name) {
                    errors.extend(field_errors);
                }
            }
            None if field.required && field.default.is_none() => {
                errors.push(ValidationError::new(
                    &field.name,
                    ErrorKind::Required,
                    "field is required",
                ));
            }
            None => {}
        }
    }

    if !errors.is_empty() {
        // Accumulated as a stack: most-recently-pushed error surfaces first.
        errors.reverse();
        return Err(errors);
    }

    let mut out = serde_json::Map::new();
    for field in model.fields() {
        let value = match map.get(&field.name) {
            Some(v) => v.clone(),
            None => field.default.clone().unwrap_or(JsonValue::Null),
        };
        out.insert(field.name.clone(), value);
    }
    Ok(JsonValue::Object(out))
}

fn validate_value(
    validator: &Validator,
    value: &JsonValue,
    field: &str,
) -> Result<(), Vec<ValidationError>> {
    match validator {
        Validator::Int { min, max } => {
            let n = value
                .as_i64()
                .ok_or_else(|| vec![ValidationError::new(field, ErrorKind::Type, "expected integer")])?;
            if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                return Err(vec![ValidationError::new(field, ErrorKind::Range, "value out of range")]);
            }
            Ok(())
        }
        Validator::Float { min, max } => {
            let n = value
                .as_f64()
                .ok_or_else(|| vec![ValidationError::new(field, ErrorKind::Type, "expected float")])?;
            if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                return Err(vec![ValidationError::new(field, ErrorKind::Range, "value out of range")]);
            }
            Ok(())
        }
        Validator::Bool => {
            if value.is_boolean() {
                Ok(())
            } else {
                Err(vec![ValidationError::new(field, ErrorKind::Type, "expected boolean")])
            }
        }
        Validator::String {
            min_len,
            max_len,
            pattern,
        } => {
            let s = value
                .as_str()
                .ok_or_else(|| vec![ValidationError::new(field, ErrorKind::Type, "expected string")])?;
            let len = s.chars().count();
            if min_len.is_some_and(|m| len < m) || max_len.is_some_and(|m| len > m) {
                return Err(vec![ValidationError::new(field, ErrorKind::Length, "length out of bounds")]);
            }
            if let Some(re) = pattern
                && !re.is_match(s)
            {
                return Err(vec![ValidationError::new(field, ErrorKind::Pattern, "does not match pattern")]);
            }
            Ok(())
        }
        Validator::List { item, min, max } => {
            let arr = value
                .as_array()
                .ok_or_else(|| vec![ValidationError::new(field, ErrorKind::Type, "expected array")])?;
            if min.is_some_and(|m| arr.len() < m) || max.is_some_and(|m| arr.len() > m) {
                return Err(vec![ValidationError::new(field, ErrorKind::Length, "length out of bounds")]);
            }
            let mut errors = Vec::new();
            for (i, elem) in arr.iter().enumerate() {
                if let Err(e) = validate_value(item, elem, &format!("{field}[{i}]")) {
                    errors.extend(e);
                }
            }
            if errors.is_empty() { Ok(()) } else { Err(errors) }
        }
        Validator::Optional(inner) => {
            if value.is_null() {
                Ok(())
            } else {
                validate_value(inner, value, field)
            }
        }
        Validator::Union(options) => {
            for option in options {
                if validate_value(option, value, field).is_ok() {
                    return Ok(());
                }
            }
            Err(vec![ValidationError::new(
                field,
                ErrorKind::Type,
                "value did not match any variant of the union",
            )])
        }
        Validator::Object(spec) => {
            let compiled = CompiledModel::from_arc(spec.clone());
            match validate_model_inner(&compiled, value) {
                Ok(_) => Ok(()),
                Err(errors) => Err(errors
                    .into_iter()
                    .map(|e| {
                        ValidationError::new(
                            format!("{field}.{}", e.field),
                            e.kind,
                            e.message,
                        )
                    })
                    .collect()),
            }
        }
        Validator::Custom(f) => f(value).map_err(|msg| vec![ValidationError::new(field, ErrorKind::Custom, msg)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person_model() -> CompiledModel {
        ModelSpec::new(vec![
            Field::required("name", Validator::string_constrained(Some(2), None, None).unwrap()),
            Field::required("age", Validator::int_range(Some(0), Some(150))),
        ])
        .compile()
    }

    #[test]
    fn valid_input_produces_exact_declared_fields() {
        let model = person_model();
        let result = validate_model(&model, &json!({"name": "Ada", "age": 36})).unwrap();
        assert_eq!(result, json!({"name": "Ada", "age": 36}));
    }

    /// Scenario S6 from spec §8.
    #[test]
    fn scenario_s6_two_errors_and_no_output() {
        let model = person_model();
        let err = validate_model(&model, &json!({"name": "A", "age": -1})).unwrap_err();

        assert_eq!(err.len(), 2);
        assert!(err.iter().any(|e| e.field == "name" && e.kind == ErrorKind::Length));
        assert!(err.iter().any(|e| e.field == "age" && e.kind == ErrorKind::Range));
    }

    #[test]
    fn missing_required_field_is_required_error() {
        let model = person_model();
        let err = validate_model(&model, &json!({"age": 10})).unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].kind, ErrorKind::Required);
        assert_eq!(err[0].field, "name");
    }

    #[test]
    fn missing_optional_field_gets_default_or_null() {
        let model = ModelSpec::new(vec![
            Field::optional("nickname", Validator::string(), Some(json!("anon"))),
            Field::optional("bio", Validator::string(), None),
        ])
        .compile();
        let result = validate_model(&model, &json!({})).unwrap();
        assert_eq!(result, json!({"nickname": "anon", "bio": null}));
    }

    #[test]
    fn pattern_validator_rejects_non_matching_strings() {
        let v = Validator::string_constrained(None, None, Some(r"^\d+$")).unwrap();
        let model = ModelSpec::new(vec![Field::required("code", v)]).compile();
        let err = validate_model(&model, &json!({"code": "abc"})).unwrap_err();
        assert_eq!(err[0].kind, ErrorKind::Pattern);
    }

    #[test]
    fn nested_object_errors_are_field_prefixed() {
        let inner = ModelSpec::new(vec![Field::required("zip", Validator::string_constrained(Some(5), Some(5), None).unwrap())]);
        let model = ModelSpec::new(vec![Field::required(
            "address",
            Validator::Object(std::sync::Arc::new(inner)),
        )])
        .compile();
        let err = validate_model(&model, &json!({"address": {"zip": "1"}})).unwrap_err();
        assert_eq!(err[0].field, "address.zip");
    }
}
