//! Rule-driven normalization of shapefile attributes.
//!
//! Each output property is derived from one raw field by a
//! [`NormalizationRule`]. The refinements of a rule are applied in a fixed
//! order:
//!
//! 1. `coefSI` - arithmetic unit conversion ([`CoefExpr`])
//! 2. `valueMap` - replacement when the value is a key of the map
//! 3. `evalMethod` - a named scalar [`Transform`]
//!
//! A rule whose source field is absent yields `null`, as does a refinement
//! that cannot convert the value. These are soft failures: they are counted
//! but never abort the request.

mod expr;
mod transform;

pub use expr::{CoefExpr, ExprError};
pub use transform::Transform;

use serde_json::{Map, Value, json};

use crate::error::{PipelineError, Result};

/// How one output property is derived from one raw field.
#[derive(Debug, Clone)]
pub struct NormalizationRule {
    pub source_prop: String,
    pub coef_si: Option<CoefExpr>,
    pub value_map: Option<Map<String, Value>>,
    pub eval_method: Option<Transform>,
}

impl NormalizationRule {
    /// Compile the JSON rule for output property `name`.
    pub fn compile(name: &str, rule: &Value) -> Result<Self> {
        let Some(rule) = rule.as_object() else {
            return Err(PipelineError::Validation(format!(
                "normalizedProperties.{name}: rule is not a dict !"
            )));
        };

        let source_prop = match rule.get("sourceProp") {
            Some(Value::String(prop)) => prop.clone(),
            _ => {
                return Err(PipelineError::Validation(format!(
                    "normalizedProperties.{name}: missing 'sourceProp' attribute !"
                )));
            }
        };

        let coef_si = match rule.get("coefSI") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(parse_coef(text)?),
            Some(other) => {
                return Err(PipelineError::InvalidExpression {
                    expression: other.to_string(),
                    reason: "coefSI must be a string".to_string(),
                });
            }
        };

        let value_map = match rule.get("valueMap") {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map.clone()),
            Some(_) => {
                return Err(PipelineError::Validation(format!(
                    "normalizedProperties.{name}: 'valueMap' is not a dict !"
                )));
            }
        };

        let eval_method = match rule.get("evalMethod") {
            None | Some(Value::Null) => None,
            Some(Value::String(method)) => Some(Transform::from_name(method)?),
            Some(other) => return Err(PipelineError::UnsupportedTransform(other.to_string())),
        };

        Ok(Self {
            source_prop,
            coef_si,
            value_map,
            eval_method,
        })
    }

    /// Derive the property value from a raw record.
    ///
    /// The boolean is `false` when the value had to be nulled.
    pub fn derive(&self, raw: &Map<String, Value>) -> (Value, bool) {
        let Some(mut value) = raw.get(&self.source_prop).cloned() else {
            return (Value::Null, false);
        };
        let mut ok = true;

        if let Some(coef) = &self.coef_si {
            if !value.is_null() {
                value = match transform::as_f64(&value).map(|f| coef.apply(f)) {
                    Some(Ok(converted)) => transform::float(converted).unwrap_or(Value::Null),
                    _ => {
                        ok = false;
                        Value::Null
                    }
                };
            }
        }

        if let Some(map) = &self.value_map {
            if let Some(replacement) = map_key(&value).and_then(|key| map.get(&key)) {
                value = replacement.clone();
            }
        }

        if let Some(method) = self.eval_method {
            value = method.apply(&value).unwrap_or_else(|| {
                ok = false;
                Value::Null
            });
        }

        (value, ok)
    }
}

fn parse_coef(text: &str) -> Result<CoefExpr> {
    CoefExpr::parse(text).map_err(|err| PipelineError::InvalidExpression {
        expression: text.to_string(),
        reason: err.to_string(),
    })
}

/// `valueMap` lookup key for a scalar value.
fn map_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        _ => None,
    }
}

/// Builds the `properties` object of every feature for one request.
#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: Vec<(String, NormalizationRule)>,
    crs: Value,
    version: String,
}

/// Properties of one record plus the number of rules that nulled their value.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub properties: Map<String, Value>,
    pub soft_failures: usize,
}

impl Normalizer {
    pub fn new(rules: Vec<(String, NormalizationRule)>, crs_code: u32, version: String) -> Self {
        Self {
            rules,
            crs: crs_descriptor(crs_code),
            version,
        }
    }

    /// Normalize one raw attribute set.
    ///
    /// The result holds the raw attributes under `topsoil`, the `crs`
    /// descriptor, the `version` and one entry per rule.
    pub fn normalize(&self, raw: &Map<String, Value>) -> Normalized {
        let mut properties = Map::new();
        properties.insert("topsoil".to_string(), Value::Object(raw.clone()));
        properties.insert("crs".to_string(), self.crs.clone());
        properties.insert("version".to_string(), Value::String(self.version.clone()));

        let mut soft_failures = 0;
        for (name, rule) in &self.rules {
            let (value, ok) = rule.derive(raw);
            if !ok {
                soft_failures += 1;
            }
            properties.insert(name.clone(), value);
        }

        Normalized {
            properties,
            soft_failures,
        }
    }
}

/// Coordinate reference system attached to every feature.
pub fn crs_descriptor(code: u32) -> Value {
    json!({
        "type": "EPSG",
        "properties": {
            "code": code
        }
    })
}
