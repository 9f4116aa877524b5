use serde_json::{Number, Value};

use crate::error::PipelineError;

/// Scalar transforms selectable by `evalMethod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    ToFloat,
    ToInt,
    ToString,
    Trim,
    Lower,
    Upper,
    Round,
}

/// Every accepted `evalMethod` name.
const TRANSFORMS: &[(&str, Transform)] = &[
    ("toFloat", Transform::ToFloat),
    ("float", Transform::ToFloat),
    ("toInt", Transform::ToInt),
    ("int", Transform::ToInt),
    ("toString", Transform::ToString),
    ("str", Transform::ToString),
    ("trim", Transform::Trim),
    ("strip", Transform::Trim),
    ("lower", Transform::Lower),
    ("upper", Transform::Upper),
    ("round", Transform::Round),
];

impl Transform {
    pub fn from_name(name: &str) -> Result<Self, PipelineError> {
        TRANSFORMS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, transform)| *transform)
            .ok_or_else(|| PipelineError::UnsupportedTransform(name.to_string()))
    }

    /// Apply the transform.
    ///
    /// `null` passes through. `None` means the value could not be converted.
    pub fn apply(self, value: &Value) -> Option<Value> {
        if value.is_null() {
            return Some(Value::Null);
        }
        match self {
            Transform::ToFloat => as_f64(value).and_then(float),
            Transform::ToInt => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
                _ => as_f64(value).and_then(|f| int(f.trunc())),
            },
            Transform::Round => as_f64(value).and_then(|f| int(f.round())),
            Transform::ToString => Some(Value::String(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })),
            Transform::Trim => map_str(value, |s| s.trim().to_string()),
            Transform::Lower => map_str(value, str::to_lowercase),
            Transform::Upper => map_str(value, str::to_uppercase),
        }
    }
}

/// Numeric view of a scalar; strings are parsed.
pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub(crate) fn float(f: f64) -> Option<Value> {
    Number::from_f64(f).map(Value::Number)
}

fn int(f: f64) -> Option<Value> {
    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(Value::from(f as i64))
    } else {
        None
    }
}

fn map_str(value: &Value, f: impl FnOnce(&str) -> String) -> Option<Value> {
    value.as_str().map(|s| Value::String(f(s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_by_name() {
        assert_eq!(Transform::from_name("toFloat").unwrap(), Transform::ToFloat);
        assert_eq!(Transform::from_name("strip").unwrap(), Transform::Trim);
        assert!(matches!(
            Transform::from_name("__del__"),
            Err(PipelineError::UnsupportedTransform(name)) if name == "__del__"
        ));
    }

    #[test]
    fn numeric_transforms() {
        assert_eq!(Transform::ToFloat.apply(&json!("0.3")), Some(json!(0.3)));
        assert_eq!(Transform::ToFloat.apply(&json!(2)), Some(json!(2.0)));
        assert_eq!(Transform::ToInt.apply(&json!("7.9")), Some(json!(7)));
        assert_eq!(Transform::ToInt.apply(&json!(-3.2)), Some(json!(-3)));
        assert_eq!(Transform::ToInt.apply(&json!(12)), Some(json!(12)));
        assert_eq!(Transform::Round.apply(&json!(2.5)), Some(json!(3)));
        assert_eq!(Transform::ToFloat.apply(&json!("n/a")), None);
        assert_eq!(Transform::ToInt.apply(&json!([1])), None);
    }

    #[test]
    fn string_transforms() {
        assert_eq!(Transform::Trim.apply(&json!("  sand ")), Some(json!("sand")));
        assert_eq!(Transform::Upper.apply(&json!("clay")), Some(json!("CLAY")));
        assert_eq!(Transform::Lower.apply(&json!("SILT")), Some(json!("silt")));
        assert_eq!(Transform::ToString.apply(&json!(0.5)), Some(json!("0.5")));
        assert_eq!(Transform::ToString.apply(&json!(true)), Some(json!("true")));
        assert_eq!(Transform::Trim.apply(&json!(4)), None);
    }

    #[test]
    fn null_passes_through() {
        for (_, transform) in TRANSFORMS {
            assert_eq!(transform.apply(&Value::Null), Some(Value::Null));
        }
    }
}
