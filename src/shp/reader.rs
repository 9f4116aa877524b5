use std::path::{Path, PathBuf};

use serde_json::{Map, Number, Value};
use shapefile::dbase::{self, FieldValue};

use super::geometry::to_geojson;
use crate::error::{PipelineError, Result};

/// One shapefile record: attributes in table order plus its geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub fields: Map<String, Value>,
    pub geometry: Value,
}

/// Attribute names of the shapefile set `target` belongs to, in table order.
pub fn field_names(target: &Path) -> Result<Vec<String>> {
    let dbf = target.with_extension("dbf");
    let reader = dbase::Reader::from_path(&dbf).map_err(|e| shapefile_error(&dbf, e))?;
    Ok(reader
        .fields()
        .iter()
        .map(|field| field.name().to_string())
        .collect())
}

/// Read every record of the shapefile set `target` belongs to, in file order.
///
/// `fields` fixes the attribute order of each [`RawRecord`]. Returns the
/// number of records visited; the first error from `visit` stops the scan.
pub fn for_each_record<F>(target: &Path, fields: &[String], mut visit: F) -> Result<u64>
where
    F: FnMut(RawRecord) -> Result<()>,
{
    let shp = shp_path(target);
    let mut reader = shapefile::Reader::from_path(&shp).map_err(|e| shapefile_error(&shp, e))?;

    let mut count = 0;
    for item in reader.iter_shapes_and_records() {
        let (shape, record) = item.map_err(|e| shapefile_error(&shp, e))?;
        let geometry = to_geojson(&shape).ok_or_else(|| PipelineError::Shapefile {
            path: shp.display().to_string(),
            reason: "multipatch shapes cannot be expressed as GeoJSON".to_string(),
        })?;

        let mut attributes = Map::new();
        for name in fields {
            if let Some(value) = record.get(name) {
                attributes.insert(name.clone(), field_value(value));
            }
        }

        visit(RawRecord {
            fields: attributes,
            geometry,
        })?;
        count += 1;
    }

    Ok(count)
}

fn shp_path(target: &Path) -> PathBuf {
    target.with_extension("shp")
}

fn shapefile_error(path: &Path, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::Shapefile {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// JSON form of a DBF cell.
///
/// Blank character cells are `null`; numbers without a fractional part become
/// integers.
fn field_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Character(s) => match s.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => Value::String(s.to_string()),
            _ => Value::Null,
        },
        FieldValue::Memo(s) => Value::String(s.clone()),
        FieldValue::Numeric(n) => n.map_or(Value::Null, number),
        FieldValue::Float(f) => f.map_or(Value::Null, |f| number(f64::from(f))),
        FieldValue::Double(d) => number(*d),
        FieldValue::Currency(c) => number(*c),
        FieldValue::Integer(i) => Value::from(*i),
        FieldValue::Logical(b) => b.map_or(Value::Null, Value::Bool),
        FieldValue::Date(d) => d.map_or(Value::Null, |d| {
            Value::String(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }),
        FieldValue::DateTime(dt) => {
            let (date, time) = (dt.date(), dt.time());
            Value::String(format!(
                "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
                date.year(),
                date.month(),
                date.day(),
                time.hours(),
                time.minutes(),
                time.seconds()
            ))
        }
        #[allow(unreachable_patterns)]
        other => Value::String(format!("{other:?}")),
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}
