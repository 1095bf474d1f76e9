//! JSON in and out of the realm, via serde_json.
//!
//! Parsing builds frozen records and arrays.  Both directions drop keys that
//! end with the reserved suffix.  Stringifying walks enumerable own data
//! properties only; functions, tokens and `Undefined` are skipped as in
//! `JSON.stringify`.  Nesting deeper than the realm's
//! `max_conversion_depth` fails with `ConversionTooDeep`.

use serde_json::{Map, Number, Value};

use crate::error::SesError;
use crate::object_model::{ObjectKind, PropertyDescriptor};
use crate::realm::Realm;
use crate::value::{ObjectHandle, SesValue, is_reserved_name};

/// Parse `text` into realm values.  Every object and array is frozen.
pub fn parse(realm: &mut Realm, text: &str) -> Result<SesValue, SesError> {
    let value: Value = serde_json::from_str(text).map_err(|e| SesError::Json(e.to_string()))?;
    from_json(realm, &value)
}

fn from_json(realm: &mut Realm, value: &Value) -> Result<SesValue, SesError> {
    Ok(match value {
        Value::Null => SesValue::Null,
        Value::Bool(b) => SesValue::Bool(*b),
        Value::Number(n) => SesValue::Number(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => SesValue::Str(s.clone()),
        Value::Array(items) => {
            let mut converted = Vec::with_capacity(items.len());
            for item in items {
                converted.push(from_json(realm, item)?);
            }
            let array = realm.new_array(converted)?;
            realm.freeze(&array)?
        }
        Value::Object(fields) => {
            let record = realm.new_record();
            for (key, field) in fields {
                if is_reserved_name(key) {
                    continue;
                }
                let field = from_json(realm, field)?;
                realm.define_own_property(&record, key, &PropertyDescriptor::data(field))?;
            }
            realm.freeze(&record)?
        }
    })
}

/// Serialize `value` to JSON text.  `Ok(None)` when `value` itself has no
/// JSON form (`Undefined`, functions, tokens).
pub fn stringify(realm: &Realm, value: &SesValue) -> Result<Option<String>, SesError> {
    let mut stack = Vec::new();
    let json = to_json(realm, value, &mut stack)?;
    json.map(|v| serde_json::to_string(&v).map_err(|e| SesError::Json(e.to_string())))
        .transpose()
}

fn to_json(
    realm: &Realm,
    value: &SesValue,
    stack: &mut Vec<ObjectHandle>,
) -> Result<Option<Value>, SesError> {
    let handle = match value {
        SesValue::Undefined => return Ok(None),
        SesValue::Null => return Ok(Some(Value::Null)),
        SesValue::Bool(b) => return Ok(Some(Value::Bool(*b))),
        SesValue::Number(n) => return Ok(Some(number_to_json(*n))),
        SesValue::Str(s) => return Ok(Some(Value::String(s.clone()))),
        SesValue::Object(h) => *h,
    };
    let obj = realm.heap().get(handle)?;
    let is_array = match obj.kind {
        ObjectKind::Array => true,
        ObjectKind::Record | ObjectKind::Ordinary => false,
        _ => return Ok(None),
    };
    if stack.contains(&handle) {
        return Err(SesError::Json("cyclic structure".to_string()));
    }
    let max = realm.config().max_conversion_depth;
    if stack.len() >= max as usize {
        return Err(SesError::ConversionTooDeep { max });
    }
    stack.push(handle);

    let mut fields = Map::new();
    let mut items = Vec::new();
    for key in obj.own_enumerable_keys() {
        if is_reserved_name(&key) {
            continue;
        }
        let Some(field) = obj.get_own_property(&key).and_then(|d| d.value) else {
            continue;
        };
        let converted = to_json(realm, &field, stack)?;
        if is_array {
            items.push(converted.unwrap_or(Value::Null));
        } else if let Some(converted) = converted {
            fields.insert(key, converted);
        }
    }
    stack.pop();
    Ok(Some(if is_array {
        Value::Array(items)
    } else {
        Value::Object(fields)
    }))
}

/// Integral values print without a fraction; non-finite values become `null`.
fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}
