use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Value as JsonValue};

use crate::error::{invalid_argument, DocbaseResult};
use crate::model::{Timestamp, Value, ValueKind};

/// JSON wire form for stored values: one-key objects tagged by kind,
/// integers carried as strings, timestamps as RFC 3339. Cursor tokens ride
/// on this codec, and remote store implementations map through it.

pub fn encode_fields(fields: &BTreeMap<String, Value>) -> DocbaseResult<JsonValue> {
    let mut object = serde_json::Map::new();
    for (key, value) in fields {
        object.insert(key.clone(), encode_value(value)?);
    }
    Ok(JsonValue::Object(object))
}

pub fn decode_fields(value: &JsonValue) -> DocbaseResult<BTreeMap<String, Value>> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid_argument("Expected an object of fields"))?;
    let mut fields = BTreeMap::new();
    for (key, value) in object {
        fields.insert(key.clone(), decode_value(value)?);
    }
    Ok(fields)
}

pub fn encode_value(value: &Value) -> DocbaseResult<JsonValue> {
    let encoded = match value.kind() {
        ValueKind::Null => json!({ "nullValue": JsonValue::Null }),
        ValueKind::Boolean(boolean) => json!({ "booleanValue": boolean }),
        ValueKind::Integer(integer) => json!({ "integerValue": integer.to_string() }),
        ValueKind::Double(double) => json!({ "doubleValue": double }),
        ValueKind::Timestamp(timestamp) => json!({ "timestampValue": encode_timestamp(timestamp) }),
        ValueKind::String(string) => json!({ "stringValue": string }),
        ValueKind::Array(values) => {
            let values = values
                .iter()
                .map(encode_value)
                .collect::<DocbaseResult<Vec<_>>>()?;
            json!({ "arrayValue": { "values": values } })
        }
        ValueKind::Map(map) => json!({
            "mapValue": {
                "fields": encode_fields(map)?
            }
        }),
        ValueKind::ServerTimestamp => {
            return Err(invalid_argument(
                "Server-timestamp sentinels have no wire form; they resolve at commit",
            ))
        }
    };
    Ok(encoded)
}

pub fn decode_value(value: &JsonValue) -> DocbaseResult<Value> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid_argument("Expected a tagged value object"))?;
    if let Some(null_value) = object.get("nullValue") {
        if null_value.is_null() {
            return Ok(Value::null());
        }
    }
    if let Some(bool_value) = object.get("booleanValue") {
        let value = bool_value
            .as_bool()
            .ok_or_else(|| invalid_argument("booleanValue must be bool"))?;
        return Ok(Value::from_bool(value));
    }
    if let Some(integer_value) = object.get("integerValue") {
        let parsed = match integer_value {
            JsonValue::String(value) => i64::from_str(value)
                .map_err(|err| invalid_argument(format!("Invalid integerValue: {err}")))?,
            JsonValue::Number(number) => number
                .as_i64()
                .ok_or_else(|| invalid_argument("Integer out of range"))?,
            _ => return Err(invalid_argument("integerValue must be a string or number")),
        };
        return Ok(Value::from_integer(parsed));
    }
    if let Some(double_value) = object.get("doubleValue") {
        let parsed = match double_value {
            JsonValue::Number(number) => number
                .as_f64()
                .ok_or_else(|| invalid_argument("Invalid doubleValue"))?,
            JsonValue::String(value) => value
                .parse::<f64>()
                .map_err(|err| invalid_argument(format!("Invalid doubleValue: {err}")))?,
            _ => return Err(invalid_argument("doubleValue must be a number or string")),
        };
        return Ok(Value::from_double(parsed));
    }
    if let Some(timestamp_value) = object.get("timestampValue") {
        let timestamp_str = timestamp_value
            .as_str()
            .ok_or_else(|| invalid_argument("timestampValue must be string"))?;
        return Ok(Value::from_timestamp(parse_timestamp(timestamp_str)?));
    }
    if let Some(string_value) = object.get("stringValue") {
        let str_value = string_value
            .as_str()
            .ok_or_else(|| invalid_argument("stringValue must be string"))?;
        return Ok(Value::from_string(str_value));
    }
    if let Some(array_value) = object.get("arrayValue") {
        let decoded = if let Some(values) = array_value.get("values") {
            match values.as_array() {
                Some(entries) => entries
                    .iter()
                    .map(decode_value)
                    .collect::<DocbaseResult<Vec<_>>>()?,
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };
        return Ok(Value::from_array(decoded));
    }
    if let Some(map_value) = object.get("mapValue") {
        let fields = match map_value.get("fields") {
            Some(fields_value) => decode_fields(fields_value)?,
            None => BTreeMap::new(),
        };
        return Ok(Value::from_map(fields));
    }

    Err(invalid_argument("Unknown value type"))
}

fn encode_timestamp(timestamp: &Timestamp) -> String {
    Utc.timestamp_opt(timestamp.seconds, timestamp.nanos as u32)
        .single()
        .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> DocbaseResult<Timestamp> {
    let datetime = DateTime::parse_from_rfc3339(value)
        .map_err(|err| invalid_argument(format!("Invalid timestamp: {err}")))?;
    let datetime_utc = datetime.with_timezone(&Utc);
    Ok(Timestamp::new(
        datetime_utc.timestamp(),
        datetime_utc.timestamp_subsec_nanos() as i32,
    ))
}
