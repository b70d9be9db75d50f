//! Recursive field masking of outgoing records.

use serde_json::Value;

use crate::constants::MASK;
use crate::protocol::LogEntry;

/// Replaces the value of every key named in `fields` with `"********"`,
/// recursively through nested mappings and arrays. Atoms are untouched.
///
/// The record is rewritten through its JSON value tree, so whatever comes
/// back is guaranteed to round-trip through serialization. Should the
/// masked tree no longer deserialize (a masked key collided with a typed
/// payload field), the original record is kept rather than dropped.
pub(crate) fn mask_entry(entry: LogEntry, fields: &[String]) -> LogEntry {
    let mut value = match serde_json::to_value(&entry) {
        Ok(value) => value,
        Err(_) => return entry,
    };
    mask_value(&mut value, fields);
    serde_json::from_value(value).unwrap_or(entry)
}

fn mask_value(value: &mut Value, fields: &[String]) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                if fields.iter().any(|field| field == key) {
                    *nested = Value::String(MASK.into());
                } else {
                    mask_value(nested, fields);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                mask_value(item, fields);
            }
        }
        _ => {}
    }
}
