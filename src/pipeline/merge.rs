//! Chunk merging: fold a document's partial records into one.
//!
//! The fold runs over records in ascending window-start order and starts from
//! an empty map. Per key, by value shape:
//!
//! | accumulator | incoming | result                                   |
//! |-------------|----------|------------------------------------------|
//! | absent      | any      | incoming                                 |
//! | empty       | any      | incoming                                 |
//! | scalar      | any      | accumulator (earliest non-empty wins)    |
//! | list        | list     | union, first occurrence order            |
//! | map         | map      | recurse                                  |
//! | list / map  | other    | accumulator                              |
//!
//! Values are normalized on the way in (strings trimmed, lists de-duplicated,
//! maps normalized recursively), which is what makes folding the same record a
//! second time a no-op.

use crate::record::{PartialRecord, ValueShape};
use serde_json::Value;

/// Merge partial records that are already in window-start order.
pub fn merge_records<I>(ordered: I) -> PartialRecord
where
    I: IntoIterator<Item = PartialRecord>,
{
    let mut acc = PartialRecord::new();
    for record in ordered {
        merge_into(&mut acc, record);
    }
    acc
}

/// Fold one record into the accumulator.
pub fn merge_into(acc: &mut PartialRecord, incoming: PartialRecord) {
    for (key, value) in incoming {
        let value = normalize(value);
        match acc.get_mut(&key) {
            None => {
                acc.insert(key, value);
            }
            Some(current) => merge_value(current, value),
        }
    }
}

fn merge_value(current: &mut Value, incoming: Value) {
    match (ValueShape::of(current), ValueShape::of(&incoming)) {
        (ValueShape::Empty, ValueShape::Empty) => {}
        (ValueShape::Empty, _) => *current = incoming,
        (ValueShape::List, ValueShape::List) => {
            if let (Value::Array(items), Value::Array(more)) = (current, incoming) {
                for item in more {
                    if !items.contains(&item) {
                        items.push(item);
                    }
                }
            }
        }
        (ValueShape::Map, ValueShape::Map) => {
            if let (Value::Object(inner), Value::Object(more)) = (current, incoming) {
                merge_into(inner, more);
            }
        }
        _ => {}
    }
}

/// Trim strings, de-duplicate lists, normalize nested maps.
fn normalize(value: Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.len() == s.len() {
                Value::String(s)
            } else {
                Value::String(trimmed.to_string())
            }
        }
        Value::Array(items) => {
            let mut out: Vec<Value> = Vec::with_capacity(items.len());
            for item in items.into_iter().map(normalize) {
                if !out.contains(&item) {
                    out.push(item);
                }
            }
            Value::Array(out)
        }
        Value::Object(map) => {
            let mut out = PartialRecord::new();
            merge_into(&mut out, map);
            Value::Object(out)
        }
        other => other,
    }
}
