use serde_json::Value;

/// A stored row: a JSON object keyed by field name.
pub type Row = Value;

/// Primary key of a stored row.
pub type EntityId = u64;

/// Column that carries the row id inside every stored row.
pub const ID_FIELD: &str = "id";

/// Reads the value of `field` from a row, treating non-objects as empty.
pub fn field<'a>(row: &'a Row, field: &str) -> Option<&'a Value> {
    row.as_object().and_then(|map| map.get(field))
}

/// Writes the row id into the row so readers can recover it.
pub fn with_id(mut row: Row, id: EntityId) -> Row {
    if let Some(map) = row.as_object_mut() {
        map.insert(ID_FIELD.to_string(), Value::from(id));
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_id_sets_field() {
        let row = with_id(json!({"username": "alice"}), 7);
        assert_eq!(field(&row, ID_FIELD), Some(&Value::from(7u64)));
        assert_eq!(field(&row, "username"), Some(&json!("alice")));
    }

    #[test]
    fn test_field_on_non_object() {
        assert!(field(&json!(3), "id").is_none());
    }
}
