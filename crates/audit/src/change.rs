//! Field-level change sets over book rows.
//!
//! History rows carry JSON object maps rather than typed columns so the
//! trail stays readable after the schema moves on. Snapshots and diffs are
//! derived from the serde projection of [`Book`], which keeps the recorded
//! field names in lockstep with the wire format.

use serde_json::{Map, Value};

use librarium_model::Book;

/// The serde projection of a book as a JSON object map.
///
/// Only used for rows, which always serialize to an object.
pub fn snapshot(book: &Book) -> Map<String, Value> {
    match serde_json::to_value(book) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Minimal field-level diff between two snapshots of the same book.
///
/// Returns `(old_values, new_values)` holding only the fields whose value
/// actually changed; a patch that rewrites a field to its current value
/// contributes nothing. Both maps carry the same key set.
pub fn diff(before: &Book, after: &Book) -> (Map<String, Value>, Map<String, Value>) {
    let old = snapshot(before);
    let new = snapshot(after);
    let mut old_changed = Map::new();
    let mut new_changed = Map::new();
    for (field, old_value) in &old {
        let new_value = new.get(field).cloned().unwrap_or(Value::Null);
        if *old_value != new_value {
            old_changed.insert(field.clone(), old_value.clone());
            new_changed.insert(field.clone(), new_value);
        }
    }
    (old_changed, new_changed)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn book(title: &str, year: i32) -> Book {
        Book {
            id: Uuid::nil(),
            title: title.to_owned(),
            description: None,
            author_id: None,
            genre_id: None,
            year,
            is_published: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn snapshot_carries_every_field() {
        let map = snapshot(&book("Dune", 1965));
        assert_eq!(map.get("title"), Some(&Value::String("Dune".to_owned())));
        assert_eq!(map.get("year"), Some(&Value::from(1965)));
        assert_eq!(map.get("is_published"), Some(&Value::Bool(false)));
        assert!(map.contains_key("created_at"));
    }

    #[test]
    fn diff_holds_only_changed_fields() {
        let before = book("Dune", 1965);
        let mut after = before.clone();
        after.year = 1966;

        let (old, new) = diff(&before, &after);
        assert_eq!(old.len(), 1);
        assert_eq!(old.get("year"), Some(&Value::from(1965)));
        assert_eq!(new.get("year"), Some(&Value::from(1966)));
    }

    #[test]
    fn identical_rows_diff_to_nothing() {
        let row = book("Dune", 1965);
        let (old, new) = diff(&row, &row.clone());
        assert!(old.is_empty());
        assert!(new.is_empty());
    }
}
