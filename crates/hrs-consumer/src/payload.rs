//! Lenient payload field access.
//!
//! Payloads are aggregate snapshots serialized by the origin's ORM, which
//! is loose about scalar types: ids and versions arrive as numbers or
//! numeric strings, booleans as true/false or 0/1, timestamps in more
//! than one shape. These helpers normalize without failing the message;
//! what a missing field means is the reconciler's call.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Integer field, accepting a JSON number or a numeric string.
pub fn int_field(payload: &Value, key: &str) -> Option<i64> {
    match payload.get(key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// Boolean field, accepting true/false, 0/1, or their string forms.
pub fn bool_field(payload: &Value, key: &str) -> Option<bool> {
    match payload.get(key) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::Number(n)) => n.as_i64().map(|n| n != 0),
        Some(Value::String(s)) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            other => other.parse::<i64>().ok().map(|n| n != 0),
        },
        _ => None,
    }
}

/// Timestamp field: RFC 3339 or `YYYY-MM-DD HH:MM:SS` (treated as UTC).
pub fn timestamp_field(payload: &Value, key: &str) -> Option<DateTime<Utc>> {
    let raw = str_field(payload, key)?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

/// Date field: the date part of a date or datetime value.
pub fn date_field(payload: &Value, key: &str) -> Option<NaiveDate> {
    let raw = str_field(payload, key)?;
    let date_part = raw
        .split(['T', ' '])
        .next()
        .unwrap_or(raw);

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Delete payloads may wrap the snapshot (`{"employee": {...}}`) or ship
/// it flat; return the inner object when the wrapper is present.
pub fn entity<'a>(payload: &'a Value, wrapper: &str) -> &'a Value {
    match payload.get(wrapper) {
        Some(inner) if inner.is_object() => inner,
        _ => payload,
    }
}

/// Aggregate id for bookkeeping rows: the snapshot's own id, else the id
/// of a nested before/after or entity object, else "0".
pub fn aggregate_id_of(payload: &Value) -> String {
    let direct = int_field(payload, "id");
    let nested = ["after", "before", "employee", "department", "skill"]
        .iter()
        .find_map(|key| payload.get(key).and_then(|v| int_field(v, "id")));

    direct
        .or(nested)
        .map(|id| id.to_string())
        .unwrap_or_else(|| "0".to_string())
}

/// Skill ids of an employee snapshot: `skills[].id`, ignoring entries
/// without one. A missing or non-array skills field is an empty set.
pub fn skill_ids_of(payload: &Value) -> Vec<i64> {
    payload
        .get("skills")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|item| int_field(item, "id")).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn int_field_accepts_numbers_and_numeric_strings() {
        let v = json!({"a": 7, "b": "42", "c": "x", "d": null});
        assert_eq!(int_field(&v, "a"), Some(7));
        assert_eq!(int_field(&v, "b"), Some(42));
        assert_eq!(int_field(&v, "c"), None);
        assert_eq!(int_field(&v, "d"), None);
        assert_eq!(int_field(&v, "missing"), None);
    }

    #[test]
    fn bool_field_accepts_zero_one() {
        let v = json!({"a": true, "b": 0, "c": "1", "d": "false"});
        assert_eq!(bool_field(&v, "a"), Some(true));
        assert_eq!(bool_field(&v, "b"), Some(false));
        assert_eq!(bool_field(&v, "c"), Some(true));
        assert_eq!(bool_field(&v, "d"), Some(false));
        assert_eq!(bool_field(&v, "missing"), None);
    }

    #[test]
    fn date_field_takes_date_part_of_datetime() {
        let v = json!({"a": "2026-03-14T00:00:00.000000Z", "b": "2026-03-14 10:00:00", "c": "bogus"});
        let expected = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(date_field(&v, "a"), Some(expected));
        assert_eq!(date_field(&v, "b"), Some(expected));
        assert_eq!(date_field(&v, "c"), None);
    }

    #[test]
    fn aggregate_id_prefers_direct_then_nested() {
        assert_eq!(aggregate_id_of(&json!({"id": 9})), "9");
        assert_eq!(aggregate_id_of(&json!({"employee": {"id": 3}})), "3");
        assert_eq!(aggregate_id_of(&json!({"after": {"id": "5"}})), "5");
        assert_eq!(aggregate_id_of(&json!({"name": "x"})), "0");
        assert_eq!(aggregate_id_of(&json!(null)), "0");
    }

    #[test]
    fn entity_unwraps_when_wrapped() {
        let wrapped = json!({"skill": {"id": 2, "version": 1}});
        assert_eq!(int_field(entity(&wrapped, "skill"), "id"), Some(2));

        let flat = json!({"id": 2, "version": 1});
        assert_eq!(int_field(entity(&flat, "skill"), "id"), Some(2));
    }

    #[test]
    fn skill_ids_ignore_malformed_entries() {
        let v = json!({"skills": [{"id": 1}, {"name": "no id"}, {"id": "3"}]});
        assert_eq!(skill_ids_of(&v), vec![1, 3]);
        assert_eq!(skill_ids_of(&json!({})), Vec::<i64>::new());
        assert_eq!(skill_ids_of(&json!({"skills": []})), Vec::<i64>::new());
    }
}
