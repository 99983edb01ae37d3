//! Field-level edits of a record, as entered in a form or on the command line.

use serde_json::{Map, Value};

use crate::api::ApiError;
use crate::models::Record;

/// Collect `field=value` assignments on top of an optional JSON object.
///
/// Assignments win over keys of the same name in `json`. Values from
/// assignments are always strings.
pub fn parse_assignments(
    assignments: &[String],
    json: Option<&str>,
) -> Result<Map<String, Value>, ApiError> {
    let mut fields = match json {
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(object)) => object,
            _ => return Err(ApiError::validation_field("json", "Expected a JSON object")),
        },
        None => Map::new(),
    };

    for assignment in assignments {
        let Some((key, value)) = assignment.split_once('=') else {
            return Err(ApiError::validation_field(
                "fields",
                format!("Expected field=value, got '{}'", assignment),
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ApiError::validation_field("fields", "Field name is empty"));
        }
        fields.insert(key.to_string(), Value::String(value.to_string()));
    }

    if fields.is_empty() {
        return Err(ApiError::validation_field("fields", "No fields given"));
    }
    Ok(fields)
}

/// `record` with `fields` written over it.
///
/// Every key must name a field of the record and every value must fit it.
pub fn apply_fields<T: Record>(record: &T, fields: &Map<String, Value>) -> Result<T, ApiError> {
    let mut value = serde_json::to_value(record)
        .map_err(|e| ApiError::validation_field("fields", e.to_string()))?;
    let Some(object) = value.as_object_mut() else {
        return Err(ApiError::validation_field("fields", "Record is not an object"));
    };

    for (key, field) in fields {
        if !object.contains_key(key) {
            return Err(ApiError::validation_field(
                key,
                format!("Unknown {} field '{}'", T::COLLECTION, key),
            ));
        }
        object.insert(key.clone(), field.clone());
    }

    serde_json::from_value(value).map_err(|e| {
        ApiError::validation_field("fields", format!("Invalid {} fields: {}", T::COLLECTION, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ErrorCode;
    use crate::models::{Hero, Project};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_assignments_override_json() {
        let fields = parse_assignments(
            &args(&["title=Atlas", "link=https://a.example?x=1"]),
            Some(r#"{"title": "Old", "year": "2023"}"#),
        )
        .unwrap();

        assert_eq!(fields["title"], "Atlas");
        assert_eq!(fields["year"], "2023");
        // Only the first '=' separates name and value
        assert_eq!(fields["link"], "https://a.example?x=1");
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        let err = parse_assignments(&args(&["title"]), None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert_eq!(err.message(), "Expected field=value, got 'title'");

        assert!(parse_assignments(&[], Some("[1, 2]")).is_err());
        assert!(parse_assignments(&[], None).is_err());
    }

    #[test]
    fn test_apply_fields_keeps_untouched_fields() {
        let project = Project {
            title: "Atlas".to_string(),
            year: "2023".to_string(),
            ..Default::default()
        };
        let fields = parse_assignments(&args(&["category=Web"]), None).unwrap();

        let updated = apply_fields(&project, &fields).unwrap();
        assert_eq!(updated.title, "Atlas");
        assert_eq!(updated.year, "2023");
        assert_eq!(updated.category, "Web");
    }

    #[test]
    fn test_apply_fields_rejects_unknown_or_mistyped_fields() {
        let fields = parse_assignments(&args(&["headline=Hi"]), None).unwrap();
        let err = apply_fields(&Hero::default(), &fields).unwrap_err();
        assert_eq!(err.message(), "Unknown hero field 'headline'");

        let fields = parse_assignments(&[], Some(r#"{"title": 42}"#)).unwrap();
        assert!(apply_fields(&Hero::default(), &fields).is_err());
    }
}
