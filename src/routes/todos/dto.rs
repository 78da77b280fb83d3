use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::model::Todo;
use super::queries::TodoFilter;
use crate::error::AppError;

/// Which top-level keys a request body may carry.
///
/// `ignored` keys are accepted but never read; `non_null` keys may be omitted
/// but must not be sent as `null`.
pub struct FieldSchema {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    pub ignored: &'static [&'static str],
    pub non_null: &'static [&'static str],
}

pub const CREATE_FIELDS: FieldSchema = FieldSchema {
    required: &["title"],
    optional: &["description", "completed", "deadline_at"],
    ignored: &["created_at", "updated_at"],
    non_null: &["title", "completed"],
};

pub const UPDATE_FIELDS: FieldSchema = FieldSchema {
    required: &[],
    optional: &["title", "description", "completed", "deadline_at"],
    ignored: &[],
    non_null: &["title", "completed"],
};

impl FieldSchema {
    fn recognizes(&self, key: &str) -> bool {
        self.required.contains(&key) || self.optional.contains(&key) || self.ignored.contains(&key)
    }

    pub fn check(&self, body: &Map<String, Value>) -> Result<(), AppError> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .copied()
            .filter(|field| !body.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::invalid(field_list("missing field", &missing)));
        }

        let mut unexpected: Vec<&str> = body
            .keys()
            .map(String::as_str)
            .filter(|key| !self.recognizes(key))
            .collect();
        unexpected.sort_unstable();
        if !unexpected.is_empty() {
            return Err(AppError::invalid(field_list("unexpected field", &unexpected)));
        }

        let nulled: Vec<&str> = self
            .non_null
            .iter()
            .copied()
            .filter(|field| matches!(body.get(*field), Some(Value::Null)))
            .collect();
        if !nulled.is_empty() {
            return Err(AppError::invalid(field_list("null not allowed for field", &nulled)));
        }

        Ok(())
    }

    /// Checks the key set, then deserializes into the typed request.
    pub fn parse<T: DeserializeOwned>(&self, body: Value) -> Result<T, AppError> {
        let Value::Object(map) = body else {
            return Err(AppError::invalid("request body must be a JSON object"));
        };

        self.check(&map)?;

        serde_json::from_value(Value::Object(map)).map_err(|e| AppError::invalid(e.to_string()))
    }
}

fn field_list(label: &str, fields: &[&str]) -> String {
    let plural = if fields.len() > 1 { "s" } else { "" };
    format!("{label}{plural}: {}", fields.join(", "))
}

#[derive(Debug, Deserialize)]
pub struct CreateTodo {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub deadline_at: Option<DateTime<Utc>>,
}

impl CreateTodo {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_title(&self.title)
    }
}

/// A partial update. The outer `Option` on nullable fields tells "absent"
/// apart from an explicit `null`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTodo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_timestamp_patch")]
    pub deadline_at: Option<Option<DateTime<Utc>>>,
}

impl UpdateTodo {
    pub fn validate(&self) -> Result<(), AppError> {
        match &self.title {
            Some(title) => validate_title(title),
            None => Ok(()),
        }
    }

    /// Overwrites every field present in the patch; the rest keep their value.
    pub fn apply(self, todo: &mut Todo) {
        if let Some(title) = self.title {
            todo.title = title;
        }
        if let Some(description) = self.description {
            todo.description = description;
        }
        if let Some(completed) = self.completed {
            todo.completed = completed;
        }
        if let Some(deadline_at) = self.deadline_at {
            todo.deadline_at = deadline_at;
        }
    }
}

fn validate_title(title: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::invalid("title must not be empty"));
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub completed: Option<String>,
    pub window: Option<String>,
}

impl ListParams {
    pub fn into_filter(self, now: DateTime<Utc>) -> Result<TodoFilter, AppError> {
        let completed = self.completed.as_deref().map(parse_bool_flag).transpose()?;
        let due_before = self
            .window
            .as_deref()
            .map(|window| window_bound(window, now))
            .transpose()?;

        Ok(TodoFilter {
            completed,
            due_before,
        })
    }
}

/// `"true"` / `"false"`, case-insensitive. Nothing else is truthy.
pub fn parse_bool_flag(raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(AppError::invalid(format!(
            "completed must be \"true\" or \"false\", got {raw:?}"
        ))),
    }
}

/// Latest deadline that still falls inside a window of `raw` days from `now`.
pub fn window_bound(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
    let days: i64 = raw.trim().parse().map_err(|_| {
        AppError::invalid(format!("window must be a whole number of days, got {raw:?}"))
    })?;

    Duration::try_days(days)
        .and_then(|span| now.checked_add_signed(span))
        .ok_or_else(|| AppError::invalid(format!("window of {days} days is out of range")))
}

/// Accepts RFC 3339, a naive date-time (read as UTC) or a bare date.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Some(midnight) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }

    Err(format!("deadline_at must be an ISO-8601 timestamp, got {raw:?}"))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|value| parse_timestamp(&value).map_err(serde::de::Error::custom))
        .transpose()
}

fn deserialize_timestamp_patch<'de, D>(
    deserializer: D,
) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_timestamp(deserializer).map(Some)
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn error_message(err: AppError) -> String {
        match err {
            AppError::InvalidInput(message) => message,
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    fn sample_todo() -> Todo {
        let at = Utc.with_ymd_and_hms(2023, 2, 20, 0, 0, 0).unwrap();
        Todo {
            id: 1,
            title: "Watch lecture".to_string(),
            description: Some("week 1".to_string()),
            completed: false,
            deadline_at: Some(Utc.with_ymd_and_hms(2023, 2, 27, 0, 0, 0).unwrap()),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_create_requires_title() {
        let err = CREATE_FIELDS
            .parse::<CreateTodo>(json!({"description": "no title"}))
            .unwrap_err();
        assert_eq!(error_message(err), "missing field: title");
    }

    #[test]
    fn test_create_names_every_unexpected_field() {
        let err = CREATE_FIELDS
            .parse::<CreateTodo>(json!({"title": "X", "foo": "bar", "baz": 1}))
            .unwrap_err();
        assert_eq!(error_message(err), "unexpected fields: baz, foo");
    }

    #[test]
    fn test_create_accepts_store_maintained_timestamps() {
        let create: CreateTodo = CREATE_FIELDS
            .parse(json!({"title": "X", "created_at": "2023-02-20T00:00:00"}))
            .unwrap();
        assert_eq!(create.title, "X");
        assert!(!create.completed);
        assert!(create.description.is_none());
        assert!(create.deadline_at.is_none());
    }

    #[test]
    fn test_create_parses_naive_deadline_as_utc() {
        let create: CreateTodo = CREATE_FIELDS
            .parse(json!({"title": "X", "deadline_at": "2023-02-27T00:00:00"}))
            .unwrap();
        assert_eq!(
            create.deadline_at,
            Some(Utc.with_ymd_and_hms(2023, 2, 27, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_create_rejects_bad_deadline() {
        let err = CREATE_FIELDS
            .parse::<CreateTodo>(json!({"title": "X", "deadline_at": "next tuesday"}))
            .unwrap_err();
        assert!(error_message(err).contains("deadline_at"));
    }

    #[test]
    fn test_create_rejects_wrong_type() {
        let err = CREATE_FIELDS
            .parse::<CreateTodo>(json!({"title": "X", "completed": "yes"}))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_body_must_be_object() {
        let err = CREATE_FIELDS.parse::<CreateTodo>(json!(["title"])).unwrap_err();
        assert_eq!(error_message(err), "request body must be a JSON object");
    }

    #[test]
    fn test_empty_title_fails_validation() {
        let create: CreateTodo = CREATE_FIELDS.parse(json!({"title": "   "})).unwrap();
        assert!(create.validate().is_err());
    }

    #[test]
    fn test_update_rejects_created_at() {
        let err = UPDATE_FIELDS
            .parse::<UpdateTodo>(json!({"created_at": "2023-02-20T00:00:00"}))
            .unwrap_err();
        assert_eq!(error_message(err), "unexpected field: created_at");
    }

    #[test]
    fn test_update_rejects_null_title() {
        let err = UPDATE_FIELDS
            .parse::<UpdateTodo>(json!({"title": null}))
            .unwrap_err();
        assert_eq!(error_message(err), "null not allowed for field: title");
    }

    #[test]
    fn test_update_only_touches_present_fields() {
        let mut todo = sample_todo();
        let patch: UpdateTodo = UPDATE_FIELDS.parse(json!({"completed": true})).unwrap();

        patch.apply(&mut todo);

        let mut expected = sample_todo();
        expected.completed = true;
        assert_eq!(todo, expected);
    }

    #[test]
    fn test_update_null_clears_nullable_fields() {
        let mut todo = sample_todo();
        let patch: UpdateTodo = UPDATE_FIELDS
            .parse(json!({"description": null, "deadline_at": null}))
            .unwrap();

        patch.apply(&mut todo);

        assert!(todo.description.is_none());
        assert!(todo.deadline_at.is_none());
        assert_eq!(todo.title, "Watch lecture");
    }

    #[test]
    fn test_parse_bool_flag() {
        assert!(parse_bool_flag("true").unwrap());
        assert!(parse_bool_flag("TRUE").unwrap());
        assert!(!parse_bool_flag("False").unwrap());
        assert!(parse_bool_flag("yes").is_err());
        assert!(parse_bool_flag("").is_err());
        assert!(parse_bool_flag("1").is_err());
    }

    #[test]
    fn test_window_bound() {
        let now = Utc.with_ymd_and_hms(2023, 2, 20, 12, 0, 0).unwrap();
        assert_eq!(
            window_bound("7", now).unwrap(),
            Utc.with_ymd_and_hms(2023, 2, 27, 12, 0, 0).unwrap()
        );
        assert!(window_bound("seven", now).is_err());
        assert!(window_bound("1.5", now).is_err());
        assert!(window_bound("99999999999999", now).is_err());
    }

    #[test]
    fn test_list_params_into_filter() {
        let now = Utc.with_ymd_and_hms(2023, 2, 20, 0, 0, 0).unwrap();

        let filter = ListParams::default().into_filter(now).unwrap();
        assert_eq!(filter, TodoFilter::default());

        let filter = ListParams {
            completed: Some("false".to_string()),
            window: Some("1".to_string()),
        }
        .into_filter(now)
        .unwrap();
        assert_eq!(filter.completed, Some(false));
        assert_eq!(
            filter.due_before,
            Some(Utc.with_ymd_and_hms(2023, 2, 21, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2023, 2, 27, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2023-02-27T00:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2023-02-27T10:00:00+10:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2023-02-27T00:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2023-02-27 00:00:00.000").unwrap(), expected);
        assert_eq!(parse_timestamp("2023-02-27T00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2023-02-27").unwrap(), expected);
        assert!(parse_timestamp("27/02/2023").is_err());
    }
}
