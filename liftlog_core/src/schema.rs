//! Payload validation.
//!
//! Each event type maps to a strict field contract. Validation walks the raw
//! JSON payload against that contract, collects every violation (with a
//! dotted path to the offending field) and only then builds the typed
//! [`EventPayload`]. Null-valued optional fields are treated as absent.

use crate::error::FieldViolation;
use crate::event::{EventPayload, EventType};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Clone, Copy)]
enum Kind {
    Text,
    NonEmptyText,
    /// Non-empty identifier of at most `MAX_ID_BYTES` bytes
    Id,
    Uuid,
    /// Integer in `[min, max]`
    Count { min: u64, max: u64 },
    /// Non-negative finite number
    Amount,
    /// Number in [0, 100)
    Percent,
    Choice(&'static [&'static str]),
    IdList,
    Objects(&'static [Field]),
    Rule,
}

#[derive(Clone, Copy)]
struct Field {
    name: &'static str,
    kind: Kind,
    required: bool,
}

const fn required(name: &'static str, kind: Kind) -> Field {
    Field {
        name,
        kind,
        required: true,
    }
}

const fn optional(name: &'static str, kind: Kind) -> Field {
    Field {
        name,
        kind,
        required: false,
    }
}

/// Identifiers end up in projection file names
pub const MAX_ID_BYTES: usize = 64;
const MAX_SETS: u64 = 1_000;
const MAX_REPS: u64 = 10_000;
const MAX_REST_SECONDS: u64 = 86_400;

const SETS: Kind = Kind::Count { min: 1, max: MAX_SETS };
const TARGET_REPS: Kind = Kind::Count { min: 1, max: MAX_REPS };
const REPS: Kind = Kind::Count { min: 0, max: MAX_REPS };
const REST_SECONDS: Kind = Kind::Count { min: 0, max: MAX_REST_SECONDS };

const UNITS: &[&str] = &["kg", "lb"];
const STATUSES: &[&str] = &["completed", "failed", "skipped"];
const SET_TYPES: &[&str] = &[
    "standard", "working", "warmup", "dropset", "pyramid", "amrap", "other",
];
const RULE_TYPES: &[&str] = &["linear", "double_progression", "bodyweight_to_weighted"];

const SET_GROUP: &[Field] = &[
    required("target_sets", SETS),
    optional("target_reps", TARGET_REPS),
    optional("target_weight", Kind::Amount),
    optional("target_unit", Kind::Choice(UNITS)),
    optional("set_type", Kind::Choice(SET_TYPES)),
    optional("rest_seconds", REST_SECONDS),
    optional("notes", Kind::Text),
];

const TEMPLATE_EXERCISE: &[Field] = &[
    required("exercise_id", Kind::Id),
    optional("set_groups", Kind::Objects(SET_GROUP)),
    optional("target_sets", SETS),
    optional("target_reps", TARGET_REPS),
    optional("target_weight", Kind::Amount),
    optional("target_unit", Kind::Choice(UNITS)),
    optional("set_type", Kind::Choice(SET_TYPES)),
    optional("rest_seconds", REST_SECONDS),
    optional("notes", Kind::Text),
    optional("progression", Kind::Rule),
];

const LINEAR_RULE: &[Field] = &[
    required("type", Kind::Choice(RULE_TYPES)),
    optional("increment", Kind::Amount),
    optional("deload_percent", Kind::Percent),
];

const DOUBLE_RULE: &[Field] = &[
    required("type", Kind::Choice(RULE_TYPES)),
    required("rep_floor", TARGET_REPS),
    required("rep_ceiling", TARGET_REPS),
    optional("increment", Kind::Amount),
    optional("deload_percent", Kind::Percent),
];

const BODYWEIGHT_RULE: &[Field] = &[
    required("type", Kind::Choice(RULE_TYPES)),
    required("target_reps", TARGET_REPS),
    optional("increment", Kind::Amount),
    optional("deload_percent", Kind::Percent),
];

const WORKOUT_STARTED: &[Field] = &[
    optional("workout_id", Kind::Id),
    optional("name", Kind::Text),
    optional("from_template_id", Kind::Id),
    optional("exercise_ids", Kind::IdList),
    optional("exercise_plans", Kind::Objects(TEMPLATE_EXERCISE)),
];

const WORKOUT_COMPLETED: &[Field] = &[
    required("workout_id", Kind::Id),
    optional("notes", Kind::Text),
];

const WORKOUT_DISCARDED: &[Field] = &[
    required("workout_id", Kind::Id),
    optional("reason", Kind::Text),
];

const EXERCISE_ADDED: &[Field] = &[
    required("workout_id", Kind::Id),
    required("exercise_id", Kind::Id),
];

const SET_LOGGED: &[Field] = &[
    required("workout_id", Kind::Id),
    required("exercise_id", Kind::Id),
    required("weight", Kind::Amount),
    required("reps", REPS),
    optional("unit", Kind::Choice(UNITS)),
    optional("status", Kind::Choice(STATUSES)),
];

const SET_MODIFIED: &[Field] = &[
    required("workout_id", Kind::Id),
    required("original_event_id", Kind::Uuid),
    optional("weight", Kind::Amount),
    optional("reps", REPS),
    optional("unit", Kind::Choice(UNITS)),
];

const SET_DELETED: &[Field] = &[
    required("workout_id", Kind::Id),
    required("original_event_id", Kind::Uuid),
    optional("reason", Kind::Text),
];

const TEMPLATE_CREATED: &[Field] = &[
    optional("template_id", Kind::Id),
    required("name", Kind::NonEmptyText),
    optional("exercise_ids", Kind::IdList),
    optional("exercises", Kind::Objects(TEMPLATE_EXERCISE)),
    optional("source_workout_id", Kind::Id),
    optional("default_progression", Kind::Rule),
];

const TEMPLATE_UPDATED: &[Field] = &[
    required("template_id", Kind::Id),
    optional("name", Kind::NonEmptyText),
    optional("exercise_ids", Kind::IdList),
    optional("exercises", Kind::Objects(TEMPLATE_EXERCISE)),
    optional("default_progression", Kind::Rule),
];

const TEMPLATE_DELETED: &[Field] = &[required("template_id", Kind::Id)];

fn contract(event_type: EventType) -> &'static [Field] {
    match event_type {
        EventType::WorkoutStarted => WORKOUT_STARTED,
        EventType::WorkoutCompleted => WORKOUT_COMPLETED,
        EventType::WorkoutDiscarded => WORKOUT_DISCARDED,
        EventType::ExerciseAdded => EXERCISE_ADDED,
        EventType::SetLogged => SET_LOGGED,
        EventType::SetModified => SET_MODIFIED,
        EventType::SetDeleted => SET_DELETED,
        EventType::TemplateCreated => TEMPLATE_CREATED,
        EventType::TemplateUpdated => TEMPLATE_UPDATED,
        EventType::TemplateDeleted => TEMPLATE_DELETED,
    }
}

/// Validate a raw payload and build the typed, normalized payload
pub fn validate(event_type: EventType, payload: &Value) -> Result<EventPayload> {
    let mut checker = Checker::default();
    let cleaned = checker.object("", payload, contract(event_type));

    if let Some(map) = &cleaned {
        if event_type == EventType::SetModified
            && !["weight", "reps", "unit"].iter().any(|k| map.contains_key(*k))
        {
            checker.push("payload", "at least one of weight, reps, unit is required");
        }
    }

    if !checker.violations.is_empty() {
        tracing::debug!(
            "Rejected {} payload with {} violation(s)",
            event_type,
            checker.violations.len()
        );
        return Err(Error::Validation {
            event_type: Some(event_type),
            violations: checker.violations,
        });
    }

    let value = Value::Object(cleaned.unwrap_or_default());
    let typed = match event_type {
        EventType::WorkoutStarted => EventPayload::WorkoutStarted(build(event_type, value)?),
        EventType::WorkoutCompleted => EventPayload::WorkoutCompleted(build(event_type, value)?),
        EventType::WorkoutDiscarded => EventPayload::WorkoutDiscarded(build(event_type, value)?),
        EventType::ExerciseAdded => EventPayload::ExerciseAdded(build(event_type, value)?),
        EventType::SetLogged => EventPayload::SetLogged(build(event_type, value)?),
        EventType::SetModified => EventPayload::SetModified(build(event_type, value)?),
        EventType::SetDeleted => EventPayload::SetDeleted(build(event_type, value)?),
        EventType::TemplateCreated => EventPayload::TemplateCreated(build(event_type, value)?),
        EventType::TemplateUpdated => EventPayload::TemplateUpdated(build(event_type, value)?),
        EventType::TemplateDeleted => EventPayload::TemplateDeleted(build(event_type, value)?),
    };
    Ok(typed)
}

fn build<T: DeserializeOwned>(event_type: EventType, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::invalid(Some(event_type), "payload", e.to_string()))
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

#[derive(Default)]
struct Checker {
    violations: Vec<FieldViolation>,
}

impl Checker {
    fn push(&mut self, field: impl Into<String>, problem: impl Into<String>) {
        self.violations.push(FieldViolation::new(field, problem));
    }

    /// Check an object against `fields`, returning it without null entries
    fn object(
        &mut self,
        path: &str,
        value: &Value,
        fields: &'static [Field],
    ) -> Option<Map<String, Value>> {
        let Some(map) = value.as_object() else {
            let field = if path.is_empty() { "payload" } else { path };
            self.push(field, "expected an object");
            return None;
        };

        for key in map.keys() {
            if !fields.iter().any(|f| f.name == key) {
                self.push(join(path, key), "unknown field");
            }
        }

        let mut cleaned = Map::new();
        for field in fields {
            let field_path = join(path, field.name);
            match map.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        self.push(field_path, "missing required field");
                    }
                }
                Some(v) => {
                    if let Some(checked) = self.value(&field_path, v, field.kind) {
                        cleaned.insert(field.name.to_string(), checked);
                    }
                }
            }
        }
        Some(cleaned)
    }

    fn value(&mut self, path: &str, value: &Value, kind: Kind) -> Option<Value> {
        match kind {
            Kind::Text => match value {
                Value::String(_) => Some(value.clone()),
                _ => self.reject(path, "expected a string"),
            },
            Kind::NonEmptyText => match value.as_str() {
                Some(s) if !s.trim().is_empty() => Some(value.clone()),
                Some(_) => self.reject(path, "must not be empty"),
                None => self.reject(path, "expected a string"),
            },
            Kind::Uuid => match value.as_str().map(Uuid::parse_str) {
                Some(Ok(_)) => Some(value.clone()),
                _ => self.reject(path, "expected a UUID"),
            },
            Kind::Id => match value.as_str() {
                Some(s) if s.trim().is_empty() => self.reject(path, "must not be empty"),
                Some(s) if s.len() > MAX_ID_BYTES => {
                    self.reject(path, format!("must be at most {} bytes", MAX_ID_BYTES))
                }
                Some(_) => Some(value.clone()),
                None => self.reject(path, "expected a string"),
            },
            Kind::Count { min, max } => match value.as_u64() {
                Some(n) if n > max => self.reject(path, format!("must be at most {}", max)),
                Some(n) if n >= min => Some(value.clone()),
                Some(_) => self.reject(path, format!("must be at least {}", min)),
                None if value.is_i64() => self.reject(path, format!("must be at least {}", min)),
                None => self.reject(path, "expected an integer"),
            },
            Kind::Amount => match value.as_f64() {
                Some(n) if n.is_finite() && n >= 0.0 => Some(value.clone()),
                Some(_) => self.reject(path, "must be a non-negative number"),
                None => self.reject(path, "expected a number"),
            },
            Kind::Percent => match value.as_f64() {
                Some(n) if (0.0..100.0).contains(&n) => Some(value.clone()),
                Some(_) => self.reject(path, "must be between 0 and 100"),
                None => self.reject(path, "expected a number"),
            },
            Kind::Choice(options) => match value.as_str() {
                Some(s) if options.contains(&s) => Some(value.clone()),
                _ => self.reject(path, format!("expected one of: {}", options.join(", "))),
            },
            Kind::IdList => {
                let Some(items) = value.as_array() else {
                    return self.reject(path, "expected an array of strings");
                };
                let before = self.violations.len();
                for (i, item) in items.iter().enumerate() {
                    match item.as_str() {
                        Some(s) if s.len() > MAX_ID_BYTES => self.push(
                            format!("{}[{}]", path, i),
                            format!("must be at most {} bytes", MAX_ID_BYTES),
                        ),
                        Some(s) if !s.trim().is_empty() => {}
                        _ => self.push(format!("{}[{}]", path, i), "expected a non-empty string"),
                    }
                }
                (self.violations.len() == before).then(|| value.clone())
            }
            Kind::Objects(fields) => {
                let Some(items) = value.as_array() else {
                    return self.reject(path, "expected an array of objects");
                };
                let cleaned: Vec<Value> = items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| {
                        self.object(&format!("{}[{}]", path, i), item, fields)
                            .map(Value::Object)
                    })
                    .collect();
                Some(Value::Array(cleaned))
            }
            Kind::Rule => self.rule(path, value),
        }
    }

    fn rule(&mut self, path: &str, value: &Value) -> Option<Value> {
        let fields = match value.get("type").and_then(Value::as_str) {
            Some("linear") => LINEAR_RULE,
            Some("double_progression") => DOUBLE_RULE,
            Some("bodyweight_to_weighted") => BODYWEIGHT_RULE,
            _ if !value.is_object() => return self.reject(path, "expected an object"),
            _ => {
                return self.reject(
                    join(path, "type"),
                    format!("expected one of: {}", RULE_TYPES.join(", ")),
                )
            }
        };
        let cleaned = self.object(path, value, fields)?;
        if let (Some(floor), Some(ceiling)) = (
            cleaned.get("rep_floor").and_then(Value::as_u64),
            cleaned.get("rep_ceiling").and_then(Value::as_u64),
        ) {
            if floor > ceiling {
                return self.reject(join(path, "rep_ceiling"), "must not be below rep_floor");
            }
        }
        Some(Value::Object(cleaned))
    }

    fn reject(&mut self, path: impl Into<String>, problem: impl Into<String>) -> Option<Value> {
        self.push(path, problem);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SetStatus, SetType, WeightUnit};
    use serde_json::json;

    fn violations(err: Error) -> Vec<FieldViolation> {
        match err {
            Error::Validation { violations, .. } => violations,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    fn fields(err: Error) -> Vec<String> {
        violations(err).into_iter().map(|v| v.field).collect()
    }

    #[test]
    fn test_set_logged_defaults_applied() {
        let payload = validate(
            EventType::SetLogged,
            &json!({"workout_id": "w1", "exercise_id": "bench_press", "weight": 100, "reps": 5}),
        )
        .unwrap();
        match payload {
            EventPayload::SetLogged(set) => {
                assert_eq!(set.weight, 100.0);
                assert_eq!(set.unit, WeightUnit::Kg);
                assert_eq!(set.status, SetStatus::Completed);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_all_violations_reported() {
        let err = validate(
            EventType::SetLogged,
            &json!({"workout_id": "w1", "weight": "heavy", "reps": -3, "unit": "stone"}),
        )
        .unwrap_err();
        let mut f = fields(err);
        f.sort();
        assert_eq!(f, vec!["exercise_id", "reps", "unit", "weight"]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = validate(
            EventType::WorkoutCompleted,
            &json!({"workout_id": "w1", "rating": 5}),
        )
        .unwrap_err();
        let v = violations(err);
        assert_eq!(v, vec![FieldViolation::new("rating", "unknown field")]);
    }

    #[test]
    fn test_non_object_payload() {
        let err = validate(EventType::TemplateDeleted, &json!(["legs"])).unwrap_err();
        assert_eq!(fields(err), vec!["payload"]);
    }

    #[test]
    fn test_null_optional_treated_as_absent() {
        let payload = validate(
            EventType::WorkoutStarted,
            &json!({"name": null, "from_template_id": null}),
        )
        .unwrap();
        match payload {
            EventPayload::WorkoutStarted(started) => {
                assert!(started.name.is_none());
                assert!(!started.workout_id.is_empty());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_nested_paths_in_violations() {
        let err = validate(
            EventType::TemplateCreated,
            &json!({
                "name": "Push",
                "exercises": [
                    {"exercise_id": "bench_press", "target_sets": 3},
                    {"exercise_id": "dip", "set_groups": [
                        {"target_sets": 0, "set_type": "giant"}
                    ]}
                ]
            }),
        )
        .unwrap_err();
        let mut f = fields(err);
        f.sort();
        assert_eq!(
            f,
            vec![
                "exercises[1].set_groups[0].set_type",
                "exercises[1].set_groups[0].target_sets",
            ]
        );
    }

    #[test]
    fn test_template_with_set_groups_parses() {
        let payload = validate(
            EventType::TemplateCreated,
            &json!({
                "template_id": "push",
                "name": "Push",
                "exercises": [{"exercise_id": "bench_press", "set_groups": [
                    {"target_sets": 2, "target_reps": 10, "target_weight": 60, "set_type": "warmup"},
                    {"target_sets": 3, "target_reps": 5, "target_weight": 100}
                ]}]
            }),
        )
        .unwrap();
        match payload {
            EventPayload::TemplateCreated(t) => {
                let exercises = t.exercises.unwrap();
                assert_eq!(exercises[0].set_groups.len(), 2);
                assert_eq!(exercises[0].set_groups[1].set_type, SetType::Working);
                assert_eq!(exercises[0].set_groups[1].rest_seconds, 60);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_rule_contract_checked() {
        let err = validate(
            EventType::TemplateUpdated,
            &json!({"template_id": "t", "default_progression":
                {"type": "double_progression", "rep_floor": 12, "rep_ceiling": 8}}),
        )
        .unwrap_err();
        assert_eq!(fields(err), vec!["default_progression.rep_ceiling"]);

        let err = validate(
            EventType::TemplateUpdated,
            &json!({"template_id": "t", "default_progression": {"type": "wave"}}),
        )
        .unwrap_err();
        assert_eq!(fields(err), vec!["default_progression.type"]);
    }

    #[test]
    fn test_set_modified_requires_a_change() {
        let err = validate(
            EventType::SetModified,
            &json!({"workout_id": "w1", "original_event_id": Uuid::new_v4().to_string()}),
        )
        .unwrap_err();
        assert_eq!(fields(err), vec!["payload"]);

        let err = validate(
            EventType::SetModified,
            &json!({"workout_id": "w1", "original_event_id": "not-a-uuid", "reps": 3}),
        )
        .unwrap_err();
        assert_eq!(fields(err), vec!["original_event_id"]);
    }

    #[test]
    fn test_counts_are_bounded() {
        let err = validate(
            EventType::SetLogged,
            &json!({"workout_id": "w1", "exercise_id": "dip", "weight": 0, "reps": 4294967295u64}),
        )
        .unwrap_err();
        assert_eq!(
            violations(err),
            vec![FieldViolation::new("reps", "must be at most 10000")]
        );

        let err = validate(
            EventType::TemplateCreated,
            &json!({"name": "Legs", "exercises": [{
                "exercise_id": "barbell_squat", "target_sets": 4000000000u64, "target_reps": 5,
                "set_groups": [{"target_sets": 3, "target_reps": 10001, "rest_seconds": 90000}]
            }]}),
        )
        .unwrap_err();
        let mut f = fields(err);
        f.sort();
        assert_eq!(
            f,
            vec![
                "exercises[0].set_groups[0].rest_seconds",
                "exercises[0].set_groups[0].target_reps",
                "exercises[0].target_sets",
            ]
        );
    }

    #[test]
    fn test_identifiers_are_bounded() {
        let long = "bench.press".repeat(30);
        let err = validate(
            EventType::SetLogged,
            &json!({"workout_id": "w1", "exercise_id": long, "weight": 60, "reps": 5}),
        )
        .unwrap_err();
        assert_eq!(fields(err), vec!["exercise_id"]);

        let err = validate(
            EventType::WorkoutStarted,
            &json!({"exercise_ids": ["dip", long]}),
        )
        .unwrap_err();
        assert_eq!(fields(err), vec!["exercise_ids[1]"]);

        let exact = "x".repeat(MAX_ID_BYTES);
        assert!(validate(EventType::TemplateDeleted, &json!({"template_id": exact})).is_ok());
    }
}
