//! Data model description for a resource
//!
//! A [`ModelSchema`] lists the fields of one collection with their types. The
//! same description drives query value coercion, store validation, population
//! targets and the OpenAPI schemas.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields maintained by the store rather than by clients
pub const SYSTEM_FIELDS: [&str; 4] = ["_id", "id", "created", "updated"];

/// Name of the optional soft-delete flag
pub const SOFT_DELETE_FIELD: &str = "deleted";

/// Type of a model field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    /// Reference to a document of another collection
    ObjectId {
        #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
    },
    Array {
        items: Box<FieldType>,
    },
    Object {
        #[serde(default)]
        fields: IndexMap<String, FieldSchema>,
    },
    Mixed,
}

impl FieldType {
    /// Types supporting `$gt`/`$gte`/`$lt`/`$lte`
    pub fn is_ordered(&self) -> bool {
        matches!(self, FieldType::Number | FieldType::Date)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::ObjectId { .. } => "objectid",
            FieldType::Array { .. } => "array",
            FieldType::Object { .. } => "object",
            FieldType::Mixed => "mixed",
        }
    }

    /// Element type for arrays, the type itself otherwise
    pub fn element(&self) -> &FieldType {
        match self {
            FieldType::Array { items } => items.element(),
            other => other,
        }
    }

    /// Collection referenced by this field, looking through arrays
    pub fn reference(&self) -> Option<&str> {
        match self.element() {
            FieldType::ObjectId { reference } => reference.as_deref(),
            _ => None,
        }
    }

    /// Convert a raw query string value into a typed JSON value
    pub fn coerce(&self, raw: &str) -> Result<Value, String> {
        match self {
            FieldType::String | FieldType::ObjectId { .. } => Ok(Value::String(raw.to_string())),
            FieldType::Number => {
                if let Ok(int) = raw.parse::<i64>() {
                    return Ok(Value::from(int));
                }
                raw.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| format!("'{raw}' is not a number"))
            }
            FieldType::Boolean => match raw {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("'{raw}' is not a boolean")),
            },
            FieldType::Date => parse_date(raw)
                .map(|d| Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)))
                .ok_or_else(|| format!("'{raw}' is not a date")),
            FieldType::Array { items } => items.coerce(raw),
            FieldType::Object { .. } | FieldType::Mixed => {
                Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
            }
        }
    }

    /// Coerce a JSON value that may still be a string (query operator objects)
    pub fn coerce_value(&self, value: &Value) -> Result<Value, String> {
        match value {
            Value::String(raw) => self.coerce(raw),
            other if self.accepts(other) => Ok(other.clone()),
            other => Err(format!("{other} is not a valid {}", self.name())),
        }
    }

    /// Shallow type check of a non-null value
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Date => value.as_str().is_some_and(|s| parse_date(s).is_some()),
            FieldType::ObjectId { .. } => value.is_string(),
            FieldType::Array { .. } => value.is_array(),
            FieldType::Object { .. } => value.is_object(),
            FieldType::Mixed => true,
        }
    }

    fn validate(&self, path: &str, value: &Value, errors: &mut Vec<String>) {
        if value.is_null() {
            return;
        }
        if !self.accepts(value) {
            errors.push(format!("{path} must be of type {}", self.name()));
            return;
        }
        match (self, value) {
            (FieldType::Array { items }, Value::Array(values)) => {
                for (idx, item) in values.iter().enumerate() {
                    items.validate(&format!("{path}.{idx}"), item, errors);
                }
            }
            (FieldType::Object { fields }, Value::Object(_)) if !fields.is_empty() => {
                validate_fields(fields, Some(path), value, false, errors);
            }
            _ => {}
        }
    }
}

/// Parse RFC 3339 timestamps and plain `YYYY-MM-DD` dates
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// A field with its type and constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(flatten)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl FieldSchema {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            description: None,
            enum_values: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn date() -> Self {
        Self::new(FieldType::Date)
    }

    pub fn object_id(reference: impl Into<String>) -> Self {
        Self::new(FieldType::ObjectId {
            reference: Some(reference.into()),
        })
    }

    pub fn array(items: FieldType) -> Self {
        Self::new(FieldType::Array {
            items: Box::new(items),
        })
    }

    pub fn object(fields: IndexMap<String, FieldSchema>) -> Self {
        Self::new(FieldType::Object { fields })
    }

    pub fn mixed() -> Self {
        Self::new(FieldType::Mixed)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// Description of one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    pub fields: IndexMap<String, FieldSchema>,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Add a field (builder style)
    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.insert(name.into(), schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    /// Resolve a dotted path, descending through arrays and nested objects
    pub fn field_at_path(&self, path: &str) -> Option<&FieldType> {
        let mut segments = path.split('.');
        let mut current = &self.fields.get(segments.next()?)?.field_type;
        for segment in segments {
            current = match current.element() {
                FieldType::Object { fields } => &fields.get(segment)?.field_type,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Referenced collection at a dotted path
    pub fn reference_at_path(&self, path: &str) -> Option<&str> {
        self.field_at_path(path)?.reference()
    }

    /// Item type of a top-level array field
    pub fn array_items(&self, name: &str) -> Option<&FieldType> {
        match &self.fields.get(name)?.field_type {
            FieldType::Array { items } => Some(items),
            _ => None,
        }
    }

    pub fn array_fields(&self) -> impl Iterator<Item = (&String, &FieldType)> {
        self.fields.iter().filter_map(|(name, f)| match &f.field_type {
            FieldType::Array { items } => Some((name, items.as_ref())),
            _ => None,
        })
    }

    /// Whether deletes mark documents instead of removing them
    pub fn has_soft_delete(&self) -> bool {
        self.fields
            .get(SOFT_DELETE_FIELD)
            .is_some_and(|f| f.field_type == FieldType::Boolean)
    }

    /// Validate a document, or a patch when `partial` is set
    pub fn validate(&self, doc: &Value, partial: bool) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if doc.is_object() {
            validate_fields(&self.fields, None, doc, partial, &mut errors);
        } else {
            errors.push(format!("{} document must be a JSON object", self.name));
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

fn validate_fields(
    fields: &IndexMap<String, FieldSchema>,
    prefix: Option<&str>,
    doc: &Value,
    partial: bool,
    errors: &mut Vec<String>,
) {
    let Some(map) = doc.as_object() else {
        return;
    };
    let qualify = |name: &str| match prefix {
        Some(p) => format!("{p}.{name}"),
        None => name.to_string(),
    };

    for key in map.keys() {
        if !fields.contains_key(key) && !SYSTEM_FIELDS.contains(&key.as_str()) {
            errors.push(format!("{} is not a field", qualify(key)));
        }
    }

    for (name, schema) in fields {
        let path = qualify(name);
        match map.get(name) {
            None | Some(Value::Null) => {
                if schema.required && !partial {
                    errors.push(format!("{path} is required"));
                } else if schema.required && map.contains_key(name) {
                    errors.push(format!("{path} cannot be null"));
                }
            }
            Some(value) => {
                schema.field_type.validate(&path, value, errors);
                if let (Some(allowed), Some(s)) = (&schema.enum_values, value.as_str()) {
                    if !allowed.iter().any(|a| a == s) {
                        errors.push(format!("{path} must be one of: {}", allowed.join(", ")));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn food() -> ModelSchema {
        let category = IndexMap::from([
            ("name".to_string(), FieldSchema::string().required()),
            ("show".to_string(), FieldSchema::boolean()),
        ]);
        ModelSchema::new("Food")
            .field("name", FieldSchema::string().required())
            .field("calories", FieldSchema::number())
            .field("eatenAt", FieldSchema::date())
            .field("ownerId", FieldSchema::object_id("User"))
            .field("source", FieldSchema::object(IndexMap::from([(
                "authorId".to_string(),
                FieldSchema::object_id("User"),
            )])))
            .field("categories", FieldSchema::array(FieldType::Object { fields: category }))
            .field("tags", FieldSchema::array(FieldType::String))
            .field(
                "likes",
                FieldSchema::array(FieldType::ObjectId { reference: Some("User".into()) }),
            )
            .field("deleted", FieldSchema::boolean())
    }

    #[test]
    fn test_field_at_path_descends_through_objects_and_arrays() {
        let model = food();
        assert_eq!(model.field_at_path("calories"), Some(&FieldType::Number));
        assert_eq!(model.field_at_path("categories.show"), Some(&FieldType::Boolean));
        assert_eq!(model.reference_at_path("source.authorId"), Some("User"));
        assert_eq!(model.reference_at_path("likes"), Some("User"));
        assert!(model.field_at_path("categories.missing").is_none());
        assert!(model.field_at_path("name.first").is_none());
    }

    #[test]
    fn test_coerce_by_type() {
        assert_eq!(FieldType::Number.coerce("15").unwrap(), json!(15));
        assert_eq!(FieldType::Number.coerce("1.5").unwrap(), json!(1.5));
        assert!(FieldType::Number.coerce("many").is_err());
        assert_eq!(FieldType::Boolean.coerce("false").unwrap(), json!(false));
        assert_eq!(
            FieldType::Date.coerce("2024-01-02").unwrap(),
            json!("2024-01-02T00:00:00.000Z")
        );
        assert_eq!(FieldType::String.coerce("15").unwrap(), json!("15"));
    }

    #[test]
    fn test_ordered_types() {
        assert!(FieldType::Number.is_ordered());
        assert!(FieldType::Date.is_ordered());
        assert!(!FieldType::String.is_ordered());
        assert!(!FieldType::Boolean.is_ordered());
    }

    #[test]
    fn test_validate_reports_all_problems() {
        let errors = food()
            .validate(&json!({"calories": "lots", "color": "green"}), false)
            .unwrap_err();
        assert!(errors.contains(&"color is not a field".to_string()));
        assert!(errors.contains(&"calories must be of type number".to_string()));
        assert!(errors.contains(&"name is required".to_string()));
    }

    #[test]
    fn test_validate_partial_skips_required() {
        assert!(food().validate(&json!({"calories": 10}), true).is_ok());
        assert!(food().validate(&json!({"name": null}), true).is_err());
    }

    #[test]
    fn test_validate_array_entries_allow_system_fields() {
        let doc = json!({
            "name": "Broccoli",
            "categories": [{"_id": "c1", "name": "Veg", "created": "2024-01-01T00:00:00Z"}],
        });
        assert!(food().validate(&doc, false).is_ok());

        let doc = json!({"name": "Broccoli", "categories": [{"show": "yes"}]});
        let errors = food().validate(&doc, false).unwrap_err();
        assert!(errors.contains(&"categories.0.name is required".to_string()));
        assert!(errors.contains(&"categories.0.show must be of type boolean".to_string()));
    }

    #[test]
    fn test_soft_delete_and_array_fields() {
        let model = food();
        assert!(model.has_soft_delete());
        let arrays: Vec<_> = model.array_fields().map(|(n, _)| n.as_str()).collect();
        assert_eq!(arrays, vec!["categories", "tags", "likes"]);
        assert!(!ModelSchema::new("User").has_soft_delete());
    }

    #[test]
    fn test_field_schema_from_yaml() {
        let yaml = r#"
type: array
items:
  type: objectid
  ref: User
required: true
"#;
        let field: FieldSchema = serde_yaml::from_str(yaml).unwrap();
        assert!(field.required);
        assert_eq!(field.field_type.reference(), Some("User"));
    }
}
