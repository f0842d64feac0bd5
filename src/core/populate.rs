//! Reference population ("expand") and depopulation ("collapse")
//!
//! Both directions rebuild only the nodes along the addressed path and clone
//! everything else, so sibling fields and other expanded paths are left
//! exactly as they were.

use crate::core::error::{ApiError, ApiResult};
use crate::core::model::ModelSchema;
use crate::core::store::DocumentStore;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Which reference to expand and how much of the target to expose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulateSpec {
    /// Dotted path to the reference field; may pass through arrays
    pub path: String,
    /// Sub-fields to expose; everything when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    /// Name of a shared OpenAPI component describing the expanded shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_schema_name: Option<String>,
}

impl PopulateSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fields: None,
            shared_schema_name: None,
        }
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn shared_schema(mut self, name: impl Into<String>) -> Self {
        self.shared_schema_name = Some(name.into());
        self
    }

    /// Restrict a referenced document to the configured fields plus `_id`
    pub fn project(&self, target: &Value) -> Value {
        let (Some(fields), Some(map)) = (&self.fields, target.as_object()) else {
            return target.clone();
        };
        let projected: Map<String, Value> = map
            .iter()
            .filter(|(key, _)| key.as_str() == "_id" || fields.iter().any(|f| f == *key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(projected)
    }
}

/// Rebuild `value` with `leaf` applied to every node addressed by `segments`
fn map_path(value: &Value, segments: &[&str], leaf: &dyn Fn(&Value) -> Value) -> Value {
    match value {
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| map_path(item, segments, leaf)).collect())
        }
        Value::Object(map) => {
            let Some((head, rest)) = segments.split_first() else {
                return value.clone();
            };
            let Some(child) = map.get(*head) else {
                return value.clone();
            };
            let replaced = if rest.is_empty() {
                match child {
                    Value::Array(items) => Value::Array(items.iter().map(leaf).collect()),
                    other => leaf(other),
                }
            } else {
                map_path(child, rest, leaf)
            };
            let mut rebuilt = map.clone();
            rebuilt.insert((*head).to_string(), replaced);
            Value::Object(rebuilt)
        }
        other => other.clone(),
    }
}

/// Collect raw reference ids found at a path
pub fn collect_references(doc: &Value, path: &str) -> Vec<String> {
    fn walk(value: &Value, segments: &[&str], out: &mut Vec<String>) {
        match (value, segments.split_first()) {
            (Value::Array(items), _) => items.iter().for_each(|item| walk(item, segments, out)),
            (Value::String(id), None) => out.push(id.clone()),
            (Value::Object(map), Some((head, rest))) => {
                if let Some(child) = map.get(*head) {
                    walk(child, rest, out);
                }
            }
            _ => {}
        }
    }
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    walk(doc, &segments, &mut out);
    out
}

/// Replace references at `spec.path` with projected documents from `resolved`
///
/// References missing from `resolved` are left as raw ids.
pub fn expand(doc: &Value, spec: &PopulateSpec, resolved: &HashMap<String, Value>) -> Value {
    let segments: Vec<&str> = spec.path.split('.').collect();
    map_path(doc, &segments, &|node| match node {
        Value::String(id) => resolved
            .get(id)
            .map(|target| spec.project(target))
            .unwrap_or_else(|| node.clone()),
        other => other.clone(),
    })
}

/// Turn expanded references at `path` back into raw ids
pub fn collapse(doc: &Value, path: &str) -> Value {
    let segments: Vec<&str> = path.split('.').collect();
    map_path(doc, &segments, &|node| match node.get("_id") {
        Some(Value::String(id)) if node.is_object() => Value::String(id.clone()),
        _ => node.clone(),
    })
}

/// Collapse every configured path; used before persisting a body
pub fn collapse_all(doc: &Value, specs: &[PopulateSpec]) -> Value {
    specs
        .iter()
        .fold(doc.clone(), |acc, spec| collapse(&acc, &spec.path))
}

/// Fetch referenced documents and expand every spec on every document
pub async fn populate(
    store: &dyn DocumentStore,
    model: &ModelSchema,
    specs: &[PopulateSpec],
    docs: Vec<Value>,
) -> ApiResult<Vec<Value>> {
    let mut docs = docs;
    for spec in specs {
        let Some(collection) = model.reference_at_path(&spec.path) else {
            tracing::warn!(
                path = %spec.path,
                model = %model.name,
                "populate path is not a reference"
            );
            continue;
        };
        let ids: IndexSet<String> = docs
            .iter()
            .flat_map(|doc| collect_references(doc, &spec.path))
            .collect();
        if ids.is_empty() {
            continue;
        }
        let ids: Vec<String> = ids.into_iter().collect();
        let resolved: HashMap<String, Value> = store
            .get_many(collection, &ids)
            .await
            .map_err(ApiError::from)?
            .into_iter()
            .filter_map(|target| {
                let id = target.get("_id")?.as_str()?.to_string();
                Some((id, target))
            })
            .collect();
        docs = docs.iter().map(|doc| expand(doc, spec, &resolved)).collect();
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{FieldSchema, FieldType};
    use crate::core::store::DocumentStore;
    use crate::storage::InMemoryDocumentStore;
    use serde_json::json;

    fn users() -> HashMap<String, Value> {
        HashMap::from([
            ("u1".to_string(), json!({"_id": "u1", "name": "Ada", "email": "ada@example.com"})),
            ("u2".to_string(), json!({"_id": "u2", "name": "Bob", "email": "bob@example.com"})),
        ])
    }

    #[test]
    fn test_expand_projects_fields_and_keeps_id() {
        let doc = json!({"_id": "f1", "ownerId": "u1", "name": "Broccoli"});
        let spec = PopulateSpec::new("ownerId").fields(["email"]);
        let out = expand(&doc, &spec, &users());
        assert_eq!(out["ownerId"], json!({"_id": "u1", "email": "ada@example.com"}));
        assert_eq!(out["name"], "Broccoli");
    }

    #[test]
    fn test_expand_without_fields_keeps_whole_target() {
        let doc = json!({"ownerId": "u2"});
        let out = expand(&doc, &PopulateSpec::new("ownerId"), &users());
        assert_eq!(out["ownerId"]["name"], "Bob");
    }

    #[test]
    fn test_expand_through_arrays() {
        let doc = json!({
            "likes": ["u1", "u2", "ghost"],
            "comments": [{"authorId": "u2", "text": "yum"}, {"text": "anon"}],
        });
        let likes = expand(&doc, &PopulateSpec::new("likes").fields(["name"]), &users());
        assert_eq!(likes["likes"][0], json!({"_id": "u1", "name": "Ada"}));
        assert_eq!(likes["likes"][2], json!("ghost"));

        let authors = PopulateSpec::new("comments.authorId").fields(["name"]);
        let comments = expand(&doc, &authors, &users());
        assert_eq!(comments["comments"][0]["authorId"], json!({"_id": "u2", "name": "Bob"}));
        assert_eq!(comments["comments"][0]["text"], "yum");
        assert_eq!(comments["comments"][1], json!({"text": "anon"}));
    }

    #[test]
    fn test_collapse_round_trip_leaves_other_paths_expanded() {
        let doc = json!({"ownerId": "u1", "reviewerId": "u2", "name": "Kale"});
        let owner = PopulateSpec::new("ownerId").fields(["email"]);
        let reviewer = PopulateSpec::new("reviewerId").fields(["name"]);

        let expanded_owner = expand(&doc, &owner, &users());
        let expanded_both = expand(&expanded_owner, &reviewer, &users());
        let collapsed = collapse(&expanded_both, "ownerId");

        assert_eq!(collapsed["ownerId"], doc["ownerId"]);
        assert_eq!(collapsed["reviewerId"], expanded_both["reviewerId"]);
        assert_eq!(collapsed["name"], expanded_both["name"]);
        // the input is never modified
        assert_eq!(expanded_both["ownerId"]["_id"], "u1");
    }

    #[test]
    fn test_collapse_all_restores_raw_document() {
        let doc = json!({"ownerId": "u1", "likes": ["u1", "u2"]});
        let specs = vec![PopulateSpec::new("ownerId"), PopulateSpec::new("likes")];
        let expanded = specs.iter().fold(doc.clone(), |acc, s| expand(&acc, s, &users()));
        assert_eq!(collapse_all(&expanded, &specs), doc);
    }

    #[test]
    fn test_collect_references() {
        let doc = json!({"comments": [{"authorId": "u1"}, {"authorId": "u2"}, {}]});
        assert_eq!(collect_references(&doc, "comments.authorId"), vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_populate_fetches_from_store() {
        let store = InMemoryDocumentStore::new();
        let user = store
            .insert("User", json!({"name": "Ada", "email": "ada@example.com"}))
            .await
            .unwrap();
        let user_id = user["_id"].as_str().unwrap();

        let model = ModelSchema::new("Food")
            .field("ownerId", FieldSchema::object_id("User"))
            .field("tags", FieldSchema::array(FieldType::String));
        let docs = vec![json!({"ownerId": user_id}), json!({"ownerId": "missing"})];
        let specs = vec![
            PopulateSpec::new("ownerId").fields(["email"]),
            PopulateSpec::new("tags"),
        ];

        let out = populate(&store, &model, &specs, docs).await.unwrap();
        assert_eq!(out[0]["ownerId"]["email"], "ada@example.com");
        assert!(out[0]["ownerId"].get("name").is_none());
        assert_eq!(out[1]["ownerId"], "missing");
    }
}
