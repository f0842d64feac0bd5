//! Array field sub-resources
//!
//! ```text
//! POST   /{id}/{field}          append an entry
//! PATCH  /{id}/{field}/{item}   update the entry addressed by `item`
//! DELETE /{id}/{field}/{item}   remove the entry addressed by `item`
//! ```
//!
//! `item` is the entry `_id` for arrays of objects and the literal value for
//! arrays of scalars. Mutations are read-modify-write on the whole document
//! and go through the update permissions, transformer and hooks.

use crate::core::auth::{Operation, Requester};
use crate::core::error::{ApiError, ApiResult};
use crate::core::extractors::{CurrentRequester, JsonBody};
use crate::core::hooks::{PostHookArgs, PreHookArgs};
use crate::core::model::FieldType;
use crate::core::store::timestamp;
use crate::server::exposure::rest::handlers::DataEnvelope;
use crate::server::resource::ResourceContext;
use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use uuid::Uuid;

/// Address of an array entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayAddress {
    pub document_id: String,
    pub field: String,
    pub item: Option<String>,
}

/// Requested change to the array
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayAction {
    Append(Value),
    Update(Value),
    Remove,
}

/// POST /{id}/{field}
pub async fn append(
    State(ctx): State<Arc<ResourceContext>>,
    CurrentRequester(requester): CurrentRequester,
    Path((document_id, field)): Path<(String, String)>,
    JsonBody(body): JsonBody,
) -> ApiResult<Json<DataEnvelope>> {
    let address = ArrayAddress {
        document_id,
        field,
        item: None,
    };
    mutate(&ctx, requester, address, ArrayAction::Append(body)).await
}

/// PATCH /{id}/{field}/{item}
pub async fn update_entry(
    State(ctx): State<Arc<ResourceContext>>,
    CurrentRequester(requester): CurrentRequester,
    Path((document_id, field, item)): Path<(String, String, String)>,
    JsonBody(body): JsonBody,
) -> ApiResult<Json<DataEnvelope>> {
    let address = ArrayAddress {
        document_id,
        field,
        item: Some(item),
    };
    mutate(&ctx, requester, address, ArrayAction::Update(body)).await
}

/// DELETE /{id}/{field}/{item}
pub async fn remove_entry(
    State(ctx): State<Arc<ResourceContext>>,
    CurrentRequester(requester): CurrentRequester,
    Path((document_id, field, item)): Path<(String, String, String)>,
) -> ApiResult<Json<DataEnvelope>> {
    let address = ArrayAddress {
        document_id,
        field,
        item: Some(item),
    };
    mutate(&ctx, requester, address, ArrayAction::Remove).await
}

/// The body must be exactly `{<field>: value}`
fn entry_from_body(ctx: &ResourceContext, field: &str, body: Value) -> ApiResult<Value> {
    let Value::Object(mut map) = body else {
        return Err(ApiError::invalid_request(format!(
            "{} array operation body must be an object with only the key {field}",
            ctx.name()
        )));
    };
    if map.len() != 1 || !map.contains_key(field) {
        let supplied: Vec<&str> = map.keys().map(String::as_str).collect();
        return Err(ApiError::invalid_request(format!(
            "{} array operation body must only contain the field {field}",
            ctx.name()
        ))
        .with_detail(format!("Got: {}", supplied.join(", "))));
    }
    map.remove(field)
        .ok_or_else(|| ApiError::invalid_request(format!("Missing {field} in body")))
}

/// Position of the addressed entry in the array
fn locate(entries: &[Value], items: &FieldType, key: &str) -> Option<usize> {
    match items {
        FieldType::Object { .. } => entries
            .iter()
            .position(|entry| entry.get("_id").and_then(Value::as_str) == Some(key)),
        scalar => {
            let typed = scalar.coerce(key).ok();
            entries.iter().position(|entry| {
                typed.as_ref() == Some(entry) || entry.as_str() == Some(key)
            })
        }
    }
}

fn single_field(field: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(field.to_string(), value);
    Value::Object(map)
}

/// Stamp a new object entry with an id and timestamps
fn new_object_entry(value: Value) -> ApiResult<Value> {
    let Value::Object(mut map) = value else {
        return Err(ApiError::invalid_request("Array entries of this field must be objects"));
    };
    let now = timestamp();
    if !map.get("_id").is_some_and(Value::is_string) {
        map.insert("_id".into(), json!(Uuid::new_v4().to_string()));
    }
    map.insert("created".into(), json!(now));
    map.insert("updated".into(), json!(now));
    Ok(Value::Object(map))
}

/// Merge changes into an object entry, refreshing only its `updated`
fn merge_object_entry(existing: &Value, changes: Value) -> ApiResult<Value> {
    let Value::Object(changes) = changes else {
        return Err(ApiError::invalid_request("Array entries of this field must be objects"));
    };
    let mut merged: Map<String, Value> = existing.as_object().cloned().unwrap_or_default();
    for (key, value) in changes {
        if matches!(key.as_str(), "_id" | "created" | "updated") {
            continue;
        }
        merged.insert(key, value);
    }
    merged.insert("updated".into(), json!(timestamp()));
    Ok(Value::Object(merged))
}

fn scalar_entry(items: &FieldType, value: Value) -> ApiResult<Value> {
    items
        .coerce_value(&value)
        .map_err(|reason| ApiError::invalid_request("Invalid array entry").with_detail(reason))
}

/// Apply an action to a copy of the array
pub fn apply_action(
    entries: &[Value],
    items: &FieldType,
    address: &ArrayAddress,
    action: ArrayAction,
) -> ApiResult<Vec<Value>> {
    let mut entries = entries.to_vec();
    let is_object = matches!(items, FieldType::Object { .. });

    let position = match (&action, &address.item) {
        (ArrayAction::Append(_), _) => None,
        (_, Some(key)) => Some(locate(&entries, items, key).ok_or_else(|| {
            ApiError::not_found(format!("Could not find {}/{key}", address.field))
        })?),
        (_, None) => {
            return Err(ApiError::invalid_request(format!(
                "An item of {} must be addressed",
                address.field
            )));
        }
    };

    match (action, position) {
        (ArrayAction::Append(value), _) => {
            let entry = if is_object {
                new_object_entry(value)?
            } else {
                scalar_entry(items, value)?
            };
            entries.push(entry);
        }
        (ArrayAction::Update(value), Some(idx)) => {
            entries[idx] = if is_object {
                merge_object_entry(&entries[idx], value)?
            } else {
                scalar_entry(items, value)?
            };
        }
        (ArrayAction::Remove, Some(idx)) => {
            entries.remove(idx);
        }
        (_, None) => {}
    }
    Ok(entries)
}

async fn mutate(
    ctx: &ResourceContext,
    requester: Option<Requester>,
    address: ArrayAddress,
    action: ArrayAction,
) -> ApiResult<Json<DataEnvelope>> {
    let requester = requester.as_ref();
    ctx.authorize(Operation::Update, requester, None)?;

    let Some(items) = ctx.model.array_items(&address.field).cloned() else {
        return Err(ApiError::invalid_request(format!(
            "{} is not an array field of {}",
            address.field,
            ctx.name()
        )));
    };

    // handlers pass the raw request body; unwrap `{field: value}` here
    let action = match action {
        ArrayAction::Append(body) => {
            ArrayAction::Append(entry_from_body(ctx, &address.field, body)?)
        }
        ArrayAction::Update(body) => {
            ArrayAction::Update(entry_from_body(ctx, &address.field, body)?)
        }
        ArrayAction::Remove => ArrayAction::Remove,
    };

    let existing = ctx
        .store
        .get(ctx.name(), &address.document_id)
        .await?
        .filter(|doc| {
            !(ctx.model.has_soft_delete() && doc.get("deleted") == Some(&Value::Bool(true)))
        })
        .ok_or_else(|| {
            ApiError::not_found(format!("Could not find {}/{}", ctx.name(), address.document_id))
        })?;
    ctx.authorize(Operation::Update, requester, Some(&existing))?;

    let role = ctx.role(requester, Some(&existing));
    ctx.config
        .transformer
        .filter_for_write(&single_field(&address.field, json!([])), role)?;

    let current: Vec<Value> = existing
        .get(&address.field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let entries = apply_action(&current, &items, &address, action)?;

    let body = single_field(&address.field, Value::Array(entries));
    let body = ctx
        .config
        .hooks
        .run_pre(
            Operation::Update,
            PreHookArgs {
                body,
                requester: requester.cloned(),
                existing: Some(existing.clone()),
            },
        )
        .await
        .into_result(Operation::Update)?;
    let body = ctx.collapse(&body);

    let updated = ctx
        .store
        .update(ctx.name(), &address.document_id, body.clone())
        .await?;
    let updated = ctx.populate_one(updated).await?;
    tracing::debug!(model = ctx.name(), field = %address.field, "array field mutated");

    // before and after are separate values, never the same document
    ctx.config
        .hooks
        .run_post(
            Operation::Update,
            PostHookArgs {
                result: updated.clone(),
                body,
                requester: requester.cloned(),
                previous: Some(existing),
            },
        )
        .await?;

    let data = ctx.present(requester, &updated);
    let data = ctx.respond(data, requester, Operation::Update).await?;
    Ok(Json(DataEnvelope { data }))
}
