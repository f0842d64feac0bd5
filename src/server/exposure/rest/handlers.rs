//! Handlers for the five generated verbs

use crate::core::auth::Operation;
use crate::core::error::{ApiError, ApiResult};
use crate::core::extractors::{CurrentRequester, JsonBody};
use crate::core::hooks::{PostHookArgs, PreHookArgs};
use crate::core::query::compile;
use crate::core::store::FindQuery;
use crate::server::resource::ResourceContext;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

/// List response envelope
#[derive(Debug, Serialize)]
pub struct ListEnvelope {
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub more: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

/// Envelope for a single document
#[derive(Debug, Serialize)]
pub struct DataEnvelope {
    pub data: Value,
}

/// GET /
pub async fn list(
    State(ctx): State<Arc<ResourceContext>>,
    CurrentRequester(requester): CurrentRequester,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Json<ListEnvelope>> {
    let requester = requester.as_ref();
    ctx.authorize(Operation::List, requester, None)?;

    let query_fields = ctx.config.query_fields.as_deref().unwrap_or(&[]);
    let compiled = compile(&params, &ctx.model, query_fields, ctx.config.sort.as_ref())?;

    let Some(extra) = ctx.query_filter(requester).await? else {
        tracing::debug!(model = ctx.name(), "query filter forced an empty result");
        let data = ctx.respond(json!([]), requester, Operation::List).await?;
        let is_array = data.is_array();
        return Ok(Json(ListEnvelope {
            data,
            more: is_array.then_some(false),
            total: (is_array && compiled.page.is_some()).then_some(0),
        }));
    };
    let compiled = compiled.and(extra);

    let find = FindQuery {
        filter: compiled.filter.clone(),
        sort: compiled.sort.clone(),
        skip: compiled.skip(),
        limit: Some(compiled.limit + 1),
    };
    let mut docs = ctx.store.find(ctx.name(), &find).await?;
    let more = docs.len() > compiled.limit;
    docs.truncate(compiled.limit);

    let total = match compiled.page {
        Some(_) => Some(ctx.store.count(ctx.name(), &compiled.filter).await?),
        None => None,
    };

    let docs = ctx.populate(docs).await?;
    let data = Value::Array(docs.iter().map(|doc| ctx.present(requester, doc)).collect());
    let data = ctx.respond(data, requester, Operation::List).await?;

    // a handler that reshapes the list drops the pagination fields
    let (more, total) = if data.is_array() { (Some(more), total) } else { (None, None) };
    Ok(Json(ListEnvelope { data, more, total }))
}

/// POST /
pub async fn create(
    State(ctx): State<Arc<ResourceContext>>,
    CurrentRequester(requester): CurrentRequester,
    JsonBody(body): JsonBody,
) -> ApiResult<(StatusCode, Json<DataEnvelope>)> {
    let requester = requester.as_ref();
    ctx.authorize(Operation::Create, requester, None)?;

    let role = ctx.role(requester, Some(&body));
    let body = ctx.config.transformer.filter_for_write(&body, role)?;
    let body = ctx
        .config
        .hooks
        .run_pre(
            Operation::Create,
            PreHookArgs {
                body,
                requester: requester.cloned(),
                existing: None,
            },
        )
        .await
        .into_result(Operation::Create)?;
    let body = ctx.collapse(&body);

    let created = ctx.store.insert(ctx.name(), body.clone()).await?;
    tracing::debug!(model = ctx.name(), id = ?created.get("_id"), "document created");
    let created = ctx.populate_one(created).await?;

    ctx.config
        .hooks
        .run_post(
            Operation::Create,
            PostHookArgs {
                result: created.clone(),
                body,
                requester: requester.cloned(),
                previous: None,
            },
        )
        .await?;

    let data = ctx.present(requester, &created);
    let data = ctx.respond(data, requester, Operation::Create).await?;
    Ok((StatusCode::CREATED, Json(DataEnvelope { data })))
}

/// GET /{id}
pub async fn read(
    State(ctx): State<Arc<ResourceContext>>,
    CurrentRequester(requester): CurrentRequester,
    Path(id): Path<String>,
) -> ApiResult<Json<DataEnvelope>> {
    let requester = requester.as_ref();
    ctx.authorize(Operation::Read, requester, None)?;
    let doc = ctx.load(&id).await?;
    ctx.authorize(Operation::Read, requester, Some(&doc))?;

    let doc = ctx.populate_one(doc).await?;
    let data = ctx.present(requester, &doc);
    let data = ctx.respond(data, requester, Operation::Read).await?;
    Ok(Json(DataEnvelope { data }))
}

/// PATCH /{id}
pub async fn update(
    State(ctx): State<Arc<ResourceContext>>,
    CurrentRequester(requester): CurrentRequester,
    Path(id): Path<String>,
    JsonBody(body): JsonBody,
) -> ApiResult<Json<DataEnvelope>> {
    let requester = requester.as_ref();
    ctx.authorize(Operation::Update, requester, None)?;
    let existing = ctx.load(&id).await?;
    ctx.authorize(Operation::Update, requester, Some(&existing))?;

    let role = ctx.role(requester, Some(&existing));
    let body = ctx.config.transformer.filter_for_write(&body, role)?;
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

    let updated = ctx.store.update(ctx.name(), &id, body.clone()).await?;
    let updated = ctx.populate_one(updated).await?;

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

/// DELETE /{id}
pub async fn remove(
    State(ctx): State<Arc<ResourceContext>>,
    CurrentRequester(requester): CurrentRequester,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let requester = requester.as_ref();
    ctx.authorize(Operation::Delete, requester, None)?;
    let existing = ctx.load(&id).await?;
    ctx.authorize(Operation::Delete, requester, Some(&existing))?;

    ctx.config
        .hooks
        .run_pre(
            Operation::Delete,
            PreHookArgs {
                body: existing.clone(),
                requester: requester.cloned(),
                existing: Some(existing.clone()),
            },
        )
        .await
        .into_result(Operation::Delete)?;

    if ctx.model.has_soft_delete() {
        ctx.store
            .update(ctx.name(), &id, json!({"deleted": true}))
            .await?;
    } else {
        ctx.store.delete(ctx.name(), &id).await?;
    }
    tracing::debug!(model = ctx.name(), %id, "document deleted");

    ctx.config
        .hooks
        .run_post(
            Operation::Delete,
            PostHookArgs {
                result: existing.clone(),
                body: Value::Null,
                requester: requester.cloned(),
                previous: Some(existing),
            },
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Fallback for verbs the resource does not serve
pub async fn unsupported_verb(method: Method) -> ApiError {
    ApiError::server_fault(format!("{method} is not supported.")).without_tracking()
}
