//! OpenAPI reflection of the registered resources
//!
//! The document is derived from the same [`ResourceConfig`] that drives the
//! handlers: only enabled operations get paths, and the documented fields are
//! the broadest set any role may read or write.
//!
//! [`ResourceConfig`]: crate::server::resource::ResourceConfig

pub mod document;
pub mod endpoint;
pub mod schema;

pub use document::{SchemaDocument, serve_document};
pub use endpoint::{Endpoint, EndpointBuilder, data_envelope, error_schema};
pub use schema::{ModelIndex, SchemaReflector};

use crate::core::auth::Operation;
use crate::core::model::FieldSchema;
use crate::server::resource::ResourceContext;
use indexmap::IndexMap;
use std::sync::Arc;
use utoipa::openapi::schema::{ArrayBuilder, ComponentsBuilder, ObjectBuilder, Schema, Type};
use utoipa::openapi::{InfoBuilder, OpenApi, OpenApiBuilder, Paths, Ref, RefOr};

fn schema_ref(name: &str) -> RefOr<Schema> {
    Ref::from_schema_name(name).into()
}

/// Component name of the request body schema of a model
pub fn input_schema_name(model: &str) -> String {
    format!("{model}Input")
}

/// Describe every enabled endpoint of a resource
pub fn resource_endpoints(ctx: &ResourceContext) -> Vec<Endpoint> {
    let name = ctx.name();
    let permissions = &ctx.config.permissions;
    let collection = ctx.path.clone();
    let item = format!("{collection}/{{id}}");
    let read = || schema_ref(name);
    let input = || schema_ref(&input_schema_name(name));
    let mut endpoints = Vec::new();

    if permissions.is_enabled(Operation::List) {
        let list = ObjectBuilder::new()
            .schema_type(Type::Object)
            .property("data", ArrayBuilder::new().items(read()))
            .property("more", ObjectBuilder::new().schema_type(Type::Boolean))
            .property(
                "total",
                ObjectBuilder::new()
                    .schema_type(Type::Integer)
                    .description(Some("Only reported when page is set")),
            )
            .required("data");
        let query_fields = ctx.config.query_fields.as_deref().unwrap_or(&[]);
        endpoints.push(
            EndpointBuilder::get(&collection)
                .tag(name)
                .operation_id(format!("list{name}"))
                .summary(format!("List {name}"))
                .parameters(schema::list_parameters(&ctx.model, query_fields))
                .response(200, "Matching documents", Some(list.into()))
                .build(),
        );
    }
    if permissions.is_enabled(Operation::Create) {
        endpoints.push(
            EndpointBuilder::post(&collection)
                .tag(name)
                .operation_id(format!("create{name}"))
                .summary(format!("Create {name}"))
                .body(input())
                .response(201, "Created document", Some(data_envelope(read()).into()))
                .build(),
        );
    }
    if permissions.is_enabled(Operation::Read) {
        endpoints.push(
            EndpointBuilder::get(&item)
                .tag(name)
                .operation_id(format!("get{name}"))
                .summary(format!("Get {name}"))
                .path_param("id", "Document id")
                .response(200, "The document", Some(data_envelope(read()).into()))
                .build(),
        );
    }
    if permissions.is_enabled(Operation::Update) {
        endpoints.push(
            EndpointBuilder::patch(&item)
                .tag(name)
                .operation_id(format!("update{name}"))
                .summary(format!("Update {name}"))
                .path_param("id", "Document id")
                .body(input())
                .response(200, "Updated document", Some(data_envelope(read()).into()))
                .build(),
        );
        endpoints.extend(array_endpoints(ctx, &item));
    }
    if permissions.is_enabled(Operation::Delete) {
        endpoints.push(
            EndpointBuilder::delete(&item)
                .tag(name)
                .operation_id(format!("delete{name}"))
                .summary(format!("Delete {name}"))
                .path_param("id", "Document id")
                .response(204, "Deleted", None)
                .build(),
        );
    }
    endpoints
}

fn array_endpoints(ctx: &ResourceContext, item: &str) -> Vec<Endpoint> {
    let name = ctx.name();
    let models = ModelIndex::new();
    let reflector = SchemaReflector::raw(&models);
    let write = ctx.config.transformer.broadest().write;

    ctx.model
        .array_fields()
        .filter(|(field, _)| write.contains(field))
        .flat_map(|(field, items)| {
            let entry = reflector.field(field, &FieldSchema::new(items.clone()));
            let body = || {
                ObjectBuilder::new()
                    .schema_type(Type::Object)
                    .property(field, entry.clone())
                    .required(field)
            };
            let response =
                || -> Option<RefOr<Schema>> { Some(data_envelope(schema_ref(name)).into()) };
            let base = format!("{item}/{field}");
            let entry_path = format!("{base}/{{itemId}}");
            let entry_param = "Entry _id, or the value itself for arrays of scalars";
            [
                EndpointBuilder::post(&base)
                    .tag(name)
                    .summary(format!("Append to {field}"))
                    .path_param("id", "Document id")
                    .body(body())
                    .response(200, "Updated document", response())
                    .build(),
                EndpointBuilder::patch(&entry_path)
                    .tag(name)
                    .summary(format!("Update an entry of {field}"))
                    .path_param("id", "Document id")
                    .path_param("itemId", entry_param)
                    .body(body())
                    .response(200, "Updated document", response())
                    .build(),
                EndpointBuilder::delete(&entry_path)
                    .tag(name)
                    .summary(format!("Remove an entry of {field}"))
                    .path_param("id", "Document id")
                    .path_param("itemId", entry_param)
                    .response(200, "Updated document", response())
                    .build(),
            ]
        })
        .collect()
}

/// Component schemas contributed by one resource
pub fn resource_schemas(
    ctx: &ResourceContext,
    models: &ModelIndex,
) -> Vec<(String, RefOr<Schema>)> {
    let access = ctx.config.transformer.broadest();
    let reflector = SchemaReflector::new(&ctx.config.populate, models);
    let mut schemas = vec![
        (
            ctx.name().to_string(),
            reflector
                .model(&ctx.model, &access.read, &ctx.config.extra_schema_properties, true)
                .into(),
        ),
        (
            input_schema_name(ctx.name()),
            SchemaReflector::raw(models)
                .model(&ctx.model, &access.write, &IndexMap::new(), false)
                .into(),
        ),
    ];
    for spec in &ctx.config.populate {
        if let Some(shared) = &spec.shared_schema_name {
            let reference = ctx.model.reference_at_path(&spec.path);
            schemas.push((shared.clone(), reflector.expanded_shape(spec, reference).into()));
        }
    }
    schemas
}

/// Assemble the full document
pub fn build_document(
    title: &str,
    version: &str,
    resources: &[Arc<ResourceContext>],
    extra_endpoints: &[Endpoint],
) -> OpenApi {
    let models: ModelIndex = resources
        .iter()
        .map(|ctx| (ctx.name().to_string(), ctx.model.clone()))
        .collect();

    let mut paths = Paths::new();
    let endpoints = resources
        .iter()
        .flat_map(|ctx| resource_endpoints(ctx))
        .chain(extra_endpoints.iter().cloned());
    for endpoint in endpoints {
        paths.add_path_operation(&endpoint.path, vec![endpoint.method], endpoint.operation);
    }

    let components = resources
        .iter()
        .flat_map(|ctx| resource_schemas(ctx, &models))
        .fold(
            ComponentsBuilder::new().schema(endpoint::ERROR_SCHEMA, error_schema()),
            |components, (name, schema)| components.schema(name, schema),
        );

    OpenApiBuilder::new()
        .info(InfoBuilder::new().title(title).version(version))
        .paths(paths)
        .components(Some(components.build()))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::{Permission, Role};
    use crate::core::model::{FieldType, ModelSchema};
    use crate::core::populate::PopulateSpec;
    use crate::core::transform::{FieldAccess, FieldSet, FieldTransformer};
    use crate::server::resource::ResourceConfig;
    use crate::storage::InMemoryDocumentStore;
    use serde_json::Value;

    fn food(config: ResourceConfig) -> Arc<ResourceContext> {
        let model = ModelSchema::new("Food")
            .field("name", FieldSchema::string().required())
            .field("calories", FieldSchema::number())
            .field("secret", FieldSchema::string())
            .field("ownerId", FieldSchema::object_id("User"))
            .field("tags", FieldSchema::array(FieldType::String));
        Arc::new(ResourceContext::new(
            "/food",
            model,
            config,
            Arc::new(InMemoryDocumentStore::new()),
        ))
    }

    fn user() -> Arc<ResourceContext> {
        let model = ModelSchema::new("User").field("email", FieldSchema::string());
        Arc::new(ResourceContext::new(
            "/users",
            model,
            ResourceConfig::new(),
            Arc::new(InMemoryDocumentStore::new()),
        ))
    }

    fn document(resources: &[Arc<ResourceContext>]) -> Value {
        serde_json::to_value(build_document("Test", "1.0.0", resources, &[])).unwrap()
    }

    #[test]
    fn test_only_enabled_operations_are_documented() {
        let config = ResourceConfig::new()
            .permission(Operation::List, vec![Permission::IsAny])
            .permission(Operation::Read, vec![Permission::IsAny]);
        let doc = document(&[food(config)]);

        assert!(doc["paths"]["/food"].get("get").is_some());
        assert!(doc["paths"]["/food"].get("post").is_none());
        assert!(doc["paths"]["/food/{id}"].get("get").is_some());
        assert!(doc["paths"]["/food/{id}"].get("patch").is_none());
        assert!(doc["paths"].get("/food/{id}/tags").is_none());
    }

    #[test]
    fn test_array_endpoints_follow_update() {
        let config = ResourceConfig::new().permission(Operation::Update, vec![Permission::IsAny]);
        let doc = document(&[food(config)]);
        assert!(doc["paths"]["/food/{id}/tags"].get("post").is_some());
        assert!(doc["paths"]["/food/{id}/tags/{itemId}"].get("patch").is_some());
        assert!(doc["paths"]["/food/{id}/tags/{itemId}"].get("delete").is_some());
    }

    #[test]
    fn test_schemas_follow_broadest_access() {
        let transformer = FieldTransformer::allow_all()
            .role(
                Role::Anonymous,
                FieldAccess::new(FieldSet::only(["name"]), FieldSet::none()),
            )
            .role(
                Role::Admin,
                FieldAccess::new(
                    FieldSet::only(["name", "calories"]),
                    FieldSet::only(["calories"]),
                ),
            );
        let config = ResourceConfig::new()
            .permission(Operation::Create, vec![Permission::IsAny])
            .transformer(transformer);
        let doc = document(&[food(config)]);

        let read = &doc["components"]["schemas"]["Food"]["properties"];
        assert!(read.get("calories").is_some());
        assert!(read.get("secret").is_none());
        let write = &doc["components"]["schemas"]["FoodInput"]["properties"];
        assert!(write.get("calories").is_some());
        assert!(write.get("name").is_none());
        assert!(doc["components"]["schemas"].get("Error").is_some());
    }

    #[test]
    fn test_shared_populate_schema_is_registered() {
        let config = ResourceConfig::new()
            .permission(Operation::Read, vec![Permission::IsAny])
            .populate(PopulateSpec::new("ownerId").fields(["email"]).shared_schema("PublicUser"));
        let doc = document(&[food(config), user()]);
        let shared = &doc["components"]["schemas"]["PublicUser"];
        assert_eq!(shared["properties"]["email"]["type"], "string");
    }
}
