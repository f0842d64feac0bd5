//! Shared fixtures for the HTTP integration tests
//!
//! Every test builds its own server on top of a fresh in-memory store, so
//! tests never share documents.

#![allow(dead_code)]

use axum_test::TestServer;
use indexmap::IndexMap;
use modelrouter::prelude::*;
use std::sync::Arc;

pub const OWNER: &str = "user-owner";
pub const STRANGER: &str = "user-stranger";
pub const ADMIN: &str = "user-admin";

/// Food fields every role except the owner is limited to
const SHARED_FIELDS: [&str; 6] = ["name", "calories", "eatenAt", "ownerId", "categories", "tags"];

pub fn user_model() -> ModelSchema {
    ModelSchema::new("User")
        .field("email", FieldSchema::string().required())
        .field("name", FieldSchema::string())
        .field("password", FieldSchema::string())
}

pub fn food_model() -> ModelSchema {
    let category = IndexMap::from([
        ("name".to_string(), FieldSchema::string()),
        ("show".to_string(), FieldSchema::boolean()),
    ]);
    ModelSchema::new("Food")
        .field("name", FieldSchema::string().required())
        .field("calories", FieldSchema::number())
        .field("eatenAt", FieldSchema::date())
        .field("hidden", FieldSchema::boolean())
        .field("ownerId", FieldSchema::object_id("User"))
        .field("categories", FieldSchema::array(FieldType::Object { fields: category }))
        .field("tags", FieldSchema::array(FieldType::String))
}

pub fn user_config() -> ResourceConfig {
    ResourceConfig::new()
        .permission(Operation::List, vec![Permission::IsAny])
        .permission(Operation::Read, vec![Permission::IsAny])
        .transformer(FieldTransformer::allow_all().role(
            Role::Anonymous,
            FieldAccess::new(FieldSet::only(["email", "name"]), FieldSet::none()),
        ))
}

/// Food as most tests see it
///
/// Anyone lists and reads, identified requesters create, owners (and
/// admins) update and delete. A `preUpdate` hook refuses renames to
/// "Forbidden".
pub fn food_config() -> ResourceConfig {
    ResourceConfig::new()
        .permission(Operation::List, vec![Permission::IsAny])
        .permission(Operation::Read, vec![Permission::IsAny])
        .permission(Operation::Create, vec![Permission::IsAuthenticated])
        .permission(Operation::Update, vec![Permission::IsOwner])
        .permission(Operation::Delete, vec![Permission::IsOwner])
        .query_fields(["name", "eatenAt", "ownerId"])
        .sort(SortSpec::ascending("name"))
        .populate(PopulateSpec::new("ownerId").fields(["email"]))
        .transformer(
            FieldTransformer::allow_all()
                .role(
                    Role::Anonymous,
                    FieldAccess::new(
                        FieldSet::only(SHARED_FIELDS),
                        FieldSet::none(),
                    ),
                )
                .role(
                    Role::Authenticated,
                    FieldAccess::new(
                        FieldSet::only(SHARED_FIELDS),
                        FieldSet::only(SHARED_FIELDS),
                    ),
                )
                .role(Role::Owner, FieldAccess::new(FieldSet::All, FieldSet::All)),
        )
        .hooks(Hooks::new().pre_update(|args| async move {
            if args.body.get("name").and_then(Value::as_str) == Some("Forbidden") {
                return Ok(Some(Value::Null));
            }
            Ok(Some(args.body))
        }))
}

/// Store pre-seeded with the three users
pub async fn seeded_store() -> Arc<dyn DocumentStore> {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    for (id, email) in [
        (OWNER, "owner@example.com"),
        (STRANGER, "stranger@example.com"),
        (ADMIN, "admin@example.com"),
    ] {
        store
            .insert(
                "User",
                json!({"_id": id, "email": email, "name": id, "password": "hunter2"}),
            )
            .await
            .expect("seed user");
    }
    store
}

pub fn builder(store: Arc<dyn DocumentStore>) -> ServerBuilder {
    ServerBuilder::new()
        .with_shared_store(store)
        .with_requester_provider(HeaderRequesterProvider::new())
        .with_title("Food API", "1.0.0")
}

/// Server exposing `/users` and `/food` with the default fixtures
pub async fn food_server() -> TestServer {
    food_server_with(food_config()).await
}

pub async fn food_server_with(config: ResourceConfig) -> TestServer {
    let app = builder(seeded_store().await)
        .register_resource("/users", user_model(), user_config())
        .expect("register users")
        .register_resource("/food", food_model(), config)
        .expect("register food")
        .build()
        .expect("build router");
    TestServer::new(app).expect("start test server")
}

/// Create a Food as `owner` and return its id
pub async fn create_food(server: &TestServer, owner: &str, body: Value) -> String {
    let response = server
        .post("/food")
        .add_header("x-requester-id", owner)
        .json(&body)
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let created: Value = response.json();
    created["data"]["_id"]
        .as_str()
        .expect("created document has an _id")
        .to_string()
}
