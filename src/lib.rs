//! # model-router
//!
//! Declarative REST resources for axum: one model description plus one
//! configuration object produce a complete resource.
//!
//! ## Features
//!
//! - **Generated Routes**: list, read, create, update, delete and array field sub-resources
//! - **Permissions**: per-operation predicates (`IsAny`, `IsOwner`, `IsAdmin`, ...)
//! - **Field Visibility**: per-role read/write field sets
//! - **Query Language**: safe filter parameters with `$gt`/`$lte`/... operators, paging and sort
//! - **Population**: expand references to other collections in responses
//! - **Hooks**: async pre/post hooks around create, update and delete
//! - **OpenAPI**: `/openapi.json` reflected from the same configuration, with ETag
//! - **Configuration-Based**: declare resources in YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use modelrouter::prelude::*;
//!
//! let food = ModelSchema::new("Food")
//!     .field("name", FieldSchema::string().required())
//!     .field("calories", FieldSchema::number())
//!     .field("ownerId", FieldSchema::object_id("User"));
//!
//! let config = ResourceConfig::new()
//!     .permission(Operation::List, vec![Permission::IsAny])
//!     .permission(Operation::Create, vec![Permission::IsAuthenticated])
//!     .permission(Operation::Update, vec![Permission::IsOwner, Permission::IsAdmin])
//!     .query_fields(["name", "calories"])
//!     .hooks(Hooks::new().pre_update(|args| async move {
//!         Ok(Some(args.body))
//!     }));
//!
//! ServerBuilder::new()
//!     .with_requester_provider(HeaderRequesterProvider::new())
//!     .register_resource("/food", food, config)?
//!     .serve("127.0.0.1:3000")
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod server;
pub mod storage;

/// Everything an application needs to declare and serve resources
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{
            HeaderRequesterProvider, NoRequesterProvider, Operation, Permission, Permissions,
            Requester, RequesterProvider, Role,
        },
        error::{ApiError, ApiResult, ErrorKind, StoreError},
        extractors::{CurrentRequester, JsonBody},
        hooks::{Hooks, PostHookArgs, PreHookArgs},
        model::{FieldSchema, FieldType, ModelSchema},
        populate::PopulateSpec,
        query::{SortDirection, SortSpec},
        store::{DocumentStore, FindQuery},
        transform::{FieldAccess, FieldSet, FieldTransformer},
    };

    // === Storage ===
    pub use crate::storage::InMemoryDocumentStore;

    // === Config ===
    pub use crate::config::{ConfigError, ResourceDefinition, ResourcesConfig};

    // === Server ===
    pub use crate::server::openapi::{Endpoint, EndpointBuilder};
    pub use crate::server::{
        ResourceConfig, ResourceContext, ResourceRegistry, ResponseArgs, ServerBuilder,
        init_tracing,
    };

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};

    // === Axum ===
    pub use axum::{
        Json, Router,
        extract::{Path, State},
        routing::{delete, get, patch, post},
    };
}
