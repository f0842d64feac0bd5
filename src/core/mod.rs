//! Core module: the building blocks the generated resources are made of

pub mod auth;
pub mod error;
pub mod extractors;
pub mod hooks;
pub mod model;
pub mod populate;
pub mod query;
pub mod store;
pub mod transform;

pub use auth::{
    HeaderRequesterProvider, NoRequesterProvider, Operation, Permission, Permissions, Requester,
    RequesterProvider, Role,
};
pub use error::{ApiError, ApiResult, ErrorKind, StoreError};
pub use hooks::{Hooks, PostHookArgs, PreHookArgs};
pub use model::{FieldSchema, FieldType, ModelSchema};
pub use populate::PopulateSpec;
pub use query::{SortDirection, SortSpec};
pub use store::{DocumentStore, FindQuery};
pub use transform::{FieldAccess, FieldSet, FieldTransformer};
