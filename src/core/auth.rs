//! Permission evaluation for generated resources
//!
//! Provides:
//! - The requester identity attached to each request
//! - Built-in and custom permission predicates (OR semantics)
//! - Role resolution (anonymous / authenticated / owner / admin)
//! - A pluggable provider that turns request headers into a requester

use crate::core::error::{ApiError, ApiResult};
use anyhow::Result;
use async_trait::async_trait;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Default name of the field holding a document's owner id
pub const DEFAULT_OWNER_FIELD: &str = "ownerId";

/// Caller identity attached to a request
///
/// Absence of a requester means the call is anonymous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: String,
    #[serde(default)]
    pub admin: bool,
}

impl Requester {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            admin: false,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            admin: true,
        }
    }
}

/// Operations a generated resource exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    List,
    Read,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::List,
        Operation::Read,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];

    /// HTTP verb serving this operation
    pub fn method(&self) -> &'static str {
        match self {
            Operation::List | Operation::Read => "GET",
            Operation::Create => "POST",
            Operation::Update => "PATCH",
            Operation::Delete => "DELETE",
        }
    }

    /// Capitalised name used in messages ("Create not allowed")
    pub fn label(&self) -> &'static str {
        match self {
            Operation::List => "List",
            Operation::Read => "Read",
            Operation::Create => "Create",
            Operation::Update => "Update",
            Operation::Delete => "Delete",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Operation::List | Operation::Read)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Signature of a custom permission predicate
pub type PermissionFn =
    Arc<dyn Fn(Operation, Option<&Requester>, Option<&Value>) -> bool + Send + Sync>;

/// A single permission predicate
#[derive(Clone)]
pub enum Permission {
    /// Anyone, including anonymous callers
    IsAny,

    /// Any identified requester
    IsAuthenticated,

    /// Admin requesters only
    IsAdmin,

    /// The object's owner, or an admin
    IsOwner,

    /// Anyone may list/read, identified requesters may do the rest
    IsAuthenticatedOrReadOnly,

    /// Anyone may list/read, only the owner (or an admin) may do the rest
    IsOwnerOrReadOnly,

    /// User supplied predicate
    Custom(PermissionFn),
}

impl fmt::Debug for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::IsAny => f.write_str("IsAny"),
            Permission::IsAuthenticated => f.write_str("IsAuthenticated"),
            Permission::IsAdmin => f.write_str("IsAdmin"),
            Permission::IsOwner => f.write_str("IsOwner"),
            Permission::IsAuthenticatedOrReadOnly => f.write_str("IsAuthenticatedOrReadOnly"),
            Permission::IsOwnerOrReadOnly => f.write_str("IsOwnerOrReadOnly"),
            Permission::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Permission {
    /// Wrap a closure as a custom predicate
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(Operation, Option<&Requester>, Option<&Value>) -> bool + Send + Sync + 'static,
    {
        Permission::Custom(Arc::new(f))
    }

    /// Evaluate this predicate
    ///
    /// `object` is absent on the first, request-only pass. Owner checks let
    /// identified requesters through that pass so the object-scoped re-check
    /// decides.
    pub fn check(
        &self,
        operation: Operation,
        requester: Option<&Requester>,
        object: Option<&Value>,
        owner_field: &str,
    ) -> bool {
        match self {
            Permission::IsAny => true,

            Permission::IsAuthenticated => requester.is_some(),

            Permission::IsAdmin => requester.is_some_and(|r| r.admin),

            Permission::IsOwner => match (requester, object) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(r), Some(obj)) => is_owner(r, obj, owner_field),
            },

            Permission::IsAuthenticatedOrReadOnly => {
                operation.is_read_only() || requester.is_some()
            }

            Permission::IsOwnerOrReadOnly => {
                operation.is_read_only()
                    || Permission::IsOwner.check(operation, requester, object, owner_field)
            }

            Permission::Custom(f) => f(operation, requester, object),
        }
    }

    /// Parse a permission from its configuration name
    pub fn parse_permission(s: &str) -> Option<Self> {
        let permission = match s {
            "IsAny" | "is_any" | "any" => Permission::IsAny,
            "IsAuthenticated" | "is_authenticated" | "authenticated" => Permission::IsAuthenticated,
            "IsAdmin" | "is_admin" | "admin" => Permission::IsAdmin,
            "IsOwner" | "is_owner" | "owner" => Permission::IsOwner,
            "IsAuthenticatedOrReadOnly" | "is_authenticated_or_read_only" => {
                Permission::IsAuthenticatedOrReadOnly
            }
            "IsOwnerOrReadOnly" | "is_owner_or_read_only" => Permission::IsOwnerOrReadOnly,
            _ => return None,
        };
        Some(permission)
    }
}

/// Extract the owner id from an object, accepting a populated `{_id}` form
pub fn owner_id<'a>(object: &'a Value, owner_field: &str) -> Option<&'a str> {
    match object.get(owner_field)? {
        Value::String(id) => Some(id),
        Value::Object(populated) => populated
            .get("_id")
            .or_else(|| populated.get("id"))
            .and_then(Value::as_str),
        _ => None,
    }
}

/// True when the requester is an admin or owns the object
pub fn is_owner(requester: &Requester, object: &Value, owner_field: &str) -> bool {
    requester.admin || owner_id(object, owner_field) == Some(requester.id.as_str())
}

/// Per-operation permission lists for one resource
///
/// An operation without a list (or with an empty one) is disabled.
#[derive(Debug, Clone, Default)]
pub struct Permissions {
    rules: HashMap<Operation, Vec<Permission>>,
}

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the predicate list for an operation
    pub fn allow(mut self, operation: Operation, permissions: Vec<Permission>) -> Self {
        self.rules.insert(operation, permissions);
        self
    }

    /// Same predicate list for every operation
    pub fn all(permissions: Vec<Permission>) -> Self {
        Operation::ALL
            .into_iter()
            .fold(Self::new(), |acc, op| acc.allow(op, permissions.clone()))
    }

    pub fn is_enabled(&self, operation: Operation) -> bool {
        self.rules.get(&operation).is_some_and(|list| !list.is_empty())
    }

    /// OR over the configured predicates; false when the operation is disabled
    pub fn evaluate(
        &self,
        operation: Operation,
        requester: Option<&Requester>,
        object: Option<&Value>,
        owner_field: &str,
    ) -> bool {
        self.rules.get(&operation).is_some_and(|list| {
            list.iter()
                .any(|p| p.check(operation, requester, object, owner_field))
        })
    }

    /// Evaluate and translate a refusal into 405 (disabled) or 403 (denied)
    pub fn authorize(
        &self,
        operation: Operation,
        requester: Option<&Requester>,
        object: Option<&Value>,
        owner_field: &str,
        model_name: &str,
    ) -> ApiResult<()> {
        let method = operation.method();
        if !self.is_enabled(operation) {
            return Err(ApiError::method_disabled(format!(
                "Access to {method} not supported"
            )));
        }
        if !self.evaluate(operation, requester, object, owner_field) {
            tracing::debug!(%operation, model = model_name, "permission denied");
            return Err(ApiError::not_allowed(format!(
                "Access to {method} on {model_name} not allowed"
            )));
        }
        Ok(())
    }
}

/// Requester role, most privileged match wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Anonymous,
    Authenticated,
    Owner,
    Admin,
}

impl Role {
    pub fn resolve(
        requester: Option<&Requester>,
        object: Option<&Value>,
        owner_field: &str,
    ) -> Role {
        let owns = |r: &Requester| {
            object.is_some_and(|obj| owner_id(obj, owner_field) == Some(r.id.as_str()))
        };
        match requester {
            None => Role::Anonymous,
            Some(r) if r.admin => Role::Admin,
            Some(r) if owns(r) => Role::Owner,
            Some(_) => Role::Authenticated,
        }
    }

    /// Short name used in field permission messages
    pub fn label(&self) -> &'static str {
        match self {
            Role::Anonymous => "anon",
            Role::Authenticated => "auth",
            Role::Owner => "owner",
            Role::Admin => "admin",
        }
    }
}

/// Resolves the requester of an incoming request
///
/// Implementations sit at the edge of the HTTP layer (session lookup, token
/// verification, ...). Returning `Ok(None)` means anonymous; an error rejects
/// the request with 401.
#[async_trait]
pub trait RequesterProvider: Send + Sync {
    async fn resolve(&self, parts: &Parts) -> Result<Option<Requester>>;

    fn name(&self) -> &str;
}

/// Treats every request as anonymous
pub struct NoRequesterProvider;

#[async_trait]
impl RequesterProvider for NoRequesterProvider {
    async fn resolve(&self, _parts: &Parts) -> Result<Option<Requester>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Reads the requester from trusted headers set by an upstream gateway
///
/// `x-requester-id` carries the id, `x-requester-admin: true` marks admins.
pub struct HeaderRequesterProvider {
    id_header: String,
    admin_header: String,
}

impl HeaderRequesterProvider {
    pub fn new() -> Self {
        Self {
            id_header: "x-requester-id".to_string(),
            admin_header: "x-requester-admin".to_string(),
        }
    }

    pub fn with_headers(id_header: impl Into<String>, admin_header: impl Into<String>) -> Self {
        Self {
            id_header: id_header.into(),
            admin_header: admin_header.into(),
        }
    }
}

impl Default for HeaderRequesterProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequesterProvider for HeaderRequesterProvider {
    async fn resolve(&self, parts: &Parts) -> Result<Option<Requester>> {
        let Some(raw_id) = parts.headers.get(self.id_header.as_str()) else {
            return Ok(None);
        };
        let id = raw_id.to_str()?.trim();
        if id.is_empty() {
            anyhow::bail!("{} header is empty", self.id_header);
        }
        let admin = parts
            .headers
            .get(self.admin_header.as_str())
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        Ok(Some(Requester {
            id: id.to_string(),
            admin,
        }))
    }

    fn name(&self) -> &str {
        "header"
    }
}
