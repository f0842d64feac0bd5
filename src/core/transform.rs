//! Field-level read/write visibility
//!
//! A [`FieldTransformer`] maps each [`Role`] to a [`FieldAccess`]. Writes that
//! touch a field outside the write set are rejected; reads silently drop
//! fields outside the read set.

use crate::core::auth::Role;
use crate::core::error::{ApiError, ApiResult};
use crate::core::model::SYSTEM_FIELDS;
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

/// Set of visible fields
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldSet {
    #[default]
    All,
    Only(IndexSet<String>),
}

impl FieldSet {
    pub fn only<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSet::Only(fields.into_iter().map(Into::into).collect())
    }

    pub fn none() -> Self {
        FieldSet::Only(IndexSet::new())
    }

    pub fn contains(&self, field: &str) -> bool {
        match self {
            FieldSet::All => true,
            FieldSet::Only(fields) => fields.contains(field),
        }
    }

    /// Union of two sets
    pub fn union(&self, other: &FieldSet) -> FieldSet {
        match (self, other) {
            (FieldSet::Only(a), FieldSet::Only(b)) => FieldSet::Only(a.union(b).cloned().collect()),
            _ => FieldSet::All,
        }
    }
}

/// Readable and writable fields for one role
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldAccess {
    pub read: FieldSet,
    pub write: FieldSet,
}

impl FieldAccess {
    pub fn new(read: FieldSet, write: FieldSet) -> Self {
        Self { read, write }
    }

    /// Read everything, write nothing
    pub fn read_only() -> Self {
        Self::new(FieldSet::All, FieldSet::none())
    }
}

/// Role → field access mapping
///
/// A role without an explicit entry inherits from the closest less
/// privileged role that has one; with no entries at all everything is
/// readable and writable.
#[derive(Debug, Clone, Default)]
pub struct FieldTransformer {
    access: IndexMap<Role, FieldAccess>,
}

impl FieldTransformer {
    /// No restriction for any role
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Set the access for one role
    pub fn role(mut self, role: Role, access: FieldAccess) -> Self {
        self.access.insert(role, access);
        self
    }

    /// Effective access for a role
    pub fn access_for(&self, role: Role) -> FieldAccess {
        [Role::Admin, Role::Owner, Role::Authenticated, Role::Anonymous]
            .into_iter()
            .filter(|candidate| *candidate <= role)
            .find_map(|candidate| self.access.get(&candidate).cloned())
            .unwrap_or_default()
    }

    /// Union of every role's access, used to document the widest shapes
    pub fn broadest(&self) -> FieldAccess {
        if self.access.is_empty() {
            return FieldAccess::default();
        }
        let roles = [Role::Anonymous, Role::Authenticated, Role::Owner, Role::Admin];
        roles
            .iter()
            .map(|role| self.access_for(*role))
            .reduce(|acc, next| {
                FieldAccess::new(acc.read.union(&next.read), acc.write.union(&next.write))
            })
            .unwrap_or_default()
    }

    /// Check a write body against the role's write set
    ///
    /// System fields are dropped from the body; any other key outside the
    /// write set fails the whole request with 403.
    pub fn filter_for_write(&self, body: &Value, role: Role) -> ApiResult<Value> {
        let Some(map) = body.as_object() else {
            return Err(ApiError::invalid_request("Request body must be a JSON object"));
        };
        let access = self.access_for(role);

        let mut rejected: Vec<&str> = map
            .keys()
            .map(String::as_str)
            .filter(|key| !SYSTEM_FIELDS.contains(key) && !access.write.contains(key))
            .collect();
        if !rejected.is_empty() {
            rejected.sort_unstable();
            return Err(ApiError::not_allowed(format!(
                "User of type {} cannot write fields: {}",
                role.label(),
                rejected.join(", ")
            )));
        }

        let filtered: Map<String, Value> = map
            .iter()
            .filter(|(key, _)| !SYSTEM_FIELDS.contains(&key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Value::Object(filtered))
    }

    /// Drop fields the role may not read; ids always survive
    pub fn filter_for_read(&self, object: &Value, role: Role) -> Value {
        let Some(map) = object.as_object() else {
            return object.clone();
        };
        let access = self.access_for(role);
        if access.read == FieldSet::All {
            return object.clone();
        }
        let kept: Map<String, Value> = map
            .iter()
            .filter(|(key, _)| {
                matches!(key.as_str(), "_id" | "id") || access.read.contains(key)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(kept)
    }
}
