//! Configuration loading and management
//!
//! The declarative part of a resource (model, permissions, query fields,
//! sort, population and field visibility) can be described in YAML:
//!
//! ```yaml
//! resources:
//!   - path: /food
//!     model:
//!       name: Food
//!       fields:
//!         name: { type: string, required: true }
//!         calories: { type: number }
//!         ownerId: { type: objectid, ref: User }
//!     permissions:
//!       list: [IsAny]
//!       create: [IsAuthenticated]
//!     query_fields: [name, calories]
//!     sort: -created
//!     populate:
//!       - path: ownerId
//!         fields: [email]
//!     fields:
//!       anonymous: { read: [name, calories], write: none }
//!       admin: { read: all, write: all }
//! ```
//!
//! Hooks, response handlers and custom routes are code, so they are added to
//! the resulting [`ResourceConfig`] afterwards.

use crate::core::auth::{DEFAULT_OWNER_FIELD, Operation, Permission, Permissions, Role};
use crate::core::model::ModelSchema;
use crate::core::populate::PopulateSpec;
use crate::core::query::SortSpec;
use crate::core::transform::{FieldAccess, FieldSet, FieldTransformer};
use crate::server::resource::ResourceConfig;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use validator::Validate;

static RESOURCE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(/[A-Za-z0-9_-]+)+$").expect("valid resource path regex"));

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("unknown permission '{permission}' for {operation} on {path}")]
    UnknownPermission {
        path: String,
        operation: Operation,
        permission: String,
    },

    #[error("invalid field list '{0}', expected 'all', 'none' or a list of fields")]
    InvalidFieldList(String),

    #[error("invalid sort for {path}: {reason}")]
    InvalidSort { path: String, reason: String },

    #[error("duplicate resource path {0}")]
    DuplicatePath(String),
}

/// `all`, `none` or an explicit list of field names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldList {
    Keyword(String),
    Fields(Vec<String>),
}

impl Default for FieldList {
    fn default() -> Self {
        FieldList::Keyword("all".to_string())
    }
}

impl FieldList {
    pub fn to_field_set(&self) -> Result<FieldSet, ConfigError> {
        match self {
            FieldList::Keyword(k) if k == "all" => Ok(FieldSet::All),
            FieldList::Keyword(k) if k == "none" => Ok(FieldSet::none()),
            FieldList::Keyword(other) => Err(ConfigError::InvalidFieldList(other.clone())),
            FieldList::Fields(fields) => Ok(FieldSet::only(fields.iter().cloned())),
        }
    }
}

/// Visibility of fields for one role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldAccessConfig {
    #[serde(default)]
    pub read: FieldList,
    #[serde(default)]
    pub write: FieldList,
}

/// Declarative description of one resource
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ResourceDefinition {
    /// Mount path, e.g. `/food`
    #[validate(regex(path = *RESOURCE_PATH, message = "must look like /name or /a/b"))]
    pub path: String,

    pub model: ModelSchema,

    /// Operation → permission names; operations left out are disabled
    #[serde(default)]
    pub permissions: IndexMap<Operation, Vec<String>>,

    #[serde(default)]
    pub query_fields: Option<Vec<String>>,

    /// Default sort, `-created,name` or a JSON object
    #[serde(default)]
    pub sort: Option<String>,

    #[serde(default)]
    pub populate: Vec<PopulateSpec>,

    #[serde(default)]
    #[validate(length(min = 1))]
    pub owner_field: Option<String>,

    /// Role → readable/writable fields
    #[serde(default)]
    pub fields: IndexMap<Role, FieldAccessConfig>,
}

impl ResourceDefinition {
    fn permissions(&self) -> Result<Permissions, ConfigError> {
        let mut permissions = Permissions::new();
        for (operation, names) in &self.permissions {
            let parsed = names
                .iter()
                .map(|name| {
                    Permission::parse_permission(name).ok_or_else(|| {
                        ConfigError::UnknownPermission {
                            path: self.path.clone(),
                            operation: *operation,
                            permission: name.clone(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            permissions = permissions.allow(*operation, parsed);
        }
        Ok(permissions)
    }

    fn transformer(&self) -> Result<FieldTransformer, ConfigError> {
        self.fields
            .iter()
            .try_fold(FieldTransformer::allow_all(), |transformer, (role, access)| {
                let access =
                    FieldAccess::new(access.read.to_field_set()?, access.write.to_field_set()?);
                Ok(transformer.role(*role, access))
            })
    }

    /// Convert into the model and configuration used by the server
    pub fn into_parts(self) -> Result<(String, ModelSchema, ResourceConfig), ConfigError> {
        let mut config = ResourceConfig::new()
            .permissions(self.permissions()?)
            .transformer(self.transformer()?)
            .owner_field(self.owner_field.as_deref().unwrap_or(DEFAULT_OWNER_FIELD));
        if let Some(fields) = &self.query_fields {
            config = config.query_fields(fields.iter().cloned());
        }
        if let Some(raw) = &self.sort {
            let sort = SortSpec::parse(raw).map_err(|e| ConfigError::InvalidSort {
                path: self.path.clone(),
                reason: e.title,
            })?;
            config = config.sort(sort);
        }
        for spec in self.populate {
            config = config.populate(spec);
        }
        Ok((self.path, self.model, config))
    }
}

/// Complete resource configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ResourcesConfig {
    #[serde(default)]
    #[validate(nested)]
    pub resources: Vec<ResourceDefinition>,
}

impl ResourcesConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.check()?;
        Ok(config)
    }

    /// Field validation plus cross-resource checks
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        let mut seen = std::collections::HashSet::new();
        for resource in &self.resources {
            if !seen.insert(resource.path.as_str()) {
                return Err(ConfigError::DuplicatePath(resource.path.clone()));
            }
        }
        Ok(())
    }

    /// Merge several configurations; later resources with the same path win
    pub fn merge(configs: Vec<ResourcesConfig>) -> Self {
        let mut merged: IndexMap<String, ResourceDefinition> = IndexMap::new();
        for resource in configs.into_iter().flat_map(|c| c.resources) {
            merged.insert(resource.path.clone(), resource);
        }
        Self {
            resources: merged.into_values().collect(),
        }
    }
}
