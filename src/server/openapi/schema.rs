//! Schema primitives: model fields to OpenAPI schemas

use crate::core::model::{FieldSchema, FieldType, ModelSchema};
use crate::core::populate::PopulateSpec;
use crate::core::query::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::core::transform::FieldSet;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::openapi::path::{Parameter, ParameterBuilder, ParameterIn};
use utoipa::openapi::schema::{
    ArrayBuilder, KnownFormat, ObjectBuilder, OneOfBuilder, Schema, SchemaFormat, SchemaType, Type,
};
use utoipa::openapi::{Ref, RefOr, Required};

/// Comparison operators documented for ordered fields
pub const RANGE_OPERATORS: [&str; 4] = ["$gt", "$gte", "$lt", "$lte"];

/// Models by name, used to describe populated references
pub type ModelIndex = HashMap<String, Arc<ModelSchema>>;

fn scalar(field_type: &FieldType) -> ObjectBuilder {
    match field_type {
        FieldType::String => ObjectBuilder::new().schema_type(Type::String),
        FieldType::Number => ObjectBuilder::new().schema_type(Type::Number),
        FieldType::Boolean => ObjectBuilder::new().schema_type(Type::Boolean),
        FieldType::Date => ObjectBuilder::new()
            .schema_type(Type::String)
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::DateTime))),
        FieldType::ObjectId { reference } => ObjectBuilder::new()
            .schema_type(Type::String)
            .description(reference.as_ref().map(|r| format!("Id of a {r}"))),
        FieldType::Mixed | FieldType::Array { .. } | FieldType::Object { .. } => {
            ObjectBuilder::new().schema_type(SchemaType::AnyValue)
        }
    }
}

fn system_string(description: &str) -> RefOr<Schema> {
    ObjectBuilder::new()
        .schema_type(Type::String)
        .description(Some(description))
        .read_only(Some(true))
        .into()
}

fn timestamp_schema(description: &str) -> RefOr<Schema> {
    ObjectBuilder::new()
        .schema_type(Type::String)
        .format(Some(SchemaFormat::KnownFormat(KnownFormat::DateTime)))
        .description(Some(description))
        .read_only(Some(true))
        .into()
}

/// Add the `_id`, `created` and `updated` properties to an object schema
pub fn with_system_fields(builder: ObjectBuilder) -> ObjectBuilder {
    builder
        .property("_id", system_string("Document id"))
        .property("created", timestamp_schema("Creation time"))
        .property("updated", timestamp_schema("Last modification time"))
}

/// Schema of a field value when used as a query parameter
///
/// Number and Date fields also accept an operator object.
pub fn query_parameter_schema(field_type: &FieldType) -> RefOr<Schema> {
    let element = field_type.element();
    if !element.is_ordered() {
        return scalar(element).into();
    }
    let operators = RANGE_OPERATORS
        .iter()
        .fold(ObjectBuilder::new().schema_type(Type::Object), |b, op| {
            b.property(*op, scalar(element))
        });
    OneOfBuilder::new().item(scalar(element)).item(operators).into()
}

/// Query parameters of a list endpoint
pub fn list_parameters(model: &ModelSchema, query_fields: &[String]) -> Vec<Parameter> {
    let mut parameters: Vec<Parameter> = query_fields
        .iter()
        .filter_map(|name| {
            let field_type = model.field_at_path(name)?;
            Some(
                ParameterBuilder::new()
                    .name(name)
                    .parameter_in(ParameterIn::Query)
                    .required(Required::False)
                    .schema(Some(query_parameter_schema(field_type)))
                    .build(),
            )
        })
        .collect();

    let integer = |min: usize, max: Option<usize>| {
        ObjectBuilder::new()
            .schema_type(Type::Integer)
            .minimum(Some(min))
            .maximum(max)
    };
    parameters.push(
        ParameterBuilder::new()
            .name("limit")
            .parameter_in(ParameterIn::Query)
            .required(Required::False)
            .description(Some(format!("Page size, default {DEFAULT_LIMIT}")))
            .schema(Some(integer(1, Some(MAX_LIMIT)).default(Some(DEFAULT_LIMIT.into()))))
            .build(),
    );
    parameters.push(
        ParameterBuilder::new()
            .name("page")
            .parameter_in(ParameterIn::Query)
            .required(Required::False)
            .description(Some("1-based page number; also reports the total"))
            .schema(Some(integer(1, None)))
            .build(),
    );
    parameters.push(
        ParameterBuilder::new()
            .name("sort")
            .parameter_in(ParameterIn::Query)
            .required(Required::False)
            .description(Some("Comma separated fields, prefix with - to sort descending"))
            .schema(Some(ObjectBuilder::new().schema_type(Type::String)))
            .build(),
    );
    parameters
}

/// Path parameter helper
pub fn path_parameter(name: &str, description: &str) -> Parameter {
    ParameterBuilder::new()
        .name(name)
        .parameter_in(ParameterIn::Path)
        .required(Required::True)
        .description(Some(description))
        .schema(Some(ObjectBuilder::new().schema_type(Type::String)))
        .build()
}

/// Converts model fields to schemas, expanding populated references
///
/// Populate paths are matched against the dotted position of each field;
/// array elements share the path of their array.
pub struct SchemaReflector<'a> {
    populate: &'a [PopulateSpec],
    models: &'a ModelIndex,
}

impl<'a> SchemaReflector<'a> {
    pub fn new(populate: &'a [PopulateSpec], models: &'a ModelIndex) -> Self {
        Self { populate, models }
    }

    /// A reflector that never expands references (request bodies)
    pub fn raw(models: &'a ModelIndex) -> Self {
        Self { populate: &[], models }
    }

    pub fn field(&self, path: &str, field: &FieldSchema) -> RefOr<Schema> {
        match &field.field_type {
            FieldType::Array { items } => ArrayBuilder::new()
                .items(self.field_type(path, items, true))
                .description(field.description.clone())
                .into(),
            FieldType::Object { fields } => self
                .object(path, fields, false)
                .description(field.description.clone())
                .into(),
            FieldType::ObjectId { .. } if self.spec_at(path).is_some() => {
                self.field_type(path, &field.field_type, false)
            }
            other => scalar(other)
                .description(field.description.clone().or_else(|| scalar_description(other)))
                .enum_values(field.enum_values.clone())
                .into(),
        }
    }

    fn field_type(&self, path: &str, field_type: &FieldType, in_array: bool) -> RefOr<Schema> {
        match field_type {
            FieldType::Array { items } => ArrayBuilder::new()
                .items(self.field_type(path, items, true))
                .into(),
            FieldType::Object { fields } => self.object(path, fields, in_array).into(),
            FieldType::ObjectId { reference } => match self.spec_at(path) {
                Some(spec) => self.populated(spec, reference.as_deref()),
                None => scalar(field_type).into(),
            },
            other => scalar(other).into(),
        }
    }

    fn object(
        &self,
        path: &str,
        fields: &IndexMap<String, FieldSchema>,
        in_array: bool,
    ) -> ObjectBuilder {
        // array entries that are objects carry their own id and timestamps
        let builder = ObjectBuilder::new().schema_type(Type::Object);
        let builder = if in_array { with_system_fields(builder) } else { builder };
        fields.iter().fold(builder, |builder, (name, field)| {
            let child = format!("{path}.{name}");
            let builder = builder.property(name, self.field(&child, field));
            if field.required { builder.required(name) } else { builder }
        })
    }

    fn spec_at(&self, path: &str) -> Option<&PopulateSpec> {
        self.populate.iter().find(|spec| spec.path == path)
    }

    /// Shape of an expanded reference
    fn populated(&self, spec: &PopulateSpec, reference: Option<&str>) -> RefOr<Schema> {
        match &spec.shared_schema_name {
            Some(name) => Ref::from_schema_name(name).into(),
            None => self.expanded_shape(spec, reference).into(),
        }
    }

    /// Inline object schema of an expanded reference
    pub fn expanded_shape(&self, spec: &PopulateSpec, reference: Option<&str>) -> ObjectBuilder {
        let target = reference.and_then(|r| self.models.get(r));
        let base = ObjectBuilder::new()
            .schema_type(Type::Object)
            .property("_id", system_string("Document id"));
        match (target, &spec.fields) {
            (Some(model), Some(fields)) => {
                fields.iter().fold(base, |b, name| match model.get(name) {
                    Some(field) => {
                        b.property(name, SchemaReflector::raw(self.models).field(name, field))
                    }
                    None => {
                        b.property(name, ObjectBuilder::new().schema_type(SchemaType::AnyValue))
                    }
                })
            }
            (Some(model), None) => {
                let base = with_system_fields(base);
                model.fields.iter().fold(base, |b, (name, field)| {
                    b.property(name, SchemaReflector::raw(self.models).field(name, field))
                })
            }
            (None, Some(fields)) => fields.iter().fold(base, |b, name| {
                b.property(name, ObjectBuilder::new().schema_type(SchemaType::AnyValue))
            }),
            (None, None) => base,
        }
    }

    /// Object schema of a model restricted to a set of visible fields
    ///
    /// `documented` adds the system fields and marks required ones; request
    /// bodies skip both since the store owns system fields.
    pub fn model(
        &self,
        model: &ModelSchema,
        visible: &FieldSet,
        extra: &IndexMap<String, FieldSchema>,
        documented: bool,
    ) -> ObjectBuilder {
        let base = ObjectBuilder::new().schema_type(Type::Object).title(Some(model.name.clone()));
        let base = if documented { with_system_fields(base) } else { base };
        let builder = model
            .fields
            .iter()
            .filter(|(name, _)| visible.contains(name))
            .fold(base, |builder, (name, field)| {
                let builder = builder.property(name, self.field(name, field));
                if documented && field.required { builder.required(name) } else { builder }
            });
        extra.iter().fold(builder, |builder, (name, field)| {
            builder.property(name, self.field(name, field))
        })
    }
}

fn scalar_description(field_type: &FieldType) -> Option<String> {
    field_type.reference().map(|r| format!("Id of a {r}"))
}
