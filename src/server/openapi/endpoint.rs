//! Fluent description of one HTTP endpoint
//!
//! Generated resources and hand-written sibling endpoints are both described
//! through [`EndpointBuilder`], so they share parameters, envelopes and the
//! default error responses.
//!
//! ```rust,ignore
//! let stats = EndpointBuilder::get("/food/stats")
//!     .tag("Food")
//!     .summary("Calorie statistics")
//!     .query("minCalories", &FieldType::Number)
//!     .response(200, "Statistics", Some(ObjectBuilder::new().into()))
//!     .build();
//! ```

use crate::core::model::FieldType;
use crate::server::openapi::schema::{path_parameter, query_parameter_schema};
use utoipa::openapi::path::{Operation, OperationBuilder, Parameter, ParameterBuilder, ParameterIn};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::schema::{ObjectBuilder, Schema, Type};
use utoipa::openapi::{Content, HttpMethod, Ref, RefOr, Required, ResponseBuilder};

/// Name of the shared error component
pub const ERROR_SCHEMA: &str = "Error";

const DEFAULT_ERRORS: [(u16, &str); 5] = [
    (400, "Invalid request"),
    (401, "Authentication failed"),
    (403, "Not allowed"),
    (404, "Not found"),
    (405, "Method disabled"),
];

/// Schema of the error envelope
pub fn error_schema() -> ObjectBuilder {
    ObjectBuilder::new()
        .schema_type(Type::Object)
        .property("status", ObjectBuilder::new().schema_type(Type::Integer))
        .property("title", ObjectBuilder::new().schema_type(Type::String))
        .property("detail", ObjectBuilder::new().schema_type(Type::String))
        .property("meta", ObjectBuilder::new().schema_type(Type::Object))
        .required("status")
        .required("title")
}

/// `{data: <schema>}`
pub fn data_envelope(data: impl Into<RefOr<Schema>>) -> ObjectBuilder {
    ObjectBuilder::new()
        .schema_type(Type::Object)
        .property("data", data)
        .required("data")
}

/// A described endpoint ready to be added to a document
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub path: String,
    pub operation: Operation,
}

/// Builder for [`Endpoint`]
#[derive(Debug)]
pub struct EndpointBuilder {
    method: HttpMethod,
    path: String,
    operation: OperationBuilder,
    default_errors: bool,
}

impl EndpointBuilder {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            operation: OperationBuilder::new(),
            default_errors: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.operation = self.operation.tag(tag);
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.operation = self.operation.summary(Some(summary));
        self
    }

    pub fn operation_id(mut self, id: impl Into<String>) -> Self {
        self.operation = self.operation.operation_id(Some(id));
        self
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.operation = self.operation.parameter(parameter);
        self
    }

    pub fn parameters(self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        parameters.into_iter().fold(self, Self::parameter)
    }

    /// Required string path parameter
    pub fn path_param(self, name: &str, description: &str) -> Self {
        self.parameter(path_parameter(name, description))
    }

    /// Optional query parameter typed like a model field
    pub fn query(self, name: &str, field_type: &FieldType) -> Self {
        self.parameter(
            ParameterBuilder::new()
                .name(name)
                .parameter_in(ParameterIn::Query)
                .required(Required::False)
                .schema(Some(query_parameter_schema(field_type)))
                .build(),
        )
    }

    /// Required JSON request body
    pub fn body(mut self, schema: impl Into<RefOr<Schema>>) -> Self {
        let body = RequestBodyBuilder::new()
            .required(Some(Required::True))
            .content("application/json", Content::new(Some(schema)))
            .build();
        self.operation = self.operation.request_body(Some(body));
        self
    }

    /// Add a response; `None` documents an empty body
    pub fn response(
        mut self,
        status: u16,
        description: &str,
        schema: Option<RefOr<Schema>>,
    ) -> Self {
        let response = ResponseBuilder::new().description(description);
        let response = match schema {
            Some(schema) => response.content("application/json", Content::new(Some(schema))),
            None => response,
        };
        self.operation = self.operation.response(status.to_string(), response);
        self
    }

    /// Leave out the shared 400/401/403/404/405 responses
    pub fn without_default_errors(mut self) -> Self {
        self.default_errors = false;
        self
    }

    pub fn build(self) -> Endpoint {
        let operation = if self.default_errors {
            DEFAULT_ERRORS.iter().fold(self.operation, |op, (status, description)| {
                let schema: RefOr<Schema> = Ref::from_schema_name(ERROR_SCHEMA).into();
                op.response(
                    status.to_string(),
                    ResponseBuilder::new()
                        .description(*description)
                        .content("application/json", Content::new(Some(schema))),
                )
            })
        } else {
            self.operation
        };
        Endpoint {
            method: self.method,
            path: self.path,
            operation: operation.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn to_json(endpoint: &Endpoint) -> Value {
        serde_json::to_value(&endpoint.operation).unwrap()
    }

    #[test]
    fn test_default_errors_are_merged() {
        let endpoint = EndpointBuilder::get("/food/stats")
            .tag("Food")
            .response(200, "Statistics", Some(ObjectBuilder::new().into()))
            .build();
        let json = to_json(&endpoint);
        for status in ["200", "400", "401", "403", "404", "405"] {
            assert!(json["responses"].get(status).is_some(), "missing {status}");
        }
        assert_eq!(
            json["responses"]["403"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/Error"
        );
        assert_eq!(json["tags"][0], "Food");
    }

    #[test]
    fn test_parameters_and_body() {
        let endpoint = EndpointBuilder::post("/food/{id}/rate")
            .path_param("id", "Food id")
            .query("weight", &FieldType::Number)
            .body(ObjectBuilder::new().schema_type(Type::Object))
            .without_default_errors()
            .response(204, "Rated", None)
            .build();
        let json = to_json(&endpoint);
        assert_eq!(json["parameters"][0]["in"], "path");
        assert_eq!(json["parameters"][1]["schema"]["oneOf"].as_array().unwrap().len(), 2);
        assert_eq!(json["requestBody"]["required"], true);
        assert!(json["responses"].get("400").is_none());
        assert!(json["responses"]["204"].get("content").is_none());
    }
}
