//! OpenAPI description of the inference routes

use std::borrow::Cow;
use utoipa::openapi::schema::{AdditionalProperties, ObjectBuilder, Schema, SchemaType, Type};
use utoipa::openapi::RefOr;
use utoipa::{OpenApi, PartialSchema, ToSchema};

/// Route serving the OpenAPI document
pub const SPEC_PATH: &str = "/api/spec.json";

/// Route serving the interactive API reference
pub const DOCS_PATH: &str = "/api/doc";

/// Base document; paths and schemas are collected from the handlers
#[derive(OpenApi)]
#[openapi(info(title = "mlinfer", description = "Inference server for MLflow pyfunc models"))]
pub struct ApiDoc;

/// One input or output row, keyed by column name
pub struct RowSchema;

impl PartialSchema for RowSchema {
    fn schema() -> RefOr<Schema> {
        ObjectBuilder::new()
            .schema_type(SchemaType::new(Type::Object))
            .additional_properties(Some(AdditionalProperties::FreeForm(true)))
            .description(Some("Column name to value"))
            .into()
    }
}

impl ToSchema for RowSchema {
    fn name() -> Cow<'static, str> {
        Cow::Borrowed("Row")
    }
}
