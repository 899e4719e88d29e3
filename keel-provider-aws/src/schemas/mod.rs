//! AWS resource schema definitions

pub mod evidently;
pub mod lambda;
pub mod types;

use keel_core::schema::ResourceSchema;

/// Returns all AWS schemas
pub fn all_schemas() -> Vec<ResourceSchema> {
    let mut schemas = Vec::new();
    schemas.extend(evidently::schemas());
    schemas.extend(lambda::schemas());
    schemas
}
