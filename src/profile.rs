//! Fixed vocabulary for the governance RO-Crate profile.
//!
//! Defines the document-level context URI, the well-known ids of the two
//! default entities, and the mapping between schema names and per-entity
//! context URIs.

/// Document-level `@context` every conforming package carries.
pub const PROFILE_CONTEXT: &str = "https://w3id.org/ro/crate/1.1/context";

/// Profile the metadata descriptor declares conformance to.
pub const PROFILE_URI: &str = "https://w3id.org/ro/crate/1.1";

/// `@id` of the root dataset entity.
pub const ROOT_ENTITY_ID: &str = "./";

/// `@type` of the root dataset entity.
pub const ROOT_ENTITY_TYPE: &str = "Dataset";

/// `@id` of the metadata descriptor entity.
pub const METADATA_DESCRIPTOR_ID: &str = "ro-crate-metadata.json";

/// `@type` of the metadata descriptor entity.
pub const METADATA_DESCRIPTOR_TYPE: &str = "CreativeWork";

/// Schema used for entities that carry no per-entity `@context`.
pub const BASE_SCHEMA: &str = "base";

/// Base URI under which per-schema contexts are published.
pub const SCHEMA_CONTEXT_BASE: &str = "https://w3id.org/ro/terms/govern/";

/// Entity type names filed as Data entities; everything else not created
/// by a default constructor is Contextual.
pub const DATA_ENTITY_TYPES: &[&str] = &["File", "Dataset"];

/// Context URI locating the schema a given entity belongs to.
pub fn context_for_schema(schema: &str) -> String {
    format!("{SCHEMA_CONTEXT_BASE}{schema}/context")
}

/// Inverse of [`context_for_schema`]: the schema name a per-entity
/// `@context` points at, if it is one of ours.
pub fn schema_for_context(context: &str) -> Option<&str> {
    context
        .strip_prefix(SCHEMA_CONTEXT_BASE)?
        .strip_suffix("/context")
        .filter(|s| !s.is_empty() && !s.contains('/'))
}
