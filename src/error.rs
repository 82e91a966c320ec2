//! Error types for package checking and validation.
//!
//! Four failure classes with different propagation rules: configuration
//! errors and structural errors are fatal for the whole operation, entity
//! errors are collected per entity and aggregated into a [`CheckError`]
//! before anything is raised, and job errors belong to the validation
//! service surface.

use thiserror::Error;

/// Errors in the schema configuration itself.
///
/// These indicate a schema-authoring bug, never malformed input data, and
/// always propagate uncaught through the checking entry points.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown schema \"{name}\"")]
    UnknownSchema { name: String },

    #[error("unknown entity type \"{type_name}\" in schema \"{schema}\"")]
    UnknownEntityType { schema: String, type_name: String },

    #[error("cannot resolve type expression \"{expr}\" in schema \"{schema}\"")]
    UnresolvableType { schema: String, expr: String },

    #[error("cannot read schema \"{name}\": {source}")]
    SchemaRead {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("schema \"{name}\" is not valid YAML: {source}")]
    InvalidYaml {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("schema \"{name}\" violates the definition format: {}", violations.join("; "))]
    MetaSchema { name: String, violations: Vec<String> },
}

/// Errors mutating an entity's property bag.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PropError {
    #[error("reserved key \"{key}\" may not be set as an ordinary property")]
    ReservedKey { key: String },

    #[error("\"{key}\" is not a reserved key")]
    NotReserved { key: String },
}

/// Structural errors: the document cannot be interpreted as a crate graph
/// at all, so no further checking is meaningful.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructureError {
    #[error("malformed document: {reason}")]
    MalformedDocument { reason: String },

    #[error("document @context is \"{found}\", expected the fixed profile context")]
    WrongContext { found: String },

    #[error("graph member #{index} has no @id")]
    EntityWithoutId { index: usize },

    #[error("graph member \"{id}\" has no @type")]
    EntityWithoutType { id: String },

    #[error("duplicate entities: {}", pairs.iter().map(|(id, ctx)| format!("(\"{}\", \"{}\")", id, ctx)).collect::<Vec<_>>().join(", "))]
    DuplicateEntities { pairs: Vec<(String, String)> },

    #[error("missing root dataset entity")]
    MissingRootEntity,

    #[error("missing metadata descriptor entity")]
    MissingMetadataDescriptor,
}

/// Errors attaching or detaching graph entities.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("default entities are pinned to the graph")]
    DefaultPinned,

    #[error("entity \"{id}\" is not in the graph")]
    NotPresent { id: String },
}

/// Per-entity check failure: an ordered set of (property, reason) pairs
/// attached to one entity.
///
/// The first reason recorded for a property wins; later additions for the
/// same property are ignored.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EntityError {
    /// `@id` of the failing entity.
    pub id: String,
    /// `@type` of the failing entity.
    pub type_name: String,
    /// Property name to human-readable reason, in recording order.
    pub reasons: Vec<(String, String)>,
}

impl EntityError {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            reasons: Vec::new(),
        }
    }

    /// Record a reason for a property. A property that already has a
    /// reason keeps it; the new one is dropped.
    pub fn add(&mut self, prop: impl Into<String>, reason: impl Into<String>) {
        let prop = prop.into();
        if !self.reasons.iter().any(|(p, _)| *p == prop) {
            self.reasons.push((prop, reason.into()));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }

    /// Convert to `Ok(())` when empty, `Err(self)` otherwise.
    pub fn into_result(self) -> Result<(), EntityError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for EntityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} \"{}\":", self.type_name, self.id)?;
        for (prop, reason) in &self.reasons {
            write!(f, " [{}] {};", prop, reason)?;
        }
        Ok(())
    }
}

/// Aggregate of all entity errors from one pass over the graph, in graph
/// order. Raised only after every entity has been seen.
#[derive(Debug, Error)]
#[error("{} entit{} failed checks", errors.len(), if errors.len() == 1 { "y" } else { "ies" })]
pub struct CheckError {
    pub errors: Vec<EntityError>,
}

/// Errors from the document-level entry points.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Check(#[from] CheckError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from the validation job service.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("unknown request id \"{id}\"")]
    UnknownRequest { id: String },

    #[error("request \"{id}\" is {state} and can no longer be canceled")]
    CancelRejected { id: String, state: &'static str },

    #[error("request rejected: {source}")]
    Rejected {
        #[source]
        source: DocumentError,
    },

    #[error("validation service is shut down")]
    ShutDown,
}

impl ConfigError {
    /// Exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SchemaRead { .. } => 3, // IO
            _ => 2,                       // configuration
        }
    }
}

impl DocumentError {
    /// Exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Structure(_) => 2,
            Self::Check(_) => 1,
            Self::Config(e) => e.exit_code(),
        }
    }
}
