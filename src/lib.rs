//! Governance validation for RO-Crate research data packages.
//!
//! A package is one JSON-LD document: a flat `@graph` of typed entities
//! connected by reference, rooted at a dataset entity (`./`) and its
//! metadata descriptor (`ro-crate-metadata.json`). This library builds
//! and parses such documents and confirms two things about them:
//!
//! 1. **Local conformance** - every entity carries the properties its
//!    schema definition requires, with values of the declared shapes.
//! 2. **Governance consistency** - cross-entity rules hold across the
//!    whole graph: companion entities exist, declared volumes reconcile
//!    with file inventories, external identifiers are well-formed and
//!    checksummed.
//!
//! # Example
//!
//! ```
//! use rocrate_govern::{CrateGraph, Entity, RuleSet, ValidationPipeline};
//! use serde_json::json;
//!
//! let mut graph = CrateGraph::new();
//! graph.root_mut().set("name", "Example package").unwrap();
//!
//! let mut file = Entity::new("./data/raw.csv", "File", "base");
//! file.set("name", "raw.csv").unwrap();
//! file.set("contentSize", "15GB").unwrap();
//! graph.add(file).unwrap();
//! graph
//!     .root_mut()
//!     .set("hasPart", json!([{ "@id": "./data/raw.csv" }]))
//!     .unwrap();
//!
//! // Serialize, checking structure and local schema conformance.
//! let document = graph.to_document().unwrap();
//!
//! // Full validation: local checks plus governance rules.
//! let rules = RuleSet::base();
//! let report = ValidationPipeline::new(&rules).validate(&graph).unwrap();
//! assert!(report.passed());
//!
//! // Round-trip.
//! let restored = CrateGraph::from_document(&document).unwrap();
//! assert_eq!(restored.entities().count(), 3);
//! ```
//!
//! # Failure classes
//!
//! Data problems aggregate: local and governance checks see every entity
//! before reporting, one [`EntityError`] per failing entity in graph
//! order, and at most one reason per property (the first recorded wins).
//! Structural problems (duplicate ids, missing defaults, malformed
//! documents) abort immediately - such a document is not a graph.
//! Configuration problems (unknown schemas or types, unresolvable type
//! expressions) are authoring bugs and always propagate.
//!
//! # Concurrency
//!
//! Validation itself is synchronous; the compiled schema cache is the
//! only shared state and is immutable after first load, so any number of
//! graphs may validate in parallel. [`ValidationService`] adds the only
//! concurrency in the crate: a bounded worker pool with queued,
//! cancelable jobs.

mod entity;
mod error;
mod graph;
mod jobs;
mod pipeline;
mod rules;

pub mod ident;
pub mod profile;
pub mod schema;
pub mod units;

pub use entity::{Entity, EntityKind, RESERVED_SIGIL};
pub use error::{
    CheckError, ConfigError, DocumentError, EntityError, GraphError, JobError, PropError,
    StructureError,
};
pub use graph::CrateGraph;
pub use jobs::{JobRecord, JobState, ValidationService};
pub use pipeline::{FailureRecord, RunState, ValidationPipeline, ValidationReport};
pub use rules::{GovernanceRule, RuleContext, RuleSet};

#[cfg(feature = "remote")]
pub use ident::HttpLookup;
pub use ident::RemoteLookup;
