//! The crate graph: all entities of one package and the operations that
//! keep it structurally sound.
//!
//! Entities live in three disjoint partitions (default, data, contextual)
//! whose concatenation, in that order, is both the lookup and the
//! serialization order. The two default entities are created with the
//! graph and can never be removed.

use serde_json::{Map, Value};

use crate::entity::{Entity, EntityKind};
use crate::error::{
    CheckError, ConfigError, DocumentError, EntityError, GraphError, StructureError,
};
use crate::profile::{
    context_for_schema, schema_for_context, BASE_SCHEMA, METADATA_DESCRIPTOR_ID,
    METADATA_DESCRIPTOR_TYPE, PROFILE_CONTEXT, ROOT_ENTITY_ID, ROOT_ENTITY_TYPE,
};
use crate::schema;

/// A whole metadata package as a graph of entities.
#[derive(Debug, Clone)]
pub struct CrateGraph {
    default_entities: Vec<Entity>,
    data_entities: Vec<Entity>,
    contextual_entities: Vec<Entity>,
}

impl CrateGraph {
    /// An empty package: just the root dataset and the metadata
    /// descriptor.
    pub fn new() -> CrateGraph {
        CrateGraph {
            default_entities: vec![Entity::root_dataset(), Entity::metadata_descriptor()],
            data_entities: Vec::new(),
            contextual_entities: Vec::new(),
        }
    }

    pub fn root(&self) -> &Entity {
        &self.default_entities[0]
    }

    pub fn root_mut(&mut self) -> &mut Entity {
        &mut self.default_entities[0]
    }

    pub fn metadata_descriptor(&self) -> &Entity {
        &self.default_entities[1]
    }

    pub fn metadata_descriptor_mut(&mut self) -> &mut Entity {
        &mut self.default_entities[1]
    }

    /// All entities in serialization order: default, then data, then
    /// contextual.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.default_entities
            .iter()
            .chain(self.data_entities.iter())
            .chain(self.contextual_entities.iter())
    }

    pub fn data_entities(&self) -> &[Entity] {
        &self.data_entities
    }

    pub fn contextual_entities(&self) -> &[Entity] {
        &self.contextual_entities
    }

    /// Attach an entity to the partition its kind names. Default
    /// entities exist from construction and cannot be attached.
    pub fn add(&mut self, entity: Entity) -> Result<(), GraphError> {
        match entity.kind() {
            EntityKind::Default => Err(GraphError::DefaultPinned),
            EntityKind::Data => {
                self.data_entities.push(entity);
                Ok(())
            }
            EntityKind::Contextual => {
                self.contextual_entities.push(entity);
                Ok(())
            }
        }
    }

    /// Detach an entity, identified by its (id, context) pair. Absent
    /// entities and default entities are rejected.
    pub fn remove(&mut self, entity: &Entity) -> Result<(), GraphError> {
        if entity.kind() == EntityKind::Default {
            return Err(GraphError::DefaultPinned);
        }
        let list = match entity.kind() {
            EntityKind::Data => &mut self.data_entities,
            _ => &mut self.contextual_entities,
        };
        let position = list
            .iter()
            .position(|e| e.id() == entity.id() && e.context() == entity.context());
        match position {
            Some(i) => {
                list.remove(i);
                Ok(())
            }
            None => Err(GraphError::NotPresent {
                id: entity.id().to_string(),
            }),
        }
    }

    /// All entities with the given `@id`. More than one match is
    /// legitimate: the same id may be described in several contexts.
    pub fn get_by_id(&self, id: &str) -> Vec<&Entity> {
        self.entities().filter(|e| e.id() == id).collect()
    }

    /// All entities with the given `@type`.
    pub fn get_by_type(&self, type_name: &str) -> Vec<&Entity> {
        self.entities().filter(|e| e.type_name() == type_name).collect()
    }

    /// Enforce the graph-level invariant: no two entities share both id
    /// and context.
    pub fn check_structure(&self) -> Result<(), StructureError> {
        let mut seen: Vec<(&str, &str)> = Vec::new();
        let mut duplicates: Vec<(String, String)> = Vec::new();
        for entity in self.entities() {
            let pair = (entity.id(), entity.context());
            if seen.contains(&pair) {
                let owned = (pair.0.to_string(), pair.1.to_string());
                if !duplicates.contains(&owned) {
                    duplicates.push(owned);
                }
            } else {
                seen.push(pair);
            }
        }
        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(StructureError::DuplicateEntities { pairs: duplicates })
        }
    }

    /// Run the local schema check over every entity, aggregating all
    /// failures. Never stops at the first failing entity.
    pub fn check_all_props(&self) -> Result<(), DocumentError> {
        let mut errors: Vec<EntityError> = Vec::new();
        for entity in self.entities() {
            let def = entity_def(entity)?;
            if let Err(e) = entity.check_props(&def) {
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CheckError { errors }.into())
        }
    }

    /// Serialize the whole package.
    ///
    /// Structure is checked first, then every entity's local schema
    /// conformance (failing only after all entities were seen), then the
    /// document is emitted in the fixed partition order.
    pub fn to_document(&self) -> Result<Value, DocumentError> {
        self.check_structure()?;
        self.check_all_props()?;

        let graph: Vec<Value> = self.entities().map(Entity::project).collect();
        Ok(serde_json::json!({
            "@context": PROFILE_CONTEXT,
            "@graph": graph,
        }))
    }

    /// Parse a document back into a graph.
    ///
    /// The top level must carry the fixed profile context and a graph
    /// array; every member needs an id and a type. The root dataset and
    /// metadata descriptor are recognized by their signatures and become
    /// the default entities; everything else is filed by its kind.
    pub fn from_document(doc: &Value) -> Result<CrateGraph, DocumentError> {
        let context = doc
            .get("@context")
            .ok_or_else(|| StructureError::MalformedDocument {
                reason: "missing @context".to_string(),
            })?;
        let context = context
            .as_str()
            .ok_or_else(|| StructureError::MalformedDocument {
                reason: "@context must be a string".to_string(),
            })?;
        if context != PROFILE_CONTEXT {
            return Err(StructureError::WrongContext {
                found: context.to_string(),
            }
            .into());
        }

        let members = doc
            .get("@graph")
            .and_then(Value::as_array)
            .ok_or_else(|| StructureError::MalformedDocument {
                reason: "missing @graph array".to_string(),
            })?;

        let mut root: Option<Entity> = None;
        let mut metadata: Option<Entity> = None;
        let mut data_entities = Vec::new();
        let mut contextual_entities = Vec::new();

        for (index, member) in members.iter().enumerate() {
            let object = member
                .as_object()
                .ok_or_else(|| StructureError::MalformedDocument {
                    reason: format!("graph member #{} is not an object", index),
                })?;
            let id = object
                .get("@id")
                .and_then(Value::as_str)
                .ok_or(StructureError::EntityWithoutId { index })?;
            let type_name = object
                .get("@type")
                .and_then(Value::as_str)
                .ok_or_else(|| StructureError::EntityWithoutType { id: id.to_string() })?;

            if id == ROOT_ENTITY_ID && type_name == ROOT_ENTITY_TYPE {
                let mut entity = Entity::root_dataset();
                copy_props(object, &mut entity);
                if root.replace(entity).is_some() {
                    return Err(duplicate(id, BASE_SCHEMA).into());
                }
                continue;
            }
            if id == METADATA_DESCRIPTOR_ID && type_name == METADATA_DESCRIPTOR_TYPE {
                let mut entity = Entity::metadata_descriptor();
                copy_props(object, &mut entity);
                if metadata.replace(entity).is_some() {
                    return Err(duplicate(id, BASE_SCHEMA).into());
                }
                continue;
            }

            let entity_context = object
                .get("@context")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| context_for_schema(BASE_SCHEMA));
            let schema_name = schema_for_context(&entity_context)
                .ok_or_else(|| ConfigError::UnknownSchema {
                    name: entity_context.clone(),
                })?
                .to_string();
            // The type must be registered for the schema before an
            // entity of it can be constructed.
            schema::lookup_entity(&schema_name, type_name)?;

            let mut props = Map::new();
            for (key, value) in object {
                if !key.starts_with('@') {
                    props.insert(key.clone(), value.clone());
                }
            }
            let kind = EntityKind::for_type(type_name);
            let entity = Entity::from_parts(
                id.to_string(),
                type_name.to_string(),
                entity_context,
                kind,
                props,
            );
            match kind {
                EntityKind::Data => data_entities.push(entity),
                _ => contextual_entities.push(entity),
            }
        }

        let root = root.ok_or(StructureError::MissingRootEntity)?;
        let metadata = metadata.ok_or(StructureError::MissingMetadataDescriptor)?;

        Ok(CrateGraph {
            default_entities: vec![root, metadata],
            data_entities,
            contextual_entities,
        })
    }
}

impl Default for CrateGraph {
    fn default() -> Self {
        CrateGraph::new()
    }
}

/// Compiled definition for an entity, resolving its context to a schema
/// with the usual base fallback.
pub(crate) fn entity_def(entity: &Entity) -> Result<crate::schema::EntityDef, ConfigError> {
    let schema_name = entity
        .schema_name()
        .ok_or_else(|| ConfigError::UnknownSchema {
            name: entity.context().to_string(),
        })?;
    let schema = schema::lookup_entity(schema_name, entity.type_name())?;
    // lookup_entity only returns a schema that has the type.
    schema
        .entity(entity.type_name())
        .cloned()
        .ok_or_else(|| ConfigError::UnknownEntityType {
            schema: schema_name.to_string(),
            type_name: entity.type_name().to_string(),
        })
}

fn copy_props(object: &Map<String, Value>, entity: &mut Entity) {
    for (key, value) in object {
        if !key.starts_with('@') {
            // Reserved keys are already set by the constructor.
            let _ = entity.set(key.clone(), value.clone());
        }
    }
}

fn duplicate(id: &str, schema: &str) -> StructureError {
    StructureError::DuplicateEntities {
        pairs: vec![(id.to_string(), context_for_schema(schema))],
    }
}
