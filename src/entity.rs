//! Entities: typed records in the crate graph.
//!
//! An entity is an ordered property bag plus three reserved fields
//! (`@id`, `@type`, `@context`) that only privileged paths may touch.
//! Ordinary mutation via [`Entity::set`] is unrestricted beyond the
//! reserved-key guard; schema conformance is checked on demand, not on
//! every set.

use serde_json::{Map, Value};

use crate::error::{EntityError, PropError};
use crate::profile::{
    context_for_schema, schema_for_context, BASE_SCHEMA, DATA_ENTITY_TYPES,
    METADATA_DESCRIPTOR_ID, METADATA_DESCRIPTOR_TYPE, PROFILE_URI, ROOT_ENTITY_ID,
    ROOT_ENTITY_TYPE,
};
use crate::schema::EntityDef;

/// Reserved keys start with this sigil.
pub const RESERVED_SIGIL: char = '@';

/// Which of the three disjoint graph partitions an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// The root dataset and the metadata descriptor. Always present,
    /// never removable.
    Default,
    /// A file or directory record.
    Data,
    /// A non-file metadata record (person, organization, license, plan).
    Contextual,
}

impl EntityKind {
    /// Kind for an ordinary (non-default) entity, derived from its type
    /// name.
    pub fn for_type(type_name: &str) -> EntityKind {
        if DATA_ENTITY_TYPES.contains(&type_name) {
            EntityKind::Data
        } else {
            EntityKind::Contextual
        }
    }
}

/// One typed record in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: String,
    type_name: String,
    context: String,
    kind: EntityKind,
    props: Map<String, Value>,
}

impl Entity {
    /// Create a Data or Contextual entity in the named schema. The kind
    /// is derived from the type name.
    pub fn new(
        id: impl Into<String>,
        type_name: impl Into<String>,
        schema: &str,
    ) -> Entity {
        let type_name = type_name.into();
        let kind = EntityKind::for_type(&type_name);
        Entity {
            id: id.into(),
            type_name,
            context: context_for_schema(schema),
            kind,
            props: Map::new(),
        }
    }

    /// The root dataset entity (`./`). One per crate, created by the
    /// graph itself.
    pub fn root_dataset() -> Entity {
        Entity {
            id: ROOT_ENTITY_ID.to_string(),
            type_name: ROOT_ENTITY_TYPE.to_string(),
            context: context_for_schema(BASE_SCHEMA),
            kind: EntityKind::Default,
            props: Map::new(),
        }
    }

    /// The metadata descriptor entity (`ro-crate-metadata.json`),
    /// pre-wired to declare profile conformance and point at the root.
    pub fn metadata_descriptor() -> Entity {
        let mut props = Map::new();
        props.insert(
            "conformsTo".to_string(),
            serde_json::json!({ "@id": PROFILE_URI }),
        );
        props.insert(
            "about".to_string(),
            serde_json::json!({ "@id": ROOT_ENTITY_ID }),
        );
        Entity {
            id: METADATA_DESCRIPTOR_ID.to_string(),
            type_name: METADATA_DESCRIPTOR_TYPE.to_string(),
            context: context_for_schema(BASE_SCHEMA),
            kind: EntityKind::Default,
            props,
        }
    }

    /// Privileged constructor used by deserialization: all reserved
    /// fields and the kind are supplied directly.
    pub(crate) fn from_parts(
        id: String,
        type_name: String,
        context: String,
        kind: EntityKind,
        props: Map<String, Value>,
    ) -> Entity {
        Entity {
            id,
            type_name,
            context,
            kind,
            props,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Name of the schema this entity's context points at, if the
    /// context is one of ours.
    pub fn schema_name(&self) -> Option<&str> {
        schema_for_context(&self.context)
    }

    /// Set a user property. Keys starting with the reserved sigil are
    /// rejected; everything else is accepted unchecked.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), PropError> {
        let key = key.into();
        if key.starts_with(RESERVED_SIGIL) {
            return Err(PropError::ReservedKey { key });
        }
        self.props.insert(key, value.into());
        Ok(())
    }

    /// Privileged path for the reserved fields. Only deserialization and
    /// construction call this.
    pub fn set_reserved(&mut self, key: &str, value: impl Into<String>) -> Result<(), PropError> {
        match key {
            "@id" => self.id = value.into(),
            "@type" => {
                self.type_name = value.into();
                if self.kind != EntityKind::Default {
                    self.kind = EntityKind::for_type(&self.type_name);
                }
            }
            "@context" => self.context = value.into(),
            _ => {
                return Err(PropError::NotReserved {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// Remove a user property. Reserved keys are guarded the same way as
    /// in [`Entity::set`].
    pub fn remove(&mut self, key: &str) -> Result<Option<Value>, PropError> {
        if key.starts_with(RESERVED_SIGIL) {
            return Err(PropError::ReservedKey {
                key: key.to_string(),
            });
        }
        Ok(self.props.remove(key))
    }

    /// User properties in insertion order.
    pub fn props(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.props.iter()
    }

    /// Reference object standing in for this entity when it appears as a
    /// property value of another entity.
    pub fn to_reference(&self) -> Value {
        serde_json::json!({ "@id": self.id })
    }

    /// Full JSON-LD object for this entity.
    ///
    /// Reserved fields come first, then user properties in insertion
    /// order. Nested full entity objects collapse to references, inside
    /// lists too; scalars and pre-formed references pass through.
    /// The base-schema context is implied by the document and not
    /// repeated per entity.
    pub fn project(&self) -> Value {
        let mut out = Map::new();
        out.insert("@id".to_string(), Value::String(self.id.clone()));
        out.insert("@type".to_string(), Value::String(self.type_name.clone()));
        if self.schema_name() != Some(BASE_SCHEMA) {
            out.insert("@context".to_string(), Value::String(self.context.clone()));
        }
        for (key, value) in &self.props {
            out.insert(key.clone(), collapse(value));
        }
        Value::Object(out)
    }

    /// Run the local schema check against a compiled definition.
    ///
    /// All three passes (unexpected, missing required, wrong type) run to
    /// completion and accumulate into one error; nothing short-circuits.
    pub fn check_props(&self, def: &EntityDef) -> Result<(), EntityError> {
        let mut err = EntityError::new(&self.id, &self.type_name);

        for key in self.props.keys() {
            if def.prop(key).is_none() {
                err.add(key, "unexpected property");
            }
        }

        for prop in def.props() {
            if prop.required && !self.props.contains_key(&prop.name) {
                err.add(&prop.name, "missing required property");
            }
        }

        for (key, value) in &self.props {
            if let Some(prop) = def.prop(key) {
                if !prop.pred.accepts(value) {
                    err.add(key, format!("wrong type: expected {}", prop.expected_type));
                }
            }
        }

        err.into_result()
    }
}

/// Collapse full entity objects to references; leave everything else
/// untouched.
fn collapse(value: &Value) -> Value {
    match value {
        Value::Object(map) if is_full_entity(map) => {
            serde_json::json!({ "@id": map["@id"].clone() })
        }
        Value::Array(items) => Value::Array(items.iter().map(collapse).collect()),
        other => other.clone(),
    }
}

/// A full entity object carries `@id` plus at least a type; a pre-formed
/// reference is exactly `{"@id": ...}` and passes through unchanged.
fn is_full_entity(map: &Map<String, Value>) -> bool {
    map.contains_key("@id") && map.contains_key("@type")
}

impl From<&Entity> for Value {
    fn from(entity: &Entity) -> Value {
        entity.project()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_from_type_name() {
        assert_eq!(EntityKind::for_type("File"), EntityKind::Data);
        assert_eq!(EntityKind::for_type("Dataset"), EntityKind::Data);
        assert_eq!(EntityKind::for_type("Person"), EntityKind::Contextual);
        assert_eq!(EntityKind::for_type("License"), EntityKind::Contextual);
    }

    #[test]
    fn set_rejects_reserved_keys() {
        let mut file = Entity::new("./data/a.txt", "File", "base");
        let err = file.set("@id", "./other").unwrap_err();
        assert_eq!(
            err,
            PropError::ReservedKey {
                key: "@id".to_string()
            }
        );
        assert!(file.set("name", "a.txt").is_ok());
    }

    #[test]
    fn set_reserved_is_the_privileged_path() {
        let mut file = Entity::new("./data/a.txt", "File", "base");
        file.set_reserved("@id", "./data/b.txt").unwrap();
        assert_eq!(file.id(), "./data/b.txt");

        let err = file.set_reserved("name", "b.txt").unwrap_err();
        assert_eq!(
            err,
            PropError::NotReserved {
                key: "name".to_string()
            }
        );
    }

    #[test]
    fn remove_guards_reserved_keys() {
        let mut file = Entity::new("./data/a.txt", "File", "base");
        file.set("name", "a.txt").unwrap();
        assert!(file.remove("@type").is_err());
        assert_eq!(file.remove("name").unwrap(), Some(json!("a.txt")));
        assert_eq!(file.remove("name").unwrap(), None);
    }

    #[test]
    fn reference_shape() {
        let person = Entity::new("https://orcid.org/0000-0002-1825-0097", "Person", "base");
        assert_eq!(
            person.to_reference(),
            json!({ "@id": "https://orcid.org/0000-0002-1825-0097" })
        );
    }

    #[test]
    fn project_collapses_nested_entities() {
        let mut person = Entity::new("#alice", "Person", "base");
        person.set("name", "Alice").unwrap();

        let mut file = Entity::new("./data/a.txt", "File", "base");
        file.set("author", &person).unwrap();
        file.set("about", json!({ "@id": "./" })).unwrap();
        file.set("keywords", json!(["raw", "csv"])).unwrap();

        let projected = file.project();
        assert_eq!(projected["author"], json!({ "@id": "#alice" }));
        // Pre-formed reference passes through unchanged.
        assert_eq!(projected["about"], json!({ "@id": "./" }));
        assert_eq!(projected["keywords"], json!(["raw", "csv"]));
    }

    #[test]
    fn project_collapses_entities_inside_lists() {
        let mut a = Entity::new("#a", "Person", "base");
        a.set("name", "A").unwrap();
        let mut root = Entity::root_dataset();
        root.set("creator", json!([Value::from(&a), "freeform credit"]))
            .unwrap();

        let projected = root.project();
        assert_eq!(
            projected["creator"],
            json!([{ "@id": "#a" }, "freeform credit"])
        );
    }

    #[test]
    fn project_orders_reserved_fields_first() {
        let mut file = Entity::new("./data/a.txt", "File", "base");
        file.set("name", "a.txt").unwrap();
        let projected = file.project();
        let keys: Vec<&String> = projected.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["@id", "@type", "name"]);
    }

    #[test]
    fn project_emits_context_for_non_base_schemas() {
        let plan = Entity::new("#dmp:1", "DMP", "amed");
        let projected = plan.project();
        assert_eq!(
            projected["@context"],
            json!(context_for_schema("amed"))
        );

        let file = Entity::new("./data/a.txt", "File", "base");
        assert!(file.project().get("@context").is_none());
    }

    #[test]
    fn metadata_descriptor_is_prewired() {
        let meta = Entity::metadata_descriptor();
        assert_eq!(meta.kind(), EntityKind::Default);
        assert_eq!(meta.get("about"), Some(&json!({ "@id": "./" })));
        assert_eq!(meta.get("conformsTo"), Some(&json!({ "@id": PROFILE_URI })));
    }
}
