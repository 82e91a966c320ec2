//! Schema definitions and the type-expression grammar.
//!
//! Property definitions are authored per schema as YAML, validated against
//! an embedded meta-schema on load, and compiled once into runtime
//! predicates. The registry is a process-wide cache keyed by schema name:
//! a schema is parsed on first load and immutable afterwards, so any
//! number of concurrent validations may read it.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock};

use serde_json::Value;

use crate::error::ConfigError;
use crate::profile::BASE_SCHEMA;

/// Meta-schema every definition file must satisfy.
const META_SCHEMA: &str = include_str!("../schemas/meta-schema.json");

/// Definition files shipped with the crate.
fn builtin_source(name: &str) -> Option<&'static str> {
    match name {
        "base" => Some(include_str!("../schemas/base.yml")),
        _ => None,
    }
}

/// A compiled predicate over property values.
#[derive(Debug, Clone, PartialEq)]
pub enum TypePred {
    Any,
    Str,
    Bool,
    Int,
    Float,
    /// Every element of a list value must satisfy the inner predicate.
    List(Box<TypePred>),
    /// The value must satisfy at least one branch.
    Union(Vec<TypePred>),
    /// The value satisfies the inner predicate or is null.
    Optional(Box<TypePred>),
    /// The value equals one of the literal strings.
    Literal(Vec<String>),
    /// The value is an entity of the named type: either a full entity
    /// object whose `@type` matches, or a reference object pointing at
    /// one.
    EntityRef(String),
}

impl TypePred {
    /// Whether a property value satisfies this predicate.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            TypePred::Any => true,
            TypePred::Str => value.is_string(),
            TypePred::Bool => value.is_boolean(),
            TypePred::Int => value.is_i64() || value.is_u64(),
            TypePred::Float => value.is_number(),
            TypePred::List(inner) => match value {
                Value::Array(items) => items.iter().all(|v| inner.accepts(v)),
                _ => false,
            },
            TypePred::Union(branches) => branches.iter().any(|b| b.accepts(value)),
            TypePred::Optional(inner) => value.is_null() || inner.accepts(value),
            TypePred::Literal(choices) => value
                .as_str()
                .map(|s| choices.iter().any(|c| c == s))
                .unwrap_or(false),
            TypePred::EntityRef(type_name) => match value {
                Value::Object(map) => {
                    let is_reference =
                        map.len() == 1 && map.get("@id").map(Value::is_string).unwrap_or(false);
                    let is_instance = map
                        .get("@type")
                        .and_then(Value::as_str)
                        .map(|t| t == type_name)
                        .unwrap_or(false);
                    is_reference || is_instance
                }
                _ => false,
            },
        }
    }
}

/// One property of an entity type.
#[derive(Debug, Clone)]
pub struct PropDef {
    pub name: String,
    /// The raw type expression, kept for error messages.
    pub expected_type: String,
    pub required: bool,
    pub description: String,
    pub example: Option<Value>,
    /// Compiled form of `expected_type`.
    pub pred: TypePred,
}

/// Compiled definition of one entity type.
#[derive(Debug, Clone)]
pub struct EntityDef {
    pub type_name: String,
    pub description: String,
    props: Vec<PropDef>,
}

impl EntityDef {
    pub fn prop(&self, name: &str) -> Option<&PropDef> {
        self.props.iter().find(|p| p.name == name)
    }

    pub fn props(&self) -> impl Iterator<Item = &PropDef> {
        self.props.iter()
    }
}

/// All entity types of one schema.
#[derive(Debug)]
pub struct SchemaDef {
    pub name: String,
    types: Vec<EntityDef>,
}

impl SchemaDef {
    pub fn entity(&self, type_name: &str) -> Option<&EntityDef> {
        self.types.iter().find(|t| t.type_name == type_name)
    }

    pub fn types(&self) -> impl Iterator<Item = &EntityDef> {
        self.types.iter()
    }
}

fn cache() -> &'static RwLock<HashMap<String, Arc<SchemaDef>>> {
    static CACHE: OnceLock<RwLock<HashMap<String, Arc<SchemaDef>>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Load a schema by name.
///
/// Served from the cache after the first load. Unknown names are a
/// configuration error.
pub fn load_schema(name: &str) -> Result<Arc<SchemaDef>, ConfigError> {
    if let Some(def) = cache().read().expect("schema cache poisoned").get(name) {
        return Ok(Arc::clone(def));
    }

    let source = builtin_source(name).ok_or_else(|| ConfigError::UnknownSchema {
        name: name.to_string(),
    })?;
    let def = compile_schema(name, source)?;
    Ok(insert_once(def))
}

/// Load a schema definition file from disk, registering it under its file
/// stem. A name already in the cache keeps its first definition.
pub fn load_schema_file(path: &Path) -> Result<Arc<SchemaDef>, ConfigError> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    if name.is_empty() {
        return Err(ConfigError::UnknownSchema {
            name: path.display().to_string(),
        });
    }

    if let Some(def) = cache().read().expect("schema cache poisoned").get(&name) {
        return Ok(Arc::clone(def));
    }

    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::SchemaRead {
        name: name.clone(),
        source,
    })?;
    let def = compile_schema(&name, &source)?;
    Ok(insert_once(def))
}

/// Look up one entity type across a schema, with the usual fallback to
/// the base schema.
pub fn lookup_entity(schema: &str, type_name: &str) -> Result<Arc<SchemaDef>, ConfigError> {
    let def = load_schema(schema)?;
    if def.entity(type_name).is_some() {
        return Ok(def);
    }
    if schema != BASE_SCHEMA {
        let base = load_schema(BASE_SCHEMA)?;
        if base.entity(type_name).is_some() {
            return Ok(base);
        }
    }
    Err(ConfigError::UnknownEntityType {
        schema: schema.to_string(),
        type_name: type_name.to_string(),
    })
}

/// Resolve a type expression in the context of a schema.
///
/// Entity type tokens resolve first within the named schema, then within
/// the base schema. Unresolvable expressions are configuration errors.
pub fn resolve_type(expr: &str, schema: &str) -> Result<TypePred, ConfigError> {
    let known = known_types(schema)?;
    parse_expr(expr, &known).ok_or_else(|| ConfigError::UnresolvableType {
        schema: schema.to_string(),
        expr: expr.to_string(),
    })
}

fn insert_once(def: SchemaDef) -> Arc<SchemaDef> {
    let mut cache = cache().write().expect("schema cache poisoned");
    let entry = cache.entry(def.name.clone()).or_insert_with(|| Arc::new(def));
    Arc::clone(entry)
}

/// Entity type names visible from a schema: its own plus the base
/// schema's.
fn known_types(schema: &str) -> Result<HashSet<String>, ConfigError> {
    let mut known = HashSet::new();
    let def = load_schema(schema)?;
    known.extend(def.types().map(|t| t.type_name.clone()));
    if schema != BASE_SCHEMA {
        let base = load_schema(BASE_SCHEMA)?;
        known.extend(base.types().map(|t| t.type_name.clone()));
    }
    Ok(known)
}

fn compile_schema(name: &str, source: &str) -> Result<SchemaDef, ConfigError> {
    let raw: Value = serde_yaml::from_str(source).map_err(|source| ConfigError::InvalidYaml {
        name: name.to_string(),
        source,
    })?;
    check_meta_schema(name, &raw)?;
    tracing::debug!(schema = name, "compiling schema definitions");

    // Two passes: collect type names first so forward references within
    // the file resolve, then compile property predicates.
    let types_raw = raw.as_object().expect("meta-schema guarantees an object");
    let mut known: HashSet<String> = types_raw.keys().cloned().collect();
    if name != BASE_SCHEMA {
        let base = load_schema(BASE_SCHEMA)?;
        known.extend(base.types().map(|t| t.type_name.clone()));
    }

    let mut types = Vec::new();
    for (type_name, body) in types_raw {
        let description = body["description"].as_str().unwrap_or_default().to_string();
        let mut props = Vec::new();
        if let Some(raw_props) = body["props"].as_object() {
            for (prop_name, prop_body) in raw_props {
                let expected_type = prop_body["expected_type"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let pred = parse_expr(&expected_type, &known).ok_or_else(|| {
                    ConfigError::UnresolvableType {
                        schema: name.to_string(),
                        expr: expected_type.clone(),
                    }
                })?;
                props.push(PropDef {
                    name: prop_name.clone(),
                    pred,
                    expected_type,
                    required: prop_body["required"].as_bool().unwrap_or(false),
                    description: prop_body["description"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    example: prop_body.get("example").cloned(),
                });
            }
        }
        types.push(EntityDef {
            type_name: type_name.clone(),
            description,
            props,
        });
    }

    Ok(SchemaDef {
        name: name.to_string(),
        types,
    })
}

fn check_meta_schema(name: &str, raw: &Value) -> Result<(), ConfigError> {
    let meta: Value = serde_json::from_str(META_SCHEMA).expect("embedded meta-schema is valid");
    let validator = jsonschema::validator_for(&meta).expect("embedded meta-schema compiles");

    let violations: Vec<String> = validator
        .iter_errors(raw)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MetaSchema {
            name: name.to_string(),
            violations,
        })
    }
}

/// Recursive descent over the type grammar:
/// primitives, `List[T]`, `Union[T,...]`, `Optional[T]`, `Literal[...]`,
/// or a known entity type name.
fn parse_expr(expr: &str, known: &HashSet<String>) -> Option<TypePred> {
    let expr = expr.trim();
    match expr {
        "str" => return Some(TypePred::Str),
        "bool" => return Some(TypePred::Bool),
        "int" => return Some(TypePred::Int),
        "float" => return Some(TypePred::Float),
        "any" => return Some(TypePred::Any),
        _ => {}
    }

    if let Some(inner) = bracketed(expr, "List") {
        return Some(TypePred::List(Box::new(parse_expr(inner, known)?)));
    }
    if let Some(inner) = bracketed(expr, "Optional") {
        return Some(TypePred::Optional(Box::new(parse_expr(inner, known)?)));
    }
    if let Some(inner) = bracketed(expr, "Union") {
        let branches = split_top_level(inner)
            .into_iter()
            .map(|part| parse_expr(part, known))
            .collect::<Option<Vec<_>>>()?;
        if branches.is_empty() {
            return None;
        }
        return Some(TypePred::Union(branches));
    }
    if let Some(inner) = bracketed(expr, "Literal") {
        let choices: Vec<String> = split_top_level(inner)
            .into_iter()
            .map(unquote)
            .collect();
        if choices.is_empty() {
            return None;
        }
        return Some(TypePred::Literal(choices));
    }

    if known.contains(expr) {
        return Some(TypePred::EntityRef(expr.to_string()));
    }
    None
}

/// The contents of `Head[...]`, or `None` if `expr` is not that shape.
fn bracketed<'a>(expr: &'a str, head: &str) -> Option<&'a str> {
    expr.strip_prefix(head)?
        .strip_prefix('[')?
        .strip_suffix(']')
}

/// Split on commas at bracket depth zero.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(s)
        .to_string()
}
