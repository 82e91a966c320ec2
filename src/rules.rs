//! Cross-entity governance rules.
//!
//! A rule sees one entity plus the whole graph and reports at most one
//! [`EntityError`]. Rules are registered per (schema, entity type); a type
//! with no rule has no governance obligations beyond its property schema.
//! The base profile rule set shipped here covers file inventories, plan
//! aggregation, researcher and organization identifiers, and the root's
//! containment closure.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::Value;

use crate::entity::Entity;
use crate::error::EntityError;
use crate::graph::CrateGraph;
use crate::ident::{
    is_absolute_url, is_erad_researcher_number, is_valid_orcid, is_valid_ror, RemoteLookup,
    ORCID_URL_PREFIX,
};
use crate::profile::{BASE_SCHEMA, PROFILE_URI, ROOT_ENTITY_ID};
use crate::units::{sum_bytes, ByteSize};

/// Everything a rule may consult besides its own entity.
pub struct RuleContext<'a> {
    pub graph: &'a CrateGraph,
    /// Network seam; `None` degrades remote checks to shape-only.
    pub lookup: Option<&'a dyn RemoteLookup>,
}

/// One governance rule. Implementations must be callable from any worker
/// thread.
pub trait GovernanceRule: Send + Sync {
    fn check(&self, entity: &Entity, ctx: &RuleContext<'_>) -> Result<(), EntityError>;
}

/// Registry of rules keyed by (schema, entity type).
#[derive(Default)]
pub struct RuleSet {
    rules: HashMap<(String, String), Box<dyn GovernanceRule>>,
}

impl RuleSet {
    /// An empty rule set: every entity passes CROSS_CHECK vacuously.
    pub fn empty() -> RuleSet {
        RuleSet::default()
    }

    /// The base profile rules.
    pub fn base() -> RuleSet {
        let mut set = RuleSet::default();
        set.register(BASE_SCHEMA, "Dataset", RootContainment);
        set.register(BASE_SCHEMA, "CreativeWork", DescriptorWiring);
        set.register(BASE_SCHEMA, "File", FileInventory);
        set.register(BASE_SCHEMA, "DMP", PlanConsistency);
        set.register(BASE_SCHEMA, "Person", ResearcherIdentity);
        set.register(BASE_SCHEMA, "Organization", OrganizationRegistry);
        set
    }

    pub fn register(
        &mut self,
        schema: impl Into<String>,
        type_name: impl Into<String>,
        rule: impl GovernanceRule + 'static,
    ) {
        self.rules
            .insert((schema.into(), type_name.into()), Box::new(rule));
    }

    pub fn rule_for(&self, schema: &str, type_name: &str) -> Option<&dyn GovernanceRule> {
        self.rules
            .get(&(schema.to_string(), type_name.to_string()))
            .map(Box::as_ref)
    }
}

/// `@id` a reference or full entity object points at.
fn ref_id(value: &Value) -> Option<&str> {
    value.get("@id").and_then(Value::as_str)
}

/// Entities of one type the given property value references.
fn resolve_ref<'g>(graph: &'g CrateGraph, value: &Value, type_name: &str) -> Vec<&'g Entity> {
    match ref_id(value) {
        Some(id) => graph
            .get_by_id(id)
            .into_iter()
            .filter(|e| e.type_name() == type_name)
            .collect(),
        None => Vec::new(),
    }
}

fn is_iso_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Sizes of all files bound to a plan entry, skipping sizes the local
/// check already flagged as unparseable.
fn plan_file_sizes(graph: &CrateGraph, dmp_id: &str) -> Vec<ByteSize> {
    graph
        .data_entities()
        .iter()
        .filter(|e| {
            e.get("dmpDataNumber")
                .and_then(ref_id)
                .map(|id| id == dmp_id)
                .unwrap_or(false)
        })
        .filter_map(|e| e.get("contentSize"))
        .filter_map(Value::as_str)
        .filter_map(ByteSize::parse)
        .collect()
}

/// Root dataset: containment closure and date formats.
///
/// Every Data entity must be reachable from the root through `hasPart`
/// lists; an inventory entry the root never mentions is unreferenced
/// data.
struct RootContainment;

impl GovernanceRule for RootContainment {
    fn check(&self, entity: &Entity, ctx: &RuleContext<'_>) -> Result<(), EntityError> {
        let mut err = EntityError::new(entity.id(), entity.type_name());

        for prop in ["dateCreated", "datePublished"] {
            if let Some(value) = entity.get(prop).and_then(Value::as_str) {
                if !is_iso_date(value) {
                    err.add(prop, "is not an ISO 8601 date");
                }
            }
        }

        if entity.id() == ROOT_ENTITY_ID {
            let reachable = containment_closure(ctx.graph);
            for data in ctx.graph.data_entities() {
                if !reachable.contains(&data.id().to_string()) {
                    err.add(
                        "hasPart",
                        format!("\"{}\" is not reachable from the root", data.id()),
                    );
                }
            }
        }

        err.into_result()
    }
}

/// Ids reachable from the root through `hasPart`, following Dataset
/// entities transitively.
fn containment_closure(graph: &CrateGraph) -> Vec<String> {
    let mut reachable: Vec<String> = Vec::new();
    let mut queue: Vec<&Entity> = vec![graph.root()];
    while let Some(entity) = queue.pop() {
        let parts = match entity.get("hasPart") {
            Some(Value::Array(parts)) => parts.as_slice(),
            _ => continue,
        };
        for part in parts {
            let Some(id) = ref_id(part) else { continue };
            if reachable.iter().any(|r| r == id) {
                continue;
            }
            reachable.push(id.to_string());
            for child in graph.get_by_id(id) {
                if child.type_name() == "Dataset" {
                    queue.push(child);
                }
            }
        }
    }
    reachable
}

/// Metadata descriptor: must point at the root and declare the profile.
struct DescriptorWiring;

impl GovernanceRule for DescriptorWiring {
    fn check(&self, entity: &Entity, _ctx: &RuleContext<'_>) -> Result<(), EntityError> {
        let mut err = EntityError::new(entity.id(), entity.type_name());

        if entity.get("about").and_then(ref_id) != Some(ROOT_ENTITY_ID) {
            err.add("about", "must reference the root dataset");
        }
        if entity.get("conformsTo").and_then(ref_id) != Some(PROFILE_URI) {
            err.add("conformsTo", "must reference the governance profile");
        }

        err.into_result()
    }
}

/// File inventory entries: size literals, fetchable URLs, and plan
/// binding.
struct FileInventory;

impl GovernanceRule for FileInventory {
    fn check(&self, entity: &Entity, ctx: &RuleContext<'_>) -> Result<(), EntityError> {
        let mut err = EntityError::new(entity.id(), entity.type_name());

        match entity.get("contentSize").and_then(Value::as_str) {
            Some(size) if ByteSize::parse(size).is_none() => {
                err.add("contentSize", "is not a size literal");
            }
            _ => {}
        }

        if let Some(url) = entity.get("url").and_then(Value::as_str) {
            if !is_absolute_url(url) {
                err.add("url", "is not an absolute URL");
            } else if let Some(lookup) = ctx.lookup {
                if !lookup.is_reachable(url) {
                    err.add("url", "is not reachable");
                }
            }
        }

        if let Some(binding) = entity.get("dmpDataNumber") {
            if resolve_ref(ctx.graph, binding, "DMP").is_empty() {
                err.add("dmpDataNumber", "does not resolve to a plan entry in this crate");
            }
        }

        err.into_result()
    }
}

/// Plan entries: conditional requirements and volume reconciliation.
struct PlanConsistency;

impl GovernanceRule for PlanConsistency {
    fn check(&self, entity: &Entity, ctx: &RuleContext<'_>) -> Result<(), EntityError> {
        let mut err = EntityError::new(entity.id(), entity.type_name());

        let access = entity.get("accessRights").and_then(Value::as_str);

        if matches!(access, Some("restricted access") | Some("embargoed access"))
            && entity.get("contactPoint").is_none()
        {
            err.add(
                "contactPoint",
                format!("required when accessRights is \"{}\"", access.unwrap_or_default()),
            );
        }

        if access == Some("embargoed access") {
            match entity.get("availabilityStarts").and_then(Value::as_str) {
                None => err.add(
                    "availabilityStarts",
                    "required when accessRights is \"embargoed access\"",
                ),
                Some(date) => match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
                    Err(_) => err.add("availabilityStarts", "is not an ISO 8601 date"),
                    Ok(date) if date < chrono::Utc::now().date_naive() => {
                        err.add("availabilityStarts", "must not be in the past");
                    }
                    Ok(_) => {}
                },
            }
        } else if entity.get("availabilityStarts").is_some() {
            err.add(
                "availabilityStarts",
                "only allowed when accessRights is \"embargoed access\"",
            );
        }

        if access == Some("open access") && entity.get("license").is_none() {
            err.add("license", "required when accessRights is \"open access\"");
        }

        if let Some(declared) = entity
            .get("contentSize")
            .and_then(Value::as_str)
            .and_then(ByteSize::parse)
        {
            let total = sum_bytes(&plan_file_sizes(ctx.graph, entity.id()));
            if declared.is_sentinel() {
                if total < declared.bytes() {
                    err.add(
                        "contentSize",
                        "declared over100GB but bound files total less than 100GB",
                    );
                }
            } else if total > declared.bytes() {
                err.add(
                    "contentSize",
                    format!(
                        "bound files total {} bytes, over the declared {}",
                        total, declared
                    ),
                );
            }
        }

        err.into_result()
    }
}

/// Researchers: checksummed identifier, resolvable affiliation.
struct ResearcherIdentity;

impl GovernanceRule for ResearcherIdentity {
    fn check(&self, entity: &Entity, ctx: &RuleContext<'_>) -> Result<(), EntityError> {
        let mut err = EntityError::new(entity.id(), entity.type_name());

        if !entity.id().starts_with(ORCID_URL_PREFIX) {
            err.add("@id", "is not a researcher identifier URL");
        } else if !is_valid_orcid(entity.id()) {
            err.add("@id", "has an invalid identifier checksum");
        }

        if let Some(affiliation) = entity.get("affiliation") {
            if resolve_ref(ctx.graph, affiliation, "Organization").is_empty() {
                err.add(
                    "affiliation",
                    "does not resolve to an Organization in this crate",
                );
            }
        }

        if let Some(number) = entity.get("eradResearcherNumber").and_then(Value::as_str) {
            if !is_erad_researcher_number(number) {
                err.add("eradResearcherNumber", "must be eight digits");
            }
        }

        err.into_result()
    }
}

/// Organizations: registry-shaped id and canonical name agreement.
struct OrganizationRegistry;

impl GovernanceRule for OrganizationRegistry {
    fn check(&self, entity: &Entity, ctx: &RuleContext<'_>) -> Result<(), EntityError> {
        let mut err = EntityError::new(entity.id(), entity.type_name());

        if !is_valid_ror(entity.id()) {
            err.add("@id", "is not an organization registry URL");
        } else if let Some(lookup) = ctx.lookup {
            if let Some(registered) = lookup.registered_name(entity.id()) {
                let name = entity.get("name").and_then(Value::as_str).unwrap_or_default();
                if name != registered {
                    err.add(
                        "name",
                        format!("does not match registered name \"{}\"", registered),
                    );
                }
            }
        }

        err.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StubLookup {
        reachable: bool,
        name: Option<&'static str>,
    }

    impl RemoteLookup for StubLookup {
        fn is_reachable(&self, _url: &str) -> bool {
            self.reachable
        }
        fn registered_name(&self, _ror_id: &str) -> Option<String> {
            self.name.map(String::from)
        }
    }

    fn ctx(graph: &CrateGraph) -> RuleContext<'_> {
        RuleContext {
            graph,
            lookup: None,
        }
    }

    fn graph_with(entities: Vec<Entity>) -> CrateGraph {
        let mut graph = CrateGraph::new();
        graph.root_mut().set("name", "pkg").unwrap();
        for entity in entities {
            graph.add(entity).unwrap();
        }
        graph
    }

    fn file(id: &str, size: &str, dmp: Option<&str>) -> Entity {
        let mut f = Entity::new(id, "File", "base");
        f.set("name", id.trim_start_matches("./")).unwrap();
        f.set("contentSize", size).unwrap();
        if let Some(dmp) = dmp {
            f.set("dmpDataNumber", json!({ "@id": dmp })).unwrap();
        }
        f
    }

    fn dmp(id: &str, access: &str) -> Entity {
        let mut d = Entity::new(id, "DMP", "base");
        d.set("dataNumber", 1).unwrap();
        d.set("name", "raw data").unwrap();
        d.set("description", "sensor readings").unwrap();
        d.set("accessRights", access).unwrap();
        d
    }

    #[test]
    fn rule_set_lookup() {
        let set = RuleSet::base();
        assert!(set.rule_for("base", "File").is_some());
        assert!(set.rule_for("base", "License").is_none());
        assert!(set.rule_for("amed", "File").is_none());
        assert!(RuleSet::empty().rule_for("base", "File").is_none());
    }

    #[test]
    fn file_size_literal_is_checked() {
        let graph = graph_with(vec![]);
        let bad = file("./data/a.txt", "fifteen gigabytes", None);
        let err = FileInventory.check(&bad, &ctx(&graph)).unwrap_err();
        assert_eq!(err.reasons[0].0, "contentSize");

        let good = file("./data/a.txt", "15GB", None);
        assert!(FileInventory.check(&good, &ctx(&graph)).is_ok());
    }

    #[test]
    fn file_url_must_be_absolute_and_reachable() {
        let graph = graph_with(vec![]);
        let mut f = file("./data/a.txt", "1GB", None);
        f.set("url", "./local/path").unwrap();
        let err = FileInventory.check(&f, &ctx(&graph)).unwrap_err();
        assert_eq!(err.reasons[0].0, "url");

        let mut f = file("./data/a.txt", "1GB", None);
        f.set("url", "https://example.com/a.txt").unwrap();
        let lookup = StubLookup {
            reachable: false,
            name: None,
        };
        let rule_ctx = RuleContext {
            graph: &graph,
            lookup: Some(&lookup),
        };
        let err = FileInventory.check(&f, &rule_ctx).unwrap_err();
        assert_eq!(err.reasons[0], ("url".to_string(), "is not reachable".to_string()));
    }

    #[test]
    fn file_plan_binding_must_resolve() {
        let graph = graph_with(vec![dmp("#dmp:1", "open access")]);
        let bound = file("./data/a.txt", "1GB", Some("#dmp:1"));
        assert!(FileInventory.check(&bound, &ctx(&graph)).is_ok());

        let dangling = file("./data/a.txt", "1GB", Some("#dmp:9"));
        let err = FileInventory.check(&dangling, &ctx(&graph)).unwrap_err();
        assert_eq!(err.reasons[0].0, "dmpDataNumber");
    }

    #[test]
    fn plan_volume_reconciliation() {
        let graph = graph_with(vec![
            file("./data/a.bin", "15GB", Some("#dmp:1")),
            file("./data/b.bin", "10GB", Some("#dmp:1")),
        ]);

        // 25GB against a declared 100GB bucket: fine.
        let mut plan = dmp("#dmp:1", "restricted access");
        plan.set("contactPoint", json!({ "@id": "#contact" })).unwrap();
        plan.set("contentSize", "100GB").unwrap();
        assert!(PlanConsistency.check(&plan, &ctx(&graph)).is_ok());

        // 25GB against a declared 10GB bucket: over.
        plan.set("contentSize", "10GB").unwrap();
        let err = PlanConsistency.check(&plan, &ctx(&graph)).unwrap_err();
        assert_eq!(err.reasons[0].0, "contentSize");

        // Declared over100GB but only 25GB bound: under.
        plan.set("contentSize", "over100GB").unwrap();
        let err = PlanConsistency.check(&plan, &ctx(&graph)).unwrap_err();
        assert_eq!(err.reasons[0].0, "contentSize");
    }

    #[test]
    fn plan_sentinel_file_forces_large_volume() {
        let graph = graph_with(vec![file("./data/huge.bin", "over100GB", Some("#dmp:1"))]);
        let mut plan = dmp("#dmp:1", "open access");
        plan.set("license", json!({ "@id": "#license" })).unwrap();
        plan.set("contentSize", "over100GB").unwrap();
        assert!(PlanConsistency.check(&plan, &ctx(&graph)).is_ok());
    }

    #[test]
    fn plan_empty_file_list_sums_to_zero() {
        let graph = graph_with(vec![]);
        assert_eq!(sum_bytes(&plan_file_sizes(&graph, "#dmp:1")), 0);
    }

    #[test]
    fn plan_conditional_requirements() {
        let graph = graph_with(vec![]);

        let restricted = dmp("#dmp:1", "restricted access");
        let err = PlanConsistency.check(&restricted, &ctx(&graph)).unwrap_err();
        assert_eq!(err.reasons[0].0, "contactPoint");

        let embargoed = dmp("#dmp:1", "embargoed access");
        let err = PlanConsistency.check(&embargoed, &ctx(&graph)).unwrap_err();
        assert!(err
            .reasons
            .iter()
            .any(|(p, r)| p == "availabilityStarts" && r.contains("required")));

        let mut stale = dmp("#dmp:1", "embargoed access");
        stale.set("contactPoint", json!({ "@id": "#contact" })).unwrap();
        stale.set("availabilityStarts", "2001-01-01").unwrap();
        let err = PlanConsistency.check(&stale, &ctx(&graph)).unwrap_err();
        assert!(err
            .reasons
            .iter()
            .any(|(p, r)| p == "availabilityStarts" && r.contains("past")));

        let mut open = dmp("#dmp:1", "open access");
        open.set("availabilityStarts", "2030-01-01").unwrap();
        let err = PlanConsistency.check(&open, &ctx(&graph)).unwrap_err();
        assert!(err
            .reasons
            .iter()
            .any(|(p, r)| p == "availabilityStarts" && r.contains("only allowed")));
    }

    #[test]
    fn researcher_identifier_is_checksummed() {
        let org_id = "https://ror.org/04ksd4g47";
        let mut org = Entity::new(org_id, "Organization", "base");
        org.set("name", "Example Institute").unwrap();
        let graph = graph_with(vec![org]);

        let mut alice = Entity::new(
            "https://orcid.org/0000-0002-1825-0097",
            "Person",
            "base",
        );
        alice.set("affiliation", json!({ "@id": org_id })).unwrap();
        assert!(ResearcherIdentity.check(&alice, &ctx(&graph)).is_ok());

        let mut mallory = Entity::new(
            "https://orcid.org/0000-0002-1825-0079",
            "Person",
            "base",
        );
        mallory.set("affiliation", json!({ "@id": org_id })).unwrap();
        let err = ResearcherIdentity.check(&mallory, &ctx(&graph)).unwrap_err();
        assert!(err.reasons[0].1.contains("checksum"));

        let mut bare = Entity::new("#bob", "Person", "base");
        bare.set("affiliation", json!({ "@id": org_id })).unwrap();
        let err = ResearcherIdentity.check(&bare, &ctx(&graph)).unwrap_err();
        assert_eq!(err.reasons[0].0, "@id");
    }

    #[test]
    fn researcher_affiliation_must_resolve() {
        let graph = graph_with(vec![]);
        let mut alice = Entity::new(
            "https://orcid.org/0000-0002-1825-0097",
            "Person",
            "base",
        );
        alice
            .set("affiliation", json!({ "@id": "https://ror.org/04ksd4g47" }))
            .unwrap();
        let err = ResearcherIdentity.check(&alice, &ctx(&graph)).unwrap_err();
        assert_eq!(err.reasons[0].0, "affiliation");
    }

    #[test]
    fn organization_name_reconciles_with_registry() {
        let graph = graph_with(vec![]);
        let mut org = Entity::new("https://ror.org/04ksd4g47", "Organization", "base");
        org.set("name", "Example Institute").unwrap();

        let agreeing = StubLookup {
            reachable: true,
            name: Some("Example Institute"),
        };
        let rule_ctx = RuleContext {
            graph: &graph,
            lookup: Some(&agreeing),
        };
        assert!(OrganizationRegistry.check(&org, &rule_ctx).is_ok());

        let disagreeing = StubLookup {
            reachable: true,
            name: Some("Canonical Institute"),
        };
        let rule_ctx = RuleContext {
            graph: &graph,
            lookup: Some(&disagreeing),
        };
        let err = OrganizationRegistry.check(&org, &rule_ctx).unwrap_err();
        assert_eq!(err.reasons.len(), 1);
        assert_eq!(err.reasons[0].0, "name");
        assert!(err.reasons[0].1.contains("Canonical Institute"));
    }

    #[test]
    fn organization_id_shape_without_lookup() {
        let graph = graph_with(vec![]);
        let mut org = Entity::new("#org", "Organization", "base");
        org.set("name", "Example Institute").unwrap();
        let err = OrganizationRegistry.check(&org, &ctx(&graph)).unwrap_err();
        assert_eq!(err.reasons[0].0, "@id");
    }

    #[test]
    fn root_containment_closure() {
        let mut dir = Entity::new("./data/", "Dataset", "base");
        dir.set("name", "data").unwrap();
        dir.set("hasPart", json!([{ "@id": "./data/a.txt" }])).unwrap();
        let graph = {
            let mut g = graph_with(vec![
                file("./data/a.txt", "1GB", None),
                file("./orphan.txt", "1GB", None),
            ]);
            g.add(dir).unwrap();
            g.root_mut()
                .set("hasPart", json!([{ "@id": "./data/" }]))
                .unwrap();
            g
        };

        let root = graph.root().clone();
        let err = RootContainment.check(&root, &ctx(&graph)).unwrap_err();
        assert_eq!(err.reasons.len(), 1);
        assert!(err.reasons[0].1.contains("./orphan.txt"));
    }

    #[test]
    fn descriptor_wiring() {
        let graph = graph_with(vec![]);
        let descriptor = graph.metadata_descriptor().clone();
        assert!(DescriptorWiring.check(&descriptor, &ctx(&graph)).is_ok());

        let mut detached = Entity::metadata_descriptor();
        detached.set("about", json!({ "@id": "#elsewhere" })).unwrap();
        let err = DescriptorWiring.check(&detached, &ctx(&graph)).unwrap_err();
        assert_eq!(err.reasons[0].0, "about");
    }
}
