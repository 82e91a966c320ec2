//! The two-phase validation pipeline.
//!
//! One run walks the whole graph twice: LOCAL_CHECK confirms every
//! entity's property-schema conformance, CROSS_CHECK evaluates governance
//! rules with the whole graph in scope. Neither phase stops at a failing
//! entity; failures aggregate in graph order and the two phases report
//! separately. Configuration errors abort the run instead of being
//! recorded as data failures.

use serde::Serialize;

use crate::error::{ConfigError, EntityError};
use crate::graph::{entity_def, CrateGraph};
use crate::ident::RemoteLookup;
use crate::profile::BASE_SCHEMA;
use crate::rules::{RuleContext, RuleSet};

/// Phases of one validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Init,
    LocalCheck,
    CrossCheck,
    Passed,
    Failed,
}

/// Outcome of a validation run.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// Terminal state: `Passed` or `Failed`.
    pub state: RunState,
    /// Local schema failures, one per failing entity, in graph order.
    pub local: Vec<EntityError>,
    /// Governance failures, one per failing entity, in graph order.
    pub cross: Vec<EntityError>,
}

/// One failing (entity, property, reason) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub entity_id: String,
    pub prop: String,
    pub reason: String,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.state == RunState::Passed
    }

    /// Flatten both phases into per-property records, local first.
    pub fn records(&self) -> Vec<FailureRecord> {
        self.local
            .iter()
            .chain(self.cross.iter())
            .flat_map(|err| {
                err.reasons.iter().map(|(prop, reason)| FailureRecord {
                    entity_id: err.id.clone(),
                    prop: prop.clone(),
                    reason: reason.clone(),
                })
            })
            .collect()
    }
}

/// Pipeline configuration: which rules run, how the network is reached,
/// and an optional entity-id subset for CROSS_CHECK.
pub struct ValidationPipeline<'a> {
    rules: &'a RuleSet,
    lookup: Option<&'a dyn RemoteLookup>,
    targets: Option<Vec<String>>,
}

impl<'a> ValidationPipeline<'a> {
    pub fn new(rules: &'a RuleSet) -> ValidationPipeline<'a> {
        ValidationPipeline {
            rules,
            lookup: None,
            targets: None,
        }
    }

    /// Let rules consult the network through the given seam.
    pub fn with_lookup(mut self, lookup: &'a dyn RemoteLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Restrict CROSS_CHECK to the named entity ids. LOCAL_CHECK stays
    /// crate-wide: rules may reference entities outside the subset, so
    /// those must be locally sound too.
    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = Some(targets);
        self
    }

    /// LOCAL_CHECK only.
    pub fn local_check(&self, graph: &CrateGraph) -> Result<ValidationReport, ConfigError> {
        let mut report = ValidationReport {
            state: RunState::Init,
            local: Vec::new(),
            cross: Vec::new(),
        };
        report.state = RunState::LocalCheck;
        report.local = self.run_local(graph)?;
        report.state = if report.local.is_empty() {
            RunState::Passed
        } else {
            RunState::Failed
        };
        Ok(report)
    }

    /// Full validation: LOCAL_CHECK, then CROSS_CHECK over the whole
    /// graph. CROSS_CHECK runs regardless of the local outcome; the two
    /// are different failure classes.
    pub fn validate(&self, graph: &CrateGraph) -> Result<ValidationReport, ConfigError> {
        let mut report = ValidationReport {
            state: RunState::Init,
            local: Vec::new(),
            cross: Vec::new(),
        };
        report.state = RunState::LocalCheck;
        report.local = self.run_local(graph)?;
        report.state = RunState::CrossCheck;
        report.cross = self.run_cross(graph)?;
        report.state = if report.local.is_empty() && report.cross.is_empty() {
            RunState::Passed
        } else {
            RunState::Failed
        };
        tracing::debug!(
            state = ?report.state,
            local = report.local.len(),
            cross = report.cross.len(),
            "validation finished"
        );
        Ok(report)
    }

    fn run_local(&self, graph: &CrateGraph) -> Result<Vec<EntityError>, ConfigError> {
        tracing::debug!("running local schema checks");
        let mut failures = Vec::new();
        for entity in graph.entities() {
            let def = entity_def(entity)?;
            if let Err(err) = entity.check_props(&def) {
                failures.push(err);
            }
        }
        Ok(failures)
    }

    fn run_cross(&self, graph: &CrateGraph) -> Result<Vec<EntityError>, ConfigError> {
        tracing::debug!("running governance checks");
        let ctx = RuleContext {
            graph,
            lookup: self.lookup,
        };
        let mut failures = Vec::new();
        for entity in graph.entities() {
            if let Some(targets) = &self.targets {
                if !targets.iter().any(|t| t == entity.id()) {
                    continue;
                }
            }
            let schema = entity
                .schema_name()
                .ok_or_else(|| ConfigError::UnknownSchema {
                    name: entity.context().to_string(),
                })?;
            // Rule resolution mirrors type resolution: the entity's own
            // schema first, then the base schema.
            let rule = self
                .rules
                .rule_for(schema, entity.type_name())
                .or_else(|| self.rules.rule_for(BASE_SCHEMA, entity.type_name()));
            let Some(rule) = rule else { continue };
            if let Err(err) = rule.check(entity, &ctx) {
                failures.push(err);
            }
        }
        Ok(failures)
    }
}
