//! Rule evaluation.
//!
//! Layer membership is resolved once per run. Rules are then evaluated in
//! parallel; each rule fills its own violation list, and the lists are merged
//! and sorted by (rule index, source, edge kind, target, kind) so that repeated
//! runs over the same input report identical results.

use rayon::prelude::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::graph::{SymbolGraph, Unit, UnitId, UsageEdge};
use crate::policy::{
    ConfigError, Direction, ForbiddenRule, LayerDependencies, LayerRule, Policy, Rule,
};
use crate::predicate::MatchContext;
use crate::types::{EdgeRef, Report, Severity, Violation, ViolationKind};

/// Errors that prevent evaluation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    /// The policy does not fit the graph.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Cooperative per-rule deadline.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    expires: Option<Instant>,
}

impl Deadline {
    fn start(timeout: Option<Duration>) -> Self {
        Self {
            expires: timeout.map(|t| Instant::now() + t),
        }
    }

    fn expired(self) -> bool {
        self.expires.is_some_and(|at| Instant::now() >= at)
    }
}

struct TimedOut;

/// Evaluates a policy against a graph.
#[derive(Debug)]
pub struct Evaluator<'a> {
    graph: &'a SymbolGraph,
    policy: &'a Policy,
    membership: Vec<Option<usize>>,
    members: Vec<Vec<UnitId>>,
}

impl<'a> Evaluator<'a> {
    /// Resolves layer membership of every unit.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OverlappingLayers`] (wrapped) for every unit
    /// that belongs to more than one layer.
    pub fn new(graph: &'a SymbolGraph, policy: &'a Policy) -> Result<Self, EvaluationError> {
        let mut membership = Vec::with_capacity(graph.len());
        let mut members = vec![Vec::new(); policy.layers().len()];
        let mut overlaps = Vec::new();

        for unit in graph.units() {
            let layers: Vec<usize> = policy
                .layers()
                .iter()
                .enumerate()
                .filter(|(_, layer)| layer.contains_package(unit.package()))
                .map(|(i, _)| i)
                .collect();
            match layers.as_slice() {
                [] => membership.push(None),
                [only] => {
                    membership.push(Some(*only));
                    members[*only].push(unit.id());
                }
                many => {
                    overlaps.push(ConfigError::OverlappingLayers {
                        unit: unit.name().to_string(),
                        package: unit.package().to_string(),
                        layers: many
                            .iter()
                            .map(|&i| policy.layers()[i].name().to_string())
                            .collect(),
                    });
                    membership.push(None);
                }
            }
        }
        ConfigError::collect(overlaps)?;

        Ok(Self {
            graph,
            policy,
            membership,
            members,
        })
    }

    /// Returns the layer of a unit.
    #[must_use]
    pub fn layer_of(&self, unit: &Unit) -> Option<&str> {
        self.membership[unit.id().index()].map(|i| self.policy.layers()[i].name().as_str())
    }

    /// Evaluates every rule and returns the sorted violations.
    #[must_use]
    pub fn evaluate(&self) -> Vec<Violation> {
        let rules = self.policy.rules();
        info!(
            "Evaluating {} rule(s) over {} unit(s) and {} edge(s)",
            rules.len(),
            self.graph.len(),
            self.graph.edges().len()
        );

        let per_rule: Vec<Vec<Violation>> = rules
            .par_iter()
            .enumerate()
            .map(|(index, rule)| self.evaluate_rule(index, rule))
            .collect();

        let mut violations: Vec<Violation> = per_rule.into_iter().flatten().collect();
        violations.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        info!("Evaluation finished with {} finding(s)", violations.len());
        violations
    }

    /// Evaluates every rule and wraps the result in a report.
    #[must_use]
    pub fn report(&self) -> Report {
        Report {
            violations: self.evaluate(),
            rules_evaluated: self.policy.rules().len(),
            units_checked: self.graph.len(),
            fail_on: self.policy.options().fail_on,
        }
    }

    fn evaluate_rule(&self, index: usize, rule: &Rule) -> Vec<Violation> {
        let name = rule.name();
        debug!("Evaluating rule {index}: {name}");

        let deadline = Deadline::start(self.policy.options().rule_timeout);
        let outcome = match rule {
            Rule::Layer(layer_rule) => self.check_layer(index, rule, layer_rule, deadline),
            Rule::Forbidden(forbidden) => self.check_forbidden(index, rule, forbidden, deadline),
        };

        match outcome {
            Ok(violations) => violations,
            Err(TimedOut) => {
                let timeout = self.policy.options().rule_timeout.unwrap_or_default();
                warn!("Rule '{name}' timed out after {}ms", timeout.as_millis());
                vec![Violation::new(
                    ViolationKind::EvaluationTimeout,
                    &name,
                    index,
                    Severity::Error,
                    format!(
                        "Rule '{name}' exceeded the evaluation timeout of {}ms",
                        timeout.as_millis()
                    ),
                )
                .with_help("raise the rule timeout or narrow the rule's selector")]
            }
        }
    }

    fn empty_scan(&self, index: usize, rule: &Rule, message: String) -> Vec<Violation> {
        let Some(severity) = self.policy.options().empty_scan.severity() else {
            debug!("Suppressed empty scan of rule {index}");
            return Vec::new();
        };
        warn!("{message}");
        vec![Violation::new(ViolationKind::EmptyScan, rule.name(), index, severity, message)]
    }

    fn check_forbidden(
        &self,
        index: usize,
        rule: &Rule,
        forbidden: &ForbiddenRule,
        deadline: Deadline,
    ) -> Result<Vec<Violation>, TimedOut> {
        let ctx = MatchContext::new(self.graph).with_kinds(self.policy.options().kinds);
        let mut subjects: Vec<&Unit> = Vec::new();
        for unit in self.graph.units() {
            if deadline.expired() {
                return Err(TimedOut);
            }
            if forbidden.subject().test(unit, ctx) {
                subjects.push(unit);
            }
        }

        if subjects.is_empty() {
            return Ok(self.empty_scan(
                index,
                rule,
                format!("Rule '{}' matched no units", forbidden.name()),
            ));
        }

        let usage = forbidden.usage();
        let kinds = ctx.kinds.for_mode(usage.mode());
        let mut violations = Vec::new();
        for unit in subjects {
            for edge in self.graph.edges_from(unit.id(), kinds) {
                if deadline.expired() {
                    return Err(TimedOut);
                }
                if edge.is_self_edge() {
                    continue;
                }
                let target = self.graph.unit(edge.target);
                if !usage.target().test(target, ctx) || self.policy.is_ignored(unit, target) {
                    continue;
                }
                let base = format!(
                    "Unit '{}' uses '{}' in package '{}' via {}",
                    unit.name(),
                    target.name(),
                    target.package(),
                    edge.kind
                );
                let message = match forbidden.message() {
                    Some(reason) => format!("{reason}: {base}"),
                    None => base,
                };
                let mut v = self.edge_violation(
                    ViolationKind::ForbiddenUsage,
                    index,
                    rule,
                    edge,
                    message,
                );
                if let Some(doc_ref) = forbidden.doc_ref() {
                    v = v.with_doc_ref(doc_ref);
                }
                violations.push(v);
            }
        }
        Ok(violations)
    }

    fn check_layer(
        &self,
        index: usize,
        rule: &Rule,
        layer_rule: &LayerRule,
        deadline: Deadline,
    ) -> Result<Vec<Violation>, TimedOut> {
        let Some(layer_index) = self
            .policy
            .layers()
            .iter()
            .position(|l| l.name() == layer_rule.layer())
        else {
            return Ok(Vec::new());
        };
        let layer = &self.policy.layers()[layer_index];
        let members = &self.members[layer_index];
        if members.is_empty() {
            return Ok(self.empty_scan(
                index,
                rule,
                format!(
                    "Layer '{}' is empty: no unit resides in {}",
                    layer.name(),
                    layer.selector()
                ),
            ));
        }

        let options = self.policy.options();
        let kinds = options
            .kinds
            .for_mode(layer_rule.mode().unwrap_or(options.layer_mode));
        let constraint = layer_rule.constraint();
        let mut violations = Vec::new();

        for &member in members {
            if deadline.expired() {
                return Err(TimedOut);
            }
            let edges: Box<dyn Iterator<Item = &UsageEdge> + '_> = match constraint.direction() {
                Direction::Incoming => Box::new(self.graph.edges_to(member, kinds)),
                Direction::Outgoing => Box::new(self.graph.edges_from(member, kinds)),
            };
            for edge in edges {
                if deadline.expired() {
                    return Err(TimedOut);
                }
                if edge.is_self_edge() {
                    continue;
                }
                let source = self.graph.unit(edge.source);
                let target = self.graph.unit(edge.target);
                if self.policy.is_ignored(source, target) {
                    continue;
                }
                let other = match constraint.direction() {
                    Direction::Incoming => source,
                    Direction::Outgoing => target,
                };
                let other_layer = self.membership[other.id().index()];
                let allowed = match (other_layer, constraint.direction()) {
                    (Some(l), _) if l == layer_index => true,
                    (Some(l), _) => constraint.allows(self.policy.layers()[l].name()),
                    (None, Direction::Outgoing) => true,
                    (None, Direction::Incoming) => {
                        options.layer_dependencies == LayerDependencies::LayersOnly
                    }
                };
                if allowed {
                    continue;
                }

                let source_layer = match self.layer_of(source) {
                    Some(name) => format!("layer '{name}'"),
                    None => "no layer".to_string(),
                };
                let message = format!(
                    "Unit '{}' ({source_layer}) uses '{}' in package '{}' via {}, but {}",
                    source.name(),
                    target.name(),
                    target.package(),
                    edge.kind,
                    layer_rule.describe()
                );
                let mut v =
                    self.edge_violation(ViolationKind::LayerAccess, index, rule, edge, message);
                if other_layer.is_none() {
                    v = v.with_help(format!(
                        "package '{}' belongs to no layer; add it to a layer or consider only dependencies in layers",
                        source.package()
                    ));
                }
                violations.push(v);
            }
        }
        Ok(violations)
    }

    fn edge_violation(
        &self,
        kind: ViolationKind,
        index: usize,
        rule: &Rule,
        edge: &UsageEdge,
        message: String,
    ) -> Violation {
        let source = self.graph.unit(edge.source);
        let target = self.graph.unit(edge.target);
        let mut v = Violation::new(kind, rule.name(), index, rule.severity(), message).with_edge(
            EdgeRef {
                source: source.name().to_string(),
                kind: edge.kind,
                target: target.name().to_string(),
                target_package: target.package().to_string(),
            },
        );
        rule.code().clone_into(&mut v.code);
        v
    }
}

/// Evaluates `policy` against `graph`.
///
/// # Errors
///
/// Returns error if a unit belongs to more than one layer.
pub fn evaluate(graph: &SymbolGraph, policy: &Policy) -> Result<Report, EvaluationError> {
    Ok(Evaluator::new(graph, policy)?.report())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;
    use crate::policy::{layered_architecture, no_units_in, EmptyScanPolicy};
    use crate::predicate::ScanMode;

    /// A in pkg1, B in pkg2, C in pkg3. A calls B, B calls C, A reads a
    /// constant of C.
    fn abc() -> SymbolGraph {
        SymbolGraph::builder()
            .unit("pkg1.A")
            .unit("pkg2.B")
            .unit("pkg3.C")
            .edge("pkg1.A", "pkg2.B", EdgeKind::MethodCall)
            .edge("pkg2.B", "pkg3.C", EdgeKind::MethodCall)
            .edge("pkg1.A", "pkg3.C", EdgeKind::ConstantReference)
            .build()
            .unwrap()
    }

    fn abc_policy(mode: ScanMode) -> Policy {
        layered_architecture()
            .layer("layer1")
            .defined_by(["pkg1.."])
            .layer("layer2")
            .defined_by(["pkg2.."])
            .layer("layer3")
            .defined_by(["pkg3.."])
            .where_layer("layer1")
            .may_not_be_accessed_by_any_layer()
            .where_layer("layer2")
            .may_only_be_accessed_by_layers(["layer1"])
            .where_layer("layer3")
            .may_only_be_accessed_by_layers(["layer2"])
            .scan_mode(mode)
            .build()
            .unwrap()
    }

    #[test]
    fn depend_on_reports_constant_reference() {
        let graph = abc();
        let report = evaluate(&graph, &abc_policy(ScanMode::DependOn)).unwrap();
        assert!(!report.passed());
        assert_eq!(report.violations.len(), 1);

        let v = &report.violations[0];
        assert_eq!(v.kind, ViolationKind::LayerAccess);
        assert_eq!(v.code, "LC002");
        assert_eq!(v.rule_index, 2);
        assert_eq!(
            v.message,
            "Unit 'pkg1.A' (layer 'layer1') uses 'pkg3.C' in package 'pkg3' via constant-reference, but layer 'layer3' may only be accessed by layers [layer2]"
        );
    }

    #[test]
    fn access_ignores_constant_reference() {
        let graph = abc();
        let report = evaluate(&graph, &abc_policy(ScanMode::Access)).unwrap();
        assert!(report.passed(), "{}", report);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn whitelist_yields_one_violation_per_edge() {
        let graph = SymbolGraph::builder()
            .unit("core.Service")
            .unit("web.Page")
            .edge("web.Page", "core.Service", EdgeKind::MethodCall)
            .edge("web.Page", "core.Service", EdgeKind::FieldType)
            .edge("core.Service", "core.Service", EdgeKind::MethodCall)
            .build()
            .unwrap();
        let policy = layered_architecture()
            .layer("core")
            .defined_by(["core.."])
            .where_layer("core")
            .may_only_be_accessed_by_layers(Vec::<String>::new())
            .build()
            .unwrap();

        let violations = Evaluator::new(&graph, &policy).unwrap().evaluate();
        let kinds: Vec<EdgeKind> = violations
            .iter()
            .map(|v| v.edge.as_ref().unwrap().kind)
            .collect();
        assert_eq!(kinds, vec![EdgeKind::FieldType, EdgeKind::MethodCall]);
        assert!(violations[0].message.contains("(no layer)"));
        assert!(violations[0].help.is_some());
    }

    #[test]
    fn unlayered_sources_are_skipped_when_only_layers_count() {
        let graph = SymbolGraph::builder()
            .unit("core.Service")
            .unit("tools.Script")
            .edge("tools.Script", "core.Service", EdgeKind::MethodCall)
            .build()
            .unwrap();
        let policy = layered_architecture()
            .layer("core")
            .defined_by(["core.."])
            .where_layer("core")
            .may_not_be_accessed_by_any_layer()
            .considering_only_dependencies_in_layers()
            .build()
            .unwrap();
        assert!(evaluate(&graph, &policy).unwrap().violations.is_empty());
    }

    #[test]
    fn outgoing_rule_restricts_only_layered_targets() {
        let graph = SymbolGraph::builder()
            .unit("web.Page")
            .unit("core.Service")
            .unit("db.Table")
            .unit("java.util.List")
            .edge("web.Page", "core.Service", EdgeKind::MethodCall)
            .edge("web.Page", "db.Table", EdgeKind::Instantiation)
            .edge("web.Page", "java.util.List", EdgeKind::FieldType)
            .build()
            .unwrap();
        let policy = layered_architecture()
            .layer("web")
            .defined_by(["web.."])
            .layer("core")
            .defined_by(["core.."])
            .layer("db")
            .defined_by(["db.."])
            .where_layer("web")
            .may_only_access_layers(["core"])
            .build()
            .unwrap();

        let report = evaluate(&graph, &policy).unwrap();
        assert_eq!(report.violations.len(), 1);
        let v = &report.violations[0];
        assert_eq!(v.code, "LC003");
        assert_eq!(v.edge.as_ref().unwrap().target, "db.Table");
        assert!(v.message.ends_with("but layer 'web' may only access layers [core]"));
    }

    #[test]
    fn forbidden_rule_reports_matching_edges() {
        let graph = abc();
        let policy = layered_architecture()
            .rule(
                no_units_in(["pkg1.."])
                    .should_depend_on_units_in(["pkg3.."])
                    .because("layer1 must not see layer3")
                    .with_doc_ref("ARCHITECTURE.md"),
            )
            .build()
            .unwrap();
        let report = evaluate(&graph, &policy).unwrap();
        assert_eq!(report.violations.len(), 1);
        let v = &report.violations[0];
        assert_eq!(v.code, "LC001");
        assert_eq!(
            v.message,
            "layer1 must not see layer3: Unit 'pkg1.A' uses 'pkg3.C' in package 'pkg3' via constant-reference"
        );
        assert_eq!(v.doc_ref.as_deref(), Some("ARCHITECTURE.md"));
    }

    #[test]
    fn ignored_dependencies_are_exempt() {
        let graph = abc();
        let policy = layered_architecture()
            .rule(no_units_in(["pkg1.."]).should_depend_on_units_in(["pkg3.."]))
            .ignore_dependency(["pkg1"], ["pkg3"])
            .build()
            .unwrap();
        assert!(evaluate(&graph, &policy).unwrap().violations.is_empty());
    }

    #[test]
    fn empty_scans_follow_policy() {
        let graph = abc();
        let base = || {
            layered_architecture()
                .rule(no_units_in(["missing.."]).should_depend_on_units_in(["pkg3.."]))
        };

        let report = evaluate(&graph, &base().build().unwrap()).unwrap();
        assert!(report.passed());
        assert_eq!(report.by_kind(ViolationKind::EmptyScan).len(), 1);
        assert_eq!(report.violations[0].severity, Severity::Info);

        let report =
            evaluate(&graph, &base().fail_on_empty_scan(true).build().unwrap()).unwrap();
        assert!(!report.passed());
        assert_eq!(report.failures().len(), 1);

        let report = evaluate(
            &graph,
            &base().empty_scan(EmptyScanPolicy::Suppress).build().unwrap(),
        )
        .unwrap();
        assert!(report.violations.is_empty());

        // a reported empty scan stays informational at the lowest threshold
        let report =
            evaluate(&graph, &base().fail_on(Severity::Info).build().unwrap()).unwrap();
        assert_eq!(report.by_kind(ViolationKind::EmptyScan).len(), 1);
        assert!(report.passed());
    }

    #[test]
    fn layer_rules_scan_in_their_own_mode() {
        let graph = abc();
        let policy = |default: ScanMode, layer3: ScanMode| {
            layered_architecture()
                .layer("layer1")
                .defined_by(["pkg1.."])
                .layer("layer2")
                .defined_by(["pkg2.."])
                .layer("layer3")
                .defined_by(["pkg3.."])
                .where_layer("layer2")
                .may_only_be_accessed_by_layers(["layer1"])
                .where_layer("layer3")
                .in_mode(layer3)
                .may_only_be_accessed_by_layers(["layer2"])
                .scan_mode(default)
                .build()
                .unwrap()
        };

        let report = evaluate(&graph, &policy(ScanMode::DependOn, ScanMode::Access)).unwrap();
        assert!(report.passed());

        let report = evaluate(&graph, &policy(ScanMode::Access, ScanMode::DependOn)).unwrap();
        assert_eq!(report.violations.len(), 1);
        let edge = report.violations[0].edge.as_ref().unwrap();
        assert_eq!(edge.kind, EdgeKind::ConstantReference);
        assert_eq!(report.violations[0].rule_index, 1);

        // a new default does not touch rules with a mode of their own
        let report = evaluate(
            &graph,
            &policy(ScanMode::DependOn, ScanMode::Access).with_layer_mode(ScanMode::DependOn),
        )
        .unwrap();
        assert!(report.passed());
    }

    #[test]
    fn zero_timeout_times_out_every_non_empty_rule() {
        let graph = abc();
        let policy = layered_architecture()
            .layer("layer1")
            .defined_by(["pkg1.."])
            .layer("empty")
            .defined_by(["nothing.."])
            .where_layer("layer1")
            .may_not_be_accessed_by_any_layer()
            .where_layer("empty")
            .may_not_be_accessed_by_any_layer()
            .rule(no_units_in(["pkg2.."]).should_access_units_in(["pkg3.."]))
            .rule_timeout(Duration::ZERO)
            .build()
            .unwrap();

        let report = evaluate(&graph, &policy).unwrap();
        let kinds: Vec<(usize, ViolationKind)> = report
            .violations
            .iter()
            .map(|v| (v.rule_index, v.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (0, ViolationKind::EvaluationTimeout),
                (1, ViolationKind::EmptyScan),
                (2, ViolationKind::EvaluationTimeout),
            ]
        );
    }

    #[test]
    fn expired_deadline_interrupts_subject_selection() {
        let graph = abc();
        // no unit matches, but the deadline fires before the scan completes
        let policy = layered_architecture()
            .rule(no_units_in(["missing.."]).should_access_units_in(["pkg3.."]))
            .rule_timeout(Duration::ZERO)
            .build()
            .unwrap();
        let report = evaluate(&graph, &policy).unwrap();
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].kind, ViolationKind::EvaluationTimeout);

        let policy = layered_architecture()
            .rule(no_units_in(["missing.."]).should_access_units_in(["pkg3.."]))
            .rule_timeout(Duration::from_secs(60))
            .build()
            .unwrap();
        let report = evaluate(&graph, &policy).unwrap();
        assert_eq!(report.by_kind(ViolationKind::EmptyScan).len(), 1);
    }

    #[test]
    fn overlapping_layers_are_rejected() {
        let graph = abc();
        let policy = layered_architecture()
            .layer("a")
            .defined_by(["pkg1.."])
            .layer("b")
            .defined_by(["pkg*"])
            .build()
            .unwrap();
        let err = Evaluator::new(&graph, &policy).unwrap_err();
        let EvaluationError::Config(config) = err;
        assert_eq!(
            config,
            ConfigError::OverlappingLayers {
                unit: "pkg1.A".into(),
                package: "pkg1".into(),
                layers: vec!["a".into(), "b".into()],
            }
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let graph = abc();
        let policy = abc_policy(ScanMode::Either);
        let evaluator = Evaluator::new(&graph, &policy).unwrap();
        assert_eq!(evaluator.evaluate(), evaluator.evaluate());
    }
}
