//! Integration test: layered policies end-to-end.
//!
//! Uses fixture files under `tests/fixtures/layered/` to verify that the
//! full JSON feed → graph and TOML → DTO → policy → evaluator pipeline
//! detects layer violations.

use layercheck_core::declarative;
use layercheck_core::{
    evaluate, layered_architecture, no_units_in, EdgeKind, EdgeRef, Evaluator, Policy, ScanMode,
    Severity, SymbolGraph, ViolationKind,
};
use std::collections::BTreeSet;
use std::path::PathBuf;

const LAYER1: &str = "de.koelle.christian.archunit.layer1a..";
const LAYER2: &str = "de.koelle.christian.archunit.layer2a..";
const LAYER3: &str = "de.koelle.christian.archunit.layer3a..";

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/layered")
}

fn load_graph() -> SymbolGraph {
    SymbolGraph::from_file(&fixture_root().join("graph.json")).expect("fixture graph should load")
}

fn load_policy() -> Policy {
    declarative::load_policy_from_file(&fixture_root().join("layercheck.toml"))
        .expect("fixture policy should load")
}

/// The three "no units in X should use Y" checks, all in one scan mode.
fn selfmade_rules(mode: ScanMode) -> Policy {
    layered_architecture()
        .rule(no_units_in([LAYER1]).should_depend_on_or_access([LAYER3], mode))
        .rule(no_units_in([LAYER2]).should_depend_on_or_access([LAYER1], mode))
        .rule(no_units_in([LAYER3]).should_depend_on_or_access([LAYER1, LAYER2], mode))
        .build()
        .expect("rules should build")
}

fn offending_edges(graph: &SymbolGraph, policy: &Policy) -> BTreeSet<(usize, EdgeRef)> {
    evaluate(graph, policy)
        .expect("evaluation should succeed")
        .violations
        .into_iter()
        .filter_map(|v| v.edge.map(|e| (v.rule_index, e)))
        .collect()
}

// ── Fixture import ──

#[test]
fn fixture_graph_derives_signature_edges() {
    let graph = load_graph();
    assert_eq!(graph.len(), 7);

    let clazz = graph
        .find("de.koelle.christian.archunit.layer2a.MyLayer2Clazz")
        .expect("unit should exist");
    let kinds: Vec<EdgeKind> = graph
        .edges_from(clazz.id(), layercheck_core::EdgeKindSet::all())
        .map(|e| e.kind)
        .collect();
    assert!(kinds.contains(&EdgeKind::ReturnType));
    assert!(kinds.contains(&EdgeKind::Instantiation));
}

// ── Layer rules ──

#[test]
fn depend_on_detects_the_inlined_constant() {
    let graph = load_graph();
    let report = evaluate(&graph, &load_policy()).expect("evaluation should succeed");

    assert!(!report.passed());
    insta::assert_snapshot!(report.to_string(), @r"
    error [LC002] layer 'layer3' may only be accessed by layers [layer2]: Unit 'de.koelle.christian.archunit.layer1a.MyLayer1Clazz' (layer 'layer1') uses 'de.koelle.christian.archunit.layer3a.MyLayer3Ids' in package 'de.koelle.christian.archunit.layer3a' via constant-reference, but layer 'layer3' may only be accessed by layers [layer2]
    error [LC001] layer1-skips-layer3: Unit 'de.koelle.christian.archunit.layer1a.MyLayer1Clazz' uses 'de.koelle.christian.archunit.layer3a.MyLayer3Ids' in package 'de.koelle.christian.archunit.layer3a' via constant-reference
    Found 2 error(s), 0 warning(s), 0 info(s) from 6 rule(s) over 7 unit(s)
    ");
}

#[test]
fn access_mode_passes_the_same_graph() {
    let graph = load_graph();
    let policy = load_policy().with_layer_mode(ScanMode::Access);
    let report = evaluate(&graph, &policy).expect("evaluation should succeed");

    let layer_violations = report.by_kind(ViolationKind::LayerAccess);
    assert!(layer_violations.is_empty(), "{layer_violations:#?}");
    // the forbid rules keep their own depend-on mode
    assert_eq!(report.by_kind(ViolationKind::ForbiddenUsage).len(), 1);
}

#[test]
fn returned_objects_of_a_lower_layer_are_not_a_violation() {
    let graph = load_graph();
    let edges = offending_edges(&graph, &load_policy());
    assert!(edges
        .iter()
        .all(|(_, e)| e.target != "de.koelle.christian.archunit.layer3a.MyLayer3Object"));
}

// ── Ad-hoc rules ──

#[test]
fn selfmade_rules_in_access_mode_pass() {
    let graph = load_graph();
    let report = evaluate(&graph, &selfmade_rules(ScanMode::Access)).expect("evaluation");
    assert!(report.passed(), "{}", report.format_test_report(Severity::Error));
}

#[test]
fn depend_on_violations_are_a_superset_of_access_violations() {
    let graph = load_graph();
    let depend = offending_edges(&graph, &selfmade_rules(ScanMode::DependOn));
    let access = offending_edges(&graph, &selfmade_rules(ScanMode::Access));
    assert!(access.is_subset(&depend));
    assert_eq!(depend.len(), 1);
}

#[test]
fn calling_a_lower_layer_static_method_is_caught_in_every_mode() {
    let mut feed = layercheck_core::Feed::from_file(&fixture_root().join("graph.json"))
        .expect("fixture feed should load");
    feed.merge(
        layercheck_core::Feed::from_json_str(
            r#"{ "edges": [{
                "source": "de.koelle.christian.archunit.layer1a.MyLayer1Clazz",
                "target": "de.koelle.christian.archunit.layer3a.MyLayer3StaticUtil",
                "kind": "static-member-access"
            }] }"#,
        )
        .expect("extra edge should parse"),
    );
    let graph = layercheck_core::import_units(feed).expect("graph should import");

    for mode in [ScanMode::DependOn, ScanMode::Access, ScanMode::Either] {
        let edges = offending_edges(&graph, &selfmade_rules(mode));
        assert!(
            edges.iter().any(|(rule, e)| *rule == 0
                && e.kind == EdgeKind::StaticMemberAccess
                && e.target.ends_with("MyLayer3StaticUtil")),
            "mode {mode}: {edges:#?}"
        );

        let layer_policy = load_policy().with_layer_mode(mode);
        let report = evaluate(&graph, &layer_policy).expect("evaluation");
        assert!(!report.passed(), "mode {mode}");
    }
}

// ── Empty scans ──

#[test]
fn empty_rule_follows_fail_on_empty_scan() {
    let graph = load_graph();
    let build = |fail: bool| {
        layered_architecture()
            .rule(
                no_units_in(["de.koelle.christian.archunit.layer4a.."])
                    .should_depend_on_units_in([LAYER1]),
            )
            .fail_on_empty_scan(fail)
            .build()
            .expect("policy should build")
    };

    let lenient = evaluate(&graph, &build(false)).expect("evaluation");
    assert!(lenient.passed());
    assert!(lenient.failures().is_empty());
    assert_eq!(lenient.by_kind(ViolationKind::EmptyScan).len(), 1);

    let strict = evaluate(&graph, &build(true)).expect("evaluation");
    assert!(!strict.passed());
    assert_eq!(strict.failures().len(), 1);
    assert_eq!(strict.failures()[0].kind, ViolationKind::EmptyScan);
}

// ── Properties ──

#[test]
fn evaluation_is_deterministic() {
    let graph = load_graph();
    let policy = load_policy();
    let evaluator = Evaluator::new(&graph, &policy).expect("layers should not overlap");
    let first = evaluator.evaluate();
    for _ in 0..5 {
        assert_eq!(evaluator.evaluate(), first);
    }
}

#[test]
fn empty_graph_renders_a_report() {
    let graph = SymbolGraph::from_json_str("{}").expect("empty feed");
    let report = evaluate(&graph, &load_policy()).expect("evaluation");
    assert!(report.passed());
    // every layer and forbid rule scanned nothing
    assert_eq!(report.by_kind(ViolationKind::EmptyScan).len(), 6);
}

#[test]
fn overlapping_fixture_layers_are_rejected() {
    let graph = load_graph();
    let content = std::fs::read_to_string(fixture_root().join("layercheck.toml"))
        .expect("fixture TOML should exist")
        + "\n[[layers]]\nname = \"everything\"\npackages = [\"de.koelle..\"]\n";
    let policy = declarative::load_policy_from_toml(&content).expect("policy should load");
    let err = Evaluator::new(&graph, &policy).expect_err("layers overlap");
    assert!(err.to_string().contains("belongs to more than one layer"));
}
