//! # layercheck-core
//!
//! Static layered-architecture conformance checking over a symbol graph.
//!
//! A front end extracts units (classes, interfaces, ...) and their usage
//! edges from a codebase and hands them over as a JSON feed. This crate
//! imports the feed into a [`SymbolGraph`], evaluates a layering [`Policy`]
//! against it and reports every edge that breaks the policy.
//!
//! - [`SymbolGraph`] and [`EdgeKind`] for the input model
//! - [`PackagePattern`] for `com.acme.core..` style package selectors
//! - [`UnitPredicate`] and the free predicate functions for rule subjects
//! - [`layered_architecture`] / [`PolicyBuilder`] or
//!   [`declarative::load_policy_from_toml`] for policies
//! - [`Evaluator`] and [`Report`] for results
//!
//! ## Example
//!
//! ```ignore
//! use layercheck_core::{evaluate, layered_architecture, SymbolGraph};
//!
//! let graph = SymbolGraph::from_file("symbols.json".as_ref())?;
//! let policy = layered_architecture()
//!     .layer("web").defined_by(["com.acme.web.."])
//!     .layer("core").defined_by(["com.acme.core.."])
//!     .where_layer("core").may_only_be_accessed_by_layers(["web"])
//!     .build()?;
//!
//! let report = evaluate(&graph, &policy)?;
//! if !report.passed() {
//!     panic!("{}", report.format_test_report(policy.options().fail_on));
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod evaluator;
mod feed;
mod graph;
mod pattern;
mod policy;
mod predicate;
mod types;

/// Declarative TOML policies.
pub mod declarative;

pub use evaluator::{evaluate, EvaluationError, Evaluator};
pub use feed::{
    import_units, import_with, EdgeRecord, Feed, FieldRecord, GraphBuilder, ImportError,
    ImportOptions, MethodRecord, UnitRecord,
};
pub use graph::{
    EdgeKind, EdgeKindSet, FieldSignature, MethodSignature, SymbolGraph, Unit, UnitId, UnitKind,
    UnknownEdgeKind, UsageEdge,
};
pub use pattern::{PackagePattern, PackageSelector, PatternError};
pub use policy::{
    layered_architecture, no_units_in, no_units_that, ConfigError, Direction, EmptyScanPolicy,
    ForbiddenRule, ForbiddenRuleSpec, IgnoredDependency, Layer, LayerConstraint,
    LayerConstraintBuilder, LayerDefinition, LayerDependencies, LayerName, LayerRule, NoUnitsIn,
    NoUnitsThat, Policy, PolicyBuilder, PolicyOptions, Rule,
};
pub use predicate::{
    accesses_classes_that, any_unit, depends_on_classes_that, has_kind,
    has_simple_name_matching, resides_in_any_package, resides_in_package, uses_classes_that,
    KindSets, MatchContext, ScanMode, UnitPredicate, Usage,
};
pub use types::{EdgeRef, Report, Severity, Violation, ViolationDiagnostic, ViolationKind};
