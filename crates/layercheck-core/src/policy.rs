//! Layering policy: layers, access rules, ad-hoc forbidden-usage rules and
//! evaluation options.
//!
//! A [`Policy`] is immutable. It is assembled with [`layered_architecture`]
//! and validated as a whole by [`PolicyBuilder::build`], so an evaluator never
//! sees a rule that references an undeclared layer.
//!
//! ```ignore
//! let policy = layered_architecture()
//!     .layer("web").defined_by(["com.acme.web.."])
//!     .layer("core").defined_by(["com.acme.core.."])
//!     .where_layer("web").may_not_be_accessed_by_any_layer()
//!     .where_layer("core").may_only_be_accessed_by_layers(["web"])
//!     .rule(no_units_in(["com.acme.core.."]).should_access_units_in(["java.sql.."]))
//!     .build()?;
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use crate::graph::{EdgeKindSet, Unit};
use crate::pattern::{PackageSelector, PatternError};
use crate::predicate::{KindSets, ScanMode, UnitPredicate, Usage};
use crate::types::Severity;

// ────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────

/// Policy configuration errors.
///
/// These abort a run before any rule is evaluated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A rule references a layer that was never declared.
    #[error("{context}: layer '{name}' is not defined")]
    UndefinedLayer {
        /// Where the reference appears.
        context: String,
        /// The undeclared name.
        name: String,
    },

    /// A layer carries more than one rule of the same direction.
    #[error("layer '{layer}' has more than one {direction} access rule")]
    ConflictingRule {
        /// Layer name.
        layer: String,
        /// Direction of the conflicting rules.
        direction: Direction,
    },

    /// A layer name is declared twice.
    #[error("layer '{name}' is defined more than once")]
    DuplicateLayer {
        /// Layer name.
        name: String,
    },

    /// A layer name is empty or contains invalid characters.
    #[error("invalid layer name `{name}`: use letters, digits, '-' or '_'")]
    InvalidLayerName {
        /// The invalid name.
        name: String,
    },

    /// A selector has no pattern.
    #[error("{context}: at least one package pattern is required")]
    EmptySelector {
        /// Where the selector appears.
        context: String,
    },

    /// A package pattern or name glob is invalid.
    #[error("{context}: {source}")]
    InvalidPattern {
        /// Where the pattern appears.
        context: String,
        /// Underlying pattern error.
        source: PatternError,
    },

    /// A unit of the graph belongs to more than one layer.
    #[error(
        "unit '{unit}' in package '{package}' belongs to more than one layer: {}",
        layers.join(", ")
    )]
    OverlappingLayers {
        /// Fully-qualified unit name.
        unit: String,
        /// Package of the unit.
        package: String,
        /// Every layer selecting the package, in declaration order.
        layers: Vec<String>,
    },

    /// Several errors were found.
    #[error("{}", describe_multiple(.0))]
    Multiple(Vec<ConfigError>),
}

impl ConfigError {
    /// Returns every individual error.
    #[must_use]
    pub fn errors(&self) -> Vec<&ConfigError> {
        match self {
            Self::Multiple(all) => all.iter().collect(),
            single => vec![single],
        }
    }

    /// Folds errors into one, flattening nested [`ConfigError::Multiple`].
    pub(crate) fn collect(errors: Vec<Self>) -> Result<(), Self> {
        let mut errors: Vec<Self> = errors
            .into_iter()
            .flat_map(|e| match e {
                Self::Multiple(inner) => inner,
                single => vec![single],
            })
            .collect();
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

fn describe_multiple(errors: &[ConfigError]) -> String {
    let mut out = match errors.first() {
        Some(first) => format!("{first} ({} errors in total)", errors.len()),
        None => "no errors".to_string(),
    };
    for err in errors.iter().skip(1) {
        out.push_str("\n  - ");
        out.push_str(&err.to_string());
    }
    out
}

// ────────────────────────────────────────────
// Layers and rules
// ────────────────────────────────────────────

/// A validated layer name (non-empty, `[A-Za-z0-9_-]` only).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerName(String);

impl LayerName {
    /// Creates a new layer name.
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty or contains invalid characters.
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::InvalidLayerName {
                name: name.to_string(),
            });
        }
        Ok(Self(name.to_string()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named group of packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    name: LayerName,
    selector: PackageSelector,
}

impl Layer {
    /// Returns the layer name.
    #[must_use]
    pub fn name(&self) -> &LayerName {
        &self.name
    }

    /// Returns the package selector.
    #[must_use]
    pub fn selector(&self) -> &PackageSelector {
        &self.selector
    }

    /// Tests whether a package belongs to this layer.
    #[must_use]
    pub fn contains_package(&self, package: &str) -> bool {
        self.selector.matches(package)
    }
}

/// Which edges of a layer an access rule governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Edges into the layer.
    Incoming,
    /// Edges out of the layer.
    Outgoing,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incoming => f.write_str("incoming"),
            Self::Outgoing => f.write_str("outgoing"),
        }
    }
}

/// An access restriction on a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerConstraint {
    /// No unit outside the layer may use it.
    MayNotBeAccessedByAnyLayer,
    /// Only units of the listed layers may use it.
    MayOnlyBeAccessedByLayers(Vec<LayerName>),
    /// Units of the layer may only use units of the listed layers.
    MayOnlyAccessLayers(Vec<LayerName>),
}

impl LayerConstraint {
    /// Returns the direction this constraint governs.
    #[must_use]
    pub fn direction(&self) -> Direction {
        match self {
            Self::MayNotBeAccessedByAnyLayer | Self::MayOnlyBeAccessedByLayers(_) => {
                Direction::Incoming
            }
            Self::MayOnlyAccessLayers(_) => Direction::Outgoing,
        }
    }

    /// Returns the layers the constraint allows.
    #[must_use]
    pub fn allowed(&self) -> &[LayerName] {
        match self {
            Self::MayNotBeAccessedByAnyLayer => &[],
            Self::MayOnlyBeAccessedByLayers(names) | Self::MayOnlyAccessLayers(names) => names,
        }
    }

    /// Tests whether `other` is on the allow-list.
    #[must_use]
    pub fn allows(&self, other: &LayerName) -> bool {
        self.allowed().contains(other)
    }
}

fn list_layers(names: &[LayerName]) -> String {
    let names: Vec<&str> = names.iter().map(LayerName::as_str).collect();
    format!("[{}]", names.join(", "))
}

/// A constraint bound to a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRule {
    layer: LayerName,
    constraint: LayerConstraint,
    mode: Option<ScanMode>,
}

impl LayerRule {
    /// Returns the constrained layer.
    #[must_use]
    pub fn layer(&self) -> &LayerName {
        &self.layer
    }

    /// Returns the constraint.
    #[must_use]
    pub fn constraint(&self) -> &LayerConstraint {
        &self.constraint
    }

    /// Returns the scan mode set on this rule, if any.
    ///
    /// Rules without one use the policy's layer mode.
    #[must_use]
    pub fn mode(&self) -> Option<ScanMode> {
        self.mode
    }

    /// Human-readable rule text.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.constraint {
            LayerConstraint::MayNotBeAccessedByAnyLayer => {
                format!("layer '{}' may not be accessed by any layer", self.layer)
            }
            LayerConstraint::MayOnlyBeAccessedByLayers(names) => format!(
                "layer '{}' may only be accessed by layers {}",
                self.layer,
                list_layers(names)
            ),
            LayerConstraint::MayOnlyAccessLayers(names) => format!(
                "layer '{}' may only access layers {}",
                self.layer,
                list_layers(names)
            ),
        }
    }
}

/// An ad-hoc rule: no unit matching `subject` may use a unit matching the
/// usage target.
#[derive(Debug, Clone)]
pub struct ForbiddenRule {
    name: String,
    subject: UnitPredicate,
    usage: Usage,
    severity: Severity,
    message: Option<String>,
    doc_ref: Option<String>,
}

impl ForbiddenRule {
    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the units the rule checks.
    #[must_use]
    pub fn subject(&self) -> &UnitPredicate {
        &self.subject
    }

    /// Returns the forbidden usage.
    #[must_use]
    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    /// Returns the severity of findings.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the custom message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the design document reference.
    #[must_use]
    pub fn doc_ref(&self) -> Option<&str> {
        self.doc_ref.as_deref()
    }
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub enum Rule {
    /// A layer access rule.
    Layer(LayerRule),
    /// An ad-hoc forbidden-usage rule.
    Forbidden(ForbiddenRule),
}

impl Rule {
    /// Returns the rule name used in reports.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Layer(rule) => rule.describe(),
            Self::Forbidden(rule) => rule.name.clone(),
        }
    }

    /// Returns the stable code of violations of this rule.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Forbidden(_) => "LC001",
            Self::Layer(rule) => match rule.constraint.direction() {
                Direction::Incoming => "LC002",
                Direction::Outgoing => "LC003",
            },
        }
    }

    /// Returns the severity of edge violations of this rule.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::Layer(_) => Severity::Error,
            Self::Forbidden(rule) => rule.severity,
        }
    }
}

/// Edges exempt from every rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredDependency {
    from: PackageSelector,
    to: PackageSelector,
}

impl IgnoredDependency {
    /// Tests whether an edge between two units is exempt.
    #[must_use]
    pub fn covers(&self, source: &Unit, target: &Unit) -> bool {
        self.from.matches(source.package()) && self.to.matches(target.package())
    }
}

// ────────────────────────────────────────────
// Options
// ────────────────────────────────────────────

/// What happens when a rule selects no unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyScanPolicy {
    /// Nothing is reported.
    Suppress,
    /// An informational diagnostic that never fails the check.
    #[default]
    Report,
    /// A failing violation.
    Fail,
}

impl EmptyScanPolicy {
    /// Returns the severity of the diagnostic, if any is emitted.
    #[must_use]
    pub fn severity(self) -> Option<Severity> {
        match self {
            Self::Suppress => None,
            Self::Report => Some(Severity::Info),
            Self::Fail => Some(Severity::Error),
        }
    }
}

/// Which edges into a layer an incoming rule considers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerDependencies {
    /// Every edge; units in no layer are never allowed.
    #[default]
    All,
    /// Only edges from units that belong to some layer.
    LayersOnly,
}

/// Evaluation options of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyOptions {
    /// Scan mode of layer rules that set none of their own.
    pub layer_mode: ScanMode,
    /// Empty-scan handling.
    pub empty_scan: EmptyScanPolicy,
    /// Strictness of incoming layer rules.
    pub layer_dependencies: LayerDependencies,
    /// Per-rule deadline.
    pub rule_timeout: Option<Duration>,
    /// Edge kinds behind each scan mode.
    pub kinds: KindSets,
    /// Lowest severity that fails a check.
    pub fail_on: Severity,
}

impl Default for PolicyOptions {
    fn default() -> Self {
        Self {
            layer_mode: ScanMode::DependOn,
            empty_scan: EmptyScanPolicy::Report,
            layer_dependencies: LayerDependencies::All,
            rule_timeout: None,
            kinds: KindSets::default(),
            fail_on: Severity::Error,
        }
    }
}

// ────────────────────────────────────────────
// Policy
// ────────────────────────────────────────────

/// A validated, immutable policy.
#[derive(Debug, Clone)]
pub struct Policy {
    layers: Vec<Layer>,
    rules: Vec<Rule>,
    ignored: Vec<IgnoredDependency>,
    options: PolicyOptions,
}

impl Policy {
    /// Starts building a policy.
    #[must_use]
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::new()
    }

    /// Returns the layers in declaration order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Finds a layer by name.
    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name.as_str() == name)
    }

    /// Returns the rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Returns the ignored dependencies.
    #[must_use]
    pub fn ignored_dependencies(&self) -> &[IgnoredDependency] {
        &self.ignored
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &PolicyOptions {
        &self.options
    }

    /// Tests whether an edge between two units is exempt from every rule.
    #[must_use]
    pub fn is_ignored(&self, source: &Unit, target: &Unit) -> bool {
        self.ignored.iter().any(|i| i.covers(source, target))
    }

    /// Returns a copy with another default layer mode.
    ///
    /// Rules built with [`LayerConstraintBuilder::in_mode`] keep their mode.
    #[must_use]
    pub fn with_layer_mode(mut self, mode: ScanMode) -> Self {
        self.options.layer_mode = mode;
        self
    }
}

// ────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────

/// Starts a layered architecture policy.
#[must_use]
pub fn layered_architecture() -> PolicyBuilder {
    PolicyBuilder::new()
}

#[derive(Debug, Clone)]
enum ConstraintSpec {
    NotAccessed,
    OnlyAccessedBy(Vec<String>),
    OnlyAccesses(Vec<String>),
}

impl ConstraintSpec {
    fn direction(&self) -> Direction {
        match self {
            Self::NotAccessed | Self::OnlyAccessedBy(_) => Direction::Incoming,
            Self::OnlyAccesses(_) => Direction::Outgoing,
        }
    }
}

/// Builder for [`Policy`]. Validation is deferred to [`PolicyBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct PolicyBuilder {
    layers: Vec<(String, Vec<String>)>,
    constraints: Vec<(String, ConstraintSpec, Option<ScanMode>)>,
    forbidden: Vec<ForbiddenRuleSpec>,
    ignored: Vec<(Vec<String>, Vec<String>)>,
    options: PolicyOptions,
}

/// Pending `.layer(name)` call; finish with [`LayerDefinition::defined_by`].
#[derive(Debug)]
#[must_use = "call `defined_by` to declare the layer"]
pub struct LayerDefinition {
    builder: PolicyBuilder,
    name: String,
}

impl LayerDefinition {
    /// Declares the packages of the layer.
    pub fn defined_by<I, S>(mut self, patterns: I) -> PolicyBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = patterns.into_iter().map(Into::into).collect();
        self.builder.layers.push((self.name, patterns));
        self.builder
    }
}

/// Pending `.where_layer(name)` call.
#[derive(Debug)]
#[must_use = "call an access rule method to constrain the layer"]
pub struct LayerConstraintBuilder {
    builder: PolicyBuilder,
    name: String,
    mode: Option<ScanMode>,
}

impl LayerConstraintBuilder {
    fn finish(mut self, spec: ConstraintSpec) -> PolicyBuilder {
        self.builder.constraints.push((self.name, spec, self.mode));
        self.builder
    }

    /// Scans this rule in `mode` instead of the policy's layer mode.
    pub fn in_mode(mut self, mode: ScanMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// No unit outside the layer may use it.
    pub fn may_not_be_accessed_by_any_layer(self) -> PolicyBuilder {
        self.finish(ConstraintSpec::NotAccessed)
    }

    /// Only units of `layers` may use this layer.
    pub fn may_only_be_accessed_by_layers<I, S>(self, layers: I) -> PolicyBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = layers.into_iter().map(Into::into).collect();
        self.finish(ConstraintSpec::OnlyAccessedBy(names))
    }

    /// Units of this layer may only use units of `layers` (or of no layer).
    pub fn may_only_access_layers<I, S>(self, layers: I) -> PolicyBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = layers.into_iter().map(Into::into).collect();
        self.finish(ConstraintSpec::OnlyAccesses(names))
    }
}

impl PolicyBuilder {
    /// Creates an empty builder with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts declaring a layer.
    pub fn layer(self, name: impl Into<String>) -> LayerDefinition {
        LayerDefinition {
            builder: self,
            name: name.into(),
        }
    }

    /// Starts constraining a layer.
    pub fn where_layer(self, name: impl Into<String>) -> LayerConstraintBuilder {
        LayerConstraintBuilder {
            builder: self,
            name: name.into(),
            mode: None,
        }
    }

    /// Adds an ad-hoc forbidden-usage rule.
    #[must_use]
    pub fn rule(mut self, rule: ForbiddenRuleSpec) -> Self {
        self.forbidden.push(rule);
        self
    }

    /// Exempts edges from units in `from` to units in `to` from every rule.
    #[must_use]
    pub fn ignore_dependency<I, J, S, T>(mut self, from: I, to: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        self.ignored.push((
            from.into_iter().map(Into::into).collect(),
            to.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Sets the scan mode of layer rules that set none of their own.
    #[must_use]
    pub fn scan_mode(mut self, mode: ScanMode) -> Self {
        self.options.layer_mode = mode;
        self
    }

    /// `true` makes empty scans fail, `false` only reports them.
    #[must_use]
    pub fn fail_on_empty_scan(mut self, fail: bool) -> Self {
        self.options.empty_scan = if fail {
            EmptyScanPolicy::Fail
        } else {
            EmptyScanPolicy::Report
        };
        self
    }

    /// Sets empty-scan handling.
    #[must_use]
    pub fn empty_scan(mut self, policy: EmptyScanPolicy) -> Self {
        self.options.empty_scan = policy;
        self
    }

    /// Incoming rules consider edges from units in no layer (the default).
    #[must_use]
    pub fn considering_all_dependencies(mut self) -> Self {
        self.options.layer_dependencies = LayerDependencies::All;
        self
    }

    /// Incoming rules ignore edges from units in no layer.
    #[must_use]
    pub fn considering_only_dependencies_in_layers(mut self) -> Self {
        self.options.layer_dependencies = LayerDependencies::LayersOnly;
        self
    }

    /// Sets the per-rule deadline.
    #[must_use]
    pub fn rule_timeout(mut self, timeout: Duration) -> Self {
        self.options.rule_timeout = Some(timeout);
        self
    }

    /// Overrides the kinds scanned in access mode.
    #[must_use]
    pub fn access_kinds(mut self, kinds: EdgeKindSet) -> Self {
        self.options.kinds.access = kinds;
        self
    }

    /// Overrides the kinds scanned in depend-on mode.
    #[must_use]
    pub fn dependency_kinds(mut self, kinds: EdgeKindSet) -> Self {
        self.options.kinds.dependency = kinds;
        self
    }

    /// Sets the lowest severity that fails a check.
    #[must_use]
    pub fn fail_on(mut self, severity: Severity) -> Self {
        self.options.fail_on = severity;
        self
    }

    /// Validates everything and builds the policy.
    ///
    /// # Errors
    ///
    /// Returns every configuration error found, as a single error or as
    /// [`ConfigError::Multiple`].
    pub fn build(self) -> Result<Policy, ConfigError> {
        let mut errors = Vec::new();

        let mut layers = Vec::new();
        let mut seen = HashSet::new();
        for (name, patterns) in &self.layers {
            let layer_name = match LayerName::new(name) {
                Ok(n) => n,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            if !seen.insert(name.clone()) {
                errors.push(ConfigError::DuplicateLayer { name: name.clone() });
                continue;
            }
            match compile_selector(patterns, &format!("layer '{name}'")) {
                Ok(selector) => layers.push(Layer {
                    name: layer_name,
                    selector,
                }),
                Err(e) => errors.push(e),
            }
        }

        let mut bound = HashSet::new();
        let mut layer_rules: Vec<(usize, Direction, LayerRule)> = Vec::new();
        for (layer, spec, mode) in &self.constraints {
            let context = format!("where_layer('{layer}')");
            let Some(position) = self.layers.iter().position(|(n, _)| n == layer) else {
                errors.push(ConfigError::UndefinedLayer {
                    context,
                    name: layer.clone(),
                });
                continue;
            };
            let direction = spec.direction();
            if !bound.insert((layer.clone(), direction)) {
                errors.push(ConfigError::ConflictingRule {
                    layer: layer.clone(),
                    direction,
                });
                continue;
            }
            let resolve = |names: &[String], errors: &mut Vec<ConfigError>| {
                let mut resolved = Vec::new();
                for n in names {
                    if seen.contains(n) {
                        if let Ok(valid) = LayerName::new(n) {
                            resolved.push(valid);
                        }
                    } else {
                        errors.push(ConfigError::UndefinedLayer {
                            context: context.clone(),
                            name: n.clone(),
                        });
                    }
                }
                resolved
            };
            let constraint = match spec {
                ConstraintSpec::NotAccessed => LayerConstraint::MayNotBeAccessedByAnyLayer,
                ConstraintSpec::OnlyAccessedBy(names) => {
                    LayerConstraint::MayOnlyBeAccessedByLayers(resolve(names, &mut errors))
                }
                ConstraintSpec::OnlyAccesses(names) => {
                    LayerConstraint::MayOnlyAccessLayers(resolve(names, &mut errors))
                }
            };
            let Ok(layer) = LayerName::new(layer) else {
                continue;
            };
            layer_rules.push((
                position,
                direction,
                LayerRule {
                    layer,
                    constraint,
                    mode: *mode,
                },
            ));
        }
        // layer declaration order, incoming before outgoing
        layer_rules.sort_by_key(|(position, direction, _)| {
            (*position, *direction == Direction::Outgoing)
        });

        let mut rules: Vec<Rule> = layer_rules
            .into_iter()
            .map(|(_, _, rule)| Rule::Layer(rule))
            .collect();

        for (index, spec) in self.forbidden.into_iter().enumerate() {
            match spec.compile(index) {
                Ok(rule) => rules.push(Rule::Forbidden(rule)),
                Err(e) => errors.extend(e),
            }
        }

        let mut ignored = Vec::new();
        for (index, (from, to)) in self.ignored.iter().enumerate() {
            let from = compile_selector(from, &format!("ignore_dependency[{index}].from"));
            let to = compile_selector(to, &format!("ignore_dependency[{index}].to"));
            match (from, to) {
                (Ok(from), Ok(to)) => ignored.push(IgnoredDependency { from, to }),
                (from, to) => errors.extend(from.err().into_iter().chain(to.err())),
            }
        }

        ConfigError::collect(errors)?;

        tracing::debug!(
            layers = layers.len(),
            rules = rules.len(),
            ignored = ignored.len(),
            "Policy built"
        );

        Ok(Policy {
            layers,
            rules,
            ignored,
            options: self.options,
        })
    }
}

fn compile_selector(patterns: &[String], context: &str) -> Result<PackageSelector, ConfigError> {
    if patterns.is_empty() {
        return Err(ConfigError::EmptySelector {
            context: context.to_string(),
        });
    }
    PackageSelector::parse(patterns).map_err(|source| ConfigError::InvalidPattern {
        context: context.to_string(),
        source,
    })
}

// ────────────────────────────────────────────
// Ad-hoc rules
// ────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Selection {
    Packages(Vec<String>),
    Predicate(UnitPredicate),
}

impl Selection {
    fn compile(self, context: &str) -> Result<UnitPredicate, ConfigError> {
        match self {
            Self::Packages(patterns) => {
                compile_selector(&patterns, context).map(UnitPredicate::ResidesIn)
            }
            Self::Predicate(p) => Ok(p),
        }
    }
}

/// Subject of an ad-hoc rule selected by package.
#[derive(Debug, Clone)]
#[must_use = "finish the rule with a `should_*` method"]
pub struct NoUnitsIn {
    patterns: Vec<String>,
}

/// Starts a rule over the units residing in any of `patterns`.
pub fn no_units_in<I, S>(patterns: I) -> NoUnitsIn
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    NoUnitsIn {
        patterns: patterns.into_iter().map(Into::into).collect(),
    }
}

impl NoUnitsIn {
    /// Forbids using units residing in any of `forbidden` in `mode`.
    pub fn should_depend_on_or_access<I, S>(self, forbidden: I, mode: ScanMode) -> ForbiddenRuleSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ForbiddenRuleSpec::new(
            Selection::Packages(self.patterns),
            mode,
            Selection::Packages(forbidden.into_iter().map(Into::into).collect()),
        )
    }

    /// Forbids any dependency on units residing in `forbidden`.
    pub fn should_depend_on_units_in<I, S>(self, forbidden: I) -> ForbiddenRuleSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.should_depend_on_or_access(forbidden, ScanMode::DependOn)
    }

    /// Forbids accessing units residing in `forbidden`.
    pub fn should_access_units_in<I, S>(self, forbidden: I) -> ForbiddenRuleSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.should_depend_on_or_access(forbidden, ScanMode::Access)
    }
}

/// Subject of an ad-hoc rule selected by predicate.
#[derive(Debug, Clone)]
#[must_use = "finish the rule with `should`"]
pub struct NoUnitsThat {
    subject: UnitPredicate,
}

/// Starts a rule over the units satisfying `subject`.
pub fn no_units_that(subject: UnitPredicate) -> NoUnitsThat {
    NoUnitsThat { subject }
}

impl NoUnitsThat {
    /// Forbids using units satisfying `target` in `mode`.
    pub fn should(self, mode: ScanMode, target: UnitPredicate) -> ForbiddenRuleSpec {
        ForbiddenRuleSpec::new(
            Selection::Predicate(self.subject),
            mode,
            Selection::Predicate(target),
        )
    }
}

/// An ad-hoc rule before validation.
#[derive(Debug, Clone)]
#[must_use = "add the rule to a policy with `PolicyBuilder::rule`"]
pub struct ForbiddenRuleSpec {
    name: Option<String>,
    subject: Selection,
    mode: ScanMode,
    target: Selection,
    severity: Severity,
    message: Option<String>,
    doc_ref: Option<String>,
}

impl ForbiddenRuleSpec {
    fn new(subject: Selection, mode: ScanMode, target: Selection) -> Self {
        Self {
            name: None,
            subject,
            mode,
            target,
            severity: Severity::Error,
            message: None,
            doc_ref: None,
        }
    }

    /// Names the rule. Unnamed rules are named after their description.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the severity of findings (default: error).
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Prefixes every finding with a reason.
    pub fn because(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches a design document reference.
    pub fn with_doc_ref(mut self, doc_ref: impl Into<String>) -> Self {
        self.doc_ref = Some(doc_ref.into());
        self
    }

    fn compile(self, index: usize) -> Result<ForbiddenRule, Vec<ConfigError>> {
        let label = self
            .name
            .clone()
            .unwrap_or_else(|| format!("rule[{index}]"));
        let subject = self.subject.compile(&format!("{label} units"));
        let target = self.target.compile(&format!("{label} forbidden"));
        let (subject, target) = match (subject, target) {
            (Ok(s), Ok(t)) => (s, t),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => return Err(vec![e]),
            (Err(a), Err(b)) => return Err(vec![a, b]),
        };
        let name = self.name.unwrap_or_else(|| {
            format!(
                "no units that {} should {} units that {}",
                subject.describe(),
                self.mode.verb(),
                target.describe()
            )
        });
        Ok(ForbiddenRule {
            name,
            subject,
            usage: Usage::new(self.mode, target),
            severity: self.severity,
            message: self.message,
            doc_ref: self.doc_ref,
        })
    }
}
