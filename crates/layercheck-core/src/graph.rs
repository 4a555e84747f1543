//! Symbol graph: units grouped into packages and the usage edges between them.
//!
//! A [`SymbolGraph`] is produced once per analysis run by the feed importer
//! (see [`crate::feed`]) and is read-only afterwards. Every query takes
//! `&self`, so the evaluator can share one graph across worker threads.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::pattern::PackagePattern;
use crate::predicate::{MatchContext, UnitPredicate};

/// Kind of a declared unit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum UnitKind {
    /// Concrete class.
    #[default]
    Class,
    /// Abstract class.
    AbstractClass,
    /// Interface or trait-like declaration.
    Interface,
    /// Enumeration.
    Enum,
    /// Annotation type.
    Annotation,
    /// Record / data class.
    Record,
}

impl UnitKind {
    /// Returns the kebab-case name used in feeds and messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::AbstractClass => "abstract-class",
            Self::Interface => "interface",
            Self::Enum => "enum",
            Self::Annotation => "annotation",
            Self::Record => "record",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a usage edge.
///
/// Kinds are tracked independently: the same pair of units may be connected
/// by several edges of different kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    /// `extends` / `implements`.
    Inheritance,
    /// Declared type of a field.
    FieldType,
    /// Declared type of a method parameter.
    ParameterType,
    /// Declared return type of a method.
    ReturnType,
    /// Call of a method on the target.
    MethodCall,
    /// Access to a static member (method or field) of the target.
    StaticMemberAccess,
    /// Construction of a target instance.
    Instantiation,
    /// Reference to a compile-time constant declared by the target.
    ///
    /// Compilers inline primitive and string constants into the using unit,
    /// so front ends that read compiled artifacts usually cannot see this
    /// edge at all. It is modeled so feeds produced from source can report
    /// it, but it never counts as an access.
    ConstantReference,
}

impl EdgeKind {
    /// All edge kinds, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Inheritance,
        Self::FieldType,
        Self::ParameterType,
        Self::ReturnType,
        Self::MethodCall,
        Self::StaticMemberAccess,
        Self::Instantiation,
        Self::ConstantReference,
    ];

    /// Returns the kebab-case name used in feeds and messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inheritance => "inheritance",
            Self::FieldType => "field-type",
            Self::ParameterType => "parameter-type",
            Self::ReturnType => "return-type",
            Self::MethodCall => "method-call",
            Self::StaticMemberAccess => "static-member-access",
            Self::Instantiation => "instantiation",
            Self::ConstantReference => "constant-reference",
        }
    }

    /// Whether this kind is observable at a call site.
    ///
    /// This is the membership test for the default access kind set.
    #[must_use]
    pub fn is_access_relevant(self) -> bool {
        matches!(
            self,
            Self::MethodCall | Self::StaticMemberAccess | Self::Instantiation
        )
    }

    /// Whether front ends working on compiled artifacts can populate this
    /// kind reliably.
    #[must_use]
    pub fn is_reliably_detectable(self) -> bool {
        !matches!(self, Self::ConstantReference)
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown edge kind name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown edge kind `{0}`")]
pub struct UnknownEdgeKind(pub String);

impl FromStr for EdgeKind {
    type Err = UnknownEdgeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownEdgeKind(s.to_string()))
    }
}

/// A set of [`EdgeKind`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EdgeKindSet(u16);

impl EdgeKindSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Every edge kind. The default dependency kind set.
    #[must_use]
    pub fn all() -> Self {
        EdgeKind::ALL.into_iter().collect()
    }

    /// Kinds observable at call sites. The default access kind set.
    #[must_use]
    pub fn access() -> Self {
        EdgeKind::ALL
            .into_iter()
            .filter(|k| k.is_access_relevant())
            .collect()
    }

    /// Returns a copy with `kind` added.
    #[must_use]
    pub fn with(self, kind: EdgeKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Returns a copy with `kind` removed.
    #[must_use]
    pub fn without(self, kind: EdgeKind) -> Self {
        Self(self.0 & !kind.bit())
    }

    /// Union of two sets.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether `kind` is in the set.
    #[must_use]
    pub fn contains(self, kind: EdgeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Whether every kind of `self` is also in `other`.
    #[must_use]
    pub fn is_subset(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the kinds in declaration order.
    pub fn iter(self) -> impl Iterator<Item = EdgeKind> {
        EdgeKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl FromIterator<EdgeKind> for EdgeKindSet {
    fn from_iter<I: IntoIterator<Item = EdgeKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl fmt::Display for EdgeKindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(EdgeKind::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Index of a unit inside its [`SymbolGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub(crate) usize);

impl UnitId {
    /// Returns the raw index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSignature {
    /// Field name.
    pub name: String,
    /// Fully-qualified type name.
    pub type_name: String,
}

/// A declared method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// Method name.
    pub name: String,
    /// Fully-qualified parameter type names.
    pub parameter_types: Vec<String>,
    /// Fully-qualified return type name, `None` for `void`.
    pub return_type: Option<String>,
}

/// A named declaration (class, interface, module, ...).
#[derive(Debug, Clone)]
pub struct Unit {
    pub(crate) id: UnitId,
    pub(crate) name: String,
    pub(crate) package: String,
    pub(crate) kind: UnitKind,
    pub(crate) fields: Vec<FieldSignature>,
    pub(crate) methods: Vec<MethodSignature>,
    pub(crate) constants: BTreeSet<String>,
}

impl Unit {
    /// Returns the graph index of this unit.
    #[must_use]
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Returns the fully-qualified name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the containing package path (`""` for the default package).
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Returns the name without its package prefix.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        if self.package.is_empty() {
            &self.name
        } else {
            self.name
                .get(self.package.len() + 1..)
                .unwrap_or(&self.name)
        }
    }

    /// Returns the unit kind.
    #[must_use]
    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    /// Returns the declared fields.
    #[must_use]
    pub fn fields(&self) -> &[FieldSignature] {
        &self.fields
    }

    /// Returns the declared methods.
    #[must_use]
    pub fn methods(&self) -> &[MethodSignature] {
        &self.methods
    }

    /// Returns the names of declared constant members.
    #[must_use]
    pub fn constants(&self) -> &BTreeSet<String> {
        &self.constants
    }
}

/// A directed usage relation between two units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UsageEdge {
    /// Using unit.
    pub source: UnitId,
    /// Used unit.
    pub target: UnitId,
    /// How the target is used.
    pub kind: EdgeKind,
}

impl UsageEdge {
    /// Whether source and target are the same unit.
    #[must_use]
    pub fn is_self_edge(&self) -> bool {
        self.source == self.target
    }
}

/// Immutable graph of units and usage edges for one analysis run.
#[derive(Debug, Clone, Default)]
pub struct SymbolGraph {
    units: Vec<Unit>,
    by_name: HashMap<String, UnitId>,
    edges: Vec<UsageEdge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl SymbolGraph {
    /// Assembles a graph from units whose ids match their positions and
    /// deduplicated, sorted edges.
    pub(crate) fn from_parts(units: Vec<Unit>, edges: Vec<UsageEdge>) -> Self {
        let by_name = units.iter().map(|u| (u.name.clone(), u.id)).collect();
        let mut outgoing = vec![Vec::new(); units.len()];
        let mut incoming = vec![Vec::new(); units.len()];
        for (i, edge) in edges.iter().enumerate() {
            outgoing[edge.source.0].push(i);
            incoming[edge.target.0].push(i);
        }
        Self {
            units,
            by_name,
            edges,
            outgoing,
            incoming,
        }
    }

    /// Returns a builder for assembling small graphs in code.
    #[must_use]
    pub fn builder() -> crate::feed::GraphBuilder {
        crate::feed::GraphBuilder::new()
    }

    /// Returns all units, sorted by name.
    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Returns the unit with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> &Unit {
        &self.units[id.0]
    }

    /// Looks up a unit by fully-qualified name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Unit> {
        self.by_name.get(name).map(|id| &self.units[id.0])
    }

    /// Returns the number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if the graph has no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Returns all edges, sorted by (source, target, kind).
    #[must_use]
    pub fn edges(&self) -> &[UsageEdge] {
        &self.edges
    }

    /// Returns the distinct package paths of all units.
    #[must_use]
    pub fn packages(&self) -> BTreeSet<&str> {
        self.units.iter().map(Unit::package).collect()
    }

    /// Returns the units whose package matches `pattern`.
    #[must_use]
    pub fn units_in_package(&self, pattern: &PackagePattern) -> Vec<&Unit> {
        self.units
            .iter()
            .filter(|u| pattern.matches(&u.package))
            .collect()
    }

    /// Returns the units satisfying `predicate` with the default kind sets.
    #[must_use]
    pub fn units_matching(&self, predicate: &UnitPredicate) -> Vec<&Unit> {
        let ctx = MatchContext::new(self);
        self.units.iter().filter(|u| predicate.test(u, ctx)).collect()
    }

    /// Returns the outgoing edges of `unit` whose kind is in `kinds`.
    pub fn edges_from(
        &self,
        unit: UnitId,
        kinds: EdgeKindSet,
    ) -> impl Iterator<Item = &UsageEdge> + '_ {
        self.outgoing[unit.0]
            .iter()
            .map(|&i| &self.edges[i])
            .filter(move |e| kinds.contains(e.kind))
    }

    /// Returns the incoming edges of `unit` whose kind is in `kinds`.
    pub fn edges_to(&self, unit: UnitId, kinds: EdgeKindSet) -> impl Iterator<Item = &UsageEdge> + '_ {
        self.incoming[unit.0]
            .iter()
            .map(|&i| &self.edges[i])
            .filter(move |e| kinds.contains(e.kind))
    }
}
