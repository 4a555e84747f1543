//! Composable unit predicates.
//!
//! Predicates select the units a rule checks and the units a rule forbids.
//! They are side-effect free and compose with [`UnitPredicate::and`],
//! [`UnitPredicate::or`] and `!`.
//!
//! # Depending versus accessing
//!
//! [`depends_on_classes_that`] and [`accesses_classes_that`] are different
//! filters. A unit *depends on* another through any edge of a dependency
//! kind (inheritance, declared field/parameter/return types, calls, ...). It
//! *accesses* another only through edges a caller can observe at a call
//! site: method calls, static member access and instantiation. Declaring a
//! field of type `T` without touching it, or reading a constant of `T`, is a
//! dependency but not an access.
//!
//! Constant references need extra care: compilers inline primitive and
//! string constants, so front ends reading compiled artifacts cannot report
//! them. Feeds built from source may contain them. They never count as an
//! access, and a missing constant-reference edge in a feed is a known gap of
//! the front end, not evidence that no dependency exists.
//!
//! With the default kind sets every access is also a dependency, so
//! `depends_on_classes_that(p)` holds whenever `accesses_classes_that(p)`
//! does. Both kind sets can be overridden per policy, in which case the two
//! filters may disagree in either direction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::graph::{EdgeKindSet, SymbolGraph, Unit, UnitKind, UsageEdge};
use crate::pattern::{PackageSelector, PatternError};

/// Which edges a usage check scans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanMode {
    /// Edges of any dependency kind.
    #[default]
    DependOn,
    /// Edges of an access kind.
    Access,
    /// Edges of a dependency kind or an access kind.
    Either,
}

impl ScanMode {
    /// Returns the kebab-case name used in configuration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DependOn => "depend-on",
            Self::Access => "access",
            Self::Either => "either",
        }
    }

    /// Returns the verb used in descriptions.
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            Self::DependOn => "depend on",
            Self::Access => "access",
            Self::Either => "depend on or access",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "depend-on" => Ok(Self::DependOn),
            "access" => Ok(Self::Access),
            "either" => Ok(Self::Either),
            other => Err(format!(
                "unknown scan mode `{other}`, expected: depend-on, access, either"
            )),
        }
    }
}

/// The edge kinds behind each [`ScanMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSets {
    /// Kinds scanned by [`ScanMode::DependOn`].
    pub dependency: EdgeKindSet,
    /// Kinds scanned by [`ScanMode::Access`].
    pub access: EdgeKindSet,
}

impl Default for KindSets {
    fn default() -> Self {
        Self {
            dependency: EdgeKindSet::all(),
            access: EdgeKindSet::access(),
        }
    }
}

impl KindSets {
    /// Returns the kinds a scan in `mode` considers.
    #[must_use]
    pub fn for_mode(&self, mode: ScanMode) -> EdgeKindSet {
        match mode {
            ScanMode::DependOn => self.dependency,
            ScanMode::Access => self.access,
            ScanMode::Either => self.dependency.union(self.access),
        }
    }
}

/// What a predicate is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    /// The graph the units belong to.
    pub graph: &'a SymbolGraph,
    /// Kind sets for usage predicates.
    pub kinds: KindSets,
}

impl<'a> MatchContext<'a> {
    /// Creates a context with the default kind sets.
    #[must_use]
    pub fn new(graph: &'a SymbolGraph) -> Self {
        Self {
            graph,
            kinds: KindSets::default(),
        }
    }

    /// Replaces the kind sets.
    #[must_use]
    pub fn with_kinds(mut self, kinds: KindSets) -> Self {
        self.kinds = kinds;
        self
    }
}

/// A usage condition: the unit uses (in `mode`) some unit matching `target`.
#[derive(Debug, Clone)]
pub struct Usage {
    mode: ScanMode,
    target: UnitPredicate,
}

impl Usage {
    /// Creates a usage condition.
    #[must_use]
    pub fn new(mode: ScanMode, target: UnitPredicate) -> Self {
        Self { mode, target }
    }

    /// Returns the scan mode.
    #[must_use]
    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Returns the target predicate.
    #[must_use]
    pub fn target(&self) -> &UnitPredicate {
        &self.target
    }

    /// Yields the outgoing edges of `unit` that satisfy this condition.
    ///
    /// Self edges never do.
    pub fn witnesses<'g>(
        &'g self,
        unit: &'g Unit,
        ctx: MatchContext<'g>,
    ) -> impl Iterator<Item = &'g UsageEdge> + 'g {
        ctx.graph
            .edges_from(unit.id(), ctx.kinds.for_mode(self.mode))
            .filter(move |e| {
                !e.is_self_edge() && self.target.test(ctx.graph.unit(e.target), ctx)
            })
    }

    fn holds(&self, unit: &Unit, ctx: MatchContext<'_>) -> bool {
        self.witnesses(unit, ctx).next().is_some()
    }
}

/// A predicate over units.
#[derive(Debug, Clone)]
pub enum UnitPredicate {
    /// Every unit.
    Any,
    /// Units whose package is selected.
    ResidesIn(PackageSelector),
    /// Units whose simple name matches a glob.
    SimpleNameMatching(glob::Pattern),
    /// Units of a kind.
    HasKind(UnitKind),
    /// Units with a usage edge to a unit matching the target.
    Uses(Box<Usage>),
    /// All of the predicates hold.
    And(Vec<UnitPredicate>),
    /// Any of the predicates holds.
    Or(Vec<UnitPredicate>),
    /// The predicate does not hold.
    Not(Box<UnitPredicate>),
}

impl UnitPredicate {
    /// Tests a unit.
    #[must_use]
    pub fn test(&self, unit: &Unit, ctx: MatchContext<'_>) -> bool {
        match self {
            Self::Any => true,
            Self::ResidesIn(selector) => selector.matches(unit.package()),
            Self::SimpleNameMatching(glob) => glob.matches(unit.simple_name()),
            Self::HasKind(kind) => unit.kind() == *kind,
            Self::Uses(usage) => usage.holds(unit, ctx),
            Self::And(all) => all.iter().all(|p| p.test(unit, ctx)),
            Self::Or(any) => any.iter().any(|p| p.test(unit, ctx)),
            Self::Not(inner) => !inner.test(unit, ctx),
        }
    }

    /// Combines with another predicate; both must hold.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), right) => {
                left.push(right);
                Self::And(left)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }

    /// Combines with another predicate; either may hold.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), right) => {
                left.push(right);
                Self::Or(left)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }

    /// Returns a human-readable description, phrased to follow "units that".
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Any => "exist".to_string(),
            Self::ResidesIn(selector) if selector.patterns().len() == 1 => {
                format!("reside in a package {selector}")
            }
            Self::ResidesIn(selector) => format!("reside in any package {selector}"),
            Self::SimpleNameMatching(glob) => format!("have simple name matching '{glob}'"),
            Self::HasKind(kind) => format!("are of kind {kind}"),
            Self::Uses(usage) => format!(
                "{} units that {}",
                usage.mode.verb(),
                usage.target.describe()
            ),
            Self::And(all) => join_descriptions(all, " and "),
            Self::Or(any) => join_descriptions(any, " or "),
            Self::Not(inner) => format!("do not ({})", inner.describe()),
        }
    }
}

fn join_descriptions(predicates: &[UnitPredicate], separator: &str) -> String {
    predicates
        .iter()
        .map(UnitPredicate::describe)
        .collect::<Vec<_>>()
        .join(separator)
}

impl std::ops::Not for UnitPredicate {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}

impl fmt::Display for UnitPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Every unit.
#[must_use]
pub fn any_unit() -> UnitPredicate {
    UnitPredicate::Any
}

/// Units residing in a package matching `pattern`.
///
/// # Errors
///
/// Returns error if the pattern is invalid.
pub fn resides_in_package(pattern: &str) -> Result<UnitPredicate, PatternError> {
    resides_in_any_package([pattern])
}

/// Units residing in a package matching any of `patterns`.
///
/// # Errors
///
/// Returns error if a pattern is invalid.
pub fn resides_in_any_package<I, S>(patterns: I) -> Result<UnitPredicate, PatternError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    PackageSelector::parse(patterns).map(UnitPredicate::ResidesIn)
}

/// Units whose simple name matches a shell-style glob such as `*Service`.
///
/// # Errors
///
/// Returns error if the glob is invalid.
pub fn has_simple_name_matching(glob: &str) -> Result<UnitPredicate, PatternError> {
    glob::Pattern::new(glob)
        .map(UnitPredicate::SimpleNameMatching)
        .map_err(|e| PatternError::InvalidWildcard {
            pattern: glob.to_string(),
            reason: e.to_string(),
        })
}

/// Units of the given kind.
#[must_use]
pub fn has_kind(kind: UnitKind) -> UnitPredicate {
    UnitPredicate::HasKind(kind)
}

/// Units with an outgoing dependency edge to a unit matching `target`.
#[must_use]
pub fn depends_on_classes_that(target: UnitPredicate) -> UnitPredicate {
    uses_classes_that(ScanMode::DependOn, target)
}

/// Units with an outgoing access edge to a unit matching `target`.
///
/// Constant references never count; see the module docs.
#[must_use]
pub fn accesses_classes_that(target: UnitPredicate) -> UnitPredicate {
    uses_classes_that(ScanMode::Access, target)
}

/// Units with an outgoing edge scanned by `mode` to a unit matching `target`.
#[must_use]
pub fn uses_classes_that(mode: ScanMode, target: UnitPredicate) -> UnitPredicate {
    UnitPredicate::Uses(Box::new(Usage::new(mode, target)))
}
