//! Violations and reports.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::graph::EdgeKind;

/// Severity level for violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message, does not fail the check.
    Info,
    /// Warning that should be addressed.
    Warning,
    /// Error that must be fixed.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Self::Error),
            "warning" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "unknown severity `{other}`, expected: error, warning, info"
            )),
        }
    }
}

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    /// An edge hit an ad-hoc forbidden-usage rule.
    ForbiddenUsage,
    /// An edge broke a layer access rule.
    LayerAccess,
    /// A rule selected no unit at all.
    EmptyScan,
    /// A rule did not finish within its deadline.
    EvaluationTimeout,
}

impl ViolationKind {
    /// Returns the stable code of this kind.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::ForbiddenUsage => "LC001",
            Self::LayerAccess => "LC002",
            Self::EmptyScan => "LC010",
            Self::EvaluationTimeout => "LC011",
        }
    }

    /// Returns the kebab-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ForbiddenUsage => "forbidden-usage",
            Self::LayerAccess => "layer-access",
            Self::EmptyScan => "empty-scan",
            Self::EvaluationTimeout => "evaluation-timeout",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The edge a violation is about, by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeRef {
    /// Using unit.
    pub source: String,
    /// Edge kind.
    pub kind: EdgeKind,
    /// Used unit.
    pub target: String,
    /// Package of the used unit.
    pub target_package: String,
}

impl fmt::Display for EdgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' uses '{}' in package '{}' via {}",
            self.source, self.target, self.target_package, self.kind
        )
    }
}

/// A finding produced by evaluating one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Stable code (e.g. "LC002").
    pub code: String,
    /// Name of the rule that produced it.
    pub rule: String,
    /// Position of the rule in the evaluated policy.
    pub rule_index: usize,
    /// What went wrong.
    pub kind: ViolationKind,
    /// Severity of this violation.
    pub severity: Severity,
    /// Offending edge, absent for empty scans and timeouts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge: Option<EdgeRef>,
    /// Human-readable message.
    pub message: String,
    /// How to fix it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Reference to design document (e.g., "ARCHITECTURE.md L85").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_ref: Option<String>,
}

impl Violation {
    /// Creates a new violation with the kind's code.
    #[must_use]
    pub fn new(
        kind: ViolationKind,
        rule: impl Into<String>,
        rule_index: usize,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: kind.code().to_string(),
            rule: rule.into(),
            rule_index,
            kind,
            severity,
            edge: None,
            message: message.into(),
            help: None,
            doc_ref: None,
        }
    }

    /// Attaches the offending edge.
    #[must_use]
    pub fn with_edge(mut self, edge: EdgeRef) -> Self {
        self.edge = Some(edge);
        self
    }

    /// Adds a fix suggestion.
    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Adds a design document reference.
    #[must_use]
    pub fn with_doc_ref(mut self, doc_ref: impl Into<String>) -> Self {
        self.doc_ref = Some(doc_ref.into());
        self
    }

    /// Whether this is a reported empty scan, which never fails a check.
    #[must_use]
    pub fn is_informational(&self) -> bool {
        self.kind == ViolationKind::EmptyScan && self.severity == Severity::Info
    }

    /// Whether this violation fails a check at the given threshold.
    ///
    /// Informational diagnostics never fail, even at an `info` threshold.
    #[must_use]
    pub fn fails_at(&self, threshold: Severity) -> bool {
        !self.is_informational() && self.severity >= threshold
    }

    /// Formats the violation for terminal output.
    #[must_use]
    pub fn format(&self) -> String {
        use std::fmt::Write;
        let mut output = format!("{} {} [{}]\n", self.code, self.kind, self.rule);
        let _ = writeln!(output, "  {}: {}", self.severity, self.message);
        if let Some(help) = &self.help {
            let _ = writeln!(output, "  = help: {help}");
        }
        if let Some(doc_ref) = &self.doc_ref {
            let _ = writeln!(output, "  = see: {doc_ref}");
        }
        output
    }

    /// Sort key giving reproducible report order.
    pub(crate) fn sort_key(&self) -> (usize, &str, Option<EdgeKind>, &str, ViolationKind) {
        let (source, kind, target) = match &self.edge {
            Some(edge) => (edge.source.as_str(), Some(edge.kind), edge.target.as_str()),
            None => ("", None, ""),
        };
        (self.rule_index, source, kind, target, self.kind)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.severity, self.code, self.rule, self.message
        )?;
        if let Some(doc_ref) = &self.doc_ref {
            write!(f, " (see: {doc_ref})")?;
        }
        Ok(())
    }
}

/// Converts a Violation to a miette Diagnostic for rich error display.
#[derive(Debug, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct ViolationDiagnostic {
    code: String,
    message: String,
    help: Option<String>,
    severity: miette::Severity,
}

impl Diagnostic for ViolationDiagnostic {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.code))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(self.severity)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display + 'a>)
    }
}

impl From<&Violation> for ViolationDiagnostic {
    fn from(v: &Violation) -> Self {
        let help = match (&v.help, &v.doc_ref) {
            (Some(help), Some(doc)) => Some(format!("{help} (see: {doc})")),
            (Some(help), None) => Some(help.clone()),
            (None, Some(doc)) => Some(format!("see: {doc}")),
            (None, None) => None,
        };
        Self {
            code: v.code.clone(),
            message: format!("{}: {}", v.rule, v.message),
            help,
            severity: match v.severity {
                Severity::Info => miette::Severity::Advice,
                Severity::Warning => miette::Severity::Warning,
                Severity::Error => miette::Severity::Error,
            },
        }
    }
}

/// Outcome of evaluating a policy against a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// All violations, in reproducible order.
    pub violations: Vec<Violation>,
    /// Number of rules evaluated.
    pub rules_evaluated: usize,
    /// Number of units in the graph.
    pub units_checked: usize,
    /// Lowest severity that fails the check.
    pub fail_on: Severity,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            violations: Vec::new(),
            rules_evaluated: 0,
            units_checked: 0,
            fail_on: Severity::Error,
        }
    }
}

impl Report {
    /// Creates a new empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a report from violations; never fails.
    #[must_use]
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            violations,
            ..Self::default()
        }
    }

    /// Sets the failure threshold.
    #[must_use]
    pub fn with_fail_on(mut self, fail_on: Severity) -> Self {
        self.fail_on = fail_on;
        self
    }

    /// True iff no violation reaches the failure threshold.
    ///
    /// Informational diagnostics such as reported empty scans never fail.
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.has_violations_at(self.fail_on)
    }

    /// Returns the violations that fail the check.
    #[must_use]
    pub fn failures(&self) -> Vec<&Violation> {
        self.violations
            .iter()
            .filter(|v| v.fails_at(self.fail_on))
            .collect()
    }

    /// One message per violation.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }

    /// Returns true if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.severity == Severity::Error)
    }

    /// Checks if any violations meet or exceed the given severity threshold.
    #[must_use]
    pub fn has_violations_at(&self, severity: Severity) -> bool {
        self.violations.iter().any(|v| v.fails_at(severity))
    }

    /// Returns violations of a kind.
    #[must_use]
    pub fn by_kind(&self, kind: ViolationKind) -> Vec<&Violation> {
        self.violations.iter().filter(|v| v.kind == kind).collect()
    }

    /// Counts violations by severity.
    #[must_use]
    pub fn count_by_severity(&self) -> (usize, usize, usize) {
        let count = |s: Severity| self.violations.iter().filter(|v| v.severity == s).count();
        (
            count(Severity::Error),
            count(Severity::Warning),
            count(Severity::Info),
        )
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let (errors, warnings, infos) = self.count_by_severity();
        format!(
            "Found {errors} error(s), {warnings} warning(s), {infos} info(s) from {} rule(s) over {} unit(s)",
            self.rules_evaluated, self.units_checked
        )
    }

    /// Formats violations as a test failure report.
    ///
    /// Produces a human-readable multi-line report suitable for `panic!()`
    /// messages when a check runs inside a test suite.
    #[must_use]
    pub fn format_test_report(&self, fail_on: Severity) -> String {
        use std::fmt::Write;

        let failing: Vec<&Violation> = self
            .violations
            .iter()
            .filter(|v| v.fails_at(fail_on))
            .collect();

        let mut report = String::new();
        let _ = writeln!(
            report,
            "\n=== layercheck: {} violation(s) ===\n",
            failing.len()
        );

        for v in &failing {
            let _ = write!(report, "{}", v.format());
            let _ = writeln!(report);
        }

        let _ = writeln!(report, "{}", self.summary());
        report
    }

    /// Adds violations from another report.
    pub fn extend(&mut self, other: Self) {
        self.violations.extend(other.violations);
        self.rules_evaluated += other.rules_evaluated;
        self.units_checked = self.units_checked.max(other.units_checked);
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for violation in &self.violations {
            writeln!(f, "{violation}")?;
        }
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_violation(severity: Severity) -> Violation {
        Violation::new(
            ViolationKind::LayerAccess,
            "layer 'core' may only be accessed by layers [web]",
            0,
            severity,
            "'batch.Job' (no layer) uses 'core.Service' in package 'core' via method-call",
        )
        .with_edge(EdgeRef {
            source: "batch.Job".into(),
            kind: EdgeKind::MethodCall,
            target: "core.Service".into(),
            target_package: "core".into(),
        })
    }

    fn empty_scan() -> Violation {
        Violation::new(
            ViolationKind::EmptyScan,
            "layer 'legacy'",
            1,
            Severity::Info,
            "no unit resides in 'legacy..'",
        )
    }

    #[test]
    fn empty_report_passes() {
        let report = Report::from_violations(vec![]);
        assert!(report.passed());
        assert!(report.messages().is_empty());
    }

    #[test]
    fn info_diagnostics_do_not_fail() {
        let report = Report::from_violations(vec![empty_scan()]);
        assert!(report.passed());
        assert!(report.failures().is_empty());
        assert_eq!(report.by_kind(ViolationKind::EmptyScan).len(), 1);
    }

    #[test]
    fn info_threshold_still_ignores_reported_empty_scans() {
        let report = Report::from_violations(vec![empty_scan()]).with_fail_on(Severity::Info);
        assert!(report.passed());
        assert!(report.failures().is_empty());

        // an empty scan raised to a failure is no longer informational
        let mut failing = empty_scan();
        failing.severity = Severity::Error;
        let report = Report::from_violations(vec![failing]).with_fail_on(Severity::Info);
        assert!(!report.passed());
    }

    #[test]
    fn fail_on_threshold_controls_warnings() {
        let report = Report::from_violations(vec![edge_violation(Severity::Warning)]);
        assert!(report.passed());
        assert!(!report.clone().with_fail_on(Severity::Warning).passed());
    }

    #[test]
    fn messages_name_unit_kind_and_target() {
        let report = Report::from_violations(vec![edge_violation(Severity::Error)]);
        let messages = report.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("batch.Job"));
        assert!(messages[0].contains("method-call"));
        assert!(messages[0].contains("core.Service"));
        assert!(!report.passed());
    }

    #[test]
    fn edge_ref_display() {
        let v = edge_violation(Severity::Error);
        assert_eq!(
            v.edge.unwrap().to_string(),
            "'batch.Job' uses 'core.Service' in package 'core' via method-call"
        );
    }

    #[test]
    fn violation_format_includes_help_and_doc_ref() {
        let v = edge_violation(Severity::Error)
            .with_help("route the call through layer 'web'")
            .with_doc_ref("ARCHITECTURE.md L12");
        let formatted = v.format();
        assert!(formatted.contains("= help: route the call through layer 'web'"));
        assert!(formatted.contains("= see: ARCHITECTURE.md L12"));
        assert!(v.to_string().ends_with("(see: ARCHITECTURE.md L12)"));
    }

    #[test]
    fn diagnostic_maps_severity_and_help() {
        let v = edge_violation(Severity::Warning).with_doc_ref("ARCH.md");
        let diag = ViolationDiagnostic::from(&v);
        assert_eq!(diag.severity(), Some(miette::Severity::Warning));
        assert_eq!(diag.help().map(|h| h.to_string()).as_deref(), Some("see: ARCH.md"));
        assert!(diag.to_string().starts_with("[LC002]"));
    }

    #[test]
    fn test_report_snapshot() {
        let mut report =
            Report::from_violations(vec![edge_violation(Severity::Error), empty_scan()]);
        report.rules_evaluated = 2;
        report.units_checked = 7;
        insta::assert_snapshot!(report.format_test_report(Severity::Error).trim(), @r"
        === layercheck: 1 violation(s) ===

        LC002 layer-access [layer 'core' may only be accessed by layers [web]]
          error: 'batch.Job' (no layer) uses 'core.Service' in package 'core' via method-call

        Found 1 error(s), 0 warning(s), 1 info(s) from 2 rule(s) over 7 unit(s)
        ");
    }

    #[test]
    fn extend_merges_counts() {
        let mut a = Report::from_violations(vec![empty_scan()]);
        a.rules_evaluated = 1;
        let mut b = Report::from_violations(vec![edge_violation(Severity::Error)]);
        b.rules_evaluated = 2;
        a.extend(b);
        assert_eq!(a.violations.len(), 2);
        assert_eq!(a.rules_evaluated, 3);
    }
}
