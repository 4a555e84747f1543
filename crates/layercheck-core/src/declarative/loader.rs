//! DTO → Policy conversion with validation.

use std::time::Duration;

use crate::graph::{EdgeKind, EdgeKindSet};
use crate::pattern::{PackagePattern, PatternError};
use crate::policy::{
    layered_architecture, no_units_in, ConfigError, EmptyScanPolicy, Policy, PolicyBuilder,
};
use crate::predicate::ScanMode;
use crate::types::Severity;

use super::config_dto::{
    ForbidDto, IgnoreDependencyDto, LayerDto, PolicyConfigDto, PolicyOptionsDto,
};

/// Errors during DTO → Policy conversion.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// A package pattern is invalid.
    #[error("{context}: {source}")]
    Validation {
        /// Where the error occurred (e.g., "layers[2].packages[0]").
        context: String,
        /// The underlying pattern error.
        source: PatternError,
    },

    /// A string field holds an unknown value.
    #[error("{context}: unknown value `{value}`, expected: {expected}")]
    UnknownValue {
        /// Where the error occurred.
        context: String,
        /// The invalid value.
        value: String,
        /// Accepted values.
        expected: String,
    },

    /// Cross-reference validation of the assembled policy failed.
    #[error("{0}")]
    Policy(#[from] ConfigError),
}

/// Converts a `PolicyConfigDto` to a validated `Policy`.
///
/// # Errors
///
/// Returns the first field-level error, or the policy validation errors.
pub fn load(dto: PolicyConfigDto) -> Result<Policy, LoadError> {
    let mut builder = apply_options(layered_architecture(), &dto.policy)?;

    for (i, layer) in dto.layers.into_iter().enumerate() {
        builder = apply_layer(builder, layer, i)?;
    }
    for (i, forbid) in dto.forbid.into_iter().enumerate() {
        builder = apply_forbid(builder, forbid, i)?;
    }
    for (i, ignore) in dto.ignore_dependency.into_iter().enumerate() {
        builder = apply_ignore(builder, ignore, i)?;
    }

    Ok(builder.build()?)
}

fn apply_options(
    mut builder: PolicyBuilder,
    dto: &PolicyOptionsDto,
) -> Result<PolicyBuilder, LoadError> {
    if let Some(mode) = &dto.mode {
        builder = builder.scan_mode(parse_mode(mode, "policy.mode")?);
    }
    if let Some(empty_scan) = &dto.empty_scan {
        let policy = match empty_scan.as_str() {
            "suppress" => EmptyScanPolicy::Suppress,
            "report" => EmptyScanPolicy::Report,
            "fail" => EmptyScanPolicy::Fail,
            other => return Err(unknown("policy.empty-scan", other, "suppress, report, fail")),
        };
        builder = builder.empty_scan(policy);
    }
    if let Some(fail) = dto.fail_on_empty_scan {
        builder = builder.fail_on_empty_scan(fail);
    }
    if let Some(deps) = &dto.layer_dependencies {
        builder = match deps.as_str() {
            "all" => builder.considering_all_dependencies(),
            "layers-only" => builder.considering_only_dependencies_in_layers(),
            other => {
                return Err(unknown(
                    "policy.layer-dependencies",
                    other,
                    "all, layers-only",
                ))
            }
        };
    }
    if let Some(ms) = dto.rule_timeout_ms {
        builder = builder.rule_timeout(Duration::from_millis(ms));
    }
    if let Some(fail_on) = &dto.fail_on {
        builder = builder.fail_on(parse_severity(fail_on, "policy.fail-on")?);
    }
    if let Some(kinds) = &dto.access_kinds {
        builder = builder.access_kinds(parse_kinds(kinds, "policy.access-kinds")?);
    }
    if let Some(kinds) = &dto.dependency_kinds {
        builder = builder.dependency_kinds(parse_kinds(kinds, "policy.dependency-kinds")?);
    }
    Ok(builder)
}

fn apply_layer(
    mut builder: PolicyBuilder,
    dto: LayerDto,
    index: usize,
) -> Result<PolicyBuilder, LoadError> {
    let ctx = format!("layers[{index}]");
    validate_patterns(&dto.packages, &format!("{ctx}.packages"))?;

    let mode = dto
        .mode
        .as_deref()
        .map(|m| parse_mode(m, &format!("{ctx}.mode")))
        .transpose()?;
    let constrain = |builder: PolicyBuilder| {
        let constraint = builder.where_layer(dto.name.clone());
        match mode {
            Some(mode) => constraint.in_mode(mode),
            None => constraint,
        }
    };

    builder = builder.layer(dto.name.clone()).defined_by(dto.packages);
    if dto.may_not_be_accessed {
        builder = constrain(builder).may_not_be_accessed_by_any_layer();
    }
    if let Some(allowed) = dto.may_only_be_accessed_by {
        builder = constrain(builder).may_only_be_accessed_by_layers(allowed);
    }
    if let Some(allowed) = dto.may_only_access {
        builder = constrain(builder).may_only_access_layers(allowed);
    }
    Ok(builder)
}

fn apply_forbid(
    builder: PolicyBuilder,
    dto: ForbidDto,
    index: usize,
) -> Result<PolicyBuilder, LoadError> {
    let ctx = format!("forbid[{index}]");
    validate_patterns(&dto.units_in, &format!("{ctx}.units-in"))?;
    validate_patterns(&dto.forbidden, &format!("{ctx}.forbidden"))?;
    let mode = parse_mode(&dto.mode, &format!("{ctx}.mode"))?;
    let severity = parse_severity(&dto.severity, &format!("{ctx}.severity"))?;

    let mut spec = no_units_in(dto.units_in)
        .should_depend_on_or_access(dto.forbidden, mode)
        .with_severity(severity);
    if let Some(name) = dto.name {
        spec = spec.named(name);
    }
    if let Some(message) = dto.message {
        spec = spec.because(message);
    }
    if let Some(doc) = dto.doc {
        spec = spec.with_doc_ref(doc);
    }
    Ok(builder.rule(spec))
}

fn apply_ignore(
    builder: PolicyBuilder,
    dto: IgnoreDependencyDto,
    index: usize,
) -> Result<PolicyBuilder, LoadError> {
    let ctx = format!("ignore-dependency[{index}]");
    validate_patterns(&dto.from, &format!("{ctx}.from"))?;
    validate_patterns(&dto.to, &format!("{ctx}.to"))?;
    Ok(builder.ignore_dependency(dto.from, dto.to))
}

fn validate_patterns(patterns: &[String], context: &str) -> Result<(), LoadError> {
    for (i, p) in patterns.iter().enumerate() {
        PackagePattern::new(p).map_err(|e| LoadError::Validation {
            context: format!("{context}[{i}]"),
            source: e,
        })?;
    }
    Ok(())
}

fn unknown(context: &str, value: &str, expected: &str) -> LoadError {
    LoadError::UnknownValue {
        context: context.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

fn parse_mode(value: &str, context: &str) -> Result<ScanMode, LoadError> {
    value
        .parse()
        .map_err(|_| unknown(context, value, "depend-on, access, either"))
}

fn parse_severity(value: &str, context: &str) -> Result<Severity, LoadError> {
    value
        .parse()
        .map_err(|_| unknown(context, value, "error, warning, info"))
}

fn parse_kinds(values: &[String], context: &str) -> Result<EdgeKindSet, LoadError> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.parse::<EdgeKind>().map_err(|_| {
                let expected: Vec<&str> = EdgeKind::ALL.iter().copied().map(EdgeKind::as_str).collect();
                unknown(&format!("{context}[{i}]"), v, &expected.join(", "))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{LayerDependencies, Rule};

    fn parse_and_load(toml_str: &str) -> Result<Policy, LoadError> {
        let dto: PolicyConfigDto = toml::from_str(toml_str).unwrap();
        load(dto)
    }

    // -- Happy path --

    #[test]
    fn load_empty_config() {
        let policy = parse_and_load("").unwrap();
        assert!(policy.rules().is_empty());
        assert!(policy.layers().is_empty());
    }

    #[test]
    fn load_full_config() {
        let policy = parse_and_load(
            r#"
[policy]
mode = "either"
empty-scan = "suppress"
layer-dependencies = "layers-only"
rule-timeout-ms = 1500
fail-on = "warning"
access-kinds = ["method-call", "instantiation"]

[[layers]]
name = "web"
packages = ["com.acme.web.."]
may-not-be-accessed = true
may-only-access = ["core"]

[[layers]]
name = "core"
packages = ["com.acme.core..", "com.acme.shared.."]
may-only-be-accessed-by = ["web"]

[[forbid]]
name = "no-sql-in-core"
units-in = ["com.acme.core.."]
forbidden = ["java.sql.."]
mode = "access"
severity = "warning"
message = "core stays storage agnostic"
doc = "ARCHITECTURE.md"

[[ignore-dependency]]
from = ["..legacy.."]
to = [".."]
"#,
        )
        .unwrap();

        let opts = policy.options();
        assert_eq!(opts.layer_mode, ScanMode::Either);
        assert_eq!(opts.empty_scan, EmptyScanPolicy::Suppress);
        assert_eq!(opts.layer_dependencies, LayerDependencies::LayersOnly);
        assert_eq!(opts.rule_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(opts.fail_on, Severity::Warning);
        assert_eq!(
            opts.kinds.access,
            EdgeKindSet::EMPTY
                .with(EdgeKind::MethodCall)
                .with(EdgeKind::Instantiation)
        );

        let names: Vec<String> = policy.rules().iter().map(Rule::name).collect();
        assert_eq!(
            names,
            vec![
                "layer 'web' may not be accessed by any layer",
                "layer 'web' may only access layers [core]",
                "layer 'core' may only be accessed by layers [web]",
                "no-sql-in-core",
            ]
        );
        let Rule::Forbidden(rule) = &policy.rules()[3] else {
            panic!("expected forbidden rule");
        };
        assert_eq!(rule.severity(), Severity::Warning);
        assert_eq!(rule.usage().mode(), ScanMode::Access);
        assert_eq!(policy.ignored_dependencies().len(), 1);
    }

    #[test]
    fn layer_mode_overrides_policy_mode() {
        let policy = parse_and_load(
            r#"
[policy]
mode = "depend-on"

[[layers]]
name = "web"
packages = ["web.."]

[[layers]]
name = "service"
packages = ["service.."]
may-only-be-accessed-by = ["web"]
mode = "access"

[[layers]]
name = "dao"
packages = ["dao.."]
may-only-be-accessed-by = ["service"]
"#,
        )
        .unwrap();
        let modes: Vec<Option<ScanMode>> = policy
            .rules()
            .iter()
            .filter_map(|r| match r {
                Rule::Layer(l) => Some(l.mode()),
                Rule::Forbidden(_) => None,
            })
            .collect();
        assert_eq!(modes, vec![Some(ScanMode::Access), None]);

        let err = parse_and_load(
            "[[layers]]\nname = \"web\"\npackages = [\"web..\"]\nmode = \"calls\"\n",
        )
        .unwrap_err();
        assert!(matches!(&err, LoadError::UnknownValue { context, .. } if context == "layers[0].mode"));
    }

    #[test]
    fn fail_on_empty_scan_shorthand() {
        let policy = parse_and_load("[policy]\nfail-on-empty-scan = true\n").unwrap();
        assert_eq!(policy.options().empty_scan, EmptyScanPolicy::Fail);

        let policy = parse_and_load("[policy]\nfail-on-empty-scan = false\n").unwrap();
        assert_eq!(policy.options().empty_scan, EmptyScanPolicy::Report);
    }

    // -- Validation errors --

    #[test]
    fn invalid_pattern_reports_context_path() {
        let err = parse_and_load(
            r#"
[[layers]]
name = "web"
packages = ["web.."]

[[layers]]
name = "core"
packages = ["core..", "core...impl"]
"#,
        )
        .unwrap_err();
        assert!(
            matches!(&err, LoadError::Validation { context, .. } if context == "layers[1].packages[1]")
        );
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = parse_and_load(
            r#"
[[forbid]]
units-in = ["a.."]
forbidden = ["b.."]
mode = "calls"
"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "forbid[0].mode: unknown value `calls`, expected: depend-on, access, either"
        );
    }

    #[test]
    fn unknown_edge_kind_is_rejected() {
        let err = parse_and_load("[policy]\naccess-kinds = [\"method-call\", \"reads\"]\n")
            .unwrap_err();
        assert!(
            matches!(&err, LoadError::UnknownValue { context, value, .. }
                if context == "policy.access-kinds[1]" && value == "reads")
        );
    }

    #[test]
    fn undefined_layer_surfaces_config_error() {
        let err = parse_and_load(
            r#"
[[layers]]
name = "web"
packages = ["web.."]
may-only-access = ["core"]
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Policy(ConfigError::UndefinedLayer { ref name, .. }) if name == "core"
        ));
    }

    #[test]
    fn conflicting_incoming_rules_are_rejected() {
        let err = parse_and_load(
            r#"
[[layers]]
name = "web"
packages = ["web.."]
may-not-be-accessed = true
may-only-be-accessed-by = []
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Policy(ConfigError::ConflictingRule { .. })
        ));
    }
}
