//! TOML deserialization types (DTO layer).
//!
//! These types exist solely for serde deserialization.
//! They are converted to a [`crate::policy::Policy`] via the loader.

use serde::Deserialize;

/// Raw TOML representation of a policy file.
///
/// Sections: `[policy]`, `[[layers]]`, `[[forbid]]` and
/// `[[ignore-dependency]]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyConfigDto {
    /// Evaluation options.
    #[serde(default)]
    pub policy: PolicyOptionsDto,

    /// Layer definitions and their access rules.
    #[serde(default)]
    pub layers: Vec<LayerDto>,

    /// Ad-hoc forbidden-usage rules.
    #[serde(default)]
    pub forbid: Vec<ForbidDto>,

    /// Edges exempt from every rule.
    #[serde(rename = "ignore-dependency", default)]
    pub ignore_dependency: Vec<IgnoreDependencyDto>,
}

/// TOML representation of the `[policy]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyOptionsDto {
    /// Scan mode of layer rules: "depend-on", "access" or "either".
    #[serde(default)]
    pub mode: Option<String>,
    /// "suppress", "report" or "fail".
    #[serde(default)]
    pub empty_scan: Option<String>,
    /// Shorthand; applied after `empty-scan`.
    #[serde(default)]
    pub fail_on_empty_scan: Option<bool>,
    /// "all" or "layers-only".
    #[serde(default)]
    pub layer_dependencies: Option<String>,
    /// Per-rule deadline in milliseconds.
    #[serde(default)]
    pub rule_timeout_ms: Option<u64>,
    /// Lowest failing severity (default: "error").
    #[serde(default)]
    pub fail_on: Option<String>,
    /// Edge kinds scanned in access mode.
    #[serde(default)]
    pub access_kinds: Option<Vec<String>>,
    /// Edge kinds scanned in depend-on mode.
    #[serde(default)]
    pub dependency_kinds: Option<Vec<String>>,
}

/// TOML representation of a layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LayerDto {
    /// Layer name (e.g., "presentation").
    pub name: String,
    /// Package patterns (e.g., "com.acme.web..").
    pub packages: Vec<String>,
    /// No other layer may use this one.
    #[serde(default)]
    pub may_not_be_accessed: bool,
    /// Layers allowed to use this one.
    #[serde(default)]
    pub may_only_be_accessed_by: Option<Vec<String>>,
    /// Layers this one may use.
    #[serde(default)]
    pub may_only_access: Option<Vec<String>>,
    /// Scan mode of this layer's rules (default: `policy.mode`).
    #[serde(default)]
    pub mode: Option<String>,
}

/// TOML representation of a forbidden-usage rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ForbidDto {
    /// Optional rule name (e.g., "no-sql-in-domain").
    #[serde(default)]
    pub name: Option<String>,
    /// Package patterns of the checked units.
    pub units_in: Vec<String>,
    /// Package patterns of the forbidden units.
    pub forbidden: Vec<String>,
    /// Scan mode (default: "depend-on").
    #[serde(default = "default_mode_str")]
    pub mode: String,
    /// Severity (default: "error").
    #[serde(default = "default_severity_str")]
    pub severity: String,
    /// Reason prefixed to each finding.
    #[serde(default)]
    pub message: Option<String>,
    /// Document reference.
    #[serde(default)]
    pub doc: Option<String>,
}

/// TOML representation of an ignored dependency.
#[derive(Debug, Clone, Deserialize)]
pub struct IgnoreDependencyDto {
    /// Package patterns of the using units.
    pub from: Vec<String>,
    /// Package patterns of the used units.
    pub to: Vec<String>,
}

fn default_mode_str() -> String {
    "depend-on".to_string()
}

fn default_severity_str() -> String {
    "error".to_string()
}
