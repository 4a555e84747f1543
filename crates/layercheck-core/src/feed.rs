//! Input feed import: turns unit and edge records into a [`SymbolGraph`].
//!
//! The feed is produced by a language-specific front end. Its JSON shape is
//!
//! ```json
//! {
//!   "units": [{ "name": "com.acme.web.Controller", "kind": "class" }],
//!   "edges": [{ "sourceName": "com.acme.web.Controller",
//!               "targetName": "com.acme.core.Service",
//!               "edgeKind": "method-call" }]
//! }
//! ```
//!
//! Every edge record must resolve to declared units. Types referenced only
//! from member signatures may point outside the graph (platform types) and
//! are skipped when deriving signature edges.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::graph::{
    EdgeKind, FieldSignature, MethodSignature, SymbolGraph, Unit, UnitId, UnitKind, UsageEdge,
};

/// Errors raised while importing a feed. All of them abort the run.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Failed to read a feed file.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// IO error.
        source: std::io::Error,
    },

    /// Feed content is not valid JSON for the feed schema.
    #[error("malformed feed {origin}: {message}")]
    Parse {
        /// Where the feed came from (file path or `<string>`).
        origin: String,
        /// Parser message.
        message: String,
    },

    /// A unit record has an empty name.
    #[error("units[{index}]: unit name must not be empty")]
    EmptyName {
        /// Position of the record.
        index: usize,
    },

    /// Two unit records share a name.
    #[error("duplicate unit `{name}`")]
    DuplicateUnit {
        /// The duplicated name.
        name: String,
    },

    /// A unit's declared package is not a prefix of its name.
    #[error("unit `{name}` does not reside in its declared package `{package}`")]
    PackageMismatch {
        /// Unit name.
        name: String,
        /// Declared package.
        package: String,
    },

    /// An edge references a unit that is not in the feed.
    #[error("edges[{edge}]: unknown unit `{name}`")]
    DanglingReference {
        /// Position of the edge record.
        edge: usize,
        /// The unresolved name.
        name: String,
    },
}

/// Raw feed: the unit and edge records of one or more front-end outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    /// Unit records.
    #[serde(default)]
    pub units: Vec<UnitRecord>,
    /// Edge records.
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}

/// A unit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRecord {
    /// Fully-qualified name.
    pub name: String,
    /// Containing package; derived from `name` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// Unit kind (default: `class`).
    #[serde(default)]
    pub kind: UnitKind,
    /// Declared fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldRecord>,
    /// Declared methods.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodRecord>,
    /// Names of constant members.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constants: Vec<String>,
}

/// A field record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    /// Field name.
    pub name: String,
    /// Fully-qualified type name.
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A method record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodRecord {
    /// Method name.
    pub name: String,
    /// Fully-qualified parameter type names.
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Fully-qualified return type name.
    #[serde(default)]
    pub return_type: Option<String>,
}

/// An edge record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    /// Using unit.
    #[serde(alias = "source")]
    pub source_name: String,
    /// Used unit.
    #[serde(alias = "target")]
    pub target_name: String,
    /// Edge kind.
    #[serde(alias = "kind")]
    pub edge_kind: EdgeKind,
}

impl Feed {
    /// Parses a feed from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Parse`] if the JSON does not match the schema.
    pub fn from_json_str(content: &str) -> Result<Self, ImportError> {
        Self::parse(content, "<string>")
    }

    /// Reads and parses a feed file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ImportError> {
        let content = std::fs::read_to_string(path).map_err(|e| ImportError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ImportError> {
        serde_json::from_str(content).map_err(|e| ImportError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Appends the records of another feed (e.g. one file per module).
    pub fn merge(&mut self, other: Self) {
        self.units.extend(other.units);
        self.edges.extend(other.edges);
    }
}

/// Import settings.
#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Add field/parameter/return type edges from member signatures.
    pub derive_signature_edges: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            derive_signature_edges: true,
        }
    }
}

/// Imports a feed with default options.
///
/// # Errors
///
/// Returns an [`ImportError`] if the feed is malformed or an edge cannot be
/// resolved.
pub fn import_units(feed: Feed) -> Result<SymbolGraph, ImportError> {
    import_with(feed, ImportOptions::default())
}

/// Imports a feed.
///
/// # Errors
///
/// Returns an [`ImportError`] if the feed is malformed or an edge cannot be
/// resolved.
pub fn import_with(feed: Feed, options: ImportOptions) -> Result<SymbolGraph, ImportError> {
    let mut records = feed.units;
    for (index, record) in records.iter().enumerate() {
        if record.name.trim().is_empty() {
            return Err(ImportError::EmptyName { index });
        }
    }
    records.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(pair) = records.windows(2).find(|w| w[0].name == w[1].name) {
        return Err(ImportError::DuplicateUnit {
            name: pair[0].name.clone(),
        });
    }

    let units = records
        .into_iter()
        .enumerate()
        .map(|(i, r)| convert_unit(r, UnitId(i)))
        .collect::<Result<Vec<_>, _>>()?;
    let ids: HashMap<&str, UnitId> = units.iter().map(|u| (u.name(), u.id())).collect();

    let mut edges = BTreeSet::new();
    for (i, record) in feed.edges.iter().enumerate() {
        let resolve = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| ImportError::DanglingReference {
                    edge: i,
                    name: name.to_string(),
                })
        };
        edges.insert(UsageEdge {
            source: resolve(&record.source_name)?,
            target: resolve(&record.target_name)?,
            kind: record.edge_kind,
        });
    }

    if options.derive_signature_edges {
        for unit in &units {
            for (type_name, kind) in signature_types(unit) {
                if let Some(&target) = ids.get(type_name) {
                    edges.insert(UsageEdge {
                        source: unit.id(),
                        target,
                        kind,
                    });
                }
            }
        }
    }

    tracing::debug!(
        units = units.len(),
        edges = edges.len(),
        "imported symbol graph"
    );

    Ok(SymbolGraph::from_parts(units, edges.into_iter().collect()))
}

fn convert_unit(record: UnitRecord, id: UnitId) -> Result<Unit, ImportError> {
    let package = match record.package {
        Some(package) => {
            let prefixed = record
                .name
                .strip_prefix(package.as_str())
                .is_some_and(|rest| rest.starts_with('.'));
            if !package.is_empty() && !prefixed {
                return Err(ImportError::PackageMismatch {
                    name: record.name,
                    package,
                });
            }
            package
        }
        None => record
            .name
            .rsplit_once('.')
            .map(|(package, _)| package.to_string())
            .unwrap_or_default(),
    };

    Ok(Unit {
        id,
        name: record.name,
        package,
        kind: record.kind,
        fields: record
            .fields
            .into_iter()
            .map(|f| FieldSignature {
                name: f.name,
                type_name: f.type_name,
            })
            .collect(),
        methods: record
            .methods
            .into_iter()
            .map(|m| MethodSignature {
                name: m.name,
                parameter_types: m.parameters,
                return_type: m.return_type,
            })
            .collect(),
        constants: record.constants.into_iter().collect(),
    })
}

fn signature_types(unit: &Unit) -> Vec<(&str, EdgeKind)> {
    let fields = unit
        .fields()
        .iter()
        .map(|f| (f.type_name.as_str(), EdgeKind::FieldType));
    let params = unit.methods().iter().flat_map(|m| {
        m.parameter_types
            .iter()
            .map(|p| (p.as_str(), EdgeKind::ParameterType))
    });
    let returns = unit
        .methods()
        .iter()
        .filter_map(|m| m.return_type.as_deref())
        .map(|r| (r, EdgeKind::ReturnType));
    fields.chain(params).chain(returns).collect()
}

impl SymbolGraph {
    /// Parses and imports a JSON feed.
    ///
    /// # Errors
    ///
    /// Returns an [`ImportError`] if parsing or import fails.
    pub fn from_json_str(content: &str) -> Result<Self, ImportError> {
        import_units(Feed::from_json_str(content)?)
    }

    /// Reads and imports a JSON feed file.
    ///
    /// # Errors
    ///
    /// Returns an [`ImportError`] if reading, parsing or import fails.
    pub fn from_file(path: &Path) -> Result<Self, ImportError> {
        import_units(Feed::from_file(path)?)
    }
}

/// Builder for assembling a graph in code, mostly for tests and embeddings.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    feed: Feed,
    options: ImportOptions,
}

impl GraphBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class unit; the package is derived from the name.
    #[must_use]
    pub fn unit(self, name: &str) -> Self {
        self.unit_of_kind(name, UnitKind::Class)
    }

    /// Adds a unit of the given kind.
    #[must_use]
    pub fn unit_of_kind(self, name: &str, kind: UnitKind) -> Self {
        self.record(UnitRecord {
            name: name.to_string(),
            package: None,
            kind,
            fields: Vec::new(),
            methods: Vec::new(),
            constants: Vec::new(),
        })
    }

    /// Adds a full unit record.
    #[must_use]
    pub fn record(mut self, record: UnitRecord) -> Self {
        self.feed.units.push(record);
        self
    }

    /// Adds an edge record.
    #[must_use]
    pub fn edge(mut self, source: &str, target: &str, kind: EdgeKind) -> Self {
        self.feed.edges.push(EdgeRecord {
            source_name: source.to_string(),
            target_name: target.to_string(),
            edge_kind: kind,
        });
        self
    }

    /// Sets the import options.
    #[must_use]
    pub fn options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    /// Imports the collected records.
    ///
    /// # Errors
    ///
    /// Returns an [`ImportError`] under the same conditions as [`import_with`].
    pub fn build(self) -> Result<SymbolGraph, ImportError> {
        import_with(self.feed, self.options)
    }
}
