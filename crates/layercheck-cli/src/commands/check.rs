//! Check command implementation.

use anyhow::{Context, Result};
use layercheck_core::{declarative, import_units, Evaluator, Feed, ScanMode};
use std::path::{Path, PathBuf};

use crate::inputs::{Inputs, PolicyOrigin};
use crate::OutputFormat;

/// Runs the check command. Returns whether the check passed.
pub fn run(
    graphs: &[PathBuf],
    format: OutputFormat,
    mode: Option<ScanMode>,
    config_path: Option<&Path>,
) -> Result<bool> {
    let inputs = Inputs::locate(Path::new("."), config_path, graphs)?;
    let policy_path = &inputs.policy.path;
    if inputs.policy.origin == PolicyOrigin::Global {
        tracing::info!("Using global policy: {}", policy_path.display());
    }
    let mut policy = declarative::load_policy_from_file(policy_path)
        .with_context(|| format!("Failed to load {}", policy_path.display()))?;
    if let Some(mode) = mode {
        tracing::debug!("Layer rules default to {mode} mode");
        policy = policy.with_layer_mode(mode);
    }

    tracing::info!("Importing {} feed file(s)", inputs.feeds.len());
    let mut feed = Feed::default();
    for file in &inputs.feeds {
        let part = Feed::from_file(file)
            .with_context(|| format!("Failed to load feed {}", file.display()))?;
        feed.merge(part);
    }
    let graph = import_units(feed).context("Failed to import symbol graph")?;

    let evaluator = Evaluator::new(&graph, &policy).context("Policy does not fit the graph")?;
    let report = evaluator.report();

    super::output::print(&report, format)?;

    Ok(report.passed())
}
