//! Init command implementation.

use anyhow::{bail, Result};
use std::path::Path;

use crate::inputs::PROJECT_POLICY_NAMES;

const DEFAULT_CONFIG: &str = r#"# layercheck policy

[policy]
# Edges scanned by layer rules: "depend-on" (every edge kind),
# "access" (method calls, static member access, instantiation) or "either"
mode = "depend-on"

# Rules that select no unit: "suppress", "report" (informational) or "fail"
empty-scan = "report"

# "all": units outside every layer may not use a restricted layer
# "layers-only": only edges between layers are checked
layer-dependencies = "all"

# rule-timeout-ms = 5000
# fail-on = "error"

[[layers]]
name = "presentation"
packages = ["com.example.web.."]
may-not-be-accessed = true

[[layers]]
name = "service"
packages = ["com.example.service.."]
may-only-be-accessed-by = ["presentation"]
# mode = "access"  # overrides [policy] mode for this layer's rules

[[layers]]
name = "persistence"
packages = ["com.example.persistence.."]
may-only-be-accessed-by = ["service"]

# [[forbid]]
# name = "no-sql-in-services"
# units-in = ["com.example.service.."]
# forbidden = ["java.sql.."]
# mode = "access"
# message = "Services go through the persistence layer"

# [[ignore-dependency]]
# from = ["..legacy.."]
# to = [".."]
"#;

/// Runs the init command.
pub fn run(force: bool) -> Result<()> {
    write_config(Path::new(PROJECT_POLICY_NAMES[0]), force)?;

    println!("Created {}", PROJECT_POLICY_NAMES[0]);
    println!("\nNext steps:");
    println!("  1. Edit {} to describe your layers", PROJECT_POLICY_NAMES[0]);
    println!("  2. Run: layercheck check --graph <feed.json>");

    Ok(())
}

fn write_config(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "Policy file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }
    std::fs::write(config_path, DEFAULT_CONFIG)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn starter_policy_loads() {
        let policy = layercheck_core::declarative::load_policy_from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(policy.layers().len(), 3);
        assert_eq!(policy.rules().len(), 3);
    }

    #[test]
    fn existing_file_needs_force() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("layercheck.toml");
        std::fs::write(&path, "# mine").unwrap();

        assert!(write_config(&path, false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine");

        write_config(&path, true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);
    }
}
