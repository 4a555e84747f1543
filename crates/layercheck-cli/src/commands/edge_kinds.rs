//! Edge-kinds command implementation.

use layercheck_core::{EdgeKind, EdgeKindSet};

/// Runs the edge-kinds command.
pub fn run() {
    println!("Edge kinds:\n");
    println!("{:<22} {:<8} {:<8} Reliable", "Kind", "Depend", "Access");
    println!("{}", "-".repeat(50));

    let dependency = EdgeKindSet::all();
    let access = EdgeKindSet::access();
    for kind in EdgeKind::ALL {
        println!(
            "{:<22} {:<8} {:<8} {}",
            kind.as_str(),
            yes_no(dependency.contains(kind)),
            yes_no(access.contains(kind)),
            yes_no(kind.is_reliably_detectable()),
        );
    }

    println!("\nDefaults shown; override with access-kinds / dependency-kinds in [policy].");
    println!("Constant references are inlined by compilers and may be missing from feeds.");
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
