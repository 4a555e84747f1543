//! Shared output formatting for check reports.

use anyhow::Result;
use layercheck_core::{Report, Severity, ViolationDiagnostic};

use crate::OutputFormat;

/// Print a report in the specified format.
pub fn print(report: &Report, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print_text(report),
        OutputFormat::Compact => print_compact(report),
        OutputFormat::Json => return print_json(report),
        OutputFormat::Pretty => print_pretty(report),
    }
    Ok(())
}

fn print_text(report: &Report) {
    let (errors, warnings, _) = report.count_by_severity();

    for violation in &report.violations {
        let severity_indicator = match violation.severity {
            Severity::Error => "\x1b[31merror\x1b[0m",
            Severity::Warning => "\x1b[33mwarning\x1b[0m",
            Severity::Info => "\x1b[34minfo\x1b[0m",
        };

        println!("{} {} [{}]", violation.code, violation.kind, violation.rule);
        println!("  {}: {}", severity_indicator, violation.message);
        if let Some(help) = &violation.help {
            println!("  = help: {help}");
        }
        if let Some(doc_ref) = &violation.doc_ref {
            println!("  = see: {doc_ref}");
        }
        println!();
    }

    let summary_color = if !report.passed() || errors > 0 {
        "\x1b[31m"
    } else if warnings > 0 {
        "\x1b[33m"
    } else {
        "\x1b[32m"
    };

    println!("{summary_color}{}\x1b[0m", report.summary());
}

fn print_json(report: &Report) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    println!("{json}");
    Ok(())
}

fn print_compact(report: &Report) {
    for violation in &report.violations {
        println!("{violation}");
    }
}

fn print_pretty(report: &Report) {
    for violation in &report.violations {
        let diagnostic = miette::Report::new(ViolationDiagnostic::from(violation));
        eprintln!("{diagnostic:?}");
    }
    println!("{}", report.summary());
}
