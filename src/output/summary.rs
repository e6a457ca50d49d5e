use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};

use crate::jira::types::Myself;
use crate::sync::report::SkipReason;
use crate::sync::{
    BulkSyncReport, IssueFieldListing, LinkCheck, LinkLookup, LinkResolution, MappingReport, MilestoneField,
    ReferenceCheck, SyncResult,
};

use super::styling::{bright, bright_green, bright_red, bright_yellow, cyan, dim, status_label};
use super::tables::{create_table, cyan_header, status_cell, value_cell};

const MAX_VALUE_CHARS: usize = 80;

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}…")
    } else {
        text.to_string()
    }
}

fn outcome_cell(result: &SyncResult, field: MilestoneField) -> Cell {
    if result.fields_copied.contains(&field) {
        let text = if result.dry_run { "would copy" } else { "copied" };
        return Cell::new(text).fg(TableColor::Green);
    }
    match result.fields_skipped.get(&field) {
        Some(reason) if reason.is_problem() => Cell::new(reason.to_string()).fg(TableColor::Red),
        Some(SkipReason::AlreadyUpToDate) => Cell::new("already up to date").fg(TableColor::Cyan),
        Some(reason) => Cell::new(reason.to_string()).fg(TableColor::DarkGrey),
        None => Cell::new("-"),
    }
}

/// Prints the outcome of one sync to stdout.
pub fn print_sync_result(result: &SyncResult) {
    println!("{}", render_sync_result(result));
}

pub fn render_sync_result(result: &SyncResult) -> String {
    let mut output = String::new();

    let title = if result.dry_run { "Sync (dry run)" } else { "Sync" };
    add_section_header(&mut output, "🔄", title);
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n",
        dim("Source:"),
        cyan(result.source_key.as_deref().unwrap_or("none")),
        dim("Target:"),
        cyan(&result.target_key),
        dim("Status:"),
        status_label(result.status),
    );

    if result.source_key.is_some() && result.error.is_none() {
        let mut table = create_table();
        table.set_header(cyan_header(&["Milestone", "Source Value", "Outcome"]));
        for field in MilestoneField::ALL {
            table.add_row(vec![
                Cell::new(field.label()),
                value_cell(result.values.get(field)),
                outcome_cell(result, field),
            ]);
        }
        let _ = writeln!(output, "{table}\n");
    }

    if let Some(error) = &result.error {
        let _ = writeln!(output, "  {} {}", bright_red("Error:"), error);
    }
    for note in &result.notes {
        let _ = writeln!(output, "  {} {}", dim("•"), note);
    }

    output
}

/// Prints a bulk run summary to stdout.
pub fn print_bulk_report(report: &BulkSyncReport) {
    println!("{}", render_bulk_report(report));
}

pub fn render_bulk_report(report: &BulkSyncReport) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Bulk Sync Overview");
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n",
        dim("Project:"),
        cyan(&report.project),
        dim("Mode:"),
        if report.dry_run {
            bright_yellow("dry run")
        } else {
            bright_green("live")
        },
        dim("Ideas processed:"),
        bright_yellow(report.attempted),
        dim("Succeeded:"),
        bright_green(report.succeeded),
        dim("Partial:"),
        bright_yellow(report.partial),
        dim("Skipped:"),
        dim(report.skipped),
        dim("Failed:"),
        if report.failed > 0 {
            bright_red(report.failed)
        } else {
            bright_green(report.failed)
        },
    );

    if let Some(reason) = &report.aborted {
        let _ = writeln!(output, "  {} {}\n", bright_red("Aborted:"), reason);
    }
    if report.cancelled {
        let _ = writeln!(output, "  {}\n", bright_yellow("Cancelled before all ideas were processed"));
    }

    if report.results.is_empty() {
        let _ = writeln!(output, "{}", bright_yellow("No ideas found."));
        return output;
    }

    add_section_header(&mut output, "📋", "Ideas");
    let mut table = create_table();
    table.set_header(cyan_header(&["Idea", "Source", "Status", "Copied", "Detail"]));
    for result in &report.results {
        let copied = result
            .fields_copied
            .iter()
            .map(|f| f.label())
            .collect::<Vec<_>>()
            .join("\n");
        let detail = result
            .error
            .clone()
            .or_else(|| result.notes.first().cloned())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(&result.target_key),
            Cell::new(result.source_key.as_deref().unwrap_or("-")),
            status_cell(result.status),
            Cell::new(copied),
            Cell::new(truncate(&detail, MAX_VALUE_CHARS)),
        ]);
    }
    let _ = writeln!(output, "{table}\n");

    output
}

pub fn print_listing(listing: &IssueFieldListing) {
    println!("{}", render_listing(listing));
}

pub fn render_listing(listing: &IssueFieldListing) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📄", &listing.issue.key);
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n",
        dim("Summary:"),
        bright(&listing.summary),
        dim("Type:"),
        cyan(&listing.issue.issue_type),
        dim("URL:"),
        dim(&listing.url),
    );

    add_section_header(&mut output, "📅", "Milestone Dates");
    let mut table = create_table();
    table.set_header(cyan_header(&["Milestone", "Value", "Field"]));
    for field in MilestoneField::ALL {
        table.add_row(vec![
            Cell::new(field.label()),
            value_cell(listing.dates.get(field)),
            Cell::new(listing.field_ids.get(&field).map_or("-", String::as_str)).fg(TableColor::DarkGrey),
        ]);
    }
    let _ = writeln!(output, "{table}\n");

    if !listing.other_fields.is_empty() {
        add_section_header(&mut output, "🗂", "All Populated Fields");
        let mut table = create_table();
        table.set_header(cyan_header(&["Field", "Id", "Value"]));
        for entry in &listing.other_fields {
            table.add_row(vec![
                Cell::new(&entry.name),
                Cell::new(&entry.id).fg(TableColor::DarkGrey),
                Cell::new(truncate(&entry.value, MAX_VALUE_CHARS)),
            ]);
        }
        let _ = writeln!(output, "{table}\n");
    }

    output
}

pub fn print_mapping(report: &MappingReport) {
    println!("{}", render_mapping(report));
}

pub fn render_mapping(report: &MappingReport) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "🧭", "Field Mapping");
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n",
        dim("Link type:"),
        cyan(&report.link_type),
        dim("Idea issue type:"),
        cyan(&report.idea_issue_type),
    );

    let mut table = create_table();
    match &report.schema {
        Some(schema) => {
            table.set_header(cyan_header(&["Milestone", "Field", "Format"]));
            for (field, slot) in schema.slots() {
                let (id, format) = slot.map_or_else(
                    || ("not present".to_string(), "-".to_string()),
                    |slot| (slot.id.clone(), format!("{:?}", slot.format)),
                );
                table.add_row(vec![Cell::new(field.label()), Cell::new(id), Cell::new(format)]);
            }
            let issue_type = if schema.issue_type.is_empty() {
                String::new()
            } else {
                format!(" / {}", schema.issue_type)
            };
            let _ = writeln!(
                output,
                "  {} {}{}{}\n",
                dim("Project:"),
                cyan(&schema.project),
                issue_type,
                if schema.is_idea {
                    dim(" (Product Discovery)")
                } else {
                    dim("")
                },
            );
        }
        None => {
            table.set_header(cyan_header(&["Milestone"]));
            for name in &report.milestones {
                table.add_row(vec![Cell::new(name)]);
            }
        }
    }
    let _ = writeln!(output, "{table}\n");

    output
}

pub fn print_link_checks(checks: &[LinkCheck]) {
    println!("{}", render_link_checks(checks));
}

pub fn render_link_checks(checks: &[LinkCheck]) -> String {
    let mut output = String::new();

    for check in checks {
        add_section_header(
            &mut output,
            "🔗",
            &format!("{} → {}", check.issue, check.target),
        );
        if check.references.is_empty() {
            let _ = writeln!(
                output,
                "  {} No references to {} found in {}\n",
                bright_red("✗"),
                check.target,
                check.issue
            );
            continue;
        }
        let _ = writeln!(
            output,
            "  {} Found {} reference(s) to {}",
            bright_green("✓"),
            check.references.len(),
            check.target
        );
        for reference in &check.references {
            let _ = writeln!(output, "    • {}: {}", cyan(&reference.field), reference.excerpt);
        }
        output.push('\n');
    }

    output
}

pub fn print_reference_check(check: &ReferenceCheck) {
    println!("{}", render_reference_check(check));
}

pub fn render_reference_check(check: &ReferenceCheck) -> String {
    if check.referenced {
        format!("{} {} references {}", bright_green("✓"), cyan(&check.issue), cyan(&check.target))
    } else {
        format!(
            "{} {} does not reference {}",
            bright_red("✗"),
            cyan(&check.issue),
            cyan(&check.target)
        )
    }
}

pub fn print_link_lookup(lookup: &LinkLookup) {
    println!("{}", render_link_lookup(lookup));
}

pub fn render_link_lookup(lookup: &LinkLookup) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🔗", &format!("Delivery issue of {}", lookup.idea));

    match &lookup.resolution {
        LinkResolution::Unique(issue) => {
            let _ = writeln!(
                output,
                "  {} {} ({})",
                bright_green("✓"),
                cyan(&issue.key),
                dim(&issue.issue_type)
            );
        }
        LinkResolution::Ambiguous { chosen, candidates } => {
            let _ = writeln!(
                output,
                "  {} {} linked issues; auto sync would pick {}",
                bright_yellow("◐"),
                candidates.len(),
                cyan(&chosen.key)
            );
            for candidate in candidates {
                let _ = writeln!(output, "    • {} ({})", candidate.key, dim(&candidate.issue_type));
            }
        }
    }

    output
}

pub fn render_connection(base_url: &str, me: &Myself) -> String {
    format!(
        "{} Connected to {} as {}{}",
        bright_green("✓"),
        cyan(base_url),
        bright(&me.display_name),
        me.email_address
            .as_deref()
            .map(|email| format!(" <{email}>"))
            .unwrap_or_default()
    )
}
