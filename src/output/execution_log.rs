use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use indexmap::IndexMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::sync::{BulkSyncReport, SyncResult};

const RULE_WIDTH: usize = 80;

/// Plain-text record of one run: what was asked, what happened.
#[derive(Debug, Clone)]
pub struct ExecutionLog {
    timestamp: DateTime<Local>,
    operation: String,
    parameters: IndexMap<String, String>,
    results: IndexMap<String, String>,
    details: Vec<String>,
}

impl ExecutionLog {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            operation: operation.into(),
            parameters: IndexMap::new(),
            results: IndexMap::new(),
            details: Vec::new(),
        }
    }

    pub fn parameter(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn result(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.results.insert(key.to_string(), value.to_string());
        self
    }

    pub fn detail(&mut self, line: impl Into<String>) -> &mut Self {
        self.details.push(line.into());
        self
    }

    pub fn record_sync(&mut self, result: &SyncResult) -> &mut Self {
        self.result("status", result.status);
        self.result("fields copied", result.fields_copied.len());
        self.result("fields skipped", result.fields_skipped.len());
        if let Some(error) = &result.error {
            self.result("error", error);
        }
        for field in &result.fields_copied {
            let verb = if result.dry_run { "would copy" } else { "copied" };
            self.detail(format!("{verb} {field}: {}", result.values.get(*field).describe()));
        }
        for (field, reason) in &result.fields_skipped {
            self.detail(format!("skipped {field}: {reason}"));
        }
        for note in &result.notes {
            self.detail(note.clone());
        }
        self
    }

    pub fn record_bulk(&mut self, report: &BulkSyncReport) -> &mut Self {
        self.result("attempted", report.attempted)
            .result("succeeded", report.succeeded)
            .result("partial", report.partial)
            .result("skipped", report.skipped)
            .result("failed", report.failed);
        if let Some(reason) = &report.aborted {
            self.result("aborted", reason);
        }
        if report.cancelled {
            self.result("cancelled", true);
        }
        for result in &report.results {
            let detail = result
                .error
                .as_deref()
                .or_else(|| result.notes.first().map(String::as_str))
                .unwrap_or("");
            self.detail(format!(
                "{} <- {}: {} {}",
                result.target_key,
                result.source_key.as_deref().unwrap_or("-"),
                result.status,
                detail
            ));
        }
        self
    }

    pub fn render(&self) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = String::new();

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "jpd-sync Execution Summary");
        let _ = writeln!(out, "Generated: {}", self.timestamp.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "{rule}\n");
        let _ = writeln!(out, "Operation: {}", self.operation);

        if !self.parameters.is_empty() {
            let _ = writeln!(out, "\nParameters:");
            for (key, value) in &self.parameters {
                let _ = writeln!(out, "  {key}: {value}");
            }
        }
        if !self.results.is_empty() {
            let _ = writeln!(out, "\nResults:");
            for (key, value) in &self.results {
                let _ = writeln!(out, "  {key}: {value}");
            }
        }
        if !self.details.is_empty() {
            let _ = writeln!(out, "\nDetailed Summary:");
            let _ = writeln!(out, "{}", "-".repeat(40));
            for line in &self.details {
                let _ = writeln!(out, "{line}");
            }
        }
        let _ = writeln!(out, "\n{rule}");

        out
    }

    /// Overwrites `path` with the rendered log.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render())
            .with_context(|| format!("Failed to write execution log: {}", path.display()))?;
        log::info!("Execution summary saved to: {}", path.display());
        Ok(())
    }
}
